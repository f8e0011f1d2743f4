use std::sync::Arc;

use imeicheck_domain::config::BalancePolicy;
use imeicheck_domain::services::{ResultCache, TelemetryGuard};
use imeicheck_gateway::{CheckoutGateway, Notifier, VerificationClient};
use imeicheck_storage::SeaOrmStorage;

/// Shared application state injected into every handler. The external
/// collaborators sit behind trait objects so the test harness can swap in
/// scripted doubles while keeping real storage.
#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    verifier: Arc<dyn VerificationClient>,
    checkout: Arc<dyn CheckoutGateway>,
    notifier: Arc<dyn Notifier>,
    result_cache: Arc<ResultCache>,
    telemetry: TelemetryGuard,
    jwt_secret: String,
    webhook_secret: String,
    balance_policy: BalancePolicy,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: SeaOrmStorage,
        verifier: Arc<dyn VerificationClient>,
        checkout: Arc<dyn CheckoutGateway>,
        notifier: Arc<dyn Notifier>,
        result_cache: Arc<ResultCache>,
        telemetry: TelemetryGuard,
        jwt_secret: String,
        webhook_secret: String,
        balance_policy: BalancePolicy,
    ) -> Self {
        Self {
            storage,
            verifier,
            checkout,
            notifier,
            result_cache,
            telemetry,
            jwt_secret,
            webhook_secret,
            balance_policy,
        }
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn verifier(&self) -> &dyn VerificationClient {
        self.verifier.as_ref()
    }

    pub fn checkout(&self) -> &dyn CheckoutGateway {
        self.checkout.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn result_cache(&self) -> &ResultCache {
        &self.result_cache
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    pub fn balance_policy(&self) -> BalancePolicy {
        self.balance_policy
    }
}
