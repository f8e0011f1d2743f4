use std::sync::{Arc, Mutex};

use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use imeicheck_domain::config::BalancePolicy;
use imeicheck_domain::model::{Imei, NewService, OrderParty, UserTier};
use imeicheck_domain::services::{init_telemetry, ResultCache, TelemetryConfig};
use imeicheck_domain::storage::{PaymentStore, UserStore};
use imeicheck_gateway::stripe::{CheckoutSession, StripeError};
use imeicheck_gateway::{
    CheckoutGateway, Mail, MailError, Notifier, VerificationClient, VerifyError, VerifyOutcome,
};
use imeicheck_storage::SeaOrmStorage;

use crate::application::configure_routes;
use crate::auth::issue_token;
use crate::handlers::metrics_handler;
use crate::state::AppState;

const JWT_SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "whsec_test";
const VALID_IMEI: &str = "356938035643809";

struct ScriptedVerifier {
    outcome: Result<VerifyOutcome, String>,
    failing_imeis: Vec<String>,
}

impl ScriptedVerifier {
    fn succeeding(result: &str) -> Self {
        Self {
            outcome: Ok(VerifyOutcome {
                success: true,
                result: result.to_owned(),
            }),
            failing_imeis: Vec::new(),
        }
    }

    /// Succeeds everywhere except the listed IMEIs, which come back as
    /// unsuccessful lookups.
    fn succeeding_except(result: &str, failing: &[&str]) -> Self {
        Self {
            failing_imeis: failing.iter().map(|imei| imei.to_string()).collect(),
            ..Self::succeeding(result)
        }
    }
}

#[async_trait]
impl VerificationClient for ScriptedVerifier {
    async fn verify(&self, imei: &Imei, _service_id: i64) -> Result<VerifyOutcome, VerifyError> {
        if self.failing_imeis.iter().any(|f| f == imei.as_str()) {
            return Ok(VerifyOutcome {
                success: false,
                result: "Status: Blacklisted".to_owned(),
            });
        }
        self.outcome.clone().map_err(VerifyError::Transport)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Mail>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Mail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Hands out predictable checkout sessions without touching the network.
#[derive(Default)]
struct FakeCheckout;

#[async_trait]
impl CheckoutGateway for FakeCheckout {
    async fn create_topup_session(
        &self,
        user_id: i64,
        amount_cents: i64,
        _currency: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let id = format!("cs_topup_{user_id}_{amount_cents}");
        Ok(CheckoutSession {
            url: format!("https://checkout.example.com/{id}"),
            id,
        })
    }

    async fn create_imei_session(
        &self,
        imei: &Imei,
        _service_id: i64,
        _service_name: &str,
        _amount_cents: i64,
        _currency: &str,
        _actor: &OrderParty,
    ) -> Result<CheckoutSession, StripeError> {
        let id = format!("cs_imei_{}", imei.as_str());
        Ok(CheckoutSession {
            url: format!("https://checkout.example.com/{id}"),
            id,
        })
    }
}

struct Harness {
    state: AppState,
    notifier: Arc<RecordingNotifier>,
}

async fn harness_with(policy: BalancePolicy, verifier: ScriptedVerifier) -> Harness {
    std::env::set_var("IMEICHECK_SKIP_DOTENV", "1");
    let telemetry =
        init_telemetry(&TelemetryConfig::from_env("API")).expect("telemetry initializes");
    let storage = SeaOrmStorage::connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    let notifier = Arc::new(RecordingNotifier::default());

    let state = AppState::new(
        storage,
        Arc::new(verifier),
        Arc::new(FakeCheckout),
        notifier.clone(),
        Arc::new(ResultCache::default()),
        telemetry,
        JWT_SECRET.to_owned(),
        WEBHOOK_SECRET.to_owned(),
        policy,
    );

    Harness { state, notifier }
}

async fn harness() -> Harness {
    harness_with(
        BalancePolicy::Enforce,
        ScriptedVerifier::succeeding("Status: Clean"),
    )
    .await
}

macro_rules! spawn_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(configure_routes)
                .route("/metrics", web::get().to(metrics_handler)),
        )
        .await
    };
}

async fn seed_service(state: &AppState) -> i64 {
    use imeicheck_domain::storage::ServiceStore;
    state
        .storage()
        .insert_service(NewService {
            service_name: "blacklist".to_owned(),
            price_guest: 400,
            price_registered: 250,
            price_premium: 150,
            price_pro: 100,
            description: Some("Blacklist status lookup".to_owned()),
            active: true,
        })
        .await
        .unwrap()
        .service_id
}

/// Registers a verified user straight through storage and returns
/// `(user_id, bearer token)`.
async fn seed_verified_user(state: &AppState, email: &str, tier: UserTier) -> (i64, String) {
    let user = state
        .storage()
        .insert_user(imeicheck_domain::model::NewUser {
            username: email.split('@').next().unwrap().to_owned(),
            email: email.to_owned(),
            password_hash: crate::auth::hash_password("password123").unwrap(),
            tier: UserTier::Pending,
            full_name: None,
            country: None,
            phone: None,
            email_verification_code: None,
            email_verification_expires: None,
        })
        .await
        .unwrap();
    state
        .storage()
        .mark_email_verified(user.user_id, tier)
        .await
        .unwrap();
    let user = state
        .storage()
        .find_user(user.user_id)
        .await
        .unwrap()
        .unwrap();
    let token = issue_token(JWT_SECRET, &user).unwrap();
    (user.user_id, token)
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

fn stripe_signature(body: &[u8]) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

fn topup_event_body(session: &str, user_id: i64, amount: i64) -> Vec<u8> {
    json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": session,
            "payment_intent": format!("pi_{session}"),
            "amount_total": amount,
            "currency": "usd",
            "metadata": {"user_id": user_id.to_string(), "recharge_amount": amount.to_string()},
        }}
    })
    .to_string()
    .into_bytes()
}

fn purchase_event_body(session: &str, service_id: i64, amount: i64) -> Vec<u8> {
    json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": session,
            "payment_intent": format!("pi_{session}"),
            "amount_total": amount,
            "currency": "usd",
            "metadata": {
                "imei": VALID_IMEI,
                "service_id": service_id.to_string(),
                "guest_email": "guest@example.com",
            },
        }}
    })
    .to_string()
    .into_bytes()
}

#[actix_web::test]
async fn registration_verification_login_flow() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(json!({
                "username": "alice",
                "email": "Alice@Example.com ",
                "password": "password123",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 201);

    // Login is rejected until the email is verified.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"email": "alice@example.com", "password": "password123"}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);

    // The verification code went out by email; the code leads the body.
    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@example.com");
    let code: String = sent[0]
        .body
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(6)
        .collect();

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/verify-email")
            .set_json(json!({"email": "alice@example.com", "code": code}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 200);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"email": "alice@example.com", "password": "password123"}))
            .to_request(),
    )
    .await;
    assert_eq!(body["balance"], 0);
    assert_eq!(body["user"]["tier"], "registered");
    let token = body["token"].as_str().unwrap().to_owned();

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/me")
            .insert_header(bearer(&token))
            .to_request(),
    )
    .await;
    assert_eq!(body["user"]["username"], "alice");
}

#[actix_web::test]
async fn duplicate_registration_conflicts() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);

    let payload = json!({
        "username": "bob",
        "email": "bob@example.com",
        "password": "password123",
    });
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(&payload)
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 201);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/register")
            .set_json(&payload)
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 409);
}

#[actix_web::test]
async fn password_reset_flow() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    seed_verified_user(&harness.state, "carol@example.com", UserTier::Registered).await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/request-password-reset")
            .set_json(json!({"email": "carol@example.com"}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 200);

    let sent = harness.notifier.sent();
    let code: String = sent
        .last()
        .unwrap()
        .body
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(6)
        .collect();

    // Wrong code is rejected.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/reset-password")
            .set_json(json!({
                "email": "carol@example.com",
                "code": "0000000",
                "new_password": "newpassword1",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/reset-password")
            .set_json(json!({
                "email": "carol@example.com",
                "code": code,
                "new_password": "newpassword1",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 200);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"email": "carol@example.com", "password": "newpassword1"}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 200);
}

#[actix_web::test]
async fn order_validation_rejects_before_any_write() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;

    // Bad IMEI.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .set_json(json!({
                "imeis": ["12345"],
                "service_id": service_id,
                "guest_email": "guest@example.com",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);

    // Guest without a contact email.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .set_json(json!({"imeis": [VALID_IMEI], "service_id": service_id}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);

    use imeicheck_domain::storage::OrderStore;
    assert_eq!(harness.state.storage().count_orders().await.unwrap(), 0);
}

#[actix_web::test]
async fn guest_order_fulfills_at_guest_price() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .set_json(json!({
                "imeis": [VALID_IMEI],
                "service_id": service_id,
                "guest_email": "Guest@Example.com",
            }))
            .to_request(),
    )
    .await;

    assert_eq!(body["status"], "completed");
    assert_eq!(body["price_used"], 400);
    assert_eq!(body["tier_at_order"], "guest");
    assert_eq!(body["guest_email"], "guest@example.com");
    assert!(body["result"].as_str().unwrap().contains("Status: Clean"));

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "guest@example.com");
}

#[actix_web::test]
async fn multi_imei_batch_snapshots_tier_price_and_aggregates_partial() {
    const OTHER_IMEI: &str = "490154203237518";
    let harness = harness_with(
        BalancePolicy::Enforce,
        ScriptedVerifier::succeeding_except("Status: Clean", &[OTHER_IMEI]),
    )
    .await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .set_json(json!({
                "imeis": [VALID_IMEI, OTHER_IMEI],
                "service_id": service_id,
                "guest_email": "guest@example.com",
            }))
            .to_request(),
    )
    .await;

    // One success, one failure: the mixed batch lands as partial.
    assert_eq!(body["status"], "partial");
    // The snapshot is the tier price, not price times batch size.
    assert_eq!(body["price_used"], 400);

    let entries: Value = serde_json::from_str(body["result"].as_str().unwrap()).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["imei"], VALID_IMEI);
    assert_eq!(entries[0]["success"], true);
    assert_eq!(entries[1]["imei"], OTHER_IMEI);
    assert_eq!(entries[1]["success"], false);
    assert_eq!(entries[1]["result"], "Status: Blacklisted");

    // Partial orders still email the result.
    assert_eq!(harness.notifier.sent().len(), 1);
}

#[actix_web::test]
async fn enforce_policy_gates_orders_on_balance() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;
    let (_, token) =
        seed_verified_user(&harness.state, "dave@example.com", UserTier::Registered).await;
    let (_, admin_token) =
        seed_verified_user(&harness.state, "root@example.com", UserTier::Admin).await;

    let order_payload = json!({"imeis": [VALID_IMEI], "service_id": service_id});

    // Empty balance: rejected.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .insert_header(bearer(&token))
            .set_json(&order_payload)
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 402);

    // Admin credits the account, the order now goes through.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/admin/payments/credit")
            .insert_header(bearer(&admin_token))
            .set_json(json!({"email": "dave@example.com", "amount": 250}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 201);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .insert_header(bearer(&token))
            .set_json(&order_payload)
            .to_request(),
    )
    .await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["price_used"], 250);

    // 250 credited, 250 charged.
    let me: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/me")
            .insert_header(bearer(&token))
            .to_request(),
    )
    .await;
    assert_eq!(me["balance"], 0);
}

#[actix_web::test]
async fn allow_policy_lets_balance_go_negative() {
    let harness = harness_with(
        BalancePolicy::Allow,
        ScriptedVerifier::succeeding("Status: Clean"),
    )
    .await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;
    let (_, token) =
        seed_verified_user(&harness.state, "erin@example.com", UserTier::Registered).await;

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .insert_header(bearer(&token))
            .set_json(json!({"imeis": [VALID_IMEI], "service_id": service_id}))
            .to_request(),
    )
    .await;
    assert_eq!(body["status"], "completed");

    let me: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/me")
            .insert_header(bearer(&token))
            .to_request(),
    )
    .await;
    assert_eq!(me["balance"], -250);
}

#[actix_web::test]
async fn webhook_rejects_bad_signatures_and_credits_once() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let (user_id, token) =
        seed_verified_user(&harness.state, "frank@example.com", UserTier::Registered).await;

    let body = topup_event_body("cs_hook_1", user_id, 1000);

    // Missing header.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/payments/webhook")
            .set_payload(body.clone())
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);

    // Wrong signature.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/payments/webhook")
            .insert_header(("Stripe-Signature", "t=1,v1=deadbeef"))
            .set_payload(body.clone())
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);

    assert_eq!(harness.state.storage().count_payments().await.unwrap(), 0);

    // Valid delivery, then an exact replay.
    for _ in 0..2 {
        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/payments/webhook")
                .insert_header(("Stripe-Signature", stripe_signature(&body)))
                .set_payload(body.clone())
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), 200);
    }

    assert_eq!(harness.state.storage().count_payments().await.unwrap(), 1);

    let me: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/me")
            .insert_header(bearer(&token))
            .to_request(),
    )
    .await;
    assert_eq!(me["balance"], 1000);
}

#[actix_web::test]
async fn paid_purchase_serves_cached_result_then_stored_order() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;

    let body = purchase_event_body("cs_paid_1", service_id, 400);
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/payments/webhook")
            .insert_header(("Stripe-Signature", stripe_signature(&body)))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 200);

    // First poll hits the cache.
    let first: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/orders/session/cs_paid_1")
            .to_request(),
    )
    .await;
    assert!(first["result"].as_str().unwrap().contains("Status: Clean"));

    // Second poll falls back to the persisted order.
    let second: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/orders/session/cs_paid_1")
            .to_request(),
    )
    .await;
    assert_eq!(second["status"], "completed");
    assert_eq!(second["price_used"], 400);

    // The payment is queryable by session id too.
    let payment: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/payments/session/cs_paid_1")
            .to_request(),
    )
    .await;
    assert_eq!(payment["status"], "approved");
}

#[actix_web::test]
async fn checkout_session_endpoints_return_urls() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;
    let (_, token) =
        seed_verified_user(&harness.state, "gina@example.com", UserTier::Registered).await;

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/payments/topup-session")
            .insert_header(bearer(&token))
            .set_json(json!({"amount": 1000}))
            .to_request(),
    )
    .await;
    assert!(body["checkout_url"]
        .as_str()
        .unwrap()
        .starts_with("https://checkout.example.com/"));

    // Below the minimum.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/payments/topup-session")
            .insert_header(bearer(&token))
            .set_json(json!({"amount": 5}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);

    // Guest IMEI session needs a contact email.
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/payments/imei-session")
            .set_json(json!({"imei": VALID_IMEI, "service_id": service_id}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/payments/imei-session")
            .set_json(json!({
                "imei": VALID_IMEI,
                "service_id": service_id,
                "guest_email": "guest@example.com",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(body["amount"], 400);
}

#[actix_web::test]
async fn service_catalog_is_public_and_admin_managed() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let (_, admin_token) =
        seed_verified_user(&harness.state, "root@example.com", UserTier::Superadmin).await;
    let (_, user_token) =
        seed_verified_user(&harness.state, "pleb@example.com", UserTier::Registered).await;

    // Non-admins cannot create services.
    let payload = json!({
        "service_name": "carrier",
        "price_guest": 300,
        "price_registered": 200,
        "price_premium": 120,
        "price_pro": 80,
        "description": null,
        "active": true,
    });
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/admin/services")
            .insert_header(bearer(&user_token))
            .set_json(&payload)
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 403);

    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/admin/services")
            .insert_header(bearer(&admin_token))
            .set_json(&payload)
            .to_request(),
    )
    .await;
    let service_id = created["service_id"].as_i64().unwrap();

    // Deactivate it; the public list goes empty, the admin list still sees it.
    let response = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/admin/services/{service_id}"))
            .insert_header(bearer(&admin_token))
            .set_json(json!({"active": false}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 200);

    let public: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/v1/services").to_request(),
    )
    .await;
    assert_eq!(public.as_array().unwrap().len(), 0);

    let admin: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/admin/services")
            .insert_header(bearer(&admin_token))
            .to_request(),
    )
    .await;
    assert_eq!(admin.as_array().unwrap().len(), 1);

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/services/{service_id}"))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 404);
}

#[actix_web::test]
async fn price_edits_never_rewrite_past_orders() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;
    let (_, admin_token) =
        seed_verified_user(&harness.state, "root@example.com", UserTier::Admin).await;

    let order: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .set_json(json!({
                "imeis": [VALID_IMEI],
                "service_id": service_id,
                "guest_email": "guest@example.com",
            }))
            .to_request(),
    )
    .await;
    let order_id = order["order_id"].as_i64().unwrap();
    assert_eq!(order["price_used"], 400);

    let response = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/admin/services/{service_id}"))
            .insert_header(bearer(&admin_token))
            .set_json(json!({"price_guest": 9999}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 200);

    let reread: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/admin/orders/{order_id}"))
            .insert_header(bearer(&admin_token))
            .to_request(),
    )
    .await;
    assert_eq!(reread["price_used"], 400);
}

#[actix_web::test]
async fn admin_can_overwrite_terminal_order_status() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;
    let (_, admin_token) =
        seed_verified_user(&harness.state, "root@example.com", UserTier::Admin).await;

    let order: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .set_json(json!({
                "imeis": [VALID_IMEI],
                "service_id": service_id,
                "guest_email": "guest@example.com",
            }))
            .to_request(),
    )
    .await;
    let order_id = order["order_id"].as_i64().unwrap();
    assert_eq!(order["status"], "completed");

    let updated: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/admin/orders/{order_id}/status"))
            .insert_header(bearer(&admin_token))
            .set_json(json!({"status": "failed"}))
            .to_request(),
    )
    .await;
    assert_eq!(updated["status"], "failed");
}

#[actix_web::test]
async fn admin_endpoints_require_admin_tier() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let (_, token) =
        seed_verified_user(&harness.state, "pleb@example.com", UserTier::Premium).await;

    for uri in [
        "/api/v1/admin/users",
        "/api/v1/admin/orders",
        "/api/v1/admin/payments",
        "/api/v1/admin/dashboard",
    ] {
        let response = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(uri)
                .insert_header(bearer(&token))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), 403, "expected 403 for {uri}");
    }

    // And 401 without any token.
    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/admin/users")
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
async fn admin_manages_users_and_tiers() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let (user_id, _) =
        seed_verified_user(&harness.state, "henry@example.com", UserTier::Registered).await;
    let (_, admin_token) =
        seed_verified_user(&harness.state, "root@example.com", UserTier::Admin).await;

    let promoted: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/admin/users/{user_id}/tier"))
            .insert_header(bearer(&admin_token))
            .set_json(json!({"tier": "premium"}))
            .to_request(),
    )
    .await;
    assert_eq!(promoted["tier"], "premium");

    let response = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/v1/admin/users/{user_id}"))
            .insert_header(bearer(&admin_token))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 204);

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/admin/users/{user_id}"))
            .insert_header(bearer(&admin_token))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 404);
}

#[actix_web::test]
async fn dashboard_reports_totals_and_breakdowns() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);
    let service_id = seed_service(&harness.state).await;
    let (_, admin_token) =
        seed_verified_user(&harness.state, "root@example.com", UserTier::Admin).await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/orders")
            .set_json(json!({
                "imeis": [VALID_IMEI],
                "service_id": service_id,
                "guest_email": "guest@example.com",
            }))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 201);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/admin/payments/credit")
            .insert_header(bearer(&admin_token))
            .set_json(json!({"email": "root@example.com", "amount": 500}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 201);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/admin/dashboard")
            .insert_header(bearer(&admin_token))
            .to_request(),
    )
    .await;
    assert_eq!(body["totals"]["users"], 1);
    assert_eq!(body["totals"]["orders"], 1);
    assert_eq!(body["totals"]["payments"], 1);
    assert_eq!(body["totals"]["approved_revenue"], 500);
    assert_eq!(body["service_usage"][0]["service_name"], "blacklist");
    assert_eq!(body["service_usage"][0]["orders"], 1);
}

#[actix_web::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let harness = harness().await;
    let app = spawn_app!(harness.state);

    let response =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    assert!(content_type.starts_with("text/plain"));
}
