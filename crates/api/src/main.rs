mod application;
mod auth;
mod handlers;
mod state;

#[cfg(test)]
mod tests;

#[actix_web::main]
async fn main() {
    if let Err(err) = application::run().await {
        eprintln!("imeicheck api failed to start: {err}");
        std::process::exit(1);
    }
}
