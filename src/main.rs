//! VoIP Relay
//!
//! Gives each user a phone number and a SIP endpoint at the provider, and
//! relays calls between them: a PSTN call to the number rings the endpoint,
//! a call placed from the endpoint goes out from the number.
//!
//! Runs as an Axum server receiving the provider's call events.

mod models;
mod server;

use server::config::Config;

fn main() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("voip_relay=info".parse().unwrap()))
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting VoIP Relay server on port {}", config.port);

    if let Err(e) = runtime.block_on(server::run_server(config)) {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
