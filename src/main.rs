use snow_relay::api::{build_api, AppState};
use snow_relay::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let config = Config::from_env()?;
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        instance = %config.servicenow.instance_url,
        oauth = config.oauth.is_some(),
        "snow-relay listening"
    );
    let router = build_api(AppState::new(&config)?);
    axum::serve(listener, router).await?;
    Ok(())
}
