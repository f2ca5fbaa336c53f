use careportal::api::server;
use careportal::config::AppConfig;
use careportal::observability;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = observability::init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = server::start(config).await {
        tracing::error!(error = %err, "Server exited with error");
        std::process::exit(1);
    }
}
