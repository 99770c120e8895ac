use carpics::{logger, server, Config, GeminiClientFactory, Orchestrator, StyleStore};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let config = Config::from_env()?;
    logger::init_with_config(config.logger_config())?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let styles = match StyleStore::load(config.prompts_path()) {
        Ok(styles) => Arc::new(styles),
        Err(e) => {
            log::error!("❌ {}", e);
            return Err(e.into());
        }
    };

    logger::log_startup_info(
        "Car Pics API",
        env!("CARGO_PKG_VERSION"),
        config.host(),
        config.port(),
    );
    logger::log_config_info(&config, styles.len());

    let factory = Arc::new(GeminiClientFactory::new(config.gemini.clone()));
    let orchestrator = Orchestrator::new(&config, styles, factory);

    server::run(&config, orchestrator).await?;
    Ok(())
}
