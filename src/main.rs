//! LogShield - Main Entry Point

mod logic;

use logic::config::Config;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    log::info!("Starting LogShield v{}...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("LOGSHIELD_CONFIG")
        .unwrap_or_else(|_| "logshield.json".to_string());
    let config = Config::load(std::path::Path::new(&config_path));

    if let Err(e) = logic::telemetry::init(config.audit_dir.clone()) {
        log::warn!("Telemetry init failed: {} - events will not be recorded", e);
    } else {
        log::info!("Telemetry system initialized");
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    rt.block_on(logic::scheduler::run(config));

    logic::telemetry::shutdown();
    log::info!("LogShield stopped");
}
