use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use eframe::egui;
use examguard_client::{AntiCheatingService, ClientConfig, ExamApp, HttpAttemptApi};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::load().context("[main] invalid configuration")?;
    let api = HttpAttemptApi::new(&config).context("[main] could not build attempt api client")?;

    // the monitor runs on tokio, the window on the main thread
    let runtime = tokio::runtime::Runtime::new().context("[main] could not start async runtime")?;
    let service = {
        let _guard = runtime.enter();
        AntiCheatingService::new(Arc::new(api), &config)
    };
    tracing::info!(api = %config.api_url, attempt_id = %config.attempt_id, "[main] exam window starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([800.0, 600.0]),
        ..Default::default()
    };

    let handle = runtime.handle().clone();
    let attempt_id = config.attempt_id.clone();
    eframe::run_native(
        "ExamGuard",
        options,
        Box::new(move |_cc| Ok(Box::new(ExamApp::new(service, handle, attempt_id)))),
    )
    .map_err(|e| anyhow::anyhow!("[main] window failed: {e}"))
}
