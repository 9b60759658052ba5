//! Headless entry point: detect, record, print the clips on Ctrl-C.

use anyhow::Context;
use presence_cam_lib::app::PresenceApp;
use presence_cam_lib::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    presence_cam_lib::init_tracing();

    tracing::info!("Starting Presence Cam v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::resolve_path(std::env::args().nth(1)) {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    let app = PresenceApp::launch(&config).context("failed to acquire capture resources")?;
    app.controller().start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Interrupt received, stopping");

    app.shutdown().await;

    for clip in app.controller().registry().summaries() {
        match clip.path {
            Some(path) => println!("{}  {}  {}", clip.id, clip.label, path.display()),
            None => println!(
                "{}  {}  <{} bytes in memory>",
                clip.id,
                clip.label,
                clip.size_bytes.unwrap_or(0)
            ),
        }
    }

    Ok(())
}
