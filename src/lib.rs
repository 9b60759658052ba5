//! Presence Cam - record the camera while a target object is in view.
//!
//! This is the main library crate. It provides the detection-driven recording
//! controller, the camera/detector/encoder adapters it runs against, and the
//! optional Tauri desktop surface.

pub mod app;
pub mod capture;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod controller;
pub mod detector;
pub mod recorder;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "presence_cam=debug,presence_cam_lib=debug,tauri=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Initialize the desktop application
#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use commands::recording::DetectionState;

    init_tracing();

    tracing::info!("Starting Presence Cam v{}", env!("CARGO_PKG_VERSION"));

    let config_path = config::AppConfig::resolve_path(std::env::args().nth(1));
    let config = match config_path.as_deref().map(config::AppConfig::load) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            tracing::warn!("Falling back to default config: {}", e);
            config::AppConfig::default()
        }
        None => config::AppConfig::default(),
    };

    let app = tauri::Builder::default()
        .manage(DetectionState::new(config))
        .invoke_handler(tauri::generate_handler![
            commands::recording::get_cameras,
            commands::recording::start_detection,
            commands::recording::stop_detection,
            commands::recording::get_controller_status,
            commands::recording::get_clips,
        ])
        .build(tauri::generate_context!());

    let app = match app {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Error while building tauri application: {}", e);
            return;
        }
    };

    app.run(|handle, event| {
        if let tauri::RunEvent::Exit = event {
            use tauri::Manager;
            // Clips still encoding are finished before the process goes away
            let state = handle.state::<DetectionState>();
            tauri::async_runtime::block_on(state.shutdown());
        }
    });
}
