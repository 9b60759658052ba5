//! Tauri command handlers
//!
//! IPC handlers the webview calls through Tauri's invoke system.

pub mod recording;
