fn main() {
    // The Tauri context is only generated for the desktop surface
    #[cfg(feature = "desktop")]
    tauri_build::build()
}
