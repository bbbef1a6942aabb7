#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod analysis;
mod config;
mod controller;
mod devices;
mod fullscreen;
mod pipeline;
mod platform;
mod session;
mod types;
#[cfg(feature = "camera-nokhwa")]
mod ui;

use anyhow::Result;

#[cfg(feature = "camera-nokhwa")]
fn main() -> Result<()> {
    use std::sync::Arc;

    use gpui::Application;

    use crate::{
        analysis::GeminiClient, config::AppConfig, controller::StreamOptions,
        pipeline::NokhwaPlatform, platform::ThreadSpawner, session::HudSession,
    };

    env_logger::init();

    let config = AppConfig::from_env()?;
    log::info!(
        "starting with resolution policy {}, analysis model {}",
        config.resolution,
        config.analysis.model
    );
    if config.analysis.api_key.is_none() {
        log::warn!("GEMINI_API_KEY is not set; frame analysis will fail");
    }

    let analyzer = GeminiClient::new(config.analysis.clone())?;
    let session = HudSession::new(
        Arc::new(NokhwaPlatform::new(&config)),
        Arc::new(analyzer),
        ThreadSpawner,
        StreamOptions::from(&config),
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, session) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn main() -> Result<()> {
    anyhow::bail!("uvc-hud was built without a camera backend; enable the `camera-nokhwa` feature")
}
