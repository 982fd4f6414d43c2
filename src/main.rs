// =============================================================================
// VULKAN CLEAR RENDERER
// =============================================================================
//
// Opens a window, negotiates a device, swapchain and graphics pipeline with
// Vulkan, then clears and presents every frame with a color that cycles
// over time.
//
// SETUP CHAIN:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Instance + Surface                                             │
// │    └── Capability probe -> Device selection                     │
// │          └── Logical device + queues                            │
// │                └── Swapchain + image views                      │
// │                      └── Render pass, layout, pipeline          │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

mod app;
mod backend;
mod config;
mod frame;
mod renderer;

use app::App;
use config::Config;
use std::process::ExitCode;
use winit::event_loop::EventLoop;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    // Load configuration from config.toml; the outcome is logged once the
    // configured level is known
    let (config, source) = Config::load();

    init_logging(&config);
    source.report();
    log::debug!("Config: {:?}", config);
    log::info!("Starting Vulkan clear renderer");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut app = App::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
        return ExitCode::FAILURE;
    }

    let status = app.status();
    log::info!("Exiting with status {:?}", status);
    status.exit_code()
}

/// Initialize logging; RUST_LOG overrides the configured level
fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
}
