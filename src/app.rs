// =============================================================================
// APPLICATION STATE & EVENT HANDLING
// =============================================================================
//
// All state lives in `App`, which winit hands back to us on every callback.
// Setup and every frame report through `AppStatus`.

use crate::config::Config;
use crate::renderer::Renderer;
use std::process::ExitCode;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

/// Lifecycle status seen by the event loop driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Continue,
    Failure,
    Quit,
}

impl AppStatus {
    pub fn is_failure(self) -> bool {
        self == AppStatus::Failure
    }

    pub fn exit_code(self) -> ExitCode {
        if self.is_failure() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }

    /// Failure is sticky: a later quit must not hide it
    fn merge(self, next: AppStatus) -> AppStatus {
        match (self, next) {
            (AppStatus::Failure, _) => AppStatus::Failure,
            (_, next) => next,
        }
    }
}

/// Main application struct.
///
/// IMPORTANT: Field order matters for Drop! The renderer owns the surface,
/// which must be destroyed before the window it was created for.
pub struct App {
    renderer: Option<Renderer>,
    window: Option<Window>,
    config: Config,
    status: AppStatus,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            renderer: None,
            window: None,
            config,
            status: AppStatus::Continue,
        }
    }

    pub fn status(&self) -> AppStatus {
        self.status
    }

    fn finish(&mut self, event_loop: &ActiveEventLoop, status: AppStatus) {
        self.status = self.status.merge(status);
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.finish(event_loop, AppStatus::Failure);
    }
}

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Resizing would need swapchain recreation, which we do not do
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match Renderer::new(&self.config, &window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, e.context("Failed to initialize Vulkan"));
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.finish(event_loop, AppStatus::Quit);
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.finish(event_loop, AppStatus::Quit);
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                if let Err(e) = renderer.render() {
                    self.fail(event_loop, e.context("Render error"));
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws; one frame per callback.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
