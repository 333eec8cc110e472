//! G-buffer demo.
//!
//! Opens a window, drives the deferred renderer every redraw and orbits a
//! directional light over an empty scene. Pass a TOML config path as the
//! first argument; `renderer.toml` is used otherwise.

use std::time::Duration;

use anyhow::Result;
use glam::Vec3;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use renderer_core::{RendererConfig, Timer};
use renderer_platform::Window;
use renderer_renderer::{FrameSlot, FrameStatus, LightingParams, RenderData, Renderer};

const DEFAULT_CONFIG_PATH: &str = "renderer.toml";

struct App {
    config: RendererConfig,
    // Dropped before the window
    renderer: Option<Renderer>,
    window: Option<Window>,
    timer: Timer,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            timer: Timer::new(),
        }
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_mut()) else {
            return;
        };

        self.timer.tick();
        let angle = self.timer.elapsed().as_secs_f32() * 0.5;
        let mut scene = |_slot: FrameSlot| RenderData {
            draw_items: Vec::new(),
            lighting: LightingParams::new(
                Vec3::new(0.0, 1.0, 3.0),
                Vec3::new(angle.cos(), -1.0, angle.sin()),
                Vec3::ONE,
                3.0,
            ),
        };

        match renderer.render_frame(window, &mut scene) {
            Ok(FrameStatus::Ready(_)) => {}
            Ok(FrameStatus::Skip) => {}
            Err(e) if e.is_frame_data() => warn!("Frame dropped: {}", e),
            Err(e) => {
                error!("Render error: {}", e);
                event_loop.exit();
                return;
            }
        }

        if let Some(fps) = self.timer.fps_report(Duration::from_secs(5)) {
            let cycle = renderer.frame_cycle();
            info!(
                "{:.1} fps, {} presented, {} skipped",
                fps,
                cycle.presented_frames(),
                cycle.skipped_frames()
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let settings = &self.config.window;
        let window = match Window::new(event_loop, settings.width, settings.height, &settings.title) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(mut renderer) => {
                renderer.set_ui_construct(|ui| {
                    tracing::trace!(
                        "UI frame {} on image {} ({}x{})",
                        ui.slot,
                        ui.image_index,
                        ui.extent.width,
                        ui.extent.height
                    );
                });
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.renderer = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.draw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let minimized = window.is_minimized();
        event_loop.set_control_flow(control_flow(minimized));
        if !minimized {
            window.request_redraw();
        }
    }
}

/// Redraw continuously while visible; sleep until the next event while
/// minimized.
fn control_flow(minimized: bool) -> ControlFlow {
    if minimized {
        ControlFlow::Wait
    } else {
        ControlFlow::Poll
    }
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = RendererConfig::load(&path)?;

    renderer_core::init_logging_with_filter(&config.log.filter);
    info!("Starting G-buffer demo with config {}", path);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(control_flow(false));

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
