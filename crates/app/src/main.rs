//! kiln viewer entry point.
//!
//! Usage: `kiln [config.toml]`. Without an argument `kiln.toml` in the
//! working directory is used when present, defaults otherwise.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use kiln_core::{EngineConfig, FrameClock};
use kiln_platform::{InputState, Window};
use kiln_renderer::{Renderer, input_context};

struct App {
    config: EngineConfig,
    // Declared before the window so the renderer, which owns the surface,
    // is dropped first.
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    clock: FrameClock,
    /// Error that ended the event loop, returned from `main`.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            input: InputState::new(),
            clock: FrameClock::new(),
            fatal: None,
        }
    }

    /// Records `err` as the exit cause and stops the event loop. The first
    /// error wins.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.fatal.get_or_insert(err);
        event_loop.exit();
    }

    /// Exit status of the run: the recorded error, if any.
    fn finish(self) -> Result<()> {
        match self.fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return;
        };
        if window.take_resized() {
            renderer.resize(window.extent());
        }

        let dt = self.clock.tick();
        if window.is_minimized() {
            self.input.end_frame();
            return;
        }

        let previous = renderer.scene_name();
        if let Err(e) = renderer.render_frame(&input_context(&self.input), dt) {
            self.fail(event_loop, anyhow::Error::new(e).context("rendering frame"));
            return;
        }
        if renderer.scene_name() != previous {
            window.set_title(&format!("{} - {}", self.config.window.title, renderer.scene_name()));
        }
        self.input.end_frame();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("creating window"));
                return;
            }
        };
        match Renderer::new(&window, self.config.clone()) {
            Ok(renderer) => {
                window.set_title(&format!("{} - {}", self.config.window.title, renderer.scene_name()));
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("creating renderer"));
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.input.handle_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.mark_resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.take() {
            info!(
                "Exiting after {} frames ({:.1}s)",
                renderer.frames_submitted(),
                self.clock.elapsed_secs()
            );
        }
    }
}

fn load_config() -> Result<EngineConfig> {
    match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading {}", path)),
        None if Path::new(EngineConfig::DEFAULT_PATH).exists() => {
            EngineConfig::load(EngineConfig::DEFAULT_PATH)
                .with_context(|| format!("loading {}", EngineConfig::DEFAULT_PATH))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<()> {
    let config = load_config()?;
    kiln_core::init_logging(&config.log.filter);
    info!("Starting kiln");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_run_finishes_ok() {
        let app = App::new(EngineConfig::default());
        assert!(app.finish().is_ok());
    }

    #[test]
    fn test_recorded_error_is_returned() {
        let mut app = App::new(EngineConfig::default());
        app.fatal = Some(anyhow::anyhow!("device lost").context("rendering frame"));
        let err = app.finish().unwrap_err();
        assert_eq!(err.to_string(), "rendering frame");
        assert_eq!(err.root_cause().to_string(), "device lost");
    }
}
