//! Ember - Main Entry Point
//!
//! Opens a window, loads the configured scene and runs the frame loop.
//!
//! Controls: WASD to move, right mouse drag to look, 1-4 to pick the shadow
//! mode, B to cycle background effects, Escape to quit.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use ember_core::{EngineConfig, ShadowMode, Timer};
use ember_platform::{InputState, KeyCode, MouseButton, Window};
use ember_renderer::Engine;
use ember_scene::MoveInput;

/// Config file used when none is given on the command line.
const DEFAULT_CONFIG: &str = "config.toml";

/// Wait between polls while the window is minimized.
const MINIMIZED_SLEEP: Duration = Duration::from_millis(100);

struct App {
    config: EngineConfig,
    window: Option<Window>,
    engine: Option<Engine>,
    input: InputState,
    timer: Timer,
    background: usize,
    /// First error that ended the loop, returned from `main`.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            window: None,
            engine: None,
            input: InputState::new(),
            timer: Timer::new(),
            background: 0,
            fatal: None,
        }
    }

    /// Logs `err` and keeps it unless an earlier one is already stored. The
    /// caller stops the event loop.
    fn record_fatal(&mut self, err: anyhow::Error) {
        error!("{:#}", err);
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }

    /// Outcome of the run: the recorded error, if any.
    fn finish(&mut self) -> Result<()> {
        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Feeds this frame's input to the engine.
    fn apply_input(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let input = &self.input;

        if input.is_key_just_pressed(KeyCode::Escape) {
            event_loop.exit();
            return;
        }

        let camera = engine.camera_mut();
        camera.set_move_input(MoveInput {
            forward: input.is_key_pressed(KeyCode::KeyW),
            backward: input.is_key_pressed(KeyCode::KeyS),
            left: input.is_key_pressed(KeyCode::KeyA),
            right: input.is_key_pressed(KeyCode::KeyD),
        });
        // The first frame of a drag carries the jump from the last position
        if !input.is_mouse_just_pressed(MouseButton::Right) {
            let (dx, dy) = input.drag_delta(MouseButton::Right);
            if dx != 0.0 || dy != 0.0 {
                camera.rotate_by_mouse(dx, dy);
            }
        }

        for (key, mode) in [
            (KeyCode::Digit1, ShadowMode::Off),
            (KeyCode::Digit2, ShadowMode::Simple),
            (KeyCode::Digit3, ShadowMode::Pcf),
            (KeyCode::Digit4, ShadowMode::Csm),
        ] {
            if input.is_key_just_pressed(key) {
                engine.set_shadow_mode(mode);
            }
        }
        if input.is_key_just_pressed(KeyCode::KeyB) {
            self.background += 1;
            engine.select_background(self.background);
        }
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
                self.record_fatal(anyhow!("Failed to create window: {}", e));
                event_loop.exit();
                return;
            }
        };

        match Engine::new(&window, &self.config) {
            Ok(engine) => {
                info!("Initialization complete, entering main loop");
                self.engine = Some(engine);
                self.window = Some(window);
                self.timer.reset();
            }
            Err(e) => {
                self.record_fatal(anyhow!("Failed to create engine: {}", e));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(engine) = self.engine.as_mut() {
                    engine.resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.input.release_all(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.input.on_key(key, event.state.is_pressed());
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.on_mouse_button(button.into(), state.is_pressed());
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => self.input.on_cursor_left(),
            WindowEvent::RedrawRequested => {
                let minimized = self.window.as_ref().is_some_and(Window::is_minimized);
                if minimized {
                    std::thread::sleep(MINIMIZED_SLEEP);
                    return;
                }

                let delta = self.timer.delta_secs();
                self.apply_input(event_loop);
                let drawn = self.engine.as_mut().map(|engine| {
                    engine.update(delta);
                    engine.draw()
                });
                if let Some(Err(e)) = drawn {
                    self.record_fatal(anyhow!("Fatal render error: {}", e));
                    event_loop.exit();
                }
                self.input.begin_frame();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.as_ref() {
            let stats = engine.stats();
            info!(
                "Last frame: {:.2} ms, {} draws, {} triangles",
                stats.frametime, stats.drawcall_count, stats.triangle_count
            );
        }
        // Engine first: its surface must go before the window it was made from.
        self.engine = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    ember_core::init_logging();
    info!("Starting ember");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = EngineConfig::load(&config_path)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.finish()
}
