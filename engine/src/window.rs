use std::time::Duration;

use anyhow::Result;
use log::*;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowBuilder};

use crate::camera::MovementKeys;
use crate::config::WindowConfig;

/// What the renderer needs from the windowing system.
pub trait WindowHost {
    /// Current drawable size in physical pixels.
    fn framebuffer_size(&self) -> (u32, u32);
    /// Blocks until at least one window event has been processed.
    fn wait_events(&mut self);
    fn pressed_keys(&self) -> MovementKeys;
    fn close_requested(&self) -> bool;
}

/// Blocks on window events while the framebuffer has no area, then returns
/// the first non-zero size. Returns `None` if the window is closed while
/// minimized.
pub fn wait_while_minimized(host: &mut dyn WindowHost) -> Option<(u32, u32)> {
    loop {
        if host.close_requested() {
            return None;
        }

        let (width, height) = host.framebuffer_size();
        if width != 0 && height != 0 {
            return Some((width, height));
        }
        trace!("Framebuffer is empty, waiting for events.");
        host.wait_events();
    }
}

pub fn movement_key(code: KeyCode) -> Option<MovementKeys> {
    match code {
        KeyCode::KeyW => Some(MovementKeys::FORWARD),
        KeyCode::KeyS => Some(MovementKeys::BACKWARD),
        KeyCode::KeyA => Some(MovementKeys::LEFT),
        KeyCode::KeyD => Some(MovementKeys::RIGHT),
        KeyCode::ArrowUp => Some(MovementKeys::PITCH_UP),
        KeyCode::ArrowDown => Some(MovementKeys::PITCH_DOWN),
        KeyCode::ArrowLeft => Some(MovementKeys::ROTATE_LEFT),
        KeyCode::ArrowRight => Some(MovementKeys::ROTATE_RIGHT),
        _ => None,
    }
}

/// Window and event loop, pumped from the render thread.
#[derive(Debug)]
pub struct Platform {
    event_loop: EventLoop<()>,
    window: Window,
    pressed: MovementKeys,
    resized: bool,
    close_requested: bool,
}

impl Platform {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .with_resizable(config.resizable)
            .build(&event_loop)?;

        Ok(Self {
            event_loop,
            window,
            pressed: MovementKeys::empty(),
            resized: false,
            close_requested: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Processes pending events without blocking.
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    /// Returns whether a resize arrived since the last call and clears it.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        let Self {
            event_loop,
            pressed,
            resized,
            close_requested,
            ..
        } = self;

        let status = event_loop.pump_events(timeout, |event, _| {
            if let Event::WindowEvent { event, .. } = event {
                match event {
                    WindowEvent::CloseRequested => *close_requested = true,
                    WindowEvent::Resized(_) => *resized = true,
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                physical_key: PhysicalKey::Code(code),
                                state,
                                repeat: false,
                                ..
                            },
                        ..
                    } => {
                        if let Some(key) = movement_key(code) {
                            pressed.apply(key, state == ElementState::Pressed);
                        }
                    }
                    _ => {}
                }
            }
        });

        if let PumpStatus::Exit(code) = status {
            debug!("Event loop exited with code {}.", code);
            self.close_requested = true;
        }
    }
}

impl WindowHost for Platform {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn pressed_keys(&self) -> MovementKeys {
        self.pressed
    }

    fn close_requested(&self) -> bool {
        self.close_requested
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Host whose framebuffer size follows a script, one entry per query.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedHost {
        pub sizes: Vec<(u32, u32)>,
        pub queries: usize,
        pub waits: usize,
        pub keys: MovementKeys,
        /// Number of waits after which the window reports a close.
        pub close_after: Option<usize>,
    }

    impl ScriptedHost {
        pub fn new(sizes: Vec<(u32, u32)>) -> Self {
            Self {
                sizes,
                ..Default::default()
            }
        }
    }

    impl WindowHost for ScriptedHost {
        fn framebuffer_size(&self) -> (u32, u32) {
            let last = self.sizes.len().saturating_sub(1);
            self.sizes[self.queries.min(last)]
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            self.queries += 1;
        }

        fn pressed_keys(&self) -> MovementKeys {
            self.keys
        }

        fn close_requested(&self) -> bool {
            self.close_after.is_some_and(|n| self.waits >= n)
        }
    }

    #[test]
    fn returns_immediately_when_visible() {
        let mut host = ScriptedHost::new(vec![(800, 600)]);
        assert_eq!(wait_while_minimized(&mut host), Some((800, 600)));
        assert_eq!(host.waits, 0);
    }

    #[test]
    fn blocks_until_size_is_non_zero() {
        let mut host = ScriptedHost::new(vec![(0, 0), (0, 0), (1024, 0), (1024, 768)]);
        assert_eq!(wait_while_minimized(&mut host), Some((1024, 768)));
        assert_eq!(host.waits, 3);
    }

    #[test]
    fn closing_while_minimized_stops_waiting() {
        let mut host = ScriptedHost::new(vec![(0, 0)]);
        host.close_after = Some(2);

        assert_eq!(wait_while_minimized(&mut host), None);
        assert_eq!(host.waits, 2);
    }

    #[test]
    fn maps_camera_keys() {
        assert_eq!(movement_key(KeyCode::KeyW), Some(MovementKeys::FORWARD));
        assert_eq!(movement_key(KeyCode::ArrowRight), Some(MovementKeys::ROTATE_RIGHT));
        assert_eq!(movement_key(KeyCode::Space), None);
    }
}
