//! Keyboard and mouse state accumulated between frames.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Tracks the current state of keyboard and mouse input.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    just_released_keys: HashSet<KeyCode>,

    pressed_buttons: HashSet<MouseButton>,
    just_pressed_buttons: HashSet<MouseButton>,

    /// `None` until the cursor has been seen, so the first move has no delta
    mouse_position: Option<(f32, f32)>,
    /// Accumulated since the last `begin_frame`
    mouse_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state. Call once per frame after input is consumed.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.just_released_keys.clear();
        self.just_pressed_buttons.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    /// Records a key transition.
    pub fn on_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            if self.pressed_keys.insert(key) {
                self.just_pressed_keys.insert(key);
            }
        } else if self.pressed_keys.remove(&key) {
            self.just_released_keys.insert(key);
        }
    }

    /// Records a mouse button transition.
    pub fn on_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if pressed {
            if self.pressed_buttons.insert(button) {
                self.just_pressed_buttons.insert(button);
            }
        } else {
            self.pressed_buttons.remove(&button);
        }
    }

    /// Records a cursor position and accumulates the movement since the
    /// previous one.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.mouse_position = Some((x, y));
    }

    /// Forgets the cursor position, e.g. when it leaves the window.
    pub fn on_cursor_left(&mut self) {
        self.mouse_position = None;
    }

    /// Drops all held keys and buttons, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.just_released_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn is_mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.just_pressed_buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> Option<(f32, f32)> {
        self.mouse_position
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    /// Mouse movement this frame while `button` is held, zero otherwise.
    pub fn drag_delta(&self, button: MouseButton) -> (f32, f32) {
        if self.is_mouse_pressed(button) {
            self.mouse_delta
        } else {
            (0.0, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press_and_release() {
        let mut input = InputState::new();
        input.on_key(KeyCode::KeyW, true);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_pressed(KeyCode::KeyW));

        input.begin_frame();
        input.on_key(KeyCode::KeyW, true);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_key_just_pressed(KeyCode::KeyW));

        input.on_key(KeyCode::KeyW, false);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_released(KeyCode::KeyW));
    }

    #[test]
    fn test_first_move_has_no_delta() {
        let mut input = InputState::new();
        input.on_mouse_moved(100.0, 50.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_mouse_delta_accumulates_within_frame() {
        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_mouse_moved(3.0, 1.0);
        input.on_mouse_moved(5.0, -2.0);
        assert_eq!(input.mouse_delta(), (5.0, -2.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_drag_requires_button() {
        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_mouse_moved(4.0, 2.0);
        assert_eq!(input.drag_delta(MouseButton::Middle), (0.0, 0.0));

        input.on_mouse_button(MouseButton::Middle, true);
        assert_eq!(input.drag_delta(MouseButton::Middle), (4.0, 2.0));
    }

    #[test]
    fn test_release_all() {
        let mut input = InputState::new();
        input.on_key(KeyCode::KeyA, true);
        input.on_mouse_button(MouseButton::Left, true);
        input.release_all();
        assert!(!input.is_key_pressed(KeyCode::KeyA));
        assert!(!input.is_mouse_pressed(MouseButton::Left));
    }
}
