//! Keyboard sliders and camera key bindings.

use prism_app::KeyCode;
use prism_render::CameraInput;

/// An integer value bounded to `min..=max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slider {
    label: &'static str,
    value: u32,
    min: u32,
    max: u32,
}

impl Slider {
    pub fn new(label: &'static str, value: u32, min: u32, max: u32) -> Self {
        let max = max.max(min);
        Self {
            label,
            value: value.clamp(min, max),
            min,
            max,
        }
    }

    pub const fn value(&self) -> u32 {
        self.value
    }

    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Set the value, clamped to the range. Returns whether it changed.
    pub fn set(&mut self, value: u32) -> bool {
        let value = value.clamp(self.min, self.max);
        let changed = value != self.value;
        self.value = value;
        changed
    }

    /// Move one step down or up.
    pub fn step(&mut self, up: bool) -> bool {
        let value = if up {
            self.value.saturating_add(1)
        } else {
            self.value.saturating_sub(1)
        };
        self.set(value)
    }
}

/// Which slider changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Spheres,
    Cubes,
    Recursion,
    Shadow,
}

#[derive(Clone, Debug)]
pub struct Controls {
    pub spheres: Slider,
    pub cubes: Slider,
    pub recursion: Slider,
    pub shadow: Slider,
}

impl Controls {
    pub fn new(
        spheres: u32,
        cubes: u32,
        recursion: u32,
        max_recursion: u32,
        shadow: u32,
        max_shadow: u32,
    ) -> Self {
        Self {
            spheres: Slider::new("spheres", spheres, 0, spheres),
            cubes: Slider::new("cubes", cubes, 0, cubes),
            recursion: Slider::new("recursion", recursion, 1, max_recursion),
            shadow: Slider::new("shadow", shadow, 0, max_shadow),
        }
    }

    pub const fn slider(&self, control: Control) -> &Slider {
        match control {
            Control::Spheres => &self.spheres,
            Control::Cubes => &self.cubes,
            Control::Recursion => &self.recursion,
            Control::Shadow => &self.shadow,
        }
    }

    /// Apply a key press. Returns the slider that changed, if any.
    pub fn handle_key(&mut self, key: KeyCode) -> Option<Control> {
        let (control, up) = match key {
            KeyCode::Digit1 => (Control::Spheres, false),
            KeyCode::Digit2 => (Control::Spheres, true),
            KeyCode::Digit3 => (Control::Cubes, false),
            KeyCode::Digit4 => (Control::Cubes, true),
            KeyCode::Digit5 => (Control::Recursion, false),
            KeyCode::Digit6 => (Control::Recursion, true),
            KeyCode::Digit7 => (Control::Shadow, false),
            KeyCode::Digit8 => (Control::Shadow, true),
            _ => return None,
        };

        let slider = match control {
            Control::Spheres => &mut self.spheres,
            Control::Cubes => &mut self.cubes,
            Control::Recursion => &mut self.recursion,
            Control::Shadow => &mut self.shadow,
        };
        slider.step(up).then_some(control)
    }

    /// Window title showing every slider.
    pub fn title(&self, base: &str) -> String {
        let mut title = base.to_owned();
        for slider in [&self.spheres, &self.cubes, &self.recursion, &self.shadow] {
            title.push_str(&format!(" | {} {}/{}", slider.label, slider.value, slider.max));
        }
        title
    }
}

/// Update the camera input for a key. Returns whether the key is a camera key.
pub fn apply_camera_key(input: &mut CameraInput, key: KeyCode, pressed: bool) -> bool {
    let flag = match key {
        KeyCode::KeyW => &mut input.forward,
        KeyCode::KeyS => &mut input.back,
        KeyCode::KeyA => &mut input.left,
        KeyCode::KeyD => &mut input.right,
        KeyCode::KeyE => &mut input.up,
        KeyCode::KeyQ => &mut input.down,
        KeyCode::ShiftLeft | KeyCode::ShiftRight => &mut input.fast,
        KeyCode::ControlLeft | KeyCode::ControlRight => &mut input.faster,
        _ => return false,
    };
    *flag = pressed;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> Controls {
        Controls::new(16, 4, 6, 6, 1, 4)
    }

    #[test]
    fn slider_clamps() {
        let mut slider = Slider::new("test", 10, 1, 4);
        assert_eq!(slider.value(), 4);
        assert!(!slider.step(true));
        assert!(slider.set(0));
        assert_eq!(slider.value(), 1);
        assert!(!slider.step(false));
    }

    #[test]
    fn empty_range_is_fixed() {
        let mut slider = Slider::new("spheres", 0, 0, 0);
        assert!(!slider.step(true));
        assert!(!slider.step(false));
        assert_eq!(slider.value(), 0);
    }

    #[test]
    fn recursion_stays_within_device_limit() {
        let mut controls = Controls::new(4, 4, 6, 3, 1, 4);
        assert_eq!(controls.recursion.value(), 3);
        assert_eq!(controls.handle_key(KeyCode::Digit6), None);
        for _ in 0..5 {
            controls.handle_key(KeyCode::Digit5);
        }
        assert_eq!(controls.recursion.value(), 1);
    }

    #[test]
    fn keys_move_sliders() {
        let mut controls = controls();
        assert_eq!(controls.handle_key(KeyCode::Digit1), Some(Control::Spheres));
        assert_eq!(controls.spheres.value(), 15);
        assert_eq!(controls.handle_key(KeyCode::Digit2), Some(Control::Spheres));
        assert_eq!(controls.handle_key(KeyCode::Digit2), None);
        assert_eq!(controls.handle_key(KeyCode::Digit8), Some(Control::Shadow));
        assert_eq!(controls.slider(Control::Shadow).value(), 2);
        assert_eq!(controls.handle_key(KeyCode::KeyW), None);
    }

    #[test]
    fn title_lists_every_slider() {
        let title = controls().title("Prism");
        assert_eq!(
            title,
            "Prism | spheres 16/16 | cubes 4/4 | recursion 6/6 | shadow 1/4"
        );
    }

    #[test]
    fn camera_keys() {
        let mut input = CameraInput::default();
        assert!(apply_camera_key(&mut input, KeyCode::KeyW, true));
        assert!(apply_camera_key(&mut input, KeyCode::ShiftLeft, true));
        assert!(input.forward && input.fast);
        assert!(apply_camera_key(&mut input, KeyCode::KeyW, false));
        assert!(!input.forward);
        assert!(!apply_camera_key(&mut input, KeyCode::Digit1, true));
    }
}
