//! Keyboard and mouse state consumed by the frame orchestrator. The runtime
//! never talks to a platform input API directly; the host supplies an
//! [`InputSource`] and the orchestrator queries edges and levels through it.
//!
//! Types:
//!
//! - `InputSource` is the adapter contract: per-key rising edges and levels,
//!   mouse buttons, position, and movement delta, plus `next_frame` to
//!   advance the edge state.
//! - `KeyCombo` is the four-part hotkey descriptor (keycode plus exact
//!   Ctrl/Shift/Alt requirements) stored in settings, presets, and technique
//!   rows, serialised as a `kc,ctrl,shift,alt` item list.
//! - `BufferedInput` is a host-fed implementation that tracks down state and
//!   per-frame press edges; suitable for message-pump hosts and for tests.
//! - `SharedInput` clones a `BufferedInput` behind a mutex so the event pump
//!   and the runtime can hold it at the same time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use inifile::IniValue;

/// Virtual-key codes the runtime needs by name.
pub mod vk {
    pub const SHIFT: u32 = 0x10;
    pub const CONTROL: u32 = 0x11;
    pub const MENU: u32 = 0x12;
    /// Print-screen, the default screenshot key.
    pub const SNAPSHOT: u32 = 0x2C;
}

const KEY_COUNT: usize = 256;
const BUTTON_COUNT: usize = 6;

/// Adapter contract for keyboard/mouse state queries.
///
/// `is_*_pressed` reports a rising edge within the current frame;
/// `is_*_down` reports level state. Implementations must clear edges in
/// `next_frame`, which the orchestrator calls once per presented frame.
pub trait InputSource {
    fn is_key_down(&self, keycode: u32) -> bool;
    fn is_key_pressed(&self, keycode: u32) -> bool;
    fn is_mouse_button_down(&self, button: u32) -> bool;
    fn is_mouse_button_pressed(&self, button: u32) -> bool;
    fn mouse_position(&self) -> (i32, i32);
    fn mouse_delta(&self) -> (i32, i32);
    fn next_frame(&mut self);
}

/// A hotkey: keycode plus required modifier states.
///
/// A combo with keycode 0 is unbound and never fires. Modifier matching is
/// exact: a combo without Ctrl does not fire while Ctrl is held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyCombo {
    pub keycode: u32,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyCombo {
    pub fn new(keycode: u32) -> Self {
        Self {
            keycode,
            ..Self::default()
        }
    }

    pub fn is_unbound(&self) -> bool {
        self.keycode == 0
    }

    /// Rising edge of the key with the exact modifier state required.
    pub fn is_pressed(&self, input: &dyn InputSource) -> bool {
        self.keycode != 0
            && input.is_key_pressed(self.keycode)
            && self.ctrl == input.is_key_down(vk::CONTROL)
            && self.shift == input.is_key_down(vk::SHIFT)
            && self.alt == input.is_key_down(vk::MENU)
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbound() {
            return f.write_str("unbound");
        }
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        write!(f, "0x{:02X}", self.keycode)
    }
}

impl IniValue for KeyCombo {
    fn from_items(items: &[String]) -> Option<Self> {
        let mut parts = [0u32; 4];
        for (slot, item) in parts.iter_mut().zip(items) {
            *slot = item.parse().ok()?;
        }
        Some(Self {
            keycode: parts[0],
            ctrl: parts[1] != 0,
            shift: parts[2] != 0,
            alt: parts[3] != 0,
        })
    }

    fn to_items(&self) -> Vec<String> {
        [
            self.keycode,
            self.ctrl as u32,
            self.shift as u32,
            self.alt as u32,
        ]
        .iter()
        .map(u32::to_string)
        .collect()
    }
}

/// Host-fed input state with per-frame edge tracking.
///
/// The host forwards key and button transitions as they arrive; the
/// orchestrator consumes edges during the frame and calls `next_frame` when
/// presentation finishes.
#[derive(Clone)]
pub struct BufferedInput {
    keys_down: [bool; KEY_COUNT],
    keys_pressed: [bool; KEY_COUNT],
    buttons_down: [bool; BUTTON_COUNT],
    buttons_pressed: [bool; BUTTON_COUNT],
    position: (i32, i32),
    delta: (i32, i32),
}

impl BufferedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, keycode: u32) {
        let Some(slot) = self.keys_down.get_mut(keycode as usize) else {
            return;
        };
        if !*slot {
            self.keys_pressed[keycode as usize] = true;
        }
        *slot = true;
    }

    pub fn key_up(&mut self, keycode: u32) {
        if let Some(slot) = self.keys_down.get_mut(keycode as usize) {
            *slot = false;
        }
    }

    pub fn mouse_button_down(&mut self, button: u32) {
        let Some(slot) = self.buttons_down.get_mut(button as usize) else {
            return;
        };
        if !*slot {
            self.buttons_pressed[button as usize] = true;
        }
        *slot = true;
    }

    pub fn mouse_button_up(&mut self, button: u32) {
        if let Some(slot) = self.buttons_down.get_mut(button as usize) {
            *slot = false;
        }
    }

    /// Moves the cursor, accumulating the movement delta for the frame.
    pub fn set_mouse_position(&mut self, x: i32, y: i32) {
        self.delta.0 += x - self.position.0;
        self.delta.1 += y - self.position.1;
        self.position = (x, y);
    }
}

impl Default for BufferedInput {
    fn default() -> Self {
        Self {
            keys_down: [false; KEY_COUNT],
            keys_pressed: [false; KEY_COUNT],
            buttons_down: [false; BUTTON_COUNT],
            buttons_pressed: [false; BUTTON_COUNT],
            position: (0, 0),
            delta: (0, 0),
        }
    }
}

impl InputSource for BufferedInput {
    fn is_key_down(&self, keycode: u32) -> bool {
        self.keys_down.get(keycode as usize).copied().unwrap_or(false)
    }

    fn is_key_pressed(&self, keycode: u32) -> bool {
        self.keys_pressed
            .get(keycode as usize)
            .copied()
            .unwrap_or(false)
    }

    fn is_mouse_button_down(&self, button: u32) -> bool {
        self.buttons_down
            .get(button as usize)
            .copied()
            .unwrap_or(false)
    }

    fn is_mouse_button_pressed(&self, button: u32) -> bool {
        self.buttons_pressed
            .get(button as usize)
            .copied()
            .unwrap_or(false)
    }

    fn mouse_position(&self) -> (i32, i32) {
        self.position
    }

    fn mouse_delta(&self) -> (i32, i32) {
        self.delta
    }

    fn next_frame(&mut self) {
        self.keys_pressed = [false; KEY_COUNT];
        self.buttons_pressed = [false; BUTTON_COUNT];
        self.delta = (0, 0);
    }
}

/// Cloneable handle over a [`BufferedInput`] shared between the host's
/// event pump and the runtime. The pump keeps one clone and feeds
/// transitions; the runtime owns another as its [`InputSource`].
#[derive(Clone, Default)]
pub struct SharedInput {
    inner: Arc<Mutex<BufferedInput>>,
}

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferedInput> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn key_down(&self, keycode: u32) {
        self.lock().key_down(keycode);
    }

    pub fn key_up(&self, keycode: u32) {
        self.lock().key_up(keycode);
    }

    pub fn mouse_button_down(&self, button: u32) {
        self.lock().mouse_button_down(button);
    }

    pub fn mouse_button_up(&self, button: u32) {
        self.lock().mouse_button_up(button);
    }

    pub fn set_mouse_position(&self, x: i32, y: i32) {
        self.lock().set_mouse_position(x, y);
    }
}

impl InputSource for SharedInput {
    fn is_key_down(&self, keycode: u32) -> bool {
        self.lock().is_key_down(keycode)
    }

    fn is_key_pressed(&self, keycode: u32) -> bool {
        self.lock().is_key_pressed(keycode)
    }

    fn is_mouse_button_down(&self, button: u32) -> bool {
        self.lock().is_mouse_button_down(button)
    }

    fn is_mouse_button_pressed(&self, button: u32) -> bool {
        self.lock().is_mouse_button_pressed(button)
    }

    fn mouse_position(&self) -> (i32, i32) {
        self.lock().mouse_position()
    }

    fn mouse_delta(&self) -> (i32, i32) {
        self.lock().mouse_delta()
    }

    fn next_frame(&mut self) {
        self.lock().next_frame();
    }
}
