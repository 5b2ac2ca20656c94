//! Input event translation
//!
//! Clients send input with toolkit-level codes (event ids, modifier masks,
//! virtual key codes). The engine wants its own event structs with native key
//! codes. The parts that differ per OS live in [`crate::platform`]; everything
//! shared lives here.

use serde::{Deserialize, Serialize};

/// Codes used by clients on the wire
pub mod codes {
    pub const KEY_TYPED: i32 = 400;
    pub const KEY_PRESSED: i32 = 401;
    pub const KEY_RELEASED: i32 = 402;

    pub const MOUSE_PRESSED: i32 = 501;
    pub const MOUSE_RELEASED: i32 = 502;
    pub const MOUSE_MOVED: i32 = 503;
    pub const MOUSE_ENTERED: i32 = 504;
    pub const MOUSE_EXITED: i32 = 505;
    pub const MOUSE_DRAGGED: i32 = 506;

    pub const BUTTON1: i32 = 1;
    pub const BUTTON2: i32 = 2;
    pub const BUTTON3: i32 = 3;

    pub const SHIFT_DOWN_MASK: i32 = 1 << 6;
    pub const CTRL_DOWN_MASK: i32 = 1 << 7;
    pub const META_DOWN_MASK: i32 = 1 << 8;
    pub const ALT_DOWN_MASK: i32 = 1 << 9;
    pub const BUTTON1_DOWN_MASK: i32 = 1 << 10;
    pub const BUTTON2_DOWN_MASK: i32 = 1 << 11;
    pub const BUTTON3_DOWN_MASK: i32 = 1 << 12;

    pub const WHEEL_UNIT_SCROLL: i32 = 0;

    pub const VK_BACK_SPACE: i32 = 8;
    pub const VK_TAB: i32 = 9;
    pub const VK_ENTER: i32 = 10;
    pub const VK_CLEAR: i32 = 12;
    pub const VK_SHIFT: i32 = 16;
    pub const VK_CONTROL: i32 = 17;
    pub const VK_ALT: i32 = 18;
    pub const VK_ESCAPE: i32 = 27;
    pub const VK_PAGE_UP: i32 = 33;
    pub const VK_PAGE_DOWN: i32 = 34;
    pub const VK_END: i32 = 35;
    pub const VK_HOME: i32 = 36;
    pub const VK_LEFT: i32 = 37;
    pub const VK_UP: i32 = 38;
    pub const VK_RIGHT: i32 = 39;
    pub const VK_DOWN: i32 = 40;
    pub const VK_A: i32 = 65;
    pub const VK_Z: i32 = 90;
    pub const VK_F1: i32 = 112;
    pub const VK_F12: i32 = 123;
    pub const VK_DELETE: i32 = 127;
}

/// Engine modifier flags
pub mod flags {
    pub const SHIFT_DOWN: u32 = 1 << 1;
    pub const CONTROL_DOWN: u32 = 1 << 2;
    pub const ALT_DOWN: u32 = 1 << 3;
    pub const LEFT_MOUSE_BUTTON: u32 = 1 << 4;
    pub const MIDDLE_MOUSE_BUTTON: u32 = 1 << 5;
    pub const RIGHT_MOUSE_BUTTON: u32 = 1 << 6;
    pub const COMMAND_DOWN: u32 = 1 << 7;
}

/// Key event as received from the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawKeyEvent {
    pub event_type: i32,
    pub modifiers: i32,
    pub key_char: u16,
    pub scan_code: i64,
    pub key_code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMouseEvent {
    pub event_type: i32,
    pub x: i32,
    pub y: i32,
    pub modifiers: i32,
    pub click_count: i32,
    pub button: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWheelEvent {
    pub scroll_type: i32,
    pub x: i32,
    pub y: i32,
    pub modifiers: i32,
    pub delta: i32,
    pub units_to_scroll: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    RawKeyDown,
    KeyUp,
    Char,
}

/// Key event in engine terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub modifiers: u32,
    pub windows_key_code: i32,
    pub native_key_code: i32,
    pub is_system_key: bool,
    pub character: u16,
    pub unmodified_character: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEvent {
    Click {
        x: i32,
        y: i32,
        modifiers: u32,
        button: MouseButton,
        mouse_up: bool,
        click_count: i32,
    },
    Move {
        x: i32,
        y: i32,
        modifiers: u32,
        leave: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub x: i32,
    pub y: i32,
    pub modifiers: u32,
    pub delta_x: f64,
    pub delta_y: f64,
}

/// Converts client input into engine input
///
/// One implementation per target OS, see [`crate::platform::native_translator`].
pub trait InputTranslator: Send + Sync {
    /// `None` when the event cannot be expressed for the engine
    fn key_event(&self, raw: &RawKeyEvent) -> Option<KeyEvent>;

    fn mouse_event(&self, raw: &RawMouseEvent) -> Option<MouseEvent> {
        translate_mouse(raw)
    }

    fn wheel_event(&self, raw: &RawWheelEvent) -> WheelEvent {
        translate_wheel(raw, false)
    }
}

pub fn engine_modifiers(raw: i32) -> u32 {
    const TABLE: [(i32, u32); 7] = [
        (codes::ALT_DOWN_MASK, flags::ALT_DOWN),
        (codes::BUTTON1_DOWN_MASK, flags::LEFT_MOUSE_BUTTON),
        (codes::BUTTON2_DOWN_MASK, flags::MIDDLE_MOUSE_BUTTON),
        (codes::BUTTON3_DOWN_MASK, flags::RIGHT_MOUSE_BUTTON),
        (codes::CTRL_DOWN_MASK, flags::CONTROL_DOWN),
        (codes::META_DOWN_MASK, flags::COMMAND_DOWN),
        (codes::SHIFT_DOWN_MASK, flags::SHIFT_DOWN),
    ];
    TABLE
        .iter()
        .filter(|(mask, _)| raw & mask != 0)
        .fold(0, |acc, (_, flag)| acc | flag)
}

pub fn key_event_kind(event_type: i32) -> Option<KeyEventKind> {
    match event_type {
        codes::KEY_PRESSED => Some(KeyEventKind::RawKeyDown),
        codes::KEY_RELEASED => Some(KeyEventKind::KeyUp),
        codes::KEY_TYPED => Some(KeyEventKind::Char),
        _ => None,
    }
}

/// Windows virtual-key code for a client key code
///
/// Client key codes match Windows codes for letters, digits, arrows and
/// function keys; only a few differ.
pub fn windows_key_code(key_code: i32) -> i32 {
    match key_code {
        codes::VK_ENTER => 0x0D,
        codes::VK_DELETE => 0x2E,
        other => other,
    }
}

pub(crate) fn translate_mouse(raw: &RawMouseEvent) -> Option<MouseEvent> {
    let modifiers = engine_modifiers(raw.modifiers);
    match raw.event_type {
        codes::MOUSE_PRESSED | codes::MOUSE_RELEASED => {
            let button = match raw.button {
                codes::BUTTON1 => MouseButton::Left,
                codes::BUTTON2 => MouseButton::Middle,
                codes::BUTTON3 => MouseButton::Right,
                _ => return None,
            };
            Some(MouseEvent::Click {
                x: raw.x,
                y: raw.y,
                modifiers,
                button,
                mouse_up: raw.event_type == codes::MOUSE_RELEASED,
                click_count: raw.click_count,
            })
        }
        codes::MOUSE_MOVED | codes::MOUSE_DRAGGED | codes::MOUSE_ENTERED | codes::MOUSE_EXITED => {
            Some(MouseEvent::Move {
                x: raw.x,
                y: raw.y,
                modifiers,
                leave: raw.event_type == codes::MOUSE_EXITED,
            })
        }
        _ => None,
    }
}

pub(crate) fn translate_wheel(raw: &RawWheelEvent, invert_vertical: bool) -> WheelEvent {
    let modifiers = engine_modifiers(raw.modifiers);
    let delta = if raw.scroll_type == codes::WHEEL_UNIT_SCROLL {
        raw.units_to_scroll
    } else {
        raw.delta
    } as f64;

    let (delta_x, delta_y) = if modifiers & flags::SHIFT_DOWN != 0 {
        (delta, 0.0)
    } else if invert_vertical {
        (0.0, -delta)
    } else {
        (0.0, delta)
    };

    WheelEvent {
        x: raw.x,
        y: raw.y,
        modifiers,
        delta_x,
        delta_y,
    }
}
