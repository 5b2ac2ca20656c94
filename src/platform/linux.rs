use crate::input::{
    InputTranslator, KeyEvent, RawKeyEvent, codes, engine_modifiers, flags, key_event_kind,
    windows_key_code,
};

const VKEY_RETURN: i32 = 0x0D;

/// X11 keysym for keys that do not produce a printable character
fn keysym(key_code: i32) -> Option<i32> {
    let sym = match key_code {
        codes::VK_BACK_SPACE => 0xff08,
        codes::VK_TAB => 0xff09,
        codes::VK_CLEAR => 0xff0b,
        codes::VK_ENTER => 0xff0d,
        codes::VK_ESCAPE => 0xff1b,
        codes::VK_HOME => 0xff50,
        codes::VK_LEFT => 0xff51,
        codes::VK_UP => 0xff52,
        codes::VK_RIGHT => 0xff53,
        codes::VK_DOWN => 0xff54,
        codes::VK_PAGE_UP => 0xff55,
        codes::VK_PAGE_DOWN => 0xff56,
        codes::VK_END => 0xff57,
        codes::VK_SHIFT => 0xffe1,
        codes::VK_CONTROL => 0xffe3,
        codes::VK_ALT => 0xffe9,
        codes::VK_DELETE => 0xffff,
        f if (codes::VK_F1..=codes::VK_F12).contains(&f) => 0xffbe + (f - codes::VK_F1),
        _ => return None,
    };
    Some(sym)
}

/// Character produced by ctrl + key
fn control_character(windows_code: i32, unmodified: u16) -> u16 {
    if (codes::VK_A..=codes::VK_Z).contains(&windows_code) {
        (windows_code - codes::VK_A + 1) as u16
    } else {
        unmodified
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxTranslator;

impl InputTranslator for LinuxTranslator {
    fn key_event(&self, raw: &RawKeyEvent) -> Option<KeyEvent> {
        let kind = key_event_kind(raw.event_type)?;
        let modifiers = engine_modifiers(raw.modifiers);
        let windows_key_code = windows_key_code(raw.key_code);

        let native_key_code = keysym(raw.key_code).unwrap_or(raw.key_char as i32);
        let unmodified_character = if windows_key_code == VKEY_RETURN || raw.key_char == b'\n' as u16 {
            b'\r' as u16
        } else {
            raw.key_char
        };
        let character = if modifiers & flags::CONTROL_DOWN != 0 {
            control_character(windows_key_code, unmodified_character)
        } else {
            unmodified_character
        };

        Some(KeyEvent {
            kind,
            modifiers,
            windows_key_code,
            native_key_code,
            is_system_key: modifiers & flags::ALT_DOWN != 0,
            character,
            unmodified_character,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyEventKind, RawWheelEvent};

    fn key(key_code: i32, key_char: u16, modifiers: i32) -> KeyEvent {
        LinuxTranslator
            .key_event(&RawKeyEvent {
                event_type: codes::KEY_TYPED,
                modifiers,
                key_char,
                scan_code: 0,
                key_code,
            })
            .unwrap()
    }

    #[test]
    fn test_enter_is_carriage_return() {
        let event = key(codes::VK_ENTER, b'\n' as u16, 0);
        assert_eq!(event.kind, KeyEventKind::Char);
        assert_eq!(event.native_key_code, 0xff0d);
        assert_eq!(event.windows_key_code, 0x0D);
        assert_eq!(event.character, b'\r' as u16);
        assert_eq!(event.unmodified_character, b'\r' as u16);
    }

    #[test]
    fn test_ctrl_letter_is_control_character() {
        let event = key(67, b'c' as u16, codes::CTRL_DOWN_MASK);
        assert_eq!(event.character, 3);
        assert_eq!(event.unmodified_character, b'c' as u16);
        assert_eq!(event.native_key_code, b'c' as i32);
    }

    #[test]
    fn test_alt_marks_system_key() {
        assert!(key(70, b'f' as u16, codes::ALT_DOWN_MASK).is_system_key);
        assert!(!key(70, b'f' as u16, 0).is_system_key);
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(key(codes::VK_F1, 0, 0).native_key_code, 0xffbe);
        assert_eq!(key(codes::VK_F12, 0, 0).native_key_code, 0xffc9);
    }

    #[test]
    fn test_wheel_not_inverted() {
        let event = LinuxTranslator.wheel_event(&RawWheelEvent {
            scroll_type: 1,
            x: 0,
            y: 0,
            modifiers: 0,
            delta: 2,
            units_to_scroll: 0,
        });
        assert_eq!(event.delta_y, 2.0);
    }
}
