use crate::input::{
    InputTranslator, KeyEvent, RawKeyEvent, RawWheelEvent, WheelEvent, engine_modifiers, flags,
    key_event_kind, translate_wheel, windows_key_code,
};

/// Windows keeps the scan code in the native key code and scrolls "up" with
/// positive wheel deltas.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsTranslator;

impl InputTranslator for WindowsTranslator {
    fn key_event(&self, raw: &RawKeyEvent) -> Option<KeyEvent> {
        let kind = key_event_kind(raw.event_type)?;
        let modifiers = engine_modifiers(raw.modifiers);
        Some(KeyEvent {
            kind,
            modifiers,
            windows_key_code: windows_key_code(raw.key_code),
            // scan code in bits 16..24, repeat count 1
            native_key_code: ((raw.scan_code << 16) | 1) as i32,
            is_system_key: modifiers & flags::ALT_DOWN != 0,
            character: raw.key_char,
            unmodified_character: raw.key_char,
        })
    }

    fn wheel_event(&self, raw: &RawWheelEvent) -> WheelEvent {
        translate_wheel(raw, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyEventKind, codes};

    #[test]
    fn test_scan_code_in_native_code() {
        let event = WindowsTranslator
            .key_event(&RawKeyEvent {
                event_type: codes::KEY_PRESSED,
                modifiers: codes::ALT_DOWN_MASK,
                key_char: 'a' as u16,
                scan_code: 0x1E,
                key_code: 65,
            })
            .unwrap();
        assert_eq!(event.kind, KeyEventKind::RawKeyDown);
        assert_eq!(event.native_key_code, 0x001E_0001);
        assert_eq!(event.windows_key_code, 65);
        assert!(event.is_system_key);
    }

    #[test]
    fn test_vertical_wheel_inverted() {
        let event = WindowsTranslator.wheel_event(&RawWheelEvent {
            scroll_type: 1,
            x: 0,
            y: 0,
            modifiers: 0,
            delta: 120,
            units_to_scroll: 3,
        });
        assert_eq!(event.delta_y, -120.0);
    }
}
