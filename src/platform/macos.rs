use crate::input::{
    InputTranslator, KeyEvent, RawKeyEvent, codes, engine_modifiers, key_event_kind,
    windows_key_code,
};

/// Virtual key code and function-key character for special keys
fn special_key(key_code: i32) -> Option<(i32, u16)> {
    let mapping = match key_code {
        codes::VK_BACK_SPACE => (0x33, 0x08),
        codes::VK_DELETE => (0x75, 0x7F),
        codes::VK_CLEAR => (0x47, 0xF739),
        codes::VK_DOWN => (0x7D, 0xF701),
        codes::VK_ENTER => (0x24, 0x0D),
        codes::VK_ESCAPE => (0x35, 0x1B),
        codes::VK_LEFT => (0x7B, 0xF702),
        codes::VK_RIGHT => (0x7C, 0xF703),
        codes::VK_TAB => (0x30, 0x09),
        codes::VK_UP => (0x7E, 0xF700),
        codes::VK_PAGE_UP => (0x74, 0xF72C),
        codes::VK_PAGE_DOWN => (0x79, 0xF72D),
        codes::VK_HOME => (0x73, 0xF729),
        codes::VK_END => (0x77, 0xF72B),
        f if (codes::VK_F1..=codes::VK_F12).contains(&f) => {
            const F_KEYS: [i32; 12] = [
                0x7A, 0x78, 0x63, 0x76, 0x60, 0x61, 0x62, 0x64, 0x65, 0x6D, 0x67, 0x6F,
            ];
            let n = (f - codes::VK_F1) as usize;
            (F_KEYS[n], 0xF704 + n as u16)
        }
        _ => return None,
    };
    Some(mapping)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MacTranslator;

impl InputTranslator for MacTranslator {
    fn key_event(&self, raw: &RawKeyEvent) -> Option<KeyEvent> {
        let kind = key_event_kind(raw.event_type)?;
        let (native_key_code, unmodified_character) =
            special_key(raw.key_code).unwrap_or((0, raw.key_char));

        Some(KeyEvent {
            kind,
            modifiers: engine_modifiers(raw.modifiers),
            windows_key_code: windows_key_code(raw.key_code),
            native_key_code,
            is_system_key: false,
            character: unmodified_character,
            unmodified_character,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::flags;

    fn pressed(key_code: i32, key_char: u16, modifiers: i32) -> KeyEvent {
        MacTranslator
            .key_event(&RawKeyEvent {
                event_type: codes::KEY_PRESSED,
                modifiers,
                key_char,
                scan_code: 0,
                key_code,
            })
            .unwrap()
    }

    #[test]
    fn test_arrow_keys_use_function_characters() {
        let event = pressed(codes::VK_LEFT, 0xFFFF, 0);
        assert_eq!(event.native_key_code, 0x7B);
        assert_eq!(event.character, 0xF702);
    }

    #[test]
    fn test_backspace_maps_to_delete_key() {
        let event = pressed(codes::VK_BACK_SPACE, 8, 0);
        assert_eq!(event.native_key_code, 0x33);
        assert_eq!(event.unmodified_character, 0x08);
    }

    #[test]
    fn test_meta_is_command() {
        let event = pressed(67, b'c' as u16, codes::META_DOWN_MASK);
        assert_eq!(event.modifiers, flags::COMMAND_DOWN);
        assert_eq!(event.character, b'c' as u16);
        assert!(!event.is_system_key);
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let raw = RawKeyEvent {
            event_type: 0,
            modifiers: 0,
            key_char: 0,
            scan_code: 0,
            key_code: 0,
        };
        assert!(MacTranslator.key_event(&raw).is_none());
    }
}
