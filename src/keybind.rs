/// Keys the toggle keybind can bind to. Character keys are stored uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    F(u8),
    Space,
    Tab,
    Enter,
    Escape,
    Backspace,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keybind {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Default for Keybind {
    fn default() -> Self {
        Self {
            key: Key::Char('F'),
            ctrl: false,
            shift: false,
            alt: false,
            meta: true,
        }
    }
}

/// A decoded key event delivered by the embedder. Decoding raw host key
/// events into this shape is outside this crate; only the matching contract
/// lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Keybind {
    /// Whether the event satisfies this binding. Required modifiers must be
    /// held; modifiers the binding does not ask for are ignored.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.key == event.key
            && (!self.ctrl || event.ctrl)
            && (!self.shift || event.shift)
            && (!self.alt || event.alt)
            && (!self.meta || event.meta)
    }
}

/// Parse a keybind string like "Cmd+F" or "Ctrl+Shift+Space" into a
/// [`Keybind`].
pub fn parse_keybind(s: &str) -> Option<Keybind> {
    let mut ctrl = false;
    let mut shift = false;
    let mut alt = false;
    let mut meta = false;
    let mut key: Option<Key> = None;

    for part in s.split('+') {
        let upper = part.trim().to_ascii_uppercase();
        match upper.as_str() {
            "CTRL" | "CONTROL" => ctrl = true,
            "SHIFT" => shift = true,
            "ALT" | "OPTION" => alt = true,
            "CMD" | "META" | "SUPER" | "WIN" => meta = true,
            "" => {}
            _ => {
                if let Some(k) = parse_key(&upper) {
                    key = Some(k);
                } else {
                    return None;
                }
            }
        }
    }

    key.map(|k| Keybind {
        key: k,
        ctrl,
        shift,
        alt,
        meta,
    })
}

fn parse_key(upper: &str) -> Option<Key> {
    match upper {
        "SPACE" => Some(Key::Space),
        "TAB" => Some(Key::Tab),
        "ENTER" | "RETURN" => Some(Key::Enter),
        "ESC" | "ESCAPE" => Some(Key::Escape),
        "BACKSPACE" => Some(Key::Backspace),
        "DELETE" => Some(Key::Delete),
        "HOME" => Some(Key::Home),
        "END" => Some(Key::End),
        "PAGEUP" => Some(Key::PageUp),
        "PAGEDOWN" => Some(Key::PageDown),
        "LEFT" | "LEFTARROW" => Some(Key::Left),
        "RIGHT" | "RIGHTARROW" => Some(Key::Right),
        "UP" | "UPARROW" => Some(Key::Up),
        "DOWN" | "DOWNARROW" => Some(Key::Down),
        _ if upper.len() > 1 && upper.starts_with('F') => match upper[1..].parse::<u8>() {
            Ok(n) if (1..=12).contains(&n) => Some(Key::F(n)),
            _ => None,
        },
        _ if upper.len() == 1 => {
            let c = upper.chars().next()?;
            if c.is_ascii_alphanumeric() {
                Some(Key::Char(c))
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(key: Key, ctrl: bool, shift: bool, alt: bool, meta: bool) -> KeyEvent {
        KeyEvent {
            key,
            ctrl,
            shift,
            alt,
            meta,
        }
    }

    #[test]
    fn parses_cmd_f() {
        let kb = parse_keybind("Cmd+F").expect("keybind");
        assert_eq!(kb.key, Key::Char('F'));
        assert!(kb.meta);
        assert!(!kb.ctrl);
        assert!(kb.matches(&event(Key::Char('F'), false, false, false, true)));
        assert!(!kb.matches(&event(Key::Char('F'), false, false, false, false)));
    }

    #[test]
    fn parses_modifier_combos_and_function_keys() {
        let kb = parse_keybind("Ctrl+Shift+Space").expect("keybind");
        assert!(kb.ctrl && kb.shift && !kb.alt && !kb.meta);
        assert_eq!(kb.key, Key::Space);

        assert_eq!(parse_keybind("F2").map(|k| k.key), Some(Key::F(2)));
        assert_eq!(parse_keybind("f13"), None);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_keybind(""), None);
        assert_eq!(parse_keybind("Ctrl+"), None);
        assert_eq!(parse_keybind("Ctrl+Banana"), None);
    }

    #[test]
    fn extra_modifiers_are_ignored() {
        let kb = parse_keybind("F2").expect("keybind");
        assert!(kb.matches(&event(Key::F(2), true, false, false, false)));
    }
}
