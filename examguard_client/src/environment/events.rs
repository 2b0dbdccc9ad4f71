use crate::cloud_reporter::ActionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    F5,
    F12,
    Char(char),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    // Cmd on macOS
    pub meta: bool,
}

impl KeyStroke {
    pub fn plain(key: Key) -> Self {
        Self { key, ctrl: false, shift: false, alt: false, meta: false }
    }

    pub fn ctrl(key: Key) -> Self {
        Self { ctrl: true, ..Self::plain(key) }
    }

    pub fn ctrl_shift(key: Key) -> Self {
        Self { ctrl: true, shift: true, ..Self::plain(key) }
    }

    fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Things the exam window can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEvent {
    VisibilityChange { hidden: bool },
    WindowBlur,
    KeyDown(KeyStroke),
    ContextMenu,
    BeforeUnload,
}

/// Maps a keystroke to the violation it represents, if any.
///
/// Every stroke that maps to an action is also suppressed by the window.
pub fn classify_key(stroke: &KeyStroke) -> Option<ActionType> {
    let letter = match stroke.key {
        Key::F5 => return Some(ActionType::Refresh),
        Key::F12 => return Some(ActionType::DevtoolsAccess),
        Key::Char(c) => c.to_ascii_lowercase(),
        Key::Other => return None,
    };

    if !stroke.command() {
        return None;
    }

    match (letter, stroke.shift) {
        ('r', _) => Some(ActionType::Refresh),
        ('i' | 'j' | 'c', true) => Some(ActionType::DevtoolsAccess),
        ('u', false) => Some(ActionType::ViewSource),
        ('p' | 's', false) => Some(ActionType::KeyboardShortcut),
        _ => None,
    }
}
