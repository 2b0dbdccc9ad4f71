use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::events::{classify_key, BrowserEvent};
use crate::cloud_reporter::ActionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    VisibilityChange,
    WindowBlur,
    KeyDown,
    ContextMenu,
    BeforeUnload,
}

// attached on start, detached on stop
const EXAM_SCOPED: [Listener; 2] = [Listener::VisibilityChange, Listener::WindowBlur];
// installed once, guarded by the active flag
const GLOBAL: [Listener; 3] = [Listener::KeyDown, Listener::ContextMenu, Listener::BeforeUnload];

impl BrowserEvent {
    pub fn listener(&self) -> Listener {
        match self {
            BrowserEvent::VisibilityChange { .. } => Listener::VisibilityChange,
            BrowserEvent::WindowBlur => Listener::WindowBlur,
            BrowserEvent::KeyDown(_) => Listener::KeyDown,
            BrowserEvent::ContextMenu => Listener::ContextMenu,
            BrowserEvent::BeforeUnload => Listener::BeforeUnload,
        }
    }
}

/// What the window should do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Detection {
    pub action: Option<ActionType>,
    /// Swallow the event (the `preventDefault` of a browser).
    pub suppress: bool,
    /// Ask the student to confirm leaving the exam.
    pub confirm_unload: bool,
}

impl Detection {
    fn ignored() -> Self {
        Self::default()
    }

    fn report(action: ActionType) -> Self {
        Self { action: Some(action), ..Self::default() }
    }

    fn suppressed(action: ActionType) -> Self {
        Self { action: Some(action), suppress: true, confirm_unload: false }
    }
}

/// Watches the exam window for proctoring violations while an attempt is active.
pub struct ViolationDetector {
    active: Arc<AtomicBool>,
    listeners: Mutex<HashSet<Listener>>,
    global_installed: AtomicBool,
    global_installs: AtomicUsize,
}

impl Default for ViolationDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationDetector {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            listeners: Mutex::new(HashSet::new()),
            global_installed: AtomicBool::new(false),
            global_installs: AtomicUsize::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_listening(&self, listener: Listener) -> bool {
        self.listeners().contains(&listener)
    }

    /// How many times the global listeners were actually registered.
    pub fn global_installs(&self) -> usize {
        self.global_installs.load(Ordering::SeqCst)
    }

    pub(crate) fn activate(&self) {
        self.install_global();
        self.listeners().extend(EXAM_SCOPED);
        self.active.store(true, Ordering::SeqCst);
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        let mut listeners = self.listeners();
        for listener in EXAM_SCOPED {
            listeners.remove(&listener);
        }
    }

    fn install_global(&self) {
        if self
            .global_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.listeners().extend(GLOBAL);
            self.global_installs.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("[monitor] global listeners installed");
        }
    }

    /// Classifies an event. Returns an empty detection when nothing is
    /// listening for it or no attempt is active.
    pub fn inspect(&self, event: &BrowserEvent) -> Detection {
        if !self.is_listening(event.listener()) || !self.is_active() {
            return Detection::ignored();
        }

        match event {
            BrowserEvent::VisibilityChange { hidden: true } => Detection::report(ActionType::TabSwitch),
            BrowserEvent::VisibilityChange { hidden: false } => Detection::ignored(),
            BrowserEvent::WindowBlur => Detection::report(ActionType::TabSwitch),
            BrowserEvent::KeyDown(stroke) => classify_key(stroke)
                .map(Detection::suppressed)
                .unwrap_or_else(Detection::ignored),
            BrowserEvent::ContextMenu => Detection::suppressed(ActionType::RightClick),
            BrowserEvent::BeforeUnload => Detection {
                action: Some(ActionType::TabClose),
                suppress: true,
                confirm_unload: true,
            },
        }
    }

    fn listeners(&self) -> MutexGuard<'_, HashSet<Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
