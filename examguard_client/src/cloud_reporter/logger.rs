use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the detector saw the student do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Refresh,
    TabSwitch,
    TabClose,
    DevtoolsAccess,
    ViewSource,
    RightClick,
    KeyboardShortcut,
}

/// Violation categories as the attempt backend records them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    PageRefresh,
    TabSwitch,
    TabClose,
    DevtoolsAccess,
    RightClick,
    ViewSource,
    KeyboardShortcut,
}

impl From<ActionType> for ViolationType {
    fn from(action: ActionType) -> Self {
        match action {
            ActionType::Refresh => ViolationType::PageRefresh,
            ActionType::TabSwitch => ViolationType::TabSwitch,
            ActionType::TabClose => ViolationType::TabClose,
            ActionType::DevtoolsAccess => ViolationType::DevtoolsAccess,
            ActionType::ViewSource => ViolationType::ViewSource,
            ActionType::RightClick => ViolationType::RightClick,
            ActionType::KeyboardShortcut => ViolationType::KeyboardShortcut,
        }
    }
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Refresh => "refresh",
            ActionType::TabSwitch => "tab_switch",
            ActionType::TabClose => "tab_close",
            ActionType::DevtoolsAccess => "devtools_access",
            ActionType::ViewSource => "view_source",
            ActionType::RightClick => "right_click",
            ActionType::KeyboardShortcut => "keyboard_shortcut",
        }
    }

    // shown to proctors on the backend dashboard
    pub fn description(&self) -> &'static str {
        match self {
            ActionType::Refresh => "Attempted to refresh the exam page",
            ActionType::TabSwitch => "Switched away from the exam window",
            ActionType::TabClose => "Attempted to close the exam window",
            ActionType::DevtoolsAccess => "Attempted to open developer tools",
            ActionType::ViewSource => "Attempted to view the page source",
            ActionType::RightClick => "Opened the context menu",
            ActionType::KeyboardShortcut => "Used a blocked keyboard shortcut",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationMetadata {
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub original_action: ActionType,
}

/// One violation as POSTed to `/attempts/{id}/cheating-violation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheatingViolation {
    #[serde(rename = "type")]
    pub kind: ViolationType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: ViolationMetadata,
}

impl CheatingViolation {
    pub fn from_action(action: ActionType, user_agent: &str) -> Self {
        let now = Utc::now();
        Self {
            kind: action.into(),
            description: action.description().to_string(),
            timestamp: now,
            metadata: ViolationMetadata {
                user_agent: user_agent.to_string(),
                timestamp: now,
                original_action: action,
            },
        }
    }
}
