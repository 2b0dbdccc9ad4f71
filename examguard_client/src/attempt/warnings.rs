use serde::{Deserialize, Serialize};

use crate::cloud_reporter::ActionType;

/// Warning shown to the student after a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheatingWarning {
    pub warning_count: u32,
    pub max_warnings: u32,
    pub action_type: ActionType,
    pub remaining_warnings: u32,
}

/// Where a new warning count comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    /// Count confirmed by the attempt backend.
    Server(u32),
    /// Backend unreachable, count locally.
    LocalIncrement,
}

/// Single place where server and local counts are folded into the
/// in-memory counter. The result never decreases and never exceeds `max`.
pub fn reconcile(source: CountSource, current: u32, max: u32) -> u32 {
    let proposed = match source {
        CountSource::Server(count) => count.max(current),
        CountSource::LocalIncrement => current.saturating_add(1),
    };
    proposed.min(max)
}

pub fn remaining_warnings(count: u32, max: u32) -> u32 {
    max.saturating_sub(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Monitoring { count: u32 },
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Warning(CheatingWarning),
    AutoSubmit,
    /// Nothing to emit, the attempt already auto-submitted.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct WarningCounter {
    count: u32,
    max: u32,
    auto_submit_fired: bool,
}

impl WarningCounter {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max, auto_submit_fired: false }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        remaining_warnings(self.count, self.max)
    }

    pub fn should_auto_submit(&self) -> bool {
        self.count >= self.max
    }

    pub fn state(&self) -> AttemptState {
        if self.should_auto_submit() {
            AttemptState::Exhausted
        } else {
            AttemptState::Monitoring { count: self.count }
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.auto_submit_fired = false;
    }

    /// Loads the count an attempt already had on the backend.
    pub fn resume(&mut self, server_count: u32) -> Transition {
        self.reset();
        self.count = reconcile(CountSource::Server(server_count), 0, self.max);
        self.fire_if_exhausted(None)
    }

    pub fn apply(&mut self, source: CountSource, action: ActionType) -> Transition {
        if self.auto_submit_fired {
            return Transition::Ignored;
        }
        self.count = reconcile(source, self.count, self.max);
        self.fire_if_exhausted(Some(action))
    }

    /// Jumps straight to `Exhausted`.
    pub fn saturate(&mut self) -> Transition {
        if self.auto_submit_fired {
            return Transition::Ignored;
        }
        self.count = self.max;
        self.fire_if_exhausted(None)
    }

    fn fire_if_exhausted(&mut self, action: Option<ActionType>) -> Transition {
        if self.should_auto_submit() {
            self.auto_submit_fired = true;
            return Transition::AutoSubmit;
        }
        match action {
            Some(action_type) => Transition::Warning(CheatingWarning {
                warning_count: self.count,
                max_warnings: self.max,
                action_type,
                remaining_warnings: self.remaining(),
            }),
            None => Transition::Ignored,
        }
    }
}
