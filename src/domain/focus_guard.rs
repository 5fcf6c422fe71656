use chrono::{DateTime, Utc};
use serde::Serialize;

pub const FOCUS_TITLE: &str = "Focus Active | FocusFlow";
pub const ALERT_TITLE: &str = "Come back to focus! | FocusFlow";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistractionKind {
    TabSwitch,
    WindowBlur,
}

impl DistractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabSwitch => "tab_switch",
            Self::WindowBlur => "window_blur",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardEffect {
    SetTitle(&'static str),
    RestoreTitle,
    StartBlinking,
    StopBlinking,
    Distraction { kind: DistractionKind, seconds: i64 },
    Returned,
    UnloadPrompt(bool),
}

/// Counters and flags of one guard instance. Counters only grow; a fresh
/// guard starts from zero.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub is_active: bool,
    pub page_visible: bool,
    pub tab_switched: bool,
    pub distracted_since: Option<DateTime<Utc>>,
    pub distraction_kind: Option<DistractionKind>,
    pub distraction_count: u32,
    pub distraction_seconds: i64,
}

impl GuardSnapshot {
    pub fn is_distracted(&self) -> bool {
        self.distracted_since.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub guard: FocusGuard,
    pub effects: Vec<GuardEffect>,
}

/// Attentive/distracted episode machine. Each input returns a new guard value
/// and the effects the host must perform, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusGuard {
    state: GuardSnapshot,
    blink_alert: bool,
}

impl Default for FocusGuard {
    fn default() -> Self {
        Self {
            state: GuardSnapshot {
                is_active: false,
                page_visible: true,
                tab_switched: false,
                distracted_since: None,
                distraction_kind: None,
                distraction_count: 0,
                distraction_seconds: 0,
            },
            blink_alert: false,
        }
    }
}

impl FocusGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        self.state
    }

    pub fn set_active(&self, active: bool, at: DateTime<Utc>) -> Transition {
        let mut next = *self;
        if next.state.is_active == active {
            return next.unchanged();
        }
        next.state.is_active = active;

        if active {
            return Transition {
                guard: next,
                effects: vec![GuardEffect::UnloadPrompt(true), GuardEffect::SetTitle(FOCUS_TITLE)],
            };
        }

        // An episode still open at deactivation keeps its time but fires no callbacks.
        if let Some(since) = next.state.distracted_since.take() {
            next.state.distraction_seconds += elapsed_seconds(since, at);
            next.state.distraction_kind = None;
        }
        next.blink_alert = false;
        Transition {
            guard: next,
            effects: vec![
                GuardEffect::StopBlinking,
                GuardEffect::RestoreTitle,
                GuardEffect::UnloadPrompt(false),
            ],
        }
    }

    pub fn visibility_changed(&self, visible: bool, at: DateTime<Utc>) -> Transition {
        let mut next = *self;
        next.state.page_visible = visible;
        if !visible {
            if next.state.is_active && !next.state.is_distracted() {
                return next.begin_episode(DistractionKind::TabSwitch, at);
            }
            return next.unchanged();
        }
        if next.state.is_distracted() {
            return next.end_episode(at);
        }
        next.unchanged()
    }

    pub fn window_blurred(&self, at: DateTime<Utc>) -> Transition {
        let mut next = *self;
        if next.state.page_visible {
            next.state.tab_switched = true;
            if next.state.is_active && !next.state.is_distracted() {
                return next.begin_episode(DistractionKind::WindowBlur, at);
            }
        }
        next.unchanged()
    }

    pub fn window_focused(&self, at: DateTime<Utc>) -> Transition {
        let mut next = *self;
        next.state.tab_switched = false;
        if next.state.is_distracted() {
            return next.end_episode(at);
        }
        next.unchanged()
    }

    /// One-second blinker tick while distracted.
    pub fn title_tick(&self) -> Transition {
        let mut next = *self;
        if !(next.state.is_active && next.state.is_distracted()) {
            return next.unchanged();
        }
        next.blink_alert = !next.blink_alert;
        let title = if next.blink_alert { ALERT_TITLE } else { FOCUS_TITLE };
        Transition {
            guard: next,
            effects: vec![GuardEffect::SetTitle(title)],
        }
    }

    fn begin_episode(mut self, kind: DistractionKind, at: DateTime<Utc>) -> Transition {
        self.state.distracted_since = Some(at);
        self.state.distraction_kind = Some(kind);
        self.state.distraction_count += 1;
        self.blink_alert = true;
        Transition {
            guard: self,
            effects: vec![GuardEffect::SetTitle(ALERT_TITLE), GuardEffect::StartBlinking],
        }
    }

    fn end_episode(mut self, at: DateTime<Utc>) -> Transition {
        let Some(since) = self.state.distracted_since.take() else {
            return self.unchanged();
        };
        let kind = self
            .state
            .distraction_kind
            .take()
            .unwrap_or(DistractionKind::TabSwitch);
        let seconds = elapsed_seconds(since, at);
        self.state.distraction_seconds += seconds;
        self.blink_alert = false;

        let mut effects = vec![
            GuardEffect::StopBlinking,
            GuardEffect::Distraction { kind, seconds },
            GuardEffect::Returned,
        ];
        effects.push(if self.state.is_active {
            GuardEffect::SetTitle(FOCUS_TITLE)
        } else {
            GuardEffect::RestoreTitle
        });
        Transition {
            guard: self,
            effects,
        }
    }

    fn unchanged(self) -> Transition {
        Transition {
            guard: self,
            effects: Vec::new(),
        }
    }
}

/// Whole seconds elapsed; a partial second does not count.
fn elapsed_seconds(since: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (at - since).num_seconds().max(0)
}
