use crate::domain::NowProvider;
use crate::domain::focus_guard::{DistractionKind, FocusGuard, GuardEffect, GuardSnapshot, Transition};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const BLINK_PERIOD: Duration = Duration::from_secs(1);

/// The surface the guard decorates: a window title and a leave-page prompt.
/// Hosts remember the title they had before the guard first touched it.
pub trait GuardHost: Send + Sync {
    fn set_title(&self, title: &str);
    fn restore_title(&self);
    fn set_unload_prompt(&self, enabled: bool);
}

pub trait DistractionListener: Send + Sync {
    fn on_distraction(&self, _kind: DistractionKind, _seconds: i64) {}
    fn on_returned(&self) {}
}

struct GuardShared {
    guard: Mutex<FocusGuard>,
    host: Arc<dyn GuardHost>,
    listener: Option<Arc<dyn DistractionListener>>,
}

impl GuardShared {
    fn step<F>(&self, input: F) -> Option<Transition>
    where
        F: FnOnce(&FocusGuard) -> Transition,
    {
        let mut guard = self.guard.lock().ok()?;
        let transition = input(&*guard);
        *guard = transition.guard;
        Some(transition)
    }
}

/// Runs a [`FocusGuard`] against a host. Each instance owns its own counters;
/// dropping it stops the blinker and hands the title back.
pub struct GuardRuntime {
    shared: Arc<GuardShared>,
    blinker: Mutex<Option<JoinHandle<()>>>,
    now_provider: NowProvider,
}

impl GuardRuntime {
    pub fn new(host: Arc<dyn GuardHost>) -> Self {
        Self {
            shared: Arc::new(GuardShared {
                guard: Mutex::new(FocusGuard::new()),
                host,
                listener: None,
            }),
            blinker: Mutex::new(None),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn DistractionListener>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.listener = Some(listener);
        }
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        self.shared
            .guard
            .lock()
            .map(|guard| guard.snapshot())
            .unwrap_or_else(|poisoned| poisoned.into_inner().snapshot())
    }

    pub fn set_active(&self, active: bool) {
        let at = self.now();
        self.drive(|guard| guard.set_active(active, at));
    }

    pub fn visibility_changed(&self, visible: bool) {
        let at = self.now();
        self.drive(|guard| guard.visibility_changed(visible, at));
    }

    pub fn window_blurred(&self) {
        let at = self.now();
        self.drive(|guard| guard.window_blurred(at));
    }

    pub fn window_focused(&self) {
        let at = self.now();
        self.drive(|guard| guard.window_focused(at));
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    fn drive<F>(&self, input: F)
    where
        F: FnOnce(&FocusGuard) -> Transition,
    {
        let Some(transition) = self.shared.step(input) else {
            return;
        };
        for effect in transition.effects {
            match effect {
                GuardEffect::StartBlinking => self.start_blinking(),
                GuardEffect::StopBlinking => self.stop_blinking(),
                other => perform(&self.shared, other),
            }
        }
    }

    fn start_blinking(&self) {
        let Ok(mut blinker) = self.blinker.lock() else {
            return;
        };
        if let Some(previous) = blinker.take() {
            previous.abort();
        }
        *blinker = Some(tokio::spawn(run_blinker(Arc::clone(&self.shared))));
    }

    fn stop_blinking(&self) {
        if let Ok(mut blinker) = self.blinker.lock() {
            if let Some(handle) = blinker.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for GuardRuntime {
    fn drop(&mut self) {
        self.stop_blinking();
        if self.snapshot().is_active {
            self.shared.host.restore_title();
            self.shared.host.set_unload_prompt(false);
        }
    }
}

fn perform(shared: &GuardShared, effect: GuardEffect) {
    match effect {
        GuardEffect::SetTitle(title) => shared.host.set_title(title),
        GuardEffect::RestoreTitle => shared.host.restore_title(),
        GuardEffect::UnloadPrompt(enabled) => shared.host.set_unload_prompt(enabled),
        GuardEffect::Distraction { kind, seconds } => {
            if let Some(listener) = shared.listener.as_ref() {
                listener.on_distraction(kind, seconds);
            }
        }
        GuardEffect::Returned => {
            if let Some(listener) = shared.listener.as_ref() {
                listener.on_returned();
            }
        }
        GuardEffect::StartBlinking | GuardEffect::StopBlinking => {}
    }
}

async fn run_blinker(shared: Arc<GuardShared>) {
    let mut interval = tokio::time::interval_at(Instant::now() + BLINK_PERIOD, BLINK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(transition) = shared.step(FocusGuard::title_tick) else {
            return;
        };
        if transition.effects.is_empty() {
            return;
        }
        for effect in transition.effects {
            perform(&shared, effect);
        }
    }
}
