use crate::domain::models::{TimerMode, TimerSettings};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Transitions emitted by [`Countdown`]. The session recorder consumes these in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Started {
        mode: TimerMode,
        task_id: Option<i64>,
        at: DateTime<Utc>,
    },
    Paused {
        mode: TimerMode,
        at: DateTime<Utc>,
    },
    Reset {
        mode: TimerMode,
        elapsed_seconds: u32,
        at: DateTime<Utc>,
    },
    Expired {
        mode: TimerMode,
        elapsed_seconds: u32,
        at: DateTime<Utc>,
    },
    ModeChanged {
        from: TimerMode,
        to: TimerMode,
        cycle_count: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Counting(u32),
    ReachedZero,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub mode: TimerMode,
    pub seconds_left: u32,
    pub full_seconds: u32,
    pub running: bool,
    pub cycle_count: u32,
    pub display: String,
}

/// Pure focus/break countdown. No clock, no I/O: callers pass timestamps in
/// and forward the returned events.
#[derive(Debug, Clone)]
pub struct Countdown {
    settings: TimerSettings,
    mode: TimerMode,
    /// Length of the loaded phase. Elapsed time is measured against it, not
    /// against settings that changed mid-phase.
    phase_seconds: u32,
    seconds_left: u32,
    running: bool,
    cycle_count: u32,
}

impl Countdown {
    pub fn new(settings: TimerSettings) -> Self {
        let seconds_left = settings.full_duration_seconds(TimerMode::Focus);
        Self {
            settings,
            mode: TimerMode::Focus,
            phase_seconds: seconds_left,
            seconds_left,
            running: false,
            cycle_count: 0,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn seconds_left(&self) -> u32 {
        self.seconds_left
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    pub fn full_seconds(&self) -> u32 {
        self.phase_seconds
    }

    fn load_phase(&mut self) {
        self.phase_seconds = self.settings.full_duration_seconds(self.mode);
        self.seconds_left = self.phase_seconds;
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            mode: self.mode,
            seconds_left: self.seconds_left,
            full_seconds: self.full_seconds(),
            running: self.running,
            cycle_count: self.cycle_count,
            display: format_time(self.seconds_left),
        }
    }

    pub fn start(&mut self, task_id: Option<i64>, at: DateTime<Utc>) -> Vec<TimerEvent> {
        if self.running {
            return Vec::new();
        }
        if self.seconds_left == 0 {
            self.load_phase();
        }
        self.running = true;
        vec![TimerEvent::Started {
            mode: self.mode,
            task_id,
            at,
        }]
    }

    /// Local suspension only; the remote session stays open.
    pub fn pause(&mut self, at: DateTime<Utc>) -> Vec<TimerEvent> {
        if !self.running {
            return Vec::new();
        }
        self.running = false;
        vec![TimerEvent::Paused { mode: self.mode, at }]
    }

    pub fn reset(&mut self, at: DateTime<Utc>) -> Vec<TimerEvent> {
        let elapsed_seconds = self.phase_seconds.saturating_sub(self.seconds_left);
        self.running = false;
        self.load_phase();
        vec![TimerEvent::Reset {
            mode: self.mode,
            elapsed_seconds,
            at,
        }]
    }

    pub fn switch_mode(&mut self, mode: TimerMode, at: DateTime<Utc>) -> Vec<TimerEvent> {
        let mut events = self.reset(at);
        let from = self.mode;
        self.mode = mode;
        self.load_phase();
        events.push(TimerEvent::ModeChanged {
            from,
            to: mode,
            cycle_count: self.cycle_count,
        });
        events
    }

    /// Advances one second. `ReachedZero` tells the driver to stop ticking and
    /// then call [`Countdown::expire`].
    pub fn tick(&mut self) -> TickOutcome {
        if !self.running {
            return TickOutcome::Idle;
        }
        self.seconds_left = self.seconds_left.saturating_sub(1);
        if self.seconds_left == 0 {
            TickOutcome::ReachedZero
        } else {
            TickOutcome::Counting(self.seconds_left)
        }
    }

    pub fn expire(&mut self, at: DateTime<Utc>) -> Vec<TimerEvent> {
        let finished = self.mode;
        let elapsed_seconds = self.phase_seconds;
        self.running = false;

        let next = match finished {
            TimerMode::Focus => {
                self.cycle_count += 1;
                if self.cycle_count >= self.settings.cycles_before_long_break {
                    self.cycle_count = 0;
                    TimerMode::LongBreak
                } else {
                    TimerMode::ShortBreak
                }
            }
            TimerMode::ShortBreak | TimerMode::LongBreak => TimerMode::Focus,
        };
        self.mode = next;
        self.load_phase();

        vec![
            TimerEvent::Expired {
                mode: finished,
                elapsed_seconds,
                at,
            },
            TimerEvent::ModeChanged {
                from: finished,
                to: next,
                cycle_count: self.cycle_count,
            },
        ]
    }

    /// New durations take effect immediately only while stopped; a running
    /// countdown keeps its remaining time.
    pub fn apply_settings(&mut self, settings: TimerSettings) {
        self.settings = settings;
        if !self.running {
            self.load_phase();
        }
    }
}

pub fn format_time(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn short_settings() -> TimerSettings {
        TimerSettings {
            focus_minutes: 1,
            short_break_minutes: 1,
            long_break_minutes: 2,
            cycles_before_long_break: 4,
            timer_mode: "pomodoro".to_string(),
        }
    }

    fn run_to_expiry(countdown: &mut Countdown) -> Vec<TimerEvent> {
        let _ = countdown.start(None, fixed_time());
        while countdown.tick() != TickOutcome::ReachedZero {}
        countdown.expire(fixed_time())
    }

    #[test]
    fn format_time_pads_minutes_and_seconds() {
        assert_eq!(format_time(65), "01:05");
        assert_eq!(format_time(5), "00:05");
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(1500), "25:00");
    }

    #[test]
    fn start_while_running_emits_nothing() {
        let mut countdown = Countdown::new(short_settings());
        assert_eq!(countdown.start(Some(3), fixed_time()).len(), 1);
        assert!(countdown.start(Some(3), fixed_time()).is_empty());
        assert!(countdown.is_running());
    }

    #[test]
    fn pause_requires_running() {
        let mut countdown = Countdown::new(short_settings());
        assert!(countdown.pause(fixed_time()).is_empty());

        let _ = countdown.start(None, fixed_time());
        let _ = countdown.tick();
        let events = countdown.pause(fixed_time());
        assert_eq!(events.len(), 1);
        assert!(!countdown.is_running());
        assert_eq!(countdown.seconds_left(), 59);
        assert_eq!(countdown.tick(), TickOutcome::Idle);
    }

    #[test]
    fn reset_reports_elapsed_and_restores_full_duration() {
        let mut countdown = Countdown::new(short_settings());
        let _ = countdown.start(None, fixed_time());
        for _ in 0..45 {
            let _ = countdown.tick();
        }
        let events = countdown.reset(fixed_time());
        assert_eq!(
            events,
            vec![TimerEvent::Reset {
                mode: TimerMode::Focus,
                elapsed_seconds: 45,
                at: fixed_time(),
            }]
        );
        assert_eq!(countdown.seconds_left(), 60);
        assert!(!countdown.is_running());
    }

    #[test]
    fn switch_mode_resets_before_changing_mode() {
        let mut countdown = Countdown::new(short_settings());
        let _ = countdown.start(None, fixed_time());
        let _ = countdown.tick();
        let events = countdown.switch_mode(TimerMode::LongBreak, fixed_time());

        assert!(matches!(
            events[0],
            TimerEvent::Reset {
                mode: TimerMode::Focus,
                elapsed_seconds: 1,
                ..
            }
        ));
        assert!(matches!(
            events[1],
            TimerEvent::ModeChanged {
                from: TimerMode::Focus,
                to: TimerMode::LongBreak,
                ..
            }
        ));
        assert_eq!(countdown.seconds_left(), 120);
        assert!(!countdown.is_running());
    }

    #[test]
    fn focus_expiry_goes_to_short_break_then_back_to_focus() {
        let mut countdown = Countdown::new(short_settings());
        let events = run_to_expiry(&mut countdown);
        assert!(matches!(
            events[0],
            TimerEvent::Expired {
                mode: TimerMode::Focus,
                elapsed_seconds: 60,
                ..
            }
        ));
        assert_eq!(countdown.mode(), TimerMode::ShortBreak);
        assert_eq!(countdown.cycle_count(), 1);
        assert!(!countdown.is_running());

        let _ = run_to_expiry(&mut countdown);
        assert_eq!(countdown.mode(), TimerMode::Focus);
        assert_eq!(countdown.cycle_count(), 1);
    }

    #[test]
    fn fourth_focus_expiry_routes_to_long_break() {
        let mut countdown = Countdown::new(short_settings());
        for round in 1..=3 {
            let _ = run_to_expiry(&mut countdown);
            assert_eq!(countdown.mode(), TimerMode::ShortBreak, "round {round}");
            let _ = run_to_expiry(&mut countdown);
        }
        assert_eq!(countdown.cycle_count(), 3);

        let events = run_to_expiry(&mut countdown);
        assert_eq!(countdown.mode(), TimerMode::LongBreak);
        assert_eq!(countdown.cycle_count(), 0);
        assert_eq!(countdown.seconds_left(), 120);
        assert!(matches!(
            events[1],
            TimerEvent::ModeChanged {
                to: TimerMode::LongBreak,
                cycle_count: 0,
                ..
            }
        ));
    }

    #[test]
    fn settings_change_reloads_only_when_stopped() {
        let mut countdown = Countdown::new(short_settings());
        let mut longer = short_settings();
        longer.focus_minutes = 2;
        countdown.apply_settings(longer.clone());
        assert_eq!(countdown.seconds_left(), 120);

        let _ = countdown.start(None, fixed_time());
        let _ = countdown.tick();
        longer.focus_minutes = 3;
        countdown.apply_settings(longer);
        assert_eq!(countdown.seconds_left(), 119);
    }

    #[test]
    fn settings_change_mid_phase_keeps_elapsed_against_running_phase() {
        let mut countdown = Countdown::new(TimerSettings::default());
        let _ = countdown.start(None, fixed_time());
        for _ in 0..100 {
            let _ = countdown.tick();
        }
        countdown.apply_settings(short_settings());
        assert_eq!(countdown.snapshot().full_seconds, 1500);

        let events = countdown.reset(fixed_time());
        assert_eq!(
            events,
            vec![TimerEvent::Reset {
                mode: TimerMode::Focus,
                elapsed_seconds: 100,
                at: fixed_time(),
            }]
        );
        assert_eq!(countdown.seconds_left(), 60);
        assert_eq!(countdown.full_seconds(), 60);
    }

    #[test]
    fn expiry_after_mid_phase_settings_change_reports_phase_length() {
        let mut countdown = Countdown::new(short_settings());
        let _ = countdown.start(None, fixed_time());
        for _ in 0..30 {
            let _ = countdown.tick();
        }
        let mut longer = short_settings();
        longer.focus_minutes = 3;
        countdown.apply_settings(longer);

        while countdown.tick() != TickOutcome::ReachedZero {}
        let events = countdown.expire(fixed_time());
        assert!(matches!(
            events[0],
            TimerEvent::Expired {
                mode: TimerMode::Focus,
                elapsed_seconds: 60,
                ..
            }
        ));
        assert_eq!(countdown.mode(), TimerMode::ShortBreak);
        assert_eq!(countdown.seconds_left(), 60);
    }

    proptest! {
        #[test]
        fn ticks_decrease_by_exactly_one(focus_minutes in 1u32..5u32, ticks in 1usize..600usize) {
            let mut settings = short_settings();
            settings.focus_minutes = focus_minutes;
            let mut countdown = Countdown::new(settings);
            let _ = countdown.start(None, fixed_time());

            let mut previous = countdown.seconds_left();
            for _ in 0..ticks {
                match countdown.tick() {
                    TickOutcome::Counting(left) => {
                        prop_assert_eq!(left + 1, previous);
                        previous = left;
                    }
                    TickOutcome::ReachedZero => {
                        prop_assert_eq!(previous, 1);
                        prop_assert_eq!(countdown.seconds_left(), 0);
                        break;
                    }
                    TickOutcome::Idle => prop_assert!(false, "running countdown reported idle"),
                }
            }
        }

        #[test]
        fn cycle_rule_holds_for_any_threshold(threshold in 1u32..8u32, start_cycle in 0u32..8u32) {
            let mut settings = short_settings();
            settings.cycles_before_long_break = threshold;
            let mut countdown = Countdown::new(settings);
            countdown.cycle_count = start_cycle % threshold;

            let before = countdown.cycle_count;
            let _ = run_to_expiry(&mut countdown);
            if before + 1 >= threshold {
                prop_assert_eq!(countdown.mode(), TimerMode::LongBreak);
                prop_assert_eq!(countdown.cycle_count(), 0);
            } else {
                prop_assert_eq!(countdown.mode(), TimerMode::ShortBreak);
                prop_assert_eq!(countdown.cycle_count(), before + 1);
            }
        }

        #[test]
        fn format_time_round_trips_components(seconds in 0u32..6000u32) {
            let text = format_time(seconds);
            let (minutes, secs) = text.split_once(':').expect("separator");
            prop_assert_eq!(minutes.parse::<u32>().expect("minutes") * 60 + secs.parse::<u32>().expect("seconds"), seconds);
            prop_assert_eq!(secs.len(), 2);
        }
    }
}
