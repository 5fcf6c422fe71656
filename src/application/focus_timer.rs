use crate::application::session_recorder::{RecorderMessage, SessionRecorder};
use crate::domain::NowProvider;
use crate::domain::models::{TimerMode, TimerSettings};
use crate::domain::timer::{Countdown, TickOutcome, TimerEvent, TimerSnapshot};
use crate::infrastructure::api_client::FocusFlowApi;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const TICK_PERIOD: Duration = Duration::from_secs(1);

struct TimerShared {
    countdown: Mutex<Countdown>,
    snapshot_tx: watch::Sender<TimerSnapshot>,
    recorder_tx: mpsc::UnboundedSender<RecorderMessage>,
    now_provider: NowProvider,
}

impl TimerShared {
    fn lock(&self) -> Result<MutexGuard<'_, Countdown>, InfraError> {
        self.countdown
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("timer lock poisoned: {error}")))
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    fn publish(&self, countdown: &Countdown, events: Vec<TimerEvent>) {
        self.snapshot_tx.send_replace(countdown.snapshot());
        for event in events {
            let _ = self.recorder_tx.send(RecorderMessage::Event(event));
        }
    }
}

/// Drives a [`Countdown`] on the tokio clock. At most one ticker task exists
/// at a time, and every transition is forwarded to the session recorder.
///
/// All methods must be called from inside a tokio runtime.
pub struct FocusTimer {
    shared: Arc<TimerShared>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    recorder: Option<JoinHandle<()>>,
}

impl FocusTimer {
    /// Builds a timer whose transitions go to `messages`. Use
    /// [`FocusTimer::with_recorder`] for the usual wiring.
    pub fn new(settings: TimerSettings) -> (Self, mpsc::UnboundedReceiver<RecorderMessage>) {
        let countdown = Countdown::new(settings);
        let (snapshot_tx, _) = watch::channel(countdown.snapshot());
        let (recorder_tx, messages) = mpsc::unbounded_channel();
        let timer = Self {
            shared: Arc::new(TimerShared {
                countdown: Mutex::new(countdown),
                snapshot_tx,
                recorder_tx,
                now_provider: Arc::new(Utc::now),
            }),
            ticker: Mutex::new(None),
            recorder: None,
        };
        (timer, messages)
    }

    pub fn with_recorder<A>(settings: TimerSettings, recorder: SessionRecorder<A>) -> Self
    where
        A: FocusFlowApi + 'static,
    {
        let (mut timer, messages) = Self::new(settings);
        timer.recorder = Some(tokio::spawn(recorder.run(messages)));
        timer
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.now_provider = now_provider;
        }
        self
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Returns `false` when the countdown was already running.
    pub fn start(&self, task_id: Option<i64>) -> Result<bool, InfraError> {
        let mut ticker = self.lock_ticker()?;
        let started = {
            let mut countdown = self.shared.lock()?;
            let events = countdown.start(task_id, self.shared.now());
            let started = !events.is_empty();
            self.shared.publish(&countdown, events);
            started
        };
        if started {
            if let Some(previous) = ticker.take() {
                previous.abort();
            }
            *ticker = Some(tokio::spawn(run_ticker(Arc::clone(&self.shared))));
        }
        Ok(started)
    }

    pub fn pause(&self) -> Result<(), InfraError> {
        self.transition(|countdown, at| countdown.pause(at))
    }

    pub fn reset(&self) -> Result<(), InfraError> {
        self.transition(|countdown, at| countdown.reset(at))
    }

    pub fn switch_mode(&self, mode: TimerMode) -> Result<(), InfraError> {
        self.transition(|countdown, at| countdown.switch_mode(mode, at))
    }

    /// New durations apply immediately only while stopped; a running
    /// countdown keeps its current remaining time.
    pub fn apply_settings(&self, settings: TimerSettings) -> Result<(), InfraError> {
        settings.validate().map_err(InfraError::InvalidInput)?;
        let mut countdown = self.shared.lock()?;
        let _ = self
            .shared
            .recorder_tx
            .send(RecorderMessage::TimerMode(settings.timer_mode.clone()));
        countdown.apply_settings(settings);
        self.shared.publish(&countdown, Vec::new());
        Ok(())
    }

    /// Stops the countdown and waits for the recorder to drain every pending
    /// session request.
    pub async fn shutdown(mut self) {
        self.stop_ticker();
        let recorder = self.recorder.take();
        drop(self);
        if let Some(recorder) = recorder {
            let _ = recorder.await;
        }
    }

    fn transition<F>(&self, apply: F) -> Result<(), InfraError>
    where
        F: FnOnce(&mut Countdown, DateTime<Utc>) -> Vec<TimerEvent>,
    {
        let mut ticker = self.lock_ticker()?;
        if let Some(handle) = ticker.take() {
            handle.abort();
        }
        let mut countdown = self.shared.lock()?;
        let events = apply(&mut countdown, self.shared.now());
        self.shared.publish(&countdown, events);
        Ok(())
    }

    fn lock_ticker(&self) -> Result<MutexGuard<'_, Option<JoinHandle<()>>>, InfraError> {
        self.ticker
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("ticker lock poisoned: {error}")))
    }

    fn stop_ticker(&self) {
        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(handle) = ticker.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for FocusTimer {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

async fn run_ticker(shared: Arc<TimerShared>) {
    let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Ok(mut countdown) = shared.lock() else {
            return;
        };
        match countdown.tick() {
            TickOutcome::Idle => return,
            TickOutcome::Counting(_) => shared.publish(&countdown, Vec::new()),
            TickOutcome::ReachedZero => {
                // Expiry runs under the same lock that observed zero, after the
                // interval is gone, so the next phase never inherits a tick.
                drop(interval);
                let events = countdown.expire(shared.now());
                shared.publish(&countdown, events);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session_recorder::RecorderStatus;
    use crate::application::session_recorder::tests::RecordingApi;
    use crate::infrastructure::activity_log::ActivityLog;
    use std::sync::atomic::Ordering;

    fn one_minute_settings() -> TimerSettings {
        TimerSettings {
            focus_minutes: 1,
            short_break_minutes: 1,
            long_break_minutes: 2,
            cycles_before_long_break: 2,
            timer_mode: "pomodoro".to_string(),
        }
    }

    fn timer_with(api: &Arc<RecordingApi>) -> (FocusTimer, watch::Receiver<RecorderStatus>) {
        let recorder = SessionRecorder::new(
            Arc::clone(api),
            Arc::new(ActivityLog::disabled()),
            "pomodoro",
        );
        let status = recorder.watch_status();
        (FocusTimer::with_recorder(one_minute_settings(), recorder), status)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_once_per_second() {
        let api = Arc::new(RecordingApi::default());
        let (timer, _) = timer_with(&api);
        assert!(timer.start(None).expect("start"));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let snapshot = timer.snapshot();
        assert_eq!(snapshot.seconds_left, 57);
        assert_eq!(snapshot.display, "00:57");
        assert!(snapshot.running);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_does_not_spawn_second_ticker_or_session() {
        let api = Arc::new(RecordingApi::default());
        let (timer, _) = timer_with(&api);
        assert!(timer.start(Some(3)).expect("start"));
        assert!(!timer.start(Some(3)).expect("start again"));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        settle().await;
        assert_eq!(timer.snapshot().seconds_left, 58);
        assert_eq!(api.started_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_remaining_time() {
        let api = Arc::new(RecordingApi::default());
        let (timer, _) = timer_with(&api);
        timer.start(None).expect("start");
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        timer.pause().expect("pause");

        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = timer.snapshot();
        assert_eq!(snapshot.seconds_left, 58);
        assert!(!snapshot.running);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_closes_session_and_advances_to_break() {
        let api = Arc::new(RecordingApi::default());
        let (timer, _) = timer_with(&api);
        timer.start(None).expect("start");

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        settle().await;

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.mode, TimerMode::ShortBreak);
        assert_eq!(snapshot.cycle_count, 1);
        assert_eq!(snapshot.seconds_left, 60);
        assert!(!snapshot.running);

        let ended = api.ended();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].1.duration_minutes, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(timer.snapshot().seconds_left, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_published_as_one_step_into_the_next_phase() {
        let api = Arc::new(RecordingApi::default());
        let (timer, _) = timer_with(&api);
        let mut updates = timer.subscribe();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let collector = {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                while updates.changed().await.is_ok() {
                    let snapshot = updates.borrow_and_update().clone();
                    seen.lock().expect("seen lock").push(snapshot);
                }
            })
        };
        timer.start(None).expect("start");

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        settle().await;
        timer.pause().expect("pause after expiry");
        settle().await;
        collector.abort();

        let seen = seen.lock().expect("seen lock").clone();
        assert!(seen
            .iter()
            .all(|snapshot| snapshot.mode != TimerMode::Focus || snapshot.seconds_left > 0));
        let first_break = seen
            .iter()
            .position(|snapshot| snapshot.mode == TimerMode::ShortBreak)
            .expect("break published");
        assert_eq!(seen[first_break].seconds_left, 60);
        assert_eq!(seen[first_break].cycle_count, 1);
        assert!(!seen[first_break].running);

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.mode, TimerMode::ShortBreak);
        assert_eq!(snapshot.cycle_count, 1);
        assert_eq!(snapshot.seconds_left, 60);
        assert_eq!(api.ended().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_without_open_session_sends_no_close() {
        let api = Arc::new(RecordingApi::default());
        let (timer, _) = timer_with(&api);
        timer.reset().expect("reset");
        settle().await;
        assert!(api.ended().is_empty());
        assert_eq!(timer.snapshot().seconds_left, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_session_start_keeps_countdown_running() {
        let api = Arc::new(RecordingApi::default());
        api.fail_start.store(true, Ordering::SeqCst);
        let (timer, status) = timer_with(&api);
        timer.start(None).expect("start");

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        settle().await;
        assert!(timer.snapshot().running);
        assert_eq!(timer.snapshot().seconds_left, 59);
        assert!(matches!(*status.borrow(), RecorderStatus::Unrecorded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn switching_mode_closes_open_session() {
        let api = Arc::new(RecordingApi::default());
        let (timer, _) = timer_with(&api);
        timer.start(None).expect("start");
        tokio::time::sleep(Duration::from_millis(30_500)).await;
        timer.switch_mode(TimerMode::LongBreak).expect("switch");
        settle().await;

        let ended = api.ended();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].1.duration_minutes, 1);
        let snapshot = timer.snapshot();
        assert_eq!(snapshot.mode, TimerMode::LongBreak);
        assert_eq!(snapshot.seconds_left, 120);
        assert!(!snapshot.running);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_pending_session_requests() {
        let api = Arc::new(RecordingApi::default());
        let (timer, _) = timer_with(&api);
        timer.start(None).expect("start");
        timer.reset().expect("reset");
        timer.shutdown().await;

        assert_eq!(api.started_count(), 1);
        assert_eq!(api.ended().len(), 1);
        assert_eq!(api.ended()[0].1.duration_minutes, 0);
    }

    #[tokio::test]
    async fn settings_apply_only_while_stopped() {
        let (timer, _messages) = FocusTimer::new(TimerSettings::default());
        timer.start(None).expect("start");
        timer
            .apply_settings(one_minute_settings())
            .expect("apply while running");
        assert_eq!(timer.snapshot().seconds_left, 1500);

        timer.reset().expect("reset");
        assert_eq!(timer.snapshot().seconds_left, 60);
    }
}
