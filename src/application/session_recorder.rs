use crate::domain::models::{EndSessionRequest, StartSessionRequest, TimerMode};
use crate::domain::timer::TimerEvent;
use crate::infrastructure::activity_log::ActivityLog;
use crate::infrastructure::api_client::FocusFlowApi;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderMessage {
    Event(TimerEvent),
    TimerMode(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecorderStatus {
    Idle,
    Recording { session_id: i64, mode: TimerMode },
    /// The timer runs but the server has no open session for it.
    Unrecorded { error: String },
}

#[derive(Debug, Clone, Copy)]
struct OpenSession {
    id: i64,
    mode: TimerMode,
}

/// Mirrors timer transitions into `/api/focus-sessions`. Network failures are
/// logged and never reach the countdown.
pub struct SessionRecorder<A>
where
    A: FocusFlowApi,
{
    api: Arc<A>,
    log: Arc<ActivityLog>,
    timer_mode: String,
    open: Option<OpenSession>,
    status_tx: watch::Sender<RecorderStatus>,
}

impl<A> SessionRecorder<A>
where
    A: FocusFlowApi,
{
    pub fn new(api: Arc<A>, log: Arc<ActivityLog>, timer_mode: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(RecorderStatus::Idle);
        Self {
            api,
            log,
            timer_mode: timer_mode.into(),
            open: None,
            status_tx,
        }
    }

    pub fn status(&self) -> RecorderStatus {
        self.status_tx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<RecorderStatus> {
        self.status_tx.subscribe()
    }

    pub fn open_session_id(&self) -> Option<i64> {
        self.open.map(|session| session.id)
    }

    /// Processes messages in arrival order until every sender is gone. A
    /// request in flight when the timer goes away still completes, but nothing
    /// after it runs.
    pub async fn run(mut self, mut messages: mpsc::UnboundedReceiver<RecorderMessage>) {
        while let Some(message) = messages.recv().await {
            match message {
                RecorderMessage::Event(event) => self.handle_event(event).await,
                RecorderMessage::TimerMode(mode) => self.timer_mode = mode,
            }
        }
    }

    pub async fn handle_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Started { mode, task_id, at } => {
                if let Some(open) = self.open {
                    self.log.info(
                        "session",
                        &format!("resuming open session_id={} ({})", open.id, open.mode.as_str()),
                    );
                    return;
                }
                let request = StartSessionRequest {
                    task_id,
                    start_time: at.to_rfc3339(),
                    session_type: mode,
                    timer_mode: self.timer_mode.clone(),
                };
                match self.api.start_session(&request).await {
                    Ok(session) => {
                        self.open = Some(OpenSession { id: session.id, mode });
                        self.log.info(
                            "session",
                            &format!("started session_id={} type={}", session.id, mode.as_str()),
                        );
                        self.status_tx.send_replace(RecorderStatus::Recording {
                            session_id: session.id,
                            mode,
                        });
                    }
                    Err(error) => {
                        self.log
                            .error("session", &format!("failed to start session: {error}"));
                        self.status_tx.send_replace(RecorderStatus::Unrecorded {
                            error: error.to_string(),
                        });
                    }
                }
            }
            TimerEvent::Reset {
                elapsed_seconds, at, ..
            }
            | TimerEvent::Expired {
                elapsed_seconds, at, ..
            } => {
                let Some(open) = self.open.take() else {
                    self.status_tx.send_replace(RecorderStatus::Idle);
                    return;
                };
                let request = EndSessionRequest {
                    end_time: at.to_rfc3339(),
                    duration_minutes: duration_minutes(elapsed_seconds),
                };
                match self.api.end_session(open.id, &request).await {
                    Ok(_) => self.log.info(
                        "session",
                        &format!(
                            "closed session_id={} duration_minutes={}",
                            open.id, request.duration_minutes
                        ),
                    ),
                    Err(error) => self.log.error(
                        "session",
                        &format!("failed to close session_id={}: {error}", open.id),
                    ),
                }
                self.status_tx.send_replace(RecorderStatus::Idle);
            }
            TimerEvent::Paused { .. } | TimerEvent::ModeChanged { .. } => {}
        }
    }
}

pub fn duration_minutes(elapsed_seconds: u32) -> i64 {
    (i64::from(elapsed_seconds) + 30) / 60
}
