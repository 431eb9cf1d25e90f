use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::runtime::{ServiceMsg, ServiceSender};

/// Delay before outside clicks may hide a freshly shown toolbar. The mouse-up
/// that finished the selection would otherwise hide it immediately.
pub const SELF_TRIGGER_SUPPRESSION: Duration = Duration::from_millis(500);

/// Delay before windows made non-focusable during a hide get focusability back.
pub const FOCUSABILITY_RESTORE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    SelfTriggerSuppression,
    FocusabilityRestore,
}

impl TimerKind {
    pub fn duration(&self) -> Duration {
        match self {
            TimerKind::SelfTriggerSuppression => SELF_TRIGGER_SUPPRESSION,
            TimerKind::FocusabilityRestore => FOCUSABILITY_RESTORE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// One-shot timers that report back as `ServiceMsg::TimerFired`.
pub trait Timers: Send {
    fn schedule(&mut self, kind: TimerKind) -> TimerId;
    /// Cancelling an unknown or already fired timer is a no-op.
    fn cancel(&mut self, id: TimerId);
}

pub struct TokioTimers {
    sender: ServiceSender,
    next_id: u64,
    pending: HashMap<TimerId, Arc<AtomicBool>>,
}

impl TokioTimers {
    pub fn new(sender: ServiceSender) -> Self {
        Self {
            sender,
            next_id: 0,
            pending: HashMap::new(),
        }
    }
}

impl Timers for TokioTimers {
    fn schedule(&mut self, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.pending.insert(id, cancelled.clone());

        let sender = self.sender.clone();
        tauri::async_runtime::spawn(async move {
            tokio::time::sleep(kind.duration()).await;
            if !cancelled.load(Ordering::SeqCst) {
                sender.send(ServiceMsg::TimerFired { id, kind });
            }
        });
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(flag) = self.pending.remove(&id) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}
