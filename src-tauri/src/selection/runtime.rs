// Single event loop for the orchestrator.
//
// Every input (hook events, window lifecycle, timers, stream output, UI
// commands) becomes a `ServiceMsg` on one unbounded channel, drained in order
// by a dedicated thread that owns the `SelectionService`.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::service::SelectionService;
use super::timers::{TimerId, TimerKind};
use super::{ActionItem, SelectionError};
use crate::completion::StreamEvent;
use crate::config::SettingsConfig;
use crate::geometry::Size;
use crate::selection_hook::HookEvent;
use crate::window::{ResultOptions, WindowId, WindowKind};

const QUIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq)]
pub enum WindowEventKind {
    /// Page finished loading
    Ready,
    Blurred,
    /// New logical size
    Resized(Size),
    Destroyed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowEvent {
    pub id: WindowId,
    pub kind: WindowKind,
    pub event: WindowEventKind,
}

/// UI-initiated operations
#[derive(Debug)]
pub enum Command {
    HideToolbar,
    WriteToClipboard {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    DetermineToolbarSize {
        width: f64,
        height: f64,
    },
    ProcessAction(ActionItem),
    CloseActionWindow(WindowId),
    MinimizeActionWindow(WindowId),
    PinActionWindow {
        id: WindowId,
        pinned: bool,
    },
    RequestSelection,
    ToggleEnabled {
        enabled: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    OpenResult(ResultOptions),
    CloseResult,
    UpdateResult(String),
    /// Tear down; the reply fires once cleanup is done.
    Quit { reply: oneshot::Sender<()> },
}

#[derive(Debug)]
pub enum ServiceMsg {
    Hook(HookEvent),
    Window(WindowEvent),
    TimerFired { id: TimerId, kind: TimerKind },
    RefillPool,
    ConfigChanged(SettingsConfig),
    Stream { window: WindowId, event: StreamEvent },
    Command(Command),
}

#[derive(Clone)]
pub struct ServiceSender(mpsc::UnboundedSender<ServiceMsg>);

impl ServiceSender {
    /// Returns `false` once the service loop has exited.
    pub fn send(&self, msg: ServiceMsg) -> bool {
        match self.0.send(msg) {
            Ok(()) => true,
            Err(e) => {
                debug!("Selection service gone, dropped {:?}", e.0);
                false
            }
        }
    }
}

pub fn channel() -> (ServiceSender, mpsc::UnboundedReceiver<ServiceMsg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ServiceSender(tx), rx)
}

/// Guarantees at most one live orchestrator. Owned by the bootstrap.
#[derive(Clone, Default)]
pub struct InstanceSlot {
    taken: Arc<AtomicBool>,
}

impl InstanceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self) -> Result<InstanceClaim, SelectionError> {
        if self
            .taken
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SelectionError::AlreadyRunning);
        }
        Ok(InstanceClaim {
            taken: self.taken.clone(),
        })
    }

    pub fn is_taken(&self) -> bool {
        self.taken.load(Ordering::SeqCst)
    }
}

/// Releases the slot on drop.
#[derive(Debug)]
pub struct InstanceClaim {
    taken: Arc<AtomicBool>,
}

impl Drop for InstanceClaim {
    fn drop(&mut self) {
        self.taken.store(false, Ordering::SeqCst);
    }
}

/// Run the service on its own thread until `Quit` or until every sender is gone.
pub fn spawn(
    mut service: SelectionService,
    mut receiver: mpsc::UnboundedReceiver<ServiceMsg>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("selection-service".into())
        .spawn(move || {
            info!("Selection service loop started");
            while let Some(msg) = receiver.blocking_recv() {
                if let ControlFlow::Break(()) = service.handle(msg) {
                    break;
                }
            }
            info!("Selection service loop exited");
        })
}

/// Cloneable front door used by the Tauri commands.
#[derive(Clone)]
pub struct SelectionHandle {
    sender: ServiceSender,
}

impl SelectionHandle {
    pub fn new(sender: ServiceSender) -> Self {
        Self { sender }
    }

    pub fn sender(&self) -> &ServiceSender {
        &self.sender
    }

    fn command(&self, command: Command) -> Result<(), SelectionError> {
        if self.sender.send(ServiceMsg::Command(command)) {
            Ok(())
        } else {
            Err(SelectionError::ServiceGone)
        }
    }

    pub fn hide_toolbar(&self) -> Result<(), SelectionError> {
        self.command(Command::HideToolbar)
    }

    pub async fn write_to_clipboard(&self, text: String) -> Result<bool, SelectionError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::WriteToClipboard { text, reply })?;
        rx.await.map_err(|_| SelectionError::ServiceGone)
    }

    pub fn determine_toolbar_size(&self, width: f64, height: f64) -> Result<(), SelectionError> {
        self.command(Command::DetermineToolbarSize { width, height })
    }

    pub fn process_action(&self, item: ActionItem) -> Result<(), SelectionError> {
        self.command(Command::ProcessAction(item))
    }

    pub fn close_action_window(&self, id: WindowId) -> Result<(), SelectionError> {
        self.command(Command::CloseActionWindow(id))
    }

    pub fn minimize_action_window(&self, id: WindowId) -> Result<(), SelectionError> {
        self.command(Command::MinimizeActionWindow(id))
    }

    pub fn pin_action_window(&self, id: WindowId, pinned: bool) -> Result<(), SelectionError> {
        self.command(Command::PinActionWindow { id, pinned })
    }

    pub fn request_selection(&self) -> Result<(), SelectionError> {
        self.command(Command::RequestSelection)
    }

    /// Flip (or set) the feature; resolves to the new state.
    pub async fn toggle_enabled(&self, enabled: Option<bool>) -> Result<bool, SelectionError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::ToggleEnabled { enabled, reply })?;
        rx.await.map_err(|_| SelectionError::ServiceGone)
    }

    pub fn open_result(&self, options: ResultOptions) -> Result<(), SelectionError> {
        self.command(Command::OpenResult(options))
    }

    pub fn close_result(&self) -> Result<(), SelectionError> {
        self.command(Command::CloseResult)
    }

    pub fn update_result(&self, text: String) -> Result<(), SelectionError> {
        self.command(Command::UpdateResult(text))
    }

    pub fn config_changed(&self, settings: SettingsConfig) {
        self.sender.send(ServiceMsg::ConfigChanged(settings));
    }

    /// Ask the service to tear down and block until it has, or until `wait`
    /// runs out. Returns whether cleanup was confirmed.
    ///
    /// Called from the exit handler on the main thread, so it cannot await.
    pub fn quit(&self, wait: Duration) -> bool {
        let (reply, mut rx) = oneshot::channel();
        if self.command(Command::Quit { reply }).is_err() {
            return false;
        }

        let deadline = Instant::now() + wait;
        loop {
            match rx.try_recv() {
                Ok(()) => return true,
                Err(TryRecvError::Closed) => return false,
                Err(TryRecvError::Empty) if Instant::now() >= deadline => {
                    warn!("Selection service did not confirm quit within {:?}", wait);
                    return false;
                }
                Err(TryRecvError::Empty) => thread::sleep(QUIT_POLL_INTERVAL),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_slot_allows_one_claim() {
        let slot = InstanceSlot::new();
        let claim = slot.claim().unwrap();
        assert!(slot.is_taken());
        assert!(matches!(slot.claim(), Err(SelectionError::AlreadyRunning)));

        drop(claim);
        assert!(!slot.is_taken());
        assert!(slot.claim().is_ok());
    }

    #[test]
    fn test_handle_reports_gone_service() {
        let (sender, receiver) = channel();
        drop(receiver);
        let handle = SelectionHandle::new(sender);
        assert!(matches!(handle.hide_toolbar(), Err(SelectionError::ServiceGone)));
        assert!(!handle.quit(Duration::from_millis(50)));
    }

    #[test]
    fn test_quit_waits_for_service_cleanup() {
        let (sender, mut receiver) = channel();
        let handle = SelectionHandle::new(sender);

        let service = thread::spawn(move || match receiver.blocking_recv() {
            Some(ServiceMsg::Command(Command::Quit { reply })) => {
                thread::sleep(Duration::from_millis(20));
                let _ = reply.send(());
            }
            other => panic!("expected quit, got {:?}", other),
        });

        assert!(handle.quit(Duration::from_secs(5)));
        service.join().unwrap();
    }

    #[test]
    fn test_quit_gives_up_after_wait() {
        let (sender, _receiver) = channel();
        let handle = SelectionHandle::new(sender);
        let started = Instant::now();
        assert!(!handle.quit(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
