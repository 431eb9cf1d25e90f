use std::ops::ControlFlow;
use tracing::{debug, error, info, warn};

use super::presentation::{Arming, PresentationStrategy};
use super::runtime::{Command, InstanceClaim, InstanceSlot, ServiceMsg, ServiceSender, WindowEvent, WindowEventKind};
use super::timers::{TimerId, TimerKind, Timers};
use super::{preview, ActionItem, SelectionError};
use crate::completion::{CompletionDispatcher, CompletionRequest, StreamEvent};
use crate::config::SettingsConfig;
use crate::geometry::{self, Orientation, Point, Rect, Size};
use crate::selection_hook::{HookEvent, HookSink, HookStartOptions, SelectionHook, TextSelectionData};
use crate::state::window::StreamStatus;
use crate::state::{StateManager, ToolbarPhase, ToolbarState};
use crate::window::pool::DEFAULT_PRELOAD_COUNT;
use crate::window::{
    ResultOptions, Screen, SharedWindow, WindowFactory, WindowId, WindowKind, WindowMessage,
    WindowPool, RESULT_WINDOW_HEIGHT, RESULT_WINDOW_WIDTH,
};

/// Platform collaborators injected at construction.
pub struct ServiceParts {
    pub hook: Box<dyn SelectionHook>,
    pub factory: Box<dyn WindowFactory>,
    pub screen: Box<dyn Screen>,
    pub strategy: Box<dyn PresentationStrategy>,
    pub timers: Box<dyn Timers>,
    pub dispatcher: Box<dyn CompletionDispatcher>,
}

/// A toolbar show waiting for the toolbar page to load.
struct PendingShow {
    point: Point,
    orientation: Orientation,
    selection: TextSelectionData,
}

pub struct SelectionService {
    hook: Box<dyn SelectionHook>,
    pool: WindowPool,
    screen: Box<dyn Screen>,
    strategy: Box<dyn PresentationStrategy>,
    timers: Box<dyn Timers>,
    dispatcher: Box<dyn CompletionDispatcher>,
    sender: ServiceSender,

    settings: SettingsConfig,
    toolbar: ToolbarState,
    windows: StateManager,

    started: bool,
    /// Set once the hook refused to start; never retried.
    hook_unavailable: bool,
    pending_show: Option<PendingShow>,
    arm_timer: Option<TimerId>,
    restore_timer: Option<TimerId>,
    focus_snapshot: Vec<SharedWindow>,

    _claim: InstanceClaim,
}

impl SelectionService {
    /// Fails with `AlreadyRunning` while another service holds `slot`.
    pub fn new(
        slot: &InstanceSlot,
        parts: ServiceParts,
        settings: SettingsConfig,
        sender: ServiceSender,
    ) -> Result<Self, SelectionError> {
        let claim = slot.claim()?;

        let refill_sender = sender.clone();
        let mut pool = WindowPool::new(
            parts.factory,
            DEFAULT_PRELOAD_COUNT,
            Box::new(move || {
                refill_sender.send(ServiceMsg::RefillPool);
            }),
        );
        pool.set_remember_size(settings.remember_window_size);

        info!("Selection service created ({} presentation)", parts.strategy.name());

        Ok(Self {
            hook: parts.hook,
            pool,
            screen: parts.screen,
            strategy: parts.strategy,
            timers: parts.timers,
            dispatcher: parts.dispatcher,
            sender,
            toolbar: ToolbarState::new(settings.zoom_factor()),
            settings,
            windows: StateManager::new(),
            started: false,
            hook_unavailable: false,
            pending_show: None,
            arm_timer: None,
            restore_timer: None,
            focus_snapshot: Vec::new(),
            _claim: claim,
        })
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn toolbar_phase(&self) -> ToolbarPhase {
        self.toolbar.phase
    }

    pub fn toolbar_state(&self) -> &ToolbarState {
        &self.toolbar
    }

    pub fn pool(&self) -> &WindowPool {
        &self.pool
    }

    pub fn windows(&self) -> &StateManager {
        &self.windows
    }

    /// Process one message. `Break` ends the service loop.
    pub fn handle(&mut self, msg: ServiceMsg) -> ControlFlow<()> {
        match msg {
            ServiceMsg::Hook(event) => self.on_hook_event(event),
            ServiceMsg::Window(event) => self.on_window_event(event),
            ServiceMsg::TimerFired { id, kind } => self.on_timer(id, kind),
            ServiceMsg::RefillPool => self.pool.refill(),
            ServiceMsg::ConfigChanged(settings) => self.apply_settings(settings),
            ServiceMsg::Stream { window, event } => self.on_stream_event(window, event),
            ServiceMsg::Command(command) => return self.on_command(command),
        }
        ControlFlow::Continue(())
    }

    // ===== Lifecycle =====

    pub fn start(&mut self) -> Result<(), SelectionError> {
        if self.started {
            return Ok(());
        }
        if self.hook_unavailable {
            return Err(SelectionError::HookUnavailable);
        }

        let filter = self.settings.filter().effective();
        let options = HookStartOptions {
            filter_mode: filter.mode,
            filter_list: filter.list,
            passive: self.settings.trigger_mode.is_passive(),
        };
        let sender = self.sender.clone();
        let sink: HookSink = std::sync::Arc::new(move |event: HookEvent| {
            sender.send(ServiceMsg::Hook(event));
        });

        if !self.hook.start(options, sink) {
            error!("Failed to start the selection hook, feature disabled");
            self.hook_unavailable = true;
            return Err(SelectionError::HookUnavailable);
        }

        self.started = true;
        self.ensure_toolbar_window();
        self.pool.init_preloaded_action_windows();
        info!("Selection service started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.hook.stop();
        self.disarm();
        self.restore_focusability();
        self.pending_show = None;
        self.toolbar.phase = ToolbarPhase::Idle;

        if let Some(toolbar) = self.pool.toolbar() {
            self.windows.remove(toolbar.id());
        }
        self.pool.destroy_toolbar();
        self.pool.close_preloaded_action_windows();

        self.started = false;
        info!("Selection service stopped");
    }

    pub fn quit(&mut self) {
        self.stop();
        self.hook.cleanup();
        for id in self.pool.in_use_ids() {
            self.dispatcher.cancel(&id);
        }
        self.pool.close_in_use_windows();
        self.pool.close_result_window();
        info!("Selection service quit");
    }

    pub fn toggle_enabled(&mut self, enabled: Option<bool>) -> bool {
        let enable = enabled.unwrap_or(!self.started);
        if enable {
            if let Err(e) = self.start() {
                warn!("Could not enable selection: {}", e);
            }
        } else {
            self.stop();
        }
        self.started
    }

    /// Re-derive hook and window settings after a config change.
    pub fn apply_settings(&mut self, settings: SettingsConfig) {
        if self.started {
            if settings.filter() != self.settings.filter() {
                let filter = settings.filter().effective();
                if !self.hook.set_global_filter_mode(filter.mode, &filter.list) {
                    warn!("Selection hook rejected the filter update");
                }
            }
            if settings.trigger_mode != self.settings.trigger_mode {
                self.hook
                    .set_selection_passive_mode(settings.trigger_mode.is_passive());
            }
        }

        if settings.compact_mode != self.settings.compact_mode {
            self.toolbar.zoom = settings.zoom_factor();
            self.toolbar.reported_size = None;
        }
        self.pool.set_remember_size(settings.remember_window_size);
        self.settings = settings;
    }

    // ===== Hook events =====

    fn on_hook_event(&mut self, event: HookEvent) {
        match event {
            HookEvent::TextSelection(data) => self.process_text_selection(data),
            HookEvent::MouseDown(mouse) => {
                if !self.toolbar.armed {
                    return;
                }
                let point = self.strategy.to_logical(self.screen.as_ref(), mouse.position);
                let inside = self
                    .pool
                    .toolbar()
                    .and_then(|t| t.bounds())
                    .is_some_and(|b| b.contains(point));
                if !inside {
                    self.hide_toolbar();
                }
            }
            HookEvent::MouseWheel(_) | HookEvent::KeyDown(_) => {
                if self.toolbar.armed {
                    self.hide_toolbar();
                }
            }
            HookEvent::Error(message) => error!("Selection hook error: {}", message),
            HookEvent::Unavailable(message) => {
                error!("Selection hook unavailable, feature disabled: {}", message);
                self.stop();
                self.hook_unavailable = true;
            }
        }
    }

    fn process_text_selection(&mut self, data: TextSelectionData) {
        if !self.started || data.text.trim().is_empty() {
            return;
        }

        if self.pool.toolbar().is_some_and(|t| t.is_visible()) {
            debug!("Toolbar already visible, selection ignored");
            return;
        }

        info!("Text selected in {}: \"{}\"", data.program_name, preview(&data.text));

        let point = self.screen.cursor_position();
        let orientation = Orientation::BottomMiddle;

        let existing = self.pool.toolbar().map(|t| self.windows.is_ready(t.id()));
        let toolbar_ready = match existing {
            Some(ready) => ready,
            None => {
                if self.ensure_toolbar_window().is_none() {
                    return;
                }
                false
            }
        };

        if toolbar_ready {
            self.show_toolbar(point, orientation, data);
        } else {
            // Placed once the page has loaded; a newer selection replaces an older one
            self.pending_show = Some(PendingShow {
                point,
                orientation,
                selection: data,
            });
        }
    }

    fn ensure_toolbar_window(&mut self) -> Option<SharedWindow> {
        if let Some(toolbar) = self.pool.toolbar() {
            return Some(toolbar.clone());
        }
        let toolbar = self.pool.create_toolbar_window(self.toolbar.size())?;
        self.windows.register(toolbar.id(), WindowKind::Toolbar);
        Some(toolbar)
    }

    fn toolbar_bounds_at(&self, point: Point, orientation: Orientation) -> Rect {
        let size = self.toolbar.size().ceil();
        let display = self.screen.display_nearest(point);
        let origin = geometry::resolve_position(point, orientation, size, display.work_area);
        Rect::from_origin_size(origin, size)
    }

    fn show_toolbar(&mut self, point: Point, orientation: Orientation, selection: TextSelectionData) {
        let Some(toolbar) = self.pool.toolbar().cloned() else {
            return;
        };

        let bounds = self.toolbar_bounds_at(point, orientation);
        toolbar.set_bounds(bounds);
        self.toolbar.position = Some(bounds.origin());
        toolbar.set_always_on_top(true);

        match self.strategy.show(toolbar.as_ref()) {
            Arming::Immediate => self.toolbar.armed = true,
            Arming::After(kind) => {
                self.cancel_arm_timer();
                self.arm_timer = Some(self.timers.schedule(kind));
            }
        }
        self.toolbar.phase = ToolbarPhase::Showing;

        self.windows.deliver(&toolbar, WindowMessage::TextSelected(selection));
        self.windows.deliver(&toolbar, WindowMessage::ToolbarVisibility(true));
    }

    pub fn hide_toolbar(&mut self) {
        self.disarm();
        self.pending_show = None;

        let Some(toolbar) = self.pool.toolbar().cloned() else {
            self.toolbar.phase = ToolbarPhase::Idle;
            return;
        };
        if self.toolbar.phase == ToolbarPhase::Idle && !toolbar.is_visible() {
            return;
        }

        let others: Vec<SharedWindow> = self
            .pool
            .factory()
            .visible_windows()
            .into_iter()
            .filter(|w| w.id() != toolbar.id())
            .collect();

        let snapshot = self.strategy.hide(toolbar.as_ref(), &others);
        if !snapshot.is_empty() {
            // A restore still pending from the previous hide happens now
            self.restore_focusability();
            self.focus_snapshot = snapshot;
            self.restore_timer = Some(self.timers.schedule(TimerKind::FocusabilityRestore));
        }

        self.toolbar.phase = ToolbarPhase::Idle;
        self.windows.deliver(&toolbar, WindowMessage::ToolbarVisibility(false));
    }

    fn disarm(&mut self) {
        self.toolbar.armed = false;
        self.cancel_arm_timer();
    }

    fn cancel_arm_timer(&mut self) {
        if let Some(id) = self.arm_timer.take() {
            self.timers.cancel(id);
        }
    }

    fn restore_focusability(&mut self) {
        if let Some(id) = self.restore_timer.take() {
            self.timers.cancel(id);
        }
        for window in self.focus_snapshot.drain(..) {
            if window.is_alive() {
                window.set_focusable(true);
            }
        }
    }

    /// Store the size measured by the toolbar page and re-place a live toolbar.
    pub fn determine_toolbar_size(&mut self, width: f64, height: f64) {
        if !(width > 0.0 && height > 0.0) {
            warn!("Ignoring toolbar size {}x{}", width, height);
            return;
        }
        self.toolbar.reported_size = Some(Size::new(width, height));

        let Some(toolbar) = self.pool.toolbar().cloned() else {
            return;
        };
        let bounds = self.toolbar_bounds_at(self.screen.cursor_position(), Orientation::BottomMiddle);
        toolbar.set_bounds(bounds);
        self.toolbar.position = Some(bounds.origin());
    }

    // ===== Timers =====

    fn on_timer(&mut self, id: TimerId, kind: TimerKind) {
        match kind {
            TimerKind::SelfTriggerSuppression => {
                if self.arm_timer != Some(id) {
                    return;
                }
                self.arm_timer = None;
                if self.toolbar.is_showing() {
                    self.toolbar.armed = true;
                }
            }
            TimerKind::FocusabilityRestore => {
                if self.restore_timer != Some(id) {
                    return;
                }
                self.restore_focusability();
            }
        }
        self.timers.cancel(id);
    }

    // ===== Window lifecycle =====

    fn on_window_event(&mut self, event: WindowEvent) {
        let WindowEvent { id, kind, event } = event;
        match event {
            WindowEventKind::Ready => {
                let backlog = self.windows.mark_ready(&id, kind);
                if !backlog.is_empty() {
                    if let Some(window) = self.find_window(&id) {
                        for message in &backlog {
                            window.send(message);
                        }
                    }
                }

                if self.pool.is_toolbar(&id) {
                    if let Some(pending) = self.pending_show.take() {
                        self.show_toolbar(pending.point, pending.orientation, pending.selection);
                    }
                }
            }
            WindowEventKind::Blurred => {
                if self.pool.is_toolbar(&id) && self.toolbar.is_showing() {
                    self.hide_toolbar();
                }
            }
            WindowEventKind::Resized(size) => self.pool.on_action_resized(&id, size),
            WindowEventKind::Destroyed => {
                if self.pool.is_toolbar(&id) {
                    self.disarm();
                    self.pending_show = None;
                    self.toolbar.phase = ToolbarPhase::Idle;
                }
                if self.pool.in_use(&id).is_some() {
                    self.dispatcher.cancel(&id);
                }
                self.pool.on_destroyed(&id);
                self.windows.remove(&id);
            }
        }
    }

    fn find_window(&self, id: &WindowId) -> Option<SharedWindow> {
        if self.pool.is_toolbar(id) {
            return self.pool.toolbar().cloned();
        }
        if let Some(window) = self.pool.in_use(id) {
            return Some(window.clone());
        }
        self.pool
            .result_window()
            .filter(|w| w.id() == id)
            .cloned()
    }

    // ===== Actions =====

    pub fn process_action(&mut self, item: ActionItem) {
        let Some(window) = self.pool.pop_action_window() else {
            warn!("No action window available for {}", item.id);
            return;
        };
        self.windows.register(window.id(), WindowKind::Action);
        info!("Processing action {} in {}", item.id, window.id());

        let request = CompletionRequest::for_action(&item);
        self.windows.deliver(&window, WindowMessage::ActionData(item));
        self.show_action_window(&window);

        if let Some(request) = request {
            self.windows.begin_stream(window.id());
            self.dispatcher.dispatch(window.id().clone(), request);
        }
    }

    fn show_action_window(&mut self, window: &SharedWindow) {
        let size = self.pool.action_window_size();
        let display = self.screen.display_nearest(self.screen.cursor_position());

        let toolbar_bounds = if self.settings.follow_toolbar {
            self.pool.toolbar().and_then(|t| t.bounds())
        } else {
            None
        };

        let bounds = match toolbar_bounds {
            Some(toolbar) => geometry::place_below_toolbar(toolbar, size, display.work_area),
            None => geometry::center_in(display.work_area, size),
        };

        window.set_bounds(bounds);
        self.pool.record_placement(window.id(), bounds.size());
        window.show();
    }

    fn on_stream_event(&mut self, id: WindowId, event: StreamEvent) {
        let window = self.pool.in_use(&id).cloned();
        match event {
            StreamEvent::Chunk(chunk) => {
                if !self.windows.append_chunk(&id, &chunk) {
                    return;
                }
                if let Some(window) = window {
                    self.windows.deliver(&window, WindowMessage::ResultChunk(chunk));
                }
            }
            StreamEvent::Complete(full) => {
                if !self.windows.finish_stream(&id, StreamStatus::Complete) {
                    return;
                }
                if let Some(window) = window {
                    self.windows.deliver(&window, WindowMessage::ResultComplete(full));
                }
            }
            StreamEvent::Error(message) => {
                if !self.windows.finish_stream(&id, StreamStatus::Failed) {
                    return;
                }
                warn!("Completion for {} failed: {}", id, message);
                if let Some(window) = window {
                    self.windows.deliver(&window, WindowMessage::ResultError(message));
                }
            }
        }
    }

    // ===== Result window =====

    pub fn open_result(&mut self, options: ResultOptions) {
        if let Some(window) = self.pool.result_window().cloned() {
            window.show();
            window.focus();
            self.windows.deliver(&window, WindowMessage::OpenResult(options));
            return;
        }

        let size = Size::new(RESULT_WINDOW_WIDTH, RESULT_WINDOW_HEIGHT);
        let Some(window) = self.pool.create_result_window(size) else {
            return;
        };
        self.windows.register(window.id(), WindowKind::Result);

        let display = self.screen.display_nearest(self.screen.cursor_position());
        window.set_bounds(geometry::center_in(display.work_area, size));
        window.show();
        self.windows.deliver(&window, WindowMessage::OpenResult(options));
    }

    pub fn update_result(&mut self, text: String) {
        if let Some(window) = self.pool.result_window().cloned() {
            self.windows.deliver(&window, WindowMessage::UpdateResult(text));
        }
    }

    // ===== Commands =====

    fn on_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::HideToolbar => self.hide_toolbar(),
            Command::WriteToClipboard { text, reply } => {
                let ok = self.started && self.hook.write_to_clipboard(&text);
                let _ = reply.send(ok);
            }
            Command::DetermineToolbarSize { width, height } => {
                self.determine_toolbar_size(width, height)
            }
            Command::ProcessAction(item) => self.process_action(item),
            Command::CloseActionWindow(id) => {
                if let Some(window) = self.pool.in_use(&id) {
                    window.close();
                }
            }
            Command::MinimizeActionWindow(id) => {
                if let Some(window) = self.pool.in_use(&id) {
                    window.minimize();
                }
            }
            Command::PinActionWindow { id, pinned } => {
                if let Some(window) = self.pool.in_use(&id) {
                    window.set_always_on_top(pinned);
                }
            }
            Command::RequestSelection => {
                if self.started && !self.hook.request_selection() {
                    warn!("Selection hook could not capture on request");
                }
            }
            Command::ToggleEnabled { enabled, reply } => {
                let state = self.toggle_enabled(enabled);
                let _ = reply.send(state);
            }
            Command::OpenResult(options) => self.open_result(options),
            Command::CloseResult => self.pool.close_result_window(),
            Command::UpdateResult(text) => self.update_result(text),
            Command::Quit { reply } => {
                self.quit();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}
