// In-memory collaborators for driving `SelectionService` in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

use super::presentation::PresentationStrategy;
use super::runtime::{self, InstanceSlot, ServiceMsg, ServiceSender, WindowEvent, WindowEventKind};
use super::service::{SelectionService, ServiceParts};
use super::timers::{TimerId, TimerKind, Timers};
use crate::completion::{CompletionDispatcher, CompletionRequest};
use crate::config::SettingsConfig;
use crate::geometry::{Display, Point, Rect, Size};
use crate::selection_hook::{
    HookEvent, HookFilterMode, HookSink, HookStartOptions, PosLevel, SelectionHook,
    TextSelectionData,
};
use crate::window::{
    Screen, SharedWindow, WindowError, WindowFactory, WindowHandle, WindowId, WindowKind,
    WindowMessage,
};

// ===== Windows =====

#[derive(Debug, Default)]
pub struct FakeWindowState {
    pub alive: bool,
    pub visible: bool,
    pub focusable: bool,
    pub bounds: Option<Rect>,
    pub always_on_top: bool,
    pub all_workspaces: bool,
    pub minimized: bool,
    pub set_bounds_calls: usize,
    pub calls: Vec<&'static str>,
    pub sent: Vec<WindowMessage>,
}

pub struct FakeWindow {
    id: WindowId,
    kind: WindowKind,
    sender: Option<ServiceSender>,
    pub state: Mutex<FakeWindowState>,
}

impl FakeWindow {
    pub fn new(id: &str, kind: WindowKind, sender: Option<ServiceSender>) -> Self {
        Self {
            id: WindowId::from(id),
            kind,
            sender,
            state: Mutex::new(FakeWindowState {
                alive: true,
                focusable: true,
                ..FakeWindowState::default()
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeWindowState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn record(&self, call: &'static str) {
        self.with(|s| s.calls.push(call));
    }

    pub fn sent(&self) -> Vec<WindowMessage> {
        self.with(|s| s.sent.clone())
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.with(|s| s.calls.clone())
    }

    pub fn set_bounds_calls(&self) -> usize {
        self.with(|s| s.set_bounds_calls)
    }

    fn gone(&self) {
        let was_alive = self.with(|s| {
            let was = s.alive;
            s.alive = false;
            s.visible = false;
            was
        });
        if was_alive {
            if let Some(sender) = &self.sender {
                sender.send(ServiceMsg::Window(WindowEvent {
                    id: self.id.clone(),
                    kind: self.kind,
                    event: WindowEventKind::Destroyed,
                }));
            }
        }
    }
}

impl WindowHandle for FakeWindow {
    fn id(&self) -> &WindowId {
        &self.id
    }
    fn kind(&self) -> WindowKind {
        self.kind
    }
    fn is_alive(&self) -> bool {
        self.with(|s| s.alive)
    }
    fn is_visible(&self) -> bool {
        self.with(|s| s.alive && s.visible)
    }
    fn is_focusable(&self) -> bool {
        self.with(|s| s.focusable)
    }
    fn bounds(&self) -> Option<Rect> {
        self.with(|s| if s.alive { s.bounds } else { None })
    }
    fn set_bounds(&self, bounds: Rect) {
        self.with(|s| {
            s.bounds = Some(bounds);
            s.set_bounds_calls += 1;
        });
    }
    fn set_always_on_top(&self, on_top: bool) {
        self.with(|s| s.always_on_top = on_top);
    }
    fn set_focusable(&self, focusable: bool) {
        self.with(|s| s.focusable = focusable);
        self.record(if focusable { "focusable" } else { "non-focusable" });
    }
    fn set_visible_on_all_workspaces(&self, visible: bool) {
        self.with(|s| s.all_workspaces = visible);
    }
    fn show(&self) {
        self.with(|s| {
            s.visible = true;
            s.minimized = false;
        });
        self.record("show");
    }
    fn show_inactive(&self) {
        self.with(|s| s.visible = true);
        self.record("show-inactive");
    }
    fn focus(&self) {
        self.record("focus");
    }
    fn hide(&self) {
        self.with(|s| s.visible = false);
        self.record("hide");
    }
    fn minimize(&self) {
        self.with(|s| s.minimized = true);
        self.record("minimize");
    }
    fn close(&self) {
        self.record("close");
        self.gone();
    }
    fn destroy(&self) {
        self.record("destroy");
        self.gone();
    }
    fn clear_hover(&self) {
        self.record("clear-hover");
    }
    fn send(&self, message: &WindowMessage) {
        self.with(|s| s.sent.push(message.clone()));
    }
}

#[derive(Default)]
struct FactoryInner {
    created: Mutex<Vec<Arc<FakeWindow>>>,
    external: Mutex<Vec<Arc<FakeWindow>>>,
    fail_actions: AtomicBool,
    manual_ready: AtomicBool,
    counter: AtomicUsize,
}

/// Creates `FakeWindow`s and, unless told otherwise, reports them ready
/// through the service queue right away.
#[derive(Clone)]
pub struct FakeWindowFactory {
    sender: ServiceSender,
    inner: Arc<FactoryInner>,
}

impl FakeWindowFactory {
    pub fn new(sender: ServiceSender) -> Self {
        Self {
            sender,
            inner: Arc::new(FactoryInner::default()),
        }
    }

    pub fn fail_actions(&self, fail: bool) {
        self.inner.fail_actions.store(fail, Ordering::SeqCst);
    }

    /// Stop announcing readiness; tests call [`Self::ready`] themselves.
    pub fn manual_ready(&self, manual: bool) {
        self.inner.manual_ready.store(manual, Ordering::SeqCst);
    }

    pub fn ready(&self, window: &FakeWindow) {
        self.sender.send(ServiceMsg::Window(WindowEvent {
            id: window.id().clone(),
            kind: window.kind(),
            event: WindowEventKind::Ready,
        }));
    }

    pub fn add_external(&self, window: Arc<FakeWindow>) {
        self.inner.external.lock().unwrap().push(window);
    }

    pub fn created(&self, kind: WindowKind) -> Vec<Arc<FakeWindow>> {
        self.inner
            .created
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn find(&self, id: &WindowId) -> Option<Arc<FakeWindow>> {
        self.inner
            .created
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id() == id)
            .cloned()
    }

    /// The live toolbar
    pub fn toolbar(&self) -> Arc<FakeWindow> {
        self.created(WindowKind::Toolbar)
            .into_iter()
            .rev()
            .find(|w| w.is_alive())
            .expect("no live toolbar")
    }

    fn create(&self, kind: WindowKind, size: Size) -> Result<SharedWindow, WindowError> {
        if kind == WindowKind::Action && self.inner.fail_actions.load(Ordering::SeqCst) {
            return Err(WindowError::Creation {
                kind,
                reason: "injected failure".into(),
            });
        }
        let n = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let window = Arc::new(FakeWindow::new(
            &format!("{}-{}", kind, n),
            kind,
            Some(self.sender.clone()),
        ));
        window.set_bounds(Rect::new(-10000.0, -10000.0, size.width, size.height));
        window.with(|s| s.set_bounds_calls = 0);
        self.inner.created.lock().unwrap().push(window.clone());

        if !self.inner.manual_ready.load(Ordering::SeqCst) {
            self.ready(&window);
        }
        Ok(window as SharedWindow)
    }
}

impl WindowFactory for FakeWindowFactory {
    fn create_toolbar(&self, size: Size) -> Result<SharedWindow, WindowError> {
        self.create(WindowKind::Toolbar, size)
    }
    fn create_action(&self, size: Size) -> Result<SharedWindow, WindowError> {
        self.create(WindowKind::Action, size)
    }
    fn create_result(&self, size: Size) -> Result<SharedWindow, WindowError> {
        self.create(WindowKind::Result, size)
    }
    fn visible_windows(&self) -> Vec<SharedWindow> {
        let created = self.inner.created.lock().unwrap();
        let external = self.inner.external.lock().unwrap();
        created
            .iter()
            .chain(external.iter())
            .filter(|w| w.is_visible())
            .map(|w| w.clone() as SharedWindow)
            .collect()
    }
}

// ===== Screen =====

#[derive(Clone)]
pub struct FakeScreen {
    cursor: Arc<Mutex<Point>>,
    scale: Arc<Mutex<f64>>,
    work_area: Rect,
}

impl FakeScreen {
    pub fn new(work_area: Rect) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(Point::new(0.0, 0.0))),
            scale: Arc::new(Mutex::new(1.0)),
            work_area,
        }
    }

    pub fn move_cursor(&self, x: f64, y: f64) {
        *self.cursor.lock().unwrap() = Point::new(x, y);
    }

    pub fn set_scale(&self, scale: f64) {
        *self.scale.lock().unwrap() = scale;
    }
}

impl Screen for FakeScreen {
    fn cursor_position(&self) -> Point {
        *self.cursor.lock().unwrap()
    }
    fn display_nearest(&self, _point: Point) -> Display {
        Display {
            work_area: self.work_area,
            scale_factor: *self.scale.lock().unwrap(),
        }
    }
    fn to_logical(&self, physical: Point) -> Point {
        let scale = *self.scale.lock().unwrap();
        Point::new(physical.x / scale, physical.y / scale)
    }
}

// ===== Hook =====

#[derive(Default)]
pub struct HookLog {
    pub started: Vec<HookStartOptions>,
    pub stopped: usize,
    pub cleaned_up: usize,
    pub filters: Vec<(HookFilterMode, Vec<String>)>,
    pub passive: Vec<bool>,
    pub clipboard: Vec<String>,
    pub requests: usize,
}

#[derive(Clone)]
pub struct FakeHook {
    pub log: Arc<Mutex<HookLog>>,
    sink: Arc<Mutex<Option<HookSink>>>,
    supported: bool,
}

impl FakeHook {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(HookLog::default())),
            sink: Arc::new(Mutex::new(None)),
            supported: true,
        }
    }

    /// Push an event as the OS hook would, from "another thread".
    pub fn emit(&self, event: HookEvent) {
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }
}

impl SelectionHook for FakeHook {
    fn start(&mut self, options: HookStartOptions, sink: HookSink) -> bool {
        if !self.supported {
            return false;
        }
        self.log.lock().unwrap().started.push(options);
        *self.sink.lock().unwrap() = Some(sink);
        true
    }
    fn stop(&mut self) -> bool {
        self.log.lock().unwrap().stopped += 1;
        true
    }
    fn cleanup(&mut self) {
        self.log.lock().unwrap().cleaned_up += 1;
        *self.sink.lock().unwrap() = None;
    }
    fn set_global_filter_mode(&mut self, mode: HookFilterMode, list: &[String]) -> bool {
        self.log.lock().unwrap().filters.push((mode, list.to_vec()));
        true
    }
    fn set_selection_passive_mode(&mut self, passive: bool) -> bool {
        self.log.lock().unwrap().passive.push(passive);
        true
    }
    fn write_to_clipboard(&mut self, text: &str) -> bool {
        self.log.lock().unwrap().clipboard.push(text.to_string());
        true
    }
    fn request_selection(&mut self) -> bool {
        self.log.lock().unwrap().requests += 1;
        true
    }
}

// ===== Timers =====

#[derive(Default)]
struct TimerBook {
    next: u64,
    pending: Vec<(TimerId, TimerKind)>,
}

/// Timers that only fire when the test says so.
#[derive(Clone, Default)]
pub struct ManualTimers {
    book: Arc<Mutex<TimerBook>>,
}

impl ManualTimers {
    pub fn pending(&self, kind: TimerKind) -> usize {
        self.book
            .lock()
            .unwrap()
            .pending
            .iter()
            .filter(|(_, k)| *k == kind)
            .count()
    }

    /// Remove the oldest pending timer of `kind` and return its firing message.
    pub fn take(&self, kind: TimerKind) -> Option<ServiceMsg> {
        let mut book = self.book.lock().unwrap();
        let pos = book.pending.iter().position(|(_, k)| *k == kind)?;
        let (id, kind) = book.pending.remove(pos);
        Some(ServiceMsg::TimerFired { id, kind })
    }
}

impl Timers for ManualTimers {
    fn schedule(&mut self, kind: TimerKind) -> TimerId {
        let mut book = self.book.lock().unwrap();
        book.next += 1;
        let id = TimerId(book.next);
        book.pending.push((id, kind));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.book.lock().unwrap().pending.retain(|(t, _)| *t != id);
    }
}

// ===== Completion =====

#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    pub requests: Arc<Mutex<Vec<(WindowId, CompletionRequest)>>>,
    pub cancelled: Arc<Mutex<Vec<WindowId>>>,
}

impl CompletionDispatcher for RecordingDispatcher {
    fn dispatch(&self, window: WindowId, request: CompletionRequest) {
        self.requests.lock().unwrap().push((window, request));
    }

    fn cancel(&self, window: &WindowId) {
        self.cancelled.lock().unwrap().push(window.clone());
    }
}

// ===== Harness =====

pub const WORK_AREA: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 1920.0,
    height: 1080.0,
};

pub struct Harness {
    pub service: SelectionService,
    pub receiver: UnboundedReceiver<ServiceMsg>,
    pub sender: ServiceSender,
    pub slot: InstanceSlot,
    pub factory: FakeWindowFactory,
    pub hook: FakeHook,
    pub screen: FakeScreen,
    pub timers: ManualTimers,
    pub dispatcher: RecordingDispatcher,
}

impl Harness {
    pub fn new(strategy: Box<dyn PresentationStrategy>, settings: SettingsConfig) -> Self {
        Self::with_hook(strategy, settings, FakeHook::new())
    }

    pub fn with_hook(
        strategy: Box<dyn PresentationStrategy>,
        settings: SettingsConfig,
        hook: FakeHook,
    ) -> Self {
        let (sender, receiver) = runtime::channel();
        let slot = InstanceSlot::new();
        let factory = FakeWindowFactory::new(sender.clone());
        let screen = FakeScreen::new(WORK_AREA);
        let timers = ManualTimers::default();
        let dispatcher = RecordingDispatcher::default();

        let parts = ServiceParts {
            hook: Box::new(hook.clone()),
            factory: Box::new(factory.clone()),
            screen: Box::new(screen.clone()),
            strategy,
            timers: Box::new(timers.clone()),
            dispatcher: Box::new(dispatcher.clone()),
        };
        let service = SelectionService::new(&slot, parts, settings, sender.clone())
            .expect("slot is free");

        Self {
            service,
            receiver,
            sender,
            slot,
            factory,
            hook,
            screen,
            timers,
            dispatcher,
        }
    }

    pub fn unsupported(strategy: Box<dyn PresentationStrategy>) -> Self {
        let mut hook = FakeHook::new();
        hook.supported = false;
        Self::with_hook(strategy, SettingsConfig::default(), hook)
    }

    /// Handle queued messages until the queue is empty.
    pub fn pump(&mut self) {
        while let Ok(msg) = self.receiver.try_recv() {
            let _ = self.service.handle(msg);
        }
    }

    pub fn started(mut self) -> Self {
        self.service.start().expect("hook starts");
        self.pump();
        self
    }

    pub fn send(&mut self, msg: ServiceMsg) {
        let _ = self.service.handle(msg);
        self.pump();
    }

    pub fn fire(&mut self, kind: TimerKind) {
        let msg = self.timers.take(kind).expect("timer pending");
        self.send(msg);
    }

    /// Hook reports a selection while the cursor sits at (x, y).
    pub fn select(&mut self, text: &str, x: f64, y: f64) {
        self.screen.move_cursor(x, y);
        self.hook.emit(HookEvent::TextSelection(selection(text, x, y)));
        self.pump();
    }
}

pub fn selection(text: &str, x: f64, y: f64) -> TextSelectionData {
    let start = Point::new(x - 80.0, y);
    let end = Point::new(x, y);
    TextSelectionData {
        text: text.to_string(),
        program_name: "notepad.exe".to_string(),
        pos_level: PosLevel::MouseDual,
        start_top: start,
        start_bottom: start,
        end_top: end,
        end_bottom: end,
        mouse_pos_start: start,
        mouse_pos_end: end,
        is_fullscreen: false,
    }
}
