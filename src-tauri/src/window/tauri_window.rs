// Tauri backend for the window abstraction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tauri::webview::PageLoadEvent;
use tauri::{
    AppHandle, Emitter, EventTarget, LogicalPosition, LogicalSize, Manager, Monitor, WebviewUrl,
    WebviewWindow, WebviewWindowBuilder,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    Screen, SharedWindow, WindowError, WindowFactory, WindowHandle, WindowId, WindowKind,
    WindowMessage, ACTION_WINDOW_MIN_HEIGHT, ACTION_WINDOW_MIN_WIDTH, OFFSCREEN_POSITION,
};
use crate::geometry::{Display, Point, Rect, Size};
use crate::selection::runtime::{ServiceMsg, ServiceSender, WindowEvent, WindowEventKind};

/// Used when no monitor information is available at all.
const FALLBACK_WORK_AREA: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 1920.0,
    height: 1080.0,
};

/// Moves the page's pointer off every element so hover styles clear.
const CLEAR_HOVER_SCRIPT: &str =
    "window.dispatchEvent(new MouseEvent('mousemove', { clientX: -1, clientY: -1 }));";

fn log_failure(op: &str, id: &WindowId, result: tauri::Result<()>) {
    if let Err(e) = result {
        warn!("Window {}: {} failed: {}", id, op, e);
    }
}

pub struct TauriWindow {
    id: WindowId,
    kind: WindowKind,
    window: WebviewWindow,
    alive: Arc<AtomicBool>,
    focusable: AtomicBool,
}

impl TauriWindow {
    fn new(kind: WindowKind, window: WebviewWindow, alive: Arc<AtomicBool>) -> Self {
        Self {
            id: WindowId::from(window.label()),
            kind,
            window,
            alive,
            // The toolbar is built non-focusable
            focusable: AtomicBool::new(kind != WindowKind::Toolbar),
        }
    }
}

impl WindowHandle for TauriWindow {
    fn id(&self) -> &WindowId {
        &self.id
    }

    fn kind(&self) -> WindowKind {
        self.kind
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn is_visible(&self) -> bool {
        self.is_alive() && self.window.is_visible().unwrap_or(false)
    }

    fn is_focusable(&self) -> bool {
        self.focusable.load(Ordering::SeqCst)
    }

    fn bounds(&self) -> Option<Rect> {
        if !self.is_alive() {
            return None;
        }
        let scale = self.window.scale_factor().ok()?;
        let position = self.window.outer_position().ok()?.to_logical::<f64>(scale);
        let size = self.window.outer_size().ok()?.to_logical::<f64>(scale);
        Some(Rect::new(position.x, position.y, size.width, size.height))
    }

    fn set_bounds(&self, bounds: Rect) {
        log_failure(
            "resize",
            &self.id,
            self.window.set_size(LogicalSize::new(bounds.width, bounds.height)),
        );
        log_failure(
            "move",
            &self.id,
            self.window.set_position(LogicalPosition::new(bounds.x, bounds.y)),
        );
    }

    fn set_always_on_top(&self, on_top: bool) {
        log_failure("always-on-top", &self.id, self.window.set_always_on_top(on_top));
    }

    fn set_focusable(&self, focusable: bool) {
        self.focusable.store(focusable, Ordering::SeqCst);
        log_failure("set focusable", &self.id, self.window.set_focusable(focusable));
    }

    fn set_visible_on_all_workspaces(&self, visible: bool) {
        log_failure(
            "all workspaces",
            &self.id,
            self.window.set_visible_on_all_workspaces(visible),
        );
    }

    fn show(&self) {
        log_failure("show", &self.id, self.window.show());
    }

    #[cfg(target_os = "windows")]
    fn show_inactive(&self) {
        use windows::Win32::Foundation::HWND;
        use windows::Win32::UI::WindowsAndMessaging::{
            SetWindowPos, ShowWindow, HWND_TOPMOST, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
            SW_SHOWNOACTIVATE,
        };

        let hwnd = match self.window.hwnd() {
            Ok(hwnd) => HWND(hwnd.0),
            Err(e) => {
                warn!("Window {}: no native handle: {}", self.id, e);
                return;
            }
        };
        unsafe {
            let _ = ShowWindow(hwnd, SW_SHOWNOACTIVATE);
            if let Err(e) = SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            ) {
                warn!("Window {}: raise failed: {}", self.id, e);
            }
        }
    }

    // Callers make the window non-focusable first, so ordering it front does
    // not take activation.
    #[cfg(not(target_os = "windows"))]
    fn show_inactive(&self) {
        log_failure("show", &self.id, self.window.show());
    }

    fn focus(&self) {
        log_failure("focus", &self.id, self.window.set_focus());
    }

    fn hide(&self) {
        log_failure("hide", &self.id, self.window.hide());
    }

    fn minimize(&self) {
        log_failure("minimize", &self.id, self.window.minimize());
    }

    fn close(&self) {
        if self.is_alive() {
            log_failure("close", &self.id, self.window.close());
        }
    }

    fn destroy(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            log_failure("destroy", &self.id, self.window.destroy());
        }
    }

    fn clear_hover(&self) {
        log_failure("clear hover", &self.id, self.window.eval(CLEAR_HOVER_SCRIPT));
    }

    fn send(&self, message: &WindowMessage) {
        if !self.is_alive() {
            return;
        }
        let target = EventTarget::webview_window(self.window.label());
        if let Err(e) = self
            .window
            .emit_to(target, message.channel(), message.payload())
        {
            warn!("Failed to send {} to {}: {}", message.channel(), self.id, e);
        }
    }
}

/// Builds the toolbar, action and result windows and reports their
/// lifecycle back to the orchestrator.
pub struct TauriWindowFactory {
    app: AppHandle,
    sender: ServiceSender,
    known: Mutex<HashMap<String, Arc<TauriWindow>>>,
}

impl TauriWindowFactory {
    pub fn new(app: AppHandle, sender: ServiceSender) -> Self {
        Self {
            app,
            sender,
            known: Mutex::new(HashMap::new()),
        }
    }

    fn page(kind: WindowKind) -> &'static str {
        match kind {
            WindowKind::Toolbar => "toolbar.html",
            WindowKind::Action | WindowKind::Result => "result.html",
            WindowKind::Settings => "index.html",
        }
    }

    fn build(&self, kind: WindowKind, size: Size) -> Result<SharedWindow, WindowError> {
        let label = format!("{}-{}", kind, Uuid::new_v4());
        let alive = Arc::new(AtomicBool::new(true));

        let ready_sender = self.sender.clone();
        let builder = WebviewWindowBuilder::new(&self.app, &label, WebviewUrl::App(Self::page(kind).into()))
            .title("Selection Assistant")
            .inner_size(size.width, size.height)
            .position(OFFSCREEN_POSITION.x, OFFSCREEN_POSITION.y)
            .visible(false)
            .on_page_load(move |window, payload| {
                if payload.event() == PageLoadEvent::Finished {
                    ready_sender.send(ServiceMsg::Window(WindowEvent {
                        id: WindowId::from(window.label()),
                        kind,
                        event: WindowEventKind::Ready,
                    }));
                }
            });

        let builder = match kind {
            WindowKind::Toolbar => builder
                .decorations(false)
                .transparent(true)
                .always_on_top(true)
                .skip_taskbar(true)
                .resizable(false)
                .focused(false)
                .focusable(false)
                .shadow(false),
            WindowKind::Action => builder
                .decorations(false)
                .transparent(true)
                .shadow(false)
                .min_inner_size(ACTION_WINDOW_MIN_WIDTH, ACTION_WINDOW_MIN_HEIGHT),
            WindowKind::Result | WindowKind::Settings => builder.min_inner_size(500.0, 400.0),
        };

        let window = builder.build().map_err(|e| WindowError::Creation {
            kind,
            reason: e.to_string(),
        })?;

        self.watch(kind, &window, alive.clone());

        let handle = Arc::new(TauriWindow::new(kind, window, alive));
        if let Ok(mut known) = self.known.lock() {
            known.insert(label.clone(), handle.clone());
        }
        debug!("Created {} window {}", kind, label);
        Ok(handle)
    }

    fn watch(&self, kind: WindowKind, window: &WebviewWindow, alive: Arc<AtomicBool>) {
        let sender = self.sender.clone();
        let id = WindowId::from(window.label());
        let scaled = window.clone();

        window.on_window_event(move |event| {
            let event = match event {
                tauri::WindowEvent::Focused(false) => WindowEventKind::Blurred,
                tauri::WindowEvent::Resized(size) => {
                    let scale = scaled.scale_factor().unwrap_or(1.0);
                    let size = size.to_logical::<f64>(scale);
                    WindowEventKind::Resized(Size::new(size.width, size.height))
                }
                tauri::WindowEvent::Destroyed => {
                    alive.store(false, Ordering::SeqCst);
                    WindowEventKind::Destroyed
                }
                _ => return,
            };
            sender.send(ServiceMsg::Window(WindowEvent {
                id: id.clone(),
                kind,
                event,
            }));
        });
    }

    /// Wrap a window this factory did not build (the settings window).
    fn adopt(&self, window: WebviewWindow) -> Arc<TauriWindow> {
        let alive = Arc::new(AtomicBool::new(true));
        let flag = alive.clone();
        window.on_window_event(move |event| {
            if let tauri::WindowEvent::Destroyed = event {
                flag.store(false, Ordering::SeqCst);
            }
        });
        Arc::new(TauriWindow::new(WindowKind::Settings, window, alive))
    }
}

impl WindowFactory for TauriWindowFactory {
    fn create_toolbar(&self, size: Size) -> Result<SharedWindow, WindowError> {
        self.build(WindowKind::Toolbar, size)
    }

    fn create_action(&self, size: Size) -> Result<SharedWindow, WindowError> {
        self.build(WindowKind::Action, size)
    }

    fn create_result(&self, size: Size) -> Result<SharedWindow, WindowError> {
        self.build(WindowKind::Result, size)
    }

    fn visible_windows(&self) -> Vec<SharedWindow> {
        let Ok(mut known) = self.known.lock() else {
            return Vec::new();
        };
        known.retain(|_, w| w.is_alive());

        let mut visible = Vec::new();
        for (label, window) in self.app.webview_windows() {
            let handle = known
                .entry(label)
                .or_insert_with(|| self.adopt(window))
                .clone();
            if handle.is_visible() {
                visible.push(handle as SharedWindow);
            }
        }
        visible
    }
}

/// Monitor geometry from Tauri, in logical pixels.
pub struct TauriScreen {
    app: AppHandle,
}

impl TauriScreen {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    fn monitors(&self) -> Vec<Monitor> {
        match self.app.available_monitors() {
            Ok(monitors) if !monitors.is_empty() => monitors,
            _ => self.app.primary_monitor().ok().flatten().into_iter().collect(),
        }
    }

    fn display_of(monitor: &Monitor) -> Display {
        let scale = monitor.scale_factor();
        let area = monitor.work_area();
        let position = area.position.to_logical::<f64>(scale);
        let size = area.size.to_logical::<f64>(scale);
        Display {
            work_area: Rect::new(position.x, position.y, size.width, size.height),
            scale_factor: scale,
        }
    }

    /// Monitor whose physical bounds contain the point
    fn monitor_at_physical(&self, point: Point) -> Option<Monitor> {
        self.monitors().into_iter().find(|m| {
            let pos = m.position();
            let size = m.size();
            Rect::new(pos.x as f64, pos.y as f64, size.width as f64, size.height as f64)
                .contains(point)
        })
    }
}

impl Screen for TauriScreen {
    fn cursor_position(&self) -> Point {
        match self.app.cursor_position() {
            Ok(physical) => self.to_logical(Point::new(physical.x, physical.y)),
            Err(e) => {
                warn!("Cursor position unavailable: {}", e);
                Point::new(0.0, 0.0)
            }
        }
    }

    fn display_nearest(&self, point: Point) -> Display {
        let displays: Vec<Display> = self.monitors().iter().map(Self::display_of).collect();

        displays
            .iter()
            .find(|d| d.work_area.contains(point))
            .or_else(|| {
                displays.iter().min_by(|a, b| {
                    a.work_area
                        .distance_to_point(point)
                        .total_cmp(&b.work_area.distance_to_point(point))
                })
            })
            .copied()
            .unwrap_or(Display {
                work_area: FALLBACK_WORK_AREA,
                scale_factor: 1.0,
            })
    }

    fn to_logical(&self, physical: Point) -> Point {
        let scale = self
            .monitor_at_physical(physical)
            .map(|m| m.scale_factor())
            .unwrap_or(1.0);
        Point::new(physical.x / scale, physical.y / scale)
    }
}
