// Window abstraction used by the orchestrator.
//
// The orchestrator only talks to `WindowHandle`/`WindowFactory`/`Screen`; the
// Tauri backend lives in `tauri_window`, fakes live in the selection tests.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::geometry::{Display, Point, Rect, Size};
use crate::selection::ActionItem;
use crate::selection_hook::TextSelectionData;

pub mod pool;
pub mod tauri_window;

pub use pool::WindowPool;

/// Default toolbar size before the page reports its real size.
pub const TOOLBAR_WIDTH: f64 = 350.0;
pub const TOOLBAR_HEIGHT: f64 = 43.0;

pub const ACTION_WINDOW_WIDTH: f64 = 500.0;
pub const ACTION_WINDOW_HEIGHT: f64 = 400.0;
pub const ACTION_WINDOW_MIN_WIDTH: f64 = 300.0;
pub const ACTION_WINDOW_MIN_HEIGHT: f64 = 200.0;

pub const RESULT_WINDOW_WIDTH: f64 = 800.0;
pub const RESULT_WINDOW_HEIGHT: f64 = 600.0;

/// Where freshly created windows park until they are first placed.
pub const OFFSCREEN_POSITION: Point = Point { x: -10000.0, y: -10000.0 };

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("failed to create {kind} window: {reason}")]
    Creation { kind: WindowKind, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct WindowId(pub String);

impl WindowId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowId {
    fn from(s: &str) -> Self {
        WindowId(s.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Toolbar,
    Action,
    Result,
    /// The main window from the app config; never built by a factory
    Settings,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowKind::Toolbar => "toolbar",
            WindowKind::Action => "action",
            WindowKind::Result => "result",
            WindowKind::Settings => "settings",
        };
        f.write_str(name)
    }
}

/// Payload of the standalone result window.
#[derive(Clone, Serialize, serde::Deserialize, Debug, PartialEq, Default)]
pub struct ResultOptions {
    pub action: String,
    pub text: String,
    pub result: String,
}

/// Typed messages pushed into window content.
#[derive(Clone, Debug, PartialEq)]
pub enum WindowMessage {
    TextSelected(TextSelectionData),
    ToolbarVisibility(bool),
    ActionData(ActionItem),
    ResultChunk(String),
    ResultComplete(String),
    ResultError(String),
    OpenResult(ResultOptions),
    UpdateResult(String),
}

impl WindowMessage {
    /// Event name the page listens on
    pub fn channel(&self) -> &'static str {
        match self {
            WindowMessage::TextSelected(_) => "selection:text-selected",
            WindowMessage::ToolbarVisibility(_) => "selection:toolbar-visibility-change",
            WindowMessage::ActionData(_) => "selection:update-action-data",
            WindowMessage::ResultChunk(_) => "result:chunk",
            WindowMessage::ResultComplete(_) => "result:complete",
            WindowMessage::ResultError(_) => "result:error",
            WindowMessage::OpenResult(_) => "window:open-result",
            WindowMessage::UpdateResult(_) => "window:update-result",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            WindowMessage::TextSelected(data) => json!(data),
            WindowMessage::ToolbarVisibility(visible) => json!(visible),
            WindowMessage::ActionData(item) => json!(item),
            WindowMessage::ResultChunk(text)
            | WindowMessage::ResultComplete(text)
            | WindowMessage::ResultError(text)
            | WindowMessage::UpdateResult(text) => json!(text),
            WindowMessage::OpenResult(options) => json!(options),
        }
    }
}

/// A native window. Backend failures are logged by the implementation.
pub trait WindowHandle: Send + Sync {
    fn id(&self) -> &WindowId;
    fn kind(&self) -> WindowKind;
    fn is_alive(&self) -> bool;
    fn is_visible(&self) -> bool;
    fn is_focusable(&self) -> bool;
    /// Logical bounds, `None` once the window is gone
    fn bounds(&self) -> Option<Rect>;
    fn set_bounds(&self, bounds: Rect);
    fn set_always_on_top(&self, on_top: bool);
    fn set_focusable(&self, focusable: bool);
    fn set_visible_on_all_workspaces(&self, visible: bool);
    fn show(&self);
    /// Show without activating the window, raised to the top of its layer
    fn show_inactive(&self);
    fn focus(&self);
    fn hide(&self);
    fn minimize(&self);
    fn close(&self);
    fn destroy(&self);
    /// Synthesize a pointer move off the page so hover state clears.
    fn clear_hover(&self);
    fn send(&self, message: &WindowMessage);
}

pub type SharedWindow = Arc<dyn WindowHandle>;

/// Creates windows. Lifecycle events (ready, blur, resize, destroyed) are
/// reported back to the orchestrator asynchronously.
pub trait WindowFactory: Send {
    fn create_toolbar(&self, size: Size) -> Result<SharedWindow, WindowError>;
    fn create_action(&self, size: Size) -> Result<SharedWindow, WindowError>;
    fn create_result(&self, size: Size) -> Result<SharedWindow, WindowError>;
    /// Every visible top-level window of this app
    fn visible_windows(&self) -> Vec<SharedWindow>;
}

pub trait Screen: Send {
    /// Cursor position in logical coordinates
    fn cursor_position(&self) -> Point;
    fn display_nearest(&self, point: Point) -> Display;
    /// Physical screen coordinates to logical (DIP) ones
    fn to_logical(&self, physical: Point) -> Point;
}
