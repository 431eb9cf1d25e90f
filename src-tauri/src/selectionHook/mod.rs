// Selection hook adapter
//
// Contract between the orchestrator and the OS-level capability that watches
// mouse and keyboard input system-wide. Events reach the orchestrator through a
// single sink as a tagged enum; controls report failure with `false`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::geometry::Point;

#[cfg(any(target_os = "windows", target_os = "macos"))]
mod native;
mod unsupported;

#[cfg(any(target_os = "windows", target_os = "macos"))]
pub use native::NativeSelectionHook;
pub use unsupported::UnsupportedHook;

/// Minimum pointer travel (px) between press and release for a drag selection.
pub const DRAG_THRESHOLD: f64 = 5.0;

/// Max delay between two clicks of a double click.
pub const DOUBLE_CLICK_INTERVAL: Duration = Duration::from_millis(500);

/// How long a passive-mode gesture waits for its Ctrl tap.
pub const PASSIVE_TRIGGER_WINDOW: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HookFilterMode {
    Whitelist,
    Blacklist,
}

/// How precisely the selection's position is known.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PosLevel {
    None,
    MouseSingle,
    MouseDual,
    Sel2Points,
    SelFull,
    SelDetailed,
}

/// Snapshot of one selection, created by the hook and consumed once.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextSelectionData {
    pub text: String,
    pub program_name: String,
    pub pos_level: PosLevel,
    pub start_top: Point,
    pub start_bottom: Point,
    pub end_top: Point,
    pub end_bottom: Point,
    pub mouse_pos_start: Point,
    pub mouse_pos_end: Point,
    pub is_fullscreen: bool,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

/// Mouse press in screen coordinates as reported by the OS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouseEventData {
    pub position: Point,
    pub button: MouseButton,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelEventData {
    pub delta_x: i64,
    pub delta_y: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyEventData {
    pub key: String,
}

/// Everything the hook can report.
#[derive(Clone, Debug, PartialEq)]
pub enum HookEvent {
    TextSelection(TextSelectionData),
    MouseDown(MouseEventData),
    MouseWheel(WheelEventData),
    KeyDown(KeyEventData),
    /// Recoverable; the hook keeps running
    Error(String),
    /// The hook stopped for good, e.g. input monitoring was denied
    Unavailable(String),
}

/// Event sink; may be invoked from any thread.
pub type HookSink = Arc<dyn Fn(HookEvent) + Send + Sync>;

#[derive(Clone, Debug, PartialEq)]
pub struct HookStartOptions {
    pub filter_mode: HookFilterMode,
    pub filter_list: Vec<String>,
    pub passive: bool,
}

pub trait SelectionHook: Send {
    /// Begin delivering events to `sink`. Returns `false` when the capability is unavailable.
    fn start(&mut self, options: HookStartOptions, sink: HookSink) -> bool;
    fn stop(&mut self) -> bool;
    fn cleanup(&mut self);
    fn set_global_filter_mode(&mut self, mode: HookFilterMode, list: &[String]) -> bool;
    fn set_selection_passive_mode(&mut self, passive: bool) -> bool;
    fn write_to_clipboard(&mut self, text: &str) -> bool;
    /// Capture whatever is selected right now (shortcut trigger).
    fn request_selection(&mut self) -> bool;
}

/// The hook for the current OS.
pub fn platform_hook() -> Box<dyn SelectionHook> {
    #[cfg(any(target_os = "windows", target_os = "macos"))]
    {
        Box::new(NativeSelectionHook::new())
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Box::new(UnsupportedHook)
    }
}

/// Whether selections made in `app_name` (or the executable `exe_name`) pass the filter.
pub fn filter_allows(mode: HookFilterMode, list: &[String], app_name: &str, exe_name: &str) -> bool {
    let listed = list.iter().any(|entry| {
        let entry = entry.trim();
        !entry.is_empty() && (entry.eq_ignore_ascii_case(app_name) || entry.eq_ignore_ascii_case(exe_name))
    });
    match mode {
        HookFilterMode::Whitelist => listed,
        HookFilterMode::Blacklist => !listed,
    }
}

/// A finished pointer gesture that probably selected text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionGesture {
    pub start: Point,
    pub end: Point,
    pub pos_level: PosLevel,
}

/// Turns raw pointer and Ctrl key events into selection gestures.
#[derive(Debug, Default)]
pub struct GestureTracker {
    press: Option<Point>,
    last_click: Option<(Point, Instant)>,
    pending: Option<(SelectionGesture, Instant)>,
    ctrl_down: bool,
    ctrl_alone: bool,
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn left_press(&mut self, position: Point) {
        self.press = Some(position);
    }

    /// Returns a gesture for a drag of at least [`DRAG_THRESHOLD`] or a double click.
    pub fn left_release(&mut self, position: Point, now: Instant) -> Option<SelectionGesture> {
        let start = self.press.take()?;

        if distance(start, position) >= DRAG_THRESHOLD {
            self.last_click = None;
            return Some(SelectionGesture {
                start,
                end: position,
                pos_level: PosLevel::MouseDual,
            });
        }

        match self.last_click.take() {
            Some((prev, at))
                if now.duration_since(at) <= DOUBLE_CLICK_INTERVAL
                    && distance(prev, position) < DRAG_THRESHOLD =>
            {
                Some(SelectionGesture {
                    start: position,
                    end: position,
                    pos_level: PosLevel::MouseSingle,
                })
            }
            _ => {
                self.last_click = Some((position, now));
                None
            }
        }
    }

    /// Park a gesture until the passive trigger fires.
    pub fn hold(&mut self, gesture: SelectionGesture, now: Instant) {
        self.pending = Some((gesture, now));
    }

    pub fn ctrl_press(&mut self) {
        if !self.ctrl_down {
            self.ctrl_down = true;
            self.ctrl_alone = true;
        }
    }

    /// Any non-Ctrl key spoils the current Ctrl tap.
    pub fn other_key_press(&mut self) {
        self.ctrl_alone = false;
    }

    /// A lone Ctrl tap releases the parked gesture if it is still fresh.
    pub fn ctrl_release(&mut self, now: Instant) -> Option<SelectionGesture> {
        let tapped = self.ctrl_down && self.ctrl_alone;
        self.ctrl_down = false;
        self.ctrl_alone = false;
        if !tapped {
            return None;
        }

        match self.pending.take() {
            Some((gesture, at)) if now.duration_since(at) <= PASSIVE_TRIGGER_WINDOW => Some(gesture),
            _ => None,
        }
    }
}

fn distance(a: Point, b: Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}
