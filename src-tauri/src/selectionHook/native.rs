// rdev-backed hook for Windows and macOS.
//
// rdev's listener thread can never be joined, so it is spawned once and
// `stop()` only silences it. Text capture runs on short-lived worker threads:
// clear the clipboard, synthesize the copy keystroke, read the clipboard back,
// restore what was there before.

use rdev::{Button, EventType, Key};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{
    filter_allows, GestureTracker, HookEvent, HookFilterMode, HookSink, HookStartOptions,
    KeyEventData, MouseButton, MouseEventData, PosLevel, SelectionGesture, SelectionHook,
    TextSelectionData, WheelEventData,
};
use crate::geometry::Point;

const KEY_EVENT_DELAY: Duration = Duration::from_millis(20);
const CLIPBOARD_SETTLE_DELAY: Duration = Duration::from_millis(120);

struct HookState {
    running: bool,
    passive: bool,
    filter_mode: HookFilterMode,
    filter_list: Vec<String>,
    sink: Option<HookSink>,
    tracker: GestureTracker,
    cursor: Point,
}

pub struct NativeSelectionHook {
    state: Arc<Mutex<HookState>>,
    /// Set while we synthesize keystrokes, so they are not reported as user input.
    synthesizing: Arc<AtomicBool>,
    listener_started: bool,
    /// Set by the listener thread when `rdev::listen` gives up.
    listener_failed: Arc<AtomicBool>,
}

impl NativeSelectionHook {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HookState {
                running: false,
                passive: false,
                filter_mode: HookFilterMode::Blacklist,
                filter_list: Vec::new(),
                sink: None,
                tracker: GestureTracker::new(),
                cursor: Point::new(0.0, 0.0),
            })),
            synthesizing: Arc::new(AtomicBool::new(false)),
            listener_started: false,
            listener_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_listener(&mut self) {
        let state = self.state.clone();
        let synthesizing = self.synthesizing.clone();
        let failed = self.listener_failed.clone();

        let spawned = thread::Builder::new()
            .name("selection-hook".into())
            .spawn(move || {
                info!("Selection hook listener started");
                let listener_state = state.clone();
                let listener_synth = synthesizing.clone();
                let result = rdev::listen(move |event| {
                    on_input(&listener_state, &listener_synth, event.event_type);
                });
                if let Err(e) = result {
                    error!("Selection hook listener failed: {:?}", e);
                    failed.store(true, Ordering::SeqCst);
                    let sink = {
                        let mut state = lock(&state);
                        state.running = false;
                        state.sink.clone()
                    };
                    if let Some(sink) = sink {
                        sink(HookEvent::Unavailable(format!(
                            "global input listener failed: {:?}",
                            e
                        )));
                    }
                }
            });

        match spawned {
            Ok(_) => self.listener_started = true,
            Err(e) => error!("Failed to spawn selection hook thread: {}", e),
        }
    }
}

impl Default for NativeSelectionHook {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionHook for NativeSelectionHook {
    fn start(&mut self, options: HookStartOptions, sink: HookSink) -> bool {
        if self.listener_failed.load(Ordering::SeqCst) {
            return false;
        }
        {
            let mut state = lock(&self.state);
            state.passive = options.passive;
            state.filter_mode = options.filter_mode;
            state.filter_list = options.filter_list;
            state.sink = Some(sink);
            state.tracker = GestureTracker::new();
            state.running = true;
        }

        if !self.listener_started {
            self.spawn_listener();
        }
        self.listener_started
    }

    fn stop(&mut self) -> bool {
        let mut state = lock(&self.state);
        let was_running = state.running;
        state.running = false;
        was_running
    }

    fn cleanup(&mut self) {
        let mut state = lock(&self.state);
        state.running = false;
        state.sink = None;
    }

    fn set_global_filter_mode(&mut self, mode: HookFilterMode, list: &[String]) -> bool {
        let mut state = lock(&self.state);
        state.filter_mode = mode;
        state.filter_list = list.to_vec();
        true
    }

    fn set_selection_passive_mode(&mut self, passive: bool) -> bool {
        let mut state = lock(&self.state);
        state.passive = passive;
        true
    }

    fn write_to_clipboard(&mut self, text: &str) -> bool {
        match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.to_owned())) {
            Ok(()) => true,
            Err(e) => {
                warn!("Clipboard write failed: {}", e);
                false
            }
        }
    }

    fn request_selection(&mut self) -> bool {
        let cursor = {
            let state = lock(&self.state);
            if !state.running {
                return false;
            }
            state.cursor
        };
        spawn_capture(
            self.state.clone(),
            self.synthesizing.clone(),
            SelectionGesture {
                start: cursor,
                end: cursor,
                pos_level: PosLevel::MouseSingle,
            },
        );
        true
    }
}

fn lock(state: &Mutex<HookState>) -> MutexGuard<'_, HookState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn on_input(state: &Arc<Mutex<HookState>>, synthesizing: &Arc<AtomicBool>, event: EventType) {
    let synthetic = synthesizing.load(Ordering::SeqCst);
    let mut guard = lock(state);
    if !guard.running {
        return;
    }
    let Some(sink) = guard.sink.clone() else {
        return;
    };

    let mut forward = None;
    let mut capture = None;

    match event {
        EventType::MouseMove { x, y } => {
            guard.cursor = Point::new(x, y);
        }
        EventType::ButtonPress(button) => {
            let position = guard.cursor;
            if button == Button::Left {
                guard.tracker.left_press(position);
            }
            forward = Some(HookEvent::MouseDown(MouseEventData {
                position,
                button: map_button(button),
            }));
        }
        EventType::ButtonRelease(Button::Left) => {
            let position = guard.cursor;
            if let Some(gesture) = guard.tracker.left_release(position, Instant::now()) {
                if guard.passive {
                    guard.tracker.hold(gesture, Instant::now());
                } else {
                    capture = Some(gesture);
                }
            }
        }
        EventType::Wheel { delta_x, delta_y } => {
            forward = Some(HookEvent::MouseWheel(WheelEventData { delta_x, delta_y }));
        }
        EventType::KeyPress(key) if !synthetic => {
            if is_ctrl(key) {
                guard.tracker.ctrl_press();
            } else {
                guard.tracker.other_key_press();
            }
            forward = Some(HookEvent::KeyDown(KeyEventData {
                key: format!("{:?}", key),
            }));
        }
        EventType::KeyRelease(key) if !synthetic && is_ctrl(key) => {
            if guard.passive {
                capture = guard.tracker.ctrl_release(Instant::now());
            }
        }
        _ => {}
    }
    drop(guard);

    if let Some(event) = forward {
        sink(event);
    }
    if let Some(gesture) = capture {
        spawn_capture(state.clone(), synthesizing.clone(), gesture);
    }
}

fn is_ctrl(key: Key) -> bool {
    matches!(key, Key::ControlLeft | Key::ControlRight)
}

fn map_button(button: Button) -> MouseButton {
    match button {
        Button::Left => MouseButton::Left,
        Button::Right => MouseButton::Right,
        Button::Middle => MouseButton::Middle,
        Button::Unknown(_) => MouseButton::Other,
    }
}

fn spawn_capture(state: Arc<Mutex<HookState>>, synthesizing: Arc<AtomicBool>, gesture: SelectionGesture) {
    let spawned = thread::Builder::new()
        .name("selection-capture".into())
        .spawn(move || capture_selection(&state, &synthesizing, gesture));
    if let Err(e) = spawned {
        error!("Failed to spawn selection capture thread: {}", e);
    }
}

fn capture_selection(state: &Mutex<HookState>, synthesizing: &AtomicBool, gesture: SelectionGesture) {
    let window = match active_win_pos_rs::get_active_window() {
        Ok(window) => window,
        Err(_) => {
            debug!("No foreground window, skipping capture");
            return;
        }
    };

    if window.process_id as u64 == u64::from(std::process::id()) {
        debug!("Selection inside our own window, ignored");
        return;
    }

    let exe_name = Path::new(&window.process_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (mode, list) = {
        let guard = lock(state);
        (guard.filter_mode, guard.filter_list.clone())
    };
    if !filter_allows(mode, &list, &window.app_name, &exe_name) {
        debug!("Selection in {} filtered out", window.app_name);
        return;
    }

    let text = match read_selected_text(synthesizing) {
        Ok(Some(text)) => text,
        Ok(None) => return,
        Err(e) => {
            warn!("Reading selected text failed: {}", e);
            if let Some(sink) = lock(state).sink.clone() {
                sink(HookEvent::Error(e));
            }
            return;
        }
    };

    let sink = {
        let guard = lock(state);
        if !guard.running {
            return;
        }
        guard.sink.clone()
    };

    let Some(sink) = sink else {
        return;
    };

    sink(HookEvent::TextSelection(TextSelectionData {
        text,
        program_name: window.app_name,
        pos_level: gesture.pos_level,
        start_top: gesture.start,
        start_bottom: gesture.start,
        end_top: gesture.end,
        end_bottom: gesture.end,
        mouse_pos_start: gesture.start,
        mouse_pos_end: gesture.end,
        is_fullscreen: false,
    }));
}

fn read_selected_text(synthesizing: &AtomicBool) -> Result<Option<String>, String> {
    let mut clipboard = arboard::Clipboard::new().map_err(|e| e.to_string())?;
    let previous = clipboard.get_text().ok();
    clipboard.clear().map_err(|e| e.to_string())?;

    synthesizing.store(true, Ordering::SeqCst);
    let copied = simulate_copy();
    thread::sleep(CLIPBOARD_SETTLE_DELAY);
    synthesizing.store(false, Ordering::SeqCst);
    copied?;

    let text = clipboard.get_text().ok().filter(|t| !t.trim().is_empty());

    if let Some(previous) = previous {
        if let Err(e) = clipboard.set_text(previous) {
            warn!("Failed to restore clipboard: {}", e);
        }
    }

    Ok(text)
}

fn simulate_copy() -> Result<(), String> {
    let modifier = if cfg!(target_os = "macos") {
        Key::MetaLeft
    } else {
        Key::ControlLeft
    };

    for event in [
        EventType::KeyPress(modifier),
        EventType::KeyPress(Key::KeyC),
        EventType::KeyRelease(Key::KeyC),
        EventType::KeyRelease(modifier),
    ] {
        rdev::simulate(&event).map_err(|e| format!("failed to synthesize copy: {:?}", e))?;
        thread::sleep(KEY_EVENT_DELAY);
    }
    Ok(())
}
