use std::collections::HashMap;

use self::window::{StreamStatus, WindowInstance};
use crate::geometry::{Point, Size};
use crate::window::{
    SharedWindow, WindowId, WindowKind, WindowMessage, TOOLBAR_HEIGHT, TOOLBAR_WIDTH,
};

pub mod window;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolbarPhase {
    /// No toolbar, or toolbar hidden
    Idle,
    /// Visible and watching for outside interaction
    Showing,
}

/// Process-wide toolbar state, owned by the orchestrator.
#[derive(Debug)]
pub struct ToolbarState {
    pub phase: ToolbarPhase,
    pub zoom: f64,
    /// Measured size reported by the page. `None` until the first report.
    pub reported_size: Option<Size>,
    pub position: Option<Point>,
    /// Outside-interaction listener armed
    pub armed: bool,
}

impl ToolbarState {
    pub fn new(zoom: f64) -> Self {
        Self {
            phase: ToolbarPhase::Idle,
            zoom,
            reported_size: None,
            position: None,
            armed: false,
        }
    }

    /// Reported size, or the default size scaled by zoom
    pub fn size(&self) -> Size {
        self.reported_size
            .unwrap_or_else(|| Size::new(TOOLBAR_WIDTH, TOOLBAR_HEIGHT).scaled(self.zoom))
    }

    pub fn is_showing(&self) -> bool {
        self.phase == ToolbarPhase::Showing
    }
}

/// Per-window content state: readiness, pending messages and stream output.
pub struct StateManager {
    pub windows: HashMap<String, WindowInstance>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            windows: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: &WindowId, kind: WindowKind) {
        self.windows
            .entry(id.0.clone())
            .or_insert_with(|| WindowInstance::new(id.clone(), kind));
    }

    pub fn get(&self, id: &WindowId) -> Option<&WindowInstance> {
        self.windows.get(id.as_str())
    }

    pub fn remove(&mut self, id: &WindowId) -> Option<WindowInstance> {
        self.windows.remove(id.as_str())
    }

    /// Send now if the page is loaded, otherwise queue until it is.
    pub fn deliver(&mut self, window: &SharedWindow, message: WindowMessage) {
        match self.windows.get_mut(window.id().as_str()) {
            Some(instance) if !instance.ready => instance.backlog.push(message),
            _ => window.send(&message),
        }
    }

    /// Mark a window loaded and hand back whatever was queued for it.
    /// Pooled windows often load before anyone registers them.
    pub fn mark_ready(&mut self, id: &WindowId, kind: WindowKind) -> Vec<WindowMessage> {
        let instance = self
            .windows
            .entry(id.0.clone())
            .or_insert_with(|| WindowInstance::new(id.clone(), kind));
        instance.ready = true;
        std::mem::take(&mut instance.backlog)
    }

    pub fn is_ready(&self, id: &WindowId) -> bool {
        self.get(id).is_some_and(|w| w.ready)
    }

    pub fn begin_stream(&mut self, id: &WindowId) {
        if let Some(instance) = self.windows.get_mut(id.as_str()) {
            instance.transcript.clear();
            instance.status = StreamStatus::Streaming;
        }
    }

    /// Append a chunk. Chunks after the stream ended are dropped.
    pub fn append_chunk(&mut self, id: &WindowId, chunk: &str) -> bool {
        match self.windows.get_mut(id.as_str()) {
            Some(instance) if instance.status == StreamStatus::Streaming => {
                instance.transcript.push_str(chunk);
                true
            }
            _ => false,
        }
    }

    pub fn finish_stream(&mut self, id: &WindowId, status: StreamStatus) -> bool {
        match self.windows.get_mut(id.as_str()) {
            Some(instance) if instance.status == StreamStatus::Streaming => {
                instance.status = status;
                true
            }
            _ => false,
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolbar_size_defaults_to_zoomed_constant() {
        let state = ToolbarState::new(0.9);
        assert_eq!(state.size(), Size::new(TOOLBAR_WIDTH * 0.9, TOOLBAR_HEIGHT * 0.9));

        let mut state = ToolbarState::new(1.0);
        state.reported_size = Some(Size::new(280.0, 40.0));
        assert_eq!(state.size(), Size::new(280.0, 40.0));
    }

    #[test]
    fn test_stream_transcript_lifecycle() {
        let mut manager = StateManager::new();
        let id = WindowId::from("action-1");
        manager.register(&id, WindowKind::Action);

        // Not streaming yet
        assert!(!manager.append_chunk(&id, "early"));

        manager.begin_stream(&id);
        for chunk in ["Sum", "mar", "y."] {
            assert!(manager.append_chunk(&id, chunk));
        }
        assert!(manager.finish_stream(&id, StreamStatus::Complete));
        assert!(!manager.append_chunk(&id, "late"));

        let instance = manager.get(&id).unwrap();
        assert_eq!(instance.transcript, "Summary.");
        assert_eq!(instance.status, StreamStatus::Complete);
    }

    #[test]
    fn test_mark_ready_returns_backlog_once() {
        let mut manager = StateManager::new();
        let id = WindowId::from("toolbar");
        manager.register(&id, WindowKind::Toolbar);
        manager
            .windows
            .get_mut("toolbar")
            .unwrap()
            .backlog
            .push(WindowMessage::ToolbarVisibility(true));

        assert_eq!(
            manager.mark_ready(&id, WindowKind::Toolbar),
            vec![WindowMessage::ToolbarVisibility(true)]
        );
        assert!(manager.mark_ready(&id, WindowKind::Toolbar).is_empty());
        assert!(manager.is_ready(&id));

        // Ready before registration keeps the ready flag
        let early = WindowId::from("action-2");
        manager.mark_ready(&early, WindowKind::Action);
        manager.register(&early, WindowKind::Action);
        assert!(manager.is_ready(&early));
    }
}
