use serde::{Deserialize, Serialize};

use crate::window::{WindowId, WindowKind, WindowMessage};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum StreamStatus {
    /// No completion requested yet
    #[default]
    Idle,
    Streaming,
    Complete,
    Failed,
}

/// Content-side state of one window
#[derive(Debug)]
pub struct WindowInstance {
    pub id: WindowId,
    pub kind: WindowKind,
    pub ready: bool,                // Page finished loading
    pub backlog: Vec<WindowMessage>, // Messages waiting for `ready`
    pub transcript: String,          // Streamed text so far
    pub status: StreamStatus,
}

impl WindowInstance {
    pub fn new(id: WindowId, kind: WindowKind) -> Self {
        Self {
            id,
            kind,
            ready: false,
            backlog: Vec::new(),
            transcript: String::new(),
            status: StreamStatus::Idle,
        }
    }
}
