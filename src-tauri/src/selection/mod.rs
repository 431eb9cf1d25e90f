// Toolbar orchestrator
//
// `SelectionService` is a plain state machine fed one `ServiceMsg` at a time by
// the runtime thread. Everything platform specific sits behind the traits in
// `selection_hook`, `window`, `presentation` and `timers`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod presentation;
pub mod runtime;
pub mod service;
pub mod timers;

#[cfg(test)]
pub(crate) mod testing;

pub use presentation::PresentationStrategy;
pub use runtime::{Command, InstanceSlot, SelectionHandle, ServiceMsg, ServiceSender};
pub use service::{SelectionService, ServiceParts};

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("text selection is not supported on this platform")]
    Unsupported,
    #[error("a selection service is already running")]
    AlreadyRunning,
    #[error("the selection hook could not be started")]
    HookUnavailable,
    #[error("the selection service has stopped")]
    ServiceGone,
}

/// An action the user picked on the toolbar.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub is_built_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_engine: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ActionItem {
    /// Web search for the selected text, using the item's engine hint.
    pub fn search_url(&self) -> Option<reqwest::Url> {
        let text = self.selected_text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        let base = match self.search_engine.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("bing") => "https://www.bing.com/search",
            Some("duckduckgo") => "https://duckduckgo.com/",
            Some("baidu") => "https://www.baidu.com/s",
            _ => "https://www.google.com/search",
        };
        let param = if base.contains("baidu") { "wd" } else { "q" };
        reqwest::Url::parse_with_params(base, &[(param, text)]).ok()
    }
}

/// First characters of a selection, for log lines.
pub(crate) fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 30;
    let mut out: String = text.chars().take(MAX_CHARS).collect();
    if text.chars().count() > MAX_CHARS {
        out.push_str("...");
    }
    out
}
