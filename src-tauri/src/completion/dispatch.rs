use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tauri::async_runtime::JoinHandle;
use tracing::{debug, error};

use super::{CompletionClient, CompletionError};
use crate::config::ConfigManager;
use crate::selection::runtime::{ServiceMsg, ServiceSender};
use crate::selection::ActionItem;
use crate::window::WindowId;

/// Output of a streamed generation, addressed to one action window.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(String),
    Complete(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub action: String,
    pub text: String,
    pub system_prompt: Option<String>,
}

/// Instruction placed before the selected text for the built-in actions.
pub fn instruction_for(action: &str) -> Option<&'static str> {
    match action {
        "explain" => Some("Explain the following text in simple terms:"),
        "summarize" => Some("Summarize this text in 2-3 sentences:"),
        "translate" => Some("Translate this text to English:"),
        _ => None,
    }
}

impl CompletionRequest {
    /// `None` for actions that never reach the model (copy, search) or carry no text.
    pub fn for_action(item: &ActionItem) -> Option<Self> {
        if matches!(item.id.as_str(), "copy" | "search") {
            return None;
        }
        let selected = item.selected_text.as_deref()?.trim();
        if selected.is_empty() {
            return None;
        }

        let text = match instruction_for(&item.id) {
            Some(instruction) => format!("{}\n\n{}", instruction, selected),
            None => selected.to_string(),
        };

        Some(Self {
            action: item.id.clone(),
            text,
            system_prompt: None,
        })
    }
}

/// Starts completions on behalf of the orchestrator without blocking it.
pub trait CompletionDispatcher: Send {
    fn dispatch(&self, window: WindowId, request: CompletionRequest);
    /// Drop whatever is still streaming into `window`. No-op if nothing is.
    fn cancel(&self, window: &WindowId);
}

/// Spawns the streaming request on the Tauri runtime and posts its output
/// back into the orchestrator's queue.
pub struct TokioCompletionDispatcher {
    sender: ServiceSender,
    config: Arc<ConfigManager>,
    /// Latest task per action window, aborted when the window goes away
    tasks: Mutex<HashMap<WindowId, JoinHandle<()>>>,
}

impl TokioCompletionDispatcher {
    pub fn new(sender: ServiceSender, config: Arc<ConfigManager>) -> Self {
        Self {
            sender,
            config,
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl CompletionDispatcher for TokioCompletionDispatcher {
    fn dispatch(&self, window: WindowId, request: CompletionRequest) {
        let settings = self.config.get_all().lm_studio;
        let sender = self.sender.clone();
        debug!("Dispatching {} completion to {}", request.action, window);

        let task_window = window.clone();
        let task = tauri::async_runtime::spawn(async move {
            let client = match CompletionClient::new(&settings) {
                Ok(client) => client,
                Err(e) => {
                    error!("Failed to build completion client: {}", e);
                    post(&sender, &window, StreamEvent::Error(e.to_string()));
                    return;
                }
            };

            let (chunk_tx, done_tx, err_tx) = (sender.clone(), sender.clone(), sender);
            let (chunk_win, done_win, err_win) = (window.clone(), window.clone(), window);

            client
                .generate_completion_streaming(
                    &request.text,
                    request.system_prompt.as_deref(),
                    move |chunk| post(&chunk_tx, &chunk_win, StreamEvent::Chunk(chunk.to_string())),
                    move |full| post(&done_tx, &done_win, StreamEvent::Complete(full)),
                    move |err: CompletionError| post(&err_tx, &err_win, StreamEvent::Error(err.to_string())),
                )
                .await;
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(previous) = tasks.insert(task_window, task) {
                previous.abort();
            }
        }
    }

    fn cancel(&self, window: &WindowId) {
        let task = match self.tasks.lock() {
            Ok(mut tasks) => tasks.remove(window),
            Err(_) => None,
        };
        if let Some(task) = task {
            debug!("Cancelling completion for {}", window);
            task.abort();
        }
    }
}

fn post(sender: &ServiceSender, window: &WindowId, event: StreamEvent) {
    sender.send(ServiceMsg::Stream {
        window: window.clone(),
        event,
    });
}
