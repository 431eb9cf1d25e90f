// Completion client for the local model server
mod completion;

// Settings store
mod config;

mod geometry;
mod logging;

// Toolbar orchestrator and its runtime
mod selection;

// OS-level selection hook
#[path = "selectionHook/mod.rs"]
mod selection_hook;

// Per-window content state
mod state;

// Window abstraction, pool and Tauri backend
mod window;

use completion::{CompletionClient, CompletionError, TokioCompletionDispatcher};
use config::{ConfigManager, SettingKey, SettingsConfig, Subscription, TriggerMode};
use selection::runtime::{self, InstanceSlot};
use selection::timers::TokioTimers;
use selection::{presentation, ActionItem, SelectionHandle, SelectionService, ServiceParts};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tauri::{AppHandle, Emitter, EventTarget, Manager, RunEvent, State, WebviewWindow};
use tauri_plugin_global_shortcut::{GlobalShortcutExt, Shortcut, ShortcutState};
use tauri_plugin_opener::OpenerExt;
use tracing::{debug, error, info, warn};
use window::tauri_window::{TauriScreen, TauriWindowFactory};
use window::{ResultOptions, WindowId};

const SETTINGS_FILE: &str = "settings.json";
const SETTINGS_WINDOW: &str = "settings";
/// How long exit waits for the selection service to release the hook
const QUIT_WAIT: Duration = Duration::from_millis(500);

struct AppState {
    config: Arc<ConfigManager>,
    /// `None` where text selection is unsupported or failed to start
    selection: Option<SelectionHandle>,
    _instance: InstanceSlot,
    _subscriptions: Mutex<Vec<Subscription>>,
}

impl AppState {
    fn selection(&self) -> Result<&SelectionHandle, String> {
        self.selection
            .as_ref()
            .ok_or_else(|| selection::SelectionError::Unsupported.to_string())
    }
}

// ===== Settings Commands =====

#[tauri::command]
fn get_settings(state: State<AppState>) -> SettingsConfig {
    state.config.get_all()
}

#[tauri::command]
fn set_setting(key: String, value: Value, state: State<AppState>) -> Result<(), String> {
    let key = SettingKey::from_str(&key).map_err(|e| e.to_string())?;
    state.config.set(key, value).map_err(|e| e.to_string())?;
    info!("Settings updated: {}", key);
    Ok(())
}

#[tauri::command]
fn reset_settings(state: State<AppState>) -> Result<(), String> {
    state.config.reset().map_err(|e| e.to_string())
}

#[tauri::command]
fn open_settings(app: AppHandle) -> Result<(), String> {
    let window = app
        .get_webview_window(SETTINGS_WINDOW)
        .ok_or_else(|| "Settings window not found".to_string())?;
    window
        .show()
        .map_err(|e| format!("Failed to show settings: {}", e))?;
    window
        .set_focus()
        .map_err(|e| format!("Failed to focus settings: {}", e))
}

// ===== Selection Commands =====

#[tauri::command]
fn hide_toolbar(state: State<AppState>) -> Result<(), String> {
    state.selection()?.hide_toolbar().map_err(|e| e.to_string())
}

#[tauri::command]
async fn write_to_clipboard(text: String, state: State<'_, AppState>) -> Result<bool, String> {
    state
        .selection()?
        .write_to_clipboard(text)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn determine_toolbar_size(width: f64, height: f64, state: State<AppState>) -> Result<(), String> {
    state
        .selection()?
        .determine_toolbar_size(width, height)
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn process_action(item: ActionItem, app: AppHandle, state: State<AppState>) -> Result<(), String> {
    let selection = state.selection()?;

    if item.id == "search" {
        let url = item
            .search_url()
            .ok_or_else(|| "Nothing to search for".to_string())?;
        app.opener()
            .open_url(url.as_str(), None::<&str>)
            .map_err(|e| format!("Failed to open browser: {}", e))?;
        return selection.hide_toolbar().map_err(|e| e.to_string());
    }

    selection.process_action(item).map_err(|e| e.to_string())
}

#[tauri::command]
fn close_action_window(window: WebviewWindow, state: State<AppState>) -> Result<(), String> {
    state
        .selection()?
        .close_action_window(WindowId::from(window.label()))
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn minimize_action_window(window: WebviewWindow, state: State<AppState>) -> Result<(), String> {
    state
        .selection()?
        .minimize_action_window(WindowId::from(window.label()))
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn pin_action_window(pinned: bool, window: WebviewWindow, state: State<AppState>) -> Result<(), String> {
    state
        .selection()?
        .pin_action_window(WindowId::from(window.label()), pinned)
        .map_err(|e| e.to_string())
}

#[tauri::command]
async fn toggle_selection(enabled: Option<bool>, state: State<'_, AppState>) -> Result<bool, String> {
    state
        .selection()?
        .toggle_enabled(enabled)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn open_result(options: ResultOptions, state: State<AppState>) -> Result<(), String> {
    state.selection()?.open_result(options).map_err(|e| e.to_string())
}

#[tauri::command]
fn close_result(state: State<AppState>) -> Result<(), String> {
    state.selection()?.close_result().map_err(|e| e.to_string())
}

#[tauri::command]
fn update_result(result: String, state: State<AppState>) -> Result<(), String> {
    state.selection()?.update_result(result).map_err(|e| e.to_string())
}

// ===== Model Server Commands =====

fn client(state: &AppState) -> Result<CompletionClient, String> {
    CompletionClient::new(&state.config.get_all().lm_studio).map_err(|e| e.to_string())
}

#[tauri::command]
async fn test_connection(state: State<'_, AppState>) -> Result<bool, String> {
    client(&state)?.test_connection().await.map_err(|e| {
        warn!("Model server connection test failed: {}", e);
        e.to_string()
    })
}

#[tauri::command]
async fn list_models(state: State<'_, AppState>) -> Result<Vec<String>, String> {
    client(&state)?.list_models().await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn generate_completion(prompt: String, state: State<'_, AppState>) -> Result<String, String> {
    client(&state)?
        .generate_completion(&prompt, None)
        .await
        .map_err(|e| e.to_string())
}

fn emit_to_window<S: serde::Serialize + Clone>(window: &WebviewWindow, channel: &str, payload: S) {
    let target = EventTarget::webview_window(window.label());
    if let Err(e) = window.emit_to(target, channel, payload) {
        warn!("Failed to send {} to {}: {}", channel, window.label(), e);
    }
}

/// Stream a completion to the calling window as `result:*` events.
#[tauri::command]
async fn generate_completion_stream(
    prompt: String,
    window: WebviewWindow,
    state: State<'_, AppState>,
) -> Result<(), String> {
    let client = client(&state)?;

    let failure: Arc<Mutex<Option<CompletionError>>> = Arc::new(Mutex::new(None));
    let failed = failure.clone();

    client
        .generate_completion_streaming(
            &prompt,
            None,
            |chunk| emit_to_window(&window, "result:chunk", chunk),
            |full| emit_to_window(&window, "result:complete", full),
            |err| {
                emit_to_window(&window, "result:error", err.to_string());
                if let Ok(mut slot) = failed.lock() {
                    *slot = Some(err);
                }
            },
        )
        .await;

    let failure = failure.lock().ok().and_then(|mut slot| slot.take());
    match failure {
        Some(err) => Err(err.to_string()),
        None => Ok(()),
    }
}

// ===== Bootstrap =====

fn load_config(app: &AppHandle) -> ConfigManager {
    match app.path().app_config_dir() {
        Ok(dir) => ConfigManager::load(dir.join(SETTINGS_FILE)),
        Err(e) => {
            warn!("No config directory ({}), settings will not persist", e);
            ConfigManager::in_memory()
        }
    }
}

/// Build the orchestrator, start the hook and run the service loop.
fn start_selection(
    app: &AppHandle,
    config: &Arc<ConfigManager>,
    slot: &InstanceSlot,
) -> Option<SelectionHandle> {
    let Some(strategy) = presentation::for_current_platform() else {
        warn!("Text selection is not supported on this platform");
        return None;
    };

    let (sender, receiver) = runtime::channel();
    let parts = ServiceParts {
        hook: selection_hook::platform_hook(),
        factory: Box::new(TauriWindowFactory::new(app.clone(), sender.clone())),
        screen: Box::new(TauriScreen::new(app.clone())),
        strategy,
        timers: Box::new(TokioTimers::new(sender.clone())),
        dispatcher: Box::new(TokioCompletionDispatcher::new(sender.clone(), config.clone())),
    };

    let mut service = match SelectionService::new(slot, parts, config.get_all(), sender.clone()) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to create selection service: {}", e);
            return None;
        }
    };
    if let Err(e) = service.start() {
        warn!("Selection service not started: {}", e);
    }

    match runtime::spawn(service, receiver) {
        Ok(_) => Some(SelectionHandle::new(sender)),
        Err(e) => {
            error!("Failed to spawn selection service thread: {}", e);
            None
        }
    }
}

/// Register the capture shortcut when the shortcut trigger is active.
fn apply_shortcut(app: &AppHandle, settings: &SettingsConfig) {
    let shortcuts = app.global_shortcut();
    if let Err(e) = shortcuts.unregister_all() {
        warn!("Failed to clear global shortcuts: {}", e);
    }
    if settings.trigger_mode != TriggerMode::Shortcut {
        return;
    }

    match Shortcut::from_str(&settings.shortcut_key) {
        Ok(shortcut) => match shortcuts.register(shortcut) {
            Ok(()) => info!("Capture shortcut registered: {}", settings.shortcut_key),
            Err(e) => error!("Failed to register {}: {}", settings.shortcut_key, e),
        },
        Err(e) => warn!("Invalid shortcut {:?}: {}", settings.shortcut_key, e),
    }
}

/// Forward every settings change to the orchestrator and keep the shortcut in sync.
fn watch_config(
    app: &AppHandle,
    config: &Arc<ConfigManager>,
    selection: Option<SelectionHandle>,
) -> Vec<Subscription> {
    SettingKey::ALL
        .into_iter()
        .map(|key| {
            let weak: Weak<ConfigManager> = Arc::downgrade(config);
            let app = app.clone();
            let selection = selection.clone();
            config.subscribe(key, move |_| {
                let Some(config) = weak.upgrade() else {
                    return;
                };
                let settings = config.get_all();
                if matches!(key, SettingKey::TriggerMode | SettingKey::ShortcutKey) {
                    apply_shortcut(&app, &settings);
                }
                if let Some(selection) = &selection {
                    selection.config_changed(settings);
                }
            })
        })
        .collect()
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    logging::init(logging::debug_requested());

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(
            tauri_plugin_global_shortcut::Builder::new()
                .with_handler(|app, shortcut, event| {
                    // Only process on key press, not release
                    if event.state != ShortcutState::Pressed {
                        return;
                    }
                    debug!("Capture shortcut pressed: {:?}", shortcut);
                    if let Some(state) = app.try_state::<AppState>() {
                        if let Ok(selection) = state.selection() {
                            if let Err(e) = selection.request_selection() {
                                warn!("Capture shortcut ignored: {}", e);
                            }
                        }
                    }
                })
                .build(),
        )
        .setup(|app| {
            let handle = app.handle().clone();
            let config = Arc::new(load_config(&handle));
            let instance = InstanceSlot::new();

            let selection = start_selection(&handle, &config, &instance);
            let subscriptions = watch_config(&handle, &config, selection.clone());
            apply_shortcut(&handle, &config.get_all());

            app.manage(AppState {
                config,
                selection,
                _instance: instance,
                _subscriptions: Mutex::new(subscriptions),
            });
            info!("Selection assistant initialized");
            Ok(())
        })
        .on_window_event(|window, event| {
            // Closing the settings window ends the app, except on macOS
            if window.label() == SETTINGS_WINDOW
                && matches!(event, tauri::WindowEvent::Destroyed)
                && !cfg!(target_os = "macos")
            {
                window.app_handle().exit(0);
            }
        })
        .invoke_handler(tauri::generate_handler![
            // Settings
            get_settings,
            set_setting,
            reset_settings,
            open_settings,
            // Selection toolbar and action windows
            hide_toolbar,
            write_to_clipboard,
            determine_toolbar_size,
            process_action,
            close_action_window,
            minimize_action_window,
            pin_action_window,
            toggle_selection,
            // Result window
            open_result,
            close_result,
            update_result,
            // Model server
            test_connection,
            list_models,
            generate_completion,
            generate_completion_stream,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = app.try_state::<AppState>() {
                if let Some(selection) = &state.selection {
                    if selection.quit(QUIT_WAIT) {
                        debug!("Selection service cleaned up");
                    }
                }
            }
            info!("Selection assistant exiting");
        }
    });
}
