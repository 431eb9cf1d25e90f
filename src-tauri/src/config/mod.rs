// Settings store with change subscriptions.
//
// The document lives in memory behind a mutex and is written back as pretty JSON
// on every change. Subscribers are notified after the lock is released.

use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod settings;

pub use settings::{
    EffectiveFilter, FilterConfig, FilterMode, ModelEndpointSettings, SettingKey,
    SettingsConfig, TriggerMode,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown setting key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("failed to persist settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Subscriber {
    id: u64,
    key: SettingKey,
    callback: Callback,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<Subscriber>,
}

/// Detaches its callback when dropped.
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Ok(mut subs) = subscribers.lock() {
                subs.entries.retain(|s| s.id != self.id);
            }
        }
    }
}

pub struct ConfigManager {
    settings: Mutex<SettingsConfig>,
    path: Option<PathBuf>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl ConfigManager {
    /// Load settings from `path`. A missing or unreadable document falls back to defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<SettingsConfig>(&raw) {
                Ok(settings) => {
                    info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("Settings file {} is corrupt, using defaults: {}", path.display(), e);
                    SettingsConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                SettingsConfig::default()
            }
            Err(e) => {
                warn!("Failed to read settings {}: {}", path.display(), e);
                SettingsConfig::default()
            }
        };

        Self {
            settings: Mutex::new(settings),
            path: Some(path),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
        }
    }

    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self::with_settings(SettingsConfig::default())
    }

    pub fn with_settings(settings: SettingsConfig) -> Self {
        Self {
            settings: Mutex::new(settings),
            path: None,
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
        }
    }

    pub fn get_all(&self) -> SettingsConfig {
        self.lock_settings().clone()
    }

    pub fn get(&self, key: SettingKey) -> Value {
        let settings = self.lock_settings();
        serde_json::to_value(&*settings)
            .ok()
            .and_then(|doc| doc.get(key.as_str()).cloned())
            .unwrap_or(Value::Null)
    }

    /// Validate, persist and publish a single key. Invalid values leave the
    /// store untouched. An object value is merged into the current one, so a
    /// partial `lmStudio` update keeps the fields it leaves out.
    pub fn set(&self, key: SettingKey, value: Value) -> Result<(), ConfigError> {
        let value = {
            let mut settings = self.lock_settings();

            let mut doc = serde_json::to_value(&*settings)?;
            let value = match (doc.get(key.as_str()), value) {
                (Some(Value::Object(current)), Value::Object(update)) => {
                    let mut merged = current.clone();
                    merged.extend(update);
                    Value::Object(merged)
                }
                (_, value) => value,
            };
            if doc.get(key.as_str()) == Some(&value) {
                return Ok(());
            }
            if let Value::Object(map) = &mut doc {
                map.insert(key.as_str().to_string(), value.clone());
            }

            let updated: SettingsConfig =
                serde_json::from_value(doc).map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;

            self.persist(&updated)?;
            *settings = updated;
            value
        };

        debug!("Setting {} changed", key);
        self.notify(key, &value);
        Ok(())
    }

    /// Restore every default and notify each key that actually changed.
    pub fn reset(&self) -> Result<(), ConfigError> {
        let defaults = SettingsConfig::default();
        let (before, after) = {
            let mut settings = self.lock_settings();
            let before = serde_json::to_value(&*settings)?;
            self.persist(&defaults)?;
            *settings = defaults;
            (before, serde_json::to_value(&*settings)?)
        };

        info!("Settings reset to defaults");
        for key in SettingKey::ALL {
            let old = before.get(key.as_str());
            let new = after.get(key.as_str()).cloned().unwrap_or(Value::Null);
            if old != Some(&new) {
                self.notify(key, &new);
            }
        }
        Ok(())
    }

    pub fn subscribe<F>(&self, key: SettingKey, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut subs = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subs.next_id += 1;
        let id = subs.next_id;
        subs.entries.push(Subscriber {
            id,
            key,
            callback: Arc::new(callback),
        });

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    fn notify(&self, key: SettingKey, value: &Value) {
        let callbacks: Vec<Callback> = match self.subscribers.lock() {
            Ok(subs) => subs
                .entries
                .iter()
                .filter(|s| s.key == key)
                .map(|s| s.callback.clone())
                .collect(),
            Err(_) => return,
        };

        for callback in callbacks {
            callback(value);
        }
    }

    fn persist(&self, settings: &SettingsConfig) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn lock_settings(&self) -> std::sync::MutexGuard<'_, SettingsConfig> {
        // A panicking subscriber never holds this lock, so the data is intact
        match self.settings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
