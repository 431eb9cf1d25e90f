use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ConfigError;
use crate::selection_hook::HookFilterMode;

/// What makes the hook report a selection.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Every natural selection gesture
    #[default]
    #[serde(rename = "selection")]
    TextSelection,
    /// Gesture followed by a lone Ctrl tap
    #[serde(rename = "ctrlkey")]
    ModifierKey,
    /// Global shortcut
    #[serde(rename = "shortcut")]
    Shortcut,
}

impl TriggerMode {
    pub fn is_passive(&self) -> bool {
        !matches!(self, TriggerMode::TextSelection)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Allow every application
    #[default]
    Default,
    Whitelist,
    Blacklist,
}

/// Application filter as stored in settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterConfig {
    pub mode: FilterMode,
    pub list: Vec<String>,
}

/// Filter in the shape the hook understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectiveFilter {
    pub mode: HookFilterMode,
    pub list: Vec<String>,
}

impl FilterConfig {
    /// Allow-all becomes an empty blacklist, since the hook only knows
    /// whitelist and blacklist.
    pub fn effective(&self) -> EffectiveFilter {
        match self.mode {
            FilterMode::Default => EffectiveFilter {
                mode: HookFilterMode::Blacklist,
                list: Vec::new(),
            },
            FilterMode::Whitelist => EffectiveFilter {
                mode: HookFilterMode::Whitelist,
                list: self.list.clone(),
            },
            FilterMode::Blacklist => {
                let mut list: Vec<String> = Vec::with_capacity(self.list.len());
                for name in &self.list {
                    if !list.contains(name) {
                        list.push(name.clone());
                    }
                }
                EffectiveFilter {
                    mode: HookFilterMode::Blacklist,
                    list,
                }
            }
        }
    }
}

/// Local model server endpoint (LM Studio compatible).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelEndpointSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub api_path: String,
    pub timeout_ms: u64,
}

impl Default for ModelEndpointSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 1234,
            model: "default".to_string(),
            api_path: "/v1".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl ModelEndpointSettings {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.api_path)
    }
}

/// The persisted settings document
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsConfig {
    pub trigger_mode: TriggerMode,
    pub follow_toolbar: bool,
    pub remember_window_size: bool,
    pub filter_mode: FilterMode,
    pub filter_list: Vec<String>,
    pub compact_mode: bool,
    pub lm_studio: ModelEndpointSettings,
    pub shortcut_key: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            trigger_mode: TriggerMode::default(),
            follow_toolbar: true,
            remember_window_size: false,
            filter_mode: FilterMode::default(),
            filter_list: Vec::new(),
            compact_mode: false,
            lm_studio: ModelEndpointSettings::default(),
            shortcut_key: "Ctrl+Shift+L".to_string(),
        }
    }
}

impl SettingsConfig {
    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            mode: self.filter_mode,
            list: self.filter_list.clone(),
        }
    }

    pub fn zoom_factor(&self) -> f64 {
        if self.compact_mode {
            0.9
        } else {
            1.0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingKey {
    TriggerMode,
    FollowToolbar,
    RememberWindowSize,
    FilterMode,
    FilterList,
    CompactMode,
    LmStudio,
    ShortcutKey,
}

impl SettingKey {
    pub const ALL: [SettingKey; 8] = [
        SettingKey::TriggerMode,
        SettingKey::FollowToolbar,
        SettingKey::RememberWindowSize,
        SettingKey::FilterMode,
        SettingKey::FilterList,
        SettingKey::CompactMode,
        SettingKey::LmStudio,
        SettingKey::ShortcutKey,
    ];

    /// Key in the JSON document
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::TriggerMode => "triggerMode",
            SettingKey::FollowToolbar => "followToolbar",
            SettingKey::RememberWindowSize => "rememberWindowSize",
            SettingKey::FilterMode => "filterMode",
            SettingKey::FilterList => "filterList",
            SettingKey::CompactMode => "compactMode",
            SettingKey::LmStudio => "lmStudio",
            SettingKey::ShortcutKey => "shortcutKey",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_becomes_empty_blacklist() {
        let filter = FilterConfig {
            mode: FilterMode::Default,
            list: vec!["a.exe".to_string(), "b.exe".to_string()],
        };
        let effective = filter.effective();
        assert_eq!(effective.mode, HookFilterMode::Blacklist);
        assert!(effective.list.is_empty());
    }

    #[test]
    fn test_whitelist_passes_through() {
        let filter = FilterConfig {
            mode: FilterMode::Whitelist,
            list: vec!["a.exe".to_string()],
        };
        let effective = filter.effective();
        assert_eq!(effective.mode, HookFilterMode::Whitelist);
        assert_eq!(effective.list, vec!["a.exe".to_string()]);
    }

    #[test]
    fn test_blacklist_is_deduplicated_in_order() {
        let filter = FilterConfig {
            mode: FilterMode::Blacklist,
            list: vec!["b.exe".into(), "a.exe".into(), "b.exe".into()],
        };
        assert_eq!(filter.effective().list, vec!["b.exe".to_string(), "a.exe".to_string()]);
    }

    #[test]
    fn test_trigger_mode_passive() {
        assert!(!TriggerMode::TextSelection.is_passive());
        assert!(TriggerMode::ModifierKey.is_passive());
        assert!(TriggerMode::Shortcut.is_passive());
    }

    #[test]
    fn test_document_defaults_and_wire_names() {
        let settings: SettingsConfig = serde_json::from_str(r#"{"triggerMode":"ctrlkey"}"#).unwrap();
        assert_eq!(settings.trigger_mode, TriggerMode::ModifierKey);
        assert!(settings.follow_toolbar);
        assert!(!settings.remember_window_size);
        assert_eq!(settings.filter_mode, FilterMode::Default);
        assert_eq!(settings.lm_studio.port, 1234);
        assert_eq!(settings.lm_studio.base_url(), "http://localhost:1234/v1");

        let json = serde_json::to_value(SettingsConfig::default()).unwrap();
        assert_eq!(json["triggerMode"], "selection");
        assert_eq!(json["filterMode"], "default");
        assert_eq!(json["lmStudio"]["apiPath"], "/v1");
    }

    #[test]
    fn test_setting_key_parse() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().unwrap(), key);
        }
        assert!(matches!("nope".parse::<SettingKey>(), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_zoom_factor() {
        let mut settings = SettingsConfig::default();
        assert_eq!(settings.zoom_factor(), 1.0);
        settings.compact_mode = true;
        assert_eq!(settings.zoom_factor(), 0.9);
    }
}
