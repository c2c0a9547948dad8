//! Settings snapshots, patches and stores
//!
//! [`Settings`] is the engine's configuration snapshot: one boolean per
//! feature flag, always fully populated. Decoding is fail-closed: a missing
//! key or a non-boolean value resolves to that flag's documented default.
//!
//! The [`SettingsStore`] trait is the interface to the persistence layer.
//! Three backends are provided:
//!
//! - [`MemoryStore`]: in-process primary store
//! - [`JsonFileStore`]: local fallback persisted as JSON
//! - [`FallbackStore`]: primary with automatic fallback

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::types::{FeatureFlag, FeatureSet};

/// Key the fallback store nests settings under.
pub const STORAGE_KEY: &str = "youtubeIntentionFilter";

/// Version tag written into exports.
pub const EXPORT_VERSION: &str = "1.0.0";

// =============================================================================
// Settings
// =============================================================================

/// Fully populated flag snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Settings {
    enabled: FeatureSet,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: FeatureSet::DEFAULTS,
        }
    }
}

impl Settings {
    pub fn from_set(enabled: FeatureSet) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> FeatureSet {
        self.enabled
    }

    pub fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.enabled.contains(flag.bit())
    }

    /// Copy with one flag replaced.
    #[must_use]
    pub fn with(mut self, flag: FeatureFlag, value: bool) -> Self {
        self.enabled.set(flag.bit(), value);
        self
    }

    /// Copy with every changed key of `patch` applied.
    #[must_use]
    pub fn merged(self, patch: &SettingsPatch) -> Self {
        patch
            .iter()
            .fold(self, |settings, (flag, value)| settings.with(flag, value))
    }

    /// Decode from a JSON object, falling back to defaults per flag.
    pub fn from_value(value: &Value) -> Self {
        FeatureFlag::ALL
            .into_iter()
            .fold(Self::default(), |settings, flag| {
                let enabled = value
                    .get(flag.key())
                    .and_then(Value::as_bool)
                    .unwrap_or_else(|| flag.default_enabled());
                settings.with(flag, enabled)
            })
    }

    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = FeatureFlag::ALL
            .into_iter()
            .map(|flag| (flag.key().to_string(), Value::Bool(self.is_enabled(flag))))
            .collect();
        Value::Object(map)
    }

    /// Keys whose value differs between `self` and `newer`.
    pub fn diff(&self, newer: &Settings) -> SettingsPatch {
        let mut patch = SettingsPatch::default();
        for flag in FeatureFlag::ALL {
            if self.is_enabled(flag) != newer.is_enabled(flag) {
                patch.insert(flag, newer.is_enabled(flag));
            }
        }
        patch
    }
}

/// Does a raw stored object carry a boolean for every flag?
pub fn has_all_keys(value: &Value) -> bool {
    FeatureFlag::ALL
        .into_iter()
        .all(|flag| value.get(flag.key()).map_or(false, Value::is_boolean))
}

impl Serialize for Settings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

// =============================================================================
// Settings Patch
// =============================================================================

/// Only the keys that changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    changes: BTreeMap<FeatureFlag, bool>,
}

impl SettingsPatch {
    pub fn insert(&mut self, flag: FeatureFlag, value: bool) {
        self.changes.insert(flag, value);
    }

    pub fn get(&self, flag: FeatureFlag) -> Option<bool> {
        self.changes.get(&flag).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureFlag, bool)> + '_ {
        self.changes.iter().map(|(flag, value)| (*flag, *value))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Decode a flat `{key: value}` object.
    ///
    /// Unknown keys are ignored; non-boolean values resolve to the flag's
    /// default.
    pub fn from_value(value: &Value) -> Self {
        Self::collect(value, |entry| entry.as_bool())
    }

    /// Decode a storage change notification: `{key: {newValue, oldValue}}`.
    pub fn from_storage_changes(value: &Value) -> Self {
        Self::collect(value, |entry| entry.get("newValue").and_then(Value::as_bool))
    }

    fn collect(value: &Value, extract: impl Fn(&Value) -> Option<bool>) -> Self {
        let mut patch = Self::default();
        if let Some(object) = value.as_object() {
            for (key, entry) in object {
                if let Some(flag) = FeatureFlag::from_key(key) {
                    patch.insert(flag, extract(entry).unwrap_or_else(|| flag.default_enabled()));
                }
            }
        }
        patch
    }

    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .iter()
            .map(|(flag, value)| (flag.key().to_string(), Value::Bool(value)))
            .collect();
        Value::Object(map)
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Error type for settings persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Settings store '{0}' is unavailable")]
    Unavailable(&'static str),
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Malformed settings data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failure to read settings at load time. Callers substitute defaults.
pub type ConfigLoadError = StoreError;

/// Change callback; receives only the keys that changed.
pub type ChangeListener = Box<dyn FnMut(&SettingsPatch)>;

// =============================================================================
// Store Trait
// =============================================================================

/// Exported settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsExport {
    pub settings: Settings,
    /// RFC 3339 timestamp
    pub export_date: String,
    pub version: String,
}

/// Backend description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    pub backend: &'static str,
    pub available: bool,
    pub default_settings: Settings,
}

/// Key-value boolean settings persistence with change notification.
pub trait SettingsStore {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    fn get(&self) -> Result<Settings, ConfigLoadError>;

    fn set(&mut self, settings: &Settings) -> Result<(), StoreError>;

    /// Register a listener fired with the changed keys after each `set`.
    fn on_change(&mut self, listener: ChangeListener);

    fn is_available(&self) -> bool {
        true
    }

    /// Does the backend hold an explicit value for every flag?
    fn is_complete(&self) -> bool {
        true
    }

    fn set_setting(&mut self, flag: FeatureFlag, value: bool) -> Result<(), StoreError> {
        let current = self.get().unwrap_or_default();
        self.set(&current.with(flag, value))
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        self.set(&Settings::default())
    }

    fn export(&self) -> SettingsExport {
        SettingsExport {
            settings: self.get().unwrap_or_default(),
            export_date: chrono::Utc::now().to_rfc3339(),
            version: EXPORT_VERSION.to_string(),
        }
    }

    /// Import an export document. Returns `Ok(false)` when it carries no
    /// settings object; invalid values fall back to defaults.
    fn import(&mut self, data: &Value) -> Result<bool, StoreError> {
        match data.get("settings").filter(|s| s.is_object()) {
            Some(settings) => {
                self.set(&Settings::from_value(settings))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn info(&self) -> StoreInfo {
        StoreInfo {
            backend: self.name(),
            available: self.is_available(),
            default_settings: Settings::default(),
        }
    }
}

fn notify(listeners: &mut [ChangeListener], previous: &Settings, next: &Settings) {
    let patch = previous.diff(next);
    if patch.is_empty() {
        return;
    }
    for listener in listeners.iter_mut() {
        listener(&patch);
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process store. Keys never written stay absent.
pub struct MemoryStore {
    values: BTreeMap<FeatureFlag, bool>,
    available: bool,
    listeners: Vec<ChangeListener>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            available: true,
            listeners: Vec::new(),
        }
    }

    /// Store that fails every read and write.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_settings(settings: Settings) -> Self {
        let mut store = Self::new();
        store.values = FeatureFlag::ALL
            .into_iter()
            .map(|flag| (flag, settings.is_enabled(flag)))
            .collect();
        store
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    fn effective(&self) -> Settings {
        self.values
            .iter()
            .fold(Settings::default(), |settings, (flag, value)| settings.with(*flag, *value))
    }
}

impl SettingsStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self) -> Result<Settings, ConfigLoadError> {
        if !self.available {
            return Err(StoreError::Unavailable(self.name()));
        }
        Ok(self.effective())
    }

    fn set(&mut self, settings: &Settings) -> Result<(), StoreError> {
        if !self.available {
            return Err(StoreError::Unavailable(self.name()));
        }
        let previous = self.effective();
        for flag in FeatureFlag::ALL {
            self.values.insert(flag, settings.is_enabled(flag));
        }
        notify(&mut self.listeners, &previous, settings);
        Ok(())
    }

    fn on_change(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn is_complete(&self) -> bool {
        self.available && self.values.len() == FeatureFlag::ALL.len()
    }
}

// =============================================================================
// JSON File Store
// =============================================================================

/// Local fallback persisted as `{"youtubeIntentionFilter": {...}}`.
///
/// A missing file reads as defaults.
pub struct JsonFileStore {
    path: PathBuf,
    listeners: Vec<ChangeListener>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            listeners: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_raw(&self) -> Result<Option<Value>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };
        let document: Value = serde_json::from_str(&text)?;
        Ok(document.get(STORAGE_KEY).cloned())
    }
}

impl SettingsStore for JsonFileStore {
    fn name(&self) -> &'static str {
        "json-file"
    }

    fn get(&self) -> Result<Settings, ConfigLoadError> {
        Ok(self
            .read_raw()?
            .map(|raw| Settings::from_value(&raw))
            .unwrap_or_default())
    }

    fn set(&mut self, settings: &Settings) -> Result<(), StoreError> {
        let previous = self.get().unwrap_or_default();

        let mut document = Map::new();
        document.insert(STORAGE_KEY.to_string(), settings.to_value());
        let text = serde_json::to_string_pretty(&Value::Object(document))?;

        let io_error = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&self.path, text).map_err(io_error)?;

        notify(&mut self.listeners, &previous, settings);
        Ok(())
    }

    fn on_change(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }

    fn is_complete(&self) -> bool {
        matches!(self.read_raw(), Ok(Some(raw)) if has_all_keys(&raw))
    }
}

// =============================================================================
// Fallback Store
// =============================================================================

/// Primary store with a local fallback.
///
/// Reads use the primary only when it is available and holds every key;
/// otherwise the fallback answers, and a failing fallback yields defaults.
/// Writes go to the primary and fall back on error. Change listeners attach
/// to the primary.
pub struct FallbackStore<P, F> {
    primary: P,
    fallback: F,
}

impl<P: SettingsStore, F: SettingsStore> FallbackStore<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    fn read_fallback(&self) -> Settings {
        self.fallback.get().unwrap_or_else(|e| {
            log::warn!("Reading fallback settings failed, using defaults: {}", e);
            Settings::default()
        })
    }
}

impl<P: SettingsStore, F: SettingsStore> SettingsStore for FallbackStore<P, F> {
    fn name(&self) -> &'static str {
        if self.primary.is_available() {
            self.primary.name()
        } else {
            self.fallback.name()
        }
    }

    fn get(&self) -> Result<Settings, ConfigLoadError> {
        if self.primary.is_available() && self.primary.is_complete() {
            match self.primary.get() {
                Ok(settings) => return Ok(settings),
                Err(e) => log::warn!("Reading {} settings failed, using fallback: {}", self.primary.name(), e),
            }
        }
        Ok(self.read_fallback())
    }

    fn set(&mut self, settings: &Settings) -> Result<(), StoreError> {
        if self.primary.is_available() {
            match self.primary.set(settings) {
                Ok(()) => return Ok(()),
                Err(e) => log::warn!("Saving to {} failed, using fallback: {}", self.primary.name(), e),
            }
        }
        self.fallback.set(settings)
    }

    fn on_change(&mut self, listener: ChangeListener) {
        self.primary.on_change(listener);
    }

    fn is_available(&self) -> bool {
        self.primary.is_available() || self.fallback.is_available()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults_fill_missing_and_malformed() {
        let settings = Settings::from_value(&json!({
            "hideShorts": false,
            "hideComments": "yes",
            "disableAutoplay": null,
        }));
        assert!(settings.is_enabled(FeatureFlag::HideRecommendations));
        assert!(!settings.is_enabled(FeatureFlag::HideShorts));
        assert!(settings.is_enabled(FeatureFlag::DisableAutoplay));
        assert!(!settings.is_enabled(FeatureFlag::HideComments));

        assert_eq!(Settings::from_value(&json!("garbage")), Settings::default());
    }

    #[test]
    fn test_serde_shape() {
        let settings = Settings::default().with(FeatureFlag::HideComments, true);
        assert_eq!(
            serde_json::to_value(settings).unwrap(),
            json!({
                "hideRecommendations": true,
                "hideShorts": true,
                "disableAutoplay": true,
                "hideComments": true,
            })
        );
        let back: Settings = serde_json::from_value(json!({"hideShorts": 1})).unwrap();
        assert_eq!(back, Settings::default());
    }

    #[test]
    fn test_patch_from_storage_changes() {
        let patch = SettingsPatch::from_storage_changes(&json!({
            "hideShorts": {"oldValue": true, "newValue": false},
            "hideComments": {"newValue": "on"},
            "theme": {"newValue": "dark"},
        }));
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.get(FeatureFlag::HideShorts), Some(false));
        assert_eq!(patch.get(FeatureFlag::HideComments), Some(false));

        let merged = Settings::default().merged(&patch);
        assert!(!merged.is_enabled(FeatureFlag::HideShorts));
        assert!(merged.is_enabled(FeatureFlag::HideRecommendations));
    }

    #[test]
    fn test_memory_store_notifies_changed_keys_only() {
        let seen: Rc<RefCell<Vec<SettingsPatch>>> = Rc::default();
        let mut store = MemoryStore::new();
        let sink = Rc::clone(&seen);
        store.on_change(Box::new(move |patch: &SettingsPatch| sink.borrow_mut().push(patch.clone())));

        store.set_setting(FeatureFlag::HideShorts, false).unwrap();
        let unchanged = store.get().unwrap();
        store.set(&unchanged).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].to_value(), json!({"hideShorts": false}));
    }

    #[test]
    fn test_unavailable_store_errors() {
        let mut store = MemoryStore::unavailable();
        assert!(matches!(store.get(), Err(StoreError::Unavailable("memory"))));
        assert!(store.set(&Settings::default()).is_err());
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut store = JsonFileStore::new(&path);

        assert_eq!(store.get().unwrap(), Settings::default());
        assert!(!store.is_complete());

        let custom = Settings::default().with(FeatureFlag::DisableAutoplay, false);
        store.set(&custom).unwrap();
        assert!(store.is_complete());
        assert_eq!(JsonFileStore::new(&path).get().unwrap(), custom);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[STORAGE_KEY]["disableAutoplay"], json!(false));
    }

    #[test]
    fn test_json_file_store_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileStore::new(&path).get(), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_fallback_store_prefers_complete_primary() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = JsonFileStore::new(dir.path().join("local.json"));
        let primary_settings = Settings::default().with(FeatureFlag::HideComments, true);
        let store = FallbackStore::new(MemoryStore::with_settings(primary_settings), fallback);
        assert_eq!(store.get().unwrap(), primary_settings);
        assert_eq!(store.name(), "memory");

        // An incomplete primary defers to the fallback.
        let mut partial = MemoryStore::new();
        partial.set_setting(FeatureFlag::HideShorts, false).unwrap();
        partial.values.remove(&FeatureFlag::HideComments);
        let store = FallbackStore::new(partial, MemoryStore::new());
        assert_eq!(store.get().unwrap(), Settings::default());
    }

    #[test]
    fn test_fallback_store_writes_fallback_when_primary_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let mut store = FallbackStore::new(MemoryStore::unavailable(), JsonFileStore::new(&path));

        store.set_setting(FeatureFlag::HideShorts, false).unwrap();
        assert_eq!(store.name(), "json-file");
        assert!(!store.get().unwrap().is_enabled(FeatureFlag::HideShorts));
        assert!(path.exists());
    }

    #[test]
    fn test_export_import() {
        let mut store = MemoryStore::new();
        store.set_setting(FeatureFlag::HideComments, true).unwrap();
        let export = store.export();
        assert_eq!(export.version, EXPORT_VERSION);
        assert!(chrono::DateTime::parse_from_rfc3339(&export.export_date).is_ok());

        let mut other = MemoryStore::new();
        let imported = other.import(&serde_json::to_value(&export).unwrap()).unwrap();
        assert!(imported);
        assert_eq!(other.get().unwrap(), export.settings);

        assert!(!other.import(&json!({"version": "1.0.0"})).unwrap());
        other
            .import(&json!({"settings": {"hideShorts": "nope", "hideComments": false}}))
            .unwrap();
        assert_eq!(other.get().unwrap(), Settings::default());
    }

    #[test]
    fn test_has_all_keys() {
        assert!(has_all_keys(&Settings::default().to_value()));
        assert!(!has_all_keys(&json!({"hideShorts": true})));
    }
}
