use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use yif_core::settings::{FallbackStore, JsonFileStore, SettingsPatch, SettingsStore};
use yif_core::types::FeatureFlag;

use crate::scan::parse_flag;

pub type CliStore = FallbackStore<JsonFileStore, JsonFileStore>;

/// `<path>` backed by `<path>.fallback`.
pub fn open_store(path: &Path) -> CliStore {
    let mut fallback = path.as_os_str().to_owned();
    fallback.push(".fallback");

    let mut store = FallbackStore::new(JsonFileStore::new(path), JsonFileStore::new(PathBuf::from(fallback)));
    store.on_change(Box::new(|patch: &SettingsPatch| {
        for (flag, value) in patch.iter() {
            log::info!("{} -> {}", flag.key(), value);
        }
    }));
    store
}

pub fn cmd_show(store: &CliStore) -> Result<(), String> {
    let settings = store.get().map_err(|e| e.to_string())?;
    for flag in FeatureFlag::ALL {
        let marker = if settings.is_enabled(flag) { "on " } else { "off" };
        println!("  [{}] {:<22} {}", marker, flag.key(), flag.label());
    }
    Ok(())
}

pub fn cmd_set(store: &mut CliStore, name: &str, value: bool) -> Result<(), String> {
    let flag = parse_flag(name)?;
    store.set_setting(flag, value).map_err(|e| e.to_string())?;
    println!("{} = {}", flag.key(), value);
    Ok(())
}

pub fn cmd_reset(store: &mut CliStore) -> Result<(), String> {
    store.reset().map_err(|e| e.to_string())?;
    println!("Settings reset to defaults");
    Ok(())
}

pub fn cmd_export(store: &CliStore, output: Option<&Path>) -> Result<(), String> {
    let text = serde_json::to_string_pretty(&store.export())
        .map_err(|e| format!("Failed to encode export: {}", e))?;
    match output {
        Some(path) => {
            fs::write(path, text)
                .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
            println!("Exported settings to '{}'", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

pub fn cmd_import(store: &mut CliStore, input: &Path) -> Result<(), String> {
    let text = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;
    let data: Value = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid export file '{}': {}", input.display(), e))?;

    if !store.import(&data).map_err(|e| e.to_string())? {
        return Err(format!("No settings object in '{}'", input.display()));
    }
    println!("Imported settings from '{}'", input.display());
    Ok(())
}

pub fn cmd_info(store: &CliStore) -> Result<(), String> {
    let text = serde_json::to_string_pretty(&store.info())
        .map_err(|e| format!("Failed to encode info: {}", e))?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use yif_core::settings::Settings;

    #[test]
    fn test_set_then_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = open_store(&path);

        assert_eq!(store.get().unwrap(), Settings::default());
        cmd_set(&mut store, "comments", true).unwrap();
        assert!(path.exists());
        assert!(store.get().unwrap().is_enabled(FeatureFlag::HideComments));

        cmd_reset(&mut store).unwrap();
        assert_eq!(store.get().unwrap(), Settings::default());
        assert!(cmd_set(&mut store, "volume", true).is_err());
    }

    #[test]
    fn test_export_import_between_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = open_store(&dir.path().join("a.json"));
        cmd_set(&mut source, "hideShorts", false).unwrap();

        let export = dir.path().join("export.json");
        cmd_export(&source, Some(&export)).unwrap();

        let mut target = open_store(&dir.path().join("b.json"));
        cmd_import(&mut target, &export).unwrap();
        assert!(!target.get().unwrap().is_enabled(FeatureFlag::HideShorts));
    }

    #[test]
    fn test_import_rejects_document_without_settings() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.json");
        fs::write(&input, r#"{"version": "1.0.0"}"#).unwrap();

        let mut store = open_store(&dir.path().join("s.json"));
        let err = cmd_import(&mut store, &input).unwrap_err();
        assert!(err.contains("No settings object"));
    }

    #[test]
    fn test_partial_primary_reads_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, r#"{"youtubeIntentionFilter": {"hideComments": true}}"#).unwrap();
        fs::write(
            dir.path().join("s.json.fallback"),
            r#"{"youtubeIntentionFilter": {"hideShorts": false}}"#,
        )
        .unwrap();

        let settings = open_store(&path).get().unwrap();
        assert!(!settings.is_enabled(FeatureFlag::HideShorts));
        assert!(!settings.is_enabled(FeatureFlag::HideComments));
    }
}
