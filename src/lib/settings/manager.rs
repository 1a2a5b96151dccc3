use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::session::{MeasurementDefinition, Timeouts};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeaderSettingsFile {
    pub name: String,
    pub version: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SettingsStruct {
    pub header: HeaderSettingsFile,
    #[serde(default)]
    pub measurement: MeasurementDefinition,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl Default for SettingsStruct {
    fn default() -> Self {
        SettingsStruct {
            header: HeaderSettingsFile {
                name: "Timeline Metrics".to_string(),
                version: 0,
            },
            measurement: MeasurementDefinition::default(),
            timeouts: Timeouts::default(),
        }
    }
}

#[derive(Debug)]
struct ManagerStruct {
    file_name: PathBuf,
    config: SettingsStruct,
}

#[derive(Debug, Default)]
struct Manager {
    content: Option<ManagerStruct>,
}

lazy_static! {
    static ref MANAGER: Arc<Mutex<Manager>> = Default::default();
}

fn manager() -> MutexGuard<'static, Manager> {
    MANAGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn settings_path(file_name: &str) -> Result<PathBuf> {
    let path = Path::new(file_name);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let project = ProjectDirs::from("com", "Timeline Metrics", env!("CARGO_PKG_NAME"))
        .ok_or_else(|| anyhow!("Failed to find user settings path"))?;
    let folder_path = project.config_dir();
    std::fs::create_dir_all(folder_path)
        .with_context(|| format!("Failed to create settings folder {folder_path:?}"))?;

    Ok(folder_path.join(path))
}

fn load_settings_from_file(file_name: &Path, reset: bool) -> SettingsStruct {
    if reset {
        info!("Resetting settings to defaults");
        return SettingsStruct::default();
    }

    let content = match std::fs::read_to_string(file_name) {
        Ok(content) => content,
        Err(error) => {
            debug!("No settings loaded from {file_name:?}: {error}");
            return SettingsStruct::default();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|error| {
        warn!("Invalid settings file {file_name:?}, using defaults: {error}");
        SettingsStruct::default()
    })
}

fn save_settings_to_file(file_name: &Path, content: &SettingsStruct) -> Result<()> {
    let value = serde_json::to_string_pretty(content)?;
    std::fs::write(file_name, value)
        .with_context(|| format!("Failed to write settings to {file_name:?}"))
}

// Init settings manager with the desired settings file,
// will be created if does not exist
#[instrument(level = "debug")]
pub fn init(file_name: Option<&str>, reset: bool) -> Result<()> {
    let file_name = settings_path(file_name.unwrap_or("settings.json"))?;
    debug!("Using settings file: {file_name:?}");

    let config = load_settings_from_file(&file_name, reset);
    if let Err(error) = save_settings_to_file(&file_name, &config) {
        error!("Failed to save settings: {error:#}");
    }

    manager().content = Some(ManagerStruct { file_name, config });
    Ok(())
}

fn config() -> SettingsStruct {
    manager()
        .content
        .as_ref()
        .map(|content| content.config.clone())
        .unwrap_or_else(|| {
            warn!("Settings were not initialized, using defaults");
            SettingsStruct::default()
        })
}

pub fn header() -> HeaderSettingsFile {
    config().header
}

pub fn measurement() -> MeasurementDefinition {
    config().measurement
}

pub fn timeouts() -> Timeouts {
    config().timeouts
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn creates_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file_name = dir.path().join("settings.json");

        init(file_name.to_str(), false).unwrap();

        assert!(file_name.exists(), "Settings file does not exist");
        assert_eq!(header().name, "Timeline Metrics");
        assert_eq!(measurement(), MeasurementDefinition::default());
        assert_eq!(timeouts(), Timeouts::default());
    }

    #[test]
    #[serial]
    fn stores_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let file_name = dir.path().join("settings.json");
        init(file_name.to_str(), false).unwrap();

        let fake_timeouts = Timeouts {
            step_ms: 42,
            completion_ms: 4242,
            poll_interval_ms: 7,
        };
        let mut stored: SettingsStruct =
            serde_json::from_str(&std::fs::read_to_string(&file_name).unwrap()).unwrap();
        stored.timeouts = fake_timeouts.clone();
        std::fs::write(&file_name, serde_json::to_string(&stored).unwrap()).unwrap();

        init(file_name.to_str(), false).unwrap();
        assert_eq!(timeouts(), fake_timeouts);

        init(file_name.to_str(), true).unwrap();
        assert_eq!(timeouts(), Timeouts::default());
    }

    #[test]
    #[serial]
    fn partial_file_is_completed_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file_name = dir.path().join("settings.json");
        std::fs::write(
            &file_name,
            r#"{"header": {"name": "Custom", "version": 1}, "timeouts": {"step_ms": 5}}"#,
        )
        .unwrap();

        init(file_name.to_str(), false).unwrap();

        assert_eq!(header().name, "Custom");
        assert_eq!(timeouts().step_ms, 5);
        assert_eq!(timeouts().completion_ms, Timeouts::default().completion_ms);

        let saved = std::fs::read_to_string(&file_name).unwrap();
        assert!(saved.contains("ImageDecoding_avg"));
    }
}
