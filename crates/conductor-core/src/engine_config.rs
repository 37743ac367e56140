use crate::error::{CoreError, Result};
use crate::io::atomic_write;
use crate::paths::EngineLayout;
use crate::params::ParamEnum;
use crate::task_config::TaskConfig;
use serde_json::{json, Map, Value};
use std::path::Path;

const DEFAULT_CONFIGURATION: &str = "Default";
const TIMER_COUNT: u32 = 8;

// ---------------------------------------------------------------------------
// EngineDocuments
// ---------------------------------------------------------------------------

/// The engine's two GUI configuration documents, `gui.json` (global and
/// per-configuration settings) and `gui.new.json` (task queues).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDocuments {
    pub gui: Value,
    pub gui_new: Value,
}

impl EngineDocuments {
    /// Load both documents. A missing file starts from an empty skeleton, as
    /// on a fresh engine install that has not been opened yet.
    pub fn load(layout: &EngineLayout) -> Result<Self> {
        Ok(Self {
            gui: load_document(&layout.gui_json())?,
            gui_new: load_document(&layout.gui_new_json())?,
        })
    }

    pub fn save(&self, layout: &EngineLayout) -> Result<()> {
        write_document(&layout.gui_json(), &self.gui)?;
        write_document(&layout.gui_new_json(), &self.gui_new)?;
        Ok(())
    }

    /// Rewrite the documents so that the engine, once started, connects to
    /// `address` and runs exactly `config`.
    pub fn apply(&mut self, config: &TaskConfig, address: Option<&str>) -> Result<()> {
        self.select_default_configuration()?;

        let global = object_at(&mut self.gui, &["Global"], "gui.json")?;
        // Log markers are matched against the zh-cn wording.
        global.insert("GUI.Localization".into(), json!("zh-cn"));
        for i in 1..=TIMER_COUNT {
            global.insert(format!("Timer.Timer{i}"), json!("False"));
        }
        global.insert("GUI.UseTray".into(), json!("True"));
        global.insert("GUI.MinimizeToTray".into(), json!("True"));
        global.insert("Start.MinimizeDirectly".into(), json!("True"));

        let default = object_at(
            &mut self.gui,
            &["Configurations", DEFAULT_CONFIGURATION],
            "gui.json",
        )?;
        if let Some(address) = address {
            default.insert("Connect.Address".into(), json!(address));
        }
        default.insert("Start.RunDirectly".into(), json!("True"));
        default.insert("Start.OpenEmulatorAfterLaunch".into(), json!("False"));
        default.insert("Start.StartGame".into(), json!("True"));
        default.insert(
            "Start.ClientType".into(),
            json!(config.start_up.client_type.as_str()),
        );
        default.insert(
            "MainFunction.PostActions".into(),
            json!(config.post_action.engine_code()),
        );

        let queue_owner = object_at(
            &mut self.gui_new,
            &["Configurations", DEFAULT_CONFIGURATION],
            "gui.new.json",
        )?;
        let existing = match queue_owner.get("TaskQueue") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        queue_owner.insert(
            "TaskQueue".into(),
            Value::Array(config.task_queue(&existing)),
        );
        Ok(())
    }

    /// Address the engine will connect to, if set.
    pub fn connect_address(&self) -> Option<&str> {
        self.gui
            .pointer("/Configurations/Default/Connect.Address")
            .and_then(Value::as_str)
    }

    pub fn task_queue(&self) -> Option<&Vec<Value>> {
        self.gui_new
            .pointer("/Configurations/Default/TaskQueue")
            .and_then(Value::as_array)
    }

    /// Make `Default` the active configuration, carrying over whatever
    /// configuration was active before.
    fn select_default_configuration(&mut self) -> Result<()> {
        let current = self
            .gui
            .get("Current")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CONFIGURATION)
            .to_string();
        if current != DEFAULT_CONFIGURATION {
            for (doc, name) in [(&mut self.gui, "gui.json"), (&mut self.gui_new, "gui.new.json")] {
                let configurations = object_at(doc, &["Configurations"], name)?;
                if let Some(active) = configurations.get(&current).cloned() {
                    configurations.insert(DEFAULT_CONFIGURATION.into(), active);
                }
            }
            tracing::debug!(from = %current, "switching engine to the Default configuration");
        }
        let root = root_object(&mut self.gui, "gui.json")?;
        root.insert("Current".into(), json!(DEFAULT_CONFIGURATION));
        Ok(())
    }
}

fn load_document(path: &Path) -> Result<Value> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "engine document missing, starting from empty");
        return Ok(json!({}));
    }
    let data = std::fs::read_to_string(path)?;
    let data = data.trim_start_matches('\u{feff}');
    let value: Value = serde_json::from_str(data)?;
    if !value.is_object() {
        return Err(malformed(path_name(path), "top level is not an object"));
    }
    Ok(value)
}

fn write_document(path: &Path, value: &Value) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    atomic_write(path, data.as_bytes())
}

fn root_object<'v>(doc: &'v mut Value, file: &str) -> Result<&'v mut Map<String, Value>> {
    doc.as_object_mut()
        .ok_or_else(|| malformed(file, "top level is not an object"))
}

/// Walk (and create) nested objects along `path`.
fn object_at<'v>(
    doc: &'v mut Value,
    path: &[&str],
    file: &str,
) -> Result<&'v mut Map<String, Value>> {
    let mut current = root_object(doc, file)?;
    for key in path {
        let next = current
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = next
            .as_object_mut()
            .ok_or_else(|| malformed(file, &format!("'{key}' is not an object")))?;
    }
    Ok(current)
}

fn path_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("engine document")
}

fn malformed(file: &str, reason: &str) -> CoreError {
    CoreError::MalformedDocument {
        file: file.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use tempfile::TempDir;

    fn config(value: Value) -> TaskConfig {
        let params: Params = serde_json::from_value(value).unwrap();
        TaskConfig::builder(&params).build().unwrap()
    }

    fn write(layout: &EngineLayout, gui: Value, gui_new: Value) {
        std::fs::create_dir_all(layout.config_dir()).unwrap();
        std::fs::write(layout.gui_json(), gui.to_string()).unwrap();
        std::fs::write(layout.gui_new_json(), gui_new.to_string()).unwrap();
    }

    #[test]
    fn apply_sets_connection_and_queue() {
        let mut docs = EngineDocuments {
            gui: json!({}),
            gui_new: json!({}),
        };
        docs.apply(&config(json!({"stage": "1-7"})), Some("127.0.0.1:16384"))
            .unwrap();

        assert_eq!(docs.connect_address(), Some("127.0.0.1:16384"));
        assert_eq!(docs.gui["Current"], json!("Default"));
        assert_eq!(docs.gui["Global"]["Timer.Timer8"], json!("False"));
        assert_eq!(docs.gui["Global"]["GUI.Localization"], json!("zh-cn"));
        let default = &docs.gui["Configurations"]["Default"];
        assert_eq!(default["Start.RunDirectly"], json!("True"));
        assert_eq!(default["Start.ClientType"], json!("Official"));
        assert_eq!(default["MainFunction.PostActions"], json!("0"));
        assert_eq!(docs.task_queue().unwrap().len(), 9);
    }

    #[test]
    fn apply_without_address_keeps_existing() {
        let mut docs = EngineDocuments {
            gui: json!({"Configurations": {"Default": {"Connect.Address": "emulator-5554"}}}),
            gui_new: json!({}),
        };
        docs.apply(&config(json!({})), None).unwrap();
        assert_eq!(docs.connect_address(), Some("emulator-5554"));
    }

    #[test]
    fn apply_copies_active_configuration_into_default() {
        let mut docs = EngineDocuments {
            gui: json!({
                "Current": "Alt",
                "Configurations": {"Alt": {"Connect.AdbPath": "/adb"}}
            }),
            gui_new: json!({
                "Configurations": {"Alt": {"TaskQueue": [{"TaskType": "Mall", "Keep": 1}]}}
            }),
        };
        docs.apply(&config(json!({})), None).unwrap();
        assert_eq!(docs.gui["Current"], json!("Default"));
        assert_eq!(
            docs.gui["Configurations"]["Default"]["Connect.AdbPath"],
            json!("/adb")
        );
        let mall = docs
            .task_queue()
            .unwrap()
            .iter()
            .find(|e| e["TaskType"] == "Mall")
            .unwrap();
        assert_eq!(mall["Keep"], json!(1));
    }

    #[test]
    fn apply_rejects_non_object_sections() {
        let mut docs = EngineDocuments {
            gui: json!({"Global": 3}),
            gui_new: json!({}),
        };
        let err = docs.apply(&config(json!({})), None).unwrap_err();
        assert!(matches!(err, CoreError::MalformedDocument { .. }));
    }

    #[test]
    fn load_save_through_layout() {
        let dir = TempDir::new().unwrap();
        let layout = EngineLayout::new(dir.path());
        write(
            &layout,
            json!({"Current": "Default", "Configurations": {"Default": {}}}),
            json!({"Configurations": {"Default": {"TaskQueue": []}}}),
        );

        let mut docs = EngineDocuments::load(&layout).unwrap();
        docs.apply(&config(json!({"medicine_count": 2})), Some("127.0.0.1:5555"))
            .unwrap();
        docs.save(&layout).unwrap();

        let reloaded = EngineDocuments::load(&layout).unwrap();
        assert_eq!(reloaded, docs);
    }

    #[test]
    fn load_missing_documents_starts_empty() {
        let dir = TempDir::new().unwrap();
        let docs = EngineDocuments::load(&EngineLayout::new(dir.path())).unwrap();
        assert_eq!(docs.gui, json!({}));
        assert_eq!(docs.gui_new, json!({}));
    }

    #[test]
    fn load_tolerates_byte_order_mark() {
        let dir = TempDir::new().unwrap();
        let layout = EngineLayout::new(dir.path());
        std::fs::create_dir_all(layout.config_dir()).unwrap();
        std::fs::write(layout.gui_json(), "\u{feff}{\"Current\":\"Default\"}").unwrap();
        let docs = EngineDocuments::load(&layout).unwrap();
        assert_eq!(docs.gui["Current"], json!("Default"));
    }
}
