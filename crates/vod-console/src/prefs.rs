use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PrefsDoc {
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default)]
    collapsed_logs: BTreeSet<String>,
    #[serde(default)]
    advanced_open: bool,
    #[serde(default)]
    updated_at: String,
}

/// File-backed preference store. Reads happen once at open; every write
/// goes straight back to disk so a crash never loses more than the change
/// in flight. A missing or unparseable file degrades to defaults.
#[derive(Debug)]
pub struct PrefStore {
    path: PathBuf,
    doc: PrefsDoc,
}

impl PrefStore {
    pub fn open(path: &Path) -> Self {
        let doc = match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<PrefsDoc>(&raw) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "preference file unreadable, starting fresh");
                    PrefsDoc::default()
                }
            },
            Err(_) => PrefsDoc::default(),
        };
        Self {
            path: path.to_path_buf(),
            doc,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.doc.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if self.doc.values.get(key).is_some_and(|v| v == value) {
            return;
        }
        self.doc.values.insert(key.to_string(), value.to_string());
        self.persist();
    }

    pub fn collapsed_logs(&self) -> &BTreeSet<String> {
        &self.doc.collapsed_logs
    }

    pub fn is_log_collapsed(&self, uid: &str) -> bool {
        self.doc.collapsed_logs.contains(uid)
    }

    pub fn set_log_collapsed(&mut self, uid: &str, collapsed: bool) {
        let changed = if collapsed {
            self.doc.collapsed_logs.insert(uid.to_string())
        } else {
            self.doc.collapsed_logs.remove(uid)
        };
        if changed {
            self.persist();
        }
    }

    pub fn advanced_open(&self) -> bool {
        self.doc.advanced_open
    }

    pub fn set_advanced_open(&mut self, open: bool) {
        if self.doc.advanced_open == open {
            return;
        }
        self.doc.advanced_open = open;
        self.persist();
    }

    // Persistence failures are reported, never surfaced as errors: losing a
    // preference write must not interrupt a running panel.
    fn persist(&mut self) {
        self.doc.updated_at = chrono::Utc::now().to_rfc3339();
        if let Err(e) = self.write_doc() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist preferences");
        }
    }

    fn write_doc(&self) -> Result<()> {
        let body = toml::to_string_pretty(&self.doc)?;
        atomic_write_text(&self.path, &body)
    }
}

fn atomic_write_text(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::msg(format!("failed to create {}: {e}", parent.display())))?;
        }
    }
    let file_name = path.file_name().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::msg(format!(
            "invalid file path for atomic write: {}",
            path.display()
        ))
    })?;
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    fs::write(&tmp, body)
        .map_err(|e| Error::msg(format!("failed to write temp file {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(|e| {
        Error::msg(format!(
            "failed to rename {} -> {}: {e}",
            tmp.display(),
            path.display()
        ))
    })?;
    Ok(())
}
