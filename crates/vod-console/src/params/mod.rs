use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod container;
pub mod tokenize;

use container::ContainerDecision;
use tokenize::{AdvancedTokens, FlagValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerBinary {
    Ytdlp,
    Ytarchive,
}

impl WorkerBinary {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerBinary::Ytdlp => "ytdlp",
            WorkerBinary::Ytarchive => "ytarchive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "ytdlp" => Some(WorkerBinary::Ytdlp),
            "ytarchive" => Some(WorkerBinary::Ytarchive),
            _ => None,
        }
    }

    pub fn cycled(self) -> Self {
        match self {
            WorkerBinary::Ytdlp => WorkerBinary::Ytarchive,
            WorkerBinary::Ytarchive => WorkerBinary::Ytdlp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Flag,
    Text,
}

/// A live parameter value. Serializes as a bare bool or string, which is
/// exactly the shape the worker's `params` map expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Text(String),
}

impl ParamValue {
    /// Whether the value earns a slot in the submission snapshot: text must
    /// be non-empty, flags must be set.
    pub fn is_submitted(&self) -> bool {
        match self {
            ParamValue::Flag(b) => *b,
            ParamValue::Text(s) => !s.trim().is_empty(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            ParamValue::Flag(b) => b.to_string(),
            ParamValue::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterDescriptor {
    /// Canonical parameter key, unique across the table.
    pub key: &'static str,
    /// Identifier of the control this parameter binds to in the panel.
    pub binding: &'static str,
    pub kind: ValueKind,
    /// Default rendered as a string; parsed per `kind`.
    pub default: &'static str,
    /// The panel may legitimately omit this control.
    pub optional_binding: bool,
    /// Control-plane data (binary choice, quality, refresh interval, the
    /// advanced string itself): never part of the submitted snapshot.
    pub control_only: bool,
}

impl ParameterDescriptor {
    pub fn default_value(&self) -> ParamValue {
        match self.kind {
            ValueKind::Flag => ParamValue::Flag(self.default == "true"),
            ValueKind::Text => ParamValue::Text(self.default.to_string()),
        }
    }

    /// Seeds a binding value from a stored preference, falling back to the
    /// descriptor default when nothing usable is stored.
    pub fn value_from_pref(&self, stored: Option<&str>) -> ParamValue {
        match self.kind {
            ValueKind::Flag => match stored {
                Some(s) => ParamValue::Flag(s == "true"),
                None => self.default_value(),
            },
            ValueKind::Text => match stored {
                Some(s) if !s.trim().is_empty() => ParamValue::Text(s.trim().to_string()),
                _ => self.default_value(),
            },
        }
    }
}

/// The canonical key governed by the container-format override hierarchy.
pub const CONTAINER_KEY: &str = "force_mkv";

pub const DESCRIPTORS: &[ParameterDescriptor] = &[
    ParameterDescriptor {
        key: "binary",
        binding: "binary",
        kind: ValueKind::Text,
        default: "ytdlp",
        optional_binding: false,
        control_only: true,
    },
    ParameterDescriptor {
        key: "quality",
        binding: "quality",
        kind: ValueKind::Text,
        default: "best",
        optional_binding: false,
        control_only: true,
    },
    ParameterDescriptor {
        key: "embed_thumbnail",
        binding: "thumbnail",
        kind: ValueKind::Flag,
        default: "true",
        optional_binding: false,
        control_only: false,
    },
    ParameterDescriptor {
        key: "wait_for_live",
        binding: "wait",
        kind: ValueKind::Flag,
        default: "true",
        optional_binding: false,
        control_only: false,
    },
    ParameterDescriptor {
        key: "force_mkv",
        binding: "mkv",
        kind: ValueKind::Flag,
        default: "true",
        optional_binding: true,
        control_only: false,
    },
    ParameterDescriptor {
        key: "use_cookies",
        binding: "cookies",
        kind: ValueKind::Flag,
        default: "false",
        optional_binding: false,
        control_only: false,
    },
    ParameterDescriptor {
        key: "output_filename",
        binding: "output",
        kind: ValueKind::Text,
        default: "%(channel)s - %(title)s",
        optional_binding: false,
        control_only: false,
    },
    ParameterDescriptor {
        key: "retry_stream",
        binding: "retry",
        kind: ValueKind::Text,
        default: "60",
        optional_binding: false,
        control_only: false,
    },
    ParameterDescriptor {
        key: "threads",
        binding: "threads",
        kind: ValueKind::Text,
        default: "1",
        optional_binding: false,
        control_only: false,
    },
    ParameterDescriptor {
        key: "refresh_interval",
        binding: "refresh",
        kind: ValueKind::Text,
        default: "2",
        optional_binding: true,
        control_only: true,
    },
    ParameterDescriptor {
        key: "advanced_params",
        binding: "advanced",
        kind: ValueKind::Text,
        default: "",
        optional_binding: true,
        control_only: true,
    },
];

pub fn descriptor(key: &str) -> Option<&'static ParameterDescriptor> {
    DESCRIPTORS.iter().find(|d| d.key == key)
}

// Raw flag spelling -> canonical key, one table per binary. Tables are
// never merged: the wrong table for a binary is a correctness bug.
const YTDLP_FLAGS: &[(&str, &str)] = &[
    ("--output", "output_filename"),
    ("-o", "output_filename"),
    ("--wait-for-video", "retry_stream"),
    ("--concurrent-fragments", "threads"),
    ("--live-from-start", "wait_for_live"),
    ("--embed-thumbnail", "embed_thumbnail"),
];

const YTARCHIVE_FLAGS: &[(&str, &str)] = &[
    ("--output", "output_filename"),
    ("-o", "output_filename"),
    ("--retry-stream", "retry_stream"),
    ("--threads", "threads"),
    ("--wait", "wait_for_live"),
    ("--thumbnail", "embed_thumbnail"),
];

pub fn flag_table(binary: WorkerBinary) -> &'static [(&'static str, &'static str)] {
    match binary {
        WorkerBinary::Ytdlp => YTDLP_FLAGS,
        WorkerBinary::Ytarchive => YTARCHIVE_FLAGS,
    }
}

pub fn canonical_key(binary: WorkerBinary, flag: &str) -> Option<&'static str> {
    flag_table(binary)
        .iter()
        .find_map(|(raw, key)| (*raw == flag).then_some(*key))
}

/// Structural checks on the declarative tables, run once at startup.
pub fn validate_tables() -> Result<()> {
    let mut keys = BTreeSet::new();
    for d in DESCRIPTORS {
        if !keys.insert(d.key) {
            return Err(Error::msg(format!("duplicate parameter key '{}'", d.key)));
        }
    }

    for binary in [WorkerBinary::Ytdlp, WorkerBinary::Ytarchive] {
        let mut seen = BTreeSet::new();
        for (raw, key) in flag_table(binary) {
            if !seen.insert(*raw) {
                return Err(Error::msg(format!(
                    "flag '{}' mapped twice for {}",
                    raw,
                    binary.as_str()
                )));
            }
            let Some(d) = descriptor(key) else {
                return Err(Error::msg(format!(
                    "flag '{}' maps to unknown key '{}' for {}",
                    raw,
                    key,
                    binary.as_str()
                )));
            };
            if d.control_only {
                return Err(Error::msg(format!(
                    "flag '{}' maps to control-only key '{}'",
                    raw, key
                )));
            }
            if *key == CONTAINER_KEY {
                return Err(Error::msg(format!(
                    "key '{CONTAINER_KEY}' is owned by the container override group; \
                     flag '{raw}' must not also claim it"
                )));
            }
            if container::candidates(binary).contains(raw) {
                return Err(Error::msg(format!(
                    "flag '{}' belongs to both the {} table and its override group",
                    raw,
                    binary.as_str()
                )));
            }
        }
    }

    if descriptor(CONTAINER_KEY).is_none() {
        return Err(Error::msg(format!(
            "container override group governs unknown key '{CONTAINER_KEY}'"
        )));
    }

    Ok(())
}

/// Result of one resolution pass: the submission snapshot plus the marks
/// the panel needs to show which controls the advanced string has taken
/// over. A binding absent from `overridden` must be editable again.
#[derive(Debug, Clone, Default)]
pub struct ResolvedParameters {
    pub snapshot: BTreeMap<String, ParamValue>,
    pub overridden: BTreeSet<&'static str>,
    pub container: ContainerDecision,
    pub diagnostics: Vec<String>,
}

impl ResolvedParameters {
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overridden.contains(key)
    }
}

/// Resolves one submission snapshot. Precedence, highest first: the
/// container override for its governed key, canonical advanced-string
/// values, live binding values, descriptor defaults. Raw flags the
/// selected binary's table does not recognize pass through under their
/// literal spelling. Never fails; malformed input degrades to defaults.
pub fn resolve(
    bindings: &BTreeMap<String, ParamValue>,
    advanced: &str,
    binary: WorkerBinary,
) -> ResolvedParameters {
    let tokens = AdvancedTokens::parse(advanced);
    let mut diagnostics: Vec<String> = tokens
        .dropped()
        .iter()
        .map(|t| format!("ignored unassociated value '{t}'"))
        .collect();
    let flags = tokens.flag_map();

    let mut snapshot = BTreeMap::new();
    for d in DESCRIPTORS {
        if d.control_only {
            continue;
        }
        let value = match bindings.get(d.key) {
            Some(v) => v.clone(),
            None => {
                if !d.optional_binding {
                    tracing::warn!(key = d.key, "binding missing, using default");
                }
                d.default_value()
            }
        };
        if value.is_submitted() {
            snapshot.insert(d.key.to_string(), value);
        }
    }

    let mut overridden = BTreeSet::new();
    for (raw, value) in &flags {
        let Some(key) = canonical_key(binary, raw) else {
            continue;
        };
        let d = descriptor(key).expect("validated table");
        let coerced = match d.kind {
            ValueKind::Flag => ParamValue::Flag(flag_truthy(value)),
            ValueKind::Text => ParamValue::Text(match value {
                FlagValue::Switch => "true".to_string(),
                FlagValue::Value(v) => v.clone(),
            }),
        };
        overridden.insert(key);
        if coerced.is_submitted() {
            snapshot.insert(key.to_string(), coerced);
        } else {
            snapshot.remove(key);
        }
    }

    for (raw, value) in &flags {
        if canonical_key(binary, raw).is_some() {
            continue;
        }
        if container::is_family_flag(raw) {
            // Handled by the override decision below when it is one of the
            // selected binary's candidates; otherwise it would only alias a
            // key that is already represented canonically.
            continue;
        }
        let passthrough = match value {
            FlagValue::Switch => ParamValue::Flag(true),
            FlagValue::Value(v) => ParamValue::Text(v.clone()),
        };
        snapshot.insert(raw.clone(), passthrough);
    }

    let decision = container::decide(binary, &flags);
    if decision.active {
        snapshot.insert(CONTAINER_KEY.to_string(), ParamValue::Flag(decision.force));
        overridden.insert(CONTAINER_KEY);
    }
    for raw in flags.keys() {
        if container::is_family_flag(raw)
            && decision.source.as_deref() != Some(raw.as_str())
        {
            diagnostics.push(format!(
                "container flag '{raw}' suppressed for {}",
                binary.as_str()
            ));
        }
    }

    ResolvedParameters {
        snapshot,
        overridden,
        container: decision,
        diagnostics,
    }
}

fn flag_truthy(value: &FlagValue) -> bool {
    match value {
        FlagValue::Switch => true,
        FlagValue::Value(v) => v.eq_ignore_ascii_case("true") || v == "1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_bindings() -> BTreeMap<String, ParamValue> {
        DESCRIPTORS
            .iter()
            .map(|d| (d.key.to_string(), d.default_value()))
            .collect()
    }

    #[test]
    fn tables_validate() {
        validate_tables().expect("tables must be structurally sound");
    }

    #[test]
    fn defaults_fill_the_snapshot() {
        let r = resolve(&default_bindings(), "", WorkerBinary::Ytdlp);
        assert_eq!(
            r.snapshot.get("output_filename"),
            Some(&ParamValue::Text("%(channel)s - %(title)s".into()))
        );
        assert_eq!(
            r.snapshot.get("embed_thumbnail"),
            Some(&ParamValue::Flag(true))
        );
        // Unset flags never travel.
        assert!(!r.snapshot.contains_key("use_cookies"));
        // Control-plane descriptors never travel.
        assert!(!r.snapshot.contains_key("binary"));
        assert!(!r.snapshot.contains_key("quality"));
        assert!(r.overridden.is_empty());
    }

    #[test]
    fn advanced_value_beats_binding() {
        let mut bindings = default_bindings();
        bindings.insert("threads".into(), ParamValue::Text("1".into()));
        let r = resolve(&bindings, "--concurrent-fragments 8", WorkerBinary::Ytdlp);
        assert_eq!(r.snapshot.get("threads"), Some(&ParamValue::Text("8".into())));
        assert!(r.is_overridden("threads"));
    }

    #[test]
    fn canonicalization_is_per_binary() {
        let bindings = default_bindings();
        // --threads is a ytarchive spelling; under ytdlp it passes raw.
        let r = resolve(&bindings, "--threads 8", WorkerBinary::Ytdlp);
        assert_eq!(
            r.snapshot.get("--threads"),
            Some(&ParamValue::Text("8".into()))
        );
        assert_eq!(r.snapshot.get("threads"), Some(&ParamValue::Text("1".into())));
        assert!(!r.is_overridden("threads"));

        let r = resolve(&bindings, "--threads 8", WorkerBinary::Ytarchive);
        assert_eq!(r.snapshot.get("threads"), Some(&ParamValue::Text("8".into())));
        assert!(!r.snapshot.contains_key("--threads"));
        assert!(r.is_overridden("threads"));
    }

    #[test]
    fn container_override_beats_everything() {
        let mut bindings = default_bindings();
        bindings.insert(CONTAINER_KEY.into(), ParamValue::Flag(false));
        let r = resolve(&bindings, "--merge-output-format mkv", WorkerBinary::Ytdlp);
        assert_eq!(r.snapshot.get(CONTAINER_KEY), Some(&ParamValue::Flag(true)));
        assert!(r.is_overridden(CONTAINER_KEY));
        assert!(!r.snapshot.contains_key("--merge-output-format"));
    }

    #[test]
    fn foreign_container_alias_is_suppressed() {
        let r = resolve(&default_bindings(), "--mkv", WorkerBinary::Ytdlp);
        assert!(!r.snapshot.contains_key("--mkv"));
        assert!(!r.container.active);
        // The binding still owns the key.
        assert_eq!(r.snapshot.get(CONTAINER_KEY), Some(&ParamValue::Flag(true)));
        assert!(r.diagnostics.iter().any(|d| d.contains("--mkv")));
    }

    #[test]
    fn overridden_marks_clear_when_flags_go_away() {
        let bindings = default_bindings();
        let r = resolve(&bindings, "--embed-thumbnail false", WorkerBinary::Ytdlp);
        assert!(r.is_overridden("embed_thumbnail"));
        let r = resolve(&bindings, "", WorkerBinary::Ytdlp);
        assert!(!r.is_overridden("embed_thumbnail"));
    }

    #[test]
    fn boolean_coercion_accepts_true_and_one() {
        let bindings = default_bindings();
        for text in ["true", "TRUE", "1"] {
            let r = resolve(
                &bindings,
                &format!("--live-from-start {text}"),
                WorkerBinary::Ytdlp,
            );
            assert_eq!(
                r.snapshot.get("wait_for_live"),
                Some(&ParamValue::Flag(true)),
                "input {text}"
            );
        }
        let r = resolve(&bindings, "--live-from-start no", WorkerBinary::Ytdlp);
        assert!(!r.snapshot.contains_key("wait_for_live"));
        assert!(r.is_overridden("wait_for_live"));
    }
}
