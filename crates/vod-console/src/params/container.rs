use std::collections::BTreeMap;

use super::WorkerBinary;
use super::tokenize::FlagValue;

/// Flag value that means "force the mkv container" when it appears as the
/// argument of a container-family flag.
pub const CONTAINER_SENTINEL: &str = "mkv";

// Container-family flags per binary, highest priority first. Only one
// member may decide a resolution; the lists are never merged across
// binaries.
const YTDLP_CANDIDATES: &[&str] = &["--recode-video", "--remux-video", "--merge-output-format"];
const YTARCHIVE_CANDIDATES: &[&str] = &["--mkv"];

pub fn candidates(binary: WorkerBinary) -> &'static [&'static str] {
    match binary {
        WorkerBinary::Ytdlp => YTDLP_CANDIDATES,
        WorkerBinary::Ytarchive => YTARCHIVE_CANDIDATES,
    }
}

/// True when `flag` belongs to the container family of any binary.
pub fn is_family_flag(flag: &str) -> bool {
    YTDLP_CANDIDATES.contains(&flag) || YTARCHIVE_CANDIDATES.contains(&flag)
}

/// Outcome of scanning the advanced-flag map for the selected binary's
/// container candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDecision {
    /// A candidate of the selected binary is present; the governed key is
    /// forced and its binding must be shown as overridden.
    pub active: bool,
    /// The forced value. Meaningful only while `active`.
    pub force: bool,
    /// The flag spelling that decided, for diagnostics.
    pub source: Option<String>,
}

/// Scans `flags` in priority order. The first candidate present decides:
/// a bare switch forces the container on, a valued flag forces it on only
/// when the value equals the sentinel token case-insensitively.
pub fn decide(binary: WorkerBinary, flags: &BTreeMap<String, FlagValue>) -> ContainerDecision {
    for candidate in candidates(binary) {
        let Some(value) = flags.get(*candidate) else {
            continue;
        };
        let force = match value {
            FlagValue::Switch => true,
            FlagValue::Value(v) => v.eq_ignore_ascii_case(CONTAINER_SENTINEL),
        };
        return ContainerDecision {
            active: true,
            force,
            source: Some((*candidate).to_string()),
        };
    }
    ContainerDecision::default()
}
