use std::collections::BTreeMap;

use vod_console::params::{
    self, CONTAINER_KEY, DESCRIPTORS, ParamValue, WorkerBinary,
};
use vod_console::params::tokenize::AdvancedTokens;
use vod_console::prefs::PrefStore;

fn default_bindings() -> BTreeMap<String, ParamValue> {
    DESCRIPTORS
        .iter()
        .map(|d| (d.key.to_string(), d.default_value()))
        .collect()
}

#[test]
fn ytarchive_output_and_mkv_both_forced() {
    let r = params::resolve(
        &default_bindings(),
        r#"--output "X - Y" --mkv"#,
        WorkerBinary::Ytarchive,
    );
    assert_eq!(
        r.snapshot.get("output_filename"),
        Some(&ParamValue::Text("X - Y".into()))
    );
    assert_eq!(r.snapshot.get(CONTAINER_KEY), Some(&ParamValue::Flag(true)));
    assert!(r.is_overridden("output_filename"));
    assert!(r.is_overridden(CONTAINER_KEY));
}

#[test]
fn ytdlp_remux_to_other_container_forces_mkv_off() {
    let r = params::resolve(&default_bindings(), "--remux-video avi", WorkerBinary::Ytdlp);
    assert_eq!(r.snapshot.get(CONTAINER_KEY), Some(&ParamValue::Flag(false)));
    assert!(r.is_overridden(CONTAINER_KEY));
}

#[test]
fn container_override_outranks_stored_preference() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("prefs.toml");
    let mut prefs = PrefStore::open(&path);
    prefs.set(CONTAINER_KEY, "false");

    let bindings: BTreeMap<String, ParamValue> = DESCRIPTORS
        .iter()
        .map(|d| (d.key.to_string(), d.value_from_pref(prefs.get(d.key))))
        .collect();
    assert_eq!(bindings.get(CONTAINER_KEY), Some(&ParamValue::Flag(false)));

    let r = params::resolve(&bindings, "--merge-output-format mkv", WorkerBinary::Ytdlp);
    assert_eq!(r.snapshot.get(CONTAINER_KEY), Some(&ParamValue::Flag(true)));
    assert!(r.is_overridden(CONTAINER_KEY));
}

#[test]
fn same_spelling_never_crosses_binaries() {
    let bindings = default_bindings();
    let advanced = "--wait-for-video 120";

    // A ytdlp spelling canonicalizes under ytdlp...
    let r = params::resolve(&bindings, advanced, WorkerBinary::Ytdlp);
    assert_eq!(
        r.snapshot.get("retry_stream"),
        Some(&ParamValue::Text("120".into()))
    );
    assert!(!r.snapshot.contains_key("--wait-for-video"));

    // ...and passes through raw under ytarchive, leaving the binding value.
    let r = params::resolve(&bindings, advanced, WorkerBinary::Ytarchive);
    assert_eq!(
        r.snapshot.get("retry_stream"),
        Some(&ParamValue::Text("60".into()))
    );
    assert_eq!(
        r.snapshot.get("--wait-for-video"),
        Some(&ParamValue::Text("120".into()))
    );
}

#[test]
fn switching_binary_reevaluates_the_whole_string() {
    let bindings = default_bindings();
    let advanced = "--threads 6 --mkv";

    let ytdlp = params::resolve(&bindings, advanced, WorkerBinary::Ytdlp);
    assert_eq!(
        ytdlp.snapshot.get("--threads"),
        Some(&ParamValue::Text("6".into()))
    );
    assert!(!ytdlp.is_overridden("threads"));
    assert!(!ytdlp.container.active);

    let ytarchive = params::resolve(&bindings, advanced, WorkerBinary::Ytarchive);
    assert_eq!(
        ytarchive.snapshot.get("threads"),
        Some(&ParamValue::Text("6".into()))
    );
    assert!(ytarchive.is_overridden("threads"));
    assert!(ytarchive.container.active);
    assert_eq!(
        ytarchive.snapshot.get(CONTAINER_KEY),
        Some(&ParamValue::Flag(true))
    );
}

#[test]
fn unknown_flags_ride_along_verbatim() {
    let r = params::resolve(
        &default_bindings(),
        "--write-subs --sub-langs en",
        WorkerBinary::Ytdlp,
    );
    assert_eq!(r.snapshot.get("--write-subs"), Some(&ParamValue::Flag(true)));
    assert_eq!(
        r.snapshot.get("--sub-langs"),
        Some(&ParamValue::Text("en".into()))
    );
}

#[test]
fn malformed_input_degrades_to_defaults() {
    let r = params::resolve(&default_bindings(), "orphan 'unclosed", WorkerBinary::Ytdlp);
    assert_eq!(
        r.snapshot.get("output_filename"),
        Some(&ParamValue::Text("%(channel)s - %(title)s".into()))
    );
    assert!(!r.diagnostics.is_empty());
}

#[test]
fn tokenizer_parse_render_parse_is_stable() {
    for input in [
        r#"--output "X - Y" --mkv"#,
        "--remux-video avi --threads 3",
        "stray --wait 'a b'   --flag",
        "",
    ] {
        let once = AdvancedTokens::parse(input);
        let twice = AdvancedTokens::parse(&once.canonical_string());
        assert_eq!(once.flag_map(), twice.flag_map(), "input: {input:?}");
    }
}
