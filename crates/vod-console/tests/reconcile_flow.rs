use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use vod_console::client::TaskRecord;
use vod_console::reconcile::TaskView;
use vod_console::view_state::{CONFIRM_WINDOW, DeleteAction};

fn incoming(pairs: &[(&str, i64, &str)]) -> BTreeMap<String, TaskRecord> {
    pairs
        .iter()
        .map(|(uid, status, output)| {
            (
                uid.to_string(),
                TaskRecord {
                    status: *status,
                    output: output.to_string(),
                },
            )
        })
        .collect()
}

#[test]
fn rendered_order_is_stable_for_unordered_sources() {
    let mut view = TaskView::default();
    let out = view.reconcile(&incoming(&[("b", 5, ""), ("a", 5, "")]), &BTreeSet::new());
    assert_eq!(out.created, ["a", "b"]);
    assert_eq!(view.uids().cloned().collect::<Vec<_>>(), ["a", "b"]);

    // The same map again, however the source happened to order it, changes
    // nothing.
    let out = view.reconcile(&incoming(&[("a", 5, ""), ("b", 5, "")]), &BTreeSet::new());
    assert!(out.is_empty());
}

#[test]
fn collapse_survives_ten_quiet_polls() {
    let seed: BTreeSet<String> = ["job-1".to_string()].into();
    let map = incoming(&[("job-1", 5, "downloading...\n42%")]);

    let mut view = TaskView::default();
    view.reconcile(&map, &seed);
    assert!(view.get("job-1").is_some_and(|e| e.log_collapsed));
    assert!(view.get("job-1").is_some_and(|e| !e.auto_scroll.is_armed()));

    for _ in 0..10 {
        let out = view.reconcile(&map, &seed);
        assert!(out.is_empty());
        assert!(view.get("job-1").is_some_and(|e| e.log_collapsed));
    }
}

#[test]
fn full_lifecycle_create_update_destroy() {
    let mut view = TaskView::default();
    let seed = BTreeSet::new();

    let out = view.reconcile(&incoming(&[("job-1", 6, "")]), &seed);
    assert_eq!(out.created, ["job-1"]);

    let out = view.reconcile(&incoming(&[("job-1", 5, "started")]), &seed);
    assert_eq!(out.updated, ["job-1"]);
    assert_eq!(
        view.get("job-1").map(|e| e.status_text.clone()),
        Some("Active".to_string())
    );

    let out = view.reconcile(&incoming(&[("job-1", 1, "started\ndone")]), &seed);
    assert_eq!(out.updated, ["job-1"]);

    let out = view.reconcile(&incoming(&[]), &seed);
    assert_eq!(out.destroyed, ["job-1"]);
    assert!(view.is_empty());
}

#[test]
fn two_step_delete_confirms_inside_the_window() {
    let mut view = TaskView::default();
    view.reconcile(&incoming(&[("job-1", 5, "")]), &BTreeSet::new());

    let now = Instant::now();
    let entry = view.get_mut("job-1").expect("tracked entry");
    assert_eq!(entry.delete_confirm.request(now), DeleteAction::Armed);
    assert_eq!(
        entry
            .delete_confirm
            .request(now + Duration::from_millis(1500)),
        DeleteAction::Confirmed
    );
    assert!(!entry.delete_confirm.is_armed());
}

#[test]
fn unconfirmed_delete_reverts_after_the_window() {
    let mut view = TaskView::default();
    view.reconcile(&incoming(&[("job-1", 5, "")]), &BTreeSet::new());

    let now = Instant::now();
    let entry = view.get_mut("job-1").expect("tracked entry");
    entry.delete_confirm.request(now);
    assert!(entry.delete_confirm.is_armed());
    assert!(entry.delete_confirm.tick(now + CONFIRM_WINDOW));
    assert!(!entry.delete_confirm.is_armed());

    // The next request starts over instead of confirming.
    assert_eq!(
        entry
            .delete_confirm
            .request(now + CONFIRM_WINDOW + Duration::from_millis(1)),
        DeleteAction::Armed
    );
}

#[test]
fn reconciliation_destroy_cancels_a_pending_confirmation() {
    let mut view = TaskView::default();
    view.reconcile(&incoming(&[("job-1", 5, "")]), &BTreeSet::new());
    view.get_mut("job-1")
        .expect("tracked entry")
        .delete_confirm
        .request(Instant::now());

    let out = view.reconcile(&incoming(&[]), &BTreeSet::new());
    assert_eq!(out.destroyed, ["job-1"]);
    assert!(view.get("job-1").is_none());
}

#[test]
fn confirmed_delete_removes_the_entry_immediately() {
    let mut view = TaskView::default();
    view.reconcile(&incoming(&[("job-1", 5, ""), ("job-2", 5, "")]), &BTreeSet::new());

    assert!(view.remove("job-1").is_some());
    assert_eq!(view.len(), 1);
    // Removing again is a no-op, as is removing an unknown uid.
    assert!(view.remove("job-1").is_none());
}

#[test]
fn manual_scrollback_survives_output_growth() {
    let long = (0..30).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
    let mut view = TaskView::default();
    view.reconcile(&incoming(&[("job-1", 5, &long)]), &BTreeSet::new());

    view.get_mut("job-1").expect("tracked entry").scroll(12);
    let grown = format!("{long}\nline 30");
    view.reconcile(&incoming(&[("job-1", 5, &grown)]), &BTreeSet::new());
    assert_eq!(view.get("job-1").map(|e| e.log_scroll), Some(12));

    // Collapsing and re-expanding snaps back to the tail and re-arms.
    view.toggle_log("job-1");
    view.toggle_log("job-1");
    let entry = view.get("job-1").expect("tracked entry");
    assert_eq!(entry.log_scroll, 0);
    assert!(entry.auto_scroll.is_armed());
}
