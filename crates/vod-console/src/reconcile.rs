use std::collections::{BTreeMap, BTreeSet};

use crate::client::TaskRecord;
use crate::log_render;
use crate::view_state::{AutoScroll, DeleteConfirm};

/// Fixed rendering of worker status codes. Unknown codes (3 included; the
/// worker never defines it) render as their numeric value.
pub fn status_text(code: i64) -> String {
    match code {
        1 => "Done".to_string(),
        2 => "Error".to_string(),
        4 => "Warning".to_string(),
        5 => "Active".to_string(),
        6 => "Starting".to_string(),
        other => other.to_string(),
    }
}

/// Live view of one task. Created by the reconciler on first sight of a
/// uid and owned by it until the uid disappears; the render cache and the
/// ephemeral state (collapse, scroll, delete confirmation) survive every
/// poll in between.
#[derive(Debug, Clone)]
pub struct TaskViewEntry {
    pub uid: String,
    pub status_text: String,
    pub output: String,
    /// Sanitized display lines, recomputed only when `output` changes.
    pub log_lines: Vec<String>,
    pub log_collapsed: bool,
    /// Rows scrolled up from the bottom of the log panel; 0 shows the tail.
    pub log_scroll: usize,
    pub auto_scroll: AutoScroll,
    pub delete_confirm: DeleteConfirm,
}

impl TaskViewEntry {
    fn new(uid: &str, record: &TaskRecord, collapsed: bool) -> Self {
        Self {
            uid: uid.to_string(),
            status_text: status_text(record.status),
            output: record.output.clone(),
            log_lines: log_render::render_lines(&record.output),
            log_collapsed: collapsed,
            log_scroll: 0,
            auto_scroll: AutoScroll::new(!collapsed),
            delete_confirm: DeleteConfirm::default(),
        }
    }

    /// Moves the log view; positive deltas scroll up, away from the tail.
    /// The follow tracker re-evaluates on every movement.
    pub fn scroll(&mut self, delta: isize) {
        let max = self.log_lines.len().saturating_sub(1);
        let next = if delta >= 0 {
            self.log_scroll.saturating_add(delta as usize)
        } else {
            self.log_scroll.saturating_sub(delta.unsigned_abs())
        };
        self.log_scroll = next.min(max);
        self.auto_scroll.observe(self.log_scroll);
    }
}

/// Actions produced by one reconciliation pass, each in ascending uid
/// order regardless of the incoming map's native order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub destroyed: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.destroyed.is_empty()
    }
}

/// The tracked task set. Entries are exclusively owned here; the panel
/// reads them through accessors and mutates them only through the
/// operations below.
#[derive(Debug, Default)]
pub struct TaskView {
    entries: BTreeMap<String, TaskViewEntry>,
}

impl TaskView {
    /// Diffs a polled task map against the tracked entries. Applying the
    /// same incoming map twice yields an empty outcome on the second pass.
    pub fn reconcile(
        &mut self,
        incoming: &BTreeMap<String, TaskRecord>,
        collapsed_seed: &BTreeSet<String>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|uid| !incoming.contains_key(*uid))
            .cloned()
            .collect();
        for uid in stale {
            if let Some(mut entry) = self.entries.remove(&uid) {
                // A pending confirmation window must not outlive its entry.
                entry.delete_confirm.cancel();
            }
            outcome.destroyed.push(uid);
        }

        for (uid, record) in incoming {
            match self.entries.get_mut(uid) {
                None => {
                    let collapsed = collapsed_seed.contains(uid);
                    self.entries
                        .insert(uid.clone(), TaskViewEntry::new(uid, record, collapsed));
                    outcome.created.push(uid.clone());
                }
                Some(entry) => {
                    let next_status = status_text(record.status);
                    let status_changed = entry.status_text != next_status;
                    let output_changed = entry.output != record.output;
                    if !status_changed && !output_changed {
                        continue;
                    }
                    if status_changed {
                        entry.status_text = next_status;
                    }
                    if output_changed {
                        entry.output = record.output.clone();
                        entry.log_lines = log_render::render_lines(&record.output);
                        if entry.auto_scroll.should_follow() {
                            entry.log_scroll = 0;
                        }
                    }
                    outcome.updated.push(uid.clone());
                }
            }
        }

        outcome
    }

    /// Explicit user toggle; never driven by polling. Expanding re-arms
    /// following and snaps to the tail. Returns the new collapsed state so
    /// the caller can persist it.
    pub fn toggle_log(&mut self, uid: &str) -> Option<bool> {
        let entry = self.entries.get_mut(uid)?;
        entry.log_collapsed = !entry.log_collapsed;
        if !entry.log_collapsed {
            entry.auto_scroll.rearm();
            entry.log_scroll = 0;
        }
        Some(entry.log_collapsed)
    }

    /// Immediate destruction outside of a poll pass, for a confirmed
    /// delete. Cancels any pending confirmation window first.
    pub fn remove(&mut self, uid: &str) -> Option<TaskViewEntry> {
        let mut entry = self.entries.remove(uid)?;
        entry.delete_confirm.cancel();
        Some(entry)
    }

    pub fn get(&self, uid: &str) -> Option<&TaskViewEntry> {
        self.entries.get(uid)
    }

    pub fn get_mut(&mut self, uid: &str) -> Option<&mut TaskViewEntry> {
        self.entries.get_mut(uid)
    }

    /// Entries in ascending uid order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskViewEntry> {
        self.entries.values()
    }

    pub fn uids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn record(status: i64, output: &str) -> TaskRecord {
        TaskRecord {
            status,
            output: output.to_string(),
        }
    }

    fn incoming(pairs: &[(&str, i64, &str)]) -> BTreeMap<String, TaskRecord> {
        pairs
            .iter()
            .map(|(uid, status, output)| (uid.to_string(), record(*status, output)))
            .collect()
    }

    #[test]
    fn status_codes_render_through_the_fixed_table() {
        assert_eq!(status_text(1), "Done");
        assert_eq!(status_text(2), "Error");
        assert_eq!(status_text(4), "Warning");
        assert_eq!(status_text(5), "Active");
        assert_eq!(status_text(6), "Starting");
        assert_eq!(status_text(3), "3");
        assert_eq!(status_text(42), "42");
    }

    #[test]
    fn creation_order_is_lexicographic() {
        let mut view = TaskView::default();
        let out = view.reconcile(
            &incoming(&[("b", 5, ""), ("a", 6, ""), ("c", 5, "")]),
            &BTreeSet::new(),
        );
        assert_eq!(out.created, ["a", "b", "c"]);
        let uids: Vec<&String> = view.uids().collect();
        assert_eq!(uids, ["a", "b", "c"]);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut view = TaskView::default();
        let map = incoming(&[("a", 5, "line"), ("b", 6, "")]);
        let first = view.reconcile(&map, &BTreeSet::new());
        assert_eq!(first.created.len(), 2);
        let second = view.reconcile(&map, &BTreeSet::new());
        assert!(second.is_empty());
    }

    #[test]
    fn unchanged_polls_emit_no_updates_and_keep_collapse() {
        let mut view = TaskView::default();
        let seed: BTreeSet<String> = ["a".to_string()].into();
        let map = incoming(&[("a", 5, "same output")]);
        view.reconcile(&map, &seed);
        assert!(view.get("a").is_some_and(|e| e.log_collapsed));

        for _ in 0..10 {
            let out = view.reconcile(&map, &seed);
            assert!(out.is_empty());
            assert!(view.get("a").is_some_and(|e| e.log_collapsed));
        }
    }

    #[test]
    fn update_fires_on_status_or_output_change_only() {
        let mut view = TaskView::default();
        view.reconcile(&incoming(&[("a", 5, "x")]), &BTreeSet::new());

        let out = view.reconcile(&incoming(&[("a", 1, "x")]), &BTreeSet::new());
        assert_eq!(out.updated, ["a"]);
        assert_eq!(view.get("a").map(|e| e.status_text.as_str()), Some("Done"));

        let out = view.reconcile(&incoming(&[("a", 1, "x\ny")]), &BTreeSet::new());
        assert_eq!(out.updated, ["a"]);
        assert_eq!(
            view.get("a").map(|e| e.log_lines.clone()),
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn vanished_uid_is_destroyed_and_its_confirmation_canceled() {
        let mut view = TaskView::default();
        view.reconcile(&incoming(&[("a", 5, ""), ("b", 5, "")]), &BTreeSet::new());
        view.get_mut("a")
            .expect("tracked entry")
            .delete_confirm
            .request(Instant::now());
        assert!(view.get("a").is_some_and(|e| e.delete_confirm.is_armed()));

        let out = view.reconcile(&incoming(&[("b", 5, "")]), &BTreeSet::new());
        assert_eq!(out.destroyed, ["a"]);
        assert!(view.get("a").is_none());
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn toggle_is_the_only_way_collapse_changes() {
        let mut view = TaskView::default();
        let map = incoming(&[("a", 5, "x")]);
        view.reconcile(&map, &BTreeSet::new());
        assert!(view.get("a").is_some_and(|e| !e.log_collapsed));

        assert_eq!(view.toggle_log("a"), Some(true));
        view.reconcile(&incoming(&[("a", 5, "x\nmore")]), &BTreeSet::new());
        assert!(view.get("a").is_some_and(|e| e.log_collapsed));

        // Re-expanding snaps to the tail and re-arms following.
        assert_eq!(view.toggle_log("a"), Some(false));
        let entry = view.get("a").expect("tracked entry");
        assert_eq!(entry.log_scroll, 0);
        assert!(entry.auto_scroll.is_armed());
        assert_eq!(view.toggle_log("missing"), None);
    }

    #[test]
    fn scrolled_back_panel_holds_position_on_new_output() {
        let long = (0..40).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let mut view = TaskView::default();
        view.reconcile(&incoming(&[("a", 5, &long)]), &BTreeSet::new());

        let entry = view.get_mut("a").expect("tracked entry");
        entry.scroll(20);
        assert!(!entry.auto_scroll.is_armed());

        let longer = format!("{long}\nnew tail");
        view.reconcile(&incoming(&[("a", 5, &longer)]), &BTreeSet::new());
        let entry = view.get("a").expect("tracked entry");
        assert_eq!(entry.log_scroll, 20);

        // Scrolling back inside the tolerance re-arms following.
        let entry = view.get_mut("a").expect("tracked entry");
        entry.scroll(-16);
        assert!(entry.auto_scroll.is_armed());
        let longest = format!("{longer}\neven newer");
        view.reconcile(&incoming(&[("a", 5, &longest)]), &BTreeSet::new());
        assert_eq!(view.get("a").map(|e| e.log_scroll), Some(0));
    }
}
