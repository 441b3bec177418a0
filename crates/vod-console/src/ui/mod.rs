use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};

use crate::client::{RecordRequest, TaskRecord, WorkerClient};
use crate::error::{Error, Result};
use crate::extract::extract_video_id;
use crate::params::{self, DESCRIPTORS, ParamValue, ResolvedParameters, ValueKind, WorkerBinary};
use crate::prefs::PrefStore;
use crate::reconcile::TaskView;
use crate::view_state::DeleteAction;

const TICK: Duration = Duration::from_millis(100);
const NOTICE_WINDOW: Duration = Duration::from_millis(3000);

const QUALITIES: &[&str] = &[
    "best",
    "2160p",
    "1440p",
    "1080p",
    "720p",
    "480p",
    "audio_only",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Form,
    Tasks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormRow {
    VideoId,
    Binary,
    Quality,
    Thumbnail,
    Wait,
    Mkv,
    Cookies,
    Output,
    Retry,
    Threads,
    Refresh,
    Advanced,
    Callbacks,
}

impl FormRow {
    fn label(&self) -> &'static str {
        match self {
            FormRow::VideoId => "video id / url",
            FormRow::Binary => "binary",
            FormRow::Quality => "quality",
            FormRow::Thumbnail => "embed thumbnail",
            FormRow::Wait => "wait for live",
            FormRow::Mkv => "force mkv",
            FormRow::Cookies => "use cookies",
            FormRow::Output => "output template",
            FormRow::Retry => "retry stream (s)",
            FormRow::Threads => "threads",
            FormRow::Refresh => "refresh interval (s)",
            FormRow::Advanced => "advanced parameters",
            FormRow::Callbacks => "callbacks",
        }
    }

    fn param_key(&self) -> Option<&'static str> {
        match self {
            FormRow::Binary => Some("binary"),
            FormRow::Quality => Some("quality"),
            FormRow::Thumbnail => Some("embed_thumbnail"),
            FormRow::Wait => Some("wait_for_live"),
            FormRow::Mkv => Some("force_mkv"),
            FormRow::Cookies => Some("use_cookies"),
            FormRow::Output => Some("output_filename"),
            FormRow::Retry => Some("retry_stream"),
            FormRow::Threads => Some("threads"),
            FormRow::Refresh => Some("refresh_interval"),
            FormRow::Advanced => Some("advanced_params"),
            FormRow::VideoId | FormRow::Callbacks => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoticeKind {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
struct Notice {
    text: String,
    kind: NoticeKind,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
enum InputMode {
    Normal,
    Edit {
        row: FormRow,
        buffer: String,
        error: Option<String>,
    },
}

// Completions from request worker threads, drained on every UI tick.
enum NetEvent {
    Poll {
        seq: u64,
        result: Result<BTreeMap<String, TaskRecord>>,
    },
    Submitted(Result<String>),
    Deleted {
        uid: String,
        result: Result<()>,
    },
    BinaryUpdated {
        binary: WorkerBinary,
        result: Result<String>,
    },
    Callbacks(Result<Vec<String>>),
}

struct App {
    client: WorkerClient,
    prefs: PrefStore,

    bindings: BTreeMap<String, ParamValue>,
    resolved: ResolvedParameters,
    video_input: String,

    callbacks: Vec<String>,
    selected_callbacks: BTreeSet<String>,
    cb_sel: usize,

    view: TaskView,
    selected_task: Option<String>,

    focus: Focus,
    form_sel: usize,
    input: InputMode,
    notice: Option<Notice>,
    advanced_open: bool,

    // Polls are tagged; only the most recently issued sequence may apply.
    poll_seq: u64,
    next_poll_at: Instant,

    net_tx: mpsc::Sender<NetEvent>,
    net_rx: mpsc::Receiver<NetEvent>,

    should_quit: bool,
}

impl App {
    fn new(client: WorkerClient, prefs: PrefStore) -> Self {
        let bindings: BTreeMap<String, ParamValue> = DESCRIPTORS
            .iter()
            .map(|d| (d.key.to_string(), d.value_from_pref(prefs.get(d.key))))
            .collect();
        let advanced_open = prefs.advanced_open();
        let (net_tx, net_rx) = mpsc::channel();
        let mut app = Self {
            client,
            prefs,
            bindings,
            resolved: ResolvedParameters::default(),
            video_input: String::new(),
            callbacks: Vec::new(),
            selected_callbacks: BTreeSet::new(),
            cb_sel: 0,
            view: TaskView::default(),
            selected_task: None,
            focus: Focus::Form,
            form_sel: 0,
            input: InputMode::Normal,
            notice: None,
            advanced_open,
            poll_seq: 0,
            next_poll_at: Instant::now(),
            net_tx,
            net_rx,
            should_quit: false,
        };
        app.recompute_resolution();
        app.load_callbacks();
        app
    }

    fn binding_text(&self, key: &str) -> String {
        match self.bindings.get(key) {
            Some(ParamValue::Text(s)) => s.clone(),
            Some(ParamValue::Flag(b)) => b.to_string(),
            None => String::new(),
        }
    }

    fn binding_flag(&self, key: &str) -> bool {
        matches!(self.bindings.get(key), Some(ParamValue::Flag(true)))
    }

    fn binary(&self) -> WorkerBinary {
        WorkerBinary::parse(&self.binding_text("binary")).unwrap_or(WorkerBinary::Ytdlp)
    }

    fn poll_interval(&self) -> Duration {
        let secs = self
            .binding_text("refresh_interval")
            .parse::<u64>()
            .unwrap_or(2)
            .max(1);
        Duration::from_secs(secs)
    }

    fn recompute_resolution(&mut self) {
        let advanced = self.binding_text("advanced_params");
        self.resolved = params::resolve(&self.bindings, &advanced, self.binary());
    }

    /// The value a form row should display: the resolved snapshot when the
    /// advanced string governs the key, the live binding otherwise.
    fn effective_value(&self, key: &str) -> ParamValue {
        if self.resolved.is_overridden(key) {
            if let Some(v) = self.resolved.snapshot.get(key) {
                return v.clone();
            }
            // Overridden to an empty/unset value.
            return match params::descriptor(key).map(|d| d.kind) {
                Some(ValueKind::Flag) => ParamValue::Flag(false),
                _ => ParamValue::Text(String::new()),
            };
        }
        self.bindings
            .get(key)
            .cloned()
            .unwrap_or(ParamValue::Text(String::new()))
    }

    fn set_binding(&mut self, key: &str, value: ParamValue) {
        // Bindings taken over by the advanced string are read-only and are
        // also excluded from preference write-back, so a stored choice is
        // never clobbered by an override.
        if self.resolved.is_overridden(key) {
            self.notify(
                format!("'{key}' is set by the advanced parameters"),
                NoticeKind::Warning,
            );
            return;
        }
        self.prefs.set(key, &value.render());
        self.bindings.insert(key.to_string(), value);
        self.recompute_resolution();
    }

    fn notify(&mut self, text: String, kind: NoticeKind) {
        self.notice = Some(Notice {
            text,
            kind,
            expires_at: Instant::now() + NOTICE_WINDOW,
        });
    }

    fn form_rows(&self) -> Vec<FormRow> {
        let mut rows = vec![
            FormRow::VideoId,
            FormRow::Binary,
            FormRow::Quality,
            FormRow::Thumbnail,
            FormRow::Wait,
            FormRow::Mkv,
            FormRow::Cookies,
            FormRow::Output,
            FormRow::Retry,
            FormRow::Threads,
            FormRow::Refresh,
            FormRow::Advanced,
        ];
        if !self.callbacks.is_empty() {
            rows.push(FormRow::Callbacks);
        }
        rows
    }

    fn selected_row(&self) -> Option<FormRow> {
        self.form_rows().get(self.form_sel).copied()
    }

    // --- network actions -------------------------------------------------

    fn load_callbacks(&mut self) {
        let client = self.client.clone();
        let tx = self.net_tx.clone();
        std::thread::spawn(move || {
            let _ = tx.send(NetEvent::Callbacks(client.callbacks()));
        });
    }

    fn issue_poll(&mut self) {
        self.poll_seq += 1;
        let seq = self.poll_seq;
        let client = self.client.clone();
        let tx = self.net_tx.clone();
        std::thread::spawn(move || {
            let _ = tx.send(NetEvent::Poll {
                seq,
                result: client.status(),
            });
        });
    }

    fn poll_soon(&mut self) {
        self.next_poll_at = Instant::now();
    }

    fn submit(&mut self) {
        let video_id = extract_video_id(&self.video_input);
        if video_id.is_empty() {
            self.notify("enter a video id or url".into(), NoticeKind::Error);
            return;
        }
        self.video_input.clear();
        self.recompute_resolution();

        let req = RecordRequest {
            youtube_id: video_id,
            quality: self.binding_text("quality"),
            binary: self.binary().as_str().to_string(),
            params: self.resolved.snapshot.clone(),
            callbacks: self.selected_callbacks.iter().cloned().collect(),
        };
        for diag in &self.resolved.diagnostics {
            tracing::warn!(%diag, "advanced parameter diagnostic");
        }

        let client = self.client.clone();
        let tx = self.net_tx.clone();
        std::thread::spawn(move || {
            let _ = tx.send(NetEvent::Submitted(client.record(&req)));
        });
    }

    fn request_delete(&mut self) {
        let Some(uid) = self.selected_task.clone() else {
            return;
        };
        let Some(entry) = self.view.get_mut(&uid) else {
            return;
        };
        match entry.delete_confirm.request(Instant::now()) {
            DeleteAction::Armed => {}
            DeleteAction::Confirmed => {
                let client = self.client.clone();
                let tx = self.net_tx.clone();
                std::thread::spawn(move || {
                    let result = client.delete_task(&uid);
                    let _ = tx.send(NetEvent::Deleted { uid, result });
                });
            }
        }
    }

    fn trigger_binary_update(&mut self) {
        let binary = self.binary();
        self.notify(
            format!("starting {} update...", binary.as_str()),
            NoticeKind::Warning,
        );
        let client = self.client.clone();
        let tx = self.net_tx.clone();
        std::thread::spawn(move || {
            let result = client.update_binary(binary);
            let _ = tx.send(NetEvent::BinaryUpdated { binary, result });
        });
    }

    // --- event handling --------------------------------------------------

    fn drain_net_events(&mut self) {
        let mut events = Vec::new();
        while let Ok(ev) = self.net_rx.try_recv() {
            events.push(ev);
        }
        for ev in events {
            match ev {
                NetEvent::Poll { seq, result } => self.on_poll(seq, result),
                NetEvent::Submitted(result) => match result {
                    Ok(id) => {
                        self.notify(format!("task started: {id}"), NoticeKind::Success);
                        self.poll_soon();
                    }
                    Err(e) => self.notify(e.to_string(), NoticeKind::Error),
                },
                NetEvent::Deleted { uid, result } => match result {
                    Ok(()) => {
                        self.view.remove(&uid);
                        self.prefs.set_log_collapsed(&uid, false);
                        self.ensure_task_selection();
                        self.notify(format!("task deleted: {uid}"), NoticeKind::Success);
                    }
                    Err(e) => {
                        self.notify(format!("delete failed: {e}"), NoticeKind::Error);
                    }
                },
                NetEvent::BinaryUpdated { binary, result } => {
                    match result {
                        Ok(message) => self.notify(message, NoticeKind::Success),
                        Err(e) => self.notify(e.to_string(), NoticeKind::Error),
                    }
                    tracing::info!(binary = binary.as_str(), "update finished");
                    self.poll_soon();
                }
                NetEvent::Callbacks(result) => match result {
                    Ok(list) => self.callbacks = list,
                    Err(e) => tracing::warn!(error = %e, "callbacks unavailable"),
                },
            }
        }
    }

    fn on_poll(&mut self, seq: u64, result: Result<BTreeMap<String, TaskRecord>>) {
        if seq != self.poll_seq {
            // A newer poll is already out; applying this one could roll the
            // view back to stale data.
            tracing::debug!(seq, current = self.poll_seq, "discarding stale poll response");
            return;
        }
        match result {
            Ok(map) => {
                let seed = self.prefs.collapsed_logs().clone();
                let outcome = self.view.reconcile(&map, &seed);
                for uid in &outcome.destroyed {
                    self.prefs.set_log_collapsed(uid, false);
                }
                self.ensure_task_selection();
            }
            Err(e) => {
                tracing::warn!(error = %e, "status poll failed");
                self.notify(format!("worker unreachable: {e}"), NoticeKind::Warning);
            }
        }
    }

    fn ensure_task_selection(&mut self) {
        let valid = self
            .selected_task
            .as_ref()
            .is_some_and(|uid| self.view.get(uid).is_some());
        if !valid {
            self.selected_task = self.view.uids().next().cloned();
        }
    }

    fn select_task_offset(&mut self, delta: isize) {
        let uids: Vec<&String> = self.view.uids().collect();
        if uids.is_empty() {
            self.selected_task = None;
            return;
        }
        let cur = self
            .selected_task
            .as_ref()
            .and_then(|uid| uids.iter().position(|u| *u == uid))
            .unwrap_or(0);
        let next = if delta >= 0 {
            (cur + delta as usize).min(uids.len() - 1)
        } else {
            cur.saturating_sub(delta.unsigned_abs())
        };
        self.selected_task = Some(uids[next].clone());
    }

    fn toggle_selected_log(&mut self) {
        let Some(uid) = self.selected_task.clone() else {
            return;
        };
        if let Some(collapsed) = self.view.toggle_log(&uid) {
            self.prefs.set_log_collapsed(&uid, collapsed);
        }
    }

    fn scroll_selected_log(&mut self, delta: isize) {
        let Some(uid) = self.selected_task.clone() else {
            return;
        };
        if let Some(entry) = self.view.get_mut(&uid) {
            if !entry.log_collapsed {
                entry.scroll(delta);
            }
        }
    }

    fn tick(&mut self) {
        let now = Instant::now();

        if now >= self.next_poll_at {
            self.issue_poll();
            self.next_poll_at = now + self.poll_interval();
        }

        let uids: Vec<String> = self.view.uids().cloned().collect();
        for uid in uids {
            if let Some(entry) = self.view.get_mut(&uid) {
                entry.delete_confirm.tick(now);
            }
        }

        if self
            .notice
            .as_ref()
            .is_some_and(|n| now >= n.expires_at)
        {
            self.notice = None;
        }
    }

    fn handle_key(&mut self, code: KeyCode, mods: KeyModifiers) {
        if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
            self.should_quit = true;
            return;
        }

        if let InputMode::Edit { buffer, .. } = &mut self.input {
            match code {
                KeyCode::Esc => self.input = InputMode::Normal,
                KeyCode::Enter => self.apply_edit(),
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(c) => {
                    if !c.is_control() {
                        buffer.push(c);
                    }
                }
                _ => {}
            }
            return;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                return;
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Form => Focus::Tasks,
                    Focus::Tasks => Focus::Form,
                };
                return;
            }
            KeyCode::Char('r') => {
                self.poll_soon();
                return;
            }
            KeyCode::Char('u') => {
                self.trigger_binary_update();
                return;
            }
            KeyCode::Char('a') => {
                self.advanced_open = !self.advanced_open;
                let open = self.advanced_open;
                self.prefs.set_advanced_open(open);
                return;
            }
            _ => {}
        }

        match self.focus {
            Focus::Form => self.handle_form_key(code),
            Focus::Tasks => self.handle_tasks_key(code),
        }
    }

    fn handle_form_key(&mut self, code: KeyCode) {
        let rows = self.form_rows();
        match code {
            KeyCode::Down | KeyCode::Char('j') => {
                self.form_sel = (self.form_sel + 1).min(rows.len().saturating_sub(1));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.form_sel = self.form_sel.saturating_sub(1);
            }
            KeyCode::Char('s') => self.submit(),
            KeyCode::Left | KeyCode::Char('h') => {
                if self.selected_row() == Some(FormRow::Callbacks) {
                    self.cb_sel = self.cb_sel.saturating_sub(1);
                }
            }
            KeyCode::Right | KeyCode::Char('l') => {
                if self.selected_row() == Some(FormRow::Callbacks) {
                    self.cb_sel = (self.cb_sel + 1).min(self.callbacks.len().saturating_sub(1));
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                let Some(row) = self.selected_row() else {
                    return;
                };
                self.activate_row(row);
            }
            _ => {}
        }
    }

    fn activate_row(&mut self, row: FormRow) {
        match row {
            FormRow::VideoId => {
                self.input = InputMode::Edit {
                    row,
                    buffer: self.video_input.clone(),
                    error: None,
                };
            }
            FormRow::Binary => {
                let next = self.binary().cycled();
                self.set_binding("binary", ParamValue::Text(next.as_str().to_string()));
            }
            FormRow::Quality => {
                let cur = self.binding_text("quality");
                let idx = QUALITIES.iter().position(|q| *q == cur).unwrap_or(0);
                let next = QUALITIES[(idx + 1) % QUALITIES.len()];
                self.set_binding("quality", ParamValue::Text(next.to_string()));
            }
            FormRow::Thumbnail | FormRow::Wait | FormRow::Mkv | FormRow::Cookies => {
                let key = row.param_key().expect("toggle rows bind a key");
                if self.resolved.is_overridden(key) {
                    self.notify(
                        format!("'{key}' is set by the advanced parameters"),
                        NoticeKind::Warning,
                    );
                    return;
                }
                let cur = self.binding_flag(key);
                self.set_binding(key, ParamValue::Flag(!cur));
            }
            FormRow::Output | FormRow::Retry | FormRow::Threads | FormRow::Refresh
            | FormRow::Advanced => {
                let key = row.param_key().expect("text rows bind a key");
                if self.resolved.is_overridden(key) {
                    self.notify(
                        format!("'{key}' is set by the advanced parameters"),
                        NoticeKind::Warning,
                    );
                    return;
                }
                self.input = InputMode::Edit {
                    row,
                    buffer: self.binding_text(key),
                    error: None,
                };
            }
            FormRow::Callbacks => {
                let Some(name) = self.callbacks.get(self.cb_sel).cloned() else {
                    return;
                };
                if !self.selected_callbacks.remove(&name) {
                    self.selected_callbacks.insert(name);
                }
            }
        }
    }

    fn apply_edit(&mut self) {
        let (row, buffer) = match &self.input {
            InputMode::Edit { row, buffer, .. } => (*row, buffer.clone()),
            InputMode::Normal => return,
        };

        match row {
            FormRow::VideoId => {
                self.video_input = buffer;
                self.input = InputMode::Normal;
                self.submit();
            }
            FormRow::Refresh => {
                if !matches!(buffer.trim().parse::<u64>(), Ok(v) if v >= 1) {
                    self.input = InputMode::Edit {
                        row,
                        buffer,
                        error: Some("expected a whole number of seconds >= 1".into()),
                    };
                    return;
                }
                self.set_binding("refresh_interval", ParamValue::Text(buffer.trim().into()));
                // Interval changes re-arm the poll timer immediately.
                self.poll_soon();
                self.input = InputMode::Normal;
            }
            FormRow::Advanced => {
                self.set_binding("advanced_params", ParamValue::Text(buffer));
                self.input = InputMode::Normal;
            }
            FormRow::Output | FormRow::Retry | FormRow::Threads => {
                let key = row.param_key().expect("text rows bind a key");
                self.set_binding(key, ParamValue::Text(buffer.trim().to_string()));
                self.input = InputMode::Normal;
            }
            _ => {
                self.input = InputMode::Normal;
            }
        }
    }

    fn handle_tasks_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('j') => self.select_task_offset(1),
            KeyCode::Char('k') => self.select_task_offset(-1),
            KeyCode::Enter | KeyCode::Char(' ') => self.toggle_selected_log(),
            KeyCode::Char('d') => self.request_delete(),
            KeyCode::Up => self.scroll_selected_log(1),
            KeyCode::Down => self.scroll_selected_log(-1),
            KeyCode::PageUp => self.scroll_selected_log(10),
            KeyCode::PageDown => self.scroll_selected_log(-10),
            KeyCode::Home => {
                let len = self
                    .selected_task
                    .as_ref()
                    .and_then(|uid| self.view.get(uid))
                    .map(|e| e.log_lines.len())
                    .unwrap_or(0);
                self.scroll_selected_log(len as isize);
            }
            KeyCode::End => {
                let len = self
                    .selected_task
                    .as_ref()
                    .and_then(|uid| self.view.get(uid))
                    .map(|e| e.log_lines.len())
                    .unwrap_or(0);
                self.scroll_selected_log(-(len as isize));
            }
            _ => {}
        }
    }

    // --- drawing ---------------------------------------------------------

    fn draw(&mut self, f: &mut ratatui::Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(f.area());

        self.draw_header(f, chunks[0]);
        self.draw_main(f, chunks[1]);
        self.draw_footer(f, chunks[2]);
        self.draw_modal(f);
    }

    fn draw_header(&self, f: &mut ratatui::Frame, area: Rect) {
        let mut spans = vec![
            Span::styled(
                " vod console ",
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "worker={}  poll={}s  tasks={}",
                self.client.base(),
                self.poll_interval().as_secs(),
                self.view.len()
            )),
        ];
        if let Some(n) = &self.notice {
            let style = match n.kind {
                NoticeKind::Success => Style::default().fg(Color::Green),
                NoticeKind::Warning => Style::default().fg(Color::Yellow),
                NoticeKind::Error => Style::default().fg(Color::Red),
            };
            spans.push(Span::raw("  "));
            spans.push(Span::styled(n.text.clone(), style));
        }
        let header = Paragraph::new(Line::from(spans));
        f.render_widget(header, area);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame, area: Rect) {
        let text = match self.focus {
            Focus::Form => {
                "tab tasks  j/k move  enter/space edit  s start  a advanced  u update  r refresh  q quit"
            }
            Focus::Tasks => {
                "tab form  j/k select  space logs  d remove (press twice)  up/down scroll  r refresh  q quit"
            }
        };
        f.render_widget(
            Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
            area,
        );
    }

    fn draw_main(&mut self, f: &mut ratatui::Frame, area: Rect) {
        let form_width = 44u16;
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(form_width), Constraint::Min(0)])
            .split(area);
        self.draw_form(f, cols[0]);
        self.draw_tasks(f, cols[1]);
    }

    fn form_row_item(&self, row: FormRow) -> ListItem<'static> {
        let value = match row {
            FormRow::VideoId => {
                if self.video_input.is_empty() {
                    "<enter to type>".to_string()
                } else {
                    self.video_input.clone()
                }
            }
            FormRow::Callbacks => {
                let mut parts = Vec::new();
                for (i, cb) in self.callbacks.iter().enumerate() {
                    let mark = if self.selected_callbacks.contains(cb) {
                        "[x]"
                    } else {
                        "[ ]"
                    };
                    let cursor = if i == self.cb_sel { ">" } else { " " };
                    parts.push(format!("{cursor}{mark} {cb}"));
                }
                parts.join(" ")
            }
            _ => {
                let key = row.param_key().expect("form rows bind a key");
                match self.effective_value(key) {
                    ParamValue::Flag(b) => if b { "[x]" } else { "[ ]" }.to_string(),
                    ParamValue::Text(s) => s,
                }
            }
        };

        let mut spans = vec![
            Span::raw(format!("{:<22}", row.label())),
            Span::raw(value),
        ];
        if let Some(key) = row.param_key() {
            if self.resolved.is_overridden(key) {
                spans.push(Span::styled(
                    "  (advanced)",
                    Style::default().fg(Color::Magenta),
                ));
            }
        }
        ListItem::new(Line::from(spans))
    }

    fn draw_form(&mut self, f: &mut ratatui::Frame, area: Rect) {
        let rows = self.form_rows();
        self.form_sel = self.form_sel.min(rows.len().saturating_sub(1));

        let show_advanced_panel = self.advanced_open;
        let chunks = if show_advanced_panel {
            Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(9)])
                .split(area)
        } else {
            Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0)])
                .split(area)
        };

        let items: Vec<ListItem> = rows.iter().map(|r| self.form_row_item(*r)).collect();
        let mut state = ListState::default();
        state.select(Some(self.form_sel));
        let border_style = if self.focus == Focus::Form {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let list = List::new(items)
            .block(
                Block::default()
                    .title("New download")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(border_style),
            )
            .highlight_symbol(">> ")
            .highlight_style(Style::default().add_modifier(Modifier::BOLD));
        f.render_stateful_widget(list, chunks[0], &mut state);

        if show_advanced_panel {
            self.draw_advanced_panel(f, chunks[1]);
        }
    }

    fn draw_advanced_panel(&self, f: &mut ratatui::Frame, area: Rect) {
        let mut lines = Vec::new();
        for diag in &self.resolved.diagnostics {
            lines.push(Line::from(Span::styled(
                format!("! {diag}"),
                Style::default().fg(Color::Yellow),
            )));
        }
        for (key, value) in &self.resolved.snapshot {
            let mark = if self.resolved.is_overridden(key) {
                "*"
            } else {
                " "
            };
            lines.push(Line::from(format!("{mark}{key} = {}", value.render())));
        }
        let panel = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }).block(
            Block::default()
                .title("Resolved submission")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        );
        f.render_widget(panel, area);
    }

    fn draw_tasks(&mut self, f: &mut ratatui::Frame, area: Rect) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(34), Constraint::Min(0)])
            .split(area);

        let uids: Vec<&String> = self.view.uids().collect();
        let selected_idx = self
            .selected_task
            .as_ref()
            .and_then(|uid| uids.iter().position(|u| *u == uid));

        let items: Vec<ListItem> = self
            .view
            .iter()
            .map(|entry| {
                let marker = if entry.log_collapsed { "▶" } else { "▼" };
                let status_style = match entry.status_text.as_str() {
                    "Done" => Style::default().fg(Color::Green),
                    "Error" => Style::default().fg(Color::Red),
                    "Warning" => Style::default().fg(Color::Yellow),
                    "Active" => Style::default().fg(Color::Cyan),
                    _ => Style::default(),
                };
                let mut spans = vec![
                    Span::raw(format!("{marker} {} ", entry.uid)),
                    Span::styled(entry.status_text.clone(), status_style),
                ];
                if entry.delete_confirm.is_armed() {
                    spans.push(Span::styled(
                        "  confirm?",
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let mut state = ListState::default();
        state.select(selected_idx);
        let border_style = if self.focus == Focus::Tasks {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let list = List::new(items)
            .block(
                Block::default()
                    .title("Tasks")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(border_style),
            )
            .highlight_symbol(">> ")
            .highlight_style(Style::default().add_modifier(Modifier::BOLD));
        f.render_stateful_widget(list, cols[0], &mut state);

        let height = cols[1].height as usize;
        let (title, body) = self.render_selected_log(height);
        let panel = Paragraph::new(body).wrap(Wrap { trim: false }).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        );
        f.render_widget(panel, cols[1]);
    }

    fn render_selected_log(&self, height: usize) -> (String, Text<'static>) {
        let Some(entry) = self
            .selected_task
            .as_ref()
            .and_then(|uid| self.view.get(uid))
        else {
            return ("Logs".to_string(), Text::from("no task selected"));
        };
        if entry.log_collapsed {
            return (
                format!("Logs: {} (collapsed)", entry.uid),
                Text::from("space to expand"),
            );
        }

        let q = &entry.log_lines;
        let visible = height.saturating_sub(2);
        let max = q.len().saturating_sub(visible);
        let scroll = entry.log_scroll.min(max);
        let start = q.len().saturating_sub(visible.saturating_add(scroll));
        let end = q.len().saturating_sub(scroll);
        let mut lines = Vec::new();
        for s in q.iter().skip(start).take(end.saturating_sub(start)) {
            lines.push(Line::from(s.clone()));
        }
        let follow = if entry.auto_scroll.is_armed() {
            "follow"
        } else {
            "paused"
        };
        (
            format!("Logs: {} ({follow})", entry.uid),
            Text::from(lines),
        )
    }

    fn draw_modal(&self, f: &mut ratatui::Frame) {
        let InputMode::Edit { row, buffer, error } = &self.input else {
            return;
        };
        let area = centered_rect(70, 20, f.area());
        f.render_widget(Clear, area);

        let mut lines = vec![Line::from(format!("{}: {buffer}\u{2588}", row.label()))];
        if let Some(e) = error {
            lines.push(Line::from(Span::styled(
                e.clone(),
                Style::default().fg(Color::Red),
            )));
        }
        lines.push(Line::from(Span::styled(
            "enter apply  esc cancel",
            Style::default().fg(Color::DarkGray),
        )));
        let panel = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }).block(
            Block::default()
                .title("Edit")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        );
        f.render_widget(panel, area);
    }
}

pub fn run_tui(server: &str, prefs_path: &Path) -> Result<()> {
    let client = WorkerClient::new(server)?;
    let prefs = PrefStore::open(prefs_path);
    let app = App::new(client, prefs);

    let mut stdout = io::stdout();
    enable_raw_mode().map_err(|e| Error::msg(e.to_string()))?;
    execute!(stdout, EnterAlternateScreen, Hide).map_err(|e| Error::msg(e.to_string()))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).map_err(|e| Error::msg(e.to_string()))?;
    terminal
        .clear()
        .map_err(|e| Error::msg(format!("tui clear failed: {e}")))?;

    let result = run_loop(&mut terminal, app);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();

    result
}

fn run_loop(terminal: &mut Terminal<CrosstermBackend<Stdout>>, mut app: App) -> Result<()> {
    loop {
        app.drain_net_events();
        app.tick();

        terminal
            .draw(|f| app.draw(f))
            .map_err(|e| Error::msg(format!("draw failed: {e}")))?;

        if app.should_quit {
            return Ok(());
        }

        if event::poll(TICK).map_err(|e| Error::msg(e.to_string()))? {
            match event::read().map_err(|e| Error::msg(e.to_string()))? {
                Event::Key(k) => {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    app.handle_key(k.code, k.modifiers);
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1]);
    horiz[1]
}
