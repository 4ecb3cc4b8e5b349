//! In-memory fakes for the ports, shared by unit tests across modules.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    connection::Connector,
    domain::{ChatId, MessageRef, UserId},
    errors::Error,
    mail::Mailer,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, UserProfile},
    },
    table::{TableService, WorksheetHandle},
    Result,
};

/// Spreadsheet held in memory. Every call suspends once, like a network hop.
#[derive(Default)]
pub(crate) struct FakeTable {
    rows: Mutex<Vec<Vec<String>>>,
    opens: AtomicUsize,
    fail_opens: AtomicBool,
    fail_writes: AtomicBool,
    delay: Duration,
}

impl FakeTable {
    pub(crate) fn with_headers(headers: &[&str]) -> Self {
        let table = Self::default();
        table.push_row(headers);
        table
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn push_row(&self, row: &[&str]) {
        self.rows
            .lock()
            .push(row.iter().map(|s| s.to_string()).collect());
    }

    pub(crate) fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().clone()
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    async fn hop(&self) {
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::External("write rejected: 503".to_string()));
        }
        Ok(())
    }
}

fn trim_trailing_empty(mut v: Vec<String>) -> Vec<String> {
    while v.last().is_some_and(|s| s.is_empty()) {
        v.pop();
    }
    v
}

#[async_trait]
impl TableService for FakeTable {
    async fn open_worksheet(
        &self,
        spreadsheet_key: &str,
        worksheet_name: &str,
    ) -> Result<WorksheetHandle> {
        self.hop().await;
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(Error::External(format!(
                "spreadsheet {spreadsheet_key} not found"
            )));
        }
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(WorksheetHandle {
            spreadsheet_id: spreadsheet_key.to_string(),
            sheet_id: n as i64,
            title: worksheet_name.to_string(),
        })
    }

    async fn col_values(&self, _ws: &WorksheetHandle, col: usize) -> Result<Vec<String>> {
        self.hop().await;
        let rows = self.rows.lock();
        let values = rows
            .iter()
            .map(|r| r.get(col - 1).cloned().unwrap_or_default())
            .collect();
        Ok(trim_trailing_empty(values))
    }

    async fn row_values(&self, _ws: &WorksheetHandle, row: usize) -> Result<Vec<String>> {
        self.hop().await;
        let rows = self.rows.lock();
        Ok(trim_trailing_empty(
            rows.get(row - 1).cloned().unwrap_or_default(),
        ))
    }

    async fn append_row(&self, _ws: &WorksheetHandle, values: Vec<String>) -> Result<()> {
        self.hop().await;
        self.check_writes()?;
        self.rows.lock().push(values);
        Ok(())
    }

    async fn update_cell(
        &self,
        _ws: &WorksheetHandle,
        row: usize,
        col: usize,
        value: &str,
    ) -> Result<()> {
        self.hop().await;
        self.check_writes()?;
        let mut rows = self.rows.lock();
        if rows.len() < row {
            rows.resize(row, Vec::new());
        }
        let cells = &mut rows[row - 1];
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        cells[col - 1] = value.to_string();
        Ok(())
    }
}

/// Connector that always hands out the same [`FakeTable`].
pub(crate) struct FakeConnector {
    table: Arc<FakeTable>,
}

impl FakeConnector {
    pub(crate) fn new(table: Arc<FakeTable>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl Connector<dyn TableService> for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn TableService>> {
        Ok(self.table.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeMessenger {
    replies: Mutex<Vec<(MessageRef, String)>>,
    pushes: Mutex<Vec<(ChatId, String)>>,
    fail_profiles: AtomicBool,
    no_profile_lookup: AtomicBool,
    get_profile_calls: AtomicUsize,
    /// 0 means the Telegram limit.
    max_message_len: AtomicUsize,
}

impl FakeMessenger {
    pub(crate) fn replies(&self) -> Vec<String> {
        self.replies
            .lock()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub(crate) fn last_reply(&self) -> String {
        self.replies().last().cloned().unwrap_or_default()
    }

    pub(crate) fn pushes(&self) -> Vec<(ChatId, String)> {
        self.pushes.lock().clone()
    }

    pub(crate) fn fail_profiles(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn disable_profile_lookup(&self) {
        self.no_profile_lookup.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_max_message_len(&self, len: usize) {
        self.max_message_len.store(len, Ordering::SeqCst);
    }

    pub(crate) fn get_profile_calls(&self) -> usize {
        self.get_profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_profile_lookup: !self.no_profile_lookup.load(Ordering::SeqCst),
            max_message_len: match self.max_message_len.load(Ordering::SeqCst) {
                0 => 4096,
                n => n,
            },
        }
    }

    async fn send_reply(&self, to: MessageRef, text: &str) -> Result<()> {
        self.replies.lock().push((to, text.to_string()));
        Ok(())
    }

    async fn send_push(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.pushes.lock().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn get_profile(&self, user_id: UserId) -> Result<UserProfile> {
        self.get_profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_profiles.load(Ordering::SeqCst) {
            return Err(Error::External("profile lookup failed: 404".to_string()));
        }
        Ok(UserProfile {
            user_id,
            display_name: format!("User {}", user_id.0),
        })
    }
}

/// Mailer that forwards every (subject, body) pair to a channel.
pub(crate) struct FakeMailer {
    tx: mpsc::UnboundedSender<(String, String)>,
    fail: bool,
    delivers: bool,
}

impl FakeMailer {
    pub(crate) fn new(fail: bool) -> (Self, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                fail,
                delivers: true,
            },
            rx,
        )
    }

    /// Behave like a mailer that only records messages locally.
    pub(crate) fn log_only(mut self) -> Self {
        self.delivers = false;
        self
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let _ = self.tx.send((subject.to_string(), body.to_string()));
        if self.fail {
            return Err(Error::External("smtp: connection refused".to_string()));
        }
        Ok(())
    }

    fn delivers(&self) -> bool {
        self.delivers
    }
}
