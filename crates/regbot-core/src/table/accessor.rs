//! Time-bounded cache of the worksheet handle in front of the table service.
//!
//! Only worksheet metadata is cached; the client comes from the connection
//! manager on every call.

use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{
    connection::ConnectionManager,
    errors::Error,
    table::{TableHandle, TableService, WorksheetHandle},
    Result,
};

/// A cached value with the instant it was fetched.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    /// Valid iff younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry<Arc<WorksheetHandle>>>,
    /// Bumped by every invalidation; a refresh that started under an older
    /// generation must not install its result.
    generation: u64,
}

/// Time-bounded cache of one worksheet handle.
pub struct CachedTableAccessor {
    connections: Arc<ConnectionManager<dyn TableService>>,
    spreadsheet_key: String,
    worksheet_name: String,
    ttl: Duration,
    slot: RwLock<Slot>,
    refresh: Mutex<()>,
}

impl CachedTableAccessor {
    pub fn new(
        connections: Arc<ConnectionManager<dyn TableService>>,
        spreadsheet_key: impl Into<String>,
        worksheet_name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            connections,
            spreadsheet_key: spreadsheet_key.into(),
            worksheet_name: worksheet_name.into(),
            ttl,
            slot: RwLock::new(Slot::default()),
            refresh: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn cached(&self) -> Option<Arc<WorksheetHandle>> {
        let slot = self.slot.read();
        match &slot.entry {
            Some(entry) if entry.is_fresh(self.ttl) => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Return a live handle, refetching the worksheet when the cache is stale.
    ///
    /// Concurrent callers past the TTL trigger exactly one fetch; the others
    /// wait on the refresh lock and pick up the new entry.
    pub async fn get_handle(&self) -> Result<TableHandle> {
        let client = self.connections.get_client().await?;

        if let Some(ws) = self.cached() {
            return Ok(TableHandle::new(client, ws));
        }

        let _guard = self.refresh.lock().await;

        if let Some(ws) = self.cached() {
            return Ok(TableHandle::new(client, ws));
        }

        let generation = self.slot.read().generation;
        let ws = client
            .open_worksheet(&self.spreadsheet_key, &self.worksheet_name)
            .await
            .map_err(Error::registry("open worksheet"))?;
        let ws = Arc::new(ws);

        {
            let mut slot = self.slot.write();
            if slot.generation == generation {
                slot.entry = Some(CacheEntry::new(ws.clone()));
            }
        }
        tracing::debug!(
            worksheet = %ws.title,
            sheet_id = ws.sheet_id,
            "worksheet handle refreshed"
        );

        Ok(TableHandle::new(client, ws))
    }

    /// Drop the cached handle so the next [`Self::get_handle`] refetches.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write();
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
    }
}
