//! Remote tabular store port.
//!
//! The store is a spreadsheet-like service: a document opened by key holds
//! named worksheets; rows and columns are 1-based; every cell is a string.

pub mod accessor;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

pub use accessor::CachedTableAccessor;

/// Resolved worksheet metadata. Cheap to clone; carries no connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorksheetHandle {
    pub spreadsheet_id: String,
    pub sheet_id: i64,
    pub title: String,
}

/// Operations consumed from the remote tabular service.
///
/// Implementations perform exactly one attempt per call and rely on their own
/// transport timeouts.
#[async_trait]
pub trait TableService: Send + Sync {
    /// Open the document by key, then resolve the worksheet by name.
    async fn open_worksheet(
        &self,
        spreadsheet_key: &str,
        worksheet_name: &str,
    ) -> Result<WorksheetHandle>;

    /// All values of column `col`, starting at row 1. Trailing empty cells may be omitted.
    async fn col_values(&self, ws: &WorksheetHandle, col: usize) -> Result<Vec<String>>;

    /// All values of row `row`. Trailing empty cells may be omitted.
    async fn row_values(&self, ws: &WorksheetHandle, row: usize) -> Result<Vec<String>>;

    /// Append one row after the last non-empty row.
    async fn append_row(&self, ws: &WorksheetHandle, values: Vec<String>) -> Result<()>;

    async fn update_cell(
        &self,
        ws: &WorksheetHandle,
        row: usize,
        col: usize,
        value: &str,
    ) -> Result<()>;

    /// Row number of the first cell in column `col` whose value equals `value`.
    async fn find_in_column(
        &self,
        ws: &WorksheetHandle,
        col: usize,
        value: &str,
    ) -> Result<Option<usize>> {
        let values = self.col_values(ws, col).await?;
        Ok(values.iter().position(|v| v == value).map(|idx| idx + 1))
    }
}

/// A live client paired with a resolved worksheet.
///
/// Handed out by [`CachedTableAccessor::get_handle`]. The client part is taken
/// fresh from the connection manager on every call, only the worksheet
/// metadata is cached.
#[derive(Clone)]
pub struct TableHandle {
    client: Arc<dyn TableService>,
    worksheet: Arc<WorksheetHandle>,
}

impl TableHandle {
    pub fn new(client: Arc<dyn TableService>, worksheet: Arc<WorksheetHandle>) -> Self {
        Self { client, worksheet }
    }

    pub fn worksheet(&self) -> &Arc<WorksheetHandle> {
        &self.worksheet
    }

    pub async fn col_values(&self, col: usize) -> Result<Vec<String>> {
        self.client.col_values(&self.worksheet, col).await
    }

    pub async fn row_values(&self, row: usize) -> Result<Vec<String>> {
        self.client.row_values(&self.worksheet, row).await
    }

    pub async fn append_row(&self, values: Vec<String>) -> Result<()> {
        self.client.append_row(&self.worksheet, values).await
    }

    pub async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<()> {
        self.client
            .update_cell(&self.worksheet, row, col, value)
            .await
    }

    pub async fn find_in_column(&self, col: usize, value: &str) -> Result<Option<usize>> {
        self.client
            .find_in_column(&self.worksheet, col, value)
            .await
    }
}
