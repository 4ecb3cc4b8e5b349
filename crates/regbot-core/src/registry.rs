//! Sequential registration ledger on top of one remote worksheet.
//!
//! Sheet contract: row 1 holds headers, column 1 holds the serial, and one
//! header names the status column ([`TableSchema::status_header`]).

use std::{collections::HashMap, sync::Arc};

use crate::{
    domain::{RegistrationRecord, RegistrationStatus, Serial},
    errors::Error,
    table::{CachedTableAccessor, TableHandle},
    Result,
};

const HEADER_ROW: usize = 1;
const SERIAL_COL: usize = 1;

/// Header names used to place record fields into columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub serial_header: String,
    pub timestamp_header: String,
    pub display_name_header: String,
    pub requester_id_header: String,
    pub status_header: String,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            serial_header: "序號".to_string(),
            timestamp_header: "登記時間".to_string(),
            display_name_header: "登記用戶".to_string(),
            requester_id_header: "用戶ID".to_string(),
            status_header: "處理狀態".to_string(),
        }
    }
}

impl TableSchema {
    /// Lay `record` out in the sheet's header order.
    ///
    /// Column 1 always receives the serial. An empty header row (fresh sheet)
    /// falls back to `[serial, timestamp, display_name, requester_id, status]`.
    pub fn to_row(&self, headers: &[String], record: &RegistrationRecord) -> Result<Vec<String>> {
        let fields = [
            (&self.timestamp_header, record.timestamp.clone()),
            (&self.display_name_header, record.display_name.clone()),
            (&self.requester_id_header, record.requester_id.clone()),
            (&self.status_header, record.status.label().to_string()),
        ];

        if headers.iter().all(|h| h.trim().is_empty()) {
            let mut row = vec![record.serial.to_string()];
            row.extend(fields.into_iter().map(|(_, v)| v));
            return Ok(row);
        }

        self.status_column(headers)?;

        let mut row = vec![String::new(); headers.len().max(1)];
        row[0] = record.serial.to_string();
        for (header, value) in fields {
            match column_of(headers, header) {
                Some(col) => row[col - 1] = value,
                None => tracing::debug!(header = %header, "no column for field; skipped"),
            }
        }
        Ok(row)
    }

    /// 1-based column of the status header.
    pub fn status_column(&self, headers: &[String]) -> Result<usize> {
        column_of(headers, &self.status_header).ok_or_else(|| {
            Error::Registry(format!(
                "status column '{}' not found in header row",
                self.status_header
            ))
        })
    }
}

fn column_of(headers: &[String], name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .map(|idx| idx + 1)
}

/// Header -> cell mapping of one sheet row.
pub type RecordFields = HashMap<String, String>;

/// Allocates serials and reads/writes registration rows.
pub struct SequentialRegistry {
    table: Arc<CachedTableAccessor>,
    schema: TableSchema,
}

impl SequentialRegistry {
    pub fn new(table: Arc<CachedTableAccessor>, schema: TableSchema) -> Self {
        Self { table, schema }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Next serial: highest numeric value in column 1, plus one.
    ///
    /// Value-based rather than row-count-based so deleted rows never cause a
    /// serial to be reissued. Not atomic: two callers that read the column
    /// before either appends get the same serial.
    pub async fn allocate_serial(&self) -> Result<Serial> {
        let handle = self.table.get_handle().await?;
        let values = handle
            .col_values(SERIAL_COL)
            .await
            .map_err(Error::registry("read serial column"))?;
        next_serial(&values)
    }

    /// Append `record` as a new row. The handle cache is invalidated whether
    /// or not the append succeeded; a failed append is treated as not written.
    pub async fn append_record(&self, record: &RegistrationRecord) -> Result<()> {
        let handle = self.table.get_handle().await?;
        let headers = handle
            .row_values(HEADER_ROW)
            .await
            .map_err(Error::registry("read header row"))?;
        let row = self.schema.to_row(&headers, record)?;

        let appended = handle
            .append_row(row)
            .await
            .map_err(Error::registry("append row"));
        self.table.invalidate();
        appended?;

        tracing::info!(serial = %record.serial, requester = %record.requester_id, "registration appended");
        Ok(())
    }

    /// Find the row whose column 1 equals `serial` and map it by header.
    ///
    /// Missing trailing cells are filled with empty strings.
    pub async fn find_by_serial(&self, serial: Serial) -> Result<Option<RecordFields>> {
        let handle = self.table.get_handle().await?;
        let Some(row) = self.locate(&handle, serial).await? else {
            return Ok(None);
        };

        let headers = handle
            .row_values(HEADER_ROW)
            .await
            .map_err(Error::registry("read header row"))?;
        let mut values = handle
            .row_values(row)
            .await
            .map_err(Error::registry("read record row"))?;
        if values.len() < headers.len() {
            values.resize(headers.len(), String::new());
        }

        Ok(Some(headers.into_iter().zip(values).collect()))
    }

    /// Overwrite the status cell of `serial`. `Ok(false)` when no such row.
    pub async fn update_status(&self, serial: Serial, status: RegistrationStatus) -> Result<bool> {
        let handle = self.table.get_handle().await?;
        let Some(row) = self.locate(&handle, serial).await? else {
            tracing::info!(serial = %serial, "status update for unknown serial");
            return Ok(false);
        };

        let headers = handle
            .row_values(HEADER_ROW)
            .await
            .map_err(Error::registry("read header row"))?;
        let col = self.schema.status_column(&headers)?;

        let updated = handle
            .update_cell(row, col, status.label())
            .await
            .map_err(Error::registry("update status cell"));
        self.table.invalidate();
        updated?;

        tracing::info!(serial = %serial, status = %status, row, "status updated");
        Ok(true)
    }

    /// Number of data rows carrying `serial`. More than one means two
    /// registrations raced through [`Self::allocate_serial`].
    pub async fn serial_occurrences(&self, serial: Serial) -> Result<usize> {
        let handle = self.table.get_handle().await?;
        let values = handle
            .col_values(SERIAL_COL)
            .await
            .map_err(Error::registry("read serial column"))?;
        let needle = serial.to_string();
        Ok(values
            .iter()
            .skip(HEADER_ROW)
            .filter(|v| v.trim() == needle)
            .count())
    }

    async fn locate(&self, handle: &TableHandle, serial: Serial) -> Result<Option<usize>> {
        let row = handle
            .find_in_column(SERIAL_COL, &serial.to_string())
            .await
            .map_err(Error::registry("find serial"))?;
        Ok(row.filter(|&r| r > HEADER_ROW))
    }
}

fn next_serial(values: &[String]) -> Result<Serial> {
    let max = values
        .iter()
        .rev()
        .filter_map(|v| v.trim().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    max.checked_add(1).map(Serial).ok_or_else(|| {
        Error::Registry(format!("serial column holds {max}; no next serial available"))
    })
}
