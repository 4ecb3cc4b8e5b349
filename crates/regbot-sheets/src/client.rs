use std::sync::Arc;

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use regbot_core::{
    errors::Error,
    table::{TableService, WorksheetHandle},
    Result,
};

use crate::a1;

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub(crate) const SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

/// Google Sheets v4 REST client. One attempt per call; the transport timeout
/// is set on the `reqwest::Client`.
#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl ValueRange {
    /// First major-dimension line as strings (a column or a row, per request).
    fn first_line(self) -> Vec<String> {
        self.values
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect()
    }
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, auth: Arc<dyn TokenProvider>) -> Self {
        Self { http, auth }
    }

    fn url(spreadsheet_id: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(API_BASE)
            .map_err(|e| Error::External(format!("sheets url error: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::External("sheets url cannot be a base".to_string()))?
            .push(spreadsheet_id)
            .extend(segments);
        Ok(url)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&ValueRange>,
    ) -> Result<T> {
        let token = self
            .auth
            .token(SCOPES)
            .await
            .map_err(|e| Error::External(format!("google auth token error: {e}")))?;

        let mut req = self
            .http
            .request(method, url)
            .bearer_auth(token.as_str())
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::External(format!("sheets request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "sheets request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::External(format!("sheets json error: {e}")))
    }

    async fn get_values(
        &self,
        ws: &WorksheetHandle,
        range: &str,
        major_dimension: &str,
    ) -> Result<Vec<String>> {
        let url = Self::url(&ws.spreadsheet_id, &["values", range])?;
        let values: ValueRange = self
            .send(
                Method::GET,
                url,
                &[("majorDimension", major_dimension)],
                None,
            )
            .await?;
        Ok(values.first_line())
    }
}

#[async_trait]
impl TableService for SheetsClient {
    async fn open_worksheet(
        &self,
        spreadsheet_key: &str,
        worksheet_name: &str,
    ) -> Result<WorksheetHandle> {
        let url = Self::url(spreadsheet_key, &[])?;
        let doc: Spreadsheet = self
            .send(Method::GET, url, &[("fields", "sheets.properties")], None)
            .await?;

        let sheet = doc
            .sheets
            .into_iter()
            .map(|s| s.properties)
            .find(|p| p.title == worksheet_name)
            .ok_or_else(|| {
                Error::External(format!(
                    "worksheet '{worksheet_name}' not found in spreadsheet {spreadsheet_key}"
                ))
            })?;

        Ok(WorksheetHandle {
            spreadsheet_id: spreadsheet_key.to_string(),
            sheet_id: sheet.sheet_id,
            title: sheet.title,
        })
    }

    async fn col_values(&self, ws: &WorksheetHandle, col: usize) -> Result<Vec<String>> {
        self.get_values(ws, &a1::column_range(&ws.title, col), "COLUMNS")
            .await
    }

    async fn row_values(&self, ws: &WorksheetHandle, row: usize) -> Result<Vec<String>> {
        self.get_values(ws, &a1::row_range(&ws.title, row), "ROWS")
            .await
    }

    async fn append_row(&self, ws: &WorksheetHandle, values: Vec<String>) -> Result<()> {
        let range = a1::column_range(&ws.title, 1);
        let url = Self::url(&ws.spreadsheet_id, &["values", &format!("{range}:append")])?;
        let body = ValueRange {
            range: None,
            values: vec![values.into_iter().map(serde_json::Value::String).collect()],
        };
        let _: serde_json::Value = self
            .send(
                Method::POST,
                url,
                &[
                    ("valueInputOption", "RAW"),
                    ("insertDataOption", "INSERT_ROWS"),
                ],
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn update_cell(
        &self,
        ws: &WorksheetHandle,
        row: usize,
        col: usize,
        value: &str,
    ) -> Result<()> {
        let range = a1::cell(&ws.title, row, col);
        let url = Self::url(&ws.spreadsheet_id, &["values", &range])?;
        let body = ValueRange {
            range: Some(range.clone()),
            values: vec![vec![serde_json::Value::String(value.to_string())]],
        };
        let _: serde_json::Value = self
            .send(
                Method::PUT,
                url,
                &[("valueInputOption", "RAW")],
                Some(&body),
            )
            .await?;
        Ok(())
    }
}
