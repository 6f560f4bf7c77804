// Google Sheets v4 backend for the ledger

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::auth::TokenSource;
use super::{LedgerError, LedgerStore};
use crate::models::cell::SheetRow;

pub const DEFAULT_SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4";

pub struct SheetsClient {
    http: reqwest::Client,
    base_url: Url,
    spreadsheet_id: String,
    tokens: TokenSource,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// A1 column name for a 1-based column index.
pub fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

impl SheetsClient {
    pub fn new(
        base_url: &str,
        spreadsheet_id: impl Into<String>,
        tokens: TokenSource,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            spreadsheet_id: spreadsheet_id.into(),
            tokens,
        })
    }

    /// `spreadsheets/{id}` followed by `segments`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, LedgerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LedgerError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("spreadsheets")
            .extend(segments);
        Ok(url)
    }

    fn values_endpoint(&self, range: &str) -> Result<Url, LedgerError> {
        self.endpoint(&[&self.spreadsheet_id, "values", range])
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, LedgerError> {
        let token = self.tokens.bearer(&self.http).await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, LedgerError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            tracing::error!(status, body = %message, "Sheets API request failed");
            return Err(LedgerError::Api { status, message });
        }
        Ok(response)
    }

    async fn sheet_titles(&self) -> Result<Vec<String>, LedgerError> {
        let mut url = self.endpoint(&[&self.spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let response = self.send(self.request(Method::GET, url).await?).await?;
        let spreadsheet: SpreadsheetResponse = response.json().await?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    async fn write_range(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), LedgerError> {
        let mut url = self.values_endpoint(range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let request = self
            .request(Method::PUT, url)
            .await?
            .json(&json!({ "range": range, "values": rows }));
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SheetsClient {
    async fn ensure_sheet(&self, sheet: &str, headers: &[&str]) -> Result<(), LedgerError> {
        if self.sheet_titles().await?.iter().any(|t| t == sheet) {
            return Ok(());
        }

        let url = self.endpoint(&[&format!("{}:batchUpdate", self.spreadsheet_id)])?;
        let request = self.request(Method::POST, url).await?.json(&json!({
            "requests": [{ "addSheet": { "properties": { "title": sheet } } }]
        }));
        self.send(request).await?;

        let header_row = headers.iter().map(|h| Value::from(*h)).collect();
        self.write_range(&format!("{}!A1", sheet), vec![header_row])
            .await?;

        tracing::info!(sheet, "Created ledger sheet");
        Ok(())
    }

    async fn get_rows(&self, sheet: &str) -> Result<Vec<SheetRow>, LedgerError> {
        let mut url = self.values_endpoint(sheet)?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
            .append_pair("dateTimeRenderOption", "FORMATTED_STRING");

        let response = self.send(self.request(Method::GET, url).await?).await?;
        let range: ValueRange = response.json().await?;

        Ok(range
            .values
            .into_iter()
            .enumerate()
            .skip(1)
            .map(|(i, cells)| SheetRow::new(i as u32 + 1, cells))
            .collect())
    }

    async fn append_row(&self, sheet: &str, cells: Vec<Value>) -> Result<(), LedgerError> {
        let range = format!("{}!A1", sheet);
        let mut url = self.endpoint(&[&self.spreadsheet_id, "values", &format!("{}:append", range)])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let request = self
            .request(Method::POST, url)
            .await?
            .json(&json!({ "values": [cells] }));
        self.send(request).await?;
        Ok(())
    }

    async fn update_cell(
        &self,
        sheet: &str,
        row: u32,
        column: usize,
        value: Value,
    ) -> Result<(), LedgerError> {
        let range = format!("{}!{}{}", sheet, column_letter(column), row);
        self.write_range(&range, vec![vec![value]]).await
    }
}
