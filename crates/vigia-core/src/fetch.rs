//! HTTP fetch engine shared by every source adapter.
//!
//! The engine owns the retry policy: each URL of a request plan is fetched
//! with a per-source courtesy delay, and throttling responses (HTTP 429, or
//! a provider-specific in-band signal) grow the delay by a fixed increment
//! until a hard ceiling aborts the source. Successfully fetched payloads are
//! reshaped by the adapter and merged in plan order.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use vigia_common::{Result, VigiaError};

use crate::sources::SourceAdapter;
use crate::table::DataTable;

/// Retry and timeout knobs.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Added to the courtesy delay after each throttled response.
    pub delay_increase: Duration,
    /// A source is abandoned once its delay would exceed this.
    pub delay_ceiling: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        FetchPolicy {
            timeout: Duration::from_secs(30),
            delay_increase: Duration::from_millis(500),
            delay_ceiling: Duration::from_secs(8),
        }
    }
}

/// A decoded response body, before reshaping into a table.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(serde_json::Value),
    Csv(CsvPayload),
}

/// A parsed CSV document: header row plus data rows.
#[derive(Debug, Clone, Default)]
pub struct CsvPayload {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvPayload {
    /// Parse CSV text. Ragged rows are accepted; short rows read as empty
    /// fields.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(CsvPayload { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Index of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// A cell by row and column name; absent cells read as `None`.
    pub fn cell<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        let idx = self.column_index(name)?;
        row.get(idx).map(String::as_str)
    }
}

/// What an adapter made of one response body.
#[derive(Debug)]
pub enum Handled {
    /// Usable data.
    Data(Payload),
    /// The provider signalled throttling inside a successful response.
    Throttled,
    /// A valid response carrying no rows for this request.
    Empty,
}

/// Fetches and assembles the data of one source per call.
#[derive(Debug, Clone)]
pub struct FetchEngine {
    client: Client,
    policy: FetchPolicy,
}

impl FetchEngine {
    pub fn new() -> Result<Self> {
        Self::with_policy(FetchPolicy::default())
    }

    pub fn with_policy(policy: FetchPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| VigiaError::Transport(format!("cannot build HTTP client: {}", e)))?;
        Ok(FetchEngine { client, policy })
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetch every URL of the adapter's plan and merge the reshaped tables
    /// in plan order. `Ok(None)` means the source had no data at all for the
    /// request.
    pub async fn run(&self, adapter: &mut SourceAdapter) -> Result<Option<DataTable>> {
        let urls = adapter.build_urls()?;
        let params = adapter.query_parameters();
        let mut merged: Option<DataTable> = None;

        for (seq, url) in urls.iter().enumerate() {
            let mut delay = adapter.initial_delay();
            loop {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                debug!(source = %adapter.source(), %url, "fetching");
                let mut request = self.client.get(url);
                if !params.is_empty() {
                    request = request.query(&params);
                }
                let response = request.send().await.map_err(|e| {
                        VigiaError::Transport(format!(
                            "{}: request to {} failed: {}",
                            adapter.source(),
                            url,
                            e
                        ))
                    })?;

                if response.status() == StatusCode::TOO_MANY_REQUESTS {
                    delay = self.backoff(adapter, delay)?;
                    continue;
                }
                if !response.status().is_success() {
                    return Err(VigiaError::Transport(format!(
                        "{}: {} answered {}",
                        adapter.source(),
                        url,
                        response.status()
                    )));
                }

                let body = response.text().await.map_err(|e| {
                    VigiaError::Transport(format!(
                        "{}: reading body of {} failed: {}",
                        adapter.source(),
                        url,
                        e
                    ))
                })?;

                match adapter.handle_response(&body, &self.client).await? {
                    Handled::Throttled => {
                        delay = self.backoff(adapter, delay)?;
                        continue;
                    }
                    Handled::Empty => {
                        debug!(source = %adapter.source(), %url, "no rows");
                        break;
                    }
                    Handled::Data(payload) => {
                        let table = adapter.reshape(payload, seq)?;
                        merged = match merged {
                            None => Some(table),
                            Some(mut acc) => {
                                acc.merge(table)?;
                                Some(acc)
                            }
                        };
                        break;
                    }
                }
            }
        }

        if merged.as_ref().is_none_or(DataTable::is_empty) {
            return Ok(None);
        }
        Ok(merged)
    }

    fn backoff(&self, adapter: &SourceAdapter, delay: Duration) -> Result<Duration> {
        let next = delay + self.policy.delay_increase;
        if next > self.policy.delay_ceiling {
            return Err(VigiaError::Transport(format!(
                "{}: still throttled at the {}ms delay ceiling",
                adapter.source(),
                self.policy.delay_ceiling.as_millis()
            )));
        }
        warn!(
            source = %adapter.source(),
            delay_ms = next.as_millis() as u64,
            "throttled, increasing courtesy delay"
        );
        Ok(next)
    }
}
