//! Remote API client.
//!
//! Worker and order data come from the GraphQL service; clock-in mutations
//! and report submissions go through the REST-style proxy endpoints. The
//! session JWT is forwarded as the `token` cookie on every request.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::backend::{ClockInSink, OrderSource, ReportSink, WorkerSource};
use crate::config::ShiftConfig;
use crate::error::ShiftError;
use crate::models::{ClockInUpdate, Order, ReportSubmission, WorkerProfile};

const GRAPHQL_PATH: &str = "/graphql";
const CLOCK_IN_PATH: &str = "/api/clock-in";
const REPORTS_PATH: &str = "/api/reports";

const ME_QUERY: &str = "query Me {
  me {
    id
    username
    clockIns { id userId clockIn clockOut status notes moneyIn moneyOut }
  }
}";

const ORDERS_QUERY: &str = "query Orders {
  orders { id total status createdAt paymentReference }
}";

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the API base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/api` segment
pub fn normalize_api_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn friendly_error(url: &str, err: &reqwest::Error) -> ShiftError {
    let message = if err.is_connect() {
        format!("Cannot reach API at {url}")
    } else if err.is_timeout() {
        format!("Connection to {url} timed out")
    } else if err.is_builder() {
        format!("Invalid API URL: {url}")
    } else {
        format!("Network error communicating with {url}: {err}")
    };
    ShiftError::Transport(message)
}

fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired, please log in again".to_string(),
        403 => "Not allowed to perform this action".to_string(),
        404 => "API endpoint not found".to_string(),
        409 => "Conflicting shift state on the server".to_string(),
        s if s >= 500 => "API server error".to_string(),
        _ => "Unexpected response from API".to_string(),
    }
}

/// Build the error for a non-2xx response, preferring the server's message.
pub(crate) fn status_error(status: StatusCode, body_text: &str) -> ShiftError {
    let server_message = serde_json::from_str::<Value>(body_text).ok().and_then(|json| {
        json.get("error")
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let message = match server_message {
        Some(m) if !m.trim().is_empty() => m,
        _ if !body_text.trim().is_empty() && !body_text.trim_start().starts_with('{') => {
            body_text.trim().to_string()
        }
        _ => status_message(status),
    };
    ShiftError::Status {
        status: status.as_u16(),
        message,
    }
}

/// Pull `data.<field>` out of a GraphQL response, surfacing `errors`.
pub(crate) fn graphql_field(envelope: Value, field: &str) -> Result<Value, ShiftError> {
    if let Some(errors) = envelope.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                })
                .collect();
            return Err(ShiftError::GraphQl(messages.join("; ")));
        }
    }
    match envelope.get("data").and_then(|d| d.get(field)) {
        Some(Value::Null) | None => Err(ShiftError::Decode(format!(
            "GraphQL response has no data.{field}"
        ))),
        Some(v) => Ok(v.clone()),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(config: &ShiftConfig) -> Result<Self, ShiftError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ShiftError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: normalize_api_url(&config.api_url),
            token: config.api_token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform an authenticated request. Returns `Value::Null` for empty bodies.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        idempotency_key: Option<&str>,
    ) -> Result<Value, ShiftError> {
        let full_url = format!("{}{path}", self.base_url);
        debug!(%method, url = %full_url, "API request");

        let mut req = self
            .client
            .request(method, &full_url)
            .header("Content-Type", "application/json");
        if let Some(token) = &self.token {
            req = req.header("Cookie", format!("token={token}"));
        }
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;

        if !status.is_success() {
            return Err(status_error(status, &body_text));
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| ShiftError::Decode(e.to_string()))
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, field: &str) -> Result<T, ShiftError> {
        let envelope = self
            .request(Method::POST, GRAPHQL_PATH, Some(json!({ "query": query })), None)
            .await?;
        let value = graphql_field(envelope, field)?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl WorkerSource for ApiClient {
    async fn fetch_worker(&self) -> Result<WorkerProfile, ShiftError> {
        let worker: WorkerProfile = self.graphql(ME_QUERY, "me").await?;
        debug!(
            worker_id = %worker.id,
            records = worker.clock_ins.len(),
            "fetched worker"
        );
        Ok(worker)
    }
}

#[async_trait]
impl ClockInSink for ApiClient {
    async fn create_clock_in(&self, user_id: &str) -> Result<(), ShiftError> {
        self.request(
            Method::POST,
            CLOCK_IN_PATH,
            Some(json!({ "userId": user_id })),
            None,
        )
        .await?;
        info!(worker_id = user_id, "clock-in created");
        Ok(())
    }

    async fn close_clock_in(
        &self,
        update: &ClockInUpdate,
        idempotency_key: &str,
    ) -> Result<(), ShiftError> {
        self.request(
            Method::PUT,
            CLOCK_IN_PATH,
            Some(serde_json::to_value(update)?),
            Some(idempotency_key),
        )
        .await?;
        info!(worker_id = %update.user_id, "clock-in closed");
        Ok(())
    }
}

#[async_trait]
impl ReportSink for ApiClient {
    async fn submit_report(
        &self,
        submission: &ReportSubmission,
        idempotency_key: &str,
    ) -> Result<(), ShiftError> {
        self.request(
            Method::POST,
            REPORTS_PATH,
            Some(serde_json::to_value(submission)?),
            Some(idempotency_key),
        )
        .await?;
        info!(
            worker_id = %submission.user_id,
            date = %submission.date,
            "shift report submitted"
        );
        Ok(())
    }
}

#[async_trait]
impl OrderSource for ApiClient {
    async fn fetch_orders(&self) -> Result<Vec<Order>, ShiftError> {
        self.graphql(ORDERS_QUERY, "orders").await
    }
}
