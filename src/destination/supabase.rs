// ABOUTME: Supabase destination backed by the PostgREST HTTP API
// ABOUTME: Maps select/upsert/insert and the exec_sql RPC onto REST calls

use super::{Destination, DestinationResult};
use crate::config::DestinationConfig;
use crate::error::DestinationError;
use crate::value::{Row, Value};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;

const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=minimal";
const PREFER_INSERT: &str = "return=minimal";

/// REST client for a Supabase project, authenticated with the service-role key
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: Url,
    sql_function: String,
}

impl SupabaseClient {
    /// Build a client for the configured project
    ///
    /// # Errors
    ///
    /// Fails when the URL is not an absolute http(s) URL or the service key
    /// cannot be sent as a header value.
    pub fn new(config: &DestinationConfig) -> Result<Self> {
        let base_url = Url::parse(config.url.trim())
            .with_context(|| format!("Invalid Supabase URL '{}'", config.url))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            bail!("Supabase URL must be an http(s) URL, got '{}'", config.url);
        }

        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&config.service_key)
            .context("Supabase service key contains characters not allowed in a header")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .context("Supabase service key contains characters not allowed in a header")?;
        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            sql_function: config.sql_function.clone(),
        })
    }

    /// `<base>/rest/v1/<segments...>` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> DestinationResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| DestinationError::new("Supabase URL cannot carry a path"))?;
            path.pop_if_empty().push("rest").push("v1");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> DestinationResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(parse_error_body(status, &body))
    }
}

fn transport_error(err: reqwest::Error) -> DestinationError {
    DestinationError::new(format!("Request to Supabase failed: {}", err))
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// Turn a non-success PostgREST response into a `DestinationError`
pub fn parse_error_body(status: u16, body: &str) -> DestinationError {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(parsed) => {
            let mut message = parsed
                .message
                .unwrap_or_else(|| format!("Supabase returned HTTP {}", status));
            if let Some(details) = parsed.details.filter(|d| !d.is_empty()) {
                message.push_str(": ");
                message.push_str(&details);
            }
            if let Some(hint) = parsed.hint.filter(|h| !h.is_empty()) {
                message.push_str(" (hint: ");
                message.push_str(&hint);
                message.push(')');
            }
            let mut err = DestinationError::new(message).with_status(status);
            err.code = parsed.code;
            err
        }
        Err(_) => {
            let trimmed = body.trim();
            let message = if trimmed.is_empty() {
                format!("Supabase returned HTTP {}", status)
            } else {
                trimmed.to_string()
            };
            DestinationError::new(message).with_status(status)
        }
    }
}

#[async_trait]
impl Destination for SupabaseClient {
    async fn ping(&self) -> DestinationResult<()> {
        let url = self.endpoint(&[""])?;
        self.send(self.http.get(url)).await?;
        Ok(())
    }

    async fn select(&self, table: &str, limit: usize) -> DestinationResult<Vec<serde_json::Value>> {
        let url = self.endpoint(&[table])?;
        let request = self
            .http
            .get(url)
            .query(&[("select", "*".to_string()), ("limit", limit.to_string())]);
        let response = self.send(request).await?;
        response.json().await.map_err(transport_error)
    }

    async fn exists(&self, table: &str, key_column: &str, key: &Value) -> DestinationResult<bool> {
        // Rejected locally, so marked permanent with a client-error status
        let literal = key.as_filter_literal().ok_or_else(|| {
            DestinationError::new(format!(
                "Cannot filter '{}' on a {} value",
                key_column,
                if key.is_null() { "null" } else { "non-scalar" }
            ))
            .with_status(400)
        })?;
        let url = self.endpoint(&[table])?;
        let request = self.http.get(url).query(&[
            ("select", key_column.to_string()),
            (key_column, format!("eq.{}", literal)),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<serde_json::Value> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(!rows.is_empty())
    }

    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> DestinationResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&[table])?;
        let request = self
            .http
            .post(url)
            .query(&[("on_conflict", conflict_key)])
            .header("Prefer", PREFER_UPSERT)
            .json(rows);
        self.send(request).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> DestinationResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&[table])?;
        let request = self.http.post(url).header("Prefer", PREFER_INSERT).json(rows);
        self.send(request).await?;
        Ok(())
    }

    async fn execute_sql(&self, sql: &str) -> DestinationResult<()> {
        let url = self.endpoint(&["rpc", self.sql_function.as_str()])?;
        let request = self.http.post(url).json(&serde_json::json!({ "sql": sql }));
        self.send(request).await?;
        Ok(())
    }
}
