// Prometheus HTTP API client
use super::response::Response;
use crate::domain::query_condition::DEFAULT_STEP_TIME;
use crate::error::{DatahubError, Result};
use crate::infrastructure::config::PrometheusConfig;
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const QUERY_PATH: &str = "/api/v1/query";
const QUERY_RANGE_PATH: &str = "/api/v1/query_range";

#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base_url: String,
    bearer_token: Option<String>,
    http: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| DatahubError::Config(format!("invalid prometheus url {}: {}", config.url, e)))?;

        // The token is read once; rotation needs a restart.
        let bearer_token = match &config.bearer_token_file {
            Some(path) => {
                let token = std::fs::read_to_string(path).map_err(|e| {
                    DatahubError::Config(format!("read bearer token file {} failed: {}", path, e))
                })?;
                Some(token.trim().to_string())
            }
            None => None,
        };

        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);
        if url.scheme() == "https" {
            builder = builder.danger_accept_invalid_certs(config.tls.insecure_skip_verify);
        }
        let http = builder.build().map_err(|source| DatahubError::Transport {
            context: "build prometheus http client failed",
            source,
        })?;

        Ok(Self {
            base_url: url.as_str().trim_end_matches('/').to_string(),
            bearer_token,
            http,
        })
    }

    /// Instant query at `time`, or at server time when absent.
    pub async fn query(
        &self,
        expression: &str,
        time: Option<DateTime<Utc>>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let mut params = vec![("query", expression.to_string())];
        if let Some(time) = time {
            params.push(("time", time.timestamp().to_string()));
        }
        if let Some(timeout) = timeout {
            params.push(("timeout", format!("{}s", timeout.as_secs())));
        }

        tracing::debug!("prometheus query: {}", expression);
        self.get(QUERY_PATH, &params).await
    }

    /// Range query. Absent start means the unix epoch, absent end means now.
    pub async fn query_range(
        &self,
        expression: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        step: Option<Duration>,
    ) -> Result<Response> {
        let start = start.map(|t| t.timestamp()).unwrap_or(0);
        let end = end.unwrap_or_else(Utc::now).timestamp();
        let step = step.unwrap_or(DEFAULT_STEP_TIME).as_secs();

        let params = [
            ("query", expression.to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("step", step.to_string()),
        ];

        tracing::debug!("prometheus range query: {} [{}, {}] step {}s", expression, start, end, step);
        self.get(QUERY_RANGE_PATH, &params).await
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Response> {
        let mut request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(params);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|source| DatahubError::Transport {
                context: "query prometheus failed",
                source,
            })?;

        // Error statuses still carry the JSON envelope, so the body is always decoded.
        let body = response
            .text()
            .await
            .map_err(|source| DatahubError::Transport {
                context: "read prometheus response body failed",
                source,
            })?;

        serde_json::from_str(&body).map_err(|e| DatahubError::Decode {
            message: e.to_string(),
            body,
        })
    }
}
