// InfluxDB 1.x HTTP client
use super::line_protocol::{encode_batch, Point};
use super::rows::{QueryResponse, QueryResult};
use crate::error::{DatahubError, Result};
use crate::infrastructure::config::InfluxConfig;
use reqwest::{Method, Url};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct InfluxClient {
    address: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

/// Statements that modify state must be POSTed to `/query`.
fn query_method(cmd: &str) -> Method {
    let keyword = cmd.trim_start().split_whitespace().next().unwrap_or_default();
    if keyword.eq_ignore_ascii_case("SELECT") || keyword.eq_ignore_ascii_case("SHOW") {
        Method::GET
    } else {
        Method::POST
    }
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let url = Url::parse(&config.address).map_err(|e| {
            DatahubError::Config(format!("invalid influxdb address {}: {}", config.address, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|source| DatahubError::Transport {
                context: "build influxdb http client failed",
                source,
            })?;

        Ok(Self {
            address: url.as_str().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
        })
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        let request = self.http.request(method, url);
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }

    pub async fn query_db(&self, cmd: &str, database: &str) -> Result<Vec<QueryResult>> {
        let url = format!(
            "{}/query?db={}&q={}",
            self.address,
            urlencoding::encode(database),
            urlencoding::encode(cmd)
        );

        tracing::debug!("influxdb query on {}: {}", database, cmd);
        let response = self
            .request(query_method(cmd), url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| DatahubError::Transport {
                context: "query influxdb failed",
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| DatahubError::Transport {
                context: "read influxdb response body failed",
                source,
            })?;

        let data: QueryResponse = serde_json::from_str(&body).map_err(|e| DatahubError::Decode {
            message: e.to_string(),
            body: body.clone(),
        })?;

        if let Some(error) = data.error {
            return Err(DatahubError::Influx(error));
        }
        if let Some(error) = data.results.iter().find_map(|r| r.error.clone()) {
            return Err(DatahubError::Influx(error));
        }
        if !status.is_success() {
            return Err(DatahubError::Influx(format!("query failed with status {}: {}", status, body)));
        }

        Ok(data.results)
    }

    /// Write a batch; a rejected write returns the server's body verbatim and is not retried.
    pub async fn write_points(&self, points: &[Point], database: &str) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let body = encode_batch(points)?;
        let url = format!(
            "{}/write?db={}&precision=ns",
            self.address,
            urlencoding::encode(database)
        );

        let response = self
            .request(Method::POST, url)
            .body(body)
            .send()
            .await
            .map_err(|source| DatahubError::Transport {
                context: "write points to influxdb failed",
                source,
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatahubError::Influx(body));
        }

        tracing::debug!("wrote {} points to {}", points.len(), database);
        Ok(())
    }

    pub async fn create_database(&self, database: &str) -> Result<()> {
        self.query_db(&format!("CREATE DATABASE \"{}\"", database), database)
            .await
            .map(|_| ())
    }

    /// Server version reported by `/ping`.
    pub async fn ping(&self) -> Result<String> {
        let response = self
            .request(Method::GET, format!("{}/ping", self.address))
            .timeout(PING_TIMEOUT)
            .send()
            .await
            .map_err(|source| DatahubError::Transport {
                context: "ping influxdb failed",
                source,
            })?;

        if !response.status().is_success() {
            return Err(DatahubError::Influx(format!("ping returned status {}", response.status())));
        }

        Ok(response
            .headers()
            .get("X-Influxdb-Version")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }
}
