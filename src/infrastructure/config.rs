use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub prometheus: PrometheusConfig,
    pub influxdb: InfluxConfig,
    /// Backend serving metric reads; writes always go to InfluxDB
    #[serde(default)]
    pub metrics_source: MetricsSource,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSource {
    #[default]
    Prometheus,
    Influxdb,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PrometheusConfig {
    pub url: String,
    #[serde(default)]
    pub bearer_token_file: Option<String>,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxConfig {
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_metric_database")]
    pub database: String,
    /// Database holding the NVIDIA exporter measurements
    #[serde(default = "default_gpu_database")]
    pub gpu_database: String,
    #[serde(default = "default_insecure_skip_verify")]
    pub insecure_skip_verify: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metric_database() -> String {
    "metric".to_string()
}

fn default_gpu_database() -> String {
    "gpu".to_string()
}

fn default_insecure_skip_verify() -> bool {
    true
}

/// Load `config/datahub.*`, overridden by `DATAHUB__SECTION__KEY` variables
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/datahub"))
        .add_source(config::Environment::with_prefix("DATAHUB").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Settings {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let settings = parse(
            r#"
            [prometheus]
            url = "http://prometheus:9090"

            [influxdb]
            address = "http://influxdb:8086"
            "#,
        );

        assert_eq!(settings.server.bind_address, "0.0.0.0:8080");
        assert_eq!(settings.metrics_source, MetricsSource::Prometheus);
        assert_eq!(settings.influxdb.database, "metric");
        assert_eq!(settings.influxdb.gpu_database, "gpu");
        assert!(settings.influxdb.insecure_skip_verify);
        assert!(settings.prometheus.bearer_token_file.is_none());
        assert!(!settings.prometheus.tls.insecure_skip_verify);
    }

    #[test]
    fn test_explicit_values() {
        let settings = parse(
            r#"
            metrics_source = "influxdb"

            [prometheus]
            url = "https://prometheus:9090"
            bearer_token_file = "/var/run/secrets/token"
            tls = { insecure_skip_verify = true }

            [influxdb]
            address = "http://influxdb:8086"
            username = "admin"
            password = "secret"
            "#,
        );

        assert_eq!(settings.metrics_source, MetricsSource::Influxdb);
        assert_eq!(
            settings.prometheus.bearer_token_file.as_deref(),
            Some("/var/run/secrets/token")
        );
        assert!(settings.prometheus.tls.insecure_skip_verify);
        assert_eq!(settings.influxdb.username, "admin");
    }
}
