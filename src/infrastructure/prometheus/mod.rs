// Prometheus backend: PromQL builder, HTTP client and response normalizer
pub mod client;
pub mod promql;
pub mod repository;
pub mod response;
