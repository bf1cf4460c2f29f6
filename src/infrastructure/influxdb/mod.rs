// InfluxDB 1.x backend: InfluxQL builder, line protocol, HTTP client and row normalizer
pub mod client;
pub mod gpu;
pub mod line_protocol;
pub mod repository;
pub mod rows;
pub mod statement;
