// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod influxdb;
pub mod prometheus;
