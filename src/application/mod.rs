// Application layer - use cases over the metric repositories
pub mod assembler;
pub mod metrics_repository;
pub mod metrics_service;
pub mod requests;
