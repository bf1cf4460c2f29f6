// Domain layer - backend-neutral models
pub mod metadata;
pub mod metric;
pub mod query_condition;
