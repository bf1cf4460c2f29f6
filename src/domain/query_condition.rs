// Backend-neutral description of a time-series read
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Step used when a condition does not carry one.
pub const DEFAULT_STEP_TIME: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Windowed reducer applied to a raw series before further processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    #[default]
    None,
    Max,
    Avg,
    Min,
    Sum,
    Count,
    Mode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryCondition {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub step_time: Option<Duration>,
    pub timestamp_order: Order,
    /// Zero means unbounded.
    pub limit: usize,
    pub aggregate_over_time_function: AggregateFunction,
}

impl QueryCondition {
    pub fn step_or_default(&self) -> Duration {
        self.step_time.unwrap_or(DEFAULT_STEP_TIME)
    }

    /// Aggregation window width in whole seconds.
    pub fn step_seconds(&self) -> u64 {
        self.step_or_default().as_secs()
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step_time = Some(step);
        self
    }

    pub fn with_aggregation(mut self, function: AggregateFunction) -> Self {
        self.aggregate_over_time_function = function;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults_to_thirty_seconds() {
        let condition = QueryCondition::default();
        assert_eq!(condition.step_or_default(), DEFAULT_STEP_TIME);
        assert_eq!(condition.step_seconds(), 30);
    }

    #[test]
    fn test_step_seconds_truncates_fraction() {
        let condition = QueryCondition::default()
            .with_step(Duration::from_millis(90_500))
            .with_aggregation(AggregateFunction::Max);
        assert_eq!(condition.step_seconds(), 90);
        assert_eq!(condition.aggregate_over_time_function, AggregateFunction::Max);
    }
}
