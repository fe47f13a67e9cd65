use serde::{Deserialize, Serialize};

use crate::error::StashError;

/// How batch operations react to a failing item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Return the first error immediately instead of attempting the remaining items.
    #[serde(default)]
    pub stop_on_first_error: bool,
}

impl BatchOptions {
    pub fn stop_on_first_error() -> Self {
        Self {
            stop_on_first_error: true,
        }
    }

    pub fn best_effort() -> Self {
        Self {
            stop_on_first_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub key: String,
    pub error: StashError,
}

/// Outcome of a best-effort batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    /// True when every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }
}

/// Runs `op` over `items` under the given policy.
///
/// With `stop_on_first_error` the first failure is returned as `Err`;
/// otherwise failures are collected into the report.
pub fn run_batch<T, F>(
    items: impl IntoIterator<Item = T>,
    options: BatchOptions,
    key_of: impl Fn(&T) -> String,
    mut op: F,
) -> Result<BatchReport, StashError>
where
    F: FnMut(&T) -> Result<(), StashError>,
{
    let mut report = BatchReport::default();
    for item in items {
        report.attempted += 1;
        if let Err(error) = op(&item) {
            if options.stop_on_first_error {
                return Err(error);
            }
            report.failures.push(BatchFailure {
                key: key_of(&item),
                error,
            });
        }
    }
    Ok(report)
}
