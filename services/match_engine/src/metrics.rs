use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use crate::error::EngineError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineMetrics {
    pub total_commands: u64,
    pub successful_commands: u64,
    pub failed_commands: u64,
    pub validation_failures: u64,
    pub not_found_failures: u64,
    pub conflict_failures: u64,
    pub store_failures: u64,
    pub conflict_retries: u64,
    /// Requests turned away before reaching a command.
    pub forbidden_requests: u64,
    pub avg_command_time_ms: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<EngineMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means a panic elsewhere mid-update; counters stay usable.
    fn lock(&self) -> MutexGuard<'_, EngineMetrics> {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_command_start(&self) -> CommandTracker {
        CommandTracker {
            start_time: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_conflict_retry(&self) {
        self.lock().conflict_retries += 1;
    }

    pub fn record_forbidden(&self) {
        self.lock().forbidden_requests += 1;
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        self.lock().clone()
    }
}

pub struct CommandTracker {
    start_time: Instant,
    collector: MetricsCollector,
}

impl CommandTracker {
    pub fn finish<T>(self, outcome: &Result<T, EngineError>) {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut metrics = self.collector.lock();

        metrics.total_commands += 1;
        metrics.avg_command_time_ms += (elapsed_ms - metrics.avg_command_time_ms)
            / metrics.total_commands as f64;

        match outcome {
            Ok(_) => metrics.successful_commands += 1,
            Err(err) => {
                metrics.failed_commands += 1;
                match err {
                    EngineError::Validation { .. } => metrics.validation_failures += 1,
                    EngineError::NotFound(_) => metrics.not_found_failures += 1,
                    EngineError::Conflict(_) => metrics.conflict_failures += 1,
                    EngineError::Store(_) => metrics.store_failures += 1,
                    EngineError::Forbidden(_) => metrics.forbidden_requests += 1,
                }
                metrics.last_error = Some(err.to_string());
                metrics.last_error_time = Some(Utc::now());
            }
        }
    }
}
