//! Batch runner for independent dumps.
//!
//! Items are processed in fixed-size batches, one scoped thread per item.
//! A failing or panicking item is recorded and the batch carries on. The
//! cancel flag is only looked at between batches.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{info, warn};

use crate::config::AnalyzerConfig;
use crate::joins::SourceText;
use crate::pipeline::{analyze_sql, AnalysisReport};

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub name: String,
    pub sql: String,
    pub sources: Vec<SourceText>,
}

impl BatchItem {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            sources: Vec::new(),
        }
    }
}

#[derive(Clone, Copy)]
pub struct BatchOptions<'a> {
    pub batch_size: usize,
    pub cancel: Option<&'a AtomicBool>,
}

impl Default for BatchOptions<'_> {
    fn default() -> Self {
        Self {
            batch_size: 10,
            cancel: None,
        }
    }
}

#[derive(Debug)]
pub enum BatchStatus {
    Done(Box<AnalysisReport>),
    Failed(String),
    /// Not started because cancellation was requested.
    Skipped,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub status: BatchStatus,
}

impl BatchOutcome {
    pub fn report(&self) -> Option<&AnalysisReport> {
        match &self.status {
            BatchStatus::Done(report) => Some(report),
            _ => None,
        }
    }
}

/// One outcome per item, in input order.
pub fn run_batch(items: &[BatchItem], config: &AnalyzerConfig, options: BatchOptions) -> Vec<BatchOutcome> {
    let batch_size = options.batch_size.max(1);
    let mut outcomes = Vec::with_capacity(items.len());

    for (index, chunk) in items.chunks(batch_size).enumerate() {
        if options.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            info!(batch = index, remaining = items.len() - outcomes.len(), "batch cancelled");
            outcomes.extend(items[outcomes.len()..].iter().map(|item| BatchOutcome {
                name: item.name.clone(),
                status: BatchStatus::Skipped,
            }));
            break;
        }

        info!(batch = index, size = chunk.len(), "processing batch");
        let statuses: Vec<BatchStatus> = thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|item| scope.spawn(move || analyze_sql(&item.sql, &item.sources, config)))
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(Ok(report)) => BatchStatus::Done(Box::new(report)),
                    Ok(Err(e)) => BatchStatus::Failed(e.to_string()),
                    Err(panic) => BatchStatus::Failed(panic_message(panic.as_ref())),
                })
                .collect()
        });

        for (item, status) in chunk.iter().zip(statuses) {
            if let BatchStatus::Failed(reason) = &status {
                warn!(item = %item.name, error = %reason, "analysis failed");
            }
            outcomes.push(BatchOutcome {
                name: item.name.clone(),
                status,
            });
        }
    }

    outcomes
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "CREATE TABLE `users` (`id` int NOT NULL, PRIMARY KEY (`id`));";
    const BAD: &str = "CREATE TABLE `users` (`id` int";

    #[test]
    fn test_failures_are_isolated() {
        let items = vec![
            BatchItem::new("a.sql", GOOD),
            BatchItem::new("b.sql", BAD),
            BatchItem::new("c.sql", GOOD),
        ];
        let outcomes = run_batch(
            &items,
            &AnalyzerConfig::default(),
            BatchOptions {
                batch_size: 2,
                cancel: None,
            },
        );

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1].name, "b.sql");
        assert!(outcomes[0].report().is_some());
        assert!(matches!(outcomes[1].status, BatchStatus::Failed(_)));
        assert!(outcomes[2].report().is_some());
    }

    #[test]
    fn test_cancel_before_first_batch() {
        let cancel = AtomicBool::new(true);
        let items = vec![BatchItem::new("a.sql", GOOD), BatchItem::new("b.sql", GOOD)];
        let outcomes = run_batch(
            &items,
            &AnalyzerConfig::default(),
            BatchOptions {
                batch_size: 1,
                cancel: Some(&cancel),
            },
        );

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o.status, BatchStatus::Skipped)));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "panicked: bang");
    }

    #[test]
    fn test_zero_batch_size_still_runs() {
        let items = vec![BatchItem::new("a.sql", GOOD)];
        let outcomes = run_batch(
            &items,
            &AnalyzerConfig::default(),
            BatchOptions {
                batch_size: 0,
                cancel: None,
            },
        );
        assert!(outcomes[0].report().is_some());
    }
}
