//! Running the conversation loop over many independent sources.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::confidence::{ConfidenceRouter, ReviewReason, Route};
use crate::config::{BatchConfig, EngineConfig};
use crate::conversation::{ConversationLoop, ReasoningService, RunResult};
use crate::error::EngineError;
use crate::few_shot::ExampleLibrary;
use crate::metrics::TokenUsage;
use crate::record::Biography;
use crate::service::{RetryingService, ThrottledService, Throttle};
use crate::source::SourceProvider;
use crate::store::{PersistOutcome, RecordStore};
use crate::tools::ToolRegistry;

/// Parses a newline-delimited list of source identifiers.
///
/// Blank lines and lines starting with `#` are skipped; identifiers are trimmed.
#[must_use]
pub fn parse_batch_input(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

/// Where one batch item ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Accepted output.
    Accepted {
        /// Store outcome, absent when persistence is off or failed.
        persisted: Option<PersistOutcome>,
    },
    /// Review queue.
    Review {
        /// Why.
        reason: ReviewReason,
    },
}

/// Result of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Position in the input list.
    pub index: usize,
    /// Identifier as given in the input list.
    pub identifier: String,
    /// Routing outcome.
    pub outcome: ItemOutcome,
    /// The run, absent when the source could not be fetched.
    pub run: Option<RunResult>,
}

impl BatchItemResult {
    /// Failure label for the summary, if the item failed before routing.
    fn failure_label(&self) -> Option<&'static str> {
        match (&self.outcome, &self.run) {
            (ItemOutcome::Review { reason: ReviewReason::SourceUnavailable { .. } }, _) => {
                Some("source_unavailable")
            }
            (_, Some(run)) => run.failure().map(|f| f.kind.as_str()),
            _ => None,
        }
    }
}

/// Per-tool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsage {
    /// Calls made.
    pub calls: usize,
    /// Calls that succeeded.
    pub successes: usize,
}

/// Aggregate counts over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items processed.
    pub total: usize,
    /// Items routed to accepted output.
    pub accepted: usize,
    /// Items routed to review, including failed ones.
    pub review: usize,
    /// Items whose run (or source fetch) failed.
    pub failed: usize,
    /// Failed items by failure kind.
    pub failures_by_kind: BTreeMap<String, usize>,
    /// Calls and successes per tool.
    pub tool_usage: BTreeMap<String, ToolUsage>,
    /// Service usage across all runs.
    pub usage: TokenUsage,
    /// Model turns across all runs.
    pub turns: usize,
    /// Wall time of the batch in milliseconds.
    pub elapsed_ms: u64,
}

impl BatchSummary {
    fn record(&mut self, item: &BatchItemResult) {
        self.total += 1;
        match item.outcome {
            ItemOutcome::Accepted { .. } => self.accepted += 1,
            ItemOutcome::Review { .. } => self.review += 1,
        }
        if let Some(label) = item.failure_label() {
            self.failed += 1;
            *self.failures_by_kind.entry(label.to_string()).or_default() += 1;
        }
        if let Some(run) = &item.run {
            self.usage += run.usage;
            self.turns += run.turns;
            for call in &run.trace {
                let usage = self.tool_usage.entry(call.tool_name.clone()).or_default();
                usage.calls += 1;
                usage.successes += usize::from(call.success);
            }
        }
    }
}

/// Every item result, in input order, plus the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Per-item results.
    pub items: Vec<BatchItemResult>,
    /// Aggregate counts.
    pub summary: BatchSummary,
}

type BatchService<S> = RetryingService<ThrottledService<S>>;

/// Runs one conversation per source, routes each result, and aggregates.
///
/// Items are isolated: a failing fetch, run or store write affects only its
/// own item. Calls to the reasoning service pass through one shared
/// [`Throttle`] whatever the concurrency.
pub struct BatchCoordinator<S, P> {
    run_loop: ConversationLoop<BatchService<S>>,
    sources: P,
    router: ConfidenceRouter,
    store: Option<Arc<dyn RecordStore>>,
    examples: Arc<ExampleLibrary>,
    few_shot_examples: usize,
    config: BatchConfig,
}

impl<S: ReasoningService, P: SourceProvider> BatchCoordinator<S, P> {
    /// Wraps `service` in the batch throttle and the configured retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine configuration is invalid.
    pub fn new(
        service: S,
        registry: Arc<ToolRegistry>,
        sources: P,
        engine: EngineConfig,
        config: BatchConfig,
    ) -> Result<Self, EngineError> {
        let throttle = Arc::new(Throttle::new(config.min_interval));
        let service = RetryingService::new(ThrottledService::new(service, throttle), engine.retry);
        let router = ConfidenceRouter::new(engine.acceptance_threshold);
        let few_shot_examples = engine.few_shot_examples;
        Ok(Self {
            run_loop: ConversationLoop::new(service, registry, engine)?,
            sources,
            router,
            store: None,
            examples: Arc::new(ExampleLibrary::new()),
            few_shot_examples,
            config,
        })
    }

    /// Persists accepted records to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Shares `examples` with other batches or runs.
    #[must_use]
    pub fn with_examples(mut self, examples: Arc<ExampleLibrary>) -> Self {
        self.examples = examples;
        self
    }

    /// Processes every identifier and returns the report.
    pub async fn run(&self, identifiers: &[String]) -> BatchReport {
        let start = Instant::now();
        let concurrency = self.config.concurrency.max(1);
        tracing::info!(
            event = "batch_started",
            items = identifiers.len(),
            concurrency,
            "Starting batch"
        );

        let items: Vec<BatchItemResult> = stream::iter(identifiers.iter().enumerate())
            .map(|(index, identifier)| self.process(index, identifier))
            .buffered(concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary::default();
        for item in &items {
            summary.record(item);
        }
        summary.elapsed_ms = duration_ms(start.elapsed());

        tracing::info!(
            event = "batch_finished",
            total = summary.total,
            accepted = summary.accepted,
            review = summary.review,
            failed = summary.failed,
            "Batch finished"
        );
        BatchReport { items, summary }
    }

    async fn process(&self, index: usize, identifier: &str) -> BatchItemResult {
        let document = match self.sources.fetch(identifier).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    event = "item_routed",
                    index,
                    identifier,
                    route = "review",
                    error = %e,
                    "Source unavailable"
                );
                return BatchItemResult {
                    index,
                    identifier: identifier.to_string(),
                    outcome: ItemOutcome::Review {
                        reason: ReviewReason::SourceUnavailable { message: e.to_string() },
                    },
                    run: None,
                };
            }
        };

        let snapshot = self.examples.snapshot(self.few_shot_examples).await;
        let run = self.run_loop.run(&document, &snapshot).await;

        let store = self.store.as_deref().filter(|_| self.config.persist_accepted);
        let outcome = settle_run(&self.router, store, &run).await;
        if let (ItemOutcome::Accepted { .. }, Some(record)) = (&outcome, run.record()) {
            self.examples.add(record).await;
        }

        match &outcome {
            ItemOutcome::Accepted { .. } => {
                tracing::info!(
                    event = "item_routed",
                    index,
                    identifier,
                    route = "accepted",
                    "Record accepted"
                );
            }
            ItemOutcome::Review { reason } => {
                tracing::info!(
                    event = "item_routed",
                    index,
                    identifier,
                    route = "review",
                    reason = %reason,
                    "Record needs review"
                );
            }
        }

        BatchItemResult {
            index,
            identifier: identifier.to_string(),
            outcome,
            run: Some(run),
        }
    }
}

/// Routes a finished run and, when accepted, writes its record to `store`.
///
/// A store failure is logged and leaves the record accepted with
/// `persisted: None`; it never moves the item to review.
pub async fn settle_run(
    router: &ConfidenceRouter,
    store: Option<&dyn RecordStore>,
    run: &RunResult,
) -> ItemOutcome {
    match router.route(run) {
        Route::Review(reason) => ItemOutcome::Review { reason },
        Route::Accepted => {
            let persisted = match (store, run.record()) {
                (Some(store), Some(record)) => persist_record(store, record).await,
                _ => None,
            };
            ItemOutcome::Accepted { persisted }
        }
    }
}

async fn persist_record(store: &dyn RecordStore, record: &Biography) -> Option<PersistOutcome> {
    match store.persist(record).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!(
                event = "persist_failed",
                name = %record.name,
                error = %e,
                "Record kept in accepted output only"
            );
            None
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::conversation::RunOutcome;
    use crate::error::StoreError;
    use crate::store::{MemoryRecordStore, StoredRecord};

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn lookup(&self, _name: &str) -> Result<Vec<StoredRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn persist(&self, _record: &Biography) -> Result<PersistOutcome, StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }
    }

    fn completed(confidence: f64) -> RunResult {
        RunResult {
            source_url: "https://www.news.cn/a.html".into(),
            outcome: RunOutcome::Completed {
                record: Biography {
                    confidence,
                    ..Biography::new("林炳尧", "https://www.news.cn/a.html")
                },
            },
            trace: Vec::new(),
            turns: 2,
            finalize_rejections: 0,
            usage: TokenUsage::default(),
            elapsed: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_settle_run_keeps_record_when_store_fails() {
        let router = ConfidenceRouter::new(0.65);
        let broken: &dyn RecordStore = &BrokenStore;
        let outcome = settle_run(&router, Some(broken), &completed(0.9)).await;
        assert_eq!(outcome, ItemOutcome::Accepted { persisted: None });
    }

    #[tokio::test]
    async fn test_settle_run_persists_only_accepted_records() {
        let router = ConfidenceRouter::new(0.65);
        let memory = MemoryRecordStore::new();
        let store: &dyn RecordStore = &memory;

        let outcome = settle_run(&router, Some(store), &completed(0.9)).await;
        assert_eq!(
            outcome,
            ItemOutcome::Accepted {
                persisted: Some(PersistOutcome::Stored("rec_1".into()))
            }
        );

        let outcome = settle_run(&router, Some(store), &completed(0.4)).await;
        assert!(matches!(outcome, ItemOutcome::Review { .. }));
        assert_eq!(memory.len().await, 1);

        let outcome = settle_run(&router, None, &completed(0.9)).await;
        assert_eq!(outcome, ItemOutcome::Accepted { persisted: None });
    }

    #[test]
    fn test_parse_batch_input() {
        let input =
            "\n# obituaries\nhttps://www.news.cn/a.html\n   \n  data/b.txt  \n  # skipped\n";
        assert_eq!(parse_batch_input(input), vec!["https://www.news.cn/a.html", "data/b.txt"]);
    }

    #[test]
    fn test_summary_counts_failures_under_review() {
        let mut summary = BatchSummary::default();
        summary.record(&BatchItemResult {
            index: 0,
            identifier: "missing.txt".into(),
            outcome: ItemOutcome::Review {
                reason: ReviewReason::SourceUnavailable { message: "not found".into() },
            },
            run: None,
        });
        assert_eq!(summary.total, 1);
        assert_eq!(summary.review, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures_by_kind.get("source_unavailable"), Some(&1));
    }
}
