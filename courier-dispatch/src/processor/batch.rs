use std::{error::Error, fmt};

use courier_common::model::QueueRecord;
use tracing::{info, warn};

use super::{MessageProcessor, Outcome, RecordReport};
use crate::{Cancellation, error::DispatchError, policy::BatchMode};

/// Per-record outcomes of one batch, in record order.
#[derive(Debug, Default)]
pub struct BatchReport {
    records: Vec<RecordReport>,
}

impl BatchReport {
    pub const fn new(records: Vec<RecordReport>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RecordReport] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RecordReport> {
        self.records
    }

    pub const fn len(&self) -> usize {
        self.records.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records that were acked or released
    pub fn successes(&self) -> usize {
        self.count(Outcome::is_success)
    }

    pub fn failures(&self) -> usize {
        self.count(|outcome| !outcome.is_success() && !matches!(outcome, Outcome::Skipped))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Skipped))
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.records
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

/// A fail-fast batch stopped at a record that was neither acked nor
/// released. The records after it were skipped.
#[derive(Debug)]
pub struct BatchAborted {
    index: usize,
    report: BatchReport,
}

impl BatchAborted {
    pub fn message_id(&self) -> &str {
        &self.report.records[self.index].message_id
    }

    /// The failing record's error
    pub fn error(&self) -> Option<&DispatchError> {
        self.report.records[self.index].outcome.error()
    }

    pub const fn report(&self) -> &BatchReport {
        &self.report
    }

    pub fn into_report(self) -> BatchReport {
        self.report
    }
}

impl fmt::Display for BatchAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error() {
            Some(error) => write!(
                f,
                "Batch aborted at record {}: {error}",
                self.message_id()
            ),
            None => write!(f, "Batch aborted at record {}", self.message_id()),
        }
    }
}

impl Error for BatchAborted {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.error().map(|error| error as &(dyn Error + 'static))
    }
}

impl MessageProcessor {
    /// Process `records` one after another.
    ///
    /// In [`BatchMode::FailFast`] the first record that is neither acked nor
    /// released stops the batch and is returned as [`BatchAborted`]. In
    /// [`BatchMode::BestEffort`] every record is attempted and the report is
    /// always returned. Once `cancel` fires, remaining records are skipped.
    ///
    /// # Errors
    /// [`BatchAborted`] in fail-fast mode, see above.
    pub async fn process_batch(
        &self,
        records: &[QueueRecord],
        cancel: &Cancellation,
    ) -> Result<BatchReport, BatchAborted> {
        let mut reports = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            if self.config.batch_mode == BatchMode::BestEffort && cancel.is_cancelled() {
                warn!(
                    remaining = records.len() - index,
                    "Batch cancelled, skipping remaining records"
                );
                reports.extend(
                    records[index..]
                        .iter()
                        .map(|record| RecordReport::skipped(&record.message_id)),
                );
                break;
            }

            let report = self.process_record(record, cancel).await;
            let failed = !report.outcome.is_success();
            reports.push(report);

            if failed && self.config.batch_mode == BatchMode::FailFast {
                reports.extend(
                    records[index + 1..]
                        .iter()
                        .map(|record| RecordReport::skipped(&record.message_id)),
                );

                let aborted = BatchAborted {
                    index,
                    report: BatchReport::new(reports),
                };
                warn!(
                    message_id = aborted.message_id(),
                    skipped = aborted.report.skipped(),
                    "Batch aborted"
                );
                return Err(aborted);
            }
        }

        let report = BatchReport::new(reports);
        info!(
            records = report.len(),
            successes = report.successes(),
            failures = report.failures(),
            skipped = report.skipped(),
            "Batch processed"
        );
        Ok(report)
    }
}
