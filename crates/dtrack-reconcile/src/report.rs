//! Run reports: what a reconciliation planned, did, and where it failed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorKind, ReconcileError};
use crate::executor::{Execution, OpOutcome};
use crate::model::EntityKind;
use crate::plan::{Action, Plan};

/// Status of a single operation in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Computed but not applied (dry run).
    Planned,
    Changed,
    Unchanged,
    Failed,
    /// Not attempted because a dependency failed.
    Skipped,
}

/// Per-kind counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl KindCounts {
    fn record(&mut self, action: Action) {
        match action {
            Action::Create => self.created += 1,
            Action::Update => self.updated += 1,
            Action::Delete => self.deleted += 1,
        }
    }

    fn add(&mut self, other: &KindCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// Number of mutations counted.
    #[must_use]
    pub fn changes(&self) -> u32 {
        self.created + self.updated + self.deleted
    }
}

/// One operation as reported.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub index: usize,
    pub kind: EntityKind,
    pub action: Action,
    pub description: String,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An error as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    /// The failed operation, if the error happened while applying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl ErrorRecord {
    #[must_use]
    pub fn from_error(error: &ReconcileError, operation: Option<String>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            operation,
        }
    }
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// Whether any remote state was mutated (or, for a dry run, would be).
    pub changed: bool,
    pub counts: BTreeMap<EntityKind, KindCounts>,
    pub operations: Vec<OperationRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl RunReport {
    fn empty(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            dry_run,
            changed: false,
            counts: EntityKind::ALL
                .iter()
                .map(|kind| (*kind, KindCounts::default()))
                .collect(),
            operations: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn counts_mut(&mut self, kind: EntityKind) -> &mut KindCounts {
        self.counts.entry(kind).or_default()
    }

    fn record_unchanged(&mut self, plan: &Plan) {
        for kind in EntityKind::ALL {
            self.counts_mut(kind).unchanged += plan.unchanged(kind);
        }
    }

    /// Report a plan without applying it.
    #[must_use]
    pub fn planned(plan: &Plan, started_at: DateTime<Utc>) -> Self {
        let mut report = Self::empty(started_at, true);
        report.record_unchanged(plan);

        for op in plan.operations() {
            let kind = op.operation.kind();
            let action = op.operation.action();
            report.counts_mut(kind).record(action);
            report.operations.push(OperationRecord {
                index: op.index,
                kind,
                action,
                description: op.operation.to_string(),
                status: OperationStatus::Planned,
                depends_on: op.depends_on.clone(),
                error: None,
            });
        }
        report.changed = !plan.is_empty();
        report.finished_at = Utc::now();
        report
    }

    /// Report the outcome of applying a plan.
    #[must_use]
    pub fn from_execution(plan: &Plan, execution: &Execution, started_at: DateTime<Utc>) -> Self {
        let mut report = Self::empty(started_at, false);
        report.record_unchanged(plan);

        for (op, outcome) in plan.operations().iter().zip(&execution.outcomes) {
            let kind = op.operation.kind();
            let action = op.operation.action();
            let description = op.operation.to_string();
            let counts = report.counts_mut(kind);

            let (status, error) = match outcome {
                OpOutcome::Changed => {
                    counts.record(action);
                    report.changed = true;
                    (OperationStatus::Changed, None)
                }
                OpOutcome::Unchanged => {
                    counts.unchanged += 1;
                    (OperationStatus::Unchanged, None)
                }
                OpOutcome::Failed(e) => {
                    counts.failed += 1;
                    report
                        .errors
                        .push(ErrorRecord::from_error(e, Some(description.clone())));
                    (OperationStatus::Failed, Some(e.to_string()))
                }
                OpOutcome::Skipped { blocked_by } => {
                    counts.skipped += 1;
                    (
                        OperationStatus::Skipped,
                        Some(format!("dependency #{blocked_by} did not succeed")),
                    )
                }
            };

            report.operations.push(OperationRecord {
                index: op.index,
                kind,
                action,
                description,
                status,
                depends_on: op.depends_on.clone(),
                error,
            });
        }
        report.finished_at = Utc::now();
        report
    }

    /// Report a run that stopped before anything was applied.
    #[must_use]
    pub fn failed(error: &ReconcileError, started_at: DateTime<Utc>, dry_run: bool) -> Self {
        let mut report = Self::empty(started_at, dry_run);
        report.errors.push(ErrorRecord::from_error(error, None));
        report
    }

    /// True if every operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
            && self
                .operations
                .iter()
                .all(|op| op.status != OperationStatus::Skipped)
    }

    #[must_use]
    pub fn first_error(&self) -> Option<&ErrorRecord> {
        self.errors.first()
    }

    /// Counters summed over all kinds.
    #[must_use]
    pub fn totals(&self) -> KindCounts {
        let mut totals = KindCounts::default();
        for counts in self.counts.values() {
            totals.add(counts);
        }
        totals
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
