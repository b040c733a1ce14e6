//! Reconciler entry point: validate, read, diff, order, execute.

use std::sync::Arc;

use chrono::Utc;
use dtrack_api::DependencyTrackApi;
use tracing::{info, warn};

use crate::diff::DiffEngine;
use crate::error::ReconcileResult;
use crate::executor::{Execution, Executor, ExecutorConfig, DEFAULT_CONCURRENCY};
use crate::model::DesiredState;
use crate::order::Orderer;
use crate::plan::Plan;
use crate::report::RunReport;
use crate::resolver::EntityResolver;
use crate::snapshot::{ReadScope, RemoteSnapshot, RemoteStateReader};

/// Reconciler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Maximum operations in flight while applying.
    pub concurrency: usize,
    /// Compute and report the plan without mutating anything.
    pub dry_run: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }
}

/// Converges a Dependency-Track server towards a [`DesiredState`].
pub struct Reconciler {
    api: Arc<dyn DependencyTrackApi>,
    config: ReconcilerConfig,
}

impl Reconciler {
    #[must_use]
    pub fn new(api: Arc<dyn DependencyTrackApi>, config: ReconcilerConfig) -> Self {
        Self { api, config }
    }

    /// Validate the desired state, read remote state and compute the plan.
    ///
    /// Every plan-time check happens here; nothing is mutated.
    pub async fn plan(&self, desired: &DesiredState) -> ReconcileResult<(Plan, Arc<RemoteSnapshot>)> {
        desired.validate()?;

        let scope = ReadScope::for_desired(desired);
        let snapshot = RemoteStateReader::new(Arc::clone(&self.api))
            .fetch_all(&scope)
            .await?;

        let changes = DiffEngine::new(desired, &snapshot).diff()?;
        let plan = Orderer::order(&changes)?;

        info!(
            operations = plan.len(),
            items = desired.item_count(),
            "Computed plan"
        );
        Ok((plan, Arc::new(snapshot)))
    }

    /// Plan and, unless this is a dry run, apply.
    ///
    /// Plan-time failures are returned as errors. Failures while applying
    /// are carried in the report.
    pub async fn run(&self, desired: &DesiredState) -> ReconcileResult<RunReport> {
        let started_at = Utc::now();
        let (plan, snapshot) = self.plan(desired).await?;

        if self.config.dry_run {
            return Ok(RunReport::planned(&plan, started_at));
        }

        let execution = if plan.is_empty() {
            Execution::default()
        } else {
            let resolver = Arc::new(EntityResolver::new(snapshot));
            let executor = Executor::new(
                Arc::clone(&self.api),
                resolver,
                ExecutorConfig {
                    concurrency: self.config.concurrency,
                },
            );
            executor.execute(&plan).await
        };

        let report = RunReport::from_execution(&plan, &execution, started_at);
        if report.is_success() {
            info!(changed = report.changed, "Reconciliation finished");
        } else {
            warn!(errors = report.errors.len(), "Reconciliation finished with errors");
        }
        Ok(report)
    }
}
