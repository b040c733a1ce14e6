//! Plan executor.
//!
//! Runs the operations of a [`Plan`] against the API. Independent
//! operations run concurrently up to a worker limit; an operation starts
//! only once every operation it depends on has succeeded. When an operation
//! fails, everything depending on it (transitively) is skipped while
//! unrelated branches carry on. Nothing is rolled back.

use std::collections::BTreeSet;
use std::sync::Arc;

use dtrack_api::{ApiError, DependencyTrackApi, NewProject, ProjectRef, ProjectUpdate};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::{Classifier, EntityKind};
use crate::plan::{Operation, Plan, PlannedOp};
use crate::resolver::EntityResolver;

/// Default number of operations in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Executor tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum operations in flight. `1` runs the plan strictly in order.
    pub concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// How a single operation ended.
#[derive(Debug, Clone)]
pub enum OpOutcome {
    /// The remote state was mutated.
    Changed,
    /// Nothing needed doing after all (adopted create, already-gone delete).
    Unchanged,
    Failed(ReconcileError),
    /// Not attempted because a dependency did not succeed.
    Skipped { blocked_by: usize },
}

impl OpOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, OpOutcome::Changed | OpOutcome::Unchanged)
    }
}

/// Outcomes of a plan run, indexed like the plan.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub outcomes: Vec<OpOutcome>,
}

impl Execution {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(OpOutcome::is_success)
    }

    /// Errors of failed operations, in plan order.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &ReconcileError)> {
        self.outcomes.iter().enumerate().filter_map(|(i, o)| match o {
            OpOutcome::Failed(e) => Some((i, e)),
            _ => None,
        })
    }
}

enum Readiness {
    Ready,
    Waiting,
    Blocked(usize),
}

/// Applies plans through a [`DependencyTrackApi`].
pub struct Executor {
    api: Arc<dyn DependencyTrackApi>,
    resolver: Arc<EntityResolver>,
    config: ExecutorConfig,
}

impl Executor {
    #[must_use]
    pub fn new(
        api: Arc<dyn DependencyTrackApi>,
        resolver: Arc<EntityResolver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            api,
            resolver,
            config,
        }
    }

    /// Run every operation of the plan and collect the outcomes.
    pub async fn execute(&self, plan: &Plan) -> Execution {
        let limit = self.config.concurrency.max(1);
        let mut outcomes: Vec<Option<OpOutcome>> = vec![None; plan.len()];
        let mut started = vec![false; plan.len()];
        let mut in_flight = FuturesUnordered::new();

        info!(operations = plan.len(), concurrency = limit, "Applying plan");

        loop {
            for op in plan.operations() {
                if in_flight.len() >= limit {
                    break;
                }
                if started[op.index] {
                    continue;
                }
                match readiness(op, &outcomes) {
                    Readiness::Ready => {
                        started[op.index] = true;
                        in_flight.push(self.run(op));
                    }
                    Readiness::Blocked(dep) => {
                        started[op.index] = true;
                        warn!(op = %op.operation, blocked_by = dep, "Skipping operation");
                        outcomes[op.index] = Some(OpOutcome::Skipped { blocked_by: dep });
                    }
                    Readiness::Waiting => {}
                }
            }

            match in_flight.next().await {
                Some((index, outcome)) => outcomes[index] = Some(outcome),
                None => break,
            }
        }

        Execution {
            outcomes: outcomes
                .into_iter()
                .enumerate()
                .map(|(i, o)| o.unwrap_or(OpOutcome::Skipped { blocked_by: i }))
                .collect(),
        }
    }

    async fn run(&self, op: &PlannedOp) -> (usize, OpOutcome) {
        debug!(index = op.index, op = %op.operation, "Starting operation");
        let outcome = match self.apply(&op.operation).await {
            Ok(outcome) => {
                info!(op = %op.operation, outcome = ?outcome, "Applied");
                outcome
            }
            Err(e) => {
                warn!(op = %op.operation, error = %e, "Operation failed");
                OpOutcome::Failed(e)
            }
        };
        (op.index, outcome)
    }

    async fn apply(&self, op: &Operation) -> ReconcileResult<OpOutcome> {
        let api_err = |cause: ApiError| ReconcileError::Api {
            operation: op.label().to_string(),
            entity: op.entity(),
            cause,
        };

        match op {
            Operation::CreateOidcGroup { name } => match self.api.create_oidc_group(name).await {
                Ok(group) => {
                    self.resolver
                        .record(EntityKind::OidcGroup, name, group.uuid)
                        .await;
                    Ok(OpOutcome::Changed)
                }
                Err(ApiError::Conflict(_)) => {
                    let groups = self.api.list_oidc_groups().await.map_err(api_err)?;
                    let found = groups.into_iter().find(|g| g.name == *name).map(|g| g.uuid);
                    self.adopt(EntityKind::OidcGroup, name, found).await
                }
                Err(e) => Err(api_err(e)),
            },

            Operation::DeleteOidcGroup { name } => {
                let id = self.resolver.resolve(EntityKind::OidcGroup, name).await?;
                gone_ok(self.api.delete_oidc_group(id).await).map_err(api_err)
            }

            Operation::CreateProject {
                name,
                version,
                classifier,
                parent,
            } => {
                let parent = self.parent_ref(parent.as_deref()).await?;
                let request = NewProject {
                    name: name.clone(),
                    version: version.clone(),
                    classifier: classifier.as_str().to_string(),
                    parent,
                    active: true,
                };
                match self.api.create_project(&request).await {
                    Ok(project) => {
                        self.resolver
                            .record(EntityKind::Project, name, project.uuid)
                            .await;
                        Ok(OpOutcome::Changed)
                    }
                    Err(ApiError::Conflict(_)) => {
                        let projects = self.api.list_projects().await.map_err(api_err)?;
                        let found = projects
                            .into_iter()
                            .find(|p| p.name == *name && p.version == *version)
                            .map(|p| p.uuid);
                        self.adopt(EntityKind::Project, name, found).await
                    }
                    Err(e) => Err(api_err(e)),
                }
            }

            Operation::UpdateProject {
                name,
                classifier,
                parent,
                ..
            } => {
                let update = self.project_update(name, *classifier, parent.as_deref()).await?;
                self.api.update_project(&update).await.map_err(api_err)?;
                Ok(OpOutcome::Changed)
            }

            Operation::DeleteProject { name } => {
                let id = self.resolver.resolve(EntityKind::Project, name).await?;
                gone_ok(self.api.delete_project(id).await).map_err(api_err)
            }

            Operation::CreateTeam { name } => match self.api.create_team(name).await {
                Ok(team) => {
                    self.resolver.record(EntityKind::Team, name, team.uuid).await;
                    Ok(OpOutcome::Changed)
                }
                Err(ApiError::Conflict(_)) => {
                    let teams = self.api.list_teams().await.map_err(api_err)?;
                    let found = teams.into_iter().find(|t| t.name == *name).map(|t| t.uuid);
                    self.adopt(EntityKind::Team, name, found).await
                }
                Err(e) => Err(api_err(e)),
            },

            Operation::DeleteTeam { name } => {
                let id = self.resolver.resolve(EntityKind::Team, name).await?;
                gone_ok(self.api.delete_team(id).await).map_err(api_err)
            }

            Operation::AddPermission { team, permission } => {
                let id = self.resolver.resolve(EntityKind::Team, team).await?;
                self.api
                    .add_permission(id, permission.as_str())
                    .await
                    .map_err(api_err)?;
                Ok(OpOutcome::Changed)
            }

            Operation::RemovePermission { team, permission } => {
                let id = self.resolver.resolve(EntityKind::Team, team).await?;
                gone_ok(self.api.remove_permission(id, permission.as_str()).await).map_err(api_err)
            }

            Operation::LinkOidcGroup { team, group } => {
                let team_id = self.resolver.resolve(EntityKind::Team, team).await?;
                let group_id = self.resolver.resolve(EntityKind::OidcGroup, group).await?;
                match self.api.link_oidc_group(team_id, group_id).await {
                    Ok(()) => Ok(OpOutcome::Changed),
                    Err(ApiError::Conflict(_)) => Ok(OpOutcome::Unchanged),
                    Err(e) => Err(api_err(e)),
                }
            }

            Operation::UnlinkOidcGroup { team, group } => {
                let team_id = self.resolver.resolve(EntityKind::Team, team).await?;
                let group_id = self.resolver.resolve(EntityKind::OidcGroup, group).await?;
                gone_ok(self.api.unlink_oidc_group(team_id, group_id).await).map_err(api_err)
            }

            Operation::EnablePortfolioAccessControl => {
                self.api.enable_acl().await.map_err(api_err)?;
                Ok(OpOutcome::Changed)
            }

            Operation::ReplaceAccessGrant {
                team,
                grant,
                revoke,
                expected,
                verify,
            } => {
                let team_id = self.resolver.resolve(EntityKind::Team, team).await?;
                self.revoke(team, team_id, revoke).await.map_err(api_err)?;
                for project in grant {
                    let project_id = self.resolver.resolve(EntityKind::Project, project).await?;
                    match self.api.add_acl_mapping(team_id, project_id).await {
                        Ok(()) | Err(ApiError::Conflict(_)) => {}
                        Err(e) => return Err(api_err(e)),
                    }
                }
                if *verify {
                    self.verify_grant(team, team_id, expected).await?;
                }
                Ok(OpOutcome::Changed)
            }

            Operation::RevokeAccessGrant { team, projects } => {
                let team_id = self.resolver.resolve(EntityKind::Team, team).await?;
                self.revoke(team, team_id, projects).await.map_err(api_err)?;
                Ok(OpOutcome::Changed)
            }
        }
    }

    async fn adopt(&self, kind: EntityKind, name: &str, found: Option<Uuid>) -> ReconcileResult<OpOutcome> {
        let id = found.ok_or_else(|| ReconcileError::UnresolvedReference {
            kind,
            name: name.to_string(),
        })?;
        info!(kind = %kind, name = %name, id = %id, "Adopted existing entity after conflict");
        self.resolver.record(kind, name, id).await;
        Ok(OpOutcome::Unchanged)
    }

    async fn parent_ref(&self, parent: Option<&str>) -> ReconcileResult<Option<ProjectRef>> {
        match parent {
            Some(name) => {
                let id = self.resolver.resolve(EntityKind::Project, name).await?;
                Ok(Some(ProjectRef::new(id)))
            }
            None => Ok(None),
        }
    }

    async fn project_update(
        &self,
        name: &str,
        classifier: Option<Classifier>,
        parent: Option<&str>,
    ) -> ReconcileResult<ProjectUpdate> {
        let current = self.resolver.snapshot().project(name).ok_or_else(|| {
            ReconcileError::UnresolvedReference {
                kind: EntityKind::Project,
                name: name.to_string(),
            }
        })?;
        Ok(ProjectUpdate {
            uuid: current.id,
            name: current.name.clone(),
            version: current.version.clone(),
            classifier: classifier
                .map(|c| c.as_str().to_string())
                .or_else(|| current.classifier.clone()),
            parent: self.parent_ref(parent).await?,
            active: current.active,
        })
    }

    /// Remove grants recorded in the snapshot. Projects already gone are fine.
    async fn revoke(&self, team: &str, team_id: Uuid, projects: &[String]) -> Result<(), ApiError> {
        let granted = self.resolver.snapshot().acl(team);
        for project in projects {
            let Some(project_id) = granted.and_then(|acl| acl.get(project)).copied() else {
                debug!(team = %team, project = %project, "No recorded grant to revoke");
                continue;
            };
            match self.api.remove_acl_mapping(team_id, project_id).await {
                Ok(()) | Err(ApiError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn verify_grant(&self, team: &str, team_id: Uuid, expected: &[String]) -> ReconcileResult<()> {
        let reported: BTreeSet<String> = self
            .api
            .get_team_acl(team_id)
            .await
            .map_err(|cause| ReconcileError::Api {
                operation: "verify_access_grant".to_string(),
                entity: format!("team '{team}'"),
                cause,
            })?
            .into_iter()
            .map(|p| p.name)
            .collect();
        let expected: BTreeSet<String> = expected.iter().cloned().collect();

        if reported == expected {
            debug!(team = %team, projects = reported.len(), "Verified portfolio grant");
            return Ok(());
        }
        Err(ReconcileError::VerificationFailed {
            team: team.to_string(),
            message: format!(
                "server reports access to [{}], expected [{}]",
                join(&reported),
                join(&expected)
            ),
        })
    }
}

fn readiness(op: &PlannedOp, outcomes: &[Option<OpOutcome>]) -> Readiness {
    let mut waiting = false;
    for dep in &op.depends_on {
        match outcomes.get(*dep).and_then(Option::as_ref) {
            Some(outcome) if outcome.is_success() => {}
            Some(_) => return Readiness::Blocked(*dep),
            None => waiting = true,
        }
    }
    if waiting {
        Readiness::Waiting
    } else {
        Readiness::Ready
    }
}

/// Deletes of something already gone count as unchanged.
fn gone_ok(result: Result<(), ApiError>) -> Result<OpOutcome, ApiError> {
    match result {
        Ok(()) => Ok(OpOutcome::Changed),
        Err(ApiError::NotFound(_)) => Ok(OpOutcome::Unchanged),
        Err(e) => Err(e),
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
