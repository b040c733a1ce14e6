//! Diff engine: desired state against a remote snapshot.
//!
//! Produces per-kind create/update/delete sets plus the plan-time checks
//! that must pass before anything is mutated: every referenced name must
//! be available, the project forest must stay acyclic, no project may be
//! deleted out from under a surviving child, and verified grants must stay
//! inside their root project.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{ReconcileError, ReconcileResult};
use crate::graph;
use crate::model::{Classifier, DesiredState, EntityKind, Permission, State};
use crate::plan::FieldChange;
use crate::resolver::PlanResolver;
use crate::snapshot::RemoteSnapshot;

/// A project to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCreate {
    pub name: String,
    pub version: Option<String>,
    pub classifier: Classifier,
    pub parent: Option<String>,
}

/// An existing project whose attributes differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectChange {
    pub name: String,
    /// `None` keeps whatever the server has.
    pub classifier: Option<Classifier>,
    pub parent: Option<String>,
    /// Parent before the update.
    pub previous_parent: Option<String>,
    pub changes: Vec<FieldChange>,
}

/// An existing project to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDelete {
    pub name: String,
    pub parent: Option<String>,
}

/// Changes to a team's permissions, group mappings and grant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamChange {
    pub name: String,
    pub add_permissions: BTreeSet<Permission>,
    pub remove_permissions: BTreeSet<Permission>,
    pub link: BTreeSet<String>,
    pub unlink: BTreeSet<String>,
    pub grant: Option<GrantChange>,
}

impl TeamChange {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Whether nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add_permissions.is_empty()
            && self.remove_permissions.is_empty()
            && self.link.is_empty()
            && self.unlink.is_empty()
            && self.grant.is_none()
    }
}

/// Replacement of a team's portfolio grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantChange {
    pub grant: BTreeSet<String>,
    pub revoke: BTreeSet<String>,
    /// The complete grant after the change.
    pub expected: BTreeSet<String>,
    pub verify: bool,
}

/// A team to delete, with the links and grants removed first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamDelete {
    pub name: String,
    pub unlink: BTreeSet<String>,
    pub revoke: BTreeSet<String>,
}

/// An OIDC group to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDelete {
    pub name: String,
    /// Surviving teams still mapped to the group.
    pub unlink_from: BTreeSet<String>,
}

/// Everything that differs between desired and remote state.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub groups_to_create: Vec<String>,
    pub groups_to_delete: Vec<GroupDelete>,
    pub projects_to_create: Vec<ProjectCreate>,
    pub projects_to_update: Vec<ProjectChange>,
    pub projects_to_delete: Vec<ProjectDelete>,
    pub teams_to_create: Vec<String>,
    pub teams_to_update: Vec<TeamChange>,
    pub teams_to_delete: Vec<TeamDelete>,
    /// Portfolio access control must be switched on before grants.
    pub enable_acl: bool,
    /// Parents-first order of the project forest after the run.
    pub project_order: Vec<String>,
    /// Project forest after the run (name to parent).
    pub project_parents: BTreeMap<String, Option<String>>,
    pub unchanged: BTreeMap<EntityKind, u32>,
}

impl ChangeSet {
    /// Whether remote state already matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups_to_create.is_empty()
            && self.groups_to_delete.is_empty()
            && self.projects_to_create.is_empty()
            && self.projects_to_update.is_empty()
            && self.projects_to_delete.is_empty()
            && self.teams_to_create.is_empty()
            && self.teams_to_update.is_empty()
            && self.teams_to_delete.is_empty()
            && !self.enable_acl
    }

    fn count_unchanged(&mut self, kind: EntityKind, n: u32) {
        if n > 0 {
            *self.unchanged.entry(kind).or_insert(0) += n;
        }
    }
}

/// Computes a [`ChangeSet`].
pub struct DiffEngine<'a> {
    desired: &'a DesiredState,
    snapshot: &'a RemoteSnapshot,
}

impl<'a> DiffEngine<'a> {
    #[must_use]
    pub fn new(desired: &'a DesiredState, snapshot: &'a RemoteSnapshot) -> Self {
        Self { desired, snapshot }
    }

    /// Diff every kind and run the plan-time checks.
    pub fn diff(&self) -> ReconcileResult<ChangeSet> {
        let mut changes = ChangeSet::default();
        let mut plan = PlanResolver::new(self.snapshot);

        self.diff_groups(&mut changes, &mut plan);
        let forest = self.diff_projects(&mut changes, &mut plan)?;
        self.diff_teams(&mut changes, &mut plan, &forest)?;
        self.unlink_deleted_groups(&mut changes);

        changes.enable_acl = !self.snapshot.acl_enabled()
            && changes
                .teams_to_update
                .iter()
                .any(|t| t.grant.as_ref().is_some_and(|g| !g.grant.is_empty()));

        debug!(
            groups_create = changes.groups_to_create.len(),
            groups_delete = changes.groups_to_delete.len(),
            projects_create = changes.projects_to_create.len(),
            projects_update = changes.projects_to_update.len(),
            projects_delete = changes.projects_to_delete.len(),
            teams_create = changes.teams_to_create.len(),
            teams_update = changes.teams_to_update.len(),
            teams_delete = changes.teams_to_delete.len(),
            enable_acl = changes.enable_acl,
            "Computed diff"
        );

        Ok(changes)
    }

    // ── OIDC groups ───────────────────────────────────────────────────

    fn diff_groups(&self, changes: &mut ChangeSet, plan: &mut PlanResolver<'_>) {
        for spec in &self.desired.oidc_groups {
            let name = spec.name.trim();
            let exists = self.snapshot.group(name).is_some();
            match (self.desired.effective(spec.state), exists) {
                (State::Present, false) => {
                    plan.will_create(EntityKind::OidcGroup, name);
                    changes.groups_to_create.push(name.to_string());
                }
                (State::Absent, true) => {
                    plan.will_delete(EntityKind::OidcGroup, name);
                    changes.groups_to_delete.push(GroupDelete {
                        name: name.to_string(),
                        unlink_from: BTreeSet::new(),
                    });
                }
                _ => changes.count_unchanged(EntityKind::OidcGroup, 1),
            }
        }
    }

    fn unlink_deleted_groups(&self, changes: &mut ChangeSet) {
        let deleted_teams: BTreeSet<&str> = changes
            .teams_to_delete
            .iter()
            .map(|t| t.name.as_str())
            .collect();

        for group in &mut changes.groups_to_delete {
            for team in self.snapshot.teams() {
                if !team.oidc_groups.contains_key(&group.name)
                    || deleted_teams.contains(team.name.as_str())
                {
                    continue;
                }
                let already_unlinked = changes
                    .teams_to_update
                    .iter()
                    .any(|t| t.name == team.name && t.unlink.contains(&group.name));
                if !already_unlinked {
                    group.unlink_from.insert(team.name.clone());
                }
            }
        }
    }

    // ── Projects ──────────────────────────────────────────────────────

    /// Returns the project forest after the run (name to parent).
    fn diff_projects(
        &self,
        changes: &mut ChangeSet,
        plan: &mut PlanResolver<'_>,
    ) -> ReconcileResult<BTreeMap<String, Option<String>>> {
        let mut present = Vec::new();

        for spec in &self.desired.projects {
            let name = spec.name.trim();
            let remote = self.snapshot.project(name);
            match (self.desired.effective(spec.state), remote) {
                (State::Absent, Some(remote)) => {
                    plan.will_delete(EntityKind::Project, name);
                    changes.projects_to_delete.push(ProjectDelete {
                        name: name.to_string(),
                        parent: remote.parent.clone(),
                    });
                }
                (State::Absent, None) => changes.count_unchanged(EntityKind::Project, 1),
                (State::Present, remote) => {
                    if remote.is_none() {
                        plan.will_create(EntityKind::Project, name);
                    }
                    present.push(spec);
                }
            }
        }

        // Forest after the run: surviving remote projects keep their parent,
        // declared projects take the declared one.
        let mut forest: BTreeMap<String, Option<String>> = self
            .snapshot
            .projects()
            .filter(|p| !plan.is_deleted(EntityKind::Project, &p.name))
            .map(|p| (p.name.clone(), p.parent.clone()))
            .collect();
        for spec in &present {
            forest.insert(
                spec.name.trim().to_string(),
                spec.parent_name().map(str::to_string),
            );
        }

        let mut deleted: Vec<&ProjectDelete> = changes.projects_to_delete.iter().collect();
        deleted.sort_by(|a, b| a.name.cmp(&b.name));
        for project in deleted {
            let children: Vec<String> = forest
                .iter()
                .filter(|(_, parent)| parent.as_deref() == Some(project.name.as_str()))
                .map(|(child, _)| child.clone())
                .collect();
            if !children.is_empty() {
                return Err(ReconcileError::DanglingChild {
                    project: project.name.clone(),
                    children,
                });
            }
        }

        for spec in &present {
            if let Some(parent) = spec.parent_name() {
                plan.require(EntityKind::Project, parent)?;
            }
        }

        changes.project_order = graph::parents_first(&forest)
            .map_err(|cycle| ReconcileError::CyclicParent { cycle })?;
        changes.project_parents = forest.clone();

        for spec in present {
            let name = spec.name.trim();
            let parent = spec.parent_name().map(str::to_string);

            let Some(remote) = self.snapshot.project(name) else {
                changes.projects_to_create.push(ProjectCreate {
                    name: name.to_string(),
                    version: spec.version.clone(),
                    classifier: spec.classifier.unwrap_or_default(),
                    parent,
                });
                continue;
            };

            let mut field_changes = Vec::new();
            if let Some(classifier) = spec.classifier {
                if remote.classifier.as_deref() != Some(classifier.as_str()) {
                    field_changes.push(FieldChange::new(
                        "classifier",
                        remote.classifier.clone(),
                        Some(classifier.as_str().to_string()),
                    ));
                }
            }

            let parent_matches = match (parent.as_deref(), remote.parent_id) {
                (None, None) => true,
                (Some(wanted), Some(current)) => {
                    !plan.is_created(EntityKind::Project, wanted)
                        && self.snapshot.id_of(EntityKind::Project, wanted) == Some(current)
                }
                _ => false,
            };
            if !parent_matches {
                field_changes.push(FieldChange::new(
                    "parent",
                    remote.parent.clone(),
                    parent.clone(),
                ));
            }

            if field_changes.is_empty() {
                changes.count_unchanged(EntityKind::Project, 1);
            } else {
                changes.projects_to_update.push(ProjectChange {
                    name: name.to_string(),
                    classifier: spec.classifier,
                    parent,
                    previous_parent: remote.parent.clone(),
                    changes: field_changes,
                });
            }
        }

        Ok(forest)
    }

    // ── Teams ─────────────────────────────────────────────────────────

    fn diff_teams(
        &self,
        changes: &mut ChangeSet,
        plan: &mut PlanResolver<'_>,
        forest: &BTreeMap<String, Option<String>>,
    ) -> ReconcileResult<()> {
        let mut present = Vec::new();

        for spec in &self.desired.teams {
            let name = spec.name.trim();
            let remote = self.snapshot.team(name);
            match (self.desired.effective(spec.state), remote) {
                (State::Absent, Some(remote)) => {
                    plan.will_delete(EntityKind::Team, name);
                    changes.teams_to_delete.push(TeamDelete {
                        name: name.to_string(),
                        unlink: remote.oidc_groups.keys().cloned().collect(),
                        revoke: self
                            .snapshot
                            .acl(name)
                            .map(|acl| acl.keys().cloned().collect())
                            .unwrap_or_default(),
                    });
                }
                (State::Absent, None) => changes.count_unchanged(EntityKind::Team, 1),
                (State::Present, remote) => {
                    if remote.is_none() {
                        plan.will_create(EntityKind::Team, name);
                        changes.teams_to_create.push(name.to_string());
                    }
                    present.push(spec);
                }
            }
        }

        for spec in present {
            let name = spec.name.trim();
            let remote = self.snapshot.team(name);
            let mut change = TeamChange::new(name);

            if let Some(wanted) = spec.parsed_permissions()? {
                let current = remote.map(|t| t.permissions.clone()).unwrap_or_default();
                change.add_permissions = wanted.difference(&current).copied().collect();
                change.remove_permissions = current.difference(&wanted).copied().collect();
                if let Some(remote) = remote.filter(|t| !t.other_permissions.is_empty()) {
                    debug!(
                        team = %name,
                        permissions = ?remote.other_permissions,
                        "Leaving unrecognised permissions untouched"
                    );
                }
                changes.count_unchanged(
                    EntityKind::Permission,
                    count(wanted.intersection(&current).count()),
                );
            }

            if let Some(wanted) = spec.oidc_group_set() {
                for group in &wanted {
                    plan.require(EntityKind::OidcGroup, group)?;
                }
                let current: BTreeSet<String> = remote
                    .map(|t| t.oidc_groups.keys().cloned().collect())
                    .unwrap_or_default();
                change.link = wanted.difference(&current).cloned().collect();
                change.unlink = current.difference(&wanted).cloned().collect();
            }

            if let Some(access) = &spec.portfolio_access_control {
                let wanted = access.project_set();
                for project in &wanted {
                    plan.require(EntityKind::Project, project)?;
                }
                if let Some(root) = access.verify_root() {
                    plan.require(EntityKind::Project, root)?;
                    verify_within_root(name, root, &wanted, forest)?;
                }

                let current: BTreeSet<String> = if remote.is_some() {
                    self.snapshot
                        .acl(name)
                        .map(|acl| acl.keys().cloned().collect())
                        .unwrap_or_default()
                } else {
                    BTreeSet::new()
                };
                let grant: BTreeSet<String> = wanted.difference(&current).cloned().collect();
                let revoke: BTreeSet<String> = current.difference(&wanted).cloned().collect();

                if grant.is_empty() && revoke.is_empty() {
                    changes.count_unchanged(EntityKind::PortfolioAccessControl, 1);
                } else {
                    change.grant = Some(GrantChange {
                        grant,
                        revoke,
                        expected: wanted,
                        verify: access.verify.enabled,
                    });
                }
            }

            if change.is_empty() {
                if remote.is_some() {
                    changes.count_unchanged(EntityKind::Team, 1);
                }
            } else {
                changes.teams_to_update.push(change);
            }
        }

        Ok(())
    }
}

/// Every granted project must be `root` or one of its descendants in the
/// project forest as it will be after the run.
fn verify_within_root(
    team: &str,
    root: &str,
    projects: &BTreeSet<String>,
    forest: &BTreeMap<String, Option<String>>,
) -> ReconcileResult<()> {
    let outside: Vec<&str> = projects
        .iter()
        .filter(|p| !is_within(p, root, forest))
        .map(String::as_str)
        .collect();

    if outside.is_empty() {
        Ok(())
    } else {
        Err(ReconcileError::VerificationFailed {
            team: team.to_string(),
            message: format!(
                "projects [{}] are not '{root}' or one of its descendants",
                outside.join(", ")
            ),
        })
    }
}

fn is_within(project: &str, root: &str, forest: &BTreeMap<String, Option<String>>) -> bool {
    let mut current = Some(project);
    let mut steps = 0;
    while let Some(name) = current {
        if name == root {
            return true;
        }
        steps += 1;
        if steps > forest.len() {
            return false;
        }
        current = forest.get(name).and_then(|p| p.as_deref());
    }
    false
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
