//! Remote state reader and the normalized snapshot it produces.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use dtrack_api::{DependencyTrackApi, OidcGroup, Project, Team};
use futures::future::try_join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::{DesiredState, EntityKind, Permission, State};

/// An OIDC group as seen on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteGroup {
    pub id: Uuid,
    pub name: String,
}

/// A team as seen on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTeam {
    pub id: Uuid,
    pub name: String,
    /// Permissions from the known vocabulary.
    pub permissions: BTreeSet<Permission>,
    /// Permissions the server reports that are outside the known vocabulary.
    /// These are never touched.
    pub other_permissions: BTreeSet<String>,
    /// Mapped OIDC groups by name.
    pub oidc_groups: BTreeMap<String, Uuid>,
}

/// A project as seen on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProject {
    pub id: Uuid,
    pub name: String,
    pub version: Option<String>,
    pub classifier: Option<String>,
    pub parent_id: Option<Uuid>,
    pub parent: Option<String>,
    pub active: bool,
}

/// Read-only, name-indexed view of remote state at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    groups: BTreeMap<String, RemoteGroup>,
    teams: BTreeMap<String, RemoteTeam>,
    projects: BTreeMap<String, RemoteProject>,
    names: HashMap<Uuid, String>,
    acls: BTreeMap<String, BTreeMap<String, Uuid>>,
    acl_enabled: bool,
}

impl RemoteSnapshot {
    /// Build a snapshot from raw API listings.
    ///
    /// When several projects share a name (different versions) the first
    /// one listed wins.
    #[must_use]
    pub fn from_parts(groups: Vec<OidcGroup>, teams: Vec<Team>, projects: Vec<Project>) -> Self {
        let mut snapshot = Self::default();

        for group in groups {
            snapshot.names.insert(group.uuid, group.name.clone());
            snapshot.groups.insert(
                group.name.clone(),
                RemoteGroup {
                    id: group.uuid,
                    name: group.name,
                },
            );
        }

        let mut kept: Vec<Project> = Vec::with_capacity(projects.len());
        for project in projects {
            if snapshot.projects.contains_key(&project.name) {
                warn!(
                    project = %project.name,
                    version = project.version.as_deref().unwrap_or(""),
                    "Duplicate project name, keeping the first version listed"
                );
                continue;
            }
            snapshot.names.insert(project.uuid, project.name.clone());
            snapshot.projects.insert(
                project.name.clone(),
                RemoteProject {
                    id: project.uuid,
                    name: project.name.clone(),
                    version: project.version.clone(),
                    classifier: project.classifier.clone(),
                    parent_id: None,
                    parent: None,
                    active: project.active,
                },
            );
            kept.push(project);
        }

        // Parents resolve by ID so renamed or duplicate-named parents stay exact.
        for project in kept {
            let Some(parent) = project.parent else {
                continue;
            };
            let parent_name = snapshot
                .names
                .get(&parent.uuid)
                .cloned()
                .or(parent.name);
            if let Some(entry) = snapshot.projects.get_mut(&project.name) {
                entry.parent_id = Some(parent.uuid);
                entry.parent = parent_name;
            }
        }

        for team in teams {
            let mut permissions = BTreeSet::new();
            let mut other_permissions = BTreeSet::new();
            for permission in team.permissions {
                match permission.name.parse::<Permission>() {
                    Ok(known) => {
                        permissions.insert(known);
                    }
                    Err(token) => {
                        other_permissions.insert(token);
                    }
                }
            }
            let oidc_groups = team
                .mapped_oidc_groups
                .into_iter()
                .map(|m| (m.group.name, m.group.uuid))
                .collect();

            snapshot.names.insert(team.uuid, team.name.clone());
            snapshot.teams.insert(
                team.name.clone(),
                RemoteTeam {
                    id: team.uuid,
                    name: team.name,
                    permissions,
                    other_permissions,
                    oidc_groups,
                },
            );
        }

        snapshot
    }

    /// Record the projects a team has been granted.
    #[must_use]
    pub fn with_acl(mut self, team: &str, projects: Vec<Project>) -> Self {
        self.set_acl(team, projects);
        self
    }

    /// Record whether portfolio access control is enabled.
    #[must_use]
    pub fn with_acl_enabled(mut self, enabled: bool) -> Self {
        self.acl_enabled = enabled;
        self
    }

    fn set_acl(&mut self, team: &str, projects: Vec<Project>) {
        let grants = projects.into_iter().map(|p| (p.name, p.uuid)).collect();
        self.acls.insert(team.to_string(), grants);
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&RemoteGroup> {
        self.groups.get(name)
    }

    #[must_use]
    pub fn team(&self, name: &str) -> Option<&RemoteTeam> {
        self.teams.get(name)
    }

    #[must_use]
    pub fn project(&self, name: &str) -> Option<&RemoteProject> {
        self.projects.get(name)
    }

    pub fn teams(&self) -> impl Iterator<Item = &RemoteTeam> {
        self.teams.values()
    }

    pub fn projects(&self) -> impl Iterator<Item = &RemoteProject> {
        self.projects.values()
    }

    /// Remote ID of a named entity.
    #[must_use]
    pub fn id_of(&self, kind: EntityKind, name: &str) -> Option<Uuid> {
        match kind {
            EntityKind::OidcGroup => self.groups.get(name).map(|g| g.id),
            EntityKind::Team => self.teams.get(name).map(|t| t.id),
            EntityKind::Project => self.projects.get(name).map(|p| p.id),
            EntityKind::Permission | EntityKind::PortfolioAccessControl => None,
        }
    }

    /// Projects granted to a team, by name, if the grant was read.
    #[must_use]
    pub fn acl(&self, team: &str) -> Option<&BTreeMap<String, Uuid>> {
        self.acls.get(team)
    }

    /// Whether portfolio access control is enabled server-wide.
    #[must_use]
    pub fn acl_enabled(&self) -> bool {
        self.acl_enabled
    }
}

/// What, beyond the entity listings, needs to be read for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadScope {
    /// Teams whose portfolio grants are read.
    pub acl_teams: BTreeSet<String>,
    /// Whether the `acl.enabled` switch is read.
    pub acl_setting: bool,
}

impl ReadScope {
    /// Everything a desired state needs.
    #[must_use]
    pub fn for_desired(desired: &DesiredState) -> Self {
        let acl_teams = desired
            .teams
            .iter()
            .map(|t| t.name.trim().to_string())
            .collect();
        let acl_setting = desired.teams.iter().any(|t| {
            desired.effective(t.state) == State::Present
                && t
                    .portfolio_access_control
                    .as_ref()
                    .is_some_and(|a| !a.projects.is_empty())
        });
        Self {
            acl_teams,
            acl_setting,
        }
    }
}

/// Fetches a [`RemoteSnapshot`] through the API.
pub struct RemoteStateReader {
    api: Arc<dyn DependencyTrackApi>,
}

impl RemoteStateReader {
    #[must_use]
    pub fn new(api: Arc<dyn DependencyTrackApi>) -> Self {
        Self { api }
    }

    /// Read all OIDC groups, teams and projects, plus the grants and the
    /// ACL switch named by `scope`.
    pub async fn fetch_all(&self, scope: &ReadScope) -> ReconcileResult<RemoteSnapshot> {
        let (groups, teams, projects) = futures::try_join!(
            self.api.list_oidc_groups(),
            self.api.list_teams(),
            self.api.list_projects(),
        )
        .map_err(ReconcileError::Transport)?;

        info!(
            oidc_groups = groups.len(),
            teams = teams.len(),
            projects = projects.len(),
            "Read remote state"
        );

        let mut snapshot = RemoteSnapshot::from_parts(groups, teams, projects);

        let acl_targets: Vec<(String, Uuid)> = scope
            .acl_teams
            .iter()
            .filter_map(|name| snapshot.team(name).map(|t| (name.clone(), t.id)))
            .collect();

        let grants = try_join_all(acl_targets.iter().map(|(name, id)| async move {
            let projects = self.api.get_team_acl(*id).await?;
            debug!(team = %name, granted = projects.len(), "Read portfolio grant");
            Ok::<_, dtrack_api::ApiError>((name.clone(), projects))
        }))
        .await
        .map_err(ReconcileError::Transport)?;

        for (team, projects) in grants {
            snapshot.set_acl(&team, projects);
        }

        if scope.acl_setting {
            let enabled = self
                .api
                .acl_enabled()
                .await
                .map_err(ReconcileError::Transport)?;
            snapshot.acl_enabled = enabled;
        }

        Ok(snapshot)
    }
}
