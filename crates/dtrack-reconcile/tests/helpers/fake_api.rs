//! In-memory Dependency-Track used by the reconciler integration tests.
//!
//! Keeps groups, teams, projects and grants in memory, logs every call,
//! and can be told to fail specific calls.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use dtrack_api::{
    ApiError, ApiResult, DependencyTrackApi, MappedOidcGroup, NewProject, OidcGroup,
    PermissionRef, Project, ProjectRef, ProjectUpdate, Team,
};

#[derive(Debug, Clone)]
struct FakeTeam {
    uuid: Uuid,
    name: String,
    permissions: BTreeSet<String>,
    groups: BTreeSet<Uuid>,
}

#[derive(Debug, Default)]
struct Inner {
    groups: Vec<OidcGroup>,
    teams: Vec<FakeTeam>,
    projects: Vec<Project>,
    acl: HashMap<Uuid, BTreeSet<Uuid>>,
    acl_enabled: bool,
    /// Projects whose ACL additions are acknowledged but not stored.
    ignored_grants: BTreeSet<String>,
    calls: Vec<String>,
    failures: HashMap<String, ApiError>,
}

impl Inner {
    fn log(&mut self, call: String) -> ApiResult<()> {
        let failure = self.failures.get(&call).cloned();
        self.calls.push(call);
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn group_name(&self, id: Uuid) -> String {
        self.groups
            .iter()
            .find(|g| g.uuid == id)
            .map(|g| g.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn team_name(&self, id: Uuid) -> String {
        self.teams
            .iter()
            .find(|t| t.uuid == id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn project_name(&self, id: Uuid) -> String {
        self.projects
            .iter()
            .find(|p| p.uuid == id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Whether `candidate` is `project` or sits somewhere below it.
    fn is_within(&self, candidate: Uuid, project: Uuid) -> bool {
        let mut current = Some(candidate);
        let mut steps = 0;
        while let Some(id) = current {
            if id == project {
                return true;
            }
            steps += 1;
            if steps > self.projects.len() {
                return false;
            }
            current = self
                .projects
                .iter()
                .find(|p| p.uuid == id)
                .and_then(|p| p.parent.as_ref())
                .map(|parent| parent.uuid);
        }
        false
    }

    fn team_mut(&mut self, id: Uuid) -> ApiResult<&mut FakeTeam> {
        self.teams
            .iter_mut()
            .find(|t| t.uuid == id)
            .ok_or_else(|| ApiError::NotFound(format!("team {id}")))
    }
}

/// A fake server.
#[derive(Debug, Default)]
pub struct FakeDependencyTrack {
    inner: Mutex<Inner>,
}

impl FakeDependencyTrack {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ───────────────────────────────────────────────────────

    pub fn with_group(self, name: &str) -> Self {
        self.inner.lock().unwrap().groups.push(OidcGroup {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_team(self, name: &str, permissions: &[&str], groups: &[&str]) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let groups = groups
                .iter()
                .map(|g| {
                    inner
                        .groups
                        .iter()
                        .find(|existing| existing.name == *g)
                        .map(|existing| existing.uuid)
                        .expect("seed the group first")
                })
                .collect();
            inner.teams.push(FakeTeam {
                uuid: Uuid::new_v4(),
                name: name.to_string(),
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
                groups,
            });
        }
        self
    }

    pub fn with_project(self, name: &str, classifier: &str, parent: Option<&str>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let parent = parent.map(|p| {
                let id = inner
                    .projects
                    .iter()
                    .find(|existing| existing.name == p)
                    .map(|existing| existing.uuid)
                    .expect("seed the parent first");
                ProjectRef::new(id)
            });
            inner.projects.push(Project {
                uuid: Uuid::new_v4(),
                name: name.to_string(),
                version: None,
                classifier: Some(classifier.to_string()),
                parent,
                active: true,
            });
        }
        self
    }

    pub fn with_grant(self, team: &str, project: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let team_id = inner.teams.iter().find(|t| t.name == team).unwrap().uuid;
            let project_id = inner.projects.iter().find(|p| p.name == project).unwrap().uuid;
            inner.acl.entry(team_id).or_default().insert(project_id);
        }
        self
    }

    pub fn with_acl_enabled(self, enabled: bool) -> Self {
        self.inner.lock().unwrap().acl_enabled = enabled;
        self
    }

    /// Add a team behind the reconciler's back, as a concurrent writer would.
    pub fn insert_team(&self, name: &str) {
        self.inner.lock().unwrap().teams.push(FakeTeam {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            permissions: BTreeSet::new(),
            groups: BTreeSet::new(),
        });
    }

    /// Make the call logged as `call` fail with `error`.
    pub fn fail_on(&self, call: &str, error: ApiError) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(call.to_string(), error);
    }

    /// Acknowledge ACL additions for `project` without storing them.
    pub fn ignore_grants_to(&self, project: &str) {
        self.inner
            .lock()
            .unwrap()
            .ignored_grants
            .insert(project.to_string());
    }

    // ── Inspection ────────────────────────────────────────────────────

    /// Every call, in the order received.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Calls that mutate state.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("list_") && !c.starts_with("get_") && c != "acl_enabled")
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Position of a call in the log.
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn group_names(&self) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        inner.groups.iter().map(|g| g.name.clone()).collect()
    }

    pub fn team_names(&self) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        inner.teams.iter().map(|t| t.name.clone()).collect()
    }

    pub fn team_permissions(&self, team: &str) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .teams
            .iter()
            .find(|t| t.name == team)
            .map(|t| t.permissions.clone())
            .unwrap_or_default()
    }

    pub fn team_groups(&self, team: &str) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        let Some(t) = inner.teams.iter().find(|t| t.name == team) else {
            return BTreeSet::new();
        };
        t.groups.iter().map(|g| inner.group_name(*g)).collect()
    }

    pub fn project_names(&self) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        inner.projects.iter().map(|p| p.name.clone()).collect()
    }

    /// Parent name of a project.
    pub fn project_parent(&self, project: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        let parent = inner
            .projects
            .iter()
            .find(|p| p.name == project)?
            .parent
            .as_ref()?
            .uuid;
        Some(inner.project_name(parent))
    }

    pub fn project_classifier(&self, project: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .projects
            .iter()
            .find(|p| p.name == project)
            .and_then(|p| p.classifier.clone())
    }

    pub fn team_acl(&self, team: &str) -> BTreeSet<String> {
        let inner = self.inner.lock().unwrap();
        let Some(t) = inner.teams.iter().find(|t| t.name == team) else {
            return BTreeSet::new();
        };
        inner
            .acl
            .get(&t.uuid)
            .map(|projects| projects.iter().map(|p| inner.project_name(*p)).collect())
            .unwrap_or_default()
    }

    pub fn acl_switch(&self) -> bool {
        self.inner.lock().unwrap().acl_enabled
    }
}

#[async_trait]
impl DependencyTrackApi for FakeDependencyTrack {
    async fn list_oidc_groups(&self) -> ApiResult<Vec<OidcGroup>> {
        let mut inner = self.inner.lock().unwrap();
        inner.log("list_oidc_groups".into())?;
        Ok(inner.groups.clone())
    }

    async fn create_oidc_group(&self, name: &str) -> ApiResult<OidcGroup> {
        let mut inner = self.inner.lock().unwrap();
        inner.log(format!("create_oidc_group {name}"))?;
        if inner.groups.iter().any(|g| g.name == name) {
            return Err(ApiError::Conflict(format!("group {name} exists")));
        }
        let group = OidcGroup {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
        };
        inner.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_oidc_group(&self, group: Uuid) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let name = inner.group_name(group);
        inner.log(format!("delete_oidc_group {name}"))?;
        let before = inner.groups.len();
        inner.groups.retain(|g| g.uuid != group);
        if inner.groups.len() == before {
            return Err(ApiError::NotFound(format!("group {group}")));
        }
        for team in &mut inner.teams {
            team.groups.remove(&group);
        }
        Ok(())
    }

    async fn list_teams(&self) -> ApiResult<Vec<Team>> {
        let mut inner = self.inner.lock().unwrap();
        inner.log("list_teams".into())?;
        let teams = inner
            .teams
            .iter()
            .map(|t| Team {
                uuid: t.uuid,
                name: t.name.clone(),
                permissions: t
                    .permissions
                    .iter()
                    .map(|p| PermissionRef {
                        name: p.clone(),
                        description: None,
                    })
                    .collect(),
                mapped_oidc_groups: t
                    .groups
                    .iter()
                    .map(|g| MappedOidcGroup {
                        uuid: Uuid::new_v4(),
                        group: OidcGroup {
                            uuid: *g,
                            name: inner.group_name(*g),
                        },
                    })
                    .collect(),
            })
            .collect();
        Ok(teams)
    }

    async fn create_team(&self, name: &str) -> ApiResult<Team> {
        let mut inner = self.inner.lock().unwrap();
        inner.log(format!("create_team {name}"))?;
        if inner.teams.iter().any(|t| t.name == name) {
            return Err(ApiError::Conflict(format!("team {name} exists")));
        }
        let team = FakeTeam {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            permissions: BTreeSet::new(),
            groups: BTreeSet::new(),
        };
        inner.teams.push(team.clone());
        Ok(Team {
            uuid: team.uuid,
            name: team.name,
            permissions: vec![],
            mapped_oidc_groups: vec![],
        })
    }

    async fn delete_team(&self, team: Uuid) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let name = inner.team_name(team);
        inner.log(format!("delete_team {name}"))?;
        let before = inner.teams.len();
        inner.teams.retain(|t| t.uuid != team);
        if inner.teams.len() == before {
            return Err(ApiError::NotFound(format!("team {team}")));
        }
        inner.acl.remove(&team);
        Ok(())
    }

    async fn add_permission(&self, team: Uuid, permission: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let name = inner.team_name(team);
        inner.log(format!("add_permission {name} {permission}"))?;
        inner.team_mut(team)?.permissions.insert(permission.to_string());
        Ok(())
    }

    async fn remove_permission(&self, team: Uuid, permission: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let name = inner.team_name(team);
        inner.log(format!("remove_permission {name} {permission}"))?;
        inner.team_mut(team)?.permissions.remove(permission);
        Ok(())
    }

    async fn link_oidc_group(&self, team: Uuid, group: Uuid) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let (team_name, group_name) = (inner.team_name(team), inner.group_name(group));
        inner.log(format!("link_oidc_group {team_name} {group_name}"))?;
        if !inner.groups.iter().any(|g| g.uuid == group) {
            return Err(ApiError::NotFound(format!("group {group}")));
        }
        inner.team_mut(team)?.groups.insert(group);
        Ok(())
    }

    async fn unlink_oidc_group(&self, team: Uuid, group: Uuid) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let (team_name, group_name) = (inner.team_name(team), inner.group_name(group));
        inner.log(format!("unlink_oidc_group {team_name} {group_name}"))?;
        if !inner.team_mut(team)?.groups.remove(&group) {
            return Err(ApiError::NotFound(format!("mapping {team}/{group}")));
        }
        Ok(())
    }

    async fn list_projects(&self) -> ApiResult<Vec<Project>> {
        let mut inner = self.inner.lock().unwrap();
        inner.log("list_projects".into())?;
        Ok(inner.projects.clone())
    }

    async fn create_project(&self, project: &NewProject) -> ApiResult<Project> {
        let mut inner = self.inner.lock().unwrap();
        inner.log(format!("create_project {}", project.name))?;
        if let Some(parent) = &project.parent {
            if !inner.projects.iter().any(|p| p.uuid == parent.uuid) {
                return Err(ApiError::NotFound(format!("parent {}", parent.uuid)));
            }
        }
        if inner
            .projects
            .iter()
            .any(|p| p.name == project.name && p.version == project.version)
        {
            return Err(ApiError::Conflict(format!("project {} exists", project.name)));
        }
        let created = Project {
            uuid: Uuid::new_v4(),
            name: project.name.clone(),
            version: project.version.clone(),
            classifier: Some(project.classifier.clone()),
            parent: project.parent.clone(),
            active: project.active,
        };
        inner.projects.push(created.clone());
        Ok(created)
    }

    async fn update_project(&self, update: &ProjectUpdate) -> ApiResult<Project> {
        let mut inner = self.inner.lock().unwrap();
        inner.log(format!("update_project {}", update.name))?;
        if let Some(parent) = &update.parent {
            if inner.is_within(parent.uuid, update.uuid) {
                return Err(ApiError::Conflict(format!(
                    "project {} cannot be its own ancestor",
                    update.name
                )));
            }
        }
        let project = inner
            .projects
            .iter_mut()
            .find(|p| p.uuid == update.uuid)
            .ok_or_else(|| ApiError::NotFound(format!("project {}", update.uuid)))?;
        if let Some(classifier) = &update.classifier {
            project.classifier = Some(classifier.clone());
        }
        project.parent = update.parent.clone();
        project.active = update.active;
        Ok(project.clone())
    }

    async fn delete_project(&self, project: Uuid) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let name = inner.project_name(project);
        inner.log(format!("delete_project {name}"))?;
        if inner
            .projects
            .iter()
            .any(|p| p.parent.as_ref().is_some_and(|parent| parent.uuid == project))
        {
            return Err(ApiError::Conflict(format!("project {name} has children")));
        }
        let before = inner.projects.len();
        inner.projects.retain(|p| p.uuid != project);
        if inner.projects.len() == before {
            return Err(ApiError::NotFound(format!("project {project}")));
        }
        for granted in inner.acl.values_mut() {
            granted.remove(&project);
        }
        Ok(())
    }

    async fn get_team_acl(&self, team: Uuid) -> ApiResult<Vec<Project>> {
        let mut inner = self.inner.lock().unwrap();
        let name = inner.team_name(team);
        inner.log(format!("get_team_acl {name}"))?;
        let granted = inner.acl.get(&team).cloned().unwrap_or_default();
        Ok(inner
            .projects
            .iter()
            .filter(|p| granted.contains(&p.uuid))
            .cloned()
            .collect())
    }

    async fn add_acl_mapping(&self, team: Uuid, project: Uuid) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let (team_name, project_name) = (inner.team_name(team), inner.project_name(project));
        inner.log(format!("add_acl_mapping {team_name} {project_name}"))?;
        if !inner.ignored_grants.contains(&project_name) {
            inner.acl.entry(team).or_default().insert(project);
        }
        Ok(())
    }

    async fn remove_acl_mapping(&self, team: Uuid, project: Uuid) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let (team_name, project_name) = (inner.team_name(team), inner.project_name(project));
        inner.log(format!("remove_acl_mapping {team_name} {project_name}"))?;
        let removed = inner
            .acl
            .get_mut(&team)
            .is_some_and(|granted| granted.remove(&project));
        if removed {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("mapping {team}/{project}")))
        }
    }

    async fn acl_enabled(&self) -> ApiResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.log("acl_enabled".into())?;
        Ok(inner.acl_enabled)
    }

    async fn enable_acl(&self) -> ApiResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.log("enable_acl".into())?;
        inner.acl_enabled = true;
        Ok(())
    }
}
