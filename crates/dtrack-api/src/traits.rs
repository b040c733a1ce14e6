//! The remote operations the reconciler needs from Dependency-Track.
//!
//! Kept as a trait so the reconciliation engine can run against an
//! in-memory double in tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{NewProject, OidcGroup, Project, ProjectUpdate, Team};

/// Typed access to the Dependency-Track administration API.
///
/// Every entity is addressed by its server-assigned UUID. Name lookups are
/// the caller's concern.
#[async_trait]
pub trait DependencyTrackApi: Send + Sync {
    // ── OIDC groups ───────────────────────────────────────────────────

    /// List all OIDC groups.
    async fn list_oidc_groups(&self) -> ApiResult<Vec<OidcGroup>>;

    /// Create an OIDC group.
    async fn create_oidc_group(&self, name: &str) -> ApiResult<OidcGroup>;

    /// Delete an OIDC group.
    async fn delete_oidc_group(&self, group: Uuid) -> ApiResult<()>;

    // ── Teams ─────────────────────────────────────────────────────────

    /// List all teams, including their permissions and OIDC mappings.
    async fn list_teams(&self) -> ApiResult<Vec<Team>>;

    /// Create an empty team.
    async fn create_team(&self, name: &str) -> ApiResult<Team>;

    /// Delete a team.
    async fn delete_team(&self, team: Uuid) -> ApiResult<()>;

    /// Grant a permission to a team.
    async fn add_permission(&self, team: Uuid, permission: &str) -> ApiResult<()>;

    /// Revoke a permission from a team.
    async fn remove_permission(&self, team: Uuid, permission: &str) -> ApiResult<()>;

    /// Map an OIDC group to a team.
    async fn link_oidc_group(&self, team: Uuid, group: Uuid) -> ApiResult<()>;

    /// Remove an OIDC group mapping from a team.
    async fn unlink_oidc_group(&self, team: Uuid, group: Uuid) -> ApiResult<()>;

    // ── Projects ──────────────────────────────────────────────────────

    /// List all projects.
    async fn list_projects(&self) -> ApiResult<Vec<Project>>;

    /// Create a project.
    async fn create_project(&self, project: &NewProject) -> ApiResult<Project>;

    /// Replace a project's mutable attributes.
    async fn update_project(&self, update: &ProjectUpdate) -> ApiResult<Project>;

    /// Delete a project.
    async fn delete_project(&self, project: Uuid) -> ApiResult<()>;

    // ── Portfolio access control ──────────────────────────────────────

    /// Projects a team has been granted access to.
    async fn get_team_acl(&self, team: Uuid) -> ApiResult<Vec<Project>>;

    /// Grant a team access to a project.
    async fn add_acl_mapping(&self, team: Uuid, project: Uuid) -> ApiResult<()>;

    /// Revoke a team's access to a project.
    async fn remove_acl_mapping(&self, team: Uuid, project: Uuid) -> ApiResult<()>;

    /// Whether portfolio access control is switched on server-wide.
    async fn acl_enabled(&self) -> ApiResult<bool>;

    /// Switch portfolio access control on server-wide.
    async fn enable_acl(&self) -> ApiResult<()>;
}
