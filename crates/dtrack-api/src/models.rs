//! Wire models for the Dependency-Track REST API (`/api/v1`).
//!
//! Only the fields the reconciler reads or writes are modelled; everything
//! else in the server's JSON is ignored on deserialization.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Config property group that holds the portfolio ACL switch.
pub const ACL_PROPERTY_GROUP: &str = "access-management";

/// Config property name of the portfolio ACL switch.
pub const ACL_PROPERTY_NAME: &str = "acl.enabled";

/// An OIDC group as returned by `GET /api/v1/oidc/group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcGroup {
    pub uuid: Uuid,
    pub name: String,
}

/// A permission attached to a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A team-to-OIDC-group mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedOidcGroup {
    /// Identifier of the mapping itself.
    pub uuid: Uuid,
    pub group: OidcGroup,
}

/// A team as returned by `GET /api/v1/team`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<PermissionRef>,
    #[serde(default)]
    pub mapped_oidc_groups: Vec<MappedOidcGroup>,
}

/// Reference to a project by UUID (used for `parent`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ProjectRef {
    /// Reference a project by UUID only.
    #[must_use]
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid, name: None }
    }
}

/// A project as returned by `GET /api/v1/project`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub classifier: Option<String>,
    #[serde(default)]
    pub parent: Option<ProjectRef>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Body of `PUT /api/v1/oidc/group`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOidcGroupRequest {
    pub name: String,
}

/// Body of `PUT /api/v1/team`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateTeamRequest {
    pub name: String,
}

/// Body of `DELETE /api/v1/team`.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteTeamRequest {
    pub uuid: Uuid,
}

/// Body of `PUT /api/v1/oidc/mapping`.
#[derive(Debug, Clone, Serialize)]
pub struct OidcMappingRequest {
    pub team: Uuid,
    pub group: Uuid,
}

/// Body of `PUT /api/v1/acl/mapping`.
#[derive(Debug, Clone, Serialize)]
pub struct AclMappingRequest {
    pub team: Uuid,
    pub project: Uuid,
}

/// Attributes for a new project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub classifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ProjectRef>,
    pub active: bool,
}

/// Full replacement body of `POST /api/v1/project`.
///
/// `parent` is always serialized so that `null` detaches the project from
/// its previous parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectUpdate {
    pub uuid: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub parent: Option<ProjectRef>,
    pub active: bool,
}

/// A server configuration property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigProperty {
    pub group_name: String,
    pub property_name: String,
    #[serde(default)]
    pub property_value: Option<String>,
}

impl ConfigProperty {
    /// Whether this is the portfolio ACL switch.
    #[must_use]
    pub fn is_acl_switch(&self) -> bool {
        self.group_name == ACL_PROPERTY_GROUP && self.property_name == ACL_PROPERTY_NAME
    }

    /// Interpret the value as a boolean flag.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.property_value
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}
