//! Planned operations and the ordered plan.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Classifier, EntityKind, Permission};

/// What an operation does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// A single attribute difference on an existing entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old_value: Option<String>, new_value: Option<String>) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value,
        }
    }
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.field,
            self.old_value.as_deref().unwrap_or("(none)"),
            self.new_value.as_deref().unwrap_or("(none)")
        )
    }
}

/// One API-level step of a plan. Entities are named; IDs are resolved when
/// the step runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    CreateOidcGroup {
        name: String,
    },
    DeleteOidcGroup {
        name: String,
    },
    CreateProject {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        classifier: Classifier,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
    },
    UpdateProject {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        classifier: Option<Classifier>,
        parent: Option<String>,
        changes: Vec<FieldChange>,
    },
    DeleteProject {
        name: String,
    },
    CreateTeam {
        name: String,
    },
    DeleteTeam {
        name: String,
    },
    AddPermission {
        team: String,
        permission: Permission,
    },
    RemovePermission {
        team: String,
        permission: Permission,
    },
    LinkOidcGroup {
        team: String,
        group: String,
    },
    UnlinkOidcGroup {
        team: String,
        group: String,
    },
    EnablePortfolioAccessControl,
    /// Converge a team's grant to `expected` by revoking then granting.
    ReplaceAccessGrant {
        team: String,
        grant: Vec<String>,
        revoke: Vec<String>,
        expected: Vec<String>,
        verify: bool,
    },
    /// Remove every grant from a team that is about to be deleted.
    RevokeAccessGrant {
        team: String,
        projects: Vec<String>,
    },
}

impl Operation {
    /// The entity kind this operation counts against.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Operation::CreateOidcGroup { .. } | Operation::DeleteOidcGroup { .. } => {
                EntityKind::OidcGroup
            }
            Operation::CreateProject { .. }
            | Operation::UpdateProject { .. }
            | Operation::DeleteProject { .. } => EntityKind::Project,
            Operation::CreateTeam { .. }
            | Operation::DeleteTeam { .. }
            | Operation::LinkOidcGroup { .. }
            | Operation::UnlinkOidcGroup { .. } => EntityKind::Team,
            Operation::AddPermission { .. } | Operation::RemovePermission { .. } => {
                EntityKind::Permission
            }
            Operation::EnablePortfolioAccessControl
            | Operation::ReplaceAccessGrant { .. }
            | Operation::RevokeAccessGrant { .. } => EntityKind::PortfolioAccessControl,
        }
    }

    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Operation::CreateOidcGroup { .. }
            | Operation::CreateProject { .. }
            | Operation::CreateTeam { .. }
            | Operation::AddPermission { .. } => Action::Create,
            Operation::UpdateProject { .. }
            | Operation::LinkOidcGroup { .. }
            | Operation::UnlinkOidcGroup { .. }
            | Operation::EnablePortfolioAccessControl
            | Operation::ReplaceAccessGrant { .. } => Action::Update,
            Operation::DeleteOidcGroup { .. }
            | Operation::DeleteProject { .. }
            | Operation::DeleteTeam { .. }
            | Operation::RemovePermission { .. }
            | Operation::RevokeAccessGrant { .. } => Action::Delete,
        }
    }

    /// Short snake_case name, used in error records.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Operation::CreateOidcGroup { .. } => "create_oidc_group",
            Operation::DeleteOidcGroup { .. } => "delete_oidc_group",
            Operation::CreateProject { .. } => "create_project",
            Operation::UpdateProject { .. } => "update_project",
            Operation::DeleteProject { .. } => "delete_project",
            Operation::CreateTeam { .. } => "create_team",
            Operation::DeleteTeam { .. } => "delete_team",
            Operation::AddPermission { .. } => "add_permission",
            Operation::RemovePermission { .. } => "remove_permission",
            Operation::LinkOidcGroup { .. } => "link_oidc_group",
            Operation::UnlinkOidcGroup { .. } => "unlink_oidc_group",
            Operation::EnablePortfolioAccessControl => "enable_portfolio_access_control",
            Operation::ReplaceAccessGrant { .. } => "replace_access_grant",
            Operation::RevokeAccessGrant { .. } => "revoke_access_grant",
        }
    }

    /// The entity the operation targets, e.g. `team 'Foobar'`.
    #[must_use]
    pub fn entity(&self) -> String {
        match self {
            Operation::CreateOidcGroup { name } | Operation::DeleteOidcGroup { name } => {
                format!("oidc group '{name}'")
            }
            Operation::CreateProject { name, .. }
            | Operation::UpdateProject { name, .. }
            | Operation::DeleteProject { name } => format!("project '{name}'"),
            Operation::CreateTeam { name } | Operation::DeleteTeam { name } => {
                format!("team '{name}'")
            }
            Operation::AddPermission { team, .. }
            | Operation::RemovePermission { team, .. }
            | Operation::LinkOidcGroup { team, .. }
            | Operation::UnlinkOidcGroup { team, .. }
            | Operation::ReplaceAccessGrant { team, .. }
            | Operation::RevokeAccessGrant { team, .. } => format!("team '{team}'"),
            Operation::EnablePortfolioAccessControl => "server configuration".to_string(),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::CreateOidcGroup { name } => write!(f, "create oidc group '{name}'"),
            Operation::DeleteOidcGroup { name } => write!(f, "delete oidc group '{name}'"),
            Operation::CreateProject {
                name,
                classifier,
                parent,
                ..
            } => {
                write!(f, "create project '{name}' ({classifier})")?;
                if let Some(parent) = parent {
                    write!(f, " under '{parent}'")?;
                }
                Ok(())
            }
            Operation::UpdateProject { name, changes, .. } => {
                let changes: Vec<String> = changes.iter().map(ToString::to_string).collect();
                write!(f, "update project '{name}' [{}]", changes.join("; "))
            }
            Operation::DeleteProject { name } => write!(f, "delete project '{name}'"),
            Operation::CreateTeam { name } => write!(f, "create team '{name}'"),
            Operation::DeleteTeam { name } => write!(f, "delete team '{name}'"),
            Operation::AddPermission { team, permission } => {
                write!(f, "add permission {permission} to team '{team}'")
            }
            Operation::RemovePermission { team, permission } => {
                write!(f, "remove permission {permission} from team '{team}'")
            }
            Operation::LinkOidcGroup { team, group } => {
                write!(f, "map oidc group '{group}' to team '{team}'")
            }
            Operation::UnlinkOidcGroup { team, group } => {
                write!(f, "unmap oidc group '{group}' from team '{team}'")
            }
            Operation::EnablePortfolioAccessControl => {
                write!(f, "enable portfolio access control")
            }
            Operation::ReplaceAccessGrant {
                team,
                grant,
                revoke,
                ..
            } => {
                write!(f, "set portfolio access for team '{team}'")?;
                if !grant.is_empty() {
                    write!(f, " +[{}]", grant.join(", "))?;
                }
                if !revoke.is_empty() {
                    write!(f, " -[{}]", revoke.join(", "))?;
                }
                Ok(())
            }
            Operation::RevokeAccessGrant { team, projects } => write!(
                f,
                "revoke portfolio access of team '{team}' to [{}]",
                projects.join(", ")
            ),
        }
    }
}

/// An operation together with the operations it must wait for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedOp {
    pub index: usize,
    pub operation: Operation,
    /// Indices of earlier operations that must succeed first.
    pub depends_on: Vec<usize>,
}

/// A dependency-ordered list of operations.
///
/// Every operation's dependencies appear before it, so running the list
/// front to back is always valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    operations: Vec<PlannedOp>,
    /// Declared items that already match, by kind.
    unchanged: BTreeMap<EntityKind, u32>,
}

impl Plan {
    pub(crate) fn new(operations: Vec<PlannedOp>, unchanged: BTreeMap<EntityKind, u32>) -> Self {
        Self {
            operations,
            unchanged,
        }
    }

    #[must_use]
    pub fn operations(&self) -> &[PlannedOp] {
        &self.operations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of declared items of a kind that need no change.
    #[must_use]
    pub fn unchanged(&self, kind: EntityKind) -> u32 {
        self.unchanged.get(&kind).copied().unwrap_or(0)
    }

    /// Position of the first operation equal to `operation`.
    #[must_use]
    pub fn position(&self, operation: &Operation) -> Option<usize> {
        self.operations.iter().position(|op| &op.operation == operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_classification() {
        let op = Operation::LinkOidcGroup {
            team: "Foobar".into(),
            group: "Foobar".into(),
        };
        assert_eq!(op.kind(), EntityKind::Team);
        assert_eq!(op.action(), Action::Update);
        assert_eq!(op.entity(), "team 'Foobar'");
        assert_eq!(op.to_string(), "map oidc group 'Foobar' to team 'Foobar'");

        let op = Operation::AddPermission {
            team: "Foobar".into(),
            permission: Permission::BomUpload,
        };
        assert_eq!(op.kind(), EntityKind::Permission);
        assert_eq!(op.action(), Action::Create);
        assert_eq!(op.label(), "add_permission");
    }

    #[test]
    fn test_update_display_lists_changes() {
        let op = Operation::UpdateProject {
            name: "Lib".into(),
            classifier: Some(Classifier::Library),
            parent: None,
            changes: vec![FieldChange::new(
                "classifier",
                Some("APPLICATION".into()),
                Some("LIBRARY".into()),
            )],
        };
        assert_eq!(
            op.to_string(),
            "update project 'Lib' [classifier: APPLICATION -> LIBRARY]"
        );
    }

    #[test]
    fn test_operation_serializes_tagged() {
        let value = serde_json::to_value(Operation::CreateTeam {
            name: "Foobar".into(),
        })
        .unwrap();
        assert_eq!(value["type"], "create_team");
        assert_eq!(value["name"], "Foobar");
    }
}
