//! Desired-state model.
//!
//! The desired state is parsed from YAML (or JSON) and validated once; it is
//! never mutated afterwards.
//!
//! ```yaml
//! state: present
//! oidc_groups:
//!   - Foobar
//!   - name: Legacy
//!     state: absent
//! projects:
//!   - name: Foobar
//!     classifier: APPLICATION
//!   - name: FoobarContainer
//!     classifier: CONTAINER
//!     parent: Foobar
//! teams:
//!   - name: Foobar
//!     permissions: [VIEW_PORTFOLIO]
//!     oidc_groups: [Foobar]
//!     portfolio_access_control:
//!       verify:
//!         enabled: true
//!         root_project: Foobar
//!       projects: [Foobar, FoobarContainer]
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, ReconcileResult};
use crate::graph;

/// The kinds of entity the reconciler manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    OidcGroup,
    Team,
    Project,
    Permission,
    PortfolioAccessControl,
}

impl EntityKind {
    /// All kinds, in reporting order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::OidcGroup,
        EntityKind::Project,
        EntityKind::Team,
        EntityKind::Permission,
        EntityKind::PortfolioAccessControl,
    ];
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::OidcGroup => write!(f, "oidc_group"),
            EntityKind::Team => write!(f, "team"),
            EntityKind::Project => write!(f, "project"),
            EntityKind::Permission => write!(f, "permission"),
            EntityKind::PortfolioAccessControl => write!(f, "portfolio_access_control"),
        }
    }
}

/// Whether an entity should exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Present,
    Absent,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Present => write!(f, "present"),
            State::Absent => write!(f, "absent"),
        }
    }
}

/// A team permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    AccessManagement,
    BomUpload,
    PolicyManagement,
    PolicyViolationAnalysis,
    PortfolioManagement,
    ProjectCreationUpload,
    SystemConfiguration,
    ViewPortfolio,
    ViewVulnerability,
    VulnerabilityAnalysis,
    VulnerabilityManagement,
    ViewPolicyViolation,
}

impl Permission {
    /// The full vocabulary.
    pub const ALL: [Permission; 12] = [
        Permission::AccessManagement,
        Permission::BomUpload,
        Permission::PolicyManagement,
        Permission::PolicyViolationAnalysis,
        Permission::PortfolioManagement,
        Permission::ProjectCreationUpload,
        Permission::SystemConfiguration,
        Permission::ViewPortfolio,
        Permission::ViewVulnerability,
        Permission::VulnerabilityAnalysis,
        Permission::VulnerabilityManagement,
        Permission::ViewPolicyViolation,
    ];

    /// The token used by the API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::AccessManagement => "ACCESS_MANAGEMENT",
            Permission::BomUpload => "BOM_UPLOAD",
            Permission::PolicyManagement => "POLICY_MANAGEMENT",
            Permission::PolicyViolationAnalysis => "POLICY_VIOLATION_ANALYSIS",
            Permission::PortfolioManagement => "PORTFOLIO_MANAGEMENT",
            Permission::ProjectCreationUpload => "PROJECT_CREATION_UPLOAD",
            Permission::SystemConfiguration => "SYSTEM_CONFIGURATION",
            Permission::ViewPortfolio => "VIEW_PORTFOLIO",
            Permission::ViewVulnerability => "VIEW_VULNERABILITY",
            Permission::VulnerabilityAnalysis => "VULNERABILITY_ANALYSIS",
            Permission::VulnerabilityManagement => "VULNERABILITY_MANAGEMENT",
            Permission::ViewPolicyViolation => "VIEW_POLICY_VIOLATION",
        }
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == token)
            .ok_or_else(|| token.to_string())
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classifier {
    #[default]
    Application,
    Framework,
    Library,
    Container,
    OperatingSystem,
    Device,
    Firmware,
    File,
    Platform,
    DeviceDriver,
    MachineLearningModel,
    Data,
}

impl Classifier {
    /// The token used by the API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Classifier::Application => "APPLICATION",
            Classifier::Framework => "FRAMEWORK",
            Classifier::Library => "LIBRARY",
            Classifier::Container => "CONTAINER",
            Classifier::OperatingSystem => "OPERATING_SYSTEM",
            Classifier::Device => "DEVICE",
            Classifier::Firmware => "FIRMWARE",
            Classifier::File => "FILE",
            Classifier::Platform => "PLATFORM",
            Classifier::DeviceDriver => "DEVICE_DRIVER",
            Classifier::MachineLearningModel => "MACHINE_LEARNING_MODEL",
            Classifier::Data => "DATA",
        }
    }
}

impl std::fmt::Display for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An OIDC group entry: either a bare name or `{name, state}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OidcGroupEntry")]
pub struct OidcGroupSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OidcGroupEntry {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        state: Option<State>,
    },
}

impl From<OidcGroupEntry> for OidcGroupSpec {
    fn from(entry: OidcGroupEntry) -> Self {
        match entry {
            OidcGroupEntry::Name(name) => Self { name, state: None },
            OidcGroupEntry::Full { name, state } => Self { name, state },
        }
    }
}

impl OidcGroupSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: None,
        }
    }
}

/// Verification rule for a portfolio grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, alias = "rootProject", skip_serializing_if = "Option::is_none")]
    pub root_project: Option<String>,
}

/// The set of projects a team may see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioAccessControlSpec {
    #[serde(default)]
    pub verify: VerifySpec,
    #[serde(default)]
    pub projects: Vec<String>,
}

impl PortfolioAccessControlSpec {
    /// Granted project names, deduplicated.
    #[must_use]
    pub fn project_set(&self) -> BTreeSet<String> {
        self.projects.iter().map(|p| p.trim().to_string()).collect()
    }

    /// Root project when verification is enabled.
    #[must_use]
    pub fn verify_root(&self) -> Option<&str> {
        if self.verify.enabled {
            self.verify.root_project.as_deref().map(str::trim)
        } else {
            None
        }
    }
}

/// A team and the attributes it should have.
///
/// `None` attributes are left alone; a declared attribute, even an empty
/// list, is converged exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, alias = "oidcGroups", skip_serializing_if = "Option::is_none")]
    pub oidc_groups: Option<Vec<String>>,
    #[serde(
        default,
        alias = "portfolioAccessControl",
        skip_serializing_if = "Option::is_none"
    )]
    pub portfolio_access_control: Option<PortfolioAccessControlSpec>,
}

impl TeamSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse declared permissions against the vocabulary.
    pub fn parsed_permissions(&self) -> ReconcileResult<Option<BTreeSet<Permission>>> {
        let Some(tokens) = &self.permissions else {
            return Ok(None);
        };
        tokens
            .iter()
            .map(|token| {
                token
                    .parse::<Permission>()
                    .map_err(|permission| ReconcileError::UnknownPermission {
                        team: self.name.clone(),
                        permission,
                    })
            })
            .collect::<ReconcileResult<BTreeSet<_>>>()
            .map(Some)
    }

    /// Declared OIDC group names, deduplicated.
    #[must_use]
    pub fn oidc_group_set(&self) -> Option<BTreeSet<String>> {
        self.oidc_groups
            .as_ref()
            .map(|groups| groups.iter().map(|g| g.trim().to_string()).collect())
    }
}

/// A project and the attributes it should have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Left unmanaged on existing projects when omitted; new projects
    /// default to `APPLICATION`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<Classifier>,
    /// Parent project name; `None` makes the project a root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
}

impl ProjectSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Declared parent, trimmed.
    #[must_use]
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref().map(str::trim)
    }
}

/// The complete desired configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Default state for items that do not set their own.
    #[serde(default)]
    pub state: State,
    #[serde(default, alias = "oidcGroups")]
    pub oidc_groups: Vec<OidcGroupSpec>,
    #[serde(default)]
    pub teams: Vec<TeamSpec>,
    #[serde(default)]
    pub projects: Vec<ProjectSpec>,
}

impl DesiredState {
    /// Parse a YAML (or JSON) document.
    pub fn from_yaml_str(content: &str) -> ReconcileResult<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            let location = e
                .location()
                .map(|l| format!(" at line {}, column {}", l.line(), l.column()))
                .unwrap_or_default();
            ReconcileError::InvalidDesiredState(format!("failed to parse{location}: {e}"))
        })
    }

    /// Effective state of an item with an optional override.
    #[must_use]
    pub fn effective(&self, item_state: Option<State>) -> State {
        item_state.unwrap_or(self.state)
    }

    /// Total number of declared items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.oidc_groups.len() + self.teams.len() + self.projects.len()
    }

    /// Check the declaration on its own, without looking at remote state.
    ///
    /// Rejects empty or duplicate names, unknown permissions, incomplete
    /// verification rules and parent cycles among the declared projects.
    pub fn validate(&self) -> ReconcileResult<()> {
        check_names(
            "oidc group",
            self.oidc_groups.iter().map(|g| g.name.as_str()),
        )?;
        check_names("team", self.teams.iter().map(|t| t.name.as_str()))?;
        check_names("project", self.projects.iter().map(|p| p.name.as_str()))?;

        for team in &self.teams {
            team.parsed_permissions()?;

            if let Some(groups) = &team.oidc_groups {
                if groups.iter().any(|g| g.trim().is_empty()) {
                    return Err(ReconcileError::InvalidDesiredState(format!(
                        "team '{}' lists an empty oidc group name",
                        team.name
                    )));
                }
            }

            if let Some(access) = &team.portfolio_access_control {
                if access.projects.iter().any(|p| p.trim().is_empty()) {
                    return Err(ReconcileError::InvalidDesiredState(format!(
                        "team '{}' grants access to an empty project name",
                        team.name
                    )));
                }
                if access.verify.enabled
                    && access
                        .verify
                        .root_project
                        .as_deref()
                        .map_or(true, |r| r.trim().is_empty())
                {
                    return Err(ReconcileError::InvalidDesiredState(format!(
                        "team '{}' enables verification without a root_project",
                        team.name
                    )));
                }
            }
        }

        let mut parents: BTreeMap<String, Option<String>> = BTreeMap::new();
        for project in &self.projects {
            if let Some(parent) = project.parent_name() {
                if parent.is_empty() {
                    return Err(ReconcileError::InvalidDesiredState(format!(
                        "project '{}' has an empty parent name",
                        project.name
                    )));
                }
            }
            if self.effective(project.state) == State::Present {
                parents.insert(
                    project.name.trim().to_string(),
                    project.parent_name().map(str::to_string),
                );
            }
        }
        graph::parents_first(&parents).map_err(|cycle| ReconcileError::CyclicParent { cycle })?;

        Ok(())
    }
}

fn check_names<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> ReconcileResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            return Err(ReconcileError::InvalidDesiredState(format!(
                "{kind} name must not be empty"
            )));
        }
        if !seen.insert(name) {
            return Err(ReconcileError::InvalidDesiredState(format!(
                "duplicate {kind} '{name}'"
            )));
        }
    }
    Ok(())
}
