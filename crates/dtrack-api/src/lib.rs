//! Dependency-Track REST API client.
//!
//! Covers the slice of the `/api/v1` surface needed to converge access
//! control and portfolio layout: OIDC groups, teams and their permissions,
//! projects, and per-team project ACLs.
//!
//! ```no_run
//! use dtrack_api::{ClientConfig, DependencyTrackApi, DependencyTrackClient};
//!
//! # async fn run() -> dtrack_api::ApiResult<()> {
//! let config = ClientConfig::from_env()?;
//! let client = DependencyTrackClient::new(&config)?;
//! for team in client.list_teams().await? {
//!     println!("{} ({} permissions)", team.name, team.permissions.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod traits;

pub use client::DependencyTrackClient;
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult};
pub use models::{
    ConfigProperty, MappedOidcGroup, NewProject, OidcGroup, PermissionRef, Project, ProjectRef,
    ProjectUpdate, Team,
};
pub use retry::RetryPolicy;
pub use traits::DependencyTrackApi;
