//! Declarative reconciliation for Dependency-Track.
//!
//! Takes a [`DesiredState`] (OIDC groups, teams with their permissions and
//! group mappings, projects with their hierarchy, and per-team portfolio
//! access) and converges a server towards it:
//!
//! 1. [`DesiredState::validate`] rejects malformed input offline.
//! 2. [`RemoteStateReader`] reads a [`RemoteSnapshot`].
//! 3. [`DiffEngine`] computes a [`ChangeSet`] and runs the plan-time checks.
//! 4. [`Orderer`] lays the changes out as a dependency-ordered [`Plan`].
//! 5. [`Executor`] applies the plan, skipping dependents of failures.
//!
//! [`Reconciler`] wires these together and returns a [`RunReport`].

pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod order;
pub mod plan;
pub mod report;
pub mod resolver;
pub mod snapshot;

pub use diff::{ChangeSet, DiffEngine};
pub use engine::{Reconciler, ReconcilerConfig};
pub use error::{ErrorKind, ReconcileError, ReconcileResult};
pub use executor::{Execution, Executor, ExecutorConfig, OpOutcome};
pub use model::{
    Classifier, DesiredState, EntityKind, OidcGroupSpec, Permission, PortfolioAccessControlSpec,
    ProjectSpec, State, TeamSpec, VerifySpec,
};
pub use order::Orderer;
pub use plan::{Action, FieldChange, Operation, Plan, PlannedOp};
pub use report::{ErrorRecord, KindCounts, OperationRecord, OperationStatus, RunReport};
pub use resolver::{EntityResolver, PlanResolver};
pub use snapshot::{ReadScope, RemoteSnapshot, RemoteStateReader};
