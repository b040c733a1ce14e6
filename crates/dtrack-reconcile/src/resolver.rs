//! Name-to-ID resolution.
//!
//! Lookups consult the start-of-run snapshot first and then the shadow map,
//! which the executor fills with IDs of entities it creates during the run.
//! The shadow map is append-only: the first ID recorded for a name sticks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::EntityKind;
use crate::snapshot::RemoteSnapshot;

type Key = (EntityKind, String);

/// Resolves entity names to remote IDs while a plan is executing.
#[derive(Debug)]
pub struct EntityResolver {
    snapshot: Arc<RemoteSnapshot>,
    shadow: RwLock<HashMap<Key, Uuid>>,
}

impl EntityResolver {
    #[must_use]
    pub fn new(snapshot: Arc<RemoteSnapshot>) -> Self {
        Self {
            snapshot,
            shadow: RwLock::new(HashMap::new()),
        }
    }

    /// The snapshot this resolver reads from.
    #[must_use]
    pub fn snapshot(&self) -> &RemoteSnapshot {
        &self.snapshot
    }

    /// Look up an ID without failing.
    pub async fn lookup(&self, kind: EntityKind, name: &str) -> Option<Uuid> {
        if let Some(id) = self.snapshot.id_of(kind, name) {
            return Some(id);
        }
        self.shadow
            .read()
            .await
            .get(&(kind, name.to_string()))
            .copied()
    }

    /// Resolve a name that must exist.
    pub async fn resolve(&self, kind: EntityKind, name: &str) -> ReconcileResult<Uuid> {
        self.lookup(kind, name)
            .await
            .ok_or_else(|| ReconcileError::UnresolvedReference {
                kind,
                name: name.to_string(),
            })
    }

    /// Record the ID of an entity created (or adopted) during this run.
    pub async fn record(&self, kind: EntityKind, name: &str, id: Uuid) {
        let mut shadow = self.shadow.write().await;
        match shadow.get(&(kind, name.to_string())) {
            Some(existing) if *existing != id => {
                warn!(
                    kind = %kind,
                    name = %name,
                    recorded = %existing,
                    ignored = %id,
                    "Entity already resolved, keeping first ID"
                );
            }
            Some(_) => {}
            None => {
                debug!(kind = %kind, name = %name, id = %id, "Recorded created entity");
                shadow.insert((kind, name.to_string()), id);
            }
        }
    }
}

/// Plan-time availability check: what will exist once the plan has run.
///
/// An entity is available if it exists remotely and is not scheduled for
/// deletion, or if it is scheduled for creation.
#[derive(Debug)]
pub struct PlanResolver<'a> {
    snapshot: &'a RemoteSnapshot,
    creates: HashSet<Key>,
    deletes: HashSet<Key>,
}

impl<'a> PlanResolver<'a> {
    #[must_use]
    pub fn new(snapshot: &'a RemoteSnapshot) -> Self {
        Self {
            snapshot,
            creates: HashSet::new(),
            deletes: HashSet::new(),
        }
    }

    pub fn will_create(&mut self, kind: EntityKind, name: &str) {
        self.creates.insert((kind, name.to_string()));
    }

    pub fn will_delete(&mut self, kind: EntityKind, name: &str) {
        self.deletes.insert((kind, name.to_string()));
    }

    #[must_use]
    pub fn is_created(&self, kind: EntityKind, name: &str) -> bool {
        self.creates.contains(&(kind, name.to_string()))
    }

    #[must_use]
    pub fn is_deleted(&self, kind: EntityKind, name: &str) -> bool {
        self.deletes.contains(&(kind, name.to_string()))
    }

    #[must_use]
    pub fn is_available(&self, kind: EntityKind, name: &str) -> bool {
        if self.is_created(kind, name) {
            return true;
        }
        self.snapshot.id_of(kind, name).is_some() && !self.is_deleted(kind, name)
    }

    /// Fail unless the entity will be available.
    pub fn require(&self, kind: EntityKind, name: &str) -> ReconcileResult<()> {
        if self.is_available(kind, name) {
            Ok(())
        } else {
            Err(ReconcileError::UnresolvedReference {
                kind,
                name: name.to_string(),
            })
        }
    }
}
