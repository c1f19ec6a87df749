//! Managed keyset resource
//!
//! Holds the write-once identity separately from the mutable desired and
//! observed content, and enforces the lifecycle order.

use std::fmt;

use tracing::warn;

use super::engine::Reconciler;
use super::error::ReconcileError;
use crate::config::Endpoint;
use crate::keyset::{Keyset, ResourceId};
use crate::store::ConnectionProvider;

/// Resource lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Nothing written yet
    Absent,
    /// Written and identified, observed state not yet fetched
    Created,
    /// Observed state reflects the latest read
    Observed,
    /// Keys removed, identity cleared; terminal
    Deleted,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Absent => "absent",
            Lifecycle::Created => "created",
            Lifecycle::Observed => "observed",
            Lifecycle::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// One managed keyset and its lifecycle
#[derive(Debug, Clone)]
pub struct ManagedKeyset {
    id: Option<ResourceId>,
    desired: Keyset,
    observed: Keyset,
    endpoint: Endpoint,
    state: Lifecycle,
}

impl ManagedKeyset {
    pub fn new(desired: Keyset, endpoint: Endpoint) -> Self {
        Self {
            id: None,
            desired,
            observed: Keyset::new(),
            endpoint,
            state: Lifecycle::Absent,
        }
    }

    /// Adopt an existing resource by id without writing anything
    pub fn import(id: ResourceId, desired: Keyset, endpoint: Endpoint) -> Self {
        Self {
            id: Some(id),
            desired,
            observed: Keyset::new(),
            endpoint,
            state: Lifecycle::Created,
        }
    }

    pub fn id(&self) -> Option<&ResourceId> {
        self.id.as_ref()
    }

    pub fn desired(&self) -> &Keyset {
        &self.desired
    }

    pub fn observed(&self) -> &Keyset {
        &self.observed
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    fn require_live(&self, operation: &'static str) -> Result<&ResourceId, ReconcileError> {
        match (&self.id, self.state) {
            (Some(id), Lifecycle::Created | Lifecycle::Observed) => Ok(id),
            _ => Err(ReconcileError::InvalidTransition {
                operation,
                state: self.state,
            }),
        }
    }

    fn assign_identity(&mut self, id: ResourceId) {
        if let Some(existing) = &self.id {
            warn!("Identity {} already assigned, keeping it", existing);
            return;
        }
        self.id = Some(id);
    }

    /// Absent → Observed (or Created if only the trailing read failed)
    pub async fn create<P: ConnectionProvider>(
        &mut self,
        reconciler: &Reconciler<P>,
    ) -> Result<&ResourceId, ReconcileError> {
        if self.state != Lifecycle::Absent {
            return Err(ReconcileError::InvalidTransition {
                operation: "create",
                state: self.state,
            });
        }

        let (id, observed) = reconciler.create(&self.desired, &self.endpoint).await?;
        self.assign_identity(id);
        match observed {
            Ok(observed) => {
                self.observed = observed;
                self.state = Lifecycle::Observed;
            }
            Err(e) => {
                self.state = Lifecycle::Created;
                return Err(e);
            }
        }

        self.require_live("create")
    }

    /// Re-fetch observed state
    pub async fn refresh<P: ConnectionProvider>(
        &mut self,
        reconciler: &Reconciler<P>,
    ) -> Result<&Keyset, ReconcileError> {
        self.require_live("read")?;
        self.observed = reconciler.read(&self.desired, &self.endpoint).await?;
        self.state = Lifecycle::Observed;
        Ok(&self.observed)
    }

    /// Converge to a new desired keyset. The identity does not change.
    pub async fn apply<P: ConnectionProvider>(
        &mut self,
        reconciler: &Reconciler<P>,
        desired: Keyset,
    ) -> Result<&Keyset, ReconcileError> {
        let id = self.require_live("update")?.clone();

        match reconciler
            .update(&self.desired, &desired, &id, &self.endpoint)
            .await
        {
            Ok(observed) => {
                self.desired = desired;
                self.observed = observed;
                self.state = Lifecycle::Observed;
                Ok(&self.observed)
            }
            Err(e @ ReconcileError::StoreRead { .. }) => {
                // The transaction committed before the read-back failed
                self.desired = desired;
                self.state = Lifecycle::Created;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove every key of the last known desired keyset and clear the identity
    pub async fn destroy<P: ConnectionProvider>(
        &mut self,
        reconciler: &Reconciler<P>,
    ) -> Result<(), ReconcileError> {
        self.require_live("delete")?;
        reconciler.delete(&self.desired, &self.endpoint).await?;

        self.id = None;
        self.observed = Keyset::new();
        self.state = Lifecycle::Deleted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::keyset::derive_identity;

    fn setup(desired: Keyset) -> (MemoryStore, Reconciler<MemoryStore>, ManagedKeyset) {
        let store = MemoryStore::new();
        let reconciler = Reconciler::new(store.clone());
        let resource = ManagedKeyset::new(desired, Endpoint::default());
        (store, reconciler, resource)
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let initial = Keyset::from([("x", "1"), ("y", "2")]);
        let (store, reconciler, mut resource) = setup(initial.clone());
        assert_eq!(resource.state(), Lifecycle::Absent);
        assert!(resource.id().is_none());

        let id = resource.create(&reconciler).await.unwrap().clone();
        assert_eq!(id, derive_identity(&initial));
        assert_eq!(resource.state(), Lifecycle::Observed);
        assert_eq!(resource.observed(), &initial);

        let next = Keyset::from([("x", "1"), ("y", "3"), ("z", "4")]);
        resource.apply(&reconciler, next.clone()).await.unwrap();
        assert_eq!(resource.desired(), &next);
        assert_eq!(resource.observed(), &next);
        // Identity names the instance, not its current content
        assert_eq!(resource.id(), Some(&id));
        assert_ne!(derive_identity(&next), id);

        store.seed("y", "drifted");
        let observed = resource.refresh(&reconciler).await.unwrap();
        assert_eq!(observed.get("y"), Some("drifted"));

        resource.destroy(&reconciler).await.unwrap();
        assert_eq!(resource.state(), Lifecycle::Deleted);
        assert!(resource.id().is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_deleted_is_terminal() {
        let (_store, reconciler, mut resource) = setup(Keyset::from([("a", "1")]));
        resource.create(&reconciler).await.unwrap();
        resource.destroy(&reconciler).await.unwrap();

        for err in [
            resource.refresh(&reconciler).await.err(),
            resource.apply(&reconciler, Keyset::new()).await.err(),
            resource.destroy(&reconciler).await.err(),
            resource.create(&reconciler).await.err(),
        ] {
            assert!(matches!(
                err,
                Some(ReconcileError::InvalidTransition {
                    state: Lifecycle::Deleted,
                    ..
                })
            ));
        }
    }

    #[tokio::test]
    async fn test_operations_before_create_rejected() {
        let (store, reconciler, mut resource) = setup(Keyset::from([("a", "1")]));
        assert!(resource.refresh(&reconciler).await.is_err());
        assert!(resource.destroy(&reconciler).await.is_err());
        assert!(store.received().is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_stays_absent() {
        let (store, reconciler, mut resource) = setup(Keyset::from([("a", "1")]));
        store.fail_on("SET", "a");

        assert!(resource.create(&reconciler).await.is_err());
        assert_eq!(resource.state(), Lifecycle::Absent);
        assert!(resource.id().is_none());
    }

    #[tokio::test]
    async fn test_create_with_failed_read_back_is_created() {
        let desired = Keyset::from([("a", "1")]);
        let (store, reconciler, mut resource) = setup(desired.clone());
        store.fail_on("GET", "a");

        let err = resource.create(&reconciler).await.unwrap_err();
        assert!(matches!(err, ReconcileError::StoreRead { .. }));
        assert_eq!(resource.state(), Lifecycle::Created);
        assert_eq!(resource.id(), Some(&derive_identity(&desired)));

        store.clear_failures();
        resource.refresh(&reconciler).await.unwrap();
        assert_eq!(resource.state(), Lifecycle::Observed);
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_previous_desired() {
        let initial = Keyset::from([("a", "1")]);
        let (store, reconciler, mut resource) = setup(initial.clone());
        resource.create(&reconciler).await.unwrap();
        store.fail_on("SET", "b");

        let result = resource
            .apply(&reconciler, Keyset::from([("a", "1"), ("b", "2")]))
            .await;
        assert!(result.is_err());
        assert_eq!(resource.desired(), &initial);
        assert_eq!(store.value("b"), None);
    }

    #[tokio::test]
    async fn test_import_then_refresh() {
        let store = MemoryStore::new();
        store.seed("k", "v");
        let reconciler = Reconciler::new(store.clone());

        let mut resource = ManagedKeyset::import(
            ResourceId::new("42"),
            Keyset::from([("k", "v")]),
            Endpoint::default(),
        );
        assert_eq!(resource.state(), Lifecycle::Created);

        let observed = resource.refresh(&reconciler).await.unwrap().clone();
        assert_eq!(observed, Keyset::from([("k", "v")]));
        assert_eq!(resource.id().map(ResourceId::as_str), Some("42"));
    }
}
