//! Lifecycle operations
//!
//! Each operation acquires one connection, runs to completion or to its
//! first failure, and releases the connection on every path. Create and
//! Delete apply per-key mutations without compensation; Update applies its
//! change set inside a single MULTI block that is discarded on any failure.

use tracing::{debug, info, warn};

use super::error::ReconcileError;
use crate::config::Endpoint;
use crate::keyset::{derive_identity, diff, Change, Keyset, ResourceId};
use crate::store::{ConnectionProvider, RedisConnector, StoreConnection, Transaction};

/// Drives the store toward a declared keyset
pub struct Reconciler<P = RedisConnector> {
    provider: P,
}

impl Reconciler<RedisConnector> {
    /// Reconciler backed by real redis connections
    pub fn redis() -> Self {
        Self::new(RedisConnector::new())
    }
}

impl<P: ConnectionProvider> Reconciler<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Write every key of `desired`, derive the resource identity from it,
    /// then read the keys back.
    ///
    /// Stops at the first failed SET; keys written before it stay written.
    /// Once every SET has succeeded the identity is returned even if the
    /// read-back fails, so the inner result carries only the read outcome.
    pub async fn create(
        &self,
        desired: &Keyset,
        endpoint: &Endpoint,
    ) -> Result<(ResourceId, Result<Keyset, ReconcileError>), ReconcileError> {
        info!("Creating keyset with {} keys", desired.len());

        let mut conn = self.provider.acquire(endpoint).await?;
        let result: Result<_, ReconcileError> = async {
            for (key, value) in desired.iter() {
                debug!("SET {}", key);
                conn.set(key, value)
                    .await
                    .map_err(|source| ReconcileError::StoreWrite {
                        key: key.to_string(),
                        source,
                    })?;
            }

            let id = derive_identity(desired);
            info!("Keyset created with id {}", id);

            let observed = observe(conn.as_mut(), desired).await;
            if let Err(e) = &observed {
                warn!("Keyset {} written but read-back failed: {}", id, e);
            }
            Ok((id, observed))
        }
        .await;
        conn.release().await;

        result
    }

    /// Fetch the current store value of every key in `desired`.
    ///
    /// A key missing from the store is reported with an empty value.
    pub async fn read(
        &self,
        desired: &Keyset,
        endpoint: &Endpoint,
    ) -> Result<Keyset, ReconcileError> {
        let mut conn = self.provider.acquire(endpoint).await?;
        let result = observe(conn.as_mut(), desired).await;
        conn.release().await;

        result
    }

    /// Apply the minimal change set from `old` to `new` atomically, then
    /// read `new` back. Equal keysets skip straight to the read.
    ///
    /// `id` is the identity assigned at creation and is left untouched.
    pub async fn update(
        &self,
        old: &Keyset,
        new: &Keyset,
        id: &ResourceId,
        endpoint: &Endpoint,
    ) -> Result<Keyset, ReconcileError> {
        let changes = diff(old, new);

        let mut conn = self.provider.acquire(endpoint).await?;
        let result: Result<_, ReconcileError> = async {
            if changes.is_empty() {
                debug!("Keyset {} unchanged, skipping transaction", id);
            } else {
                info!("Updating keyset {} with {} changes", id, changes.len());
                apply_changes(conn.as_mut(), &changes).await?;
            }

            observe(conn.as_mut(), new).await
        }
        .await;
        conn.release().await;

        result
    }

    /// Delete every key of the last known keyset.
    ///
    /// Stops at the first failed DEL; keys deleted before it stay deleted.
    pub async fn delete(
        &self,
        last_known: &Keyset,
        endpoint: &Endpoint,
    ) -> Result<(), ReconcileError> {
        info!("Deleting keyset with {} keys", last_known.len());

        let mut conn = self.provider.acquire(endpoint).await?;
        let result: Result<_, ReconcileError> = async {
            for key in last_known.keys() {
                debug!("DEL {}", key);
                conn.del(key)
                    .await
                    .map_err(|source| ReconcileError::StoreDelete {
                        key: key.to_string(),
                        source,
                    })?;
            }
            Ok(())
        }
        .await;
        conn.release().await;

        result
    }
}

async fn observe(
    conn: &mut dyn StoreConnection,
    desired: &Keyset,
) -> Result<Keyset, ReconcileError> {
    let mut observed = Keyset::new();
    for key in desired.keys() {
        let value = conn
            .get(key)
            .await
            .map_err(|source| ReconcileError::StoreRead {
                key: key.to_string(),
                source,
            })?;
        if value.is_none() {
            debug!("Key {} is missing from the store", key);
        }
        observed.insert(key, value.unwrap_or_default());
    }
    Ok(observed)
}

async fn apply_changes(
    conn: &mut dyn StoreConnection,
    changes: &[Change],
) -> Result<(), ReconcileError> {
    debug!("Diff {:?}", changes);

    let mut tx = Transaction::begin(conn)
        .await
        .map_err(|source| ReconcileError::StoreUpdate {
            stage: "MULTI".to_string(),
            source,
        })?;

    for change in changes {
        if let Err(source) = tx.queue(change).await {
            warn!("{} failed, discarding {} queued changes", change, tx.queued());
            if let Err(e) = tx.discard().await {
                warn!("DISCARD failed: {}", e);
            }
            return Err(ReconcileError::StoreUpdate {
                stage: command_of(change),
                source,
            });
        }
    }

    tx.commit()
        .await
        .map_err(|source| ReconcileError::StoreUpdate {
            stage: "EXEC".to_string(),
            source,
        })?;

    Ok(())
}

fn command_of(change: &Change) -> String {
    match change {
        Change::Create { key, .. } | Change::Update { key, .. } => format!("SET {}", key),
        Change::Delete { key, .. } => format!("DEL {}", key),
    }
}
