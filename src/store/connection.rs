//! Store connection surface and transactional block

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::error::StoreError;
use crate::keyset::Change;

/// A live, exclusively owned store connection.
///
/// Commands are issued in program order; nothing else shares the connection
/// while a lifecycle operation holds it.
#[async_trait]
pub trait StoreConnection: Send {
    /// `SET key value`
    async fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// `GET key`; `None` when the key does not exist
    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    /// `DEL key`
    async fn del(&mut self, key: &str) -> Result<(), StoreError>;

    /// `MULTI`
    async fn multi(&mut self) -> Result<(), StoreError>;

    /// `EXEC`
    async fn exec(&mut self) -> Result<(), StoreError>;

    /// `DISCARD`
    async fn discard(&mut self) -> Result<(), StoreError>;

    /// Close the connection and anything it was routed through.
    ///
    /// Must be idempotent.
    async fn release(&mut self);
}

/// State of a MULTI block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    Discarded,
}

/// A MULTI block over a borrowed connection.
///
/// Mutations are queued with [`Transaction::queue`] and take effect only on
/// [`Transaction::commit`]. The caller decides between commit and
/// [`Transaction::discard`] explicitly; both consume the block.
pub struct Transaction<'c> {
    conn: &'c mut dyn StoreConnection,
    state: TransactionState,
    queued: usize,
}

impl<'c> Transaction<'c> {
    /// Issue `MULTI` and open the block
    pub async fn begin(conn: &'c mut dyn StoreConnection) -> Result<Self, StoreError> {
        trace!("Calling MULTI");
        conn.multi().await?;
        Ok(Self {
            conn,
            state: TransactionState::Open,
            queued: 0,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of mutations queued so far
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// Queue the store mutation for one change record
    pub async fn queue(&mut self, change: &Change) -> Result<(), StoreError> {
        debug!("Queueing {}", change);
        match change {
            Change::Create { key, value } | Change::Update { key, value } => {
                self.conn.set(key, value).await?
            }
            Change::Delete { key, .. } => self.conn.del(key).await?,
        }
        self.queued += 1;
        Ok(())
    }

    /// Issue `EXEC`
    pub async fn commit(mut self) -> Result<TransactionState, StoreError> {
        trace!("Calling EXEC ({} queued)", self.queued);
        let result = self.conn.exec().await;
        // A failed EXEC leaves nothing pending on the server side
        self.state = match result {
            Ok(()) => TransactionState::Committed,
            Err(_) => TransactionState::Discarded,
        };
        result.map(|()| self.state)
    }

    /// Issue `DISCARD`, dropping every queued mutation
    pub async fn discard(mut self) -> Result<TransactionState, StoreError> {
        trace!("Calling DISCARD ({} queued)", self.queued);
        self.state = TransactionState::Discarded;
        self.conn.discard().await.map(|()| self.state)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            warn!(
                "Transaction dropped while open with {} queued mutations",
                self.queued
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn set(key: &str, value: &str) -> Change {
        Change::Create {
            key: key.into(),
            value: value.into(),
        }
    }

    #[tokio::test]
    async fn test_commit_applies_queued() {
        let store = MemoryStore::new();
        store.seed("gone", "x");
        let mut conn = store.connect();

        let mut tx = Transaction::begin(&mut conn).await.unwrap();
        assert_eq!(tx.state(), TransactionState::Open);
        tx.queue(&set("a", "1")).await.unwrap();
        tx.queue(&Change::Delete {
            key: "gone".into(),
            old_value: "x".into(),
        })
        .await
        .unwrap();
        assert_eq!(tx.queued(), 2);

        // Nothing visible before EXEC
        assert_eq!(store.value("a"), None);
        assert_eq!(store.value("gone"), Some("x".to_string()));

        assert_eq!(tx.commit().await.unwrap(), TransactionState::Committed);
        assert_eq!(store.value("a"), Some("1".to_string()));
        assert_eq!(store.value("gone"), None);
    }

    #[tokio::test]
    async fn test_discard_drops_queued() {
        let store = MemoryStore::new();
        let mut conn = store.connect();

        let mut tx = Transaction::begin(&mut conn).await.unwrap();
        tx.queue(&set("a", "1")).await.unwrap();
        assert_eq!(tx.discard().await.unwrap(), TransactionState::Discarded);

        assert_eq!(store.value("a"), None);
        assert_eq!(store.received(), vec!["MULTI", "SET a 1", "DISCARD"]);
    }

    #[tokio::test]
    async fn test_queue_failure_keeps_block_open() {
        let store = MemoryStore::new();
        store.fail_on("SET", "b");
        let mut conn = store.connect();

        let mut tx = Transaction::begin(&mut conn).await.unwrap();
        tx.queue(&set("a", "1")).await.unwrap();
        assert!(tx.queue(&set("b", "2")).await.is_err());
        assert_eq!(tx.state(), TransactionState::Open);
        assert_eq!(tx.queued(), 1);

        tx.discard().await.unwrap();
        assert_eq!(store.value("a"), None);
    }

    #[tokio::test]
    async fn test_failed_exec_is_discarded() {
        let store = MemoryStore::new();
        store.fail_on("EXEC", "");
        let mut conn = store.connect();

        let mut tx = Transaction::begin(&mut conn).await.unwrap();
        tx.queue(&set("a", "1")).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.value("a"), None);
    }
}
