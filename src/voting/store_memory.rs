use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::{broadcast, Mutex};
use vote_budget::{CandidateId, IdentityId, LeaderboardEntry, VoteRecord};

use crate::voting::credentials::Pin;
use crate::voting::store_common::*;

/// A store that lives in the memory of the process.
///
/// Reads and writes can be made to fail, to exercise the failure paths.
pub struct MemoryBackend {
    tables: Mutex<StoreTables>,
    changes: broadcast::Sender<VoteChangeNotice>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub replace_calls: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            tables: Mutex::new(StoreTables::default()),
            changes,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            replace_calls: AtomicU64::new(0),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> StoreTables {
        self.tables.lock().await.clone()
    }

    fn check_reads(&self) -> StoreResult<()> {
        ensure_available(&self.fail_reads, "reads are failing")
    }

    fn check_writes(&self) -> StoreResult<()> {
        ensure_available(&self.fail_writes, "writes are failing")
    }
}

fn ensure_available(flag: &AtomicBool, message: &str) -> StoreResult<()> {
    if flag.load(Ordering::Relaxed) {
        return Err(StoreError::Unavailable {
            message: message.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn find_identity(&self, name: &str) -> StoreResult<Option<Identity>> {
        self.check_reads()?;
        Ok(self.tables.lock().await.find_profile(name).map(row_identity))
    }

    async fn create_identity(&self, name: &str, pin: Option<&Pin>) -> StoreResult<Identity> {
        self.check_writes()?;
        let identity = self.tables.lock().await.insert_profile(name, pin)?;
        info!("create_identity: {} registered as {}", name, identity.id);
        Ok(identity)
    }

    async fn verify_credential(&self, name: &str, pin: Option<&Pin>) -> StoreResult<bool> {
        self.check_reads()?;
        Ok(self.tables.lock().await.verify(name, pin))
    }
}

#[async_trait]
impl RemoteVoteStore for MemoryBackend {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn replace_votes(
        &self,
        identity: &IdentityId,
        records: &[VoteRecord],
    ) -> StoreResult<()> {
        self.replace_calls.fetch_add(1, Ordering::Relaxed);
        self.check_writes()?;
        self.tables.lock().await.replace_votes(identity, records);
        debug!("replace_votes: {} rows for {}", records.len(), identity);
        // Nobody listening is fine.
        let _ = self.changes.send(VoteChangeNotice {
            identity: identity.clone(),
        });
        Ok(())
    }

    async fn fetch_votes(&self, identity: &IdentityId) -> StoreResult<HashMap<CandidateId, u64>> {
        self.check_reads()?;
        Ok(self.tables.lock().await.votes_for(identity))
    }

    async fn fetch_leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        self.check_reads()?;
        Ok(self.tables.lock().await.leaderboard())
    }

    fn subscribe_to_vote_changes(&self) -> broadcast::Receiver<VoteChangeNotice> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replace_notifies_subscribers() {
        let store = MemoryBackend::new();
        let mut changes = store.subscribe_to_vote_changes();
        let u1 = IdentityId::from("u1");
        store
            .replace_votes(
                &u1,
                &[VoteRecord {
                    identity: u1.clone(),
                    candidate: CandidateId::from("c1"),
                    count: 3,
                }],
            )
            .await
            .unwrap();
        assert_eq!(changes.recv().await.unwrap().identity, u1);
        let board = store.fetch_leaderboard().await.unwrap();
        assert_eq!(board[0].total_votes, 3);
    }

    #[tokio::test]
    async fn failing_writes_change_nothing() {
        let store = MemoryBackend::new();
        store.fail_writes.store(true, Ordering::Relaxed);
        let u1 = IdentityId::from("u1");
        let res = store
            .replace_votes(
                &u1,
                &[VoteRecord {
                    identity: u1.clone(),
                    candidate: CandidateId::from("c1"),
                    count: 3,
                }],
            )
            .await;
        assert!(matches!(res, Err(StoreError::Unavailable { .. })));
        assert!(store.snapshot().await.votes.is_empty());
        assert_eq!(store.replace_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn concurrent_registrations_of_one_name() {
        let store = MemoryBackend::new();
        let (a, b) = tokio::join!(
            store.create_identity("Tidy-Mole", None),
            store.create_identity("Tidy-Mole", None),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(store.snapshot().await.profiles.len(), 1);
    }

    #[tokio::test]
    async fn identities() {
        let store = MemoryBackend::new();
        let pin = Pin::parse("9876").unwrap();
        assert_eq!(store.find_identity("Swift-Lynx").await.unwrap(), None);
        let created = store
            .create_identity("Swift-Lynx", Some(&pin))
            .await
            .unwrap();
        assert_eq!(
            store.find_identity("Swift-Lynx").await.unwrap(),
            Some(created)
        );
        assert!(store
            .verify_credential("Swift-Lynx", Some(&pin))
            .await
            .unwrap());
        let again = store.create_identity("Swift-Lynx", None).await;
        assert!(matches!(again, Err(StoreError::NameTaken { .. })));
        assert_eq!(store.snapshot().await.profiles.len(), 1);
        store.fail_reads.store(true, Ordering::Relaxed);
        assert!(store.find_identity("Swift-Lynx").await.is_err());
    }
}
