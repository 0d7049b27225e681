// A store kept in a single JSON file, so that several invocations of the
// command line (or several processes) share the same profiles and votes.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use snafu::prelude::*;
use tokio::sync::{broadcast, Mutex};
use vote_budget::{CandidateId, IdentityId, LeaderboardEntry, VoteRecord};

use crate::voting::credentials::Pin;
use crate::voting::store_common::*;

pub struct JsonFileBackend {
    path: PathBuf,
    // Serializes the read-modify-write cycles of this process.
    write_lock: Mutex<()>,
    changes: broadcast::Sender<VoteChangeNotice>,
}

impl JsonFileBackend {
    /// Opens the store, checking that an existing file can be read.
    /// A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<JsonFileBackend> {
        let path = path.as_ref().to_path_buf();
        let tables = load_tables(&path).await?;
        info!(
            "Opened store {}: {} profiles, {} vote rows",
            path.display(),
            tables.profiles.len(),
            tables.votes.len()
        );
        let (changes, _) = broadcast::channel(64);
        Ok(JsonFileBackend {
            path,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // The file is read again every time: other processes may have written to it.
    async fn read(&self) -> StoreResult<StoreTables> {
        load_tables(&self.path).await
    }

    // Nothing is written when the operation fails.
    async fn modify<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut StoreTables) -> StoreResult<T> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut tables = load_tables(&self.path).await?;
        let res = op(&mut tables)?;
        save_tables(&self.path, &tables).await?;
        Ok(res)
    }
}

async fn load_tables(path: &Path) -> StoreResult<StoreTables> {
    let display = path.display().to_string();
    match tokio::fs::read_to_string(path).await {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("load_tables: {} does not exist yet", display);
            Ok(StoreTables::default())
        }
        Err(e) => Err(e).context(ReadingFileSnafu { path: display }),
        Ok(contents) if contents.trim().is_empty() => Ok(StoreTables::default()),
        Ok(contents) => serde_json::from_str(&contents).context(ParsingFileSnafu { path: display }),
    }
}

// Written next to the target and renamed over it: readers see the old
// content or the new one, never a partial file.
async fn save_tables(path: &Path, tables: &StoreTables) -> StoreResult<()> {
    let display = path.display().to_string();
    let contents = serde_json::to_string_pretty(tables).context(SerializingSnafu)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .context(WritingFileSnafu {
            path: tmp.display().to_string(),
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .context(WritingFileSnafu { path: display })?;
    Ok(())
}

#[async_trait]
impl ProfileStore for JsonFileBackend {
    async fn find_identity(&self, name: &str) -> StoreResult<Option<Identity>> {
        Ok(self.read().await?.find_profile(name).map(row_identity))
    }

    async fn create_identity(&self, name: &str, pin: Option<&Pin>) -> StoreResult<Identity> {
        let name = name.to_string();
        let pin = pin.cloned();
        let identity = self
            .modify(move |tables| tables.insert_profile(&name, pin.as_ref()))
            .await?;
        info!("create_identity: {} registered as {}", identity.name, identity.id);
        Ok(identity)
    }

    async fn verify_credential(&self, name: &str, pin: Option<&Pin>) -> StoreResult<bool> {
        Ok(self.read().await?.verify(name, pin))
    }
}

#[async_trait]
impl RemoteVoteStore for JsonFileBackend {
    fn backend_tag(&self) -> &'static str {
        "json_file"
    }

    async fn replace_votes(
        &self,
        identity: &IdentityId,
        records: &[VoteRecord],
    ) -> StoreResult<()> {
        let id = identity.clone();
        let rows = records.to_vec();
        self.modify(move |tables| {
            tables.replace_votes(&id, &rows);
            Ok(())
        })
        .await?;
        debug!(
            "replace_votes: {} rows for {} in {}",
            records.len(),
            identity,
            self.path.display()
        );
        let _ = self.changes.send(VoteChangeNotice {
            identity: identity.clone(),
        });
        Ok(())
    }

    async fn fetch_votes(&self, identity: &IdentityId) -> StoreResult<HashMap<CandidateId, u64>> {
        Ok(self.read().await?.votes_for(identity))
    }

    async fn fetch_leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        Ok(self.read().await?.leaderboard())
    }

    fn subscribe_to_vote_changes(&self) -> broadcast::Receiver<VoteChangeNotice> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileBackend::open(dir.path().join("store.json"))
            .await
            .unwrap();
        assert_eq!(store.find_identity("Anyone").await.unwrap(), None);
        assert!(store.fetch_leaderboard().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_handles_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let first = JsonFileBackend::open(&path).await.unwrap();
        let second = JsonFileBackend::open(&path).await.unwrap();

        let pin = Pin::parse("1111").unwrap();
        let identity = first
            .create_identity("Lucky-Koala", Some(&pin))
            .await
            .unwrap();
        first
            .replace_votes(
                &identity.id,
                &[VoteRecord {
                    identity: identity.id.clone(),
                    candidate: CandidateId::from("c2"),
                    count: 42,
                }],
            )
            .await
            .unwrap();

        assert_eq!(
            second.find_identity("Lucky-Koala").await.unwrap(),
            Some(identity.clone())
        );
        assert!(second
            .verify_credential("Lucky-Koala", Some(&pin))
            .await
            .unwrap());
        let votes = second.fetch_votes(&identity.id).await.unwrap();
        assert_eq!(votes.get(&CandidateId::from("c2")), Some(&42));
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[tokio::test]
    async fn a_name_is_registered_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let first = JsonFileBackend::open(&path).await.unwrap();
        let second = JsonFileBackend::open(&path).await.unwrap();

        let created = first
            .create_identity("Shy-Heron", Some(&Pin::parse("1111").unwrap()))
            .await
            .unwrap();
        // The second handle never looked the name up: the check runs on the
        // tables it reloads under its lock.
        let res = second
            .create_identity("Shy-Heron", Some(&Pin::parse("2222").unwrap()))
            .await;
        assert!(matches!(res, Err(StoreError::NameTaken { .. })));

        let third = JsonFileBackend::open(&path).await.unwrap();
        assert_eq!(third.find_identity("Shy-Heron").await.unwrap(), Some(created));
        let tables: StoreTables =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(tables.profiles.len(), 1);
    }

    #[tokio::test]
    async fn corrupted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        let res = JsonFileBackend::open(&path).await;
        assert!(matches!(res, Err(StoreError::ParsingFile { .. })));
    }
}
