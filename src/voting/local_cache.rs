// The working copy of the allocation of the active profile.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use vote_budget::{Allocation, CandidateId};

use crate::voting::store_common::*;

/// The persisted record. It is always written as a whole.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CachedUserData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub votes: BTreeMap<String, u64>,
    #[serde(rename = "totalVotes")]
    pub total_votes: u64,
    #[serde(rename = "votesRemaining")]
    pub votes_remaining: u64,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl CachedUserData {
    pub fn from_allocation(
        identity: &Identity,
        avatar_url: Option<String>,
        allocation: &Allocation,
    ) -> CachedUserData {
        CachedUserData {
            id: Some(identity.id.0.clone()),
            name: identity.name.clone(),
            votes: allocation
                .iter()
                .map(|(cid, count)| (cid.0.clone(), count))
                .collect(),
            total_votes: allocation.total_votes(),
            votes_remaining: allocation.votes_remaining(),
            avatar_url,
        }
    }

    pub fn vote_map(&self) -> HashMap<CandidateId, u64> {
        self.votes
            .iter()
            .map(|(cid, count)| (CandidateId(cid.clone()), *count))
            .collect()
    }
}

/// One slot of key-value persistence.
pub trait LocalCache {
    fn read(&self) -> StoreResult<Option<CachedUserData>>;

    fn write(&mut self, record: &CachedUserData) -> StoreResult<()>;

    fn clear(&mut self) -> StoreResult<()>;
}

// An unreadable slot is treated as an empty one.
fn parse_record(contents: &str, origin: &str) -> Option<CachedUserData> {
    match serde_json::from_str(contents) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Ignoring the unreadable session in {}: {}", origin, e);
            None
        }
    }
}

/// A cache that keeps the serialized record in memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Option<String>,
    pub fail_writes: bool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryCache {
    pub fn with_raw(contents: &str) -> Self {
        MemoryCache {
            slot: Some(contents.to_string()),
            fail_writes: false,
        }
    }

    pub fn raw(&self) -> Option<&str> {
        self.slot.as_deref()
    }
}

impl LocalCache for MemoryCache {
    fn read(&self) -> StoreResult<Option<CachedUserData>> {
        Ok(self
            .slot
            .as_deref()
            .and_then(|s| parse_record(s, "memory")))
    }

    fn write(&mut self, record: &CachedUserData) -> StoreResult<()> {
        if self.fail_writes {
            return UnavailableSnafu {
                message: "the session cache is read-only",
            }
            .fail();
        }
        self.slot = Some(serde_json::to_string(record).context(SerializingSnafu)?);
        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.slot = None;
        Ok(())
    }
}

/// A cache kept in one file.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonFileCache {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

impl LocalCache for JsonFileCache {
    fn read(&self) -> StoreResult<Option<CachedUserData>> {
        match fs::read_to_string(&self.path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(ReadingFileSnafu {
                path: self.display(),
            }),
            Ok(contents) => Ok(parse_record(&contents, &self.display())),
        }
    }

    fn write(&mut self, record: &CachedUserData) -> StoreResult<()> {
        let contents = serde_json::to_string_pretty(record).context(SerializingSnafu)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).context(WritingFileSnafu {
            path: tmp.display().to_string(),
        })?;
        fs::rename(&tmp, &self.path).context(WritingFileSnafu {
            path: self.display(),
        })?;
        debug!("Session written to {}", self.display());
        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            res => res.context(WritingFileSnafu {
                path: self.display(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vote_budget::IdentityId;

    fn sample() -> CachedUserData {
        let mut allocation =
            Allocation::new(&[CandidateId::from("c1"), CandidateId::from("c2")], 100);
        allocation
            .set_candidate_votes(&CandidateId::from("c2"), 30)
            .unwrap();
        let identity = Identity {
            id: IdentityId::from("u-1"),
            name: "Jolly-Otter".to_string(),
        };
        CachedUserData::from_allocation(&identity, None, &allocation)
    }

    #[test]
    fn record_layout() {
        let js = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            js,
            serde_json::json!({
                "id": "u-1",
                "name": "Jolly-Otter",
                "votes": {"c1": 0, "c2": 30},
                "totalVotes": 100,
                "votesRemaining": 70
            })
        );
    }

    #[test]
    fn memory_slot() {
        let mut cache = MemoryCache::new();
        assert_eq!(cache.read().unwrap(), None);
        cache.write(&sample()).unwrap();
        assert_eq!(cache.read().unwrap(), Some(sample()));
        cache.clear().unwrap();
        assert_eq!(cache.read().unwrap(), None);
    }

    #[test]
    fn garbage_reads_as_empty() {
        let cache = MemoryCache::with_raw("{\"name\": 3");
        assert_eq!(cache.read().unwrap(), None);
    }

    #[test]
    fn file_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = JsonFileCache::new(dir.path().join("session.json"));
        assert_eq!(cache.read().unwrap(), None);
        cache.write(&sample()).unwrap();
        assert_eq!(cache.read().unwrap(), Some(sample()));
        cache.clear().unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.read().unwrap(), None);
    }
}
