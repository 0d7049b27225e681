// Contracts with the remote collaborators, and the tables shared by the backends.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tokio::sync::broadcast;
use uuid::Uuid;
use vote_budget::{tally_leaderboard, CandidateId, IdentityId, LeaderboardEntry, VoteRecord};

use crate::voting::credentials::Pin;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("Error reading {path}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{path} does not contain valid JSON"))]
    ParsingFile {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Could not serialize the data"))]
    Serializing { source: serde_json::Error },
    #[snafu(display("Store unavailable: {message}"))]
    Unavailable { message: String },
    #[snafu(display("A profile named {name} already exists"))]
    NameTaken { name: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A profile, as known by the profile store.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
}

/// Sent to the subscribers every time the votes of an identity are replaced.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoteChangeNotice {
    pub identity: IdentityId,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_identity(&self, name: &str) -> StoreResult<Option<Identity>>;

    /// Fails with `NameTaken` if the name is already registered.
    async fn create_identity(&self, name: &str, pin: Option<&Pin>) -> StoreResult<Identity>;

    /// False if the name is unknown or if the PIN does not match.
    /// A profile registered without a PIN accepts any PIN.
    async fn verify_credential(&self, name: &str, pin: Option<&Pin>) -> StoreResult<bool>;
}

#[async_trait]
pub trait RemoteVoteStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    /// Replaces all the rows of the identity with the given ones, as one unit.
    async fn replace_votes(&self, identity: &IdentityId, records: &[VoteRecord])
        -> StoreResult<()>;

    async fn fetch_votes(&self, identity: &IdentityId) -> StoreResult<HashMap<CandidateId, u64>>;

    async fn fetch_leaderboard(&self) -> StoreResult<Vec<LeaderboardEntry>>;

    /// Best-effort stream of changes. Notices may be dropped or repeated.
    fn subscribe_to_vote_changes(&self) -> broadcast::Receiver<VoteChangeNotice>;
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub name: String,
    #[serde(rename = "pinDigest")]
    pub pin_digest: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoteRow {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "candidateId")]
    pub candidate_id: String,
    #[serde(rename = "voteCount")]
    pub vote_count: u64,
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

/// Profiles and vote rows, as held by a backend.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreTables {
    #[serde(default)]
    pub profiles: Vec<ProfileRow>,
    #[serde(default)]
    pub votes: Vec<VoteRow>,
}

impl StoreTables {
    pub fn find_profile(&self, name: &str) -> Option<&ProfileRow> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Names are unique: the check and the insertion happen under the same
    /// borrow of the tables.
    pub fn insert_profile(&mut self, name: &str, pin: Option<&Pin>) -> StoreResult<Identity> {
        ensure!(
            self.find_profile(name).is_none(),
            NameTakenSnafu {
                name: name.to_string()
            }
        );
        let row = ProfileRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            pin_digest: pin.map(|p| pin_digest(name, p)),
            created_at: now_secs(),
        };
        debug!("insert_profile: {} -> {}", row.name, row.id);
        let identity = row_identity(&row);
        self.profiles.push(row);
        Ok(identity)
    }

    pub fn verify(&self, name: &str, pin: Option<&Pin>) -> bool {
        match self.find_profile(name) {
            None => false,
            Some(ProfileRow {
                pin_digest: None, ..
            }) => true,
            Some(ProfileRow {
                pin_digest: Some(digest),
                ..
            }) => pin.map(|p| pin_digest(name, p)).as_ref() == Some(digest),
        }
    }

    /// Drops every row of the identity, then inserts the new ones.
    /// Zero counts and rows of other identities are skipped.
    pub fn replace_votes(&mut self, identity: &IdentityId, records: &[VoteRecord]) {
        let updated_at = now_secs();
        self.votes.retain(|r| r.user_id != identity.0);
        for r in records.iter() {
            if r.identity != *identity {
                warn!(
                    "replace_votes: skipping a row of {} while replacing the rows of {}",
                    r.identity, identity
                );
                continue;
            }
            if r.count == 0 {
                continue;
            }
            self.votes.push(VoteRow {
                user_id: identity.0.clone(),
                candidate_id: r.candidate.0.clone(),
                vote_count: r.count,
                updated_at,
            });
        }
    }

    pub fn votes_for(&self, identity: &IdentityId) -> HashMap<CandidateId, u64> {
        self.votes
            .iter()
            .filter(|r| r.user_id == identity.0)
            .map(|r| (CandidateId(r.candidate_id.clone()), r.vote_count))
            .collect()
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let records: Vec<VoteRecord> = self
            .votes
            .iter()
            .map(|r| VoteRecord {
                identity: IdentityId(r.user_id.clone()),
                candidate: CandidateId(r.candidate_id.clone()),
                count: r.vote_count,
            })
            .collect();
        tally_leaderboard(&records)
    }
}

pub fn row_identity(row: &ProfileRow) -> Identity {
    Identity {
        id: IdentityId(row.id.clone()),
        name: row.name.clone(),
    }
}

// The PIN is never stored as typed.
pub fn pin_digest(name: &str, pin: &Pin) -> String {
    sha256::digest(format!("{}:{}", name, pin.as_str()))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(s: &str) -> Pin {
        Pin::parse(s).unwrap()
    }

    fn record(i: &IdentityId, c: &str, n: u64) -> VoteRecord {
        VoteRecord {
            identity: i.clone(),
            candidate: CandidateId::from(c),
            count: n,
        }
    }

    #[test]
    fn pins_are_digested() {
        let mut tables = StoreTables::default();
        tables.insert_profile("Brave-Otter", Some(&pin("1234"))).unwrap();
        let row = tables.find_profile("Brave-Otter").unwrap();
        assert_ne!(row.pin_digest.as_deref(), Some("1234"));
        assert!(tables.verify("Brave-Otter", Some(&pin("1234"))));
        assert!(!tables.verify("Brave-Otter", Some(&pin("4321"))));
        assert!(!tables.verify("Brave-Otter", None));
        assert!(!tables.verify("Nobody", Some(&pin("1234"))));
    }

    #[test]
    fn profiles_without_pin_accept_anything() {
        let mut tables = StoreTables::default();
        tables.insert_profile("Calm-Yak", None).unwrap();
        assert!(tables.verify("Calm-Yak", None));
        assert!(tables.verify("Calm-Yak", Some(&pin("0000"))));
    }

    #[test]
    fn names_are_unique() {
        let mut tables = StoreTables::default();
        let first = tables.insert_profile("Calm-Yak", Some(&pin("1111"))).unwrap();
        let res = tables.insert_profile("Calm-Yak", Some(&pin("2222")));
        assert!(matches!(res, Err(StoreError::NameTaken { name }) if name == "Calm-Yak"));
        assert_eq!(tables.profiles.len(), 1);
        assert_eq!(row_identity(&tables.profiles[0]), first);
        assert!(tables.verify("Calm-Yak", Some(&pin("1111"))));
    }

    #[test]
    fn replace_drops_previous_rows() {
        let mut tables = StoreTables::default();
        let u1 = tables.insert_profile("u-one", None).unwrap().id;
        let u2 = tables.insert_profile("u-two", None).unwrap().id;
        tables.replace_votes(&u1, &[record(&u1, "c1", 10), record(&u1, "c2", 5)]);
        tables.replace_votes(&u2, &[record(&u2, "c1", 1)]);
        tables.replace_votes(&u1, &[record(&u1, "c2", 7), record(&u1, "c3", 0)]);

        let mine = tables.votes_for(&u1);
        assert_eq!(mine.len(), 1);
        assert_eq!(mine.get(&CandidateId::from("c2")), Some(&7));
        assert_eq!(tables.votes_for(&u2).len(), 1);
        assert_eq!(tables.votes.len(), 2);
    }

    #[test]
    fn foreign_rows_are_skipped() {
        let mut tables = StoreTables::default();
        let u1 = IdentityId::from("u1");
        let u2 = IdentityId::from("u2");
        tables.replace_votes(&u1, &[record(&u2, "c1", 10)]);
        assert!(tables.votes.is_empty());
    }
}
