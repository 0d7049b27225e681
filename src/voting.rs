use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use snafu::{prelude::*, Snafu};
use vote_budget::*;

pub mod config_reader;
pub mod credentials;
pub mod leaderboard;
pub mod local_cache;
pub mod names;
pub mod store_common;
pub mod store_json;
pub mod store_memory;

use crate::voting::credentials::*;
use crate::voting::local_cache::*;
use crate::voting::names::avatar_url;
use crate::voting::store_common::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum VoteError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("{source}"))]
    Validation { source: ValidationError },
    #[snafu(display("Storage failure: {source}"))]
    Storage { source: StoreError },
    #[snafu(display("{source}"))]
    Budget { source: AllocationErrors },
    #[snafu(display("Nobody is logged in"))]
    NotLoggedIn {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type VoteResult<T> = Result<T, VoteError>;

/// The profile this session acts for.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ActiveProfile {
    pub identity: Identity,
    pub avatar_url: String,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AuthOutcome {
    Welcome {
        identity: Identity,
        /// The profile existed before.
        returning: bool,
        /// Set when remote votes were found and adopted.
        reconciled: Option<ReconcileReport>,
    },
    Rejected(CredentialError),
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SubmitReport {
    pub records_sent: usize,
    /// False if the remote state could not be read back after the submission.
    pub refreshed: bool,
}

/// Ties the allocation engine to a store and to the local cache.
///
/// Every accepted mutation is written to the cache as a whole record. The
/// remote store only sees the allocation on `submit`.
pub struct VotingSession<S, C>
where
    S: ProfileStore + RemoteVoteStore,
    C: LocalCache,
{
    engine: AllocationEngine,
    store: Arc<S>,
    cache: C,
    active: Option<ActiveProfile>,
}

impl<S, C> VotingSession<S, C>
where
    S: ProfileStore + RemoteVoteStore,
    C: LocalCache,
{
    pub fn new(engine: AllocationEngine, store: Arc<S>, cache: C) -> Self {
        debug!("VotingSession: store {}", store.backend_tag());
        VotingSession {
            engine,
            store,
            cache,
            active: None,
        }
    }

    pub fn engine(&self) -> &AllocationEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn active(&self) -> Option<&ActiveProfile> {
        self.active.as_ref()
    }

    pub fn allocation(&self) -> VoteResult<&Allocation> {
        let id = &self.active.as_ref().context(NotLoggedInSnafu)?.identity.id;
        self.engine
            .get(id)
            .ok_or_else(|| AllocationErrors::UnknownIdentity(id.clone()))
            .context(BudgetSnafu)
    }

    /// Picks up the profile saved by a previous run, if any.
    ///
    /// The saved counts go through the rules of the current round: the
    /// configured budget wins, unknown candidates are dropped and the
    /// remaining count is recomputed.
    pub fn resume(&mut self) -> VoteResult<Option<&ActiveProfile>> {
        let record = match self.cache.read().context(StorageSnafu)? {
            None => return Ok(None),
            Some(r) => r,
        };
        let id = match record.id.clone() {
            Some(id) => IdentityId(id),
            None => {
                warn!(
                    "resume: the saved session of {} has no identity, logging out",
                    record.name
                );
                self.cache.clear().context(StorageSnafu)?;
                return Ok(None);
            }
        };
        if record.total_votes != self.engine.rules().total_votes {
            info!(
                "resume: saved budget {} replaced by {}",
                record.total_votes,
                self.engine.rules().total_votes
            );
        }
        let mut allocation = self.engine.fresh_allocation();
        allocation.reconcile_from_remote(&record.vote_map());
        let avatar = record
            .avatar_url
            .clone()
            .unwrap_or_else(|| avatar_url(&record.name));
        let profile = ActiveProfile {
            identity: Identity {
                id,
                name: record.name,
            },
            avatar_url: avatar,
        };
        self.commit(profile, allocation)?;
        Ok(self.active.as_ref())
    }

    /// Registers a new profile or logs into an existing one.
    ///
    /// A returning profile adopts its submitted votes when there are any.
    /// Wrong credentials are an outcome, not an error. Until the new profile
    /// is saved to the cache, the previous one stays active.
    pub async fn authenticate(
        &mut self,
        name: &ProfileName,
        pin: Option<&Pin>,
        mode: Mode,
    ) -> VoteResult<AuthOutcome> {
        let existing = self
            .store
            .find_identity(name.as_str())
            .await
            .context(StorageSnafu)?;
        let checked = match (existing, mode) {
            (None, Mode::Login) => {
                info!("authenticate: no profile named {}", name.as_str());
                Err(CredentialError::NameNotFound {
                    name: name.as_str().to_string(),
                })
            }
            (None, Mode::Register) => match self.store.create_identity(name.as_str(), pin).await {
                Ok(identity) => Ok((identity, false)),
                Err(StoreError::NameTaken { .. }) => {
                    info!(
                        "authenticate: {} was registered meanwhile",
                        name.as_str()
                    );
                    self.check_credential(name, pin)
                        .await?
                        .map(|identity| (identity, true))
                }
                Err(e) => return Err(e).context(StorageSnafu),
            },
            (Some(_), _) => self
                .check_credential(name, pin)
                .await?
                .map(|identity| (identity, true)),
        };
        let (identity, returning) = match checked {
            Ok(found) => found,
            Err(rejection) => return Ok(AuthOutcome::Rejected(rejection)),
        };

        let mut allocation = match self.engine.get(&identity.id) {
            Some(current) if returning => current.clone(),
            _ => self.engine.fresh_allocation(),
        };
        let reconciled = if returning {
            match self.store.fetch_votes(&identity.id).await {
                Ok(remote) if remote.is_empty() => None,
                Ok(remote) => Some(adopt(&identity.id, &mut allocation, &remote)),
                Err(e) => {
                    warn!(
                        "authenticate: could not read the votes of {}: {}",
                        identity.name, e
                    );
                    None
                }
            }
        } else {
            None
        };

        let profile = ActiveProfile {
            identity: identity.clone(),
            avatar_url: avatar_url(&identity.name),
        };
        self.commit(profile, allocation)?;
        info!(
            "authenticate: {} ({}) is active, returning: {}",
            identity.name, identity.id, returning
        );
        Ok(AuthOutcome::Welcome {
            identity,
            returning,
            reconciled,
        })
    }

    pub fn set_candidate_votes(
        &mut self,
        candidate: &CandidateId,
        requested: i64,
    ) -> VoteResult<VoteUpdate> {
        self.mutate(|a| a.set_candidate_votes(candidate, requested))
    }

    pub fn increment(&mut self, candidate: &CandidateId) -> VoteResult<VoteUpdate> {
        self.mutate(|a| a.increment(candidate))
    }

    pub fn decrement(&mut self, candidate: &CandidateId) -> VoteResult<VoteUpdate> {
        self.mutate(|a| a.decrement(candidate))
    }

    /// Returns the number of votes remaining, which is the whole budget.
    pub fn reset_all(&mut self) -> VoteResult<u64> {
        self.mutate(|a| {
            a.reset_all();
            Ok(a.votes_remaining())
        })
    }

    /// Replaces the submitted votes of the active profile with the local
    /// allocation, then adopts what the store returns.
    ///
    /// If the store refuses the write, the local allocation is left as it was.
    pub async fn submit(&mut self) -> VoteResult<SubmitReport> {
        let (profile, mut allocation) = self.staged()?;
        let id = profile.identity.id.clone();
        let records = allocation.submission_records(&id);
        info!("submit: {} rows for {}", records.len(), id);
        self.store
            .replace_votes(&id, &records)
            .await
            .context(StorageSnafu)?;

        let refreshed = match self.store.fetch_votes(&id).await {
            Ok(remote) => {
                adopt(&id, &mut allocation, &remote);
                self.commit(profile, allocation)?;
                true
            }
            Err(e) => {
                warn!("submit: keeping the local votes, read back failed: {}", e);
                false
            }
        };
        Ok(SubmitReport {
            records_sent: records.len(),
            refreshed,
        })
    }

    /// Adopts the submitted votes of the active profile.
    pub async fn refresh(&mut self) -> VoteResult<ReconcileReport> {
        let (profile, mut allocation) = self.staged()?;
        let remote = self
            .store
            .fetch_votes(&profile.identity.id)
            .await
            .context(StorageSnafu)?;
        let report = adopt(&profile.identity.id, &mut allocation, &remote);
        self.commit(profile, allocation)?;
        Ok(report)
    }

    /// Forgets the active profile. Submitted votes stay in the store.
    pub fn logout(&mut self) -> VoteResult<Option<Identity>> {
        self.cache.clear().context(StorageSnafu)?;
        let previous = self.active.take();
        if let Some(p) = previous.as_ref() {
            self.engine.remove(&p.identity.id);
            info!("logout: {}", p.identity.name);
        }
        Ok(previous.map(|p| p.identity))
    }

    async fn check_credential(
        &self,
        name: &ProfileName,
        pin: Option<&Pin>,
    ) -> VoteResult<Result<Identity, CredentialError>> {
        let valid = self
            .store
            .verify_credential(name.as_str(), pin)
            .await
            .context(StorageSnafu)?;
        if !valid {
            info!("authenticate: wrong PIN for {}", name.as_str());
            return Ok(Err(CredentialError::InvalidPin {
                name: name.as_str().to_string(),
            }));
        }
        let found = self
            .store
            .find_identity(name.as_str())
            .await
            .context(StorageSnafu)?;
        Ok(found.ok_or_else(|| CredentialError::NameNotFound {
            name: name.as_str().to_string(),
        }))
    }

    // A working copy of the active profile and its allocation.
    fn staged(&self) -> VoteResult<(ActiveProfile, Allocation)> {
        let profile = self.active.clone().context(NotLoggedInSnafu)?;
        let allocation = self.allocation()?.clone();
        Ok((profile, allocation))
    }

    // The change only reaches the engine if it can be saved.
    fn mutate<T, F>(&mut self, op: F) -> VoteResult<T>
    where
        F: FnOnce(&mut Allocation) -> Result<T, AllocationErrors>,
    {
        let (profile, mut allocation) = self.staged()?;
        let res = op(&mut allocation).context(BudgetSnafu)?;
        if let Err(e) = self.commit(profile, allocation) {
            warn!("mutate: the change could not be saved and is dropped: {}", e);
            return Err(e);
        }
        Ok(res)
    }

    // Saves the record first. The session is only updated once it is saved.
    fn commit(&mut self, profile: ActiveProfile, allocation: Allocation) -> VoteResult<()> {
        let record = CachedUserData::from_allocation(
            &profile.identity,
            Some(profile.avatar_url.clone()),
            &allocation,
        );
        self.cache.write(&record).context(StorageSnafu)?;
        if let Some(previous) = self.active.as_ref() {
            if previous.identity.id != profile.identity.id {
                debug!("commit: leaving {}", previous.identity.name);
                self.engine.remove(&previous.identity.id);
            }
        }
        self.engine.restore(&profile.identity.id, allocation);
        self.active = Some(profile);
        Ok(())
    }
}

fn adopt(
    identity: &IdentityId,
    allocation: &mut Allocation,
    remote: &HashMap<CandidateId, u64>,
) -> ReconcileReport {
    let report = allocation.reconcile_from_remote(remote);
    info!(
        "adopt: {}: adopted {} remote entries",
        identity, report.adopted
    );
    report
}
