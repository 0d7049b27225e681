mod config;
use log::{debug, info, warn};

use std::{
    collections::{HashMap, HashSet},
    ops::{AddAssign, Sub},
};

pub mod builder;
pub mod manual;

pub use crate::config::*;

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u64);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);

    // Negative requests are floored at zero.
    fn from_request(requested: i64) -> VoteCount {
        VoteCount(requested.max(0) as u64)
    }
}

// Sums saturate at u64::MAX.
impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(VoteCount::EMPTY, |acc, vc| VoteCount(acc.0.saturating_add(vc.0)))
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for VoteCount {
    type Output = VoteCount;
    fn sub(self: VoteCount, rhs: VoteCount) -> VoteCount {
        VoteCount(self.0.saturating_sub(rhs.0))
    }
}

/// The allocation of one identity: how its budget is spread across the candidates.
///
/// Invariants, checked after every mutation:
/// - the sum of the counts never exceeds the budget
/// - the remaining count is always the budget minus the sum of the counts
/// - the keys are exactly the candidate set
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Allocation {
    total_votes: VoteCount,
    // Candidates in configuration order.
    order: Vec<CandidateId>,
    votes: HashMap<CandidateId, VoteCount>,
    votes_remaining: VoteCount,
}

impl Allocation {
    /// Creates a fresh allocation: every candidate at zero, the whole budget remaining.
    pub fn new(candidate_ids: &[CandidateId], total_votes: u64) -> Allocation {
        let mut order: Vec<CandidateId> = Vec::new();
        for cid in candidate_ids {
            if !order.contains(cid) {
                order.push(cid.clone());
            }
        }
        let votes = order
            .iter()
            .map(|cid| (cid.clone(), VoteCount::EMPTY))
            .collect();
        Allocation {
            total_votes: VoteCount(total_votes),
            order,
            votes,
            votes_remaining: VoteCount(total_votes),
        }
    }

    pub fn total_votes(&self) -> u64 {
        self.total_votes.0
    }

    pub fn votes_remaining(&self) -> u64 {
        self.votes_remaining.0
    }

    pub fn allocated(&self) -> u64 {
        self.allocated_count().0
    }

    /// The count for a candidate. Candidates outside of the set count as zero.
    pub fn votes_for(&self, candidate: &CandidateId) -> u64 {
        self.votes.get(candidate).map(|vc| vc.0).unwrap_or(0)
    }

    /// All the counts, in candidate order.
    pub fn iter(&self) -> impl Iterator<Item = (&CandidateId, u64)> + '_ {
        self.order
            .iter()
            .map(move |cid| (cid, self.votes.get(cid).map(|vc| vc.0).unwrap_or(0)))
    }

    pub fn candidates(&self) -> &[CandidateId] {
        &self.order
    }

    pub fn is_any_vote_cast(&self) -> bool {
        self.votes.values().any(|vc| *vc > VoteCount::EMPTY)
    }

    /// Sets the count of a candidate, clamping the request so that the budget holds.
    ///
    /// The same rule serves relative changes (`current ± 1`) and absolute
    /// targets (a slider). Clamping is silent: it is reported in the returned
    /// update, never as an error.
    pub fn set_candidate_votes(
        &mut self,
        candidate: &CandidateId,
        requested: i64,
    ) -> Result<VoteUpdate, AllocationErrors> {
        let current = *self
            .votes
            .get(candidate)
            .ok_or_else(|| AllocationErrors::UnknownCandidate(candidate.clone()))?;
        let floored = VoteCount::from_request(requested);
        let applied = self.clamp_for(floored, current);
        let clamped = applied < floored;
        if clamped {
            debug!(
                "set_candidate_votes: {}: request {} clamped to {:?}",
                candidate, requested, applied
            );
        }
        self.votes.insert(candidate.clone(), applied);
        self.recompute_remaining();
        Ok(VoteUpdate {
            candidate: candidate.clone(),
            requested,
            applied: applied.0,
            clamped,
            votes_remaining: self.votes_remaining.0,
        })
    }

    pub fn increment(&mut self, candidate: &CandidateId) -> Result<VoteUpdate, AllocationErrors> {
        let current = self.current_request(candidate)?;
        self.set_candidate_votes(candidate, current.saturating_add(1))
    }

    pub fn decrement(&mut self, candidate: &CandidateId) -> Result<VoteUpdate, AllocationErrors> {
        let current = self.current_request(candidate)?;
        self.set_candidate_votes(candidate, current.saturating_sub(1))
    }

    /// Puts every candidate back to zero.
    pub fn reset_all(&mut self) {
        for vc in self.votes.values_mut() {
            *vc = VoteCount::EMPTY;
        }
        self.recompute_remaining();
    }

    /// Adopts the remote state as the new local truth.
    ///
    /// This is a full replace: every candidate is zeroed first and then the
    /// remote entries are applied in candidate order, through the same clamp
    /// rule as user requests. A candidate without a remote entry stays at zero.
    pub fn reconcile_from_remote(&mut self, remote: &HashMap<CandidateId, u64>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut unknown: Vec<CandidateId> = remote
            .keys()
            .filter(|cid| !self.votes.contains_key(*cid))
            .cloned()
            .collect();
        unknown.sort();
        for cid in unknown.iter() {
            warn!(
                "reconcile_from_remote: ignoring votes for unknown candidate {}",
                cid
            );
        }
        report.ignored_unknown = unknown;

        for vc in self.votes.values_mut() {
            *vc = VoteCount::EMPTY;
        }
        for cid in self.order.clone().iter() {
            if let Some(&count) = remote.get(cid) {
                let requested = VoteCount(count);
                let applied = self.clamp_for(requested, VoteCount::EMPTY);
                if applied < requested {
                    warn!(
                        "reconcile_from_remote: remote count {} for {} exceeds the budget, clamped to {}",
                        count, cid, applied.0
                    );
                    report.clamped.push(cid.clone());
                }
                self.votes.insert(cid.clone(), applied);
                report.adopted += 1;
            }
        }
        self.recompute_remaining();
        report
    }

    /// The rows to send to the remote store for this allocation.
    ///
    /// Candidates at zero are not part of the submission.
    pub fn submission_records(&self, identity: &IdentityId) -> Vec<VoteRecord> {
        self.iter()
            .filter(|(_, count)| *count > 0)
            .map(|(cid, count)| VoteRecord {
                identity: identity.clone(),
                candidate: cid.clone(),
                count,
            })
            .collect()
    }

    fn allocated_count(&self) -> VoteCount {
        self.votes.values().cloned().sum()
    }

    fn current_request(&self, candidate: &CandidateId) -> Result<i64, AllocationErrors> {
        let current = self
            .votes
            .get(candidate)
            .ok_or_else(|| AllocationErrors::UnknownCandidate(candidate.clone()))?;
        Ok(i64::try_from(current.0).unwrap_or(i64::MAX))
    }

    // The largest value the candidate can hold given what the others already use.
    fn clamp_for(&self, requested: VoteCount, current: VoteCount) -> VoteCount {
        let allocated_to_others = self.allocated_count() - current;
        let available = self.total_votes - allocated_to_others;
        requested.min(available)
    }

    fn recompute_remaining(&mut self) {
        let allocated = self.allocated_count();
        assert!(
            allocated <= self.total_votes,
            "The allocation exceeds the budget: {:?} > {:?}",
            allocated,
            self.total_votes
        );
        self.votes_remaining = self.total_votes - allocated;
    }
}

/// Holds the allocations of every identity known to this process, for one
/// round (one budget and one candidate set).
#[derive(Debug, Clone)]
pub struct AllocationEngine {
    rules: BudgetRules,
    candidates: Vec<Candidate>,
    allocations: HashMap<IdentityId, Allocation>,
}

impl AllocationEngine {
    pub fn new(
        rules: &BudgetRules,
        candidates: &[Candidate],
    ) -> Result<AllocationEngine, AllocationErrors> {
        if candidates.is_empty() {
            return Err(AllocationErrors::EmptyCandidateSet);
        }
        let mut seen: HashSet<&CandidateId> = HashSet::new();
        for c in candidates.iter() {
            if !seen.insert(&c.id) {
                return Err(AllocationErrors::DuplicateCandidate(c.id.clone()));
            }
        }
        info!(
            "AllocationEngine: budget of {} votes across {} candidates",
            rules.total_votes,
            candidates.len()
        );
        for c in candidates.iter() {
            debug!("Candidate: {}: {}", c.id, c.name);
        }
        Ok(AllocationEngine {
            rules: rules.clone(),
            candidates: candidates.to_vec(),
            allocations: HashMap::new(),
        })
    }

    pub fn rules(&self) -> &BudgetRules {
        &self.rules
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidate(&self, cid: &CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == *cid)
    }

    fn candidate_ids(&self) -> Vec<CandidateId> {
        self.candidates.iter().map(|c| c.id.clone()).collect()
    }

    /// An allocation of this round with nothing cast, not held by the engine.
    pub fn fresh_allocation(&self) -> Allocation {
        Allocation::new(&self.candidate_ids(), self.rules.total_votes)
    }

    /// Creates a fresh allocation for the identity, replacing any previous one.
    pub fn initialize(&mut self, identity: &IdentityId) -> &Allocation {
        debug!("initialize: fresh allocation for {}", identity);
        let allocation = self.fresh_allocation();
        self.allocations.insert(identity.clone(), allocation);
        &self.allocations[identity]
    }

    /// Creates a fresh allocation only if the identity does not have one yet.
    pub fn ensure_initialized(&mut self, identity: &IdentityId) -> &Allocation {
        if !self.allocations.contains_key(identity) {
            return self.initialize(identity);
        }
        &self.allocations[identity]
    }

    pub fn get(&self, identity: &IdentityId) -> Option<&Allocation> {
        self.allocations.get(identity)
    }

    /// Drops the allocation of the identity.
    pub fn remove(&mut self, identity: &IdentityId) -> Option<Allocation> {
        self.allocations.remove(identity)
    }

    /// Installs an allocation for the identity, replacing any previous one.
    pub fn restore(&mut self, identity: &IdentityId, allocation: Allocation) {
        self.allocations.insert(identity.clone(), allocation);
    }

    pub fn set_candidate_votes(
        &mut self,
        identity: &IdentityId,
        candidate: &CandidateId,
        requested: i64,
    ) -> Result<VoteUpdate, AllocationErrors> {
        self.get_mut(identity)?
            .set_candidate_votes(candidate, requested)
    }

    pub fn increment(
        &mut self,
        identity: &IdentityId,
        candidate: &CandidateId,
    ) -> Result<VoteUpdate, AllocationErrors> {
        self.get_mut(identity)?.increment(candidate)
    }

    pub fn decrement(
        &mut self,
        identity: &IdentityId,
        candidate: &CandidateId,
    ) -> Result<VoteUpdate, AllocationErrors> {
        self.get_mut(identity)?.decrement(candidate)
    }

    pub fn reset_all(&mut self, identity: &IdentityId) -> Result<&Allocation, AllocationErrors> {
        let allocation = self.get_mut(identity)?;
        allocation.reset_all();
        Ok(allocation)
    }

    pub fn reconcile_from_remote(
        &mut self,
        identity: &IdentityId,
        remote: &HashMap<CandidateId, u64>,
    ) -> Result<ReconcileReport, AllocationErrors> {
        let report = self.get_mut(identity)?.reconcile_from_remote(remote);
        info!(
            "reconcile_from_remote: {}: adopted {} remote entries",
            identity, report.adopted
        );
        Ok(report)
    }

    pub fn submission_records(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<VoteRecord>, AllocationErrors> {
        self.allocations
            .get(identity)
            .map(|a| a.submission_records(identity))
            .ok_or_else(|| AllocationErrors::UnknownIdentity(identity.clone()))
    }

    fn get_mut(&mut self, identity: &IdentityId) -> Result<&mut Allocation, AllocationErrors> {
        self.allocations
            .get_mut(identity)
            .ok_or_else(|| AllocationErrors::UnknownIdentity(identity.clone()))
    }
}

/// Sums the submitted rows of every identity, per candidate.
///
/// Entries are sorted by decreasing total, ties broken by candidate id.
/// Candidates without any submitted vote do not appear.
pub fn tally_leaderboard(records: &[VoteRecord]) -> Vec<LeaderboardEntry> {
    let mut tally: HashMap<&CandidateId, VoteCount> = HashMap::new();
    for r in records.iter() {
        *tally.entry(&r.candidate).or_insert(VoteCount::EMPTY) += VoteCount(r.count);
    }
    let mut entries: Vec<LeaderboardEntry> = tally
        .into_iter()
        .filter(|(_, vc)| *vc > VoteCount::EMPTY)
        .map(|(cid, vc)| LeaderboardEntry {
            candidate: cid.clone(),
            total_votes: vc.0,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.total_votes
            .cmp(&a.total_votes)
            .then_with(|| a.candidate.cmp(&b.candidate))
    });
    debug!("tally_leaderboard: {} rows -> {:?}", records.len(), entries);
    entries
}
