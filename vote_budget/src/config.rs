// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The stable short identifier of a candidate (for example `c1`).
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for CandidateId {
    fn from(s: &str) -> CandidateId {
        CandidateId(s.to_string())
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The opaque identifier assigned to a profile by the profile store.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct IdentityId(pub String);

impl IdentityId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> IdentityId {
        IdentityId(s.to_string())
    }
}

impl Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A candidate of the current round. The candidate set is configuration and
/// does not change while a round is running.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub profile_pic: Option<String>,
    pub url: Option<String>,
}

impl Candidate {
    pub fn new(id: &str, name: &str) -> Candidate {
        Candidate {
            id: CandidateId::from(id),
            name: name.to_string(),
            profile_pic: None,
            url: None,
        }
    }
}

/// A submitted row: the count that one identity gives to one candidate.
///
/// Rows with a zero count are never produced: the absence of a row means zero.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct VoteRecord {
    pub identity: IdentityId,
    pub candidate: CandidateId,
    pub count: u64,
}

// ******** Output data structures *********

/// Aggregate of all the submitted counts for a candidate, across identities.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LeaderboardEntry {
    pub candidate: CandidateId,
    pub total_votes: u64,
}

/// What happened to a single vote request.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoteUpdate {
    pub candidate: CandidateId,
    /// The value asked for by the caller, before flooring and clamping.
    pub requested: i64,
    /// The value that was committed.
    pub applied: u64,
    /// True if the request had to be reduced to fit in the budget.
    pub clamped: bool,
    pub votes_remaining: u64,
}

impl VoteUpdate {
    /// The whole budget is allocated. Callers may surface this as a notice,
    /// it is not an error.
    pub fn budget_exhausted(&self) -> bool {
        self.votes_remaining == 0
    }
}

/// Statistics about a reconciliation with the remote state.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Number of remote entries that were applied.
    pub adopted: usize,
    /// Remote entries for candidates outside of the current candidate set.
    pub ignored_unknown: Vec<CandidateId>,
    /// Remote entries that had to be reduced to fit in the budget.
    pub clamped: Vec<CandidateId>,
}

/// Errors that prevent an allocation operation from completing.
///
/// Over-budget requests are not errors: they are clamped.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AllocationErrors {
    EmptyCandidateSet,
    DuplicateCandidate(CandidateId),
    UnknownCandidate(CandidateId),
    UnknownIdentity(IdentityId),
}

impl Error for AllocationErrors {}

impl Display for AllocationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationErrors::EmptyCandidateSet => write!(f, "no candidates are registered"),
            AllocationErrors::DuplicateCandidate(cid) => {
                write!(f, "candidate {} is registered more than once", cid)
            }
            AllocationErrors::UnknownCandidate(cid) => write!(f, "unknown candidate {}", cid),
            AllocationErrors::UnknownIdentity(iid) => {
                write!(f, "no allocation for identity {}", iid)
            }
        }
    }
}

// ********* Configuration **********

/// The rules of a voting round.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BudgetRules {
    /// The number of votes each identity may distribute across all the candidates.
    pub total_votes: u64,
}

impl BudgetRules {
    pub const DEFAULT_RULES: BudgetRules = BudgetRules { total_votes: 100 };
}

impl Default for BudgetRules {
    fn default() -> Self {
        BudgetRules::DEFAULT_RULES
    }
}
