pub use crate::config::*;
use crate::AllocationEngine;

/// A builder for setting up a voting round.
///
/// ```
/// pub use vote_budget::builder::Builder;
/// pub use vote_budget::BudgetRules;
/// # use vote_budget::{AllocationErrors, CandidateId, IdentityId};
///
/// let mut engine = Builder::new(&BudgetRules::DEFAULT_RULES)?
///     .candidates(&["Anna".to_string(), "Bob".to_string()])?
///     .build()?;
///
/// let me = IdentityId::from("me");
/// engine.initialize(&me);
/// let update = engine.set_candidate_votes(&me, &CandidateId::from("Anna"), 120)?;
/// assert_eq!(update.applied, 100);
///
/// # Ok::<(), AllocationErrors>(())
/// ```
pub struct Builder {
    pub(crate) _rules: BudgetRules,
    pub(crate) _candidates: Vec<Candidate>,
}

impl Builder {
    pub fn new(rules: &BudgetRules) -> Result<Builder, AllocationErrors> {
        Ok(Builder {
            _rules: rules.clone(),
            _candidates: Vec::new(),
        })
    }

    /// Registers candidates by name. The name is also used as the identifier.
    pub fn candidates(self, cands: &[String]) -> Result<Builder, AllocationErrors> {
        Ok(Builder {
            _rules: self._rules,
            _candidates: cands
                .iter()
                .map(|name| Candidate::new(name, name))
                .collect(),
        })
    }

    /// Adds a fully described candidate.
    pub fn add_candidate(&mut self, candidate: &Candidate) -> Result<(), AllocationErrors> {
        if self._candidates.iter().any(|c| c.id == candidate.id) {
            return Err(AllocationErrors::DuplicateCandidate(candidate.id.clone()));
        }
        self._candidates.push(candidate.clone());
        Ok(())
    }

    pub fn total_votes(self, total_votes: u64) -> Builder {
        Builder {
            _rules: BudgetRules { total_votes },
            _candidates: self._candidates,
        }
    }

    pub fn build(self) -> Result<AllocationEngine, AllocationErrors> {
        AllocationEngine::new(&self._rules, &self._candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_custom_budget() {
        let mut b = Builder::new(&BudgetRules::DEFAULT_RULES)
            .unwrap()
            .total_votes(10);
        b.add_candidate(&Candidate::new("c1", "Candidate 1")).unwrap();
        b.add_candidate(&Candidate::new("c2", "Candidate 2")).unwrap();
        assert!(b.add_candidate(&Candidate::new("c1", "Again")).is_err());
        let engine = b.build().unwrap();
        assert_eq!(engine.rules().total_votes, 10);
        assert_eq!(engine.candidates().len(), 2);
    }

    #[test]
    fn empty_builder_fails() {
        let res = Builder::new(&BudgetRules::DEFAULT_RULES).unwrap().build();
        assert_eq!(res.unwrap_err(), AllocationErrors::EmptyCandidateSet);
    }
}
