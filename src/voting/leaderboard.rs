// The live aggregate of the submitted votes.

use std::time::Duration;

use log::debug;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use vote_budget::{Candidate, CandidateId, IdentityId, LeaderboardEntry};

use crate::voting::store_common::*;

/// The scale of the bars when nobody has voted yet.
const EMPTY_SCALE: u64 = 100;

/// One line of the leaderboard, ready to display.
#[derive(PartialEq, Debug, Clone)]
pub struct Standing {
    pub rank: usize,
    pub candidate: CandidateId,
    pub name: String,
    pub total_votes: u64,
    /// Relative to the highest total.
    pub percentage: f64,
}

pub fn standings(entries: &[LeaderboardEntry], candidates: &[Candidate]) -> Vec<Standing> {
    let scale = entries
        .iter()
        .map(|e| e.total_votes)
        .max()
        .filter(|m| *m > 0)
        .unwrap_or(EMPTY_SCALE);
    entries
        .iter()
        .enumerate()
        .map(|(idx, e)| Standing {
            rank: idx + 1,
            candidate: e.candidate.clone(),
            name: candidates
                .iter()
                .find(|c| c.id == e.candidate)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| e.candidate.to_string()),
            total_votes: e.total_votes,
            percentage: (e.total_votes as f64) * 100.0 / (scale as f64),
        })
        .collect()
}

enum Wake {
    Changed(IdentityId),
    Lagged(u64),
    Closed,
    Tick,
}

impl From<Result<VoteChangeNotice, RecvError>> for Wake {
    fn from(res: Result<VoteChangeNotice, RecvError>) -> Wake {
        match res {
            Ok(notice) => Wake::Changed(notice.identity),
            Err(RecvError::Lagged(n)) => Wake::Lagged(n),
            Err(RecvError::Closed) => Wake::Closed,
        }
    }
}

/// Re-queries the whole leaderboard every time the votes change.
///
/// Notifications only say that something changed: the feed never patches
/// the previous result, it always reads the aggregate again.
pub struct LeaderboardFeed<'a, S: RemoteVoteStore> {
    store: &'a S,
    changes: broadcast::Receiver<VoteChangeNotice>,
    poll: Option<Interval>,
}

impl<'a, S: RemoteVoteStore> LeaderboardFeed<'a, S> {
    /// With a polling period, the feed also wakes up on a timer. This picks up
    /// the writes of other processes, which do not notify.
    pub fn new(store: &'a S, poll_every: Option<Duration>) -> LeaderboardFeed<'a, S> {
        let poll = poll_every.map(|period| {
            let mut poll = interval_at(Instant::now() + period, period);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            poll
        });
        LeaderboardFeed {
            store,
            changes: store.subscribe_to_vote_changes(),
            poll,
        }
    }

    pub async fn current(&self) -> StoreResult<Vec<LeaderboardEntry>> {
        self.store.fetch_leaderboard().await
    }

    /// Waits for the next change and returns the new aggregate.
    ///
    /// Returns None once the store stops sending notifications.
    pub async fn next_update(&mut self) -> Option<StoreResult<Vec<LeaderboardEntry>>> {
        let wake = match self.poll.as_mut() {
            Some(poll) => tokio::select! {
                res = self.changes.recv() => Wake::from(res),
                _ = poll.tick() => Wake::Tick,
            },
            None => Wake::from(self.changes.recv().await),
        };
        match wake {
            Wake::Closed => {
                debug!("next_update: the store closed the notifications");
                return None;
            }
            Wake::Lagged(n) => debug!("next_update: {} notices were missed", n),
            Wake::Tick => debug!("next_update: polling"),
            Wake::Changed(identity) => debug!("next_update: votes of {} changed", identity),
        }
        self.drain();
        Some(self.current().await)
    }

    // One query covers every notice already queued.
    fn drain(&mut self) {
        let mut skipped = 0;
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => skipped += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if skipped > 0 {
            debug!("drain: {} duplicate notices", skipped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voting::store_memory::MemoryBackend;
    use tokio::time::timeout;
    use vote_budget::VoteRecord;

    fn entry(c: &str, n: u64) -> LeaderboardEntry {
        LeaderboardEntry {
            candidate: CandidateId::from(c),
            total_votes: n,
        }
    }

    async fn vote(store: &MemoryBackend, who: &str, c: &str, n: u64) {
        let id = IdentityId::from(who);
        store
            .replace_votes(
                &id,
                &[VoteRecord {
                    identity: id.clone(),
                    candidate: CandidateId::from(c),
                    count: n,
                }],
            )
            .await
            .unwrap();
    }

    #[test]
    fn standings_are_relative_to_the_leader() {
        let candidates = vec![Candidate::new("c1", "Candidate 1"), Candidate::new("c2", "Candidate 2")];
        let rows = standings(&[entry("c2", 80), entry("c1", 20), entry("c9", 10)], &candidates);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].name, "Candidate 2");
        assert_eq!(rows[0].percentage, 100.0);
        assert_eq!(rows[1].percentage, 25.0);
        assert_eq!(rows[2].name, "c9");
        assert_eq!(rows[2].rank, 3);
    }

    #[test]
    fn empty_board() {
        assert!(standings(&[], &[]).is_empty());
        let rows = standings(&[entry("c1", 0)], &[]);
        assert_eq!(rows[0].percentage, 0.0);
    }

    #[tokio::test]
    async fn one_query_for_a_burst_of_changes() {
        let store = MemoryBackend::new();
        let mut feed = LeaderboardFeed::new(&store, None);
        vote(&store, "u1", "c1", 10).await;
        vote(&store, "u2", "c1", 5).await;
        vote(&store, "u3", "c2", 30).await;

        let board = feed.next_update().await.unwrap().unwrap();
        assert_eq!(board, vec![entry("c2", 30), entry("c1", 15)]);

        let quiet = timeout(Duration::from_millis(50), feed.next_update()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn polling_wakes_up_without_notices() {
        let store = MemoryBackend::new();
        let mut feed = LeaderboardFeed::new(&store, Some(Duration::from_millis(20)));
        let board = timeout(Duration::from_secs(2), feed.next_update())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(board.is_empty());
    }
}
