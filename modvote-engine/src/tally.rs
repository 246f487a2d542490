//! Vote tally
//!
//! Pure aggregation of vote records into per-resolution voter lists plus
//! leader and tie detection. Groups keep first-appearance order, which is
//! also the order tied resolutions are reported in.

use modvote_common::{Resolution, VoteRecord};
use serde::Serialize;
use std::collections::HashSet;

/// Voters backing one resolution, in the order they voted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionVotes {
    pub resolution: Resolution,
    pub voters: Vec<String>,
}

/// Aggregated vote state for one escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    /// Distinct voters across all resolutions
    pub total_votes: usize,
    /// Groups in first-appearance order
    pub by_resolution: Vec<ResolutionVotes>,
    /// Sole resolution with the highest count; `None` when empty or tied
    pub leader: Option<Resolution>,
    /// Highest per-resolution count (shared max when tied)
    pub leader_count: usize,
    pub is_tied: bool,
    pub tied_resolutions: Vec<Resolution>,
}

impl Tally {
    /// Tally stored vote records in the order given
    pub fn from_records(records: &[VoteRecord]) -> Self {
        tally(records.iter().map(|r| (r.voter_id.as_str(), r.resolution)))
    }

    /// Number of voters for a resolution
    pub fn count(&self, resolution: Resolution) -> usize {
        self.voters(resolution).map_or(0, |v| v.len())
    }

    pub fn voters(&self, resolution: Resolution) -> Option<&[String]> {
        self.by_resolution
            .iter()
            .find(|group| group.resolution == resolution)
            .map(|group| group.voters.as_slice())
    }
}

/// Aggregate `(voter_id, resolution)` pairs
///
/// A voter holding votes for two resolutions counts once in `total_votes`
/// but appears in both groups.
pub fn tally<'a, I>(votes: I) -> Tally
where
    I: IntoIterator<Item = (&'a str, Resolution)>,
{
    let mut by_resolution: Vec<ResolutionVotes> = Vec::new();
    let mut distinct_voters: HashSet<&'a str> = HashSet::new();

    for (voter_id, resolution) in votes {
        distinct_voters.insert(voter_id);

        match by_resolution.iter_mut().find(|g| g.resolution == resolution) {
            Some(group) => group.voters.push(voter_id.to_string()),
            None => by_resolution.push(ResolutionVotes {
                resolution,
                voters: vec![voter_id.to_string()],
            }),
        }
    }

    let mut leader_count = 0;
    let mut tied_resolutions: Vec<Resolution> = Vec::new();

    for group in &by_resolution {
        let count = group.voters.len();
        if count > leader_count {
            leader_count = count;
            tied_resolutions = vec![group.resolution];
        } else if count == leader_count && count > 0 {
            tied_resolutions.push(group.resolution);
        }
    }

    let is_tied = tied_resolutions.len() > 1;
    let leader = if is_tied {
        None
    } else {
        tied_resolutions.first().copied()
    };

    Tally {
        total_votes: distinct_voters.len(),
        by_resolution,
        leader,
        leader_count,
        is_tied,
        tied_resolutions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Resolution::*;

    #[test]
    fn test_empty_tally() {
        let result = tally(std::iter::empty());

        assert_eq!(result.total_votes, 0);
        assert!(result.by_resolution.is_empty());
        assert_eq!(result.leader, None);
        assert_eq!(result.leader_count, 0);
        assert!(!result.is_tied);
        assert!(result.tied_resolutions.is_empty());
    }

    #[test]
    fn test_single_vote_leads() {
        let result = tally([("alice", Ban)]);

        assert_eq!(result.total_votes, 1);
        assert_eq!(result.leader, Some(Ban));
        assert_eq!(result.leader_count, 1);
        assert!(!result.is_tied);
        assert_eq!(result.tied_resolutions, vec![Ban]);
    }

    #[test]
    fn test_total_counts_distinct_voters() {
        let result = tally([("alice", Kick), ("alice", Ban), ("bob", Ban)]);

        assert_eq!(result.total_votes, 2);
        assert_eq!(result.count(Kick), 1);
        assert_eq!(result.count(Ban), 2);
        assert_eq!(result.voters(Ban).unwrap(), ["alice", "bob"]);
        assert_eq!(result.leader, Some(Ban));
    }

    #[test]
    fn test_two_way_tie_in_first_appearance_order() {
        let result = tally([("alice", Kick), ("bob", Timeout)]);

        assert!(result.is_tied);
        assert_eq!(result.leader, None);
        assert_eq!(result.leader_count, 1);
        assert_eq!(result.tied_resolutions, vec![Kick, Timeout]);
    }

    #[test]
    fn test_three_way_tie() {
        let result = tally([("a", Ban), ("b", Kick), ("c", Track)]);

        assert!(result.is_tied);
        assert_eq!(result.tied_resolutions.len(), 3);
        assert_eq!(result.tied_resolutions, vec![Ban, Kick, Track]);
    }

    #[test]
    fn test_clear_leader_over_singletons() {
        let result = tally([("a", Ban), ("b", Ban), ("c", Kick), ("d", Restrict)]);

        assert_eq!(result.leader, Some(Ban));
        assert_eq!(result.leader_count, 2);
        assert!(!result.is_tied);
        assert_eq!(result.tied_resolutions, vec![Ban]);
        assert_eq!(result.total_votes, 4);
    }

    #[test]
    fn test_later_group_overtakes_earlier_tie() {
        let result = tally([("a", Kick), ("b", Ban), ("c", Timeout), ("d", Timeout)]);

        assert_eq!(result.leader, Some(Timeout));
        assert_eq!(result.tied_resolutions, vec![Timeout]);
    }

    #[test]
    fn test_groups_keep_insertion_order() {
        let result = tally([("a", Restrict), ("b", Ban), ("c", Restrict)]);

        let order: Vec<Resolution> = result.by_resolution.iter().map(|g| g.resolution).collect();
        assert_eq!(order, vec![Restrict, Ban]);
        assert_eq!(result.voters(Restrict).unwrap(), ["a", "c"]);
    }
}
