mod config;
pub mod manual;

use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;

use std::{
    collections::{HashMap, HashSet},
    ops::{Add, AddAssign},
};

pub use crate::config::*;

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct Weight(u64);

impl Weight {
    const EMPTY: Weight = Weight(0);
}

impl std::iter::Sum for Weight {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Weight(iter.map(|w| w.0).sum())
    }
}

impl AddAssign for Weight {
    fn add_assign(&mut self, rhs: Weight) {
        self.0 += rhs.0;
    }
}

impl Add for Weight {
    type Output = Weight;
    fn add(self: Weight, rhs: Weight) -> Weight {
        Weight(self.0 + rhs.0)
    }
}

// Invariant: the ranking is never empty. A ballot whose last entry gets
// eliminated is dropped from the working profile instead.
#[derive(Eq, PartialEq, Debug, Clone)]
struct BallotState {
    ranking: Vec<Alternative>,
    weight: Weight,
}

impl BallotState {
    fn head(&self) -> Alternative {
        self.ranking[0]
    }
}

/// The mutable state of one election run: a deep copy of the original ballots
/// plus the still-active alternatives.
///
/// Checking out a fresh copy from the immutable [`Profile`] is the reset
/// operation. It restores both the ballots and the active set, so mutation
/// can never leak from one run into the next.
#[derive(Eq, PartialEq, Debug, Clone)]
struct WorkingProfile {
    ballots: Vec<BallotState>,
    active: Vec<Alternative>,
}

impl WorkingProfile {
    fn checkout(profile: &Profile) -> WorkingProfile {
        WorkingProfile {
            ballots: profile
                .ballots()
                .iter()
                .map(|b| BallotState {
                    ranking: b.ranking.clone(),
                    weight: Weight(b.weight),
                })
                .collect(),
            active: profile.universe().to_vec(),
        }
    }
}

/// Plurality tally over the active alternatives, in stored active order.
/// Alternatives that no ballot currently ranks first get an explicit zero.
fn compute_tally(working: &WorkingProfile) -> Vec<(Alternative, Weight)> {
    let mut by_head: HashMap<Alternative, Weight> = HashMap::new();
    for ballot in working.ballots.iter() {
        *by_head.entry(ballot.head()).or_insert(Weight::EMPTY) += ballot.weight;
    }
    working
        .active
        .iter()
        .map(|alt| (*alt, by_head.get(alt).copied().unwrap_or(Weight::EMPTY)))
        .collect()
}

/// Selects the alternatives to remove this round.
///
/// Zero-score alternatives take strict priority: as long as any active
/// alternative has no first-place support, exactly those are removed. Only
/// when every score is positive does the minimum-score tie group go.
fn find_removal_set(tally: &[(Alternative, Weight)]) -> Vec<Alternative> {
    let zero_votes: Vec<Alternative> = tally
        .iter()
        .filter(|(_, w)| *w == Weight::EMPTY)
        .map(|(alt, _)| *alt)
        .collect();
    if !zero_votes.is_empty() {
        return zero_votes;
    }
    let min_votes: Weight = tally.iter().map(|(_, w)| *w).min().unwrap();
    tally
        .iter()
        .filter(|(_, w)| *w == min_votes)
        .map(|(alt, _)| *alt)
        .collect()
}

/// Runs one elimination round in place and returns its statistics.
///
/// Weights are never touched: stripping eliminated alternatives out of the
/// rankings only ever deletes whole exhausted ballot types.
fn run_one_round(working: &mut WorkingProfile, round_id: u32) -> RoundStats {
    let tally = compute_tally(working);
    debug!("run_one_round: round {} tally: {:?}", round_id, tally);
    let eliminated = find_removal_set(&tally);
    assert!(
        !eliminated.is_empty(),
        "No alternative to remove in round {}",
        round_id
    );

    working.active.retain(|alt| !eliminated.contains(alt));
    for ballot in working.ballots.iter_mut() {
        ballot.ranking.retain(|alt| !eliminated.contains(alt));
    }
    working.ballots.retain(|b| !b.ranking.is_empty());

    RoundStats {
        round: round_id,
        tally: tally.iter().map(|(alt, w)| (*alt, w.0)).collect(),
        eliminated,
    }
}

/// Runs the elimination election over a fresh working copy of the profile.
///
/// Rounds repeat until a single alternative remains (`Decided`) or an entire
/// round's removal set equals the remaining active set (`Tied`, reported as
/// the active set stood before that round). A one-alternative profile is
/// decided without any elimination round.
pub fn run_election(profile: &Profile) -> Result<ElectionRecord, VotingErrors> {
    let mut working = WorkingProfile::checkout(profile);
    run_election_working(&mut working)
}

fn run_election_working(working: &mut WorkingProfile) -> Result<ElectionRecord, VotingErrors> {
    if working.active.is_empty() || working.ballots.is_empty() {
        return Err(VotingErrors::EmptyProfile);
    }
    debug!(
        "run_election: {} ballot types over {} alternatives",
        working.ballots.len(),
        working.active.len()
    );

    // Every round removes at least one alternative, so the loop is bounded by
    // the universe size.
    let max_rounds = working.active.len() as u32;
    let mut rounds: Vec<RoundStats> = Vec::new();
    loop {
        if working.active.len() == 1 {
            return Ok(ElectionRecord {
                outcome: ElectionOutcome::Decided(working.active[0]),
                rounds,
            });
        }
        if rounds.len() as u32 >= max_rounds {
            return Err(VotingErrors::NoConvergence);
        }
        let round_id = rounds.len() as u32 + 1;
        let before = working.active.clone();
        let stats = run_one_round(working, round_id);
        debug!(
            "run_election: round {} eliminated {:?}",
            round_id, stats.eliminated
        );
        assert!(
            working.active.len() < before.len(),
            "The number of active alternatives did not decrease: {:?} -> {:?}",
            before,
            working.active
        );
        rounds.push(stats);
        if working.active.is_empty() {
            return Ok(ElectionRecord {
                outcome: ElectionOutcome::tied(before),
                rounds,
            });
        }
    }
}

/// Does this ranking place `target` strictly ahead of `anchor`? A ranking
/// that includes `target` but truncates before ever listing `anchor` counts
/// as well.
fn prefers(ranking: &[Alternative], target: Alternative, anchor: Alternative) -> bool {
    match ranking.iter().position(|&alt| alt == target) {
        None => false,
        Some(target_pos) => match ranking.iter().position(|&alt| alt == anchor) {
            None => true,
            Some(anchor_pos) => target_pos < anchor_pos,
        },
    }
}

/// One manipulation trial: substitute `insincere` into every coalition ballot
/// of a fresh working copy, then run the election to its terminal state.
fn run_trial(
    profile: &Profile,
    target: Alternative,
    anchor: Alternative,
    insincere: &[Alternative],
) -> Result<ElectionOutcome, VotingErrors> {
    let mut working = WorkingProfile::checkout(profile);
    for ballot in working.ballots.iter_mut() {
        if prefers(&ballot.ranking, target, anchor) {
            ballot.ranking = insincere.to_vec();
        }
    }
    run_election_working(&mut working).map(|record| record.outcome)
}

fn check_manipulation_target(
    profile: &Profile,
    target: Alternative,
    rules: &ManipulationRules,
) -> Result<(), VotingErrors> {
    if target == rules.anchor {
        return Err(VotingErrors::InvalidTarget {
            target,
            detail: "the target equals the anchor".to_string(),
        });
    }
    if !rules.domain.contains(&target) {
        return Err(VotingErrors::InvalidTarget {
            target,
            detail: format!("the target is not in the domain {:?}", rules.domain),
        });
    }
    let mut seen: HashSet<Alternative> = HashSet::new();
    for alt in rules.domain.iter() {
        if !profile.universe().contains(alt) {
            return Err(VotingErrors::InvalidTarget {
                target,
                detail: format!("domain alternative {} is not in the universe", alt),
            });
        }
        if !seen.insert(*alt) {
            return Err(VotingErrors::InvalidTarget {
                target,
                detail: format!("domain alternative {} appears twice", alt),
            });
        }
    }
    Ok(())
}

fn merge_tallies(
    mut acc: HashMap<ElectionOutcome, u64>,
    other: HashMap<ElectionOutcome, u64>,
) -> HashMap<ElectionOutcome, u64> {
    for (outcome, count) in other {
        *acc.entry(outcome).or_insert(0) += count;
    }
    acc
}

/// Measures how manipulable the election is in favor of `target`.
///
/// Every linear order of `rules.domain` is tried in turn as the coordinated
/// insincere ranking of the coalition that prefers `target` over the anchor,
/// and the outcome of each resulting election is tallied. Trials are
/// independent by construction: each one checks out its own working copy of
/// the profile, so the search parallelizes over permutations without shared
/// state, and an error in any trial aborts the whole batch.
pub fn run_manipulation(
    profile: &Profile,
    target: Alternative,
    rules: &ManipulationRules,
) -> Result<ManipulationReport, VotingErrors> {
    check_manipulation_target(profile, target, rules)?;

    let coalition_weight: u64 = profile
        .ballots()
        .iter()
        .filter(|b| prefers(&b.ranking, target, rules.anchor))
        .map(|b| b.weight)
        .sum();

    let insincere_rankings: Vec<Vec<Alternative>> = rules
        .domain
        .iter()
        .copied()
        .permutations(rules.domain.len())
        .collect();
    info!(
        "run_manipulation: target {}, anchor {}, coalition weight {}, {} rankings to try",
        target,
        rules.anchor,
        coalition_weight,
        insincere_rankings.len()
    );

    let tally: HashMap<ElectionOutcome, u64> = match rules.parallel {
        Parallel::No => {
            let mut tally: HashMap<ElectionOutcome, u64> = HashMap::new();
            for ranking in insincere_rankings.iter() {
                let outcome = run_trial(profile, target, rules.anchor, ranking)?;
                *tally.entry(outcome).or_insert(0) += 1;
            }
            tally
        }
        Parallel::Rayon => insincere_rankings
            .par_iter()
            .map(|ranking| run_trial(profile, target, rules.anchor, ranking))
            .try_fold(HashMap::new, |mut tally, outcome| {
                let outcome = outcome?;
                *tally.entry(outcome).or_insert(0u64) += 1;
                Ok(tally)
            })
            .try_reduce(HashMap::new, |a, b| Ok(merge_tallies(a, b)))?,
    };

    let trials: u64 = tally.values().sum();
    let mut outcomes: Vec<(ElectionOutcome, u64)> = tally.into_iter().collect();
    outcomes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(ManipulationReport {
        target,
        anchor: rules.anchor,
        coalition_weight,
        trials,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alts(ids: &[u32]) -> Vec<Alternative> {
        ids.iter().map(|&id| Alternative(id)).collect()
    }

    fn profile(ballots: &[(&[u32], u64)], universe: &[u32]) -> Profile {
        let weighted = ballots
            .iter()
            .map(|(ranking, weight)| WeightedBallot {
                ranking: alts(ranking),
                weight: *weight,
            })
            .collect();
        Profile::new(weighted, alts(universe)).unwrap()
    }

    fn rules(anchor: u32, domain: &[u32], parallel: Parallel) -> ManipulationRules {
        ManipulationRules {
            anchor: Alternative(anchor),
            domain: alts(domain),
            parallel,
        }
    }

    #[test]
    fn worked_example() {
        let p = profile(&[(&[1, 2, 3], 3), (&[2, 3, 1], 2), (&[3, 1, 2], 4)], &[1, 2, 3]);
        let record = run_election(&p).unwrap();
        assert_eq!(record.outcome, ElectionOutcome::Decided(Alternative(3)));
        assert_eq!(record.rounds.len(), 2);
        assert_eq!(
            record.rounds[0].tally,
            vec![(Alternative(1), 3), (Alternative(2), 2), (Alternative(3), 4)]
        );
        assert_eq!(record.rounds[0].eliminated, alts(&[2]));
        assert_eq!(
            record.rounds[1].tally,
            vec![(Alternative(1), 3), (Alternative(3), 6)]
        );
        assert_eq!(record.rounds[1].eliminated, alts(&[1]));
    }

    #[test]
    fn single_alternative_decided_without_rounds() {
        let p = profile(&[(&[1], 7)], &[1]);
        let record = run_election(&p).unwrap();
        assert_eq!(record.outcome, ElectionOutcome::Decided(Alternative(1)));
        assert!(record.rounds.is_empty());
    }

    #[test]
    fn total_tie_detected() {
        let p = profile(&[(&[1, 2], 5), (&[2, 1], 5)], &[1, 2]);
        let record = run_election(&p).unwrap();
        assert_eq!(record.outcome, ElectionOutcome::tied(alts(&[1, 2])));
        assert_eq!(record.rounds.len(), 1);
        assert_eq!(record.rounds[0].eliminated, alts(&[1, 2]));
    }

    #[test]
    fn zero_score_removed_before_minimum() {
        // 3 has no first-place support; 2 holds the minimum positive score.
        // Only 3 may go in the first round.
        let p = profile(&[(&[1, 3], 5), (&[2, 3], 1)], &[1, 2, 3]);
        let record = run_election(&p).unwrap();
        assert_eq!(record.rounds[0].eliminated, alts(&[3]));
        assert_eq!(record.rounds[1].eliminated, alts(&[2]));
        assert_eq!(record.outcome, ElectionOutcome::Decided(Alternative(1)));
    }

    #[test]
    fn unranked_alternatives_drop_in_first_round() {
        // 4 and 5 appear on no ballot at all.
        let p = profile(&[(&[1, 2], 3), (&[2, 1], 2), (&[3, 1], 1)], &[1, 2, 3, 4, 5]);
        let record = run_election(&p).unwrap();
        assert_eq!(record.rounds[0].eliminated, alts(&[4, 5]));
    }

    #[test]
    fn empty_profile_rejected() {
        let p = Profile::new(Vec::new(), alts(&[1, 2])).unwrap();
        assert_eq!(run_election(&p), Err(VotingErrors::EmptyProfile));
    }

    #[test]
    fn election_is_deterministic() {
        let p = profile(
            &[(&[1, 2, 3, 4], 3), (&[2, 3], 3), (&[3, 4, 1], 2), (&[4, 1], 2)],
            &[1, 2, 3, 4],
        );
        let first = run_election(&p).unwrap();
        let second = run_election(&p).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn weights_conserved_across_rounds() {
        // No truncated ballots, so no ballot type can exhaust before the end:
        // every round's tally must sum to the full voter count.
        let p = profile(
            &[(&[1, 2, 3, 4], 4), (&[2, 1, 4, 3], 3), (&[3, 4, 2, 1], 2), (&[4, 3, 1, 2], 2)],
            &[1, 2, 3, 4],
        );
        let record = run_election(&p).unwrap();
        for stat in record.rounds.iter() {
            let total: u64 = stat.tally.iter().map(|(_, count)| count).sum();
            assert_eq!(total, p.total_weight(), "round {}", stat.round);
        }
    }

    #[test]
    fn active_set_shrinks_every_round() {
        let p = profile(
            &[(&[1, 2, 3, 4], 4), (&[2, 3], 3), (&[3, 1], 2), (&[4, 2], 1)],
            &[1, 2, 3, 4],
        );
        let record = run_election(&p).unwrap();
        assert!(record.rounds.len() <= p.universe().len());
        for window in record.rounds.windows(2) {
            assert!(window[1].tally.len() < window[0].tally.len());
        }
    }

    #[test]
    fn truncated_ballots_exhaust_whole() {
        let p = profile(&[(&[1], 2), (&[2, 3], 3), (&[3], 4)], &[1, 2, 3]);
        let record = run_election(&p).unwrap();
        assert_eq!(record.outcome, ElectionOutcome::Decided(Alternative(3)));
        // The weight of the exhausted `[1]` ballots leaves the tally with them.
        let total_round_2: u64 = record.rounds[1].tally.iter().map(|(_, c)| c).sum();
        assert_eq!(total_round_2, 7);
    }

    #[test]
    fn parse_skips_comments_and_zero_counts() {
        let text = "# comment\n3:{1,2,3}\n\n0:{2,1,3}\n2:{2,3}\n";
        let p = Profile::parse(text, alts(&[1, 2, 3])).unwrap();
        assert_eq!(p.ballots().len(), 2);
        assert_eq!(p.total_weight(), 5);
        assert_eq!(p.ballots()[1].ranking, alts(&[2, 3]));
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        let universe = alts(&[1, 2, 3]);
        for text in ["3 {1,2}", "x:{1,2}", "3:{1,a}", "3:{}"] {
            match Profile::parse(text, universe.clone()) {
                Err(VotingErrors::MalformedLine { line: 1, .. }) => {}
                other => panic!("expected a malformed line for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn new_rejects_invalid_ballots() {
        let universe = alts(&[1, 2]);
        let cases = vec![
            WeightedBallot { ranking: alts(&[1, 1]), weight: 2 },
            WeightedBallot { ranking: alts(&[1, 3]), weight: 2 },
            WeightedBallot { ranking: alts(&[1, 2]), weight: 0 },
            WeightedBallot { ranking: Vec::new(), weight: 2 },
        ];
        for ballot in cases {
            let res = Profile::new(vec![ballot.clone()], universe.clone());
            assert!(
                matches!(res, Err(VotingErrors::InvalidBallot { .. })),
                "expected rejection of {:?}",
                ballot
            );
        }
    }

    #[test]
    fn manipulation_tally_is_complete() {
        let p = profile(
            &[(&[2, 3, 1], 4), (&[1, 2, 3], 3), (&[3, 2, 1], 2)],
            &[1, 2, 3, 4],
        );
        let report =
            run_manipulation(&p, Alternative(1), &rules(2, &[1, 2, 3, 4], Parallel::No)).unwrap();
        assert_eq!(report.trials, 24);
        let total: u64 = report.outcomes.iter().map(|(_, count)| count).sum();
        assert_eq!(total, 24);
    }

    #[test]
    fn manipulation_trials_are_independent() {
        let p = profile(&[(&[2, 3, 1], 4), (&[1, 2, 3], 3), (&[3, 2, 1], 2)], &[1, 2, 3]);
        let r = rules(2, &[1, 2, 3], Parallel::No);
        let first = run_manipulation(&p, Alternative(1), &r).unwrap();
        let second = run_manipulation(&p, Alternative(1), &r).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn manipulation_can_flip_the_outcome() {
        // Sincere winner is 2, but the coalition preferring 1 over 2 can
        // throw its weight behind 3 and flip the election.
        let p = profile(&[(&[2, 3, 1], 4), (&[1, 2, 3], 3), (&[3, 2, 1], 2)], &[1, 2, 3]);
        let sincere = run_election(&p).unwrap();
        assert_eq!(sincere.outcome, ElectionOutcome::Decided(Alternative(2)));

        let report =
            run_manipulation(&p, Alternative(1), &rules(2, &[1, 2, 3], Parallel::No)).unwrap();
        assert_eq!(report.coalition_weight, 3);
        let observed: Vec<&ElectionOutcome> =
            report.outcomes.iter().map(|(outcome, _)| outcome).collect();
        assert!(observed.contains(&&ElectionOutcome::Decided(Alternative(2))));
        assert!(observed.contains(&&ElectionOutcome::Decided(Alternative(3))));
    }

    #[test]
    fn manipulation_with_empty_coalition_is_constant() {
        // Nobody ranks 3 ahead of the anchor 1, so every trial replays the
        // sincere election.
        let p = profile(&[(&[1, 2, 3], 4), (&[2, 1, 3], 2)], &[1, 2, 3]);
        let report =
            run_manipulation(&p, Alternative(3), &rules(1, &[1, 2, 3], Parallel::No)).unwrap();
        assert_eq!(report.coalition_weight, 0);
        let sincere = run_election(&p).unwrap();
        assert_eq!(report.outcomes, vec![(sincere.outcome, 6)]);
    }

    #[test]
    fn serial_and_rayon_searches_agree() {
        let p = profile(
            &[(&[2, 3, 1], 4), (&[1, 2, 3, 4], 3), (&[3, 2], 2), (&[4, 1], 2)],
            &[1, 2, 3, 4],
        );
        let serial =
            run_manipulation(&p, Alternative(1), &rules(2, &[1, 2, 3, 4], Parallel::No)).unwrap();
        let parallel =
            run_manipulation(&p, Alternative(1), &rules(2, &[1, 2, 3, 4], Parallel::Rayon))
                .unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn invalid_targets_rejected_before_any_trial() {
        let p = profile(&[(&[1, 2, 3], 4)], &[1, 2, 3]);
        let cases = vec![
            (Alternative(2), rules(2, &[1, 2, 3], Parallel::No)),
            (Alternative(1), rules(2, &[2, 3], Parallel::No)),
            (Alternative(1), rules(2, &[1, 2, 2, 3], Parallel::No)),
            (Alternative(1), rules(2, &[1, 2, 9], Parallel::No)),
        ];
        for (target, r) in cases {
            let res = run_manipulation(&p, target, &r);
            assert!(
                matches!(res, Err(VotingErrors::InvalidTarget { .. })),
                "expected rejection of target {} with domain {:?}",
                target,
                r.domain
            );
        }
    }

    #[test]
    fn prefers_handles_truncation() {
        let ranking = alts(&[3, 1]);
        assert!(prefers(&ranking, Alternative(3), Alternative(1)));
        assert!(prefers(&ranking, Alternative(1), Alternative(8)));
        assert!(!prefers(&ranking, Alternative(8), Alternative(1)));
        assert!(!prefers(&ranking, Alternative(1), Alternative(3)));
    }

    #[test]
    fn default_rules_match_the_reference_setup() {
        let r = ManipulationRules::default();
        assert_eq!(r.anchor, Alternative(8));
        assert_eq!(r.domain, alts(&[1, 2, 3, 4, 5, 6, 7, 8, 9]));
    }

    #[test]
    fn tied_outcomes_compare_order_free() {
        assert_eq!(
            ElectionOutcome::tied(alts(&[2, 1])),
            ElectionOutcome::tied(alts(&[1, 2]))
        );
        assert_eq!(ElectionOutcome::tied(alts(&[2, 1])).to_string(), "{1,2}");
    }
}
