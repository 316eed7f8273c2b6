// ********* Input data structures ***********

use std::collections::HashSet;
use std::error::Error;
use std::fmt::Display;

/// An alternative (a candidate) in the election, identified by a small integer.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Alternative(pub u32);

impl Display for Alternative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ballot type: a strict ranking over a subset of the alternatives,
/// most preferred first, shared by `weight` identical voters.
///
/// Rankings may be truncated: alternatives a voter did not rank are simply
/// absent. The weight rides along with its ranking in a single record.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct WeightedBallot {
    pub ranking: Vec<Alternative>,
    pub weight: u64,
}

/// The immutable election profile: the deduplicated ballot types and the full
/// universe of alternatives.
///
/// A profile is never mutated after construction. Every election run and
/// every manipulation trial checks out its own working copy, so no run can
/// leak state into the next one.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Profile {
    ballots: Vec<WeightedBallot>,
    universe: Vec<Alternative>,
}

impl Profile {
    /// Builds a profile after validating the ballots against the universe.
    pub fn new(
        ballots: Vec<WeightedBallot>,
        universe: Vec<Alternative>,
    ) -> Result<Profile, VotingErrors> {
        let mut known: HashSet<Alternative> = HashSet::new();
        for alt in universe.iter() {
            if !known.insert(*alt) {
                return Err(VotingErrors::InvalidBallot {
                    detail: format!("alternative {} appears twice in the universe", alt),
                });
            }
        }
        for ballot in ballots.iter() {
            if ballot.weight == 0 {
                return Err(VotingErrors::InvalidBallot {
                    detail: format!("ballot {:?} has zero weight", ballot.ranking),
                });
            }
            if ballot.ranking.is_empty() {
                return Err(VotingErrors::InvalidBallot {
                    detail: "ballot with an empty ranking".to_string(),
                });
            }
            let mut seen: HashSet<Alternative> = HashSet::new();
            for alt in ballot.ranking.iter() {
                if !known.contains(alt) {
                    return Err(VotingErrors::InvalidBallot {
                        detail: format!("alternative {} is not in the universe", alt),
                    });
                }
                if !seen.insert(*alt) {
                    return Err(VotingErrors::InvalidBallot {
                        detail: format!("alternative {} is ranked twice", alt),
                    });
                }
            }
        }
        Ok(Profile { ballots, universe })
    }

    /// Parses the line-oriented ballot format: one `count:{a,b,c,...}` ballot
    /// type per line, lines starting with `#` ignored.
    ///
    /// Ballot types with a zero count have no voters behind them and are
    /// dropped. File access is left to the caller.
    pub fn parse(text: &str, universe: Vec<Alternative>) -> Result<Profile, VotingErrors> {
        let mut ballots: Vec<WeightedBallot> = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (count_part, ranking_part) = line
                .split_once(':')
                .ok_or_else(|| malformed_line(idx + 1, raw))?;
            let weight = count_part
                .trim()
                .parse::<u64>()
                .map_err(|_| malformed_line(idx + 1, raw))?;
            let inner = ranking_part.replace(|c| c == '{' || c == '}', "");
            let mut ranking: Vec<Alternative> = Vec::new();
            for token in inner.split(',') {
                let id = token
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| malformed_line(idx + 1, raw))?;
                ranking.push(Alternative(id));
            }
            if weight == 0 {
                continue;
            }
            ballots.push(WeightedBallot { ranking, weight });
        }
        Profile::new(ballots, universe)
    }

    pub fn ballots(&self) -> &[WeightedBallot] {
        &self.ballots
    }

    pub fn universe(&self) -> &[Alternative] {
        &self.universe
    }

    /// Total number of voters behind the profile.
    pub fn total_weight(&self) -> u64 {
        self.ballots.iter().map(|b| b.weight).sum()
    }
}

fn malformed_line(line: usize, content: &str) -> VotingErrors {
    VotingErrors::MalformedLine {
        line,
        content: content.to_string(),
    }
}

// ******** Output data structures *********

/// The terminal state of an election run.
///
/// `Tied` reports the alternatives that were all eliminated together in the
/// final round, as they stood before that round. The set is kept sorted so
/// equal outcomes compare and hash equal.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub enum ElectionOutcome {
    Decided(Alternative),
    Tied(Vec<Alternative>),
}

impl ElectionOutcome {
    pub fn tied(mut alternatives: Vec<Alternative>) -> ElectionOutcome {
        alternatives.sort();
        ElectionOutcome::Tied(alternatives)
    }
}

impl Display for ElectionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionOutcome::Decided(alt) => write!(f, "{}", alt),
            ElectionOutcome::Tied(alts) => {
                write!(f, "{{")?;
                for (idx, alt) in alts.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", alt)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Statistics for one elimination round.
///
/// The tally covers every alternative active at the start of the round, in
/// the stored active order, including those with a zero plurality score.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RoundStats {
    pub round: u32,
    pub tally: Vec<(Alternative, u64)>,
    pub eliminated: Vec<Alternative>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionRecord {
    pub outcome: ElectionOutcome,
    pub rounds: Vec<RoundStats>,
}

/// Outcome tally of a manipulation search for one target.
///
/// `outcomes` maps every election outcome observed across the permutation
/// trials to the number of trials that produced it, sorted by descending
/// count. The counts sum to `trials`, the factorial of the domain size.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ManipulationReport {
    pub target: Alternative,
    pub anchor: Alternative,
    /// Total weight of the ballot types whose voters join the manipulation.
    pub coalition_weight: u64,
    pub trials: u64,
    pub outcomes: Vec<(ElectionOutcome, u64)>,
}

/// Errors that prevent the algorithms from completing successfully.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum VotingErrors {
    /// A ballot line that cannot be split into a count and a ranking.
    MalformedLine { line: usize, content: String },
    /// A ballot that violates the profile invariants.
    InvalidBallot { detail: String },
    /// An election invoked on a profile with no ballots or no alternatives.
    EmptyProfile,
    /// A manipulation target that is not usable with the given rules.
    InvalidTarget { target: Alternative, detail: String },
    /// The elimination loop exceeded its round bound.
    NoConvergence,
}

impl Error for VotingErrors {}

impl Display for VotingErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotingErrors::MalformedLine { line, content } => {
                write!(f, "malformed ballot line {}: {:?}", line, content)
            }
            VotingErrors::InvalidBallot { detail } => write!(f, "invalid ballot: {}", detail),
            VotingErrors::EmptyProfile => write!(f, "election run on an empty profile"),
            VotingErrors::InvalidTarget { target, detail } => {
                write!(f, "invalid manipulation target {}: {}", target, detail)
            }
            VotingErrors::NoConvergence => write!(f, "elimination did not converge"),
        }
    }
}

// ********* Configuration **********

/// Whether the permutation search runs on a single thread or fans out with
/// rayon. Both modes produce identical tallies.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Parallel {
    No,
    Rayon,
}

/// The parameters of a manipulation search.
///
/// `domain` is the subset of alternatives whose linear orders are enumerated;
/// `anchor` is the fixed reference alternative that defines the coalition:
/// every ballot type ranking the target strictly ahead of the anchor (or
/// ranking the target while omitting the anchor) takes part.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ManipulationRules {
    pub anchor: Alternative,
    pub domain: Vec<Alternative>,
    pub parallel: Parallel,
}

impl Default for ManipulationRules {
    fn default() -> ManipulationRules {
        ManipulationRules {
            anchor: Alternative(8),
            domain: (1..=9).map(Alternative).collect(),
            parallel: Parallel::Rayon,
        }
    }
}
