use log::{info, warn};

use elimination_voting::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;

/// The alternative universe of the reference data set.
const UNIVERSE_SIZE: u32 = 11;
/// Alternatives above this id occur too rarely to matter for the search.
const DEFAULT_DOMAIN_SIZE: u32 = 9;
const DEFAULT_ANCHOR: u32 = 8;

#[derive(Debug, Snafu)]
pub enum AnalysisError {
    #[snafu(display("Error opening ballot file {path}"))]
    OpeningBallots {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening summary file {path}"))]
    OpeningSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing summary file {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Tabulation failed: {source}"))]
    Voting { source: VotingErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

type AnalysisResult<T> = Result<T, AnalysisError>;

/// The configuration block echoed into the JSON summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub input: String,
    pub anchor: u32,
    pub domain: Vec<u32>,
    #[serde(rename = "ballotTypes")]
    pub ballot_types: usize,
    #[serde(rename = "totalWeight")]
    pub total_weight: u64,
}

pub fn read_ballot_file(path: &str) -> AnalysisResult<Profile> {
    let contents = fs::read_to_string(path).context(OpeningBallotsSnafu { path })?;
    let universe: Vec<Alternative> = (1..=UNIVERSE_SIZE).map(Alternative).collect();
    Profile::parse(&contents, universe).context(VotingSnafu)
}

fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

fn election_to_json(record: &ElectionRecord) -> JSValue {
    let mut rounds: Vec<JSValue> = Vec::new();
    for stat in record.rounds.iter() {
        let mut tally: JSMap<String, JSValue> = JSMap::new();
        for (alt, count) in stat.tally.iter() {
            tally.insert(alt.to_string(), json!(count.to_string()));
        }
        let eliminated: Vec<String> = stat.eliminated.iter().map(|alt| alt.to_string()).collect();
        rounds.push(json!({"round": stat.round, "tally": tally, "eliminated": eliminated}));
    }
    json!({"outcome": record.outcome.to_string(), "rounds": rounds})
}

fn manipulation_to_json(reports: &[ManipulationReport]) -> JSValue {
    let mut l: Vec<JSValue> = Vec::new();
    for report in reports.iter() {
        let mut outcomes: JSMap<String, JSValue> = JSMap::new();
        for (outcome, count) in report.outcomes.iter() {
            outcomes.insert(outcome.to_string(), json!(count.to_string()));
        }
        l.push(json!({
            "target": report.target.to_string(),
            "coalitionWeight": report.coalition_weight.to_string(),
            "trials": report.trials.to_string(),
            "outcomes": outcomes,
        }));
    }
    json!(l)
}

fn write_summary(out: &Option<String>, pretty: &str) -> AnalysisResult<()> {
    match out.as_deref() {
        None | Some("stdout") => {
            println!("summary:{}", pretty);
        }
        Some(path) => {
            fs::write(path, pretty).context(WritingSummarySnafu { path })?;
        }
    }
    Ok(())
}

// The reference summary, if provided for comparison.
fn check_reference(path: &str, computed: &str) -> AnalysisResult<()> {
    let contents = fs::read_to_string(path).context(OpeningSummarySnafu { path })?;
    let reference: JSValue = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    let pretty_reference = serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {})?;
    if pretty_reference != computed {
        warn!("Found differences with the reference summary");
        print_diff(pretty_reference.as_str(), computed, "\n");
        whatever!("Difference detected between the computed summary and the reference summary");
    }
    Ok(())
}

pub fn run_analysis(args: &Args) -> AnalysisResult<()> {
    let profile = read_ballot_file(&args.input)?;
    info!(
        "run_analysis: {} ballot types, total weight {}",
        profile.ballots().len(),
        profile.total_weight()
    );

    let anchor = Alternative(args.anchor.unwrap_or(DEFAULT_ANCHOR));
    let domain: Vec<Alternative> = match &args.domain {
        Some(ids) => ids.iter().map(|&id| Alternative(id)).collect(),
        None => (1..=DEFAULT_DOMAIN_SIZE).map(Alternative).collect(),
    };

    let config = OutputConfig {
        input: simplify_file_name(&args.input),
        anchor: anchor.0,
        domain: domain.iter().map(|alt| alt.0).collect(),
        ballot_types: profile.ballots().len(),
        total_weight: profile.total_weight(),
    };

    let summary_js = if args.tabulate_only {
        let record = run_election(&profile).context(VotingSnafu)?;
        info!("run_analysis: outcome {}", record.outcome);
        json!({"config": config, "election": election_to_json(&record)})
    } else {
        let rules = ManipulationRules {
            anchor,
            domain: domain.clone(),
            parallel: if args.sequential {
                Parallel::No
            } else {
                Parallel::Rayon
            },
        };
        let targets: Vec<Alternative> = match args.target {
            Some(id) => vec![Alternative(id)],
            None => domain.iter().copied().filter(|&alt| alt != anchor).collect(),
        };
        let mut reports: Vec<ManipulationReport> = Vec::new();
        for target in targets {
            info!("run_analysis: searching insincere rankings for target {}", target);
            reports.push(run_manipulation(&profile, target, &rules).context(VotingSnafu)?);
        }
        json!({"config": config, "manipulation": manipulation_to_json(&reports)})
    };

    let pretty = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;
    write_summary(&args.out, &pretty)?;

    if let Some(reference) = &args.reference {
        check_reference(reference, &pretty)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# a comment\n3:{1,2,3}\n2:{2,3,1}\n4:{3,1,2}\n";

    fn sample_profile() -> Profile {
        let universe = (1..=3).map(Alternative).collect();
        Profile::parse(SAMPLE, universe).unwrap()
    }

    #[test]
    fn sample_file_parses() {
        let profile = sample_profile();
        assert_eq!(profile.ballots().len(), 3);
        assert_eq!(profile.total_weight(), 9);
    }

    #[test]
    fn election_summary_shape() {
        let record = run_election(&sample_profile()).unwrap();
        let js = election_to_json(&record);
        assert_eq!(js["outcome"], json!("3"));
        assert_eq!(js["rounds"][0]["tally"]["2"], json!("2"));
        assert_eq!(js["rounds"][0]["eliminated"], json!(["2"]));
        assert_eq!(js["rounds"][1]["eliminated"], json!(["1"]));
    }

    #[test]
    fn manipulation_summary_shape() {
        let rules = ManipulationRules {
            anchor: Alternative(2),
            domain: (1..=3).map(Alternative).collect(),
            parallel: Parallel::No,
        };
        let report = run_manipulation(&sample_profile(), Alternative(1), &rules).unwrap();
        let js = manipulation_to_json(&[report]);
        assert_eq!(js[0]["target"], json!("1"));
        assert_eq!(js[0]["trials"], json!("6"));
        let outcomes = js[0]["outcomes"].as_object().unwrap();
        let total: u64 = outcomes
            .values()
            .map(|v| v.as_str().unwrap().parse::<u64>().unwrap())
            .sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn file_names_simplified_in_config() {
        assert_eq!(simplify_file_name("data/sample.toi"), "sample.toi");
        assert_eq!(simplify_file_name("sample.toi"), "sample.toi");
    }
}
