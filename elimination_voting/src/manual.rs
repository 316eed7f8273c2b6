/*!

This is the long-form manual for `elimination_voting` and `stvmanip`.

## The voting rule

The library tabulates a sequential plurality-elimination election (single-seat
STV, also known as instant-runoff without surplus transfer). Each round
computes every active alternative's plurality score: the total weight of the
ballots that currently rank it first. The round then removes

* every alternative with a zero score, if there is any, or otherwise
* every alternative tied for the minimum score.

Removed alternatives are struck out of all rankings; ballot types whose
ranking becomes empty leave the profile together with their voters. The run
ends when one alternative remains (the winner) or when an entire round's
removal set covers all remaining alternatives (a tie, reported as the set
stood before that round).

## The manipulation experiment

`run_manipulation` measures how far a coordinated coalition can move this
outcome. For a target alternative `x` and a fixed anchor alternative, the
coalition is every ballot type that ranks `x` strictly ahead of the anchor
(or ranks `x` and truncates before the anchor). Each trial replaces all
coalition rankings with one linear order of the domain alternatives and runs
the election; all `|domain|!` orders are tried, and the distribution of
outcomes is returned. With the default domain of nine alternatives this is
362,880 elections per target, which is why the search fans out with rayon by
default.

## Input format

One ballot type per line, as in the election data files of the reference
data set:

```text
# comments start with a hash
3:{1,2,3}
2:{2,3,1}
4:{3,1,2}
```

The number before the colon is the count of voters sharing the ranking; the
brace-delimited list is their ranking, most preferred first, using integer
alternative identifiers. Rankings may be truncated.

## Example

```
use elimination_voting::*;

let universe: Vec<Alternative> = (1..=3).map(Alternative).collect();
let profile = Profile::parse("3:{1,2,3}\n2:{2,3,1}\n4:{3,1,2}\n", universe)?;

let record = run_election(&profile)?;
assert_eq!(record.outcome, ElectionOutcome::Decided(Alternative(3)));

let rules = ManipulationRules {
    anchor: Alternative(2),
    domain: (1..=3).map(Alternative).collect(),
    parallel: Parallel::No,
};
let report = run_manipulation(&profile, Alternative(1), &rules)?;
assert_eq!(report.trials, 6);
# Ok::<(), VotingErrors>(())
```

*/
