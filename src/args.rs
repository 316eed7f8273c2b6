use clap::Parser;

/// Manipulability analysis for single-winner elimination elections.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The ballot file: one `count:{a,b,c,...}` ballot type per line,
    /// lines starting with '#' are ignored.
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (file path, 'stdout' or empty) If specified, the JSON summary is written to the
    /// given location instead of the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, stvmanip will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (alternative id) Only analyze this manipulation target. By default every
    /// domain alternative except the anchor is analyzed in turn.
    #[clap(short, long, value_parser)]
    pub target: Option<u32>,

    /// (alternative id, default 8) The reference alternative that defines the
    /// manipulating coalition: the voters ranking the target ahead of the anchor.
    #[clap(long, value_parser)]
    pub anchor: Option<u32>,

    /// (comma-separated ids, default 1,...,9) The alternatives whose linear orders
    /// are enumerated during the manipulation search.
    #[clap(long, value_parser, use_value_delimiter = true)]
    pub domain: Option<Vec<u32>>,

    /// Tabulate the sincere election round by round, without any manipulation search.
    #[clap(long, takes_value = false)]
    pub tabulate_only: bool,

    /// Run the permutation search on a single thread.
    #[clap(long, takes_value = false)]
    pub sequential: bool,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
