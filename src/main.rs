use clap::Parser;
use snafu::ErrorCompat;

mod analysis;
mod args;

use crate::args::Args;

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = analysis::run_analysis(&args) {
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
