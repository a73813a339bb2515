use clap::Parser;
use ltdev::ngram::{FrequencyIndexer, WriterMode};
use std::path::PathBuf;

/// Builds per-file ngram frequency indexes from Google Books dump files.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Directory with the (sorted) `*.gz` dump files.
    input_dir: PathBuf,
    /// Directory the per-file index directories are created in.
    index_dir: PathBuf,
    /// Write aggregated TSV files instead of binary indexes.
    #[clap(long)]
    text: bool,
}

fn main() -> Result<(), ltdev::Error> {
    env_logger::init();
    let opts = Opts::parse();

    let mode = if opts.text {
        WriterMode::Text
    } else {
        WriterMode::Binary
    };
    FrequencyIndexer::new(mode).run(&opts.input_dir, &opts.index_dir)
}
