use clap::Parser;
use ltdev::ngram::TextIndexer;
use std::path::PathBuf;

/// Counts 1/2/3-grams in plain-text files and builds the `1grams`, `2grams`
/// and `3grams` indexes from them.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Plain-text input files, one sentence or paragraph per line.
    #[clap(required = true)]
    inputs: Vec<PathBuf>,
    /// Directory the per-order index directories are created in.
    #[clap(long, short)]
    index_dir: PathBuf,
    /// Number of distinct trigrams buffered in memory before a flush.
    #[clap(long, default_value = "1000000")]
    cache_limit: usize,
}

fn main() -> Result<(), ltdev::Error> {
    env_logger::init();
    let opts = Opts::parse();

    let mut indexer = TextIndexer::new(&opts.index_dir)?.with_cache_limit(opts.cache_limit);
    for input in &opts.inputs {
        indexer.index_file(input)?;
    }
    indexer.finish()
}
