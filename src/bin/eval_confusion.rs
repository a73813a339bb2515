use clap::Parser;
use fs_err as fs;
use ltdev::confusion::{ConfusionEvaluator, DEFAULT_FACTORS};
use ltdev::ngram::LanguageModel;
use ltdev::types::ConfusionPair;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Sweeps a confusion pair over trigger factors and reports precision and
/// recall for each, as lines ready to paste into a confusion-set file.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    word1: String,
    word2: String,
    /// Directory with the `1grams`/`2grams`/`3grams` indexes.
    #[clap(long, short)]
    index_dir: PathBuf,
    /// Sentences really containing word1, one per line.
    #[clap(long)]
    word1_sentences: PathBuf,
    /// Sentences really containing word2, one per line.
    #[clap(long)]
    word2_sentences: PathBuf,
    /// Only check replacing word1 with word2, not the other direction.
    #[clap(long)]
    directed: bool,
    /// Factors to sweep; the usual powers of ten when omitted.
    #[clap(long)]
    factors: Vec<u64>,
}

fn read_sentences(path: &Path) -> Result<Vec<String>, ltdev::Error> {
    BufReader::new(fs::File::open(path)?)
        .lines()
        .map(|line| line.map_err(ltdev::Error::from))
        .collect()
}

fn main() -> Result<(), ltdev::Error> {
    env_logger::init();
    let opts = Opts::parse();

    let model = LanguageModel::open(&opts.index_dir)?;
    let factors = if opts.factors.is_empty() {
        DEFAULT_FACTORS.to_vec()
    } else {
        opts.factors.clone()
    };

    let pair = ConfusionPair::new(&opts.word1, &opts.word2, factors[0], !opts.directed);
    let word1_sentences = read_sentences(&opts.word1_sentences)?;
    let word2_sentences = read_sentences(&opts.word2_sentences)?;

    let results = ConfusionEvaluator::new(&model, &factors).run(
        &pair,
        &word1_sentences,
        &word2_sentences,
    );
    for result in results.values() {
        println!("{}", result.summary);
    }
    Ok(())
}
