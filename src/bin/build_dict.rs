use clap::Parser;
use fs_err as fs;
use ltdev::dict::DictionaryBuilder;
use log::info;
use std::io::BufReader;
use std::path::PathBuf;

/// Builds a binary dictionary from plain-text dumps, optionally merging in
/// a frequency list.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Dump files: one word per line, or `word\tlemma\ttag` lines.
    #[clap(required = true)]
    dumps: Vec<PathBuf>,
    /// Frequency list with `<w f="123">word</w>` entries.
    #[clap(long)]
    freq_list: Option<PathBuf>,
    /// Path of the binary dictionary to write.
    #[clap(long, short)]
    output: PathBuf,
}

fn main() -> Result<(), ltdev::Error> {
    env_logger::init();
    let opts = Opts::parse();

    let mut builder = DictionaryBuilder::new();
    for dump in &opts.dumps {
        builder.read_dump(BufReader::new(fs::File::open(dump)?))?;
    }
    if let Some(freq_list) = &opts.freq_list {
        let stats = builder.read_freq_list(BufReader::new(fs::File::open(freq_list)?))?;
        info!(
            "applied {} frequency entries, {} unmatched",
            stats.applied, stats.unmatched
        );
    }

    let dict = builder.build()?;
    info!("writing {} words to {}", dict.len(), opts.output.display());
    dict.write_to(&opts.output)
}
