use clap::Parser;
use fs_err as fs;
use ltdev::dict::{DictInfo, Dictionary};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Exports a binary dictionary back to plain text.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// The binary dictionary.
    dict: PathBuf,
    /// Output file; stdout when omitted.
    #[clap(long, short)]
    output: Option<PathBuf>,
    /// Write frequency class letters in a second column.
    #[clap(long)]
    freq: bool,
    /// `.info` metadata sidecar; when given, `fsa.dict.frequency-included`
    /// overrides --freq.
    #[clap(long)]
    info: Option<PathBuf>,
}

fn main() -> Result<(), ltdev::Error> {
    env_logger::init();
    let opts = Opts::parse();

    let with_freq = match &opts.info {
        Some(info) => DictInfo::from_path(info)?.frequency_included(),
        None => opts.freq,
    };

    let dict = Dictionary::open(&opts.dict)?;
    match &opts.output {
        Some(output) => {
            let mut writer = BufWriter::new(fs::File::create(output)?);
            dict.export(&mut writer, with_freq)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            dict.export(stdout.lock(), with_freq)?;
        }
    }
    Ok(())
}
