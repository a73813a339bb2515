use clap::Parser;
use fs_err as fs;
use ltdev::diff::{find_diffs, write_report, ParseResult};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Diffs two checker runs. Inputs are either the checker's text output or
/// aggregated JSON lines (`.json`).
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Output of the old run.
    old: PathBuf,
    /// Output of the new run.
    new: PathBuf,
    /// Report file; stdout when omitted.
    #[clap(long, short)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), ltdev::Error> {
    env_logger::init();
    let opts = Opts::parse();

    let old = ParseResult::from_path(&opts.old)?;
    let new = ParseResult::from_path(&opts.new)?;
    let diffs = find_diffs(&old.matches, &new.matches);

    match &opts.output {
        Some(output) => {
            let mut writer = BufWriter::new(fs::File::create(output)?);
            write_report(&diffs, &old.build_dates, &new.build_dates, &mut writer)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            write_report(&diffs, &old.build_dates, &new.build_dates, stdout.lock())?;
        }
    }
    Ok(())
}
