//! The `.info` metadata sidecar that accompanies a dictionary.
//!
//! Plain `key=value` lines with `#` comments, using the historical
//! `fsa.dict.*` option names so existing sidecar files keep working.

use indexmap::IndexMap;
use std::io::BufRead;
use std::path::Path;

use fs_err as fs;
use std::io::BufReader;

use crate::Error;

pub const SEPARATOR_OPTION: &str = "fsa.dict.separator";
pub const ENCODING_OPTION: &str = "fsa.dict.encoding";
pub const FREQUENCY_OPTION: &str = "fsa.dict.frequency-included";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DictInfo {
    options: IndexMap<String, String>,
}

impl DictInfo {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::from_reader(BufReader::new(fs::File::open(path.as_ref())?))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut options = IndexMap::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => {
                    options.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => {
                    return Err(Error::MalformedInput(format!(
                        "expected 'key=value', got '{}'",
                        line
                    )))
                }
            }
        }

        Ok(DictInfo { options })
    }

    pub fn get(&self, option: &str) -> Option<&str> {
        self.options.get(option).map(|x| x.as_str())
    }

    pub fn has(&self, option: &str) -> bool {
        self.options.contains_key(option)
    }

    pub fn is_true(&self, option: &str) -> bool {
        self.get(option) == Some("true")
    }

    /// The separator between word and frequency class, where configured.
    pub fn separator(&self) -> Option<&str> {
        self.get(SEPARATOR_OPTION).filter(|x| !x.is_empty())
    }

    pub fn frequency_included(&self) -> bool {
        self.is_true(FREQUENCY_OPTION)
    }
}
