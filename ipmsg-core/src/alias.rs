//! Alias store: flat text file mapping addresses to display names.
//!
//! One mapping per line, `<key> <value>`. Adding a pair appends both
//! directions (`address name` and `name address`) so either side resolves
//! the other. Example: `192.168.1.1 alex`.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AliasError {
    #[error("invalid alias file format: {line:?}")]
    InvalidFormat { line: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// File-backed alias map. The file is created on first open.
#[derive(Debug, Clone)]
pub struct AliasStore {
    path: PathBuf,
}

impl AliasStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every mapping. A line that does not split into exactly two
    /// fields fails the whole load.
    pub fn names(&self) -> Result<HashMap<String, String>, AliasError> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut out = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let mut parts = line.split(' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) if !key.is_empty() => {
                    out.insert(key.to_string(), value.to_string());
                }
                _ => return Err(AliasError::InvalidFormat { line }),
            }
        }
        Ok(out)
    }

    /// Look up one key (an address or a name).
    pub fn resolve(&self, key: &str) -> Result<Option<String>, AliasError> {
        Ok(self.names()?.get(key).cloned())
    }

    /// Record a `(name, address)` pair, both directions. Already-known
    /// pairs are not duplicated.
    pub fn add(&self, name: &str, address: &str) -> Result<(), AliasError> {
        let names = self.names()?;
        if names.get(address).map(String::as_str) == Some(name) {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        writeln!(file, "{} {}", address, name)?;
        writeln!(file, "{} {}", name, address)?;
        Ok(())
    }
}
