//! Content fingerprints used to skip no-op file change notifications.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// BLAKE3 digest of a file's bytes, hex encoded.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Last known fingerprint per path.
#[derive(Debug, Default)]
pub struct Fingerprints {
    seen: HashMap<PathBuf, Option<String>>,
}

impl Fingerprints {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current contents of `path` and report whether they differ
    /// from the previous observation.
    ///
    /// A path seen for the first time counts as changed. A file that can no
    /// longer be read is fingerprinted as `None`, so deletion is a change too.
    pub fn changed(&mut self, path: &Path) -> bool {
        let current = fingerprint_file(path).ok();
        match self.seen.insert(path.to_path_buf(), current.clone()) {
            Some(previous) => previous != current,
            None => true,
        }
    }

    /// Forget everything, e.g. when the previewed document changes.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
