use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Walk from `start` up to the filesystem root and return the first
/// directory that contains a file named `file_name`.
///
/// Returns the full path of the matching file.
#[must_use]
pub fn find_up(start: &Path, file_name: &str) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(file_name);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// Canonicalize a path, falling back to the input when it does not exist.
///
/// Goes through `dunce` so Windows verbatim prefixes never leak into
/// user-facing paths.
#[must_use]
pub fn canonicalize_or_keep(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_read_to_string_lossy_valid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"# Title").unwrap();
        file.flush().unwrap();

        let content = read_to_string_lossy(file.path()).unwrap();
        assert_eq!(content, "# Title");
    }

    #[test]
    fn test_read_to_string_lossy_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x80, 0x81])
            .unwrap();
        file.flush().unwrap();

        let content = read_to_string_lossy(file.path()).unwrap();
        assert!(content.starts_with("Hello"));
        assert!(content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_read_missing_file_errors() {
        let dir = tempdir().unwrap();
        assert!(read_to_string_lossy(&dir.path().join("gone.md")).is_err());
    }

    #[test]
    fn test_find_up_walks_parents() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("a/tsconfig.json"), "{}").unwrap();

        let found = find_up(&nested, "tsconfig.json").unwrap();
        assert_eq!(found, dir.path().join("a/tsconfig.json"));
        assert!(find_up(&nested, "nope.json").is_none());
    }

    #[test]
    fn test_canonicalize_or_keep_missing() {
        let p = Path::new("/definitely/not/here.js");
        assert_eq!(canonicalize_or_keep(p), p.to_path_buf());
    }
}
