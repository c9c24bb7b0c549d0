use crate::config::types::Result;
use std::path::Path;

/// Checker contract for one kind of expected file.
///
/// `Ok(true)` accepts the file, `Ok(false)` rejects it, and `Err(_)` means the
/// checker itself could not run. Only called for files that were located.
pub trait Checker: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, path: &Path) -> Result<bool>;
}

/// Read a candidate file as text
///
/// Invalid UTF-8 becomes U+FFFD; only I/O failures are errors.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.txt");
        std::fs::write(&path, b"# t\xe2che\nok\n").unwrap();
        assert_eq!(read_text(&path).unwrap(), "# t\u{fffd}che\nok\n");
        assert!(read_text(&dir.path().join("missing")).is_err());
    }
}
