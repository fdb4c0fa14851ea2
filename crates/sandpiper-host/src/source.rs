//! Loading program source.

use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;

/// Decode base64 program text into UTF-8 source.
pub fn decode_base64(encoded: &str) -> Result<String> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let bytes = b64
        .decode(encoded.trim())
        .context("program is not valid base64")?;
    String::from_utf8(bytes).context("program is not valid UTF-8")
}

/// Read raw UTF-8 source from a file.
pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_decode_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("print('hi')\n");
        assert_eq!(decode_base64(&encoded).unwrap(), "print('hi')\n");
    }

    #[test]
    fn test_decode_ignores_surrounding_whitespace() {
        assert_eq!(decode_base64("  cGFzcw==\n").unwrap(), "pass");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_base64("not base64!").unwrap_err();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe]);
        let err = decode_base64(&encoded).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_read_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "x = 1\nprint(x)\n").unwrap();
        assert_eq!(read_file(file.path()).unwrap(), "x = 1\nprint(x)\n");
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(&dir.path().join("missing.py")).unwrap_err();
        assert!(err.to_string().starts_with("failed to read"));
    }
}
