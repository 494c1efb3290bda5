//! Content digests for artifacts.
//!
//! SHA-256, lowercase hex. Files are hashed in fixed-size chunks so memory
//! use does not depend on artifact size. The server computes the same
//! digest for `/api/file-sha/<name>`.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::IntegrityError;

const CHUNK: usize = 64 * 1024;

/// Hash everything `reader` yields.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn digest_file(path: &Path) -> Result<String, IntegrityError> {
    let file = File::open(path)?;
    Ok(digest_reader(file)?)
}

/// Compare the file's digest to `expected` (hex, case-insensitive).
pub fn verify_file(path: &Path, expected: &str) -> Result<(), IntegrityError> {
    let actual = digest_file(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(IntegrityError::Mismatch {
            path: path.to_path_buf(),
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn known_vector() {
        assert_eq!(digest_reader(&b"abc"[..]).unwrap(), ABC_SHA256);
    }

    #[test]
    fn file_larger_than_one_chunk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..(CHUNK * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();
        assert_eq!(
            digest_file(&path).unwrap(),
            digest_reader(data.as_slice()).unwrap()
        );
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();
        verify_file(&path, &ABC_SHA256.to_uppercase()).unwrap();
    }

    #[test]
    fn verify_reports_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abd").unwrap();
        match verify_file(&path, ABC_SHA256) {
            Err(IntegrityError::Mismatch { expected, .. }) => assert_eq!(expected, ABC_SHA256),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            digest_file(&dir.path().join("missing")),
            Err(IntegrityError::Io(_))
        ));
    }
}
