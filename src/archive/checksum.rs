//! Checksums for finalized artifacts.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const READ_CHUNK: usize = 1 << 20;

/// Digest algorithm; its name is also the checksum file extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashName {
    #[default]
    Sha256,
}

impl HashName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashName::Sha256 => "sha256",
        }
    }
}

/// Hex digest of a file's contents.
pub fn digest_file(path: &Path, hash: HashName) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; READ_CHUNK];
    match hash {
        HashName::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hasher
                .finalize()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect())
        }
    }
}

/// Write `<artifact>.<hash>` next to the artifact. Returns the digest and
/// the checksum file path.
pub fn write_checksum(artifact: &Path, hash: HashName) -> io::Result<(String, PathBuf)> {
    let digest = digest_file(artifact, hash)?;
    let mut name = artifact.as_os_str().to_os_string();
    name.push(".");
    name.push(hash.as_str());
    let sum_path = PathBuf::from(name);
    std::fs::write(&sum_path, format!("{digest}\n"))?;
    Ok((digest, sum_path))
}
