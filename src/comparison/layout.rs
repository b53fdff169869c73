use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const BASELINES_DIR: &str = "baselines";
pub const CURRENT_DIR: &str = "current";
pub const DIFFS_DIR: &str = "diffs";

/// Hex digits of the signature hash kept in each file name.
const HASH_LEN: usize = 16;

/// Where images for one signature live under the state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePaths {
    pub baseline: PathBuf,
    pub current: PathBuf,
    pub diff: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ImageLayout {
    state_dir: PathBuf,
}

impl ImageLayout {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn dirs(&self) -> [PathBuf; 3] {
        [
            self.state_dir.join(BASELINES_DIR),
            self.state_dir.join(CURRENT_DIR),
            self.state_dir.join(DIFFS_DIR),
        ]
    }

    pub fn paths_for(&self, signature: &str) -> ImagePaths {
        let file = format!("{}.png", file_stem(signature));
        ImagePaths {
            baseline: self.state_dir.join(BASELINES_DIR).join(&file),
            current: self.state_dir.join(CURRENT_DIR).join(&file),
            diff: self.state_dir.join(DIFFS_DIR).join(&file),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

/// Filesystem-safe rendering of a signature. The readable part is lossy, the hash suffix keeps
/// distinct signatures on distinct files.
fn file_stem(signature: &str) -> String {
    let readable: String = signature
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = format!("{:x}", Sha256::digest(signature.as_bytes()));
    format!("{readable}-{}", &digest[..HASH_LEN])
}
