//! Parsing and verification of BagIt checksum manifests (spec §4.B, §6).

use std::fs;
use std::path::Path;

/// One parsed manifest line: `<hex digest>  <bag-relative path>`.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub digest: String,
    pub path: String,
}

pub fn parse_manifest(path: &Path) -> std::io::Result<Vec<ManifestEntry>> {
    let contents = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((digest, rel_path)) = line.split_once(char::is_whitespace) {
            entries.push(ManifestEntry {
                digest: digest.trim().to_lowercase(),
                path: rel_path.trim().to_string(),
            });
        }
    }
    Ok(entries)
}

/// Verifies every entry in a manifest against the files on disk beneath
/// `bag_dir`, returning one descriptive message per mismatch or unreadable
/// file. Entries are not short-circuited: every entry is checked.
pub fn verify_manifest(
    bag_dir: &Path,
    manifest_path: &Path,
    hash_fn: impl Fn(&[u8]) -> String,
) -> std::io::Result<Vec<String>> {
    let entries = parse_manifest(manifest_path)?;
    let mut errors = Vec::new();

    for entry in entries {
        let file_path = bag_dir.join(&entry.path);
        match fs::read(&file_path) {
            Ok(bytes) => {
                let actual = hash_fn(&bytes);
                if actual != entry.digest {
                    errors.push(format!(
                        "{}: expected {} but found {}",
                        entry.path, entry.digest, actual
                    ));
                }
            }
            Err(e) => {
                errors.push(format!("{}: could not read file: {e}", entry.path));
            }
        }
    }

    Ok(errors)
}

pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(md5::compute(bytes).0)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
