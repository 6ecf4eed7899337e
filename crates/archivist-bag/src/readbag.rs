//! `ReadBag`: validate an unpacked bag directory and yield a
//! [`BagReadResult`] (spec §4.B).

use std::path::Path;

use archivist_model::{AccessRights, BagReadResult};

use crate::manifest::{md5_hex, sha256_hex, verify_manifest};
use crate::tags::read_all_tags;

const REQUIRED_FILES: &[&str] = &["bagit.txt", "aptrust-info.txt", "manifest-md5.txt"];

pub fn read_bag(bag_dir: &Path) -> std::io::Result<BagReadResult> {
    let mut missing = Vec::new();

    for name in REQUIRED_FILES {
        if !bag_dir.join(name).is_file() {
            missing.push(format!("missing {name}"));
        }
    }

    let data_dir = bag_dir.join("data");
    let data_nonempty = data_dir.is_dir()
        && std::fs::read_dir(&data_dir)
            .map(|mut it| it.next().is_some())
            .unwrap_or(false);
    if !data_nonempty {
        missing.push("missing non-empty data/ directory".to_string());
    }

    let tags = read_all_tags(bag_dir)?;

    let mut errors = missing;

    let title = tags
        .iter()
        .find(|t| t.label.eq_ignore_ascii_case("title"))
        .map(|t| t.value.trim().to_string());
    match &title {
        Some(t) if !t.is_empty() => {}
        _ => errors.push("missing required tag 'Title'".to_string()),
    }

    // Prefer `Access`, falling back to `Rights` (spec §4.B, §6).
    let access_tag = tags
        .iter()
        .find(|t| t.label.eq_ignore_ascii_case("access"))
        .or_else(|| tags.iter().find(|t| t.label.eq_ignore_ascii_case("rights")));
    match access_tag {
        Some(t) if AccessRights::parse(&t.value).is_some() => {}
        Some(t) => errors.push(format!(
            "access/rights value '{}' is not one of the recognized access rights",
            t.value
        )),
        None => errors.push("missing required tag 'Access' (or 'Rights')".to_string()),
    }

    let mut checksum_errors = Vec::new();
    let md5_manifest = bag_dir.join("manifest-md5.txt");
    if md5_manifest.is_file() {
        checksum_errors.extend(verify_manifest(bag_dir, &md5_manifest, md5_hex)?);
    }
    let sha256_manifest = bag_dir.join("manifest-sha256.txt");
    if sha256_manifest.is_file() {
        checksum_errors.extend(verify_manifest(bag_dir, &sha256_manifest, sha256_hex)?);
    }

    if !checksum_errors.is_empty() {
        errors.push(format!(
            "The following checksums could not be verified: {}",
            checksum_errors.join("; ")
        ));
    }

    let files = archivist_walk_files(&data_dir);

    Ok(BagReadResult {
        bag_dir: bag_dir.display().to_string(),
        files,
        tags,
        checksum_errors,
        error_message: if errors.is_empty() {
            None
        } else {
            Some(errors.join("\n"))
        },
    })
}

fn archivist_walk_files(data_dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    if data_dir.is_dir() {
        for entry in walkdir::WalkDir::new(data_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                files.push(entry.path().display().to_string());
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_minimal_bag(dir: &Path, access: &str) -> (String, String) {
        fs::create_dir_all(dir.join("data")).unwrap();
        fs::write(dir.join("data/a.txt"), b"hello").unwrap();
        fs::write(dir.join("bagit.txt"), "BagIt-Version: 0.97\n").unwrap();
        fs::write(
            dir.join("aptrust-info.txt"),
            format!("Title: My Bag\nAccess: {access}\n"),
        )
        .unwrap();
        let digest = md5_hex(b"hello");
        fs::write(
            dir.join("manifest-md5.txt"),
            format!("{digest}  data/a.txt\n"),
        )
        .unwrap();
        (digest, "data/a.txt".to_string())
    }

    #[test]
    fn good_bag_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_bag(dir.path(), "consortia");

        let result = read_bag(dir.path()).unwrap();
        assert!(result.is_valid(), "{:?}", result.error_message);
        assert_eq!(result.tag("title"), Some("My Bag"));
    }

    #[test]
    fn missing_manifest_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_bag(dir.path(), "consortia");
        fs::remove_file(dir.path().join("manifest-md5.txt")).unwrap();

        let result = read_bag(dir.path()).unwrap();
        assert!(!result.is_valid());
        assert!(result
            .error_message
            .unwrap()
            .contains("missing manifest-md5.txt"));
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_bag(dir.path(), "consortia");
        fs::write(dir.path().join("data/a.txt"), b"tampered").unwrap();

        let result = read_bag(dir.path()).unwrap();
        assert!(!result.is_valid());
        assert_eq!(result.checksum_errors.len(), 1);
        let msg = result.error_message.unwrap();
        assert!(msg.starts_with("The following checksums could not be verified:") || msg.contains("The following checksums could not be verified:"));
    }

    #[test]
    fn access_synonym_is_folded() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_bag(dir.path(), "institutional");
        let result = read_bag(dir.path()).unwrap();
        assert!(result.is_valid(), "{:?}", result.error_message);
    }

    #[test]
    fn unrecognized_access_value_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal_bag(dir.path(), "public");
        let result = read_bag(dir.path()).unwrap();
        assert!(!result.is_valid());
    }
}
