//! Building a restore bag directory: tag files, growing checksum
//! manifests, and final tar packaging (spec §4.H).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

/// Accumulates a restore bag's manifest entries as files are added, then
/// finalizes the tag files and checksum manifests on disk.
pub struct BagBuilder {
    bag_dir: PathBuf,
    md5_entries: Vec<(String, String)>,
    sha256_entries: Vec<(String, String)>,
}

impl BagBuilder {
    /// Creates `bag_dir` and its `data/` subdirectory.
    pub fn new(bag_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let bag_dir = bag_dir.into();
        fs::create_dir_all(bag_dir.join("data"))?;
        Ok(BagBuilder {
            bag_dir,
            md5_entries: Vec::new(),
            sha256_entries: Vec::new(),
        })
    }

    pub fn bag_dir(&self) -> &Path {
        &self.bag_dir
    }

    /// The absolute path a payload file at `relative_path` (e.g.
    /// `data/foo/bar.txt`) should be written to; callers stream the file's
    /// bytes there themselves (the restore engine fetches from preservation
    /// storage and tee-hashes in the same pass).
    pub fn payload_path(&self, relative_path: &str) -> PathBuf {
        self.bag_dir.join(relative_path)
    }

    pub fn ensure_parent_dir(&self, relative_path: &str) -> io::Result<()> {
        if let Some(parent) = self.payload_path(relative_path).parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Records a file's digests for the final manifests. Call once per
    /// payload file after it has been written to disk; this is what
    /// "simultaneously updates the bag's MD5 and SHA-256 manifests" (spec
    /// §4.H) means in practice — the manifest lines accumulate in memory
    /// as each file streams in, and hit disk only at `finalize_manifests`.
    pub fn record_digests(&mut self, relative_path: &str, md5: &str, sha256: Option<&str>) {
        self.md5_entries.push((md5.to_string(), relative_path.to_string()));
        if let Some(sha256) = sha256 {
            self.sha256_entries.push((sha256.to_string(), relative_path.to_string()));
        }
    }

    /// Writes `aptrust-info.txt` (Title, Access, optional Description).
    pub fn write_aptrust_info(&self, title: &str, access: &str, description: Option<&str>) -> io::Result<()> {
        let mut contents = format!("Title: {title}\nAccess: {access}\n");
        if let Some(description) = description {
            contents.push_str(&format!("Description: {description}\n"));
        }
        fs::write(self.bag_dir.join("aptrust-info.txt"), contents)
    }

    /// Synthesizes `bag-info.txt` for objects ingested before bag-info
    /// events were recorded (spec §4.H "pre-March-2016 ingests").
    pub fn synthesize_bag_info(
        &self,
        institution: &str,
        set_number: usize,
        total_sets: usize,
        internal_sender_description: &str,
        internal_sender_identifier: &str,
    ) -> io::Result<()> {
        let contents = format!(
            "Source-Organization: {institution}\n\
             Bagging-Date: {}\n\
             Bag-Count: {set_number} of {total_sets}\n\
             Internal-Sender-Description: {internal_sender_description}\n\
             Internal-Sender-Identifier: {internal_sender_identifier}\n",
            Utc::now().to_rfc3339(),
        );
        fs::write(self.bag_dir.join("bag-info.txt"), contents)
    }

    pub fn write_bagit_declaration(&self) -> io::Result<()> {
        fs::write(
            self.bag_dir.join("bagit.txt"),
            "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n",
        )
    }

    /// Writes the final `manifest-md5.txt` and, if any SHA-256 digests were
    /// recorded, `manifest-sha256.txt`.
    pub fn finalize_manifests(&self) -> io::Result<()> {
        write_manifest(&self.bag_dir.join("manifest-md5.txt"), &self.md5_entries)?;
        if !self.sha256_entries.is_empty() {
            write_manifest(&self.bag_dir.join("manifest-sha256.txt"), &self.sha256_entries)?;
        }
        Ok(())
    }
}

fn write_manifest(path: &Path, entries: &[(String, String)]) -> io::Result<()> {
    let mut contents = String::new();
    for (digest, rel_path) in entries {
        contents.push_str(&format!("{digest}  {rel_path}\n"));
    }
    fs::write(path, contents)
}

/// Tars `bag_dir` to `tar_path`. `bag_dir`'s own basename becomes the tar's
/// single top-level directory, matching the on-disk shape `untar` expects:
/// tag files and `data/` nested one level under the bag's name.
pub fn tar_bag(bag_dir: &Path, tar_path: &Path) -> io::Result<()> {
    let top_level = bag_dir
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "bag directory has no name"))?;
    let file = fs::File::create(tar_path)?;
    let mut builder = tar::Builder::new(file);
    builder.append_dir_all(top_level, bag_dir)?;
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifests_accumulate_and_flush_on_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let bag_dir = dir.path().join("inst.edu.sample");
        let mut builder = BagBuilder::new(&bag_dir).unwrap();

        builder.ensure_parent_dir("data/a.txt").unwrap();
        fs::write(builder.payload_path("data/a.txt"), b"hello").unwrap();
        builder.record_digests("data/a.txt", "5d41402abc4b2a76b9719d911017c592", Some("abc123"));

        builder.write_bagit_declaration().unwrap();
        builder.write_aptrust_info("My Bag", "institution", None).unwrap();
        builder.finalize_manifests().unwrap();

        let md5_manifest = fs::read_to_string(bag_dir.join("manifest-md5.txt")).unwrap();
        assert!(md5_manifest.contains("data/a.txt"));
        let sha256_manifest = fs::read_to_string(bag_dir.join("manifest-sha256.txt")).unwrap();
        assert!(sha256_manifest.contains("abc123"));
    }

    #[test]
    fn tar_bag_produces_an_archive_untar_would_accept() {
        let dir = tempfile::tempdir().unwrap();
        let bag_dir = dir.path().join("inst.edu.sample");
        let builder = BagBuilder::new(&bag_dir).unwrap();
        builder.write_bagit_declaration().unwrap();
        builder.write_aptrust_info("My Bag", "institution", None).unwrap();
        fs::write(bag_dir.join("data/a.txt"), b"hello").unwrap();
        builder.finalize_manifests().unwrap();

        let tar_path = dir.path().join("inst.edu.sample.tar");
        tar_bag(&bag_dir, &tar_path).unwrap();

        let result = crate::untar(&tar_path, "inst.edu", false).unwrap();
        assert!(result.is_ok(), "{:?}", result.error_message);
    }
}
