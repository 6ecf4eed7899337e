//! `Untar`: unpack a tar stream, stream-hash payload files, and yield a
//! [`TarResult`] (spec §4.B).

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use archivist_error::{Error, Result};
use archivist_model::{PayloadFile, TarResult};
use chrono::Utc;

use crate::tee::TeeHashWriter;

/// Normalizes backslashes to slashes (spec §4.B: "On Windows, backslashes
/// in the input path are normalized to slashes before comparison") and
/// returns the basename of `tar_path` with its `.tar` suffix stripped. This
/// is the *expected top-level directory name* — note it does **not** strip
/// a multipart suffix the way [`archivist_model::clean_bag_name`] does: the
/// top-level directory inside a multipart bag's tar is still named after
/// the full per-part file name minus `.tar`.
fn expected_top_level_dir(tar_path: &Path) -> String {
    let normalized = tar_path.to_string_lossy().replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or(&normalized);
    base.strip_suffix(".tar").unwrap_or(base).to_string()
}

/// Unpacks `tar_path` beneath its own parent directory, stream-hashing
/// every payload file (`data/...`) in a single pass.
///
/// `institution_domain` is accepted as a parameter, not re-derived here
/// (derivation from the bucket name happens in `archivist-model::naming`
/// before this is called); an empty value is treated as "institution could
/// not be derived from the bag name" per spec §4.B's failure list.
pub fn untar(
    tar_path: &Path,
    institution_domain: &str,
    build_ingest_data: bool,
) -> Result<TarResult> {
    if institution_domain.trim().is_empty() {
        return Err(Error::validation(
            "institution could not be derived from the bag name",
        ));
    }

    let abs_tar_path = fs::canonicalize(tar_path).map_err(|e| {
        Error::validation(format!(
            "could not resolve absolute path for {}: {e}",
            tar_path.display()
        ))
    })?;
    let output_dir = abs_tar_path
        .parent()
        .ok_or_else(|| Error::validation("tar path has no parent directory"))?
        .to_path_buf();

    let expected_dir = expected_top_level_dir(tar_path);

    let file = File::open(&abs_tar_path).map_err(|e| {
        Error::validation(format!("could not open tar file {}: {e}", tar_path.display()))
    })?;
    let mut archive = tar::Archive::new(file);

    let mut files = Vec::new();
    let mut files_unpacked = Vec::new();
    let mut warnings = Vec::new();
    let mut top_level_checked = false;

    let entries = archive.entries().map_err(|e| {
        Error::validation(format!("not a tar file or file is corrupt: {e}"))
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| {
            Error::validation(format!("not a tar file or file is corrupt: {e}"))
        })?;
        let entry_path = entry.path().map_err(|e| Error::validation(e.to_string()))?.into_owned();
        let entry_path_str = entry_path.to_string_lossy().replace('\\', "/");

        // DESIGN.md "open question / likely bug, preserved verbatim": the
        // top-level-directory comparison runs against the *first* entry
        // encountered in archive order, without first checking that the
        // entry is actually a directory (spec §9). An archive whose first
        // entry is a regular file rather than the bag's directory entry
        // will still have that file's leading path component compared
        // against `expected_dir` here.
        if !top_level_checked {
            top_level_checked = true;
            let first_component = entry_path_str.split('/').next().unwrap_or("");
            if first_component != expected_dir {
                return Ok(TarResult {
                    tar_path: tar_path.display().to_string(),
                    output_dir: output_dir.display().to_string(),
                    files: Vec::new(),
                    files_unpacked: Vec::new(),
                    warnings: Vec::new(),
                    error_message: Some(format!(
                        "bag should untar to a folder named '{expected_dir}'"
                    )),
                });
            }
        }

        let entry_type = entry.header().entry_type();
        let dest_path = output_dir.join(&entry_path);

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| {
                Error::validation(format!("could not create directory {}: {e}", dest_path.display()))
            })?;
            continue;
        }

        if !entry_type.is_file() {
            warnings.push(format!(
                "ignored non-file, non-directory entry: {entry_path_str}"
            ));
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::validation(format!("could not create directory {}: {e}", parent.display()))
            })?;
        }

        let size = entry.header().size().unwrap_or(0);
        let modified_at = entry
            .header()
            .mtime()
            .ok()
            .and_then(|t| chrono::DateTime::<Utc>::from_timestamp(t as i64, 0))
            .unwrap_or_else(Utc::now);

        if entry_path_str.contains("/data/") {
            let out_file = File::create(&dest_path).map_err(|e| {
                Error::validation(format!("could not write {}: {e}", dest_path.display()))
            })?;
            let mut tee = TeeHashWriter::new(out_file, build_ingest_data);
            io::copy(&mut entry, &mut tee).map_err(|e| {
                Error::validation(format!("could not write {}: {e}", dest_path.display()))
            })?;
            let (md5, sha256) = tee.finish();

            let clean_name = expected_dir.clone();
            let bag_relative_path = entry_path_str
                .strip_prefix(&format!("{expected_dir}/"))
                .unwrap_or(&entry_path_str)
                .to_string();
            let mut payload = PayloadFile::new(
                bag_relative_path,
                size,
                modified_at,
                md5,
                &clean_name,
            );
            if build_ingest_data {
                payload.sha256 = sha256;
                payload.sha256_generated_at = Some(Utc::now());
                payload.mime_type = Some(guess_mime(&dest_path));
            }
            files.push(payload);
        } else {
            let mut out_file = File::create(&dest_path).map_err(|e| {
                Error::validation(format!("could not write {}: {e}", dest_path.display()))
            })?;
            io::copy(&mut entry, &mut out_file).map_err(|e| {
                Error::validation(format!("could not write {}: {e}", dest_path.display()))
            })?;
        }

        files_unpacked.push(entry_path_str);
    }

    files_unpacked.sort();

    Ok(TarResult {
        tar_path: tar_path.display().to_string(),
        output_dir: output_dir.display().to_string(),
        files,
        files_unpacked,
        warnings,
        error_message: None,
    })
}

/// The MIME-type guesser is an opaque external collaborator per spec §1;
/// realized here with `mime_guess` since that is the crate the pack reaches
/// for (e.g. the storage-hub backend's `mime_guess` dependency).
fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn build_tar(dir: &Path, top: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let tar_path = dir.join(format!("{top}.tar"));
        let file = File::create(&tar_path).unwrap();
        let mut builder = tar::Builder::new(file);

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, format!("{top}/"), io::empty()).unwrap();

        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{top}/{path}"), *contents)
                .unwrap();
        }
        builder.finish().unwrap();
        tar_path
    }

    #[test]
    fn good_bag_unpacks_and_hashes_in_one_pass() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = build_tar(
            dir.path(),
            "foo.edu.sample",
            &[
                ("bagit.txt", b"BagIt-Version: 0.97\n"),
                ("data/a.txt", b"hello world"),
                ("data/sub/b.txt", b"goodbye world"),
            ],
        );

        let result = untar(&tar_path, "foo.edu", true).unwrap();
        assert!(result.is_ok(), "{:?}", result.error_message);
        assert_eq!(result.files.len(), 2);
        assert_eq!(
            result.files_unpacked,
            {
                let mut v = vec![
                    "foo.edu.sample/bagit.txt".to_string(),
                    "foo.edu.sample/data/a.txt".to_string(),
                    "foo.edu.sample/data/sub/b.txt".to_string(),
                ];
                v.sort();
                v
            }
        );

        let a = result
            .files
            .iter()
            .find(|f| f.relative_path.ends_with("a.txt"))
            .unwrap();
        assert_eq!(a.md5, format!("{:x}", md5::compute(b"hello world")));
        assert!(a.sha256.is_some());

        // relative_path must be bag-root-relative, not prefixed with the
        // top-level directory, so friendly_identifier doesn't double it up.
        assert_eq!(a.relative_path, "data/a.txt");
        assert_eq!(a.friendly_identifier, "foo.edu.sample/data/a.txt");
    }

    #[test]
    fn wrong_top_level_dir_first_entry_is_file() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("foo.edu.sample.tar");
        let file = File::create(&tar_path).unwrap();
        let mut builder = tar::Builder::new(file);
        // First entry is a *file*, not the expected directory entry --
        // exercises the preserved "check before header type" behavior.
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "sample_bag/data/a.txt", &b"hello"[..])
            .unwrap();
        builder.finish().unwrap();

        let result = untar(&tar_path, "foo.edu", true).unwrap();
        assert!(result.error_message.is_some());
        assert!(result
            .error_message
            .unwrap()
            .contains("should untar to a folder named 'foo.edu.sample'"));
    }

    #[test]
    fn skips_symlinks_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("foo.edu.sample.tar");
        let file = File::create(&tar_path).unwrap();
        let mut builder = tar::Builder::new(file);

        let mut dir_header = tar::Header::new_gnu();
        dir_header.set_entry_type(tar::EntryType::Directory);
        dir_header.set_size(0);
        dir_header.set_cksum();
        builder
            .append_data(&mut dir_header, "foo.edu.sample/", io::empty())
            .unwrap();

        let mut link_header = tar::Header::new_gnu();
        link_header.set_entry_type(tar::EntryType::Symlink);
        link_header.set_size(0);
        link_header.set_cksum();
        builder
            .append_link(&mut link_header, "foo.edu.sample/data/link", "a.txt")
            .unwrap();

        builder.finish().unwrap();

        let result = untar(&tar_path, "foo.edu", true).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("data/link"));
    }
}
