//! Bucket, bag-key, and access-rights naming rules (spec §6, §3 "Bag identity").

use std::fmt;

/// Bucket-name prefixes recognized for institution derivation, matched in
/// this order (the test prefix is a superset of the plain receiving prefix
/// and must be tried first).
const BUCKET_PREFIXES: &[&str] = &[
    "aptrust.receiving.test.",
    "aptrust.receiving.",
    "aptrust.restore.",
];

/// Default restore bag-size limit: 250 GB (spec §4.H).
pub const DEFAULT_BAG_SIZE_LIMIT: u64 = 250 * 1024 * 1024 * 1024;
/// Default restore bag padding: ~1 MiB held back from the size limit to
/// leave room for tag/manifest overhead (spec §4.H).
pub const DEFAULT_BAG_PADDING: u64 = 1024 * 1024;

/// The name of one restore bag part: `<identifier>.tar` for a single-set
/// restore, `<identifier>.b<NNNN>.of<NNNN>.tar` for part `set_number` of
/// `total_sets` (spec §4.H).
pub fn restore_bag_name(identifier: &str, set_number: usize, total_sets: usize) -> String {
    if total_sets <= 1 {
        format!("{identifier}.tar")
    } else {
        format!("{identifier}.b{set_number:04}.of{total_sets:04}.tar")
    }
}

/// Recovers the institution domain from a drop/delivery bucket name.
///
/// `OwnerOf` is a left inverse of the bucket-naming rule: for any of the
/// three recognized prefixes, `owner_of(format!("{prefix}{inst}")) ==
/// Some(inst)`.
pub fn owner_of(bucket: &str) -> Option<&str> {
    for prefix in BUCKET_PREFIXES {
        if let Some(rest) = bucket.strip_prefix(prefix) {
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }
    None
}

/// The delivery (restore) bucket for an institution.
pub fn delivery_bucket(institution: &str, test_mode: bool) -> String {
    if test_mode {
        format!("aptrust.restore.test.{institution}")
    } else {
        format!("aptrust.restore.{institution}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error(
        "key '{0}' looks like a multipart bag but does not match the required \
         '<name>.b<NN>.of<NN>.tar' (or '.bag<NN>.of<NN>.tar') suffix form"
    )]
    MalformedMultipartSuffix(String),
    #[error("could not derive an owning institution from bucket '{0}'")]
    UnknownBucket(String),
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Strips a well-formed multipart suffix (`.b<NN>.of<NN>` or
/// `.bag<NN>.of<NN>`, case-sensitive) from the end of `name`, returning the
/// remainder. Returns `Ok(name)` unchanged if no multipart-shaped suffix is
/// present at all. Returns an error if something *looks* like a multipart
/// suffix (the literal substrings "b"/"bag" and "of" in the right
/// positions) but the digit groups don't parse — spec §6's "looks like a
/// multipart bag but does not match this exact suffix" case.
fn strip_multipart_suffix(name: &str) -> Result<&str, NamingError> {
    // Try the two well-formed exact patterns first, longest-specific first.
    if let Some(stripped) = strip_exact_multipart(name, "bag") {
        return Ok(stripped);
    }
    if let Some(stripped) = strip_exact_multipart(name, "b") {
        return Ok(stripped);
    }

    // Loose "looks like multipart" detector: a trailing
    // ".<tag><digits-or-not>.of<digits-or-not>" shape where <tag> is "b" or
    // "bag" but the digit groups are missing/non-numeric.
    if looks_multipart_ish(name) {
        return Err(NamingError::MalformedMultipartSuffix(name.to_string()));
    }

    Ok(name)
}

fn strip_exact_multipart<'a>(name: &'a str, tag: &str) -> Option<&'a str> {
    let marker = format!(".{tag}");
    let idx = name.rfind(&marker)?;
    let rest = &name[idx + marker.len()..];
    // rest must be: <digits>.of<digits>, with nothing trailing.
    let mut parts = rest.splitn(2, ".of");
    let digits1 = parts.next()?;
    let digits2 = parts.next()?;
    if !digits1.is_empty()
        && digits1.chars().all(|c| c.is_ascii_digit())
        && !digits2.is_empty()
        && digits2.chars().all(|c| c.is_ascii_digit())
    {
        Some(&name[..idx])
    } else {
        None
    }
}

fn looks_multipart_ish(name: &str) -> bool {
    for tag in [".bag", ".b"] {
        if let Some(idx) = name.rfind(tag) {
            let rest = &name[idx + tag.len()..];
            if rest.contains(".of") {
                // Something shaped like a multipart suffix is present, but
                // `strip_exact_multipart` already rejected it above.
                return true;
            }
        }
    }
    false
}

/// The clean bag name: the basename of `raw_key`, minus a trailing `.tar`
/// and minus any well-formed multipart suffix. `CleanBagName` is idempotent:
/// running it twice yields the same result as running it once, since a
/// cleaned name by construction carries neither a `.tar` suffix nor a
/// multipart suffix.
pub fn clean_bag_name(raw_key: &str) -> Result<String, NamingError> {
    let base = basename(raw_key);
    let without_tar = base.strip_suffix(".tar").unwrap_or(base);
    let cleaned = strip_multipart_suffix(without_tar)?;
    Ok(cleaned.to_string())
}

/// The object identifier: `"<owning-institution>/<clean-bag-name>"`, where
/// the institution is derived from the bucket name and the clean bag name
/// is derived from the key.
pub fn object_identifier(bucket: &str, raw_key: &str) -> Result<String, NamingError> {
    let institution =
        owner_of(bucket).ok_or_else(|| NamingError::UnknownBucket(bucket.to_string()))?;
    let clean = clean_bag_name(raw_key)?;
    Ok(format!("{institution}/{clean}"))
}

/// The access-rights enumeration (spec §3, §6, GLOSSARY), with the two
/// back-compatibility synonyms folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRights {
    Consortia,
    Institution,
    Restricted,
}

impl AccessRights {
    /// Parses a tag value, lower-casing it and folding `consortial` into
    /// `consortia` and `institutional` into `institution` per spec §6.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "consortia" | "consortial" => Some(AccessRights::Consortia),
            "institution" | "institutional" => Some(AccessRights::Institution),
            "restricted" => Some(AccessRights::Restricted),
            _ => None,
        }
    }
}

impl fmt::Display for AccessRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessRights::Consortia => "consortia",
            AccessRights::Institution => "institution",
            AccessRights::Restricted => "restricted",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_of_is_left_inverse_of_bucket_naming() {
        assert_eq!(owner_of("aptrust.receiving.ncsu.edu"), Some("ncsu.edu"));
        assert_eq!(
            owner_of("aptrust.receiving.test.ncsu.edu"),
            Some("ncsu.edu")
        );
        assert_eq!(owner_of("aptrust.restore.ncsu.edu"), Some("ncsu.edu"));
        assert_eq!(owner_of("some.other.bucket"), None);
    }

    #[test]
    fn clean_bag_name_strips_tar_and_multipart_suffix() {
        assert_eq!(clean_bag_name("archive.tar").unwrap(), "archive");
        assert_eq!(
            clean_bag_name("inst.edu/archive.b03.of12.tar").unwrap(),
            "archive"
        );
        assert_eq!(
            clean_bag_name("inst.edu/archive.bag03.of12.tar").unwrap(),
            "archive"
        );
        assert_eq!(
            clean_bag_name("ncsu.edu/ncsu.1840.16-2928.tar").unwrap(),
            "ncsu.1840.16-2928"
        );
    }

    #[test]
    fn clean_bag_name_rejects_malformed_multipart_suffix() {
        let err = clean_bag_name("archive.bXX.ofYY.tar").unwrap_err();
        assert!(matches!(err, NamingError::MalformedMultipartSuffix(_)));
    }

    #[test]
    fn clean_bag_name_is_idempotent() {
        for key in [
            "archive.tar",
            "inst.edu/archive.b03.of12.tar",
            "ncsu.edu/ncsu.1840.16-2928.tar",
        ] {
            let once = clean_bag_name(key).unwrap();
            let twice = clean_bag_name(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn object_identifier_matches_good_bag_scenario() {
        let id = object_identifier(
            "aptrust.receiving.ncsu.edu",
            "ncsu.edu/ncsu.1840.16-2928.tar",
        )
        .unwrap();
        assert_eq!(id, "ncsu.edu/ncsu.1840.16-2928");
    }

    #[test]
    fn restore_bag_name_is_plain_for_a_single_set() {
        assert_eq!(restore_bag_name("ncsu.edu/sample", 1, 1), "ncsu.edu/sample.tar");
    }

    #[test]
    fn restore_bag_name_is_padded_multipart_for_several_sets() {
        assert_eq!(
            restore_bag_name("ncsu.edu/sample", 1, 2),
            "ncsu.edu/sample.b0001.of0002.tar"
        );
        assert_eq!(
            restore_bag_name("ncsu.edu/sample", 2, 2),
            "ncsu.edu/sample.b0002.of0002.tar"
        );
    }

    #[test]
    fn access_rights_folds_synonyms_and_rejects_unknown() {
        assert_eq!(AccessRights::parse("Consortia"), Some(AccessRights::Consortia));
        assert_eq!(
            AccessRights::parse("consortial"),
            Some(AccessRights::Consortia)
        );
        assert_eq!(
            AccessRights::parse("Institutional"),
            Some(AccessRights::Institution)
        );
        assert_eq!(
            AccessRights::parse("restricted"),
            Some(AccessRights::Restricted)
        );
        assert_eq!(AccessRights::parse("public"), None);
    }
}
