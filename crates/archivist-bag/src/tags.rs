//! Parsing of BagIt tag files (`bagit.txt`, `bag-info.txt`,
//! `aptrust-info.txt`) into insertion-ordered [`Tag`] sequences (spec §4.B,
//! §6).

use std::fs;
use std::path::Path;

use archivist_model::Tag;

/// Parses one tag file's `Label: value` lines (continuation lines that
/// start with whitespace are appended to the previous tag's value, per the
/// BagIt tag-file grammar), trimming surrounding whitespace from values.
pub fn parse_tag_file(path: &Path) -> std::io::Result<Vec<Tag>> {
    let contents = fs::read_to_string(path)?;
    let mut tags: Vec<Tag> = Vec::new();

    for line in contents.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = tags.last_mut() {
                last.value.push(' ');
                last.value.push_str(line.trim());
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        if let Some((label, value)) = line.split_once(':') {
            tags.push(Tag::new(label.trim(), value.trim()));
        }
    }

    Ok(tags)
}

/// Parses and flattens the three recognized tag files, in this fixed order,
/// skipping any that don't exist. The flattened order is part of the
/// public contract: tags from `bagit.txt` precede `bag-info.txt` precede
/// `aptrust-info.txt`.
pub fn read_all_tags(bag_dir: &Path) -> std::io::Result<Vec<Tag>> {
    let mut tags = Vec::new();
    for name in ["bagit.txt", "bag-info.txt", "aptrust-info.txt"] {
        let path = bag_dir.join(name);
        if path.is_file() {
            tags.extend(parse_tag_file(&path)?);
        }
    }
    Ok(tags)
}
