//! Greedy first-fit partitioning of a file list into size-bounded sets
//! (spec §4.H step 2).

use archivist_catalog::FileSummary;

/// Splits `files` into sets, starting a new set whenever adding the next
/// file would push the running total past `capacity`. The partition is
/// stable in file order, and an oversized single file still gets its own
/// set — `capacity` is advisory, never enforced by splitting a file.
pub fn partition_into_sets(files: &[FileSummary], capacity: u64) -> Vec<Vec<FileSummary>> {
    let mut sets: Vec<Vec<FileSummary>> = Vec::new();
    let mut current: Vec<FileSummary> = Vec::new();
    let mut current_size: u64 = 0;

    for file in files {
        if !current.is_empty() && current_size.saturating_add(file.size) > capacity {
            sets.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += file.size;
        current.push(file.clone());
    }
    if !current.is_empty() {
        sets.push(current);
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(size: u64) -> FileSummary {
        FileSummary {
            identifier: "obj/f".to_string(),
            relative_path: "data/f".to_string(),
            size,
            storage_url: Some("s3://preservation/00000000-0000-0000-0000-000000000000".to_string()),
            md5: "deadbeef".to_string(),
            sha256: None,
        }
    }

    #[test]
    fn splits_three_files_into_two_sets_per_the_worked_example() {
        let files = vec![file(400), file(400), file(400)];
        let sets = partition_into_sets(&files, 1000 - 1);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].len(), 2);
        assert_eq!(sets[1].len(), 1);
    }

    #[test]
    fn an_oversized_file_still_gets_its_own_set() {
        let files = vec![file(10), file(5000), file(10)];
        let sets = partition_into_sets(&files, 1000);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[1][0].size, 5000);
    }

    #[test]
    fn empty_input_yields_no_sets() {
        assert!(partition_into_sets(&[], 1000).is_empty());
    }
}
