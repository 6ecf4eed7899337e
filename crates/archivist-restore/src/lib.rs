//! Restore engine: given a preservation object identifier, streams its
//! files back from preservation storage into one or more size-bounded tar
//! bags and uploads them to the institution's delivery bucket (spec §4.H).

pub mod partition;

use std::path::Path;

use archivist_bag::{tar_bag, BagBuilder};
use archivist_bus::InFlightMessage;
use archivist_catalog::Client as CatalogClient;
use archivist_error::{Error, Result};
use archivist_model::{delivery_bucket, restore_bag_name, DEFAULT_BAG_PADDING, DEFAULT_BAG_SIZE_LIMIT};
use archivist_objectstore::{parse_s3_uri, Client as ObjectStoreClient};

pub use partition::partition_into_sets;

/// One finished restore bag.
#[derive(Debug, Clone)]
pub struct RestoredSet {
    pub bag_name: String,
    pub url: String,
    pub file_count: usize,
    pub size: u64,
}

pub struct RestoreOptions {
    pub bag_size_limit: u64,
    pub bag_padding: u64,
    pub test_mode: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        RestoreOptions {
            bag_size_limit: DEFAULT_BAG_SIZE_LIMIT,
            bag_padding: DEFAULT_BAG_PADDING,
            test_mode: false,
        }
    }
}

/// Touches `msg` if one was supplied, ignoring the outcome — restore steps
/// call this at every boundary spec §4.H names (step 4: "touch the driving
/// message at every step boundary to defeat timeouts").
async fn touch(msg: Option<&dyn InFlightMessage>) {
    if let Some(msg) = msg {
        msg.touch().await.ok();
    }
}

/// Runs the full restore algorithm for `object_identifier`, returning one
/// [`RestoredSet`] per tar uploaded. `msg`, if given, is touched at every
/// step boundary.
pub async fn restore_object(
    catalog: &CatalogClient,
    store: &ObjectStoreClient,
    working_dir: &Path,
    object_identifier: &str,
    institution: &str,
    options: &RestoreOptions,
    msg: Option<&dyn InFlightMessage>,
) -> Result<Vec<RestoredSet>> {
    let object = catalog
        .object_get(object_identifier, false)
        .await?
        .ok_or_else(|| Error::not_found(format!("object {object_identifier} does not exist in the catalog")))?;
    touch(msg).await;

    let files = catalog.object_file_summary(object_identifier).await?;
    touch(msg).await;

    let capacity = options.bag_size_limit.saturating_sub(options.bag_padding);
    let sets = partition_into_sets(&files, capacity);
    let total_sets = sets.len();

    let delivery_bucket = delivery_bucket(institution, options.test_mode);
    let mut restored = Vec::with_capacity(total_sets);

    for (index, set) in sets.into_iter().enumerate() {
        let set_number = index + 1;
        let bag_name = restore_bag_name(object_identifier, set_number, total_sets);
        let part_name = bag_name.rsplit('/').next().unwrap_or(&bag_name).trim_end_matches(".tar");

        let bag_dir = working_dir.join(part_name);
        let mut builder = BagBuilder::new(&bag_dir)
            .map_err(|e| Error::fatal(format!("could not create bag directory {}: {e}", bag_dir.display())))?;

        builder
            .write_bagit_declaration()
            .map_err(|e| Error::fatal(format!("could not write bagit.txt: {e}")))?;
        builder
            .write_aptrust_info(&object.title, &object.access, Some(&object.description))
            .map_err(|e| Error::fatal(format!("could not write aptrust-info.txt: {e}")))?;
        builder
            .synthesize_bag_info(
                institution,
                set_number,
                total_sets,
                &format!("Restoration of {object_identifier}"),
                object_identifier,
            )
            .map_err(|e| Error::fatal(format!("could not write bag-info.txt: {e}")))?;
        touch(msg).await;

        let mut set_size = 0u64;
        for file in &set {
            let storage_url = file
                .storage_url
                .as_deref()
                .ok_or_else(|| Error::validation(format!("file {} has no storage URL", file.identifier)))?;
            let (bucket, key) = parse_s3_uri(storage_url)?;

            let relative_path = format!("data/{}", file.relative_path.trim_start_matches("data/"));
            builder
                .ensure_parent_dir(&relative_path)
                .map_err(|e| Error::fatal(format!("could not create directory for {relative_path}: {e}")))?;
            let local_path = builder.payload_path(&relative_path);

            let (fetch_result, sha256) = store.fetch_to_file_with_digests(&bucket, &key, &local_path).await?;
            builder.record_digests(&relative_path, &file.md5, Some(&sha256));
            set_size += fetch_result.size;
            touch(msg).await;
        }

        builder
            .finalize_manifests()
            .map_err(|e| Error::fatal(format!("could not write manifests: {e}")))?;
        touch(msg).await;

        let tar_path = working_dir.join(format!("{part_name}.tar"));
        tar_bag(&bag_dir, &tar_path)
            .map_err(|e| Error::fatal(format!("could not tar {}: {e}", bag_dir.display())))?;
        touch(msg).await;

        let tar_metadata = tokio::fs::metadata(&tar_path)
            .await
            .map_err(|e| Error::fatal(format!("could not stat {}: {e}", tar_path.display())))?;
        let url = store
            .save_large(
                &delivery_bucket,
                &bag_name,
                "application/tar",
                &tar_path,
                tar_metadata.len(),
                &Default::default(),
                None,
            )
            .await?;
        touch(msg).await;

        remove_local_set(&bag_dir, &tar_path).await;
        touch(msg).await;

        restored.push(RestoredSet {
            bag_name,
            url,
            file_count: set.len(),
            size: set_size,
        });
    }

    catalog
        .set_restoration_status_bulk(&[object_identifier.to_string()], "success")
        .await?;

    Ok(restored)
}

/// Deletes the local bag directory and tar before the next set begins
/// (spec §4.H step 3.f) — best-effort, since a stray leftover is cleaned
/// up by the next restore of this object rather than blocking progress.
async fn remove_local_set(bag_dir: &Path, tar_path: &Path) {
    tokio::fs::remove_dir_all(bag_dir).await.ok();
    tokio::fs::remove_file(tar_path).await.ok();
}
