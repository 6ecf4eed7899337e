//! Process-wide singletons bundled into one handle, rather than scattered
//! module-level statics, so tests can construct an isolated context per
//! case (spec §4.D, §4.E; DESIGN.md "ProcessContext over statics").

use std::path::PathBuf;
use std::sync::Arc;

use archivist_catalog::Client as CatalogClient;
use archivist_diskres::DiskReservation;
use archivist_inflight::InFlightRegistry;
use archivist_objectstore::Client as ObjectStoreClient;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct ProcessContext {
    pub store: Arc<ObjectStoreClient>,
    pub catalog: Arc<CatalogClient>,
    pub disk: Arc<DiskReservation>,
    pub inflight: Arc<InFlightRegistry>,
    pub working_dir: PathBuf,
    pub preservation_bucket: String,
    /// The implementing-agent string recorded on non-fixity events (spec
    /// §3 "Preservation-object model").
    pub agent: String,
    /// Restore delivers to `aptrust.restore.test.<institution>` instead of
    /// `aptrust.restore.<institution>` when set (spec §6 `restore_to_test_buckets`).
    pub restore_to_test_buckets: bool,
    /// Cancelled on SIGTERM/SIGINT; stage implementations check this
    /// between suspension points so shutdown can happen between messages
    /// rather than mid-write (spec §9 REDESIGN FLAGS: the original had no
    /// cooperative cancellation).
    pub shutdown: CancellationToken,
}

impl ProcessContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ObjectStoreClient>,
        catalog: Arc<CatalogClient>,
        disk: Arc<DiskReservation>,
        inflight: Arc<InFlightRegistry>,
        working_dir: PathBuf,
        preservation_bucket: String,
        agent: String,
        restore_to_test_buckets: bool,
    ) -> Self {
        ProcessContext {
            store,
            catalog,
            disk,
            inflight,
            working_dir,
            preservation_bucket,
            agent,
            restore_to_test_buckets,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
