//! Process configuration: a `clap::Parser` struct covering every field spec
//! §6 names, loaded from CLI flags or the matching `env` variable, mirroring
//! the teacher's `agent` binary's `#[clap(long, env = "...")]` idiom
//! (`crates/agent/src/main.rs`).

use std::path::PathBuf;
use std::time::Duration;

use archivist_error::{Error, Result};
use clap::Parser;

/// Default per-message timeout: 12 minutes (spec §4.F).
pub const DEFAULT_MSG_TIMEOUT_SECS: u64 = 12 * 60;
/// Hard cap on a message's maximum timeout: 24 hours (spec §4.F).
pub const MAX_MSG_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    /// Local directory used for in-progress bag downloads and unpacking.
    #[clap(long = "working-dir", env = "WORKING_DIR", default_value = "/tmp/archivist")]
    pub working_dir: PathBuf,

    /// Directory structured logs are written to, in addition to stderr.
    #[clap(long = "log-dir", env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Bucket preservation copies are streamed to.
    #[clap(long = "preservation-bucket", env = "PRESERVATION_BUCKET")]
    pub preservation_bucket: String,

    /// URL of the catalog's HTTP API.
    #[clap(long = "catalog-url", env = "CATALOG_URL")]
    pub catalog_url: url::Url,
    #[clap(long = "catalog-user", env = "CATALOG_USER")]
    pub catalog_user: String,
    #[clap(long = "catalog-key", env = "CATALOG_KEY")]
    pub catalog_key: String,

    /// Base URL of the NSQ HTTP `/pub` endpoint.
    #[clap(long = "nsq-http-address", env = "NSQ_HTTP_ADDRESS")]
    pub nsq_http_address: String,
    /// `host:port` of the NSQ TCP consumer endpoint.
    #[clap(long = "nsq-tcp-address", env = "NSQ_TCP_ADDRESS")]
    pub nsq_tcp_address: String,
    #[clap(long = "nsq-channel", env = "NSQ_CHANNEL", default_value = "archivist")]
    pub nsq_channel: String,

    /// Deliver restore bags to `aptrust.restore.test.<institution>` rather
    /// than the production delivery bucket.
    #[clap(long = "restore-to-test-buckets", env = "RESTORE_TO_TEST_BUCKETS")]
    pub restore_to_test_buckets: bool,

    /// Skip files the catalog already has a matching-MD5 copy of, rather
    /// than re-uploading them (spec §4.G "MergeExistingFiles").
    #[clap(long = "skip-already-processed", env = "SKIP_ALREADY_PROCESSED", default_value = "true")]
    pub skip_already_processed: bool,

    #[clap(long = "fetch-workers", env = "FETCH_WORKERS", default_value = "4")]
    pub fetch_workers: usize,
    #[clap(long = "unpack-workers", env = "UNPACK_WORKERS", default_value = "4")]
    pub unpack_workers: usize,
    #[clap(long = "store-workers", env = "STORE_WORKERS", default_value = "4")]
    pub store_workers: usize,
    #[clap(long = "record-workers", env = "RECORD_WORKERS", default_value = "2")]
    pub record_workers: usize,
    #[clap(long = "cleanup-workers", env = "CLEANUP_WORKERS", default_value = "2")]
    pub cleanup_workers: usize,
    #[clap(long = "restore-workers", env = "RESTORE_WORKERS", default_value = "2")]
    pub restore_workers: usize,
    #[clap(long = "delete-workers", env = "DELETE_WORKERS", default_value = "2")]
    pub delete_workers: usize,
    #[clap(long = "fixity-workers", env = "FIXITY_WORKERS", default_value = "2")]
    pub fixity_workers: usize,

    #[clap(long = "fetch-max-attempts", env = "FETCH_MAX_ATTEMPTS", default_value = "5")]
    pub fetch_max_attempts: u32,
    #[clap(long = "unpack-max-attempts", env = "UNPACK_MAX_ATTEMPTS", default_value = "5")]
    pub unpack_max_attempts: u32,
    #[clap(long = "store-max-attempts", env = "STORE_MAX_ATTEMPTS", default_value = "5")]
    pub store_max_attempts: u32,
    #[clap(long = "record-max-attempts", env = "RECORD_MAX_ATTEMPTS", default_value = "5")]
    pub record_max_attempts: u32,
    #[clap(long = "cleanup-max-attempts", env = "CLEANUP_MAX_ATTEMPTS", default_value = "5")]
    pub cleanup_max_attempts: u32,
    #[clap(long = "restore-max-attempts", env = "RESTORE_MAX_ATTEMPTS", default_value = "3")]
    pub restore_max_attempts: u32,
    #[clap(long = "delete-max-attempts", env = "DELETE_MAX_ATTEMPTS", default_value = "3")]
    pub delete_max_attempts: u32,
    #[clap(long = "fixity-max-attempts", env = "FIXITY_MAX_ATTEMPTS", default_value = "3")]
    pub fixity_max_attempts: u32,

    #[clap(long = "msg-timeout-secs", env = "MSG_TIMEOUT_SECS", default_value_t = DEFAULT_MSG_TIMEOUT_SECS)]
    pub msg_timeout_secs: u64,
    #[clap(long = "max-msg-timeout-secs", env = "MAX_MSG_TIMEOUT_SECS", default_value_t = MAX_MSG_TIMEOUT_SECS)]
    pub max_msg_timeout_secs: u64,
}

impl Config {
    pub fn msg_timeout(&self) -> Duration {
        Duration::from_secs(self.msg_timeout_secs)
    }

    pub fn max_msg_timeout(&self) -> Duration {
        Duration::from_secs(self.max_msg_timeout_secs)
    }

    /// Fails fast with a descriptive error on an unwritable working
    /// directory or a malformed catalog URL scheme, rather than letting
    /// the first worker discover it mid-message (spec §7 `Configuration`
    /// error kind).
    pub fn validate(&self) -> Result<()> {
        if self.catalog_url.scheme() != "http" && self.catalog_url.scheme() != "https" {
            return Err(Error::configuration(format!(
                "catalog URL '{}' must use http or https",
                self.catalog_url
            )));
        }

        std::fs::create_dir_all(&self.working_dir).map_err(|e| {
            Error::configuration(format!(
                "working directory {} is not writable: {e}",
                self.working_dir.display()
            ))
        })?;
        let probe = self.working_dir.join(".archivist-write-probe");
        std::fs::write(&probe, b"").map_err(|e| {
            Error::configuration(format!(
                "working directory {} is not writable: {e}",
                self.working_dir.display()
            ))
        })?;
        std::fs::remove_file(&probe).ok();

        if self.max_msg_timeout_secs < self.msg_timeout_secs {
            return Err(Error::configuration(
                "max-msg-timeout-secs must be at least msg-timeout-secs",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(working_dir: PathBuf) -> Config {
        Config {
            working_dir,
            log_dir: None,
            preservation_bucket: "aptrust.preservation.test".to_string(),
            catalog_url: url::Url::parse("https://catalog.example.org").unwrap(),
            catalog_user: "user".to_string(),
            catalog_key: "key".to_string(),
            nsq_http_address: "http://127.0.0.1:4151".to_string(),
            nsq_tcp_address: "127.0.0.1:4150".to_string(),
            nsq_channel: "archivist".to_string(),
            restore_to_test_buckets: false,
            skip_already_processed: true,
            fetch_workers: 4,
            unpack_workers: 4,
            store_workers: 4,
            record_workers: 2,
            cleanup_workers: 2,
            restore_workers: 2,
            delete_workers: 2,
            fixity_workers: 2,
            fetch_max_attempts: 5,
            unpack_max_attempts: 5,
            store_max_attempts: 5,
            record_max_attempts: 5,
            cleanup_max_attempts: 5,
            restore_max_attempts: 3,
            delete_max_attempts: 3,
            fixity_max_attempts: 3,
            msg_timeout_secs: DEFAULT_MSG_TIMEOUT_SECS,
            max_msg_timeout_secs: MAX_MSG_TIMEOUT_SECS,
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path().to_path_buf());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_http_catalog_url_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path().to_path_buf());
        config.catalog_url = url::Url::parse("ftp://catalog.example.org").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_timeouts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path().to_path_buf());
        config.max_msg_timeout_secs = 10;
        config.msg_timeout_secs = 20;
        assert!(config.validate().is_err());
    }
}
