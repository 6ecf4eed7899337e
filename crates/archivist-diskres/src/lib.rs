//! Advisory disk-space reservation over a single working volume (spec §4.D).
//!
//! Not kernel-enforced: it exists so the pipeline can decline to fetch a
//! 240 GB bag when only 180 GB is actually free, rather than filling the
//! working volume and taking down every other in-flight bag with it.

use std::path::{Path, PathBuf};

use archivist_error::{Error, Result};
use parking_lot::Mutex;

pub struct DiskReservation {
    path: PathBuf,
    initial_free: u64,
    safety_margin: u64,
    claimed: Mutex<u64>,
}

impl DiskReservation {
    pub fn new(path: impl AsRef<Path>, safety_margin: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let initial_free = fs2::available_space(&path)
            .map_err(|e| Error::fatal(format!("could not read free space for {}: {e}", path.display())))?;
        Ok(DiskReservation {
            path,
            initial_free,
            safety_margin,
            claimed: Mutex::new(0),
        })
    }

    fn current_free(&self) -> u64 {
        fs2::available_space(&self.path).unwrap_or(0)
    }

    /// Fails when `current_free() - n < safety_margin`.
    pub fn reserve(&self, n: u64) -> Result<()> {
        let free = self.current_free();
        if free < n || free - n < self.safety_margin {
            return Err(Error::fatal(format!(
                "insufficient disk space on {}: {free} bytes free, need {n} plus a {} byte margin",
                self.path.display(),
                self.safety_margin
            )));
        }
        *self.claimed.lock() += n;
        Ok(())
    }

    pub fn release(&self, n: u64) {
        let mut claimed = self.claimed.lock();
        *claimed = claimed.saturating_sub(n);
    }

    pub fn available(&self) -> u64 {
        self.initial_free.saturating_sub(*self.claimed.lock())
    }
}
