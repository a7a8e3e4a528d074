use anyhow::Result;
use camino::Utf8PathBuf;
use directories::UserDirs;
use platypus_scanner::{DuplicateFinder, DuplicateReport, ScanError, ScanOptions, ScanProgress};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ports::{DuplicateScanPort, LocationProvider};

/// The user's home and well-known media folders, in that order.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserDirsLocations;

impl LocationProvider for UserDirsLocations {
    fn candidate_roots(&self) -> Result<Vec<Utf8PathBuf>> {
        let dirs = UserDirs::new()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

        let candidates = [
            Some(dirs.home_dir()),
            dirs.audio_dir(),
            dirs.video_dir(),
            dirs.picture_dir(),
            dirs.download_dir(),
            dirs.document_dir(),
        ];

        let mut roots = Vec::new();
        for path in candidates.into_iter().flatten() {
            match Utf8PathBuf::from_path_buf(path.to_path_buf()) {
                Ok(p) if !roots.contains(&p) => roots.push(p),
                Ok(_) => {}
                Err(p) => debug!("Ignoring non UTF-8 location {}", p.display()),
            }
        }
        Ok(roots)
    }
}

/// Local filesystem duplicate scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDuplicateScanner;

impl DuplicateScanPort for FsDuplicateScanner {
    fn find_duplicates(
        &self,
        options: &ScanOptions,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(ScanProgress) + Send + Sync),
    ) -> Result<DuplicateReport, ScanError> {
        DuplicateFinder::find_duplicates(options, cancel, on_progress)
    }
}
