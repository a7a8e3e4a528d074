use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "aac", "ogg", "wma"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "wmv", "webm", "flv", "m4v"];

/// How many enumerated entries pass between two enumeration reports.
const ENUMERATION_REPORT_EVERY: u64 = 64;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not a directory")]
    NotADirectory(Utf8PathBuf),
    #[error("Scan cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Audio => AUDIO_EXTENSIONS,
            MediaKind::Video => VIDEO_EXTENSIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub root: Utf8PathBuf,
    pub recursive: bool,
    /// Lowercase, without the leading dot. Empty accepts every file.
    pub extensions: BTreeSet<String>,
}

impl ScanOptions {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: true,
            extensions: BTreeSet::new(),
        }
    }

    pub fn with_media(mut self, kind: MediaKind) -> Self {
        self.extensions
            .extend(kind.extensions().iter().map(|e| (*e).to_string()));
        self
    }

    /// Accepts `mp3`, `.MP3` and ` .mp3 ` alike.
    pub fn with_extension(mut self, ext: &str) -> Self {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        if !ext.is_empty() {
            self.extensions.insert(ext);
        }
        self
    }

    pub fn accepts(&self, path: &Utf8Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanPhase {
    Enumerating,
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub done: u64,
    /// 0 while enumerating; the total is not known yet.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub digest: String,
    pub size: u64,
    pub files: Vec<Utf8PathBuf>,
}

impl DuplicateGroup {
    /// Bytes reclaimable by keeping a single copy.
    pub fn wasted_bytes(&self) -> u64 {
        self.size
            .saturating_mul(self.files.len().saturating_sub(1) as u64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub files_scanned: u64,
    pub files_hashed: u64,
    pub files_failed: u64,
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    pub fn wasted_bytes(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_bytes).sum()
    }
}

/// MD5 of the whole file as lowercase hex.
pub fn hash_file(path: &Utf8Path) -> Result<String, ScanError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = md5::Context::new();
    let mut buf = vec![0u8; platypus_config::HASH_CHUNK_BYTES];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.consume(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub struct DuplicateFinder;

impl DuplicateFinder {
    /// Groups files with identical content under `options.root`.
    ///
    /// Files are bucketed by size first; only sizes shared by two or more
    /// files are hashed. Empty files are never reported. Unreadable files are
    /// counted in `files_failed` and skipped.
    pub fn find_duplicates(
        options: &ScanOptions,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(ScanProgress) + Send + Sync),
    ) -> Result<DuplicateReport, ScanError> {
        if !options.root.is_dir() {
            return Err(ScanError::NotADirectory(options.root.clone()));
        }
        info!("Scanning {} for duplicates", options.root);

        let (by_size, files_scanned) = Self::enumerate(options, cancel, on_progress)?;

        let candidates: Vec<(u64, Utf8PathBuf)> = by_size
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .flat_map(|(size, paths)| paths.into_iter().map(move |p| (size, p)))
            .collect();
        let total = candidates.len() as u64;
        debug!("{} of {} files share a size", total, files_scanned);

        let hashed = Mutex::new(0u64);
        let failed = AtomicU64::new(0);
        on_progress(ScanProgress {
            phase: ScanPhase::Hashing,
            done: 0,
            total,
        });

        let digests: Result<Vec<Option<(u64, String, Utf8PathBuf)>>, ScanError> = candidates
            .into_par_iter()
            .map(|(size, path)| {
                if cancel.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }
                let digest = match hash_file(&path) {
                    Ok(d) => Some((size, d, path)),
                    Err(e) => {
                        warn!("Skipping {}: {}", path, e);
                        failed.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                };
                // Counting and reporting under one lock keeps reports monotonic.
                let mut done = hashed.lock().unwrap_or_else(|e| e.into_inner());
                *done += 1;
                on_progress(ScanProgress {
                    phase: ScanPhase::Hashing,
                    done: *done,
                    total,
                });
                Ok(digest)
            })
            .collect();

        let mut by_digest: HashMap<(u64, String), Vec<Utf8PathBuf>> = HashMap::new();
        for (size, digest, path) in digests?.into_iter().flatten() {
            by_digest.entry((size, digest)).or_default().push(path);
        }

        let mut groups: Vec<DuplicateGroup> = by_digest
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|((size, digest), mut files)| {
                files.sort();
                DuplicateGroup {
                    digest,
                    size,
                    files,
                }
            })
            .collect();
        groups.sort_by(|a, b| {
            b.wasted_bytes()
                .cmp(&a.wasted_bytes())
                .then_with(|| a.files.cmp(&b.files))
        });

        let files_failed = failed.into_inner();
        let files_hashed = hashed
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .saturating_sub(files_failed);
        info!(
            "Found {} duplicate groups in {} files",
            groups.len(),
            files_scanned
        );

        Ok(DuplicateReport {
            files_scanned,
            files_hashed,
            files_failed,
            groups,
        })
    }

    fn enumerate(
        options: &ScanOptions,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(ScanProgress) + Send + Sync),
    ) -> Result<(HashMap<u64, Vec<Utf8PathBuf>>, u64), ScanError> {
        let max_depth = if options.recursive { usize::MAX } else { 1 };
        let mut by_size: HashMap<u64, Vec<Utf8PathBuf>> = HashMap::new();
        let mut seen = 0u64;

        for entry in WalkDir::new(&options.root).max_depth(max_depth) {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => path,
                Err(raw) => {
                    warn!("Skipping non UTF-8 path {}", raw.display());
                    continue;
                }
            };
            if !options.accepts(&path) {
                continue;
            }
            let size = match path.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    warn!("Skipping {}: {}", path, e);
                    continue;
                }
            };

            seen += 1;
            if seen % ENUMERATION_REPORT_EVERY == 0 {
                on_progress(ScanProgress {
                    phase: ScanPhase::Enumerating,
                    done: seen,
                    total: 0,
                });
            }
            if size > 0 {
                by_size.entry(size).or_default().push(path);
            }
        }

        Ok((by_size, seen))
    }
}
