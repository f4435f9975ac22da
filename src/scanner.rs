//! Incremental repository scanning.
//!
//! Walks the repository for jars, decides per jar whether it changed since it
//! was last indexed (by file modification time), and replaces the class set of
//! every changed jar in one store transaction. Bad entries and unreadable jars
//! are logged and skipped; only store failures abort a scan.
//!
//! A jar is fully extracted before its transaction starts. When a changed jar
//! cannot be opened or read, its previously indexed classes stay in place and
//! keep their old timestamp, so the next scan retries it.

use ignore::WalkBuilder;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Instant, UNIX_EPOCH};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::classfile::parse_class;
use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::model::ScanReport;
use crate::store::{ClassRecord, IndexStore};

const ARCHIVE_EXTENSION: &str = "jar";
const SIDE_ARTIFACT_MARKERS: [&str; 2] = ["-sources", "-javadoc"];
const PROGRESS_EVERY: usize = 100;
/// Upper bound for one class entry. Declared entry sizes come from the zip
/// directory and are not trusted.
const MAX_CLASS_BYTES: u64 = 64 * 1024 * 1024;
const READ_BUFFER_HINT: u64 = 64 * 1024;

pub struct RepositoryScanner {
    store: Arc<IndexStore>,
    root: PathBuf,
    scan_guard: Mutex<()>,
}

impl RepositoryScanner {
    pub fn new(store: Arc<IndexStore>, config: &Config) -> Self {
        Self::with_root(store, config.repository_root.clone())
    }

    pub fn with_root(store: Arc<IndexStore>, root: PathBuf) -> Self {
        Self {
            store,
            root,
            scan_guard: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescans changed jars and returns how many were reindexed.
    pub fn scan_repository(&self, force: bool) -> Result<usize> {
        Ok(self.scan_repository_report(force)?.changed_jars)
    }

    pub fn scan_repository_report(&self, force: bool) -> Result<ScanReport> {
        // One scan at a time, so per-archive replacements never interleave.
        let _guard = self
            .scan_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let start = Instant::now();
        let mut report = ScanReport {
            root: self.root.to_string_lossy().to_string(),
            ..ScanReport::default()
        };

        if !self.root.exists() {
            warn!(root = %self.root.display(), "repository root does not exist, nothing to scan");
            return Ok(report);
        }

        info!(root = %self.root.display(), force, "scanning repository");
        let jars = find_archives(&self.root);
        report.scanned_jars = jars.len();
        info!(jars = jars.len(), "found archives");

        let mut stale = Vec::new();
        for jar in jars {
            if self.is_stale(&jar, force)? {
                stale.push(jar);
            }
        }

        let done = AtomicUsize::new(0);
        let outcomes: Vec<(PathBuf, Result<usize>)> = stale
            .into_par_iter()
            .map(|jar| {
                let outcome = self.rescan_archive(&jar);
                if outcome.is_ok() {
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % PROGRESS_EVERY == 0 {
                        info!(archives = n, "scan progress");
                    }
                }
                (jar, outcome)
            })
            .collect();

        for (jar, outcome) in outcomes {
            match outcome {
                Ok(classes) => {
                    report.changed_jars += 1;
                    report.indexed_classes += classes;
                }
                Err(err) if err.is_persistence() => return Err(err),
                Err(err) => {
                    report.failed_jars += 1;
                    warn!(jar = %jar.display(), error = %err, "skipping archive");
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            changed = report.changed_jars,
            failed = report.failed_jars,
            classes = report.indexed_classes,
            duration_ms = report.duration_ms,
            "scan finished"
        );
        Ok(report)
    }

    /// A jar is stale when forced, never indexed, newer on disk than its
    /// recorded timestamp, or when its timestamp cannot be read.
    pub fn is_stale(&self, jar: &Path, force: bool) -> Result<bool> {
        if force {
            return Ok(true);
        }
        let modified = match file_mtime_millis(jar) {
            Ok(m) => m,
            Err(err) => {
                warn!(jar = %jar.display(), error = %err, "cannot read modification time");
                return Ok(true);
            }
        };
        let cached = self.store.archive_last_modified(&jar_key(jar))?;
        Ok(cached.is_none_or(|cached| modified > cached))
    }

    /// Extracts one jar and atomically replaces its indexed classes.
    pub fn rescan_archive(&self, jar: &Path) -> Result<usize> {
        debug!(jar = %jar.display(), "indexing archive");
        let modified = file_mtime_millis(jar).map_err(|err| IndexError::archive(jar, err))?;
        let records = extract_archive(jar)?;
        self.store.replace_archive(&jar_key(jar), modified, &records)
    }
}

/// Recursively lists indexable jars under `root`, sorted by path.
pub fn find_archives(root: &Path) -> Vec<PathBuf> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if entry.file_type().is_some_and(|t| t.is_file()) && is_indexable_archive(path) {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut jars: Vec<PathBuf> = rx.iter().collect();
    jars.sort();
    jars
}

pub fn is_indexable_archive(path: &Path) -> bool {
    if !path.extension().is_some_and(|e| e == ARCHIVE_EXTENSION) {
        return false;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    !SIDE_ARTIFACT_MARKERS.iter().any(|m| name.contains(m))
}

/// Top-level class entries only; nested and anonymous classes carry `$`.
pub fn is_indexable_entry(name: &str) -> bool {
    name.ends_with(".class") && !name.contains('$')
}

/// Parses every top-level class in a jar. Entries that cannot be read or
/// parsed are logged and left out.
pub fn extract_archive(jar: &Path) -> Result<Vec<ClassRecord>> {
    let file = File::open(jar).map_err(|err| IndexError::archive(jar, err))?;
    // SAFETY: The file is opened read-only and outlives the mapping, which is
    // dropped at the end of this function.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|err| IndexError::archive(jar, err))?;
    let mut archive =
        ZipArchive::new(Cursor::new(&mmap[..])).map_err(|err| IndexError::archive(jar, err))?;

    let mut records = Vec::new();
    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(jar = %jar.display(), index = i, error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !is_indexable_entry(entry.name()) {
            continue;
        }
        let name = entry.name().to_string();

        if entry.size() > MAX_CLASS_BYTES {
            debug!(jar = %jar.display(), entry = %name, size = entry.size(), "skipping oversized class entry");
            continue;
        }
        let mut content = Vec::with_capacity(entry.size().min(READ_BUFFER_HINT) as usize);
        if let Err(err) = (&mut entry).take(MAX_CLASS_BYTES + 1).read_to_end(&mut content) {
            debug!(jar = %jar.display(), entry = %name, error = %err, "failed to read class entry");
            continue;
        }
        if content.len() as u64 > MAX_CLASS_BYTES {
            debug!(jar = %jar.display(), entry = %name, "skipping oversized class entry");
            continue;
        }

        match parse_class(&content) {
            Ok(class) => records.push(ClassRecord { class, content }),
            Err(err) => {
                debug!(jar = %jar.display(), entry = %name, error = %err, "failed to parse class entry");
            }
        }
    }
    Ok(records)
}

fn jar_key(jar: &Path) -> String {
    jar.to_string_lossy().to_string()
}

fn file_mtime_millis(path: &Path) -> std::io::Result<i64> {
    let modified = path.metadata()?.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    Ok(i64::try_from(millis).unwrap_or(i64::MAX))
}
