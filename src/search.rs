//! Query surface over the index.
//!
//! Candidates come from three sources (class name, package, method members),
//! are deduplicated on (class, jar), scored, and truncated. An empty index is
//! populated by an incremental scan before the first query runs.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::model::{CacheStats, ClassDetail, ClassSummary, CompleteClassInfo};
use crate::scanner::RepositoryScanner;
use crate::store::{ClassMembers, IndexReader, IndexStore, StoredClass};

pub const DEFAULT_LIMIT: usize = 50;

const EXACT_SIMPLE_NAME: u32 = 1000;
const SIMPLE_NAME_PREFIX: u32 = 500;
const SIMPLE_NAME_CONTAINS: u32 = 200;
const QUALIFIED_NAME_CONTAINS: u32 = 100;
const PACKAGE_CONTAINS: u32 = 50;
const METHOD_MATCH: u32 = 30;
const FIELD_MATCH: u32 = 20;

pub struct SearchEngine {
    store: Arc<IndexStore>,
    scanner: Arc<RepositoryScanner>,
}

impl SearchEngine {
    pub fn new(store: Arc<IndexStore>, scanner: Arc<RepositoryScanner>) -> Self {
        Self { store, scanner }
    }

    /// Ranked search. Never fails: a blank query or a store failure yields an
    /// empty result, the latter with an error logged.
    pub fn search_classes(&self, query: Option<&str>, limit: usize) -> Vec<ClassSummary> {
        let Some(query) = query.filter(|q| !q.trim().is_empty()) else {
            return Vec::new();
        };
        match self.ranked(query, limit) {
            Ok(results) => results,
            Err(err) => {
                error!(query, error = %err, "search failed");
                Vec::new()
            }
        }
    }

    fn ranked(&self, query: &str, limit: usize) -> Result<Vec<ClassSummary>> {
        self.ensure_indexed();
        let reader = self.store.read()?;

        let (mut candidates, by_package) =
            reader.find_by_name_and_package(query, limit.saturating_mul(2), limit)?;
        candidates.extend(by_package);
        candidates.extend(reader.find_by_member(query, limit)?);

        let mut seen = HashSet::new();
        let mut scored = Vec::new();
        for stored in candidates {
            if !seen.insert((
                stored.summary.class_name.clone(),
                stored.summary.jar_path.clone(),
            )) {
                continue;
            }
            let members = reader.members(stored.id)?;
            let score = match_score(&stored.summary, &members, query);
            scored.push((score, stored.summary.class_name.to_lowercase(), stored.summary));
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        debug!(query, candidates = scored.len(), "ranked candidates");
        Ok(scored.into_iter().take(limit).map(|s| s.2).collect())
    }

    /// Runs a scan first when nothing has been indexed yet. Scan failures are
    /// logged; the query then proceeds against whatever is stored.
    fn ensure_indexed(&self) {
        match self.store.class_count() {
            Ok(0) => {
                info!("index is empty, scanning repository");
                if let Err(err) = self.scanner.scan_repository(false) {
                    error!(error = %err, "initial scan failed");
                }
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "failed to read index size"),
        }
    }

    /// Methods and fields of the first class stored under `class_name`.
    pub fn get_class_detail(&self, class_name: &str) -> Result<Option<ClassDetail>> {
        if class_name.trim().is_empty() {
            return Ok(None);
        }
        let reader = self.store.read()?;
        match reader.first_by_name(class_name)? {
            Some(stored) => Ok(Some(detail_of(&reader, stored)?)),
            None => Ok(None),
        }
    }

    /// Raw class-file bytes for a class, optionally pinned to one jar.
    pub fn get_class_content(
        &self,
        class_name: &str,
        jar_path: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self
            .get_complete_class_info(class_name, jar_path)?
            .map(|info| info.content))
    }

    /// Detail plus payload and its SHA-256 digest. Without a jar, the exact
    /// class name is looked up first and the top search hit is the fallback.
    pub fn get_complete_class_info(
        &self,
        class_name: &str,
        jar_path: Option<&str>,
    ) -> Result<Option<CompleteClassInfo>> {
        if class_name.trim().is_empty() {
            return Ok(None);
        }
        let Some((class_name, jar_path)) = self.locate(class_name, jar_path)? else {
            return Ok(None);
        };

        let reader = self.store.read()?;
        let Some(stored) = reader.get(&class_name, &jar_path)? else {
            return Ok(None);
        };
        let Some(content) = reader.content(stored.id)? else {
            return Ok(None);
        };
        let detail = detail_of(&reader, stored)?;
        Ok(Some(CompleteClassInfo {
            detail,
            content_hash: hash_content(&content),
            content,
        }))
    }

    /// Resolves the (class, jar) pair to load. Each lookup uses its own read
    /// snapshot, since the search fallback may trigger a scan.
    fn locate(&self, class_name: &str, jar_path: Option<&str>) -> Result<Option<(String, String)>> {
        if let Some(jar) = jar_path.filter(|j| !j.trim().is_empty()) {
            return Ok(Some((class_name.to_string(), jar.to_string())));
        }
        let exact = self.store.read()?.first_by_name(class_name)?;
        if let Some(stored) = exact {
            return Ok(Some((stored.summary.class_name, stored.summary.jar_path)));
        }
        Ok(self
            .search_classes(Some(class_name), 1)
            .into_iter()
            .next()
            .map(|hit| (hit.class_name, hit.jar_path)))
    }

    pub fn get_cache_stats(&self) -> Result<CacheStats> {
        self.store.stats()
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.store.clear()?;
        info!("index cleared");
        Ok(())
    }
}

/// Relevance of one candidate for `query`, case-insensitive.
pub fn match_score(summary: &ClassSummary, members: &ClassMembers, query: &str) -> u32 {
    let query = query.to_lowercase();
    let simple = summary.simple_name().to_lowercase();
    let mut score = 0;

    if simple == query {
        score += EXACT_SIMPLE_NAME;
    } else if simple.starts_with(&query) {
        score += SIMPLE_NAME_PREFIX;
    } else if simple.contains(&query) {
        score += SIMPLE_NAME_CONTAINS;
    }
    if summary.class_name.to_lowercase().contains(&query) {
        score += QUALIFIED_NAME_CONTAINS;
    }
    if summary.package_name.to_lowercase().contains(&query) {
        score += PACKAGE_CONTAINS;
    }
    if members.methods.iter().any(|m| {
        m.name.to_lowercase().contains(&query) || m.signature.to_lowercase().contains(&query)
    }) {
        score += METHOD_MATCH;
    }
    if members.fields.iter().any(|f| {
        f.name.to_lowercase().contains(&query) || f.field_type.to_lowercase().contains(&query)
    }) {
        score += FIELD_MATCH;
    }
    score
}

pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Members are stored in declaration order; details list them by name.
fn detail_of(reader: &IndexReader<'_>, stored: StoredClass) -> Result<ClassDetail> {
    let mut members = reader.members(stored.id)?;
    members.methods.sort_by(|a, b| a.name.cmp(&b.name));
    members.fields.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ClassDetail {
        summary: stored.summary,
        methods: members.methods.into_iter().map(|m| m.signature).collect(),
        fields: members.fields.iter().map(|f| f.declaration()).collect(),
    })
}
