//! Persistent class index.
//!
//! Uses LMDB (via heed) with one named database per record set:
//!
//! - `classes`: class id -> class row (JSON)
//! - `class_content`: class id -> raw class file bytes
//! - `methods` / `fields`: class id + sequence -> member row (JSON)
//! - `class_keys`: `sha256(name) ++ sha256(jar)` -> class id, the uniqueness key
//! - `archive_classes`: `sha256(jar) ++ sha256(name)` -> class id, for
//!   per-archive deletes and staleness lookups
//!
//! Secondary keys are fixed-width digests so that long class names or deep
//! jar paths never exceed the LMDB key size limit. The readable strings live
//! in the class row.
//!
//! LMDB has no foreign keys, so member rows are removed explicitly before
//! their owning class row, always inside the same write transaction.

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn, WithTls};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::classfile::{FieldInfo, MethodInfo, ParsedClass};
use crate::error::{IndexError, Result};
use crate::model::{CacheStats, ClassSummary};

pub const CLASSES_DB: &str = "classes";
pub const CLASS_CONTENT_DB: &str = "class_content";
pub const METHODS_DB: &str = "methods";
pub const FIELDS_DB: &str = "fields";
pub const CLASS_KEYS_DB: &str = "class_keys";
pub const ARCHIVE_CLASSES_DB: &str = "archive_classes";

const DEFAULT_MAP_SIZE: usize = 4 * 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 16;
const DIGEST_LEN: usize = 32;

type RowDb = Database<Bytes, Str>;
type BlobDb = Database<Bytes, Bytes>;
type KeyDb = Database<Bytes, Bytes>;

/// A parsed class ready to be written, with its raw payload.
#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub class: ParsedClass,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassRow {
    #[serde(flatten)]
    summary: ClassSummary,
    created_at: u64,
}

/// A class row together with its store id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredClass {
    pub id: u64,
    pub summary: ClassSummary,
    pub created_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMembers {
    pub methods: Vec<MethodInfo>,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug)]
pub struct IndexStore {
    env: Arc<Env>,
    db_path: PathBuf,
    classes: RowDb,
    class_content: BlobDb,
    methods: RowDb,
    fields: RowDb,
    class_keys: KeyDb,
    archive_classes: KeyDb,
}

impl IndexStore {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let env = Arc::new(open_env(&db_path)?);

        let mut wtxn = env.write_txn()?;
        let classes = env.create_database::<Bytes, Str>(&mut wtxn, Some(CLASSES_DB))?;
        let class_content = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(CLASS_CONTENT_DB))?;
        let methods = env.create_database::<Bytes, Str>(&mut wtxn, Some(METHODS_DB))?;
        let fields = env.create_database::<Bytes, Str>(&mut wtxn, Some(FIELDS_DB))?;
        let class_keys = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(CLASS_KEYS_DB))?;
        let archive_classes =
            env.create_database::<Bytes, Bytes>(&mut wtxn, Some(ARCHIVE_CLASSES_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db_path,
            classes,
            class_content,
            methods,
            fields,
            class_keys,
            archive_classes,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Opens a read snapshot. Everything read through one reader is
    /// consistent, even while a scan commits other archives.
    pub fn read(&self) -> Result<IndexReader<'_>> {
        Ok(IndexReader {
            store: self,
            rtxn: self.env.read_txn()?,
        })
    }

    /// Replaces the whole class set of one archive in a single transaction.
    pub fn replace_archive(
        &self,
        jar_path: &str,
        jar_last_modified: i64,
        records: &[ClassRecord],
    ) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let removed = self.delete_archive_in(&mut wtxn, jar_path)?;
        for record in records {
            self.insert_in(&mut wtxn, jar_path, jar_last_modified, record)?;
        }
        wtxn.commit()?;
        tracing::debug!(
            jar = jar_path,
            removed,
            inserted = records.len(),
            "replaced archive classes"
        );
        Ok(records.len())
    }

    /// Inserts one class, replacing any row with the same (name, jar) key.
    pub fn insert_class(
        &self,
        jar_path: &str,
        jar_last_modified: i64,
        record: &ClassRecord,
    ) -> Result<u64> {
        let mut wtxn = self.env.write_txn()?;
        let id = self.insert_in(&mut wtxn, jar_path, jar_last_modified, record)?;
        wtxn.commit()?;
        Ok(id)
    }

    pub fn delete_class(&self, class_name: &str, jar_path: &str) -> Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        let key = class_key(class_name, jar_path);
        let existing = self.class_keys.get(&wtxn, &key)?.map(decode_id).transpose()?;
        let deleted = match existing {
            Some(id) => self.delete_by_id_in(&mut wtxn, id)?,
            None => false,
        };
        wtxn.commit()?;
        Ok(deleted)
    }

    pub fn delete_archive(&self, jar_path: &str) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let removed = self.delete_archive_in(&mut wtxn, jar_path)?;
        wtxn.commit()?;
        Ok(removed)
    }

    /// Timestamp recorded for an archive at its last indexing, if any class
    /// from it is stored. All rows of one archive share the timestamp.
    pub fn archive_last_modified(&self, jar_path: &str) -> Result<Option<i64>> {
        let rtxn = self.env.read_txn()?;
        let prefix = archive_prefix(jar_path);
        let first = match self.archive_classes.prefix_iter(&rtxn, &prefix)?.next() {
            Some(item) => decode_id(item?.1)?,
            None => return Ok(None),
        };
        Ok(parse_row(self.classes.get(&rtxn, &first.to_be_bytes())?)?
            .map(|row| row.summary.jar_last_modified))
    }

    pub fn class_count(&self) -> Result<u64> {
        let rtxn = self.env.read_txn()?;
        Ok(self.classes.len(&rtxn)?)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.read()?.stats()
    }

    /// Removes every record. Member rows go first, then classes and keys.
    pub fn clear(&self) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.fields.clear(&mut wtxn)?;
        self.methods.clear(&mut wtxn)?;
        self.class_content.clear(&mut wtxn)?;
        self.classes.clear(&mut wtxn)?;
        self.class_keys.clear(&mut wtxn)?;
        self.archive_classes.clear(&mut wtxn)?;
        wtxn.commit()?;
        Ok(())
    }

    fn insert_in(
        &self,
        wtxn: &mut RwTxn<'_>,
        jar_path: &str,
        jar_last_modified: i64,
        record: &ClassRecord,
    ) -> Result<u64> {
        let class = &record.class;
        let key = class_key(&class.class_name, jar_path);
        let existing = self.class_keys.get(wtxn, &key)?.map(decode_id).transpose()?;
        if let Some(old) = existing {
            self.delete_by_id_in(wtxn, old)?;
        }

        let id = match self.classes.last(wtxn)? {
            Some((k, _)) => decode_id(k)? + 1,
            None => 1,
        };
        let id_bytes = id.to_be_bytes();

        let row = ClassRow {
            summary: ClassSummary {
                class_name: class.class_name.clone(),
                package_name: class.package_name.clone(),
                jar_path: jar_path.to_string(),
                jar_last_modified,
            },
            created_at: now_secs(),
        };
        let payload = serde_json::to_string(&row)?;
        self.classes.put(wtxn, &id_bytes, &payload)?;
        self.class_content.put(wtxn, &id_bytes, &record.content)?;
        self.class_keys.put(wtxn, &key, &id_bytes)?;
        self.archive_classes
            .put(wtxn, &archive_key(jar_path, &class.class_name), &id_bytes)?;

        for (seq, method) in class.methods.iter().enumerate() {
            let payload = serde_json::to_string(method)?;
            self.methods.put(wtxn, &member_key(id, seq), &payload)?;
        }
        for (seq, field) in class.fields.iter().enumerate() {
            let payload = serde_json::to_string(field)?;
            self.fields.put(wtxn, &member_key(id, seq), &payload)?;
        }

        Ok(id)
    }

    fn delete_archive_in(&self, wtxn: &mut RwTxn<'_>, jar_path: &str) -> Result<usize> {
        let prefix = archive_prefix(jar_path);
        let ids = self
            .archive_classes
            .prefix_iter(wtxn, &prefix)?
            .map(|item| item.map_err(IndexError::from).and_then(|(_, v)| decode_id(v)))
            .collect::<Result<Vec<u64>>>()?;

        let mut removed = 0usize;
        for id in ids {
            if self.delete_by_id_in(wtxn, id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn delete_by_id_in(&self, wtxn: &mut RwTxn<'_>, id: u64) -> Result<bool> {
        let Some(row) = parse_row(self.classes.get(wtxn, &id.to_be_bytes())?)? else {
            return Ok(false);
        };

        let prefix = id.to_be_bytes();
        delete_prefix(&self.methods, wtxn, &prefix)?;
        delete_prefix(&self.fields, wtxn, &prefix)?;

        let summary = &row.summary;
        self.class_keys
            .delete(wtxn, &class_key(&summary.class_name, &summary.jar_path))?;
        self.archive_classes
            .delete(wtxn, &archive_key(&summary.jar_path, &summary.class_name))?;
        self.class_content.delete(wtxn, &prefix)?;
        self.classes.delete(wtxn, &prefix)?;
        Ok(true)
    }
}

/// A consistent read snapshot over the index.
pub struct IndexReader<'s> {
    store: &'s IndexStore,
    rtxn: RoTxn<'s, WithTls>,
}

impl IndexReader<'_> {
    pub fn class_count(&self) -> Result<u64> {
        Ok(self.store.classes.len(&self.rtxn)?)
    }

    /// One pass over the class rows feeding two candidate lists:
    /// classes whose qualified name contains `query` (exact match, then
    /// prefix match, then any other match, then alphabetical) and classes
    /// whose package contains `query` (by package, then name).
    pub fn find_by_name_and_package(
        &self,
        query: &str,
        name_limit: usize,
        package_limit: usize,
    ) -> Result<(Vec<StoredClass>, Vec<StoredClass>)> {
        let query = query.to_lowercase();
        let mut by_name = Vec::new();
        let mut by_package = Vec::new();
        for item in self.store.classes.iter(&self.rtxn)? {
            let stored = decode_stored(item?)?;
            let name = stored.summary.class_name.to_lowercase();
            let package = stored.summary.package_name.to_lowercase();

            if package.contains(&query) {
                by_package.push((package, name.clone(), stored.clone()));
            }
            if name.contains(&query) {
                let rank = if name == query {
                    0u8
                } else if name.starts_with(&query) {
                    1
                } else {
                    2
                };
                by_name.push((rank, name, stored));
            }
        }

        by_name.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.summary.jar_path.cmp(&b.2.summary.jar_path))
        });
        by_package.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.summary.jar_path.cmp(&b.2.summary.jar_path))
        });
        Ok((
            by_name.into_iter().take(name_limit).map(|h| h.2).collect(),
            by_package.into_iter().take(package_limit).map(|h| h.2).collect(),
        ))
    }

    /// Classes declaring a method whose name or signature contains `query`.
    pub fn find_by_member(&self, query: &str, limit: usize) -> Result<Vec<StoredClass>> {
        let query = query.to_lowercase();
        let mut owners = BTreeSet::new();
        for item in self.store.methods.iter(&self.rtxn)? {
            let (key, raw) = item?;
            let method: MethodInfo = serde_json::from_str(raw)?;
            if method.name.to_lowercase().contains(&query)
                || method.signature.to_lowercase().contains(&query)
            {
                owners.insert(owner_of(key)?);
            }
        }

        let mut hits = Vec::with_capacity(owners.len());
        for id in owners {
            if let Some(stored) = self.class_by_id(id)? {
                hits.push((stored.summary.class_name.to_lowercase(), stored));
            }
        }
        hits.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.summary.jar_path.cmp(&b.1.summary.jar_path))
        });
        Ok(hits.into_iter().take(limit).map(|h| h.1).collect())
    }

    pub fn class_by_id(&self, id: u64) -> Result<Option<StoredClass>> {
        let raw = self.store.classes.get(&self.rtxn, &id.to_be_bytes())?;
        Ok(parse_row(raw)?.map(|row| StoredClass {
            id,
            summary: row.summary,
            created_at: row.created_at,
        }))
    }

    /// Stored class with exactly this name; the lowest jar path wins when
    /// several archives carry it.
    pub fn first_by_name(&self, class_name: &str) -> Result<Option<StoredClass>> {
        let prefix = digest(class_name);
        let mut first: Option<StoredClass> = None;
        for item in self.store.class_keys.prefix_iter(&self.rtxn, &prefix)? {
            let Some(stored) = self.class_by_id(decode_id(item?.1)?)? else {
                continue;
            };
            if first
                .as_ref()
                .is_none_or(|f| stored.summary.jar_path < f.summary.jar_path)
            {
                first = Some(stored);
            }
        }
        Ok(first)
    }

    pub fn get(&self, class_name: &str, jar_path: &str) -> Result<Option<StoredClass>> {
        let key = class_key(class_name, jar_path);
        match self.store.class_keys.get(&self.rtxn, &key)? {
            Some(raw) => self.class_by_id(decode_id(raw)?),
            None => Ok(None),
        }
    }

    /// Methods and fields of one class, in declaration order.
    pub fn members(&self, id: u64) -> Result<ClassMembers> {
        let prefix = id.to_be_bytes();
        let mut members = ClassMembers::default();
        for item in self.store.methods.prefix_iter(&self.rtxn, &prefix)? {
            members.methods.push(serde_json::from_str(item?.1)?);
        }
        for item in self.store.fields.prefix_iter(&self.rtxn, &prefix)? {
            members.fields.push(serde_json::from_str(item?.1)?);
        }
        Ok(members)
    }

    pub fn content(&self, id: u64) -> Result<Option<Vec<u8>>> {
        Ok(self
            .store
            .class_content
            .get(&self.rtxn, &id.to_be_bytes())?
            .map(|bytes| bytes.to_vec()))
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let mut archives = HashSet::new();
        for item in self.store.archive_classes.iter(&self.rtxn)? {
            let (key, _) = item?;
            let jar = key.get(..DIGEST_LEN).unwrap_or(key);
            if !archives.contains(jar) {
                archives.insert(jar.to_vec());
            }
        }

        Ok(CacheStats {
            class_count: self.store.classes.len(&self.rtxn)?,
            archive_count: archives.len() as u64,
            method_count: self.store.methods.len(&self.rtxn)?,
            field_count: self.store.fields.len(&self.rtxn)?,
        })
    }
}

fn open_env(db_path: &Path) -> Result<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: We do not use NO_LOCK and keep default LMDB locking guarantees.
    // NO_SUB_DIR keeps the index as a single file at the configured path.
    let env = unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        options.open(db_path)
    };
    Ok(env?)
}

fn delete_prefix(db: &RowDb, wtxn: &mut RwTxn<'_>, prefix: &[u8]) -> Result<usize> {
    let keys = db
        .prefix_iter(wtxn, prefix)?
        .map(|item| item.map(|(k, _)| k.to_vec()))
        .collect::<heed::Result<Vec<Vec<u8>>>>()?;
    for key in keys.iter() {
        db.delete(wtxn, key)?;
    }
    Ok(keys.len())
}

fn parse_row(raw: Option<&str>) -> Result<Option<ClassRow>> {
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
        None => Ok(None),
    }
}

fn decode_stored((key, raw): (&[u8], &str)) -> Result<StoredClass> {
    let row: ClassRow = serde_json::from_str(raw)?;
    Ok(StoredClass {
        id: decode_id(key)?,
        summary: row.summary,
        created_at: row.created_at,
    })
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| IndexError::Corrupt(format!("class id of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn owner_of(member_key: &[u8]) -> Result<u64> {
    decode_id(member_key.get(..8).unwrap_or(member_key))
}

fn member_key(id: u64, seq: usize) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..8].copy_from_slice(&id.to_be_bytes());
    key[8..].copy_from_slice(&(seq as u32).to_be_bytes());
    key
}

fn digest(value: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn pair_key(first: &str, second: &str) -> [u8; 2 * DIGEST_LEN] {
    let mut key = [0u8; 2 * DIGEST_LEN];
    key[..DIGEST_LEN].copy_from_slice(&digest(first));
    key[DIGEST_LEN..].copy_from_slice(&digest(second));
    key
}

fn class_key(class_name: &str, jar_path: &str) -> [u8; 2 * DIGEST_LEN] {
    pair_key(class_name, jar_path)
}

fn archive_key(jar_path: &str, class_name: &str) -> [u8; 2 * DIGEST_LEN] {
    pair_key(jar_path, class_name)
}

fn archive_prefix(jar_path: &str) -> [u8; DIGEST_LEN] {
    digest(jar_path)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
