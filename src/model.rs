use serde::{Deserialize, Serialize};

use crate::classfile::simple_name_of;

/// One indexed class as returned by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub class_name: String,
    pub package_name: String,
    pub jar_path: String,
    pub jar_last_modified: i64,
}

impl ClassSummary {
    pub fn simple_name(&self) -> &str {
        simple_name_of(&self.class_name)
    }

    pub fn jar_file_name(&self) -> &str {
        self.jar_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.jar_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDetail {
    #[serde(flatten)]
    pub summary: ClassSummary,
    pub methods: Vec<String>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompleteClassInfo {
    #[serde(flatten)]
    pub detail: ClassDetail,
    pub content_hash: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub class_count: u64,
    pub archive_count: u64,
    pub method_count: u64,
    pub field_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub root: String,
    pub scanned_jars: usize,
    pub changed_jars: usize,
    pub indexed_classes: usize,
    pub failed_jars: usize,
    pub duration_ms: u64,
}
