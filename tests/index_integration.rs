use class_index::config::Config;
use class_index::scanner::RepositoryScanner;
use class_index::search::{SearchEngine, hash_content};
use class_index::store::IndexStore;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class_index_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

/// Minimal class file: one private int field `count`, a constructor and
/// `public String getName()`.
fn widget_class(internal_name: &str) -> Vec<u8> {
    let utf8 = [
        internal_name,
        "java/lang/Object",
        "count",
        "I",
        "<init>",
        "()V",
        "getName",
        "()Ljava/lang/String;",
        "Code",
    ];

    let mut pool = Vec::new();
    for value in utf8 {
        pool.push(1u8);
        pool.extend_from_slice(&(value.len() as u16).to_be_bytes());
        pool.extend_from_slice(value.as_bytes());
    }
    // #10 -> this class, #11 -> super class
    for name_index in [1u16, 2] {
        pool.push(7);
        pool.extend_from_slice(&name_index.to_be_bytes());
    }

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 52]);
    out.extend_from_slice(&12u16.to_be_bytes());
    out.extend_from_slice(&pool);
    out.extend_from_slice(&0x0021u16.to_be_bytes());
    out.extend_from_slice(&10u16.to_be_bytes());
    out.extend_from_slice(&11u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());

    out.extend_from_slice(&1u16.to_be_bytes());
    for v in [0x0002u16, 3, 4, 0] {
        out.extend_from_slice(&v.to_be_bytes());
    }

    out.extend_from_slice(&2u16.to_be_bytes());
    for (access, name, descriptor) in [(0x0001u16, 5u16, 6u16), (0x0001, 7, 8)] {
        for v in [access, name, descriptor, 1, 9] {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out.extend_from_slice(&1u32.to_be_bytes());
        out.push(0xB1);
    }

    out.extend_from_slice(&0u16.to_be_bytes());
    out
}

fn args<'a>(global: &[&'a str], tail: &[&'a str]) -> Vec<&'a str> {
    let mut all = global.to_vec();
    all.extend_from_slice(tail);
    all
}

fn run(bin: &str, args: &[&str]) -> anyhow::Result<std::process::Output> {
    Ok(Command::new(bin).args(args).output()?)
}

fn run_json(bin: &str, args: &[&str]) -> anyhow::Result<Value> {
    let out = run(bin, args)?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

#[test]
fn library_indexes_searches_and_resolves_a_widget() -> anyhow::Result<()> {
    let base = temp_dir("library_flow");
    let repo = base.join("repository");
    let jar = repo.join("com/acme/lib/1.0/lib.jar");
    let widget = widget_class("com/acme/Widget");
    write_jar(
        &jar,
        &[
            ("com/acme/Widget.class", &widget),
            ("com/acme/WidgetFactory.class", &widget_class("com/acme/WidgetFactory")),
            ("com/acme/Widget$Builder.class", &widget_class("com/acme/Widget$Builder")),
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
        ],
    )?;
    write_jar(
        &repo.join("com/acme/lib/1.0/lib-sources.jar"),
        &[("com/acme/Widget.class", &widget)],
    )?;

    let config = Config {
        repository_root: repo.clone(),
        index_path: base.join("index.lmdb"),
        log_level: tracing::Level::INFO,
    };
    config.validate()?;
    let store = Arc::new(IndexStore::open(config.index_path.clone())?);
    let scanner = Arc::new(RepositoryScanner::new(Arc::clone(&store), &config));
    let engine = SearchEngine::new(Arc::clone(&store), Arc::clone(&scanner));

    let hits = engine.search_classes(Some("Widget"), 50);
    let names: Vec<&str> = hits.iter().map(|h| h.class_name.as_str()).collect();
    assert_eq!(names, vec!["com.acme.Widget", "com.acme.WidgetFactory"]);
    assert_eq!(hits[0].package_name, "com.acme");
    assert_eq!(hits[0].jar_file_name(), "lib.jar");

    // Neither class name mentions getName; both surface through their methods.
    let by_member = engine.search_classes(Some("getName"), 50);
    let names: Vec<&str> = by_member.iter().map(|h| h.class_name.as_str()).collect();
    assert_eq!(names, vec!["com.acme.Widget", "com.acme.WidgetFactory"]);

    let detail = engine.get_class_detail("com.acme.Widget")?.unwrap();
    assert_eq!(detail.methods, vec!["public java.lang.String getName()"]);
    assert_eq!(detail.fields, vec!["int count"]);

    let info = engine.get_complete_class_info("com.acme.Widget", None)?.unwrap();
    assert_eq!(info.content, widget);
    assert_eq!(info.content_hash, hash_content(&widget));

    // Untouched jars are skipped on the next incremental scan.
    assert_eq!(scanner.scan_repository(false)?, 0);
    assert_eq!(scanner.scan_repository(true)?, 1);

    let stats = engine.get_cache_stats()?;
    assert_eq!(stats.class_count, 2);
    assert_eq!(stats.archive_count, 1);
    assert_eq!(stats.method_count, 2);
    assert_eq!(stats.field_count, 2);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn binary_scan_search_detail_and_content() -> anyhow::Result<()> {
    let base = temp_dir("binary_flow");
    let repo = base.join("repository");
    let db = base.join("index.lmdb");
    let jar = repo.join("com/acme/lib/1.0/lib-1.0.jar");
    let widget = widget_class("com/acme/Widget");
    write_jar(&jar, &[("com/acme/Widget.class", &widget)])?;

    let bin = env!("CARGO_BIN_EXE_class-index");
    let repo_arg = repo.to_string_lossy().to_string();
    let db_arg = db.to_string_lossy().to_string();
    let global = ["--repo", repo_arg.as_str(), "--db", db_arg.as_str(), "--log-level", "warn"];
    let with = |tail: &[&'static str]| args(&global, tail);

    let report = run_json(bin, &with(&["scan"]))?;
    assert_eq!(report["scanned_jars"], 1);
    assert_eq!(report["changed_jars"], 1);
    assert_eq!(report["indexed_classes"], 1);

    let again = run_json(bin, &with(&["scan"]))?;
    assert_eq!(again["changed_jars"], 0);

    let search = run_json(bin, &with(&["search", "widget", "--limit", "5"]))?;
    assert_eq!(search["total"], 1);
    assert_eq!(search["classes"][0]["class_name"], "com.acme.Widget");

    // Bare query is shorthand for `search`.
    let implicit = run_json(bin, &with(&["Widget"]))?;
    assert_eq!(implicit["classes"][0]["class_name"], "com.acme.Widget");

    let detail = run_json(bin, &with(&["detail", "import com.acme.Widget;"]))?;
    assert_eq!(detail["package_name"], "com.acme");
    assert_eq!(detail["fields"][0], "int count");

    let jar_arg = jar.to_string_lossy().to_string();
    let content = run_json(
        bin,
        &args(&global, &["content", "com.acme.Widget", "--jar", jar_arg.as_str()]),
    )?;
    assert_eq!(content["content_hex"], hex::encode(&widget));
    assert_eq!(content["content_hash"], hash_content(&widget));

    let missing = run(bin, &with(&["detail", "com.acme.Missing"]))?;
    assert!(!missing.status.success());

    let stats = run_json(bin, &with(&["stats"]))?;
    assert_eq!(stats["class_count"], 1);

    let cleared = run_json(bin, &with(&["clear"]))?;
    assert_eq!(cleared["class_count"], 0);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn binary_rejects_invalid_log_level() -> anyhow::Result<()> {
    let base = temp_dir("bad_log_level");
    let db = base.join("index.lmdb");
    let bin = env!("CARGO_BIN_EXE_class-index");
    let db_arg = db.to_string_lossy().to_string();

    let out = run(bin, &["--db", db_arg.as_str(), "--log-level", "loud", "stats"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("log level"));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
