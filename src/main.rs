use anyhow::{Context, Result};
use clap::Parser;
use class_index::cli::{Cli, Commands, OutputFormat};
use class_index::config::{Config, ConfigSources};
use class_index::model::{ClassDetail, ClassSummary, CompleteClassInfo};
use class_index::scanner::RepositoryScanner;
use class_index::search::SearchEngine;
use class_index::store::IndexStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let cli = parse_cli();
    let config = Config::resolve(ConfigSources::from_cli_and_env(&cli))
        .context("invalid configuration")?;

    FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let store = Arc::new(
        IndexStore::open(config.index_path.clone())
            .with_context(|| format!("failed to open index at {}", config.index_path.display()))?,
    );
    let scanner = Arc::new(RepositoryScanner::new(Arc::clone(&store), &config));
    let engine = SearchEngine::new(Arc::clone(&store), Arc::clone(&scanner));

    match cli.command {
        Commands::Scan { force } => {
            let report = scanner.scan_repository_report(force)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Search {
            query,
            limit,
            format,
        } => {
            let hits = engine.search_classes(Some(query.as_str()), limit);
            write_search_output(&query, &hits, format)?;
        }
        Commands::Detail { class_name, format } => {
            let class_name = normalize_class_name(&class_name);
            let detail = engine
                .get_class_detail(&class_name)?
                .with_context(|| format!("class not found: {class_name}"))?;
            write_detail_output(&detail, format)?;
        }
        Commands::Content {
            class_name,
            jar,
            output,
        } => {
            let class_name = normalize_class_name(&class_name);
            let info = engine
                .get_complete_class_info(&class_name, jar.as_deref())?
                .with_context(|| format!("class not found: {class_name}"))?;
            write_content_output(&info, output.as_deref())?;
        }
        Commands::Stats => {
            let stats = engine.get_cache_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Clear => {
            engine.clear_cache()?;
            println!("{}", serde_json::to_string_pretty(&engine.get_cache_stats()?)?);
        }
    }

    Ok(())
}

fn parse_cli() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    Cli::parse_from(rewrite_args_for_implicit_search(args))
}

/// `class-index ArrayList` is shorthand for `class-index search ArrayList`.
fn rewrite_args_for_implicit_search(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = ["scan", "search", "detail", "content", "stats", "clear", "help"];
    let valued = ["--repo", "--db", "--log-level"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if valued.contains(&a) {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "search".to_string());
        }
    }

    args
}

fn normalize_class_name(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("import") {
        s = rest.trim();
    }
    if s.ends_with(';') {
        s = s.trim_end_matches(';').trim();
    }
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    total: usize,
    classes: &'a [ClassSummary],
}

#[derive(Debug, Serialize)]
struct ContentOutput<'a> {
    #[serde(flatten)]
    info: &'a CompleteClassInfo,
    content_hex: String,
}

fn write_search_output(query: &str, hits: &[ClassSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = SearchOutput {
                query,
                total: hits.len(),
                classes: hits,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for hit in hits {
                println!("{}  ({})", hit.class_name, hit.jar_file_name());
            }
        }
    }
    Ok(())
}

fn write_detail_output(detail: &ClassDetail, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(detail)?),
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("class_name: {}\n", detail.summary.class_name));
            out.push_str(&format!("package_name: {}\n", detail.summary.package_name));
            out.push_str(&format!("jar_path: {}\n", detail.summary.jar_path));
            out.push_str("fields:\n");
            for field in &detail.fields {
                out.push_str(&format!("  {field}\n"));
            }
            out.push_str("methods:\n");
            for method in &detail.methods {
                out.push_str(&format!("  {method}\n"));
            }
            print!("{out}");
        }
    }
    Ok(())
}

fn write_content_output(info: &CompleteClassInfo, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        std::fs::write(path, &info.content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", serde_json::to_string_pretty(info)?);
        return Ok(());
    }

    let output = ContentOutput {
        info,
        content_hex: hex::encode(&info.content),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
