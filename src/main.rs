use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use photoroll_core::{
    events::LoggingEventSink, services::sidecar_path, AppError, CommandError,
    DefaultPathProvider, ImageRecord, PathProvider, PhotorollCore, SharedPathProvider,
};
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod args;
use args::{Cli, Commands};

/// 初始化日志系统：stderr + 日志目录下按天滚动的文件
fn init_logging(logs_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("无法创建日志目录 {}", logs_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, "photoroll.log"));

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok(guard)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageInfo<'a> {
    version: u32,
    film_roll: String,
    full_path: Option<String>,
    altered: bool,
    tags: Vec<String>,
    record: &'a ImageRecord,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionEntry {
    version: usize,
    id: i64,
    sidecar: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli, core: &PhotorollCore) -> Result<()> {
    match cli.command {
        Commands::Import {
            folder,
            include_jpegs,
        } => {
            let summary = core
                .importer()
                .import_directory(&folder, include_jpegs)
                .with_context(|| format!("导入 {} 失败", folder.display()))?;
            if cli.json {
                print_json(&summary)?;
            } else {
                println!(
                    "film roll {}: {} imported, {} existing, {} skipped, {} failed",
                    summary.film_id,
                    summary.imported,
                    summary.existing,
                    summary.skipped,
                    summary.failed
                );
                for failure in &summary.failed_files {
                    println!("  failed: {}", failure);
                }
            }
        }
        Commands::Duplicate { id } => {
            let new_id = core.catalog().duplicate(id)?;
            if cli.json {
                print_json(&serde_json::json!({ "sourceId": id, "newId": new_id }))?;
            } else {
                println!("{} -> {} (version {})", id, new_id, core.db.version_of(new_id)?);
            }
        }
        Commands::Remove { id } => {
            core.catalog().remove(id)?;
            if !cli.json {
                println!("removed {}", id);
            }
        }
        Commands::Info { id } => {
            let catalog = core.catalog();
            let version = core.db.version_of(id)?;
            let film_roll = catalog.film_roll_name(id)?;
            let full_path = catalog.full_path(id)?.map(|p| p.display().to_string());
            let altered = catalog.is_altered(id)?;
            let tags = catalog.tags(id)?.into_iter().map(|t| t.name).collect();

            let record = core.cache().read(id)?;
            let info = ImageInfo {
                version,
                film_roll,
                full_path,
                altered,
                tags,
                record: &record,
            };
            if cli.json {
                print_json(&info)?;
            } else {
                println!("{} (version {})", record.filename, info.version);
                println!("  film roll: {}", info.film_roll);
                if let Some(path) = &info.full_path {
                    println!("  path:      {}", path);
                }
                println!("  rating:    {}", record.rating());
                println!("  exif:      {}", record.exif_summary());
                println!("  camera:    {} {}", record.maker, record.model);
                println!("  altered:   {}", info.altered);
                println!("  tags:      {}", info.tags.join(", "));
            }
        }
        Commands::Versions { id } => {
            let base = core.catalog().full_path(id)?;
            let entries = core
                .catalog()
                .versions(id)?
                .into_iter()
                .enumerate()
                .map(|(version, id)| {
                    let sidecar = match &base {
                        Some(path) => Some(sidecar_path(&core.db, id, path)?.display().to_string()),
                        None => None,
                    };
                    Ok(VersionEntry { version, id, sidecar })
                })
                .collect::<Result<Vec<_>>>()?;
            if cli.json {
                print_json(&entries)?;
            } else {
                for entry in &entries {
                    println!(
                        "v{:<3} {:>8}  {}",
                        entry.version,
                        entry.id,
                        entry.sidecar.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let path_provider: SharedPathProvider = match &cli.library {
        Some(dir) => Arc::new(DefaultPathProvider::with_base_dir(dir.clone())),
        None => Arc::new(DefaultPathProvider::new()),
    };
    let _log_guard = init_logging(&path_provider.logs_dir())?;

    let core = PhotorollCore::new(path_provider, Arc::new(LoggingEventSink))
        .context("无法打开照片目录")?;

    let json = cli.json;
    let result = run(cli, &core);
    core.teardown();

    match result {
        Err(err) if json => match err.downcast::<AppError>() {
            Ok(app_err) => {
                print_json(&CommandError::from(app_err))?;
                std::process::exit(1);
            }
            Err(err) => Err(err),
        },
        other => other,
    }
}
