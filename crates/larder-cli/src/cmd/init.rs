//! `larder init`: create the hot store and archive directory.

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use larder_core::config::{CONFIG_FILE_NAME, LarderConfig};
use larder_core::error::ErrorCode;
use larder_core::store::SqliteHotStore;
use larder_core::store::migrations::current_schema_version;

use crate::cmd::{fail, load_config};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Do not write a default larder.toml into the working directory.
    #[arg(long)]
    pub no_config: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    store_path: PathBuf,
    archive_dir: PathBuf,
    schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_written: Option<PathBuf>,
}

/// Execute `larder init`.
///
/// Opening the store applies any pending migrations, so re-running against
/// an existing store upgrades it in place. A default `larder.toml` is
/// written only when no config was given and none exists yet.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded, or if the store or the
/// archive directory cannot be created.
pub fn run_init(
    args: &InitArgs,
    config_path: Option<&Path>,
    output: OutputMode,
    working_dir: &Path,
) -> Result<()> {
    let config = load_config(config_path, working_dir, output)?;

    let store = match SqliteHotStore::open(&config.store.path) {
        Ok(store) => store,
        Err(err) => {
            fail(output, ErrorCode::StoreUnavailable, &format!("{err:#}"))?;
            return Err(err);
        }
    };
    let schema_version = current_schema_version(store.connection())
        .context("read hot store schema version")?;

    std::fs::create_dir_all(&config.archive.dir).with_context(|| {
        format!(
            "Failed to create archive directory: {}",
            config.archive.dir.display()
        )
    })?;

    let config_written = if config_path.is_none() && !args.no_config {
        write_default_config(working_dir)?
    } else {
        None
    };

    let result = InitOutput {
        store_path: config.store.path,
        archive_dir: config.archive.dir,
        schema_version,
        config_written,
    };

    render_mode(
        output,
        &result,
        |r, w| {
            writeln!(w, "store={}", r.store_path.display())?;
            writeln!(w, "archive_dir={}", r.archive_dir.display())?;
            writeln!(w, "schema_version={}", r.schema_version)?;
            if let Some(path) = &r.config_written {
                writeln!(w, "config_written={}", path.display())?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, "Initialized larder")?;
            pretty_kv(w, "Hot store", r.store_path.display().to_string())?;
            pretty_kv(w, "Archive dir", r.archive_dir.display().to_string())?;
            pretty_kv(w, "Schema", format!("v{}", r.schema_version))?;
            if let Some(path) = &r.config_written {
                pretty_kv(w, "Config", path.display().to_string())?;
            }
            Ok(())
        },
    )
}

/// Write the default config with relative paths, leaving an existing file alone.
fn write_default_config(working_dir: &Path) -> Result<Option<PathBuf>> {
    let path = working_dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Ok(None);
    }

    let body = toml::to_string_pretty(&LarderConfig::default())
        .context("serialize default config")?;
    std::fs::write(&path, body)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}
