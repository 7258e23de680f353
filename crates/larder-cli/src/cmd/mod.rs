pub mod archive;
pub mod init;
pub mod stale;

use anyhow::Result;
use larder_core::config::{LarderConfig, resolve_config};
use larder_core::error::ErrorCode;
use std::path::Path;

use crate::output::{CliError, OutputMode, render_error};

/// Resolve config for a command, rendering a structured error on failure.
pub(crate) fn load_config(
    explicit: Option<&Path>,
    working_dir: &Path,
    output: OutputMode,
) -> Result<LarderConfig> {
    resolve_config(explicit, working_dir).or_else(|err| {
        fail(output, ErrorCode::ConfigParseError, &format!("{err:#}"))?;
        Err(err)
    })
}

/// Render a top-level failure for `code` in the requested mode.
pub(crate) fn fail(output: OutputMode, code: ErrorCode, message: &str) -> Result<()> {
    render_error(
        output,
        &CliError::with_details(
            format!("{code} {}: {message}", code.message()),
            code.hint(),
            code.code(),
        ),
    )
}
