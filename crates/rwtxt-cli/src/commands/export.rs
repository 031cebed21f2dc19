//! Export command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use rwtxt_core::Store;

use crate::output::Output;

/// Archive every post as markdown into `dir`
pub fn posts(store: &Store, dir: PathBuf, output: &Output) -> Result<()> {
    let archive = store
        .export_posts(&dir)
        .with_context(|| format!("Failed to export posts to {:?}", dir))?;
    output.print_archive("post", &archive);
    Ok(())
}

/// Archive every upload into `dir`
pub fn uploads(store: &Store, dir: PathBuf, output: &Output) -> Result<()> {
    let archive = store
        .export_uploads(&dir)
        .with_context(|| format!("Failed to export uploads to {:?}", dir))?;
    output.print_archive("upload", &archive);
    Ok(())
}
