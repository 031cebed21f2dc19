//! Blob command handlers

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use rwtxt_core::secrets::new_file_id;
use rwtxt_core::Store;

use crate::output::Output;

/// Store a file from disk as an upload or resized image
pub fn put(
    store: &Store,
    path: PathBuf,
    id: Option<String>,
    name: Option<String>,
    resized: bool,
    output: &Output,
) -> Result<()> {
    let data = std::fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let id = id.unwrap_or_else(new_file_id);

    if resized {
        store.save_resized_image(&id, &name, &data)?;
    } else {
        store.save_blob(&id, &name, &data)?;
    }

    if output.is_quiet() {
        println!("{}", id);
    } else {
        output.success(&format!("Stored {} ({} bytes) as {}", name, data.len(), id));
    }
    Ok(())
}

/// Fetch an upload to a file, or to stdout
pub fn get(
    store: &Store,
    id: String,
    out: Option<PathBuf>,
    resized: bool,
    output: &Output,
) -> Result<()> {
    let blob = if resized {
        store.get_resized_image(&id)?
    } else {
        store.get_blob(&id)?
    };

    match out {
        Some(path) => {
            std::fs::write(&path, &blob.data)
                .with_context(|| format!("Failed to write {:?}", path))?;
            output.success(&format!(
                "Wrote {} ({} bytes) to {}",
                blob.name,
                blob.data.len(),
                path.display()
            ));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&blob.data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
