//! Search index maintenance

use anyhow::Result;

use rwtxt_core::Store;

use crate::output::Output;

/// Report drift between files and the search index
pub fn check(store: &Store, output: &Output) -> Result<()> {
    let report = store.check_index()?;
    output.print_index_report(&report);
    Ok(())
}

/// Rebuild the search index from stored histories
pub fn rebuild(store: &Store, output: &Output) -> Result<()> {
    let indexed = store.rebuild_index()?;
    output.success(&format!("Indexed {} file(s)", indexed));
    Ok(())
}
