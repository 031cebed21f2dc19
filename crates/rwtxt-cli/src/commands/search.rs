//! Search command handler

use anyhow::Result;

use rwtxt_core::Store;

use super::{authorize, ensure_browsable, Credentials};
use crate::output::Output;

/// Full-text search within one domain
pub fn search(
    store: &Store,
    query: String,
    domain: String,
    creds: &Credentials,
    output: &Output,
) -> Result<()> {
    let info = authorize(store, &domain, creds)?;
    ensure_browsable(store, &info, "search")?;

    let hits = store.find(&query, &info.name)?;
    output.print_hits(&hits);
    Ok(())
}
