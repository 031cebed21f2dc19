//! Access key command handlers

use anyhow::Result;
use tracing::debug;

use rwtxt_core::{parse_key_list, KeyToucher, Store};

use crate::output::Output;

/// Resolve a cookie value into the domains it signs in to
///
/// Valid keys get their last-used time refreshed in the background; the
/// command only waits for that so the process does not exit first.
pub async fn resolve(store: &Store, cookie: String, output: &Output) -> Result<()> {
    let keys = parse_key_list(&cookie);
    let owners = store.resolve_keys(&keys);
    output.print_key_owners(&owners);

    let (toucher, worker) = KeyToucher::spawn(store.clone());
    toucher.touch(owners.into_iter().map(|(key, _)| key).collect());
    drop(toucher);
    if let Err(e) = worker.await {
        debug!("key toucher did not finish: {}", e);
    }
    Ok(())
}
