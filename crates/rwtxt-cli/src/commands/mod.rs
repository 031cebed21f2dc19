//! Command handlers

pub mod blob;
pub mod domain;
pub mod export;
pub mod file;
pub mod index;
pub mod key;
pub mod search;

use anyhow::{bail, Result};

use rwtxt_core::{DomainInfo, Store, PUBLIC_DOMAIN};

/// Ways a command can prove access to a private domain
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub key: Option<String>,
    pub password: Option<String>,
}

/// Check that the caller may read or write `domain`
///
/// Public domains are open. Private ones need an access key issued for
/// that domain or its password.
pub fn authorize(store: &Store, domain: &str, creds: &Credentials) -> Result<DomainInfo> {
    let info = store.lookup_domain(domain)?;
    if info.is_public {
        return Ok(info);
    }

    if let Some(key) = &creds.key {
        let owner = store.resolve_key(key)?;
        if owner.domain != info.name {
            bail!("access key is for domain '{}', not '{}'", owner.domain, info.name);
        }
        return Ok(info);
    }
    if let Some(password) = &creds.password {
        return Ok(store.authenticate_domain(&info.name, password)?);
    }
    bail!(
        "domain '{}' is private; pass --key or --password",
        info.name
    )
}

/// Listing and searching the public domain is only allowed in private mode
pub fn ensure_browsable(store: &Store, domain: &DomainInfo, action: &str) -> Result<()> {
    if domain.name == PUBLIC_DOMAIN && !store.config().private {
        bail!("cannot {} public", action);
    }
    Ok(())
}
