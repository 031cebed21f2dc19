//! File command handlers

use std::io::Read;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;

use rwtxt_core::{File, Store};

use super::{authorize, ensure_browsable, Credentials};
use crate::output::Output;

/// How `file list` orders its results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    Modified,
    Created,
    MostViewed,
}

/// Write text to a file, creating it if needed
///
/// Without `--id`, an existing file with the same slug is edited (the most
/// recently modified one) unless `new` is set. Text comes from stdin when
/// not given.
#[allow(clippy::too_many_arguments)]
pub fn write(
    store: &Store,
    slug: String,
    domain: String,
    id: Option<String>,
    text: Option<String>,
    new: bool,
    creds: &Credentials,
    output: &Output,
) -> Result<()> {
    let info = authorize(store, &domain, creds)?;
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read text from stdin")?;
            buf
        }
    };

    let existing = match id {
        Some(id) => Some(id),
        None if new => None,
        None => store.exists(&slug, &info.name)?.map(|m| m.id),
    };

    let mut file = match existing {
        Some(id) => first(store.get(&id, &info.name)?, &id)?,
        None => store.new_file(&slug, &text).in_domain(&info.name),
    };
    if file.domain != info.name {
        bail!("file '{}' belongs to domain '{}'", file.id, file.domain);
    }
    file.slug = slug;
    file.data = text;

    let saved = store.save(&file).context("Failed to save file")?;
    output.success(&format!(
        "Saved {} ({} version(s))",
        saved.id,
        saved.history.len()
    ));
    if output.is_quiet() {
        println!("{}", saved.id);
    }
    Ok(())
}

/// Show a file, or one of its past versions
pub fn show(
    store: &Store,
    id_or_slug: String,
    domain: String,
    version: Option<usize>,
    at: Option<DateTime<Utc>>,
    creds: &Credentials,
    output: &Output,
) -> Result<()> {
    let (file, many) = resolve(store, &id_or_slug, &domain, creds)?;

    if let Some(index) = version {
        let text = file.history.version(index)?;
        output.print_version(&file.history, &format!("Version {}", index), &text);
        return Ok(());
    }
    if let Some(at) = at {
        match file.history.at(at)? {
            Some(text) => output.print_version(&file.history, &format!("As of {}", at), &text),
            None => bail!("'{}' did not exist at {}", id_or_slug, at),
        }
        return Ok(());
    }

    if let Err(e) = store.update_views(&file) {
        warn!("failed to count view of '{}': {}", file.id, e);
    }
    output.print_file(&file, many);
    Ok(())
}

/// List the non-empty files of a domain
pub fn list(
    store: &Store,
    domain: String,
    limit: Option<usize>,
    order: ListOrder,
    creds: &Credentials,
    output: &Output,
) -> Result<()> {
    let info = authorize(store, &domain, creds)?;
    ensure_browsable(store, &info, "list")?;

    let order_by_created = order == ListOrder::Created || store.config().order_by_created;
    let files = match (order, limit) {
        (ListOrder::MostViewed, limit) => {
            store.get_top_x_most_viewed(&info.name, limit.unwrap_or(usize::MAX))?
        }
        (_, Some(n)) => store.get_top_x(&info.name, n, order_by_created)?,
        (_, None) => store.get_all(&info.name, order_by_created)?,
    };
    output.print_files(&files);
    Ok(())
}

/// Show the version list of a file, or a diff between two versions
pub fn history(
    store: &Store,
    id_or_slug: String,
    domain: String,
    diff: Option<Vec<usize>>,
    creds: &Credentials,
    output: &Output,
) -> Result<()> {
    let (file, _) = resolve(store, &id_or_slug, &domain, creds)?;
    file.history
        .verify()
        .with_context(|| format!("History of '{}' does not replay", file.id))?;

    match diff.as_deref() {
        Some([from, to]) => {
            let chunks = file.history.diff(*from, *to)?;
            output.print_diff(&chunks);
        }
        Some(_) => bail!("--diff takes two version numbers"),
        None => output.print_history(&file),
    }
    Ok(())
}

fn resolve(
    store: &Store,
    id_or_slug: &str,
    domain: &str,
    creds: &Credentials,
) -> Result<(File, bool)> {
    let files = store.get(id_or_slug, domain)?;
    let many = files.len() > 1;
    let file = first(files, id_or_slug)?;
    // Ids resolve across domains, so check access where the file lives
    authorize(store, &file.domain, creds)?;
    Ok((file, many))
}

fn first(files: Vec<File>, id_or_slug: &str) -> Result<File> {
    match files.into_iter().next() {
        Some(file) => Ok(file),
        None => bail!("No files with id or slug '{}'", id_or_slug),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwtxt_core::store::test_support::test_store;
    use crate::output::OutputFormat;

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_write_edits_existing_slug() {
        let store = test_store();
        let creds = Credentials::default();
        for text in ["one", "two"] {
            write(
                &store,
                "page".into(),
                "public".into(),
                None,
                Some(text.into()),
                false,
                &creds,
                &quiet(),
            )
            .unwrap();
        }

        let files = store.get("page", "public").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].data, "two");
        assert_eq!(files[0].history.len(), 2);
    }

    #[test]
    fn test_write_new_keeps_both() {
        let store = test_store();
        let creds = Credentials::default();
        for text in ["one", "two"] {
            write(
                &store,
                "page".into(),
                "public".into(),
                None,
                Some(text.into()),
                true,
                &creds,
                &quiet(),
            )
            .unwrap();
        }
        assert_eq!(store.get("page", "public").unwrap().len(), 2);
    }

    #[test]
    fn test_show_counts_views() {
        let store = test_store();
        let file = store.save(&File::new("page", "text")).unwrap();

        show(
            &store,
            file.id.clone(),
            "public".into(),
            None,
            None,
            &Credentials::default(),
            &quiet(),
        )
        .unwrap();
        assert_eq!(store.get(&file.id, "public").unwrap()[0].views, 1);
    }

    #[test]
    fn test_private_file_by_id_needs_credentials() {
        let store = test_store();
        store.create_domain("notes", "pw").unwrap();
        let file = store
            .save(&File::new("secret", "text").in_domain("notes"))
            .unwrap();

        let err = show(
            &store,
            file.id.clone(),
            "public".into(),
            None,
            None,
            &Credentials::default(),
            &quiet(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_history_diff_needs_two_versions() {
        let store = test_store();
        let file = store.save(&File::new("page", "text")).unwrap();
        let creds = Credentials::default();

        let err = history(
            &store,
            file.id.clone(),
            "public".into(),
            Some(vec![0]),
            &creds,
            &quiet(),
        );
        assert!(err.is_err());
        history(&store, file.id, "public".into(), Some(vec![0, 0]), &creds, &quiet()).unwrap();
    }
}
