//! Domain command handlers

use anyhow::{Context, Result};

use rwtxt_core::{DomainInfo, Store};

use crate::output::Output;

/// Fields `domain update` may change; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct DomainChanges {
    pub new_password: Option<String>,
    pub public: Option<bool>,
    pub title: Option<String>,
    pub intro: Option<String>,
    pub css: Option<String>,
    pub most_recent: Option<usize>,
    pub most_edited: Option<usize>,
    pub last_created: Option<usize>,
    pub show_search: Option<bool>,
}

impl DomainChanges {
    fn apply(self, info: &mut DomainInfo) {
        let options = &mut info.options;
        if let Some(public) = self.public {
            info.is_public = public;
        }
        if let Some(title) = self.title {
            options.custom_title = title;
        }
        if let Some(intro) = self.intro {
            options.custom_intro = intro;
        }
        if let Some(css) = self.css {
            options.css = css;
        }
        if let Some(n) = self.most_recent {
            options.most_recent = n;
        }
        if let Some(n) = self.most_edited {
            options.most_edited = n;
        }
        if let Some(n) = self.last_created {
            options.last_created = n;
        }
        if let Some(show) = self.show_search {
            options.show_search = show;
        }
    }
}

/// Create a private domain
pub fn create(store: &Store, name: String, password: String, output: &Output) -> Result<()> {
    let info = store
        .create_domain(&name, &password)
        .context("Failed to create domain")?;
    output.success(&format!("Created domain: {}", info.name));
    Ok(())
}

/// Show domain metadata
pub fn show(store: &Store, name: String, output: &Output) -> Result<()> {
    let info = store.lookup_domain(&name)?;
    output.print_domain(&info);
    Ok(())
}

/// Change visibility, options or password after checking the current password
pub fn update(
    store: &Store,
    name: String,
    password: String,
    changes: DomainChanges,
    output: &Output,
) -> Result<()> {
    let mut info = store.authenticate_domain(&name, &password)?;
    let new_password = changes.new_password.clone().unwrap_or_default();
    changes.apply(&mut info);

    store
        .update_domain(&info.name, &new_password, info.is_public, &info.options)
        .context("Failed to update domain")?;

    output.success(&format!("Updated domain: {}", info.name));
    output.print_domain(&info);
    Ok(())
}

/// List all domains
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let names = store.list_domains()?;
    output.print_domains(&names);
    Ok(())
}

/// Sign in and print a new access key
pub fn login(store: &Store, name: String, password: String, output: &Output) -> Result<()> {
    let key = store.issue_key(&name, &password)?;
    output.print_key(&name.trim().to_lowercase(), &key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwtxt_core::DomainOptions;

    #[test]
    fn test_changes_only_touch_given_fields() {
        let mut info = DomainInfo {
            id: 1,
            name: "notes".into(),
            is_public: false,
            options: DomainOptions {
                css: "body{}".into(),
                most_recent: 5,
                ..DomainOptions::default()
            },
        };

        DomainChanges {
            public: Some(true),
            title: Some("Notes".into()),
            ..DomainChanges::default()
        }
        .apply(&mut info);

        assert!(info.is_public);
        assert_eq!(info.options.custom_title, "Notes");
        assert_eq!(info.options.css, "body{}");
        assert_eq!(info.options.most_recent, 5);
    }
}
