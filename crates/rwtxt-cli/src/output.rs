//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use rwtxt_core::models::format_date;
use rwtxt_core::{
    Chunk, DomainInfo, ExportArchive, File, IndexReport, KeyOwner, SearchHit, VersionedText,
};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
    /// Hours east of UTC used for displayed dates
    utc_offset_hours: i32,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            utc_offset_hours: Local::now().offset().local_minus_utc() / 3600,
        }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single file with its text
    pub fn print_file(&self, file: &File, many: bool) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", file.id);
                println!("Slug:     {}", file.slug);
                println!("Domain:   {}", file.domain);
                println!("Created:  {}", file.created_display(self.utc_offset_hours));
                println!("Modified: {}", file.modified_display(self.utc_offset_hours));
                println!("Versions: {}", file.history.len());
                println!("Views:    {}", file.views);
                if many {
                    println!("Note:     other files share this slug; showing the newest");
                }
                println!();
                println!("{}", file.data);
            }
            OutputFormat::Json => print_json(file),
            OutputFormat::Quiet => println!("{}", file.data),
        }
    }

    /// Print a listing of files (text is not shown)
    pub fn print_files(&self, files: &[File]) {
        match self.format {
            OutputFormat::Human => {
                if files.is_empty() {
                    println!("No files found.");
                    return;
                }
                for file in files {
                    println!(
                        "{} | {} | {} | {} views",
                        file.id,
                        truncate(&file.slug, 30),
                        file.modified_display(self.utc_offset_hours),
                        file.views
                    );
                }
                println!("\n{} file(s)", files.len());
            }
            OutputFormat::Json => {
                let stripped: Vec<File> = files
                    .iter()
                    .cloned()
                    .map(|mut f| {
                        f.strip_content();
                        f
                    })
                    .collect();
                print_json(&stripped);
            }
            OutputFormat::Quiet => {
                for file in files {
                    println!("{}", file.id);
                }
            }
        }
    }

    /// Print search results
    pub fn print_hits(&self, hits: &[SearchHit]) {
        match self.format {
            OutputFormat::Human => {
                if hits.is_empty() {
                    println!("No matches.");
                    return;
                }
                for hit in hits {
                    println!("{} | {}", hit.id, hit.slug);
                    println!("    {}", hit.snippet.replace('\n', " "));
                }
                println!("\n{} match(es)", hits.len());
            }
            OutputFormat::Json => print_json(hits),
            OutputFormat::Quiet => {
                for hit in hits {
                    println!("{}", hit.id);
                }
            }
        }
    }

    /// Print the version list of a history
    pub fn print_history(&self, file: &File) {
        let history = &file.history;
        match self.format {
            OutputFormat::Human => {
                println!("History of {} ({})", file.slug, file.id);
                println!();
                for (i, (timestamp, size)) in history
                    .timestamps()
                    .into_iter()
                    .zip(history.change_sizes())
                    .enumerate()
                {
                    println!("{:>4}  {}  {} chars changed", i, self.date(timestamp), size);
                }
            }
            OutputFormat::Json => {
                let versions: Vec<_> = history
                    .timestamps()
                    .into_iter()
                    .zip(history.change_sizes())
                    .enumerate()
                    .map(|(i, (timestamp, size))| {
                        serde_json::json!({"index": i, "timestamp": timestamp, "changed": size})
                    })
                    .collect();
                print_json(&versions);
            }
            OutputFormat::Quiet => println!("{}", history.len()),
        }
    }

    /// Print a diff between two versions
    pub fn print_diff(&self, chunks: &[Chunk]) {
        match self.format {
            OutputFormat::Human | OutputFormat::Quiet => {
                let mut rendered = String::new();
                for chunk in chunks {
                    match chunk {
                        Chunk::Equal(s) => rendered.push_str(s),
                        Chunk::Delete(s) => {
                            rendered.push_str("[-");
                            rendered.push_str(s);
                            rendered.push_str("-]");
                        }
                        Chunk::Insert(s) => {
                            rendered.push_str("{+");
                            rendered.push_str(s);
                            rendered.push_str("+}");
                        }
                    }
                }
                println!("{}", rendered);
            }
            OutputFormat::Json => print_json(chunks),
        }
    }

    /// Print one historical version
    pub fn print_version(&self, history: &VersionedText, label: &str, text: &str) {
        match self.format {
            OutputFormat::Human => {
                println!("{} (of {} versions)", label, history.len());
                println!();
                println!("{}", text);
            }
            OutputFormat::Json => print_json(&serde_json::json!({"version": label, "text": text})),
            OutputFormat::Quiet => println!("{}", text),
        }
    }

    /// Print domain metadata
    pub fn print_domain(&self, domain: &DomainInfo) {
        match self.format {
            OutputFormat::Human => {
                let options = &domain.options;
                println!("Domain:       {}", domain.name);
                println!("Public:       {}", domain.is_public);
                println!("Title:        {}", or_unset(&options.custom_title));
                println!("Intro:        {}", or_unset(&options.custom_intro));
                println!("CSS:          {}", or_unset(&options.css));
                println!("Most recent:  {}", options.most_recent);
                println!("Most edited:  {}", options.most_edited);
                println!("Last created: {}", options.last_created);
                println!("Show search:  {}", options.show_search);
            }
            OutputFormat::Json => print_json(domain),
            OutputFormat::Quiet => println!("{}", domain.name),
        }
    }

    /// Print a list of domain names
    pub fn print_domains(&self, names: &[String]) {
        match self.format {
            OutputFormat::Human => {
                for name in names {
                    println!("{}", name);
                }
                println!("\n{} domain(s)", names.len());
            }
            OutputFormat::Json => print_json(names),
            OutputFormat::Quiet => {
                for name in names {
                    println!("{}", name);
                }
            }
        }
    }

    /// Print an issued access key
    pub fn print_key(&self, domain: &str, key: &str) {
        match self.format {
            OutputFormat::Human => {
                println!("Signed in to '{}'.", domain);
                println!("Access key: {}", key);
            }
            OutputFormat::Json => print_json(&serde_json::json!({"domain": domain, "key": key})),
            OutputFormat::Quiet => println!("{}", key),
        }
    }

    /// Print the domains a set of keys grants
    pub fn print_key_owners(&self, owners: &[(String, KeyOwner)]) {
        match self.format {
            OutputFormat::Human => {
                if owners.is_empty() {
                    println!("No valid keys.");
                    return;
                }
                for (key, owner) in owners {
                    println!(
                        "{}... -> {} (last used {})",
                        key.chars().take(8).collect::<String>(),
                        owner.domain,
                        self.date(owner.last_used)
                    );
                }
            }
            OutputFormat::Json => {
                let owners: Vec<&KeyOwner> = owners.iter().map(|(_, o)| o).collect();
                print_json(&owners);
            }
            OutputFormat::Quiet => {
                for (_, owner) in owners {
                    println!("{}", owner.domain);
                }
            }
        }
    }

    /// Print an index consistency report
    pub fn print_index_report(&self, report: &IndexReport) {
        match self.format {
            OutputFormat::Human => {
                if report.is_consistent() {
                    println!("Search index is consistent.");
                    return;
                }
                print_ids("Missing from index", &report.missing);
                print_ids("Orphaned index rows", &report.orphaned);
                print_ids("Duplicated index rows", &report.duplicated);
                println!();
                println!("Run `rwtxt index rebuild` to repair.");
            }
            OutputFormat::Json => print_json(report),
            OutputFormat::Quiet => println!("{}", report.is_consistent()),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print where an export archive was written
    pub fn print_archive(&self, what: &str, archive: &ExportArchive) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "✓ Exported {} {}(s) to {}",
                    archive.entries.len(),
                    what,
                    archive.path.display()
                );
                for entry in &archive.entries {
                    println!("  {}", entry);
                }
            }
            OutputFormat::Json => print_json(archive),
            OutputFormat::Quiet => println!("{}", archive.path.display()),
        }
    }

    fn date(&self, at: DateTime<Utc>) -> String {
        format_date(at, self.utc_offset_hours)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to encode output: {}", e),
    }
}

fn print_ids(label: &str, ids: &[String]) {
    if ids.is_empty() {
        return;
    }
    println!("{} ({}):", label, ids.len());
    for id in ids {
        println!("  {}", id);
    }
}

fn or_unset(s: &str) -> &str {
    if s.is_empty() {
        "(not set)"
    } else {
        s
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ünïcödé text", 6), "ünï...");
    }

    #[test]
    fn test_or_unset() {
        assert_eq!(or_unset(""), "(not set)");
        assert_eq!(or_unset("body{}"), "body{}");
    }
}
