//! rwtxt CLI
//!
//! Command-line administration for an rwtxt store: domains, access keys,
//! files, search, uploads, export and index maintenance.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rwtxt_core::{Config, Store, StoreError};

mod commands;
mod output;

use commands::domain::DomainChanges;
use commands::file::ListOrder;
use commands::Credentials;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "rwtxt")]
#[command(about = "rwtxt - multi-tenant versioned text store")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Access flags shared by commands that read or write a domain
#[derive(clap::Args, Clone, Default)]
struct AccessArgs {
    /// Domain to use
    #[arg(short, long, default_value = "public")]
    domain: String,
    /// Access key issued by `domain login`
    #[arg(long)]
    key: Option<String>,
    /// Domain password
    #[arg(long)]
    password: Option<String>,
}

impl AccessArgs {
    fn credentials(&self) -> Credentials {
        Credentials {
            key: self.key.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage domains
    Domain {
        #[command(subcommand)]
        command: DomainCommands,
    },
    /// Inspect access keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Manage files
    File {
        #[command(subcommand)]
        command: FileCommands,
    },
    /// Full-text search within a domain
    Search {
        /// FTS5 match query
        query: String,
        #[command(flatten)]
        access: AccessArgs,
    },
    /// Manage uploads and resized images
    Blob {
        #[command(subcommand)]
        command: BlobCommands,
    },
    /// Export posts or uploads as a zip archive
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
    /// Check or rebuild the search index
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },
}

#[derive(Subcommand)]
enum DomainCommands {
    /// Create a private domain
    Create {
        name: String,
        /// Password (empty allows signing in without one)
        #[arg(long, default_value = "")]
        password: String,
    },
    /// Show domain settings
    Show { name: String },
    /// Change domain settings
    Update {
        name: String,
        /// Current password
        #[arg(long, default_value = "")]
        password: String,
        /// New password
        #[arg(long)]
        new_password: Option<String>,
        /// Make the domain public or private
        #[arg(long)]
        public: Option<bool>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        intro: Option<String>,
        #[arg(long)]
        css: Option<String>,
        #[arg(long)]
        most_recent: Option<usize>,
        #[arg(long)]
        most_edited: Option<usize>,
        #[arg(long)]
        last_created: Option<usize>,
        #[arg(long)]
        show_search: Option<bool>,
    },
    /// List all domains
    #[command(alias = "ls")]
    List,
    /// Sign in and print an access key
    Login {
        name: String,
        #[arg(long, default_value = "")]
        password: String,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Show which domains a comma-separated key list signs in to
    Resolve { cookie: String },
}

#[derive(Subcommand)]
enum FileCommands {
    /// Write text to a file (reads stdin without --text)
    Write {
        slug: String,
        #[command(flatten)]
        access: AccessArgs,
        /// Edit the file with this id
        #[arg(long)]
        id: Option<String>,
        /// Text to save
        #[arg(short, long)]
        text: Option<String>,
        /// Create a new file even if the slug exists
        #[arg(long, conflicts_with = "id")]
        new: bool,
    },
    /// Show a file by id or slug
    Show {
        id_or_slug: String,
        #[command(flatten)]
        access: AccessArgs,
        /// Show this version number instead of the current text
        #[arg(long, conflicts_with = "at")]
        rev: Option<usize>,
        /// Show the text as of this RFC 3339 time
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// List the files of a domain
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        access: AccessArgs,
        /// Show at most this many
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Order by creation time
        #[arg(long, conflicts_with = "most_viewed")]
        created: bool,
        /// Order by view count
        #[arg(long)]
        most_viewed: bool,
    },
    /// Show the history of a file
    History {
        id_or_slug: String,
        #[command(flatten)]
        access: AccessArgs,
        /// Diff two versions
        #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
        diff: Option<Vec<usize>>,
    },
}

#[derive(Subcommand)]
enum BlobCommands {
    /// Store a file from disk
    Put {
        path: PathBuf,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Store as a resized image
        #[arg(long)]
        resized: bool,
    },
    /// Fetch a stored payload
    Get {
        id: String,
        /// Write to this path instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Read from resized images
        #[arg(long)]
        resized: bool,
    },
}

#[derive(Subcommand)]
enum ExportCommands {
    /// Archive every post as markdown into DIR
    Posts { dir: PathBuf },
    /// Archive every upload into DIR
    Uploads { dir: PathBuf },
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Report drift between files and the index
    Check,
    /// Rebuild the index from stored histories
    Rebuild,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    let store = Store::open(config).context("Failed to open store")?;

    let result = run(cli.command, &store, &output).await;
    if let Err(e) = &result {
        if let Some(hint) = e.downcast_ref::<StoreError>().and_then(|e| e.recovery_suggestion()) {
            eprintln!("hint: {}", hint);
        }
    }
    store.close()?;
    result
}

async fn run(command: Commands, store: &Store, output: &Output) -> Result<()> {
    match command {
        Commands::Domain { command } => handle_domain_command(command, store, output),
        Commands::Key { command } => match command {
            KeyCommands::Resolve { cookie } => commands::key::resolve(store, cookie, output).await,
        },
        Commands::File { command } => handle_file_command(command, store, output),
        Commands::Search { query, access } => commands::search::search(
            store,
            query,
            access.domain.clone(),
            &access.credentials(),
            output,
        ),
        Commands::Blob { command } => match command {
            BlobCommands::Put {
                path,
                id,
                name,
                resized,
            } => commands::blob::put(store, path, id, name, resized, output),
            BlobCommands::Get { id, out, resized } => {
                commands::blob::get(store, id, out, resized, output)
            }
        },
        Commands::Export { command } => match command {
            ExportCommands::Posts { dir } => commands::export::posts(store, dir, output),
            ExportCommands::Uploads { dir } => commands::export::uploads(store, dir, output),
        },
        Commands::Index { command } => match command {
            IndexCommands::Check => commands::index::check(store, output),
            IndexCommands::Rebuild => commands::index::rebuild(store, output),
        },
    }
}

fn handle_domain_command(command: DomainCommands, store: &Store, output: &Output) -> Result<()> {
    match command {
        DomainCommands::Create { name, password } => {
            commands::domain::create(store, name, password, output)
        }
        DomainCommands::Show { name } => commands::domain::show(store, name, output),
        DomainCommands::Update {
            name,
            password,
            new_password,
            public,
            title,
            intro,
            css,
            most_recent,
            most_edited,
            last_created,
            show_search,
        } => {
            let changes = DomainChanges {
                new_password,
                public,
                title,
                intro,
                css,
                most_recent,
                most_edited,
                last_created,
                show_search,
            };
            commands::domain::update(store, name, password, changes, output)
        }
        DomainCommands::List => commands::domain::list(store, output),
        DomainCommands::Login { name, password } => {
            commands::domain::login(store, name, password, output)
        }
    }
}

fn handle_file_command(command: FileCommands, store: &Store, output: &Output) -> Result<()> {
    match command {
        FileCommands::Write {
            slug,
            access,
            id,
            text,
            new,
        } => commands::file::write(
            store,
            slug,
            access.domain.clone(),
            id,
            text,
            new,
            &access.credentials(),
            output,
        ),
        FileCommands::Show {
            id_or_slug,
            access,
            rev,
            at,
        } => commands::file::show(
            store,
            id_or_slug,
            access.domain.clone(),
            rev,
            at,
            &access.credentials(),
            output,
        ),
        FileCommands::List {
            access,
            limit,
            created,
            most_viewed,
        } => {
            let order = if most_viewed {
                ListOrder::MostViewed
            } else if created {
                ListOrder::Created
            } else {
                ListOrder::Modified
            };
            commands::file::list(
                store,
                access.domain.clone(),
                limit,
                order,
                &access.credentials(),
                output,
            )
        }
        FileCommands::History {
            id_or_slug,
            access,
            diff,
        } => commands::file::history(
            store,
            id_or_slug,
            access.domain.clone(),
            diff,
            &access.credentials(),
            output,
        ),
    }
}

/// Log to stderr; RUST_LOG overrides the level picked by --verbose
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rwtxt_core={},rwtxt={}", level, level)));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
