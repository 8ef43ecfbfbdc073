//! # docqa CLI
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa upload <path>` | Store a PDF, DOCX or text file as a pending document |
//! | `docqa documents` | List documents, optionally by status |
//! | `docqa ingest <id>` / `--pending` | Extract, chunk and embed documents |
//! | `docqa worker` | Ingest continuously, reclaiming stuck documents |
//! | `docqa reconcile` | Fail documents stuck in `processing` |
//! | `docqa ask "<question>"` | Answer a question with citations |
//! | `docqa query <id>` | Show a stored query, its answer and citations |
//! | `docqa delete <id>` | Delete a document with its passages and citations |
//! | `docqa chunk <path>` | Print the chunks a file would produce |
//! | `docqa stats` | Show corpus and query statistics |
//!
//! Commands that act on behalf of someone take `--user <id> --role <role>`,
//! where role is one of `doctor`, `researcher`, `auditor` or `admin`.
//!
//! Logging goes to stderr. `DOCQA_LOG` takes an `EnvFilter` directive and
//! overrides `-v` / `-q`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa::commands::{self, UploadOptions};
use docqa::{config, migrate, stats};
use docqa_core::access::{Requester, Role};

/// Grounded question answering with citations over a private document corpus.
#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// See `config/docqa.example.toml` for every setting and its default.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Identity of the caller.
#[derive(Args)]
struct RequesterArgs {
    /// Requester id.
    #[arg(long)]
    user: String,

    /// Requester role: doctor, researcher, auditor or admin.
    #[arg(long, value_parser = parse_role)]
    role: Role,
}

impl RequesterArgs {
    fn requester(&self) -> Requester {
        Requester::new(self.user.clone(), self.role)
    }
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::parse(s).ok_or_else(|| {
        format!("unknown role '{s}' (expected doctor, researcher, auditor or admin)")
    })
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,

    /// Upload a document.
    ///
    /// The file is fingerprinted with SHA-256; uploading content that is
    /// already stored returns the existing document instead of a new one.
    Upload {
        path: PathBuf,

        #[command(flatten)]
        who: RequesterArgs,

        /// Title (defaults to the file name without extension).
        #[arg(long)]
        title: Option<String>,

        /// MIME type (guessed from the extension when omitted).
        #[arg(long)]
        mime: Option<String>,

        /// Make the document visible to every requester.
        #[arg(long)]
        shareable: bool,

        #[arg(long)]
        classification: Option<String>,
    },

    /// List documents, newest first.
    Documents {
        /// Only documents in this status (pending, processing, completed, failed).
        #[arg(long)]
        status: Option<String>,
    },

    /// Ingest one document, or every pending one.
    Ingest {
        #[arg(required_unless_present = "pending", conflicts_with = "pending")]
        id: Option<String>,

        #[arg(long)]
        pending: bool,
    },

    /// Run the ingestion worker until interrupted.
    Worker {
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },

    /// Move documents stuck in processing to failed.
    Reconcile,

    /// Ask a question.
    Ask {
        question: String,

        #[command(flatten)]
        who: RequesterArgs,
    },

    /// Show a stored query with its answer and citations.
    Query { id: String },

    /// Delete a document (owner or admin only).
    Delete {
        id: String,

        #[command(flatten)]
        who: RequesterArgs,
    },

    /// Chunk a local file and print the chunks as JSON. Does not touch the
    /// database.
    Chunk {
        path: PathBuf,

        /// Maximum chunk size in characters.
        #[arg(long)]
        size: Option<usize>,

        /// Overlap carried between chunks, in characters.
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Show document, passage and query statistics.
    Stats,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCQA_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Upload {
            path,
            who,
            title,
            mime,
            shareable,
            classification,
        } => {
            let options = UploadOptions {
                title,
                mime,
                shareable,
                classification,
            };
            commands::run_upload(&cfg, &path, &who.requester(), options).await?;
        }
        Commands::Documents { status } => {
            commands::run_documents(&cfg, status.as_deref()).await?;
        }
        Commands::Ingest { id, pending } => {
            commands::run_ingest(&cfg, id.as_deref(), pending).await?;
        }
        Commands::Worker { once } => {
            commands::run_worker(&cfg, once).await?;
        }
        Commands::Reconcile => {
            commands::run_reconcile(&cfg).await?;
        }
        Commands::Ask { question, who } => {
            commands::run_ask(&cfg, &question, &who.requester()).await?;
        }
        Commands::Query { id } => {
            commands::run_query(&cfg, &id).await?;
        }
        Commands::Delete { id, who } => {
            commands::run_delete(&cfg, &id, &who.requester()).await?;
        }
        Commands::Chunk {
            path,
            size,
            overlap,
        } => {
            commands::run_chunk(&cfg, &path, size, overlap).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
