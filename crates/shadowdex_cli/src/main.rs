//! ShadowDex CLI
//!
//! Command-line tools for a ShadowDex note store and peer sync.
//!
//! # Commands
//!
//! - `note` - Add, edit, delete and list notes
//! - `category` - Manage categories
//! - `inspect` - Display store metadata and migrations
//! - `host` - Publish a rendezvous id and sync with the device that joins
//! - `join` - Join a host by rendezvous id and sync
//! - `rendezvous` - Run a rendezvous service

mod commands;

use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ShadowDex notes and peer-to-peer sync.
#[derive(Parser)]
#[command(name = "shadowdex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage notes
    #[command(subcommand)]
    Note(NoteCommand),

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Display store metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Publish a rendezvous id and sync with the device that joins it
    Host {
        /// Rendezvous service address (host:port)
        #[arg(short, long)]
        rendezvous: String,

        /// Address to advertise to the joining device
        #[arg(short, long)]
        advertise: Option<IpAddr>,

        /// Interface to accept the joining device on
        #[arg(short, long)]
        bind: Option<IpAddr>,
    },

    /// Join a host and sync
    Join {
        /// Rendezvous id shown by the host
        id: String,

        /// Rendezvous service address (host:port)
        #[arg(short, long)]
        rendezvous: String,
    },

    /// Run a rendezvous service
    Rendezvous {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:7410")]
        bind: SocketAddr,

        /// Maximum number of hosts waiting at once
        #[arg(short, long, default_value = "1024")]
        max_registrations: usize,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum NoteCommand {
    /// Add a note
    Add {
        /// Title
        title: String,

        /// Category name
        #[arg(short, long, default_value = shadowdex_core::FALLBACK_CATEGORY)]
        category: String,

        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Body
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Edit a note; omitted fields are left as they are
    Edit {
        /// Note id
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New category name
        #[arg(short, long)]
        category: Option<String>,

        /// Replace tags (repeatable)
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,

        /// New body
        #[arg(long)]
        content: Option<String>,
    },

    /// Delete a note from this device
    Delete {
        /// Note id
        id: String,
    },

    /// List notes, most recently updated first
    List {
        /// Only notes in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Search title, body and tags
        #[arg(short, long)]
        query: Option<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CategoryCommand {
    /// List categories
    List {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a category
    Add {
        /// Name
        name: String,

        /// Icon name
        #[arg(short, long, default_value = shadowdex_core::DEFAULT_ICON)]
        icon: String,
    },

    /// Rename a category; its notes follow
    Rename {
        /// Category id
        id: String,

        /// New name
        name: String,

        /// New icon name
        #[arg(short, long)]
        icon: Option<String>,
    },

    /// Delete a category; its notes move to the fallback category
    Delete {
        /// Category id
        id: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Note(command) => {
            let db = commands::open_store(cli.path.as_deref(), "note")?;
            match command {
                NoteCommand::Add {
                    title,
                    category,
                    tags,
                    content,
                } => commands::note::add(&db, title, category, tags, content)?,
                NoteCommand::Edit {
                    id,
                    title,
                    category,
                    tags,
                    content,
                } => {
                    let edit = commands::note::NoteEdit {
                        title,
                        category,
                        tags,
                        content,
                    };
                    commands::note::edit(&db, &id, edit)?;
                }
                NoteCommand::Delete { id } => commands::note::delete(&db, &id)?,
                NoteCommand::List {
                    category,
                    query,
                    json,
                } => commands::note::list(&db, category, query, json)?,
            }
        }
        Commands::Category(command) => {
            let db = commands::open_store(cli.path.as_deref(), "category")?;
            match command {
                CategoryCommand::List { json } => commands::category::list(&db, json)?,
                CategoryCommand::Add { name, icon } => commands::category::add(&db, &name, &icon)?,
                CategoryCommand::Rename { id, name, icon } => {
                    commands::category::rename(&db, &id, &name, icon.as_deref())?;
                }
                CategoryCommand::Delete { id } => commands::category::delete(&db, &id)?,
            }
        }
        Commands::Inspect { format } => {
            let db = commands::open_store(cli.path.as_deref(), "inspect")?;
            let path = cli.path.unwrap_or_default();
            commands::inspect::run(&db, &path, &format)?;
        }
        Commands::Host {
            rendezvous,
            advertise,
            bind,
        } => {
            let db = commands::open_store(cli.path.as_deref(), "host")?;
            let transport = commands::sync::transport_config(&rendezvous, advertise, bind);
            commands::sync::host(db, transport)?;
        }
        Commands::Join { id, rendezvous } => {
            let db = commands::open_store(cli.path.as_deref(), "join")?;
            let transport = commands::sync::transport_config(&rendezvous, None, None);
            commands::sync::join(db, transport, &id)?;
        }
        Commands::Rendezvous {
            bind,
            max_registrations,
        } => {
            commands::rendezvous::run(bind, max_registrations)?;
        }
        Commands::Version => {
            println!("ShadowDex CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ShadowDex Core v{}", shadowdex_core::VERSION);
        }
    }

    Ok(())
}
