//! chatvault CLI
//!
//! Command-line front end for chatvault backups of a local data directory.
//!
//! # Commands
//!
//! - `backup` - Write a backup archive of the data directory
//! - `restore` - Replace the data directory contents with a backup
//! - `info` - Show the format version and entries of an archive
//! - `version` - Show version information

mod commands;
mod data_dir;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Backup and restore tool for messenger data.
#[derive(Parser)]
#[command(name = "chatvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long, default_value = "chatvault-data")]
    data: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a backup archive
    Backup {
        /// Archive to write
        #[arg(short, long)]
        output: PathBuf,

        /// Encrypt the archive with this password
        #[arg(short, long)]
        password: Option<String>,

        /// Skip contacts and their messages
        #[arg(long)]
        no_contacts: bool,

        /// Skip groups and their messages
        #[arg(long)]
        no_groups: bool,

        /// Skip distribution lists and their messages
        #[arg(long)]
        no_distribution_lists: bool,

        /// Skip ballots
        #[arg(long)]
        no_ballots: bool,

        /// Skip avatars and profile pictures
        #[arg(long)]
        no_avatars: bool,

        /// Skip image and voice media
        #[arg(long)]
        no_media: bool,

        /// Skip videos and files
        #[arg(long)]
        no_files: bool,

        /// Skip message thumbnails
        #[arg(long)]
        no_thumbnails: bool,
    },

    /// Restore a backup archive, replacing the current data
    Restore {
        /// Archive to read
        #[arg(short, long)]
        input: PathBuf,

        /// Password of an encrypted archive
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show the format version and entries of an archive
    Info {
        /// Archive to read
        #[arg(short, long)]
        input: PathBuf,

        /// Password of an encrypted archive
        #[arg(short, long)]
        password: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Backup {
            output,
            password,
            no_contacts,
            no_groups,
            no_distribution_lists,
            no_ballots,
            no_avatars,
            no_media,
            no_files,
            no_thumbnails,
        } => {
            let config = chatvault_core::BackupConfig::new()
                .contacts(!no_contacts)
                .groups(!no_groups)
                .distribution_lists(!no_distribution_lists)
                .ballots(!no_ballots)
                .avatars(!no_avatars)
                .media(!no_media)
                .video_and_files(!no_files)
                .thumbnails(!no_thumbnails);
            commands::backup::run(&cli.data, &output, password, config)?;
        }
        Commands::Restore { input, password } => {
            commands::restore::run(&cli.data, &input, password)?;
        }
        Commands::Info {
            input,
            password,
            format,
        } => {
            commands::info::run(&input, password.as_deref(), &format)?;
        }
        Commands::Version => {
            println!("chatvault CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Backup format v{}",
                chatvault_core::CURRENT_FORMAT_VERSION
            );
        }
    }

    Ok(())
}
