use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "photoroll")]
#[command(about = "Local photo catalog: import, versions and sidecars", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Library directory (defaults to the platform data directory)
    #[arg(short, long, global = true)]
    pub library: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import every file directly inside a folder
    Import {
        folder: PathBuf,

        /// Import JPEGs even when the ignore setting is on
        #[arg(long)]
        include_jpegs: bool,
    },

    /// Duplicate an image into a new version
    #[command(alias = "dup")]
    Duplicate { id: i64 },

    /// Remove an image and everything attached to it
    #[command(alias = "rm")]
    Remove { id: i64 },

    /// Show an image record
    Info { id: i64 },

    /// List all versions of an image
    Versions { id: i64 },
}
