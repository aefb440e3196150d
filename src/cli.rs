//! Command-line arguments for the fdfs binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about = "Upload and download files through a tracker/storage cluster")]
pub struct Args {
    /// Client configuration file (TOML)
    #[arg(short, long, default_value = "client.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a local file
    Upload {
        file: PathBuf,

        /// Read the file into memory and send it with this extension instead
        #[arg(long, conflicts_with = "group")]
        ext: Option<String>,

        /// Upload into this group
        #[arg(long)]
        group: Option<String>,
    },
    /// Upload a local file as a slave of an existing file
    UploadSlave {
        file: PathBuf,
        master_file_id: String,
        prefix: String,
    },
    /// Download a file by id
    Download { file_id: String, dest: PathBuf },
    /// Ask the tracker which storage server would take an upload
    Query {
        #[arg(long)]
        group: Option<String>,
    },
}
