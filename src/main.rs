mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::{Args, Command};
use fdfs::{ClientConfig, FdfsClient};

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ClientConfig::from_file(&args.config)?;
    let client = FdfsClient::new(&config).context("Failed to create client")?;

    match args.command {
        Command::Upload { file, ext, group } => {
            let resp = match (ext, group) {
                (Some(ext), _) => {
                    let data = std::fs::read(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    client.upload_by_buffer(&data, &ext)?
                }
                (None, Some(group)) => client.upload_by_filename_to_group(&file, &group)?,
                (None, None) => client.upload_by_filename(&file)?,
            };
            println!("{}", resp.file_id());
        }
        Command::UploadSlave {
            file,
            master_file_id,
            prefix,
        } => {
            let resp = client.upload_slave_by_filename(&file, &master_file_id, &prefix)?;
            println!("{}", resp.file_id());
        }
        Command::Download { file_id, dest } => {
            let resp = client
                .download_to_file(&file_id, &dest)
                .with_context(|| format!("download {}", file_id))?;
            println!("{} bytes -> {}", resp.download_size, dest.display());
        }
        Command::Query { group } => {
            let server = client.query_storage(group.as_deref())?;
            println!("{}", server);
        }
    }

    client.close();
    Ok(())
}
