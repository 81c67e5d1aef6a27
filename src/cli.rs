use clap::{Parser, Subcommand};
use std::path::PathBuf;
use transferbox::request::CachePolicy;

#[derive(Parser, Debug)]
#[command(name = "transferbox")]
#[command(about = "TransferBox media transfer CLI", long_about = None)]
pub struct Cli {
    /// Configuration file, overrides TRANSFERBOX_CONFIG
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the request that would be sent for a load path
    Request(RequestArgs),
    /// Resolve an object's metadata
    Info(InfoArgs),
    /// Resolve metadata and download the content
    Fetch(FetchArgs),
    /// Upload a local file
    Upload(UploadArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct RequestArgs {
    pub path: String,

    #[arg(long)]
    pub format: Option<String>,

    /// Acceptable mimetype, repeatable, in order of preference
    #[arg(long = "mimetype")]
    pub mimetypes: Vec<String>,

    #[arg(long)]
    pub suffix: Option<String>,

    #[arg(long, default_value_t = CachePolicy::UseProtocol)]
    pub cache_policy: CachePolicy,
}

#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    pub path: String,

    #[arg(long)]
    pub mimetype: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    pub path: String,

    #[arg(long)]
    pub mimetype: Option<String>,

    /// Directory to write the file into; defaults to `fetch.download_dir`, else memory
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    pub file: PathBuf,

    /// Destination path on the source
    #[arg(long)]
    pub to: String,

    /// Remote file name, defaults to the local one
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value = "application/octet-stream")]
    pub mimetype: String,
}
