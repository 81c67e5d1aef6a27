use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use transferbox::config::Config;
use transferbox::context::ExecutionContext;
use transferbox::fetcher::{DownloadedContent, FetchedMedia, ObjectDescriptor};
use transferbox::observer::{ChannelObserver, Progress, TransferEvent};
use transferbox::request;
use transferbox::source::{ApiSource, Source};
use transferbox::uploader::UploadedAsset;
use transferbox::{TransferError, TransferLibrary};

use crate::cli::{FetchArgs, InfoArgs, RequestArgs, UploadArgs};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub fn request(args: RequestArgs) -> CliResult {
    let descriptor = request::request_for_load_path_appending(
        &args.path,
        args.format.as_deref(),
        &args.mimetypes,
        args.suffix.as_deref(),
        args.cache_policy,
    )?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}

pub async fn info(config: &Config, args: InfoArgs) -> CliResult {
    let fetched = fetch_object(config, args.path, args.mimetype, false, None).await?;
    println!("{}", serde_json::to_string_pretty(&fetched.metadata)?);
    Ok(())
}

pub async fn fetch(config: &Config, args: FetchArgs) -> CliResult {
    let fetched = fetch_object(config, args.path, args.mimetype, true, args.out).await?;

    let content = match &fetched.content {
        Some(DownloadedContent::File { path, len }) => {
            json!({ "path": path, "bytes": len })
        }
        Some(DownloadedContent::Memory(bytes)) => json!({ "bytes": bytes.len() }),
        None => serde_json::Value::Null,
    };
    let output = json!({ "metadata": fetched.metadata, "content": content });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn upload(config: &Config, args: UploadArgs) -> CliResult {
    let (library, source) = setup(config)?;
    let filename = match args.name {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| TransferError::invalid("cannot derive a file name, pass --name"))?,
    };

    let (observer, events) = ChannelObserver::<UploadedAsset>::new();
    let handle = library.upload_data_url(
        args.file,
        &filename,
        &args.to,
        &args.mimetype,
        source,
        ExecutionContext::queue("cli")?,
        Arc::new(observer),
    )?;
    info!(task_id = %handle.id(), "Upload submitted");

    let asset = wait_for(events).await?;
    println!("{}", serde_json::to_string_pretty(&asset)?);
    Ok(())
}

pub fn show_config(config: &Config) -> CliResult {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn fetch_object(
    config: &Config,
    path: String,
    mimetype: Option<String>,
    should_download: bool,
    out: Option<std::path::PathBuf>,
) -> Result<FetchedMedia, Box<dyn std::error::Error + Send + Sync>> {
    let (mut library, source) = setup(config)?;
    if let Some(dir) = out {
        library = library.with_download_dir(dir);
    }

    let mut object = ObjectDescriptor::new(path);
    object.mimetype = mimetype;

    let (observer, events) = ChannelObserver::<FetchedMedia>::new();
    let handle = library.request_object_media_info(
        object,
        source,
        ExecutionContext::queue("cli")?,
        should_download,
        Arc::new(observer),
    )?;
    info!(task_id = %handle.id(), should_download, "Fetch submitted");

    Ok(wait_for(events).await?)
}

fn setup(config: &Config) -> Result<(TransferLibrary, Arc<dyn Source>), TransferError> {
    let library = TransferLibrary::from_config(config, Handle::current())?;
    let source: Arc<dyn Source> = Arc::new(ApiSource::from_config(&config.source)?);
    Ok((library, source))
}

/// Print progress to stderr until the terminal event arrives
async fn wait_for<T>(mut events: UnboundedReceiver<TransferEvent<T>>) -> Result<T, TransferError> {
    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Progress(Progress::Fraction { value }) => {
                eprintln!("progress: {:.0}%", value * 100.0);
            }
            TransferEvent::Progress(Progress::Indeterminate { received }) => {
                eprintln!("progress: {received} bytes");
            }
            TransferEvent::Success(output) => return Ok(output),
            TransferEvent::Failure(error) => return Err(error),
        }
    }
    Err(TransferError::Cancelled)
}
