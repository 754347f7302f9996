//! Command-line front end for archstream.
//!
//! Opens archives, then serves each target through the responder and writes
//! the resulting transport events to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;

use archstream::cli::is_http_url;
use archstream::{
    ArchiveLibrary, ChannelSink, Cli, HttpRangeReader, LocalFileReader, MmapReader, ReadAt,
    RemoteOptions, RequestHandle, Responder, ResponderConfig, SharedTaskRegistry, TransportEvent,
    ZipArchive,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => ResponderConfig::load_from_path(path.clone())?,
        None => ResponderConfig::load()?,
    };
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
        config.validate()?;
    }

    let sources = cli.archive_sources();
    if sources.is_empty() {
        anyhow::bail!("no archive given");
    }

    let library = Arc::new(ArchiveLibrary::new());
    let mut transferred = Vec::new();
    for (id, source) in &sources {
        if is_http_url(source) {
            let options = RemoteOptions::from(&config.remote);
            let reader = Arc::new(HttpRangeReader::open(source.as_str(), options).await?);
            register(&library, id, ZipArchive::open(reader.clone()).await?, &cli);
            transferred.push(reader);
        } else if cli.no_mmap {
            let archive = ZipArchive::<LocalFileReader>::open_file(Path::new(source))
                .await
                .with_context(|| format!("failed to open {source}"))?;
            register(&library, id, archive, &cli);
        } else {
            let archive = ZipArchive::<MmapReader>::open_path(Path::new(source))
                .await
                .with_context(|| format!("failed to open {source}"))?;
            register(&library, id, archive, &cli);
        }
    }

    if cli.list {
        return Ok(());
    }

    let responder = Arc::new(Responder::new(
        Arc::new(SharedTaskRegistry::new()),
        library,
        config,
    ));
    for target in &cli.targets {
        serve(&responder, target, cli.pipe).await?;
    }

    // Network transfer statistics for HTTP sources
    if !cli.is_quiet() {
        for reader in &transferred {
            eprintln!(
                "{}: {} bytes transferred in {} requests",
                reader.url(),
                reader.transferred_bytes(),
                reader.requests()
            );
        }
    }

    Ok(())
}

/// List the archive if asked to, then make it servable under `id`.
fn register<R: ReadAt + 'static>(
    library: &ArchiveLibrary,
    id: &str,
    archive: ZipArchive<R>,
    cli: &Cli,
) {
    if cli.list {
        println!("{id}:");
        for entry in archive.entries() {
            let metadata = ZipArchive::<R>::metadata_for(entry);
            println!(
                "{:>10}  {:<24}  {:<12}  {}",
                metadata.byte_length,
                metadata.content_type(),
                format!("{:?}", metadata.access_strategy),
                entry.file_name
            );
        }
    }
    library.insert(id, Arc::new(archive));
}

/// Serve one target and print what its sink received.
async fn serve(responder: &Arc<Responder>, target: &str, pipe: bool) -> Result<()> {
    let (sink, mut events) = ChannelSink::channel();
    let handle = RequestHandle::next();
    let Some(task) = responder.on_start(handle, target, Arc::new(sink)) else {
        return Ok(());
    };

    let mut stdout = tokio::io::stdout();
    let mut chunks = 0usize;
    let mut bytes = 0u64;
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Head(head) if !pipe => {
                stdout
                    .write_all(format!("{target}\n  {}\n", head.status).as_bytes())
                    .await?;
                for (name, value) in &head.headers {
                    stdout
                        .write_all(format!("  {name}: {value}\n").as_bytes())
                        .await?;
                }
            }
            TransportEvent::Head(_) => {}
            TransportEvent::Data(data) => {
                chunks += 1;
                bytes += data.len() as u64;
                if pipe {
                    stdout.write_all(&data).await?;
                }
            }
            TransportEvent::Finish if !pipe => {
                stdout
                    .write_all(format!("  finished: {chunks} chunks, {bytes} bytes\n").as_bytes())
                    .await?;
            }
            TransportEvent::Finish => {}
            TransportEvent::Fail(error) => {
                if pipe {
                    eprintln!("{target}: {error}");
                } else {
                    stdout
                        .write_all(format!("  failed: {error}\n").as_bytes())
                        .await?;
                }
            }
        }
    }
    stdout.flush().await?;

    let outcome = task.await?;
    info!(%handle, url = target, ?outcome, "Request complete");
    Ok(())
}
