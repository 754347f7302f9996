use clap::Parser;
use std::path::{Path, PathBuf};

use crate::humanize::ByteSize;

#[derive(Parser, Debug)]
#[command(name = "archstream")]
#[command(version)]
#[command(about = "Serve archived content over a custom URL scheme", long_about = None)]
#[command(after_help = "Examples:\n  \
  archstream wiki.zip -l                               list entries of wiki.zip\n  \
  archstream wiki.zip -t kiwix://wiki/index.html       show the response for a target\n  \
  archstream -p --id w=https://example.com/w.zip -t kiwix://w/I/clip.mp4 > clip.mp4")]
pub struct Cli {
    /// Archive paths or HTTP URLs, registered under their file stem
    #[arg(value_name = "ARCHIVE")]
    pub archives: Vec<String>,

    /// Archive registered under an explicit id
    #[arg(long = "id", value_name = "NAME=ARCHIVE", value_parser = parse_named_archive)]
    pub named: Vec<(String, String)>,

    /// Targets to serve, in order
    #[arg(short = 't', long = "target", value_name = "URL")]
    pub targets: Vec<String>,

    /// List archive entries with their MIME type and access strategy
    #[arg(short = 'l')]
    pub list: bool,

    /// Write served bodies to stdout, no summaries
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Override the configured chunk size (e.g. 512KB, 4MiB)
    #[arg(long, value_name = "SIZE")]
    pub chunk_size: Option<ByteSize>,

    /// Configuration file (default: archstream.toml)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Read local archives with positional reads instead of mapping them
    #[arg(long)]
    pub no_mmap: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    /// Every archive with the id it is served under.
    pub fn archive_sources(&self) -> Vec<(String, String)> {
        let mut sources: Vec<_> = self
            .archives
            .iter()
            .map(|source| (archive_id_for(source), source.clone()))
            .collect();
        sources.extend(self.named.iter().cloned());
        sources
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.quiet {
            0 => "archstream=info",
            1 => "archstream=warn",
            _ => "archstream=error",
        }
    }
}

pub fn is_http_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// File stem of a path or URL, used as the archive id.
pub fn archive_id_for(source: &str) -> String {
    let name = if is_http_url(source) {
        source
            .split(['?', '#'])
            .next()
            .unwrap_or(source)
            .rsplit('/')
            .next()
            .unwrap_or(source)
    } else {
        source
    };
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

fn parse_named_archive(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, source)) if !name.is_empty() && !source.is_empty() => {
            Ok((name.to_string(), source.to_string()))
        }
        _ => Err(format!("expected NAME=ARCHIVE, got '{value}'")),
    }
}
