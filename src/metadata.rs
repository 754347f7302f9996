//! Content metadata resolution.

use mime::Mime;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::archive::ArchiveReader;
use crate::target::Target;

/// How the bytes of a piece of content are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessStrategy {
    /// Whole-object fetch through the archive, sliced in memory.
    Extracted,
    /// Bounded random-access reads against the backing store.
    DirectMapped,
}

impl AccessStrategy {
    /// Media that the archive can read at arbitrary offsets is streamed
    /// directly; everything else is extracted.
    pub fn classify(mime_type: &Mime, random_access: bool) -> Self {
        let top = mime_type.type_();
        let media = top == mime::IMAGE || top == mime::AUDIO || top == mime::VIDEO;
        if media && random_access {
            AccessStrategy::DirectMapped
        } else {
            AccessStrategy::Extracted
        }
    }
}

/// Size, type and access strategy of one archived object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadata {
    pub byte_length: u64,
    pub mime_type: Mime,
    pub access_strategy: AccessStrategy,
}

impl ContentMetadata {
    /// Value of the `Content-Type` header.
    pub fn content_type(&self) -> String {
        self.mime_type.to_string()
    }
}

/// Metadata resolved for a target, with the path it was actually found at.
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    pub target: Target,
    pub metadata: ContentMetadata,
}

/// Looks up metadata off the calling task.
#[derive(Clone)]
pub struct MetadataResolver {
    archive: Arc<dyn ArchiveReader>,
    main_page_candidates: Vec<String>,
}

impl MetadataResolver {
    pub fn new(archive: Arc<dyn ArchiveReader>, main_page_candidates: Vec<String>) -> Self {
        Self {
            archive,
            main_page_candidates,
        }
    }

    /// Resolve metadata for `target`.
    ///
    /// `None` means the target does not map to archive content. Archive
    /// failures are logged and reported the same way.
    pub async fn resolve(&self, target: &Target) -> Option<ContentMetadata> {
        let archive = Arc::clone(&self.archive);
        let lookup = target.clone();

        let joined = tokio::spawn(async move { archive.resolve_metadata(&lookup).await }).await;

        match joined {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                warn!(%target, error = %e, "Metadata lookup failed");
                None
            }
            Err(e) => {
                warn!(%target, error = %e, "Metadata lookup task aborted");
                None
            }
        }
    }

    /// Resolve `target`, falling back to the archive's main page when the
    /// target names the archive root.
    pub async fn locate(&self, target: &Target) -> Option<ResolvedContent> {
        if !target.path().is_empty() {
            return self.resolve(target).await.map(|metadata| ResolvedContent {
                target: target.clone(),
                metadata,
            });
        }

        for candidate in &self.main_page_candidates {
            let main_page = target.with_path(candidate);
            if let Some(metadata) = self.resolve(&main_page).await {
                debug!(%target, path = candidate.as_str(), "Serving main page");
                return Some(ResolvedContent {
                    target: main_page,
                    metadata,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_media() {
        let mp4: Mime = "video/mp4".parse().unwrap();
        assert_eq!(AccessStrategy::classify(&mp4, true), AccessStrategy::DirectMapped);
        assert_eq!(AccessStrategy::classify(&mp4, false), AccessStrategy::Extracted);
        assert_eq!(
            AccessStrategy::classify(&mime::IMAGE_PNG, true),
            AccessStrategy::DirectMapped
        );
    }

    #[test]
    fn test_classify_text() {
        assert_eq!(
            AccessStrategy::classify(&mime::TEXT_HTML, true),
            AccessStrategy::Extracted
        );
        assert_eq!(
            AccessStrategy::classify(&mime::APPLICATION_JAVASCRIPT, true),
            AccessStrategy::Extracted
        );
    }

    #[test]
    fn test_content_type() {
        let metadata = ContentMetadata {
            byte_length: 10,
            mime_type: mime::TEXT_HTML_UTF_8,
            access_strategy: AccessStrategy::Extracted,
        };
        assert_eq!(metadata.content_type(), "text/html; charset=utf-8");
    }
}
