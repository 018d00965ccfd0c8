use crate::error::Result;
use crate::types::Upload;
use async_trait::async_trait;

/// A file ready to be announced in a Zulip message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedFile {
    pub comment: String,
    pub url: Option<String>,
}

impl StagedFile {
    /// `comment: url`, `url` or `comment`; `None` when there is nothing to say.
    pub fn compose(&self) -> Option<String> {
        let comment = self.comment.trim();
        let url = self.url.as_deref().map(str::trim).filter(|url| !url.is_empty());
        match (comment.is_empty(), url) {
            (false, Some(url)) => Some(format!("{comment}: {url}")),
            (true, Some(url)) => Some(url.to_string()),
            (false, None) => Some(comment.to_string()),
            (true, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Staged {
    /// Informational texts to post before the files, e.g. skipped uploads.
    pub notices: Vec<String>,
    pub files: Vec<StagedFile>,
}

#[async_trait]
pub trait AttachmentStaging: Send + Sync {
    async fn stage(&self, upload: &Upload) -> Result<Staged>;
}

/// Relays files that already carry a public URL.
///
/// Files above `max_size` become a notice instead of a link.
#[derive(Debug, Clone, Default)]
pub struct InlineStaging {
    max_size: Option<u64>,
}

impl InlineStaging {
    pub fn new(max_size: Option<u64>) -> Self {
        Self {
            max_size: max_size.filter(|size| *size > 0),
        }
    }
}

#[async_trait]
impl AttachmentStaging for InlineStaging {
    async fn stage(&self, upload: &Upload) -> Result<Staged> {
        let mut staged = Staged::default();
        for file in &upload.files {
            if let Some(max_size) = self.max_size {
                if file.size > max_size {
                    staged.notices.push(format!(
                        "{} is too big to relay ({} bytes)",
                        file.name, file.size
                    ));
                    continue;
                }
            }
            let candidate = StagedFile {
                comment: file.comment.clone(),
                url: file.url.clone(),
            };
            if candidate.compose().is_none() {
                tracing::debug!(file = %file.name, "dropping attachment without url or comment");
                continue;
            }
            staged.files.push(candidate);
        }
        Ok(staged)
    }
}
