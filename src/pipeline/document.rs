use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use tracing::info;

use ferry_core::error::Result;
use ferry_workflow::{ExecutionContext, Executor};

/// A rendered document ready to be written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Document {
    /// Plain-text document named `Summary_<yyyyMMdd_HHmmss>.txt`.
    pub fn plain_text(text: &str, created: DateTime<Local>) -> Self {
        Self {
            file_name: format!("Summary_{}.txt", created.format("%Y%m%d_%H%M%S")),
            bytes: format!("{}\n", text.trim()).into_bytes(),
        }
    }

    /// Write into `dir`, creating it if needed.
    pub async fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}

pub struct CreateDocumentExecutor;

impl CreateDocumentExecutor {
    pub const ID: &'static str = "create-document";
}

impl Executor for CreateDocumentExecutor {
    type Input = String;
    type Output = Document;

    fn id(&self) -> &str {
        Self::ID
    }

    fn handle(
        &self,
        input: String,
        _ctx: ExecutionContext<Document>,
    ) -> BoxFuture<'_, Result<Option<Document>>> {
        Box::pin(async move {
            info!("Creating document from summarized text");
            let document = Document::plain_text(&input, Local::now());
            info!(file_name = %document.file_name, "Document creation completed");
            Ok(Some(document))
        })
    }
}
