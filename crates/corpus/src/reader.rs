use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use walkdir::WalkDir;

/// Accepted shapes of a JSON corpus entry.
#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusEntry {
    Record { text: String },
    Plain(String),
}

pub struct CorpusReader;

impl CorpusReader {
    /// Read a JSON corpus: either `[{"text": "..."}, ...]` or `["...", ...]`.
    pub async fn read_json(path: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(path)
            .await
            .context(format!("Failed to read corpus file: {:?}", path))?;

        let entries: Vec<CorpusEntry> = serde_json::from_str(&content)
            .context(format!("Failed to parse corpus file: {:?}", path))?;

        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                CorpusEntry::Record { text } => text,
                CorpusEntry::Plain(text) => text,
            })
            .collect())
    }

    /// Read a single text file, one passage per blank-line separated paragraph.
    pub async fn read_text(path: &Path) -> Result<Vec<String>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension {
            "txt" | "md" => {
                let content = fs::read_to_string(path)
                    .await
                    .context(format!("Failed to read file: {:?}", path))?;
                Ok(split_paragraphs(&content))
            }
            _ => anyhow::bail!("Unsupported file format: {}", extension),
        }
    }

    /// Recursively read every `.txt` / `.md` file under `dir`, in path order.
    pub async fn read_directory(dir: &Path) -> Result<Vec<String>> {
        let mut paths: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md")
                )
            })
            .collect();
        paths.sort();

        let mut passages = Vec::new();
        for path in paths {
            passages.extend(Self::read_text(&path).await?);
        }

        tracing::debug!(dir = ?dir, passages = passages.len(), "Read corpus directory");
        Ok(passages)
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
