use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Writes and reads named JSON record lists under one directory.
pub struct JsonArtifactStore {
    root: PathBuf,
    pretty: bool,
}

impl JsonArtifactStore {
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .context(format!("Failed to create artifact directory: {:?}", root))?;
        Ok(Self { root, pretty: true })
    }

    /// Single-line JSON instead of indented output.
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub async fn write_records<T: Serialize>(&self, name: &str, records: &[T]) -> Result<PathBuf> {
        let path = self.path(name);
        write_records(&path, records, self.pretty).await?;
        tracing::debug!(path = ?path, records = records.len(), "Wrote artifact");
        Ok(path)
    }

    pub async fn read_records<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        read_records(&self.path(name)).await
    }
}

/// Write a record list as UTF-8 JSON.
pub async fn write_records<T: Serialize>(path: &Path, records: &[T], pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(records)
    } else {
        serde_json::to_string(records)
    }
    .context("Failed to serialize records")?;

    tokio::fs::write(path, json)
        .await
        .context(format!("Failed to write records: {:?}", path))
}

pub async fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .context(format!("Failed to read records: {:?}", path))?;
    serde_json::from_str(&json).context(format!("Failed to parse records: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotate::{AnnotatedExample, SpanAnnotation};

    #[tokio::test]
    async fn test_examples_written_in_training_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonArtifactStore::create(dir.path().join("run")).await.unwrap().compact();

        let example = AnnotatedExample {
            tokens: vec!["Aspirin".into(), "works".into()],
            positive_spans: vec![SpanAnnotation::new(0, 0, "drug")],
            negative_spans: Some(vec![SpanAnnotation::new(0, 0, "disease")]),
        };
        let path = store.write_records("examples.json", &[example.clone()]).await.unwrap();

        let raw = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            raw,
            r#"[{"tokenized_text":["Aspirin","works"],"ner":[[0,0,"drug"]],"negative_ner":[[0,0,"disease"]]}]"#
        );

        let back: Vec<AnnotatedExample> = store.read_records("examples.json").await.unwrap();
        assert_eq!(back, vec![example]);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonArtifactStore::create(dir.path()).await.unwrap();
        assert!(store.read_records::<AnnotatedExample>("nope.json").await.is_err());
    }
}
