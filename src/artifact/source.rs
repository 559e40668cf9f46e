use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use super::{ArtifactError, deserialize};
use crate::recommend::Snapshot;

/// スナップショットの取得元。ローカルファイルのほか、任意のストレージを実装できる。
pub trait ArtifactSource: Send + Sync {
    /// ログ用の取得元の名前。
    fn describe(&self) -> String;

    /// # Errors
    /// 取得元にアーティファクトがない場合は [`ArtifactError::NotFound`]。
    fn fetch(&self) -> Result<Vec<u8>, ArtifactError>;

    /// # Errors
    /// 取得または検証に失敗した場合はエラー。
    fn load(&self) -> Result<Snapshot, ArtifactError> {
        let bytes = self.fetch()?;
        deserialize(&bytes)
    }
}

#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactSource for LocalFileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn fetch(&self) -> Result<Vec<u8>, ArtifactError> {
        fs::read(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ArtifactError::NotFound(self.path.display().to_string())
            } else {
                ArtifactError::io(self.path.display().to_string(), source)
            }
        })
    }
}

/// メモリ上のバイト列。
#[derive(Debug, Clone)]
pub struct BytesSource {
    label: String,
    bytes: Vec<u8>,
}

impl BytesSource {
    pub fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            bytes,
        }
    }
}

impl ArtifactSource for BytesSource {
    fn describe(&self) -> String {
        format!("bytes:{}", self.label)
    }

    fn fetch(&self) -> Result<Vec<u8>, ArtifactError> {
        Ok(self.bytes.clone())
    }
}

/// 先頭から順に試し、最初に検証を通ったスナップショットを返す。
///
/// すべて失敗した場合は `None`（呼び出し側は劣化モードで配信する）。
pub fn load_first_available(sources: &[&dyn ArtifactSource]) -> Option<Snapshot> {
    for source in sources {
        match source.load() {
            Ok(snapshot) => {
                info!(source = %source.describe(), "snapshot loaded");
                return Some(snapshot);
            }
            Err(error) => {
                warn!(
                    source = %source.describe(),
                    %error,
                    corrupt = error.is_corrupt(),
                    "failed to load snapshot, trying next source"
                );
            }
        }
    }
    warn!(sources = sources.len(), "no snapshot available, serving in degraded mode");
    None
}
