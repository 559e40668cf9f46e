//! スナップショットの永続化フォーマット。
//!
//! レイアウト: `MAGIC` (8 バイト) | フォーマットバージョン (u16 LE) | フラグ (u8) | ペイロード。
//! ペイロードは bincode でエンコードした [`Snapshot`]。フラグの bit0 が立っていれば gzip 圧縮済み。
//! 読み込み時は構造の整合性まで検証し、壊れたアーティファクトが配信に乗らないようにする。
pub mod source;

use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use thiserror::Error;

use crate::recommend::Snapshot;

pub use source::{ArtifactSource, BytesSource, LocalFileSource, load_first_available};

pub const MAGIC: [u8; 8] = *b"NEWSRECM";
pub const FORMAT_VERSION: u16 = 1;

const FLAG_GZIP: u8 = 0b0000_0001;
const KNOWN_FLAGS: u8 = FLAG_GZIP;
const HEADER_LEN: usize = MAGIC.len() + 2 + 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("I/O error on {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("corrupt artifact: {0}")]
    Corrupt(String),
    #[error("incompatible artifact format version {found} (expected {expected})")]
    IncompatibleVersion { found: u16, expected: u16 },
}

impl ArtifactError {
    /// 読めたが中身が使えないもの（破損・バージョン不一致）。
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_) | Self::IncompatibleVersion { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn io(location: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            location: location.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub compress: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// # Errors
/// エンコードに失敗した場合は [`ArtifactError::Encode`]。
pub fn serialize(snapshot: &Snapshot) -> Result<Vec<u8>, ArtifactError> {
    serialize_with(snapshot, EncodeOptions::default())
}

/// # Errors
/// エンコードまたは圧縮に失敗した場合はエラー。
pub fn serialize_with(
    snapshot: &Snapshot,
    options: EncodeOptions,
) -> Result<Vec<u8>, ArtifactError> {
    let payload = bincode::serde::encode_to_vec(snapshot, bincode::config::standard())?;
    let payload_bytes = payload.len();

    let (flags, body) = if options.compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&payload)
            .map_err(|source| ArtifactError::io("gzip encoder", source))?;
        let compressed = encoder
            .finish()
            .map_err(|source| ArtifactError::io("gzip encoder", source))?;
        (FLAG_GZIP, compressed)
    } else {
        (0, payload)
    };

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.push(flags);
    bytes.extend_from_slice(&body);

    tracing::debug!(
        payload_bytes,
        artifact_bytes = bytes.len(),
        compressed = options.compress,
        "snapshot serialized"
    );
    Ok(bytes)
}

/// バイト列からスナップショットを復元し、内部の整合性を検証する。
///
/// # Errors
/// ヘッダ不正・展開失敗・デコード失敗・整合性違反は [`ArtifactError::Corrupt`]、
/// バージョン不一致は [`ArtifactError::IncompatibleVersion`]。
pub fn deserialize(bytes: &[u8]) -> Result<Snapshot, ArtifactError> {
    if bytes.len() < HEADER_LEN {
        return Err(ArtifactError::Corrupt(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if header[..MAGIC.len()] != MAGIC {
        return Err(ArtifactError::Corrupt("magic bytes mismatch".to_string()));
    }
    let version = u16::from_le_bytes([header[MAGIC.len()], header[MAGIC.len() + 1]]);
    if version != FORMAT_VERSION {
        return Err(ArtifactError::IncompatibleVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }
    let flags = header[MAGIC.len() + 2];
    if flags & !KNOWN_FLAGS != 0 {
        return Err(ArtifactError::Corrupt(format!("unknown flags {flags:#010b}")));
    }

    let payload = if flags & FLAG_GZIP == 0 {
        body.to_vec()
    } else {
        let mut decoder = GzDecoder::new(body);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|error| ArtifactError::Corrupt(format!("gzip payload: {error}")))?;
        decompressed
    };

    let (snapshot, consumed): (Snapshot, usize) =
        bincode::serde::decode_from_slice(&payload, bincode::config::standard())
            .map_err(|error| ArtifactError::Corrupt(format!("payload decode: {error}")))?;
    if consumed != payload.len() {
        return Err(ArtifactError::Corrupt(format!(
            "{} trailing bytes after payload",
            payload.len() - consumed
        )));
    }
    snapshot
        .check_consistency()
        .map_err(ArtifactError::Corrupt)?;
    Ok(snapshot)
}

/// 同じディレクトリの一時ファイルに書いてから rename する。読み手が書きかけのファイルを見ることはない。
///
/// # Errors
/// エンコードまたはファイル操作に失敗した場合はエラー。
pub fn save_to_path(
    snapshot: &Snapshot,
    path: &Path,
    options: EncodeOptions,
) -> Result<(), ArtifactError> {
    let bytes = serialize_with(snapshot, options)?;
    let location = path.display().to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|source| ArtifactError::io(&location, source))?;

    let mut file =
        tempfile::NamedTempFile::new_in(dir).map_err(|source| ArtifactError::io(&location, source))?;
    file.write_all(&bytes)
        .map_err(|source| ArtifactError::io(&location, source))?;
    file.as_file()
        .sync_all()
        .map_err(|source| ArtifactError::io(&location, source))?;
    file.persist(path)
        .map_err(|error| ArtifactError::io(&location, error.error))?;

    tracing::info!(path = %location, bytes = bytes.len(), "snapshot artifact saved");
    Ok(())
}

/// # Errors
/// ファイルがなければ [`ArtifactError::NotFound`]、それ以外は [`deserialize`] と同じ。
pub fn load_from_path(path: &Path) -> Result<Snapshot, ArtifactError> {
    LocalFileSource::new(path).load()
}
