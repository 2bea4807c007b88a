//! Error types for playback, mixing and palette storage.
//!
//! Command handlers work with `anyhow::Result`; these enums exist so the
//! handlers can tell a user-facing "nothing to pause" apart from a broken
//! pipeline and answer accordingly.

use std::path::PathBuf;
use thiserror::Error;

/// Fallos de la máquina de estados de reproducción de una guild
#[derive(Debug, Error)]
pub enum PlayerError {
    /// No hay conexión de voz activa en la guild
    #[error("not connected to a voice channel")]
    NotConnected,

    /// La operación necesita un track cargado
    #[error("no track is loaded")]
    NoCurrentTrack,

    #[error("nothing to pause")]
    NothingToPause,

    #[error("nothing to resume")]
    NothingToResume,

    #[error("nothing to stop")]
    NothingToStop,

    /// El archivo no está en la carpeta de la categoría
    #[error("track not found: {0}")]
    TrackNotFound(PathBuf),

    /// El proceso de decodificación no arrancó o murió
    #[error("audio pipeline failed: {0}")]
    PipelineFailure(String),

    /// Falló la consulta de duración; normalmente se trata como "desconocida"
    #[error("duration probe failed: {0}")]
    ProbeFailure(String),

    #[error("unknown track category: {0}")]
    InvalidCategory(String),
}

/// Fallos del mezclador offline
#[derive(Debug, Error)]
pub enum MixError {
    /// ffmpeg terminó con error; incluye su stderr
    #[error("mix failed ({status}): {diagnostics}")]
    MixFailed { status: String, diagnostics: String },

    #[error("could not start ffmpeg: {0}")]
    Spawn(std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Gestión de archivos de tracks en el directorio de música
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("invalid file name `{0}`")]
    InvalidName(String),

    #[error("track `{0}` not found")]
    NotFound(String),

    #[error("`{0}` already exists in the target category")]
    AlreadyExists(String),

    #[error("source and target category are the same")]
    SameCategory,

    #[error("category `{0}` does not accept uploads")]
    UploadsNotAllowed(String),

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// yt-dlp o ffmpeg fallaron al descargar una URL
    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fallos de paletas y grupos que se reportan al usuario
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("palette `{0}` already exists")]
    PaletteExists(String),

    #[error("palette `{0}` not found")]
    PaletteNotFound(String),

    #[error("group `{0}` already exists")]
    GroupExists(String),

    #[error("group `{0}` not found")]
    GroupNotFound(String),

    #[error("slot {0} is outside 1..=20")]
    InvalidSlot(u8),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt palette file: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
