//! # Track Library
//!
//! Per-user track folders laid out as `<MUSIC_DIR>/<category>/<user_id>/`.
//! Every mutation drops the affected path from the duration cache so a
//! replaced or moved file is probed again.

pub mod download;

use regex::Regex;
use serenity::model::id::UserId;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};
use tracing::{debug, info};

use crate::{
    audio::{category::TrackCategory, duration::DurationResolver},
    error::LibraryError,
};

/// Discord limita el autocompletado a 25 opciones
pub const AUTOCOMPLETE_LIMIT: usize = 25;

const TRACK_EXTENSION: &str = "mp3";

static TIMESTAMP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?::(\d+))?(?::(\d+))?$").ok());

pub type LibraryResult<T> = std::result::Result<T, LibraryError>;

pub struct TrackLibrary {
    root: PathBuf,
    durations: Arc<DurationResolver>,
    upload_limit: u64,
}

impl TrackLibrary {
    pub fn new(root: impl Into<PathBuf>, durations: Arc<DurationResolver>, upload_limit: u64) -> Self {
        Self {
            root: root.into(),
            durations,
            upload_limit,
        }
    }

    pub fn upload_limit(&self) -> u64 {
        self.upload_limit
    }

    pub fn durations(&self) -> &Arc<DurationResolver> {
        &self.durations
    }

    /// `<root>/<category>/<user>`, sin tocar el sistema de archivos.
    pub fn folder_path(&self, category: TrackCategory, user: UserId) -> PathBuf {
        self.root.join(category.as_str()).join(user.get().to_string())
    }

    /// Carpeta del usuario para `category`, creada si no existe.
    pub async fn folder(&self, category: TrackCategory, user: UserId) -> LibraryResult<PathBuf> {
        let folder = self.folder_path(category, user);
        tokio::fs::create_dir_all(&folder).await?;
        Ok(folder)
    }

    /// Archivos `.mp3` cuyo nombre contiene `filter` (sin distinguir mayúsculas),
    /// ordenados, como máximo [`AUTOCOMPLETE_LIMIT`].
    pub async fn list(&self, category: TrackCategory, user: UserId, filter: &str) -> Vec<String> {
        let folder = self.folder_path(category, user);
        let mut entries = match tokio::fs::read_dir(&folder).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let filter = filter.to_lowercase();
        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let lower = name.to_lowercase();
            if lower.ends_with(".mp3") && lower.contains(&filter) {
                names.push(name);
            }
        }

        names.sort();
        names.truncate(AUTOCOMPLETE_LIMIT);
        names
    }

    /// Resuelve un track existente; rechaza nombres con componentes de ruta.
    pub async fn track_path(
        &self,
        category: TrackCategory,
        user: UserId,
        filename: &str,
    ) -> LibraryResult<PathBuf> {
        let filename = validate_name(filename)?;
        let path = self.folder_path(category, user).join(filename);
        if is_file(&path).await {
            Ok(path)
        } else {
            Err(LibraryError::NotFound(filename.to_string()))
        }
    }

    /// Nombre final de una subida: `<new_name>.mp3` o el nombre del adjunto.
    pub fn upload_name(original: &str, new_name: Option<&str>) -> LibraryResult<String> {
        match new_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => {
                let name = sanitize_name(name)?;
                if name.to_lowercase().ends_with(".mp3") {
                    Ok(name)
                } else {
                    Ok(format!("{}.{}", name, TRACK_EXTENSION))
                }
            }
            None => sanitize_name(original),
        }
    }

    pub async fn save_upload(
        &self,
        category: TrackCategory,
        user: UserId,
        filename: &str,
        bytes: &[u8],
    ) -> LibraryResult<PathBuf> {
        if !category.accepts_uploads() {
            return Err(LibraryError::UploadsNotAllowed(category.to_string()));
        }
        self.check_size(bytes.len() as u64)?;

        let filename = validate_name(filename)?;
        let path = self.folder(category, user).await?.join(filename);
        tokio::fs::write(&path, bytes).await?;
        self.durations.invalidate(&path);

        info!("📥 Track {} guardado ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    pub fn check_size(&self, size: u64) -> LibraryResult<()> {
        if size > self.upload_limit {
            return Err(LibraryError::TooLarge {
                size,
                limit: self.upload_limit,
            });
        }
        Ok(())
    }

    pub async fn delete(&self, category: TrackCategory, user: UserId, filename: &str) -> LibraryResult<PathBuf> {
        let path = self.track_path(category, user, filename).await?;
        tokio::fs::remove_file(&path).await?;
        self.durations.invalidate(&path);
        info!("🗑️ Track eliminado: {}", path.display());
        Ok(path)
    }

    /// Borra todos los archivos de la carpeta; devuelve cuántos.
    pub async fn delete_all(&self, category: TrackCategory, user: UserId) -> LibraryResult<usize> {
        let folder = self.folder_path(category, user);
        let mut entries = match tokio::fs::read_dir(&folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(&path).await?;
                self.durations.invalidate(&path);
                deleted += 1;
            }
        }

        info!("🗑️ {} tracks eliminados de {}", deleted, folder.display());
        Ok(deleted)
    }

    pub async fn move_track(
        &self,
        user: UserId,
        filename: &str,
        source: TrackCategory,
        target: TrackCategory,
    ) -> LibraryResult<PathBuf> {
        if source == target {
            return Err(LibraryError::SameCategory);
        }

        let from = self.track_path(source, user, filename).await?;
        let to = self.folder(target, user).await?.join(validate_name(filename)?);
        if tokio::fs::try_exists(&to).await.unwrap_or(false) {
            return Err(LibraryError::AlreadyExists(filename.to_string()));
        }

        tokio::fs::rename(&from, &to).await?;
        self.durations.invalidate(&from);
        self.durations.invalidate(&to);

        info!("[{}] Track {} movido: {} → {}", user, filename, source, target);
        Ok(to)
    }

    /// Ruta de salida de la mezcla `name`, en la carpeta `mixed` del usuario.
    pub async fn mix_output(&self, user: UserId, name: &str) -> LibraryResult<PathBuf> {
        let filename = Self::upload_name(name, Some(name))?;
        let path = self.folder(TrackCategory::Mixed, user).await?.join(filename);
        debug!("Salida de mezcla: {}", path.display());
        Ok(path)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Nombre de archivo simple: sin separadores, sin `..`, no vacío
fn validate_name(name: &str) -> LibraryResult<&str> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
        || trimmed.contains('\0');
    if bad {
        Err(LibraryError::InvalidName(name.to_string()))
    } else {
        Ok(trimmed)
    }
}

/// Reemplaza caracteres no válidos en nombres de archivo y quita cualquier directorio
pub fn sanitize_name(name: &str) -> LibraryResult<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();

    validate_name(&cleaned)?;
    Ok(cleaned)
}

/// `"hh:mm:ss"`, `"mm:ss"` o `"ss"` a segundos; `None` si no es válido o desborda
pub fn parse_timestamp(text: &str) -> Option<u64> {
    let caps = TIMESTAMP.as_ref()?.captures(text.trim())?;

    let parts: Vec<u64> = caps
        .iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str().parse::<u64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match parts.as_slice() {
        [s] => Some(*s),
        [m, s] => m.checked_mul(60)?.checked_add(*s),
        [h, m, s] => h
            .checked_mul(3600)?
            .checked_add(m.checked_mul(60)?)?
            .checked_add(*s),
        _ => None,
    }
}

/// Segundos como `HH:MM:SS`
pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
