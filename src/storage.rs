use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{audio::category::TrackCategory, error::StorageError};

/// Slots por paleta
pub const PALETTE_SLOTS: u8 = 20;

const PALETTES_FILE: &str = "palettes.json";

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Acceso directo a un track en un slot de paleta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub shortname: String,
    #[serde(alias = "track_type")]
    pub category: TrackCategory,
    pub filename: String,
}

/// Slots `1..=20`, vacíos (`null`) o asignados a un track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette {
    slots: BTreeMap<u8, Option<SlotEntry>>,
}

impl Palette {
    pub fn empty() -> Self {
        Self {
            slots: (1..=PALETTE_SLOTS).map(|slot| (slot, None)).collect(),
        }
    }

    pub fn slot(&self, slot: u8) -> Option<&SlotEntry> {
        self.slots.get(&slot).and_then(Option::as_ref)
    }

    /// Slots asignados, en orden.
    pub fn assigned(&self) -> impl Iterator<Item = (u8, &SlotEntry)> {
        self.slots
            .iter()
            .filter_map(|(slot, entry)| entry.as_ref().map(|entry| (*slot, entry)))
    }
}

/// Todo lo guardado por un usuario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPalettes {
    #[serde(default)]
    pub palettes: BTreeMap<String, Palette>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

/// Paletas y grupos de todos los usuarios, persistidos en un único JSON
/// formateado. El bot lo comparte detrás de un mutex async.
pub struct PaletteStore {
    path: PathBuf,
    users: BTreeMap<u64, UserPalettes>,
}

impl PaletteStore {
    pub async fn open(data_dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(PALETTES_FILE);

        let users = match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let store = Self { path, users };
        if !fs::try_exists(&store.path).await.unwrap_or(false) {
            store.save().await?;
        }

        info!(
            "📁 Paletas cargadas desde {} ({} usuarios)",
            store.path.display(),
            store.users.len()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---------- paletas ----------

    pub async fn create_palette(&mut self, user: u64, name: &str) -> StorageResult<()> {
        let mut entry = self.user(user);
        if entry.palettes.contains_key(name) {
            return Err(StorageError::PaletteExists(name.to_string()));
        }
        entry.palettes.insert(name.to_string(), Palette::empty());
        self.commit(user, entry).await?;
        info!("[{}] 🎨 Paleta '{}' creada", user, name);
        Ok(())
    }

    pub async fn set_slot(&mut self, user: u64, name: &str, slot: u8, slot_entry: SlotEntry) -> StorageResult<()> {
        check_slot(slot)?;
        let mut entry = self.user(user);
        palette_mut(&mut entry, name)?.slots.insert(slot, Some(slot_entry));
        self.commit(user, entry).await?;
        debug!("[{}] Slot {} de '{}' asignado", user, slot, name);
        Ok(())
    }

    pub async fn clear_slot(&mut self, user: u64, name: &str, slot: u8) -> StorageResult<()> {
        check_slot(slot)?;
        let mut entry = self.user(user);
        palette_mut(&mut entry, name)?.slots.insert(slot, None);
        self.commit(user, entry).await?;
        debug!("[{}] Slot {} de '{}' vaciado", user, slot, name);
        Ok(())
    }

    pub fn get_palette(&self, user: u64, name: &str) -> StorageResult<&Palette> {
        self.users
            .get(&user)
            .and_then(|u| u.palettes.get(name))
            .ok_or_else(|| StorageError::PaletteNotFound(name.to_string()))
    }

    /// Borra la paleta y la quita de todos los grupos que la incluían.
    pub async fn delete_palette(&mut self, user: u64, name: &str) -> StorageResult<()> {
        let mut entry = self.user(user);
        if entry.palettes.remove(name).is_none() {
            return Err(StorageError::PaletteNotFound(name.to_string()));
        }
        for members in entry.groups.values_mut() {
            members.retain(|member| member != name);
        }
        self.commit(user, entry).await?;
        info!("[{}] 🗑️ Paleta '{}' eliminada", user, name);
        Ok(())
    }

    pub fn list_palettes(&self, user: u64) -> Vec<String> {
        self.users
            .get(&user)
            .map(|u| u.palettes.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ---------- grupos ----------

    pub async fn create_group(&mut self, user: u64, name: &str) -> StorageResult<()> {
        let mut entry = self.user(user);
        if entry.groups.contains_key(name) {
            return Err(StorageError::GroupExists(name.to_string()));
        }
        entry.groups.insert(name.to_string(), Vec::new());
        self.commit(user, entry).await?;
        info!("[{}] 📚 Grupo '{}' creado", user, name);
        Ok(())
    }

    /// Añade una paleta existente a un grupo. Devuelve `false` si ya era
    /// miembro.
    pub async fn add_to_group(&mut self, user: u64, group: &str, palette: &str) -> StorageResult<bool> {
        let mut entry = self.user(user);
        if !entry.groups.contains_key(group) {
            return Err(StorageError::GroupNotFound(group.to_string()));
        }
        if !entry.palettes.contains_key(palette) {
            return Err(StorageError::PaletteNotFound(palette.to_string()));
        }
        let members = entry
            .groups
            .get_mut(group)
            .ok_or_else(|| StorageError::GroupNotFound(group.to_string()))?;
        if members.iter().any(|member| member == palette) {
            return Ok(false);
        }
        members.push(palette.to_string());
        self.commit(user, entry).await?;
        Ok(true)
    }

    pub fn get_group(&self, user: u64, name: &str) -> StorageResult<&[String]> {
        self.users
            .get(&user)
            .and_then(|u| u.groups.get(name))
            .map(Vec::as_slice)
            .ok_or_else(|| StorageError::GroupNotFound(name.to_string()))
    }

    pub async fn delete_group(&mut self, user: u64, name: &str) -> StorageResult<()> {
        let mut entry = self.user(user);
        if entry.groups.remove(name).is_none() {
            return Err(StorageError::GroupNotFound(name.to_string()));
        }
        self.commit(user, entry).await?;
        info!("[{}] 🗑️ Grupo '{}' eliminado", user, name);
        Ok(())
    }

    pub fn list_groups(&self, user: u64) -> Vec<String> {
        self.users
            .get(&user)
            .map(|u| u.groups.keys().cloned().collect())
            .unwrap_or_default()
    }

    // Métodos privados

    /// Copia de trabajo de los datos del usuario.
    fn user(&self, user: u64) -> UserPalettes {
        self.users.get(&user).cloned().unwrap_or_default()
    }

    /// Instala `updated` y guarda; si la escritura falla se restaura el estado anterior.
    async fn commit(&mut self, user: u64, updated: UserPalettes) -> StorageResult<()> {
        let previous = self.users.insert(user, updated);
        if let Err(e) = self.save().await {
            match previous {
                Some(previous) => self.users.insert(user, previous),
                None => self.users.remove(&user),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn save(&self) -> StorageResult<()> {
        let content = serde_json::to_string_pretty(&self.users)?;
        if let Err(e) = fs::write(&self.path, content).await {
            warn!("Error guardando {}: {}", self.path.display(), e);
            return Err(e.into());
        }
        Ok(())
    }
}

fn palette_mut<'a>(entry: &'a mut UserPalettes, name: &str) -> StorageResult<&'a mut Palette> {
    entry
        .palettes
        .get_mut(name)
        .ok_or_else(|| StorageError::PaletteNotFound(name.to_string()))
}

fn check_slot(slot: u8) -> StorageResult<()> {
    if (1..=PALETTE_SLOTS).contains(&slot) {
        Ok(())
    } else {
        Err(StorageError::InvalidSlot(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(name: &str) -> SlotEntry {
        SlotEntry {
            shortname: name.to_string(),
            category: TrackCategory::Ambient,
            filename: format!("{}.mp3", name),
        }
    }

    #[tokio::test]
    async fn test_palette_lifecycle_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PaletteStore::open(dir.path()).await.unwrap();

        store.create_palette(7, "taberna").await.unwrap();
        assert!(matches!(
            store.create_palette(7, "taberna").await,
            Err(StorageError::PaletteExists(_))
        ));
        store.set_slot(7, "taberna", 3, entry("lluvia")).await.unwrap();
        assert!(matches!(
            store.set_slot(7, "taberna", 21, entry("x")).await,
            Err(StorageError::InvalidSlot(21))
        ));
        assert!(matches!(
            store.set_slot(7, "otra", 1, entry("x")).await,
            Err(StorageError::PaletteNotFound(_))
        ));

        let reopened = PaletteStore::open(dir.path()).await.unwrap();
        let palette = reopened.get_palette(7, "taberna").unwrap();
        assert_eq!(palette.slot(3), Some(&entry("lluvia")));
        assert_eq!(palette.slot(4), None);
        assert_eq!(palette.assigned().count(), 1);
        assert_eq!(reopened.list_palettes(7), vec!["taberna".to_string()]);
        assert!(reopened.list_palettes(8).is_empty());
    }

    #[tokio::test]
    async fn test_json_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PaletteStore::open(dir.path()).await.unwrap();
        store.create_palette(7, "p").await.unwrap();
        store.set_slot(7, "p", 1, entry("a")).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["7"]["palettes"]["p"]["1"]["category"], "ambient");
        assert!(json["7"]["palettes"]["p"]["20"].is_null());
        assert_eq!(json["7"]["palettes"]["p"].as_object().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_reads_track_type_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PALETTES_FILE),
            r#"{"5": {"palettes": {"old": {"1": {"shortname": "a", "track_type": "music", "filename": "a.mp3"}, "2": null}}}}"#,
        )
        .unwrap();

        let store = PaletteStore::open(dir.path()).await.unwrap();
        let palette = store.get_palette(5, "old").unwrap();
        assert_eq!(palette.slot(1).unwrap().category, TrackCategory::Music);
        assert!(store.list_groups(5).is_empty());
    }

    #[tokio::test]
    async fn test_slot_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PaletteStore::open(dir.path()).await.unwrap();
        store.create_palette(1, "p").await.unwrap();
        store.set_slot(1, "p", 20, entry("z")).await.unwrap();
        store.clear_slot(1, "p", 20).await.unwrap();
        assert_eq!(store.get_palette(1, "p").unwrap().slot(20), None);
    }

    #[tokio::test]
    async fn test_groups() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PaletteStore::open(dir.path()).await.unwrap();
        store.create_palette(1, "a").await.unwrap();
        store.create_palette(1, "b").await.unwrap();
        store.create_group(1, "sesion").await.unwrap();
        assert!(matches!(
            store.create_group(1, "sesion").await,
            Err(StorageError::GroupExists(_))
        ));

        assert!(store.add_to_group(1, "sesion", "a").await.unwrap());
        assert!(store.add_to_group(1, "sesion", "b").await.unwrap());
        assert!(!store.add_to_group(1, "sesion", "a").await.unwrap());
        assert!(matches!(
            store.add_to_group(1, "sesion", "zzz").await,
            Err(StorageError::PaletteNotFound(_))
        ));
        assert!(matches!(
            store.add_to_group(1, "nada", "a").await,
            Err(StorageError::GroupNotFound(_))
        ));
        assert_eq!(store.get_group(1, "sesion").unwrap(), ["a", "b"]);

        store.delete_palette(1, "a").await.unwrap();
        assert_eq!(store.get_group(1, "sesion").unwrap(), ["b"]);

        store.delete_group(1, "sesion").await.unwrap();
        assert!(matches!(
            store.delete_group(1, "sesion").await,
            Err(StorageError::GroupNotFound(_))
        ));
        assert!(store.list_groups(1).is_empty());
        assert_eq!(store.list_palettes(1), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PaletteStore::open(dir.path()).await.unwrap();
        store.create_palette(1, "a").await.unwrap();

        // un directorio en lugar del archivo hace fallar la escritura
        std::fs::remove_file(store.path()).unwrap();
        std::fs::create_dir(store.path()).unwrap();

        assert!(matches!(store.create_palette(1, "b").await, Err(StorageError::Io(_))));
        assert!(store.create_group(2, "g").await.is_err());
        assert!(store.delete_palette(1, "a").await.is_err());
        assert_eq!(store.list_palettes(1), vec!["a".to_string()]);
        assert!(store.list_groups(2).is_empty());

        std::fs::remove_dir(store.path()).unwrap();
        store.create_palette(1, "b").await.unwrap();
        store.create_group(2, "g").await.unwrap();
        assert_eq!(store.list_palettes(1), vec!["a".to_string(), "b".to_string()]);
    }
}
