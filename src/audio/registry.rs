use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::{duration::DurationResolver, pipeline::PipelineBuilder, player::GuildPlayer};

/// Un [`GuildPlayer`] por guild, creado al primer uso
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    pipelines: Arc<PipelineBuilder>,
}

impl PlayerRegistry {
    pub fn new(pipelines: Arc<PipelineBuilder>) -> Self {
        Self {
            players: DashMap::new(),
            pipelines,
        }
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildPlayer> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎛️ Creando player para guild {}", guild_id);
                Arc::new(GuildPlayer::new(guild_id, self.pipelines.clone()))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|entry| entry.clone())
    }

    /// Elimina el player de la guild tras cancelar su task y soltar la
    /// conexión de voz. Devuelve si existía.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, player)) = self.players.remove(&guild_id) else {
            return false;
        };

        player.cancel_active_task().await;
        if let Some(voice) = player.detach_voice() {
            if voice.is_connected().await {
                if let Err(e) = voice.disconnect().await {
                    warn!("[{}] Error al desconectar: {:?}", guild_id, e);
                }
            }
        }
        info!("🗑️ Player eliminado para guild {}", guild_id);
        true
    }

    /// Cancela todas las tasks activas al apagar el proceso.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|entry| *entry.key()).collect();
        info!("🛑 Cerrando {} players", guilds.len());
        futures::future::join_all(guilds.into_iter().map(|guild_id| self.remove(guild_id))).await;
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn durations(&self) -> &Arc<DurationResolver> {
        self.pipelines.durations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{category::TrackCategory, testing::fixture};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let fx = fixture(&[]);
        let registry = PlayerRegistry::new(fx.pipelines.clone());

        let a = registry.get_or_create(GuildId::new(10));
        let b = registry.get_or_create(GuildId::new(10));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(GuildId::new(11)).is_none());
    }

    #[tokio::test]
    async fn test_remove_cancels_and_disconnects() {
        let fx = fixture(&[("a.mp3", 60.0)]);
        let registry = PlayerRegistry::new(fx.pipelines.clone());
        let player = registry.get_or_create(GuildId::new(10));
        player.attach_voice(fx.voice.clone());

        player
            .play(fx.track("a.mp3"), TrackCategory::Music, None, None)
            .await
            .unwrap();
        fx.voice.wait_for_launches(1).await;

        assert!(registry.remove(GuildId::new(10)).await);
        assert!(!player.has_active_task().await);
        assert!(!fx.voice.is_connected_now());
        assert!(registry.is_empty());
        assert!(!registry.remove(GuildId::new(10)).await);
    }

    #[tokio::test]
    async fn test_shutdown_clears_all_guilds() {
        let fx = fixture(&[]);
        let registry = PlayerRegistry::new(fx.pipelines.clone());
        for id in 1..=3 {
            registry.get_or_create(GuildId::new(id));
        }
        registry.shutdown().await;
        assert_eq!(registry.len(), 0);
    }
}
