//! # Bot Module
//!
//! Discord side of Open Palette: command registration, voice connection
//! management and gateway event handling.
//!
//! [`OpenPaletteBot`] implements Serenity's [`EventHandler`] and owns every
//! shared service the commands need:
//!
//! - [`PlayerRegistry`] with one playback state machine per guild
//! - [`TrackLibrary`] for the per-user track folders
//! - [`Mixer`] and [`UrlDownloader`] for the ffmpeg/yt-dlp jobs
//! - [`PaletteStore`] behind an async mutex

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub mod autocomplete;
pub mod commands;
pub mod handlers;
pub mod palettes;
pub mod tracks;

use crate::{
    audio::{
        mixer::Mixer,
        player::GuildPlayer,
        registry::PlayerRegistry,
        voice::SongbirdConnection,
    },
    config::Config,
    library::{download::UrlDownloader, TrackLibrary},
    storage::PaletteStore,
};

/// Main Discord handler.
///
/// Every field is shared: interaction events run concurrently, so the
/// services are reference counted and synchronize internally.
pub struct OpenPaletteBot {
    /// Configuración cargada de variables de entorno
    pub config: Arc<Config>,
    /// Máquinas de estados de reproducción por guild
    pub players: Arc<PlayerRegistry>,
    pub library: Arc<TrackLibrary>,
    pub mixer: Arc<Mixer>,
    pub downloader: Arc<UrlDownloader>,
    /// Paletas y grupos, persistidos en JSON
    pub palettes: Arc<Mutex<PaletteStore>>,
    /// `ready` se dispara en cada reconexión
    maintenance_started: AtomicBool,
}

impl OpenPaletteBot {
    pub fn new(
        config: Config,
        players: Arc<PlayerRegistry>,
        library: Arc<TrackLibrary>,
        mixer: Arc<Mixer>,
        downloader: Arc<UrlDownloader>,
        palettes: Arc<Mutex<PaletteStore>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            players,
            library,
            mixer,
            downloader,
            palettes,
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash en Discord.
    ///
    /// Con `GUILD_ID` van solo a esa guild (propagación inmediata, para
    /// desarrollo); si no, se registran globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!(
                            "No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'."
                        )
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Devuelve el player de la guild conectado a `channel_id`.
    ///
    /// Se une si no hay conexión activa y se mueve si el bot está en otro
    /// canal de la misma guild.
    pub async fn ensure_voice(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<GuildPlayer>> {
        let player = self.players.get_or_create(guild_id);

        if let Some(voice) = player.voice() {
            if voice.is_connected().await {
                if voice.current_channel().await != Some(channel_id) {
                    voice.move_to(channel_id).await?;
                    info!("[{}] 🔀 Movido al canal de voz {}", guild_id, channel_id);
                }
                return Ok(player);
            }
            debug!("[{}] Conexión de voz caída, reconectando", guild_id);
        }

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let connection = SongbirdConnection::join(manager, guild_id, channel_id).await?;
        player.attach_voice(Arc::new(connection));
        Ok(player)
    }

    /// Cancela la reproducción, desconecta y olvida el player de la guild.
    ///
    /// Devuelve `false` si el bot no estaba en un canal de voz ahí.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        let connected = match self.players.get(guild_id).and_then(|p| p.voice()) {
            Some(voice) => voice.is_connected().await,
            None => false,
        };

        self.players.remove(guild_id).await;
        if connected {
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        }
        connected
    }
}

#[async_trait]
impl EventHandler for OpenPaletteBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        if !self.maintenance_started.swap(true, Ordering::SeqCst) {
            let players = self.players.clone();
            tokio::spawn(async move {
                maintenance_tasks(players).await;
            });
        }
    }

    /// Comandos slash, botones de paleta y autocompletado.
    ///
    /// Los errores se registran y se responden dentro de los handlers; nunca
    /// llegan al bucle del gateway.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, &command, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = palettes::handle_component(&ctx, &component, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            Interaction::Autocomplete(request) => {
                if let Err(e) = autocomplete::handle_autocomplete(&ctx, &request, self).await {
                    debug!("Error en autocompletado: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Elimina el player de la guild cuando desconectan al bot.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.players.remove(guild_id).await;
            }
        }
    }
}

/// Registra cada hora los players activos y los contadores del caché de duraciones
async fn maintenance_tasks(players: Arc<PlayerRegistry>) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    // el primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;

        let metrics = players.durations().metrics();
        info!(
            "🧹 {} players activos · duraciones: {} hits, {} misses, {} evictions ({:.0}% aciertos)",
            players.len(),
            metrics.hits,
            metrics.misses,
            metrics.evictions,
            metrics.hit_rate() * 100.0
        );
    }
}
