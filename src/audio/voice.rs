use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{ChildContainer, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::{
    audio::pipeline::Pipeline,
    error::{PlayerError, PlayerResult},
};

/// Cómo terminó un stream conectado al canal de voz
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    Finished,
    Errored(String),
}

/// Se resuelve una sola vez, cuando el stream termina o falla
pub type Completion = oneshot::Receiver<StreamEnd>;

/// Conexión de voz que controla el player de una guild.
///
/// Solo la usa su player; una conexión nunca se comparte entre guilds.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Lanza el pipeline y conecta su audio, reemplazando lo que sonaba
    async fn play(&self, pipeline: &Pipeline) -> PlayerResult<Completion>;
    async fn stop(&self);
    async fn pause(&self) -> bool;
    async fn resume(&self) -> bool;
    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;
    async fn is_connected(&self) -> bool;
    async fn current_channel(&self) -> Option<ChannelId>;
    async fn move_to(&self, channel: ChannelId) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
}

/// [`VoiceConnection`] sobre una [`Call`] de songbird
pub struct SongbirdConnection {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    track: SyncMutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    pub async fn join(manager: Arc<Songbird>, guild_id: GuildId, channel: ChannelId) -> Result<Self> {
        let call = manager
            .join(guild_id, channel)
            .await
            .map_err(|e| anyhow::anyhow!("Error al conectar al canal de voz: {:?}", e))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel, guild_id);

        Ok(Self {
            guild_id,
            manager,
            call,
            track: SyncMutex::new(None),
        })
    }

    fn current_track(&self) -> Option<TrackHandle> {
        self.track.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let track = self.current_track()?;
        track.get_info().await.ok().map(|info| info.playing)
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&self, pipeline: &Pipeline) -> PlayerResult<Completion> {
        let child = pipeline
            .command()
            .spawn()
            .map_err(|e| PlayerError::PipelineFailure(format!("no se pudo iniciar ffmpeg: {}", e)))?;

        // ChildContainer mata el proceso cuando songbird suelta el input
        let input = Input::from(ChildContainer::from(child));

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        let (tx, rx) = oneshot::channel();
        let notifier = CompletionNotifier::new(tx);

        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                // el track ya terminó antes de registrar el evento
                warn!("[{}] No se pudo registrar evento de track: {:?}", self.guild_id, e);
                notifier.fire(StreamEnd::Errored(format!("{:?}", e)));
            }
        }

        *self.track.lock() = Some(handle);
        Ok(rx)
    }

    async fn stop(&self) {
        if let Some(track) = self.track.lock().take() {
            let _ = track.stop();
        }
        self.call.lock().await.stop();
        debug!("[{}] Audio detenido en la conexión de voz", self.guild_id);
    }

    async fn pause(&self) -> bool {
        match self.current_track() {
            Some(track) => track.pause().is_ok(),
            None => false,
        }
    }

    async fn resume(&self) -> bool {
        match self.current_track() {
            Some(track) => track.play().is_ok(),
            None => false,
        }
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn current_channel(&self) -> Option<ChannelId> {
        self.call
            .lock()
            .await
            .current_channel()
            .map(|channel| ChannelId::from(channel.0))
    }

    async fn move_to(&self, channel: ChannelId) -> Result<()> {
        self.manager
            .join(self.guild_id, channel)
            .await
            .map_err(|e| anyhow::anyhow!("Error al mover al canal {}: {:?}", channel, e))?;
        info!("🔀 Movido al canal de voz {} en guild {}", channel, self.guild_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.track.lock().take();
        self.manager.remove(self.guild_id).await?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

/// Convierte los eventos de track de songbird en un canal de finalización
#[derive(Clone)]
struct CompletionNotifier {
    tx: Arc<SyncMutex<Option<oneshot::Sender<StreamEnd>>>>,
}

impl CompletionNotifier {
    fn new(tx: oneshot::Sender<StreamEnd>) -> Self {
        Self {
            tx: Arc::new(SyncMutex::new(Some(tx))),
        }
    }

    fn fire(&self, end: StreamEnd) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(end);
        }
    }
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let end = match ctx {
            EventContext::Track(tracks) => match tracks.first().map(|(state, _)| &state.playing) {
                Some(PlayMode::Errored(e)) => StreamEnd::Errored(format!("{:?}", e)),
                _ => StreamEnd::Finished,
            },
            _ => StreamEnd::Finished,
        };

        self.fire(end);
        Some(Event::Cancel)
    }
}
