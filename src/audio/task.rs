use std::{path::PathBuf, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audio::{
    category::TrackCategory,
    pipeline::PlaybackRequest,
    player::PlayerShared,
    voice::{StreamEnd, VoiceConnection},
};

/// Parámetros de la primera pasada de una task
#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    pub path: PathBuf,
    pub category: TrackCategory,
    pub seek_seconds: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    /// Ventana de decodificación de un fade-out; esa pasada termina en vez de repetirse
    pub window: Option<f64>,
}

impl Launch {
    pub fn new(path: PathBuf, category: TrackCategory) -> Self {
        Self {
            path,
            category,
            seek_seconds: 0.0,
            fade_in: 0.0,
            fade_out: 0.0,
            window: None,
        }
    }
}

/// Estado final de una [`PlaybackTask`]
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Una reproducción cancelable (con sus repeticiones de loop) sobre la
/// conexión de voz de una guild.
pub struct PlaybackTask {
    id: u64,
    launch: Launch,
    token: CancellationToken,
    handle: JoinHandle<TaskOutcome>,
}

impl PlaybackTask {
    pub(crate) fn spawn(
        id: u64,
        shared: Arc<PlayerShared>,
        voice: Arc<dyn VoiceConnection>,
        launch: Launch,
    ) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(id, shared, voice, launch.clone(), token.clone()));

        Self {
            id,
            launch,
            token,
            handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn launch(&self) -> &Launch {
        &self.launch
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Pide la cancelación y espera a que la task termine del todo.
    ///
    /// Si ya había terminado, devuelve su propio resultado.
    pub async fn cancel(self) -> TaskOutcome {
        self.token.cancel();
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Failed(format!("playback task panicked: {}", e)),
        }
    }
}

async fn run(
    id: u64,
    shared: Arc<PlayerShared>,
    voice: Arc<dyn VoiceConnection>,
    mut launch: Launch,
    token: CancellationToken,
) -> TaskOutcome {
    let guild_id = shared.guild_id;

    loop {
        let mut request = PlaybackRequest::new(launch.path.clone(), shared.volume(launch.category))
            .seek(launch.seek_seconds)
            .fades(launch.fade_in, launch.fade_out);
        if let Some(window) = launch.window {
            request = request.limit(window);
        }

        let pipeline = tokio::select! {
            biased;
            _ = token.cancelled() => return TaskOutcome::Cancelled,
            pipeline = shared.pipelines.build(request) => pipeline,
        };

        let completion = match voice.play(&pipeline).await {
            Ok(completion) => completion,
            Err(e) => {
                error!("[{}] Error al iniciar el pipeline: {}", guild_id, e);
                shared.finish(id);
                return TaskOutcome::Failed(e.to_string());
            }
        };

        shared.mark_playing(id, pipeline.request.seek_seconds);
        info!(
            "[{}] ▶️ {} (vol {:.2}, seek {:.1}s, fade-in {:.1}s, fade-out {:.1}s)",
            guild_id,
            display_name(&launch.path),
            pipeline.request.volume,
            pipeline.request.seek_seconds,
            pipeline.request.fade_in,
            pipeline.request.fade_out
        );

        let end = tokio::select! {
            biased;
            _ = token.cancelled() => {
                voice.stop().await;
                debug!("[{}] Reproducción cancelada (task {})", guild_id, id);
                return TaskOutcome::Cancelled;
            }
            end = completion => end,
        };

        match end {
            Ok(StreamEnd::Finished) => {}
            Ok(StreamEnd::Errored(reason)) => {
                error!("[{}] Error en la reproducción: {}", guild_id, reason);
                shared.finish(id);
                return TaskOutcome::Failed(reason);
            }
            Err(_) => {
                error!("[{}] El stream terminó sin señal de finalización", guild_id);
                shared.finish(id);
                return TaskOutcome::Failed("completion signal dropped".to_string());
            }
        }

        info!("[{}] ⏹️ Reproducción terminada: {}", guild_id, display_name(&launch.path));

        if token.is_cancelled() || launch.window.is_some() || !shared.loop_enabled(launch.category) {
            shared.finish(id);
            return TaskOutcome::Completed;
        }

        info!("[{}] 🔁 Repitiendo: {}", guild_id, display_name(&launch.path));
        // las repeticiones empiezan desde el inicio y sin fade-in
        launch.seek_seconds = 0.0;
        launch.fade_in = 0.0;
        shared.mark_starting(id);
    }
}

pub(crate) fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
