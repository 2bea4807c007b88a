use parking_lot::RwLock;
use serenity::model::id::GuildId;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        category::{PerCategory, TrackCategory},
        pipeline::{effective_seek, PipelineBuilder},
        task::{display_name, Launch, PlaybackTask, TaskOutcome},
        voice::VoiceConnection,
    },
    error::{PlayerError, PlayerResult},
};

/// Volumen máximo por categoría
pub const MAX_VOLUME: f32 = 2.0;

/// Ciclo de vida del track de una guild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Starting,
    Playing,
    Paused,
}

/// Lo que nominalmente suena (o sonó por última vez)
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentTrack {
    pub path: PathBuf,
    pub category: TrackCategory,
}

impl CurrentTrack {
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSettings {
    pub fade_in_enabled: bool,
    pub fade_out_enabled: bool,
    pub fade_in_duration: f64,
    pub fade_out_duration: f64,
}

impl FadeSettings {
    pub fn defaults_for(category: TrackCategory) -> Self {
        match category {
            TrackCategory::Music | TrackCategory::Mixed => Self {
                fade_in_enabled: false,
                fade_out_enabled: true,
                fade_in_duration: 3.0,
                fade_out_duration: 5.0,
            },
            TrackCategory::Ambient => Self {
                fade_in_enabled: false,
                fade_out_enabled: false,
                fade_in_duration: 2.0,
                fade_out_duration: 2.0,
            },
        }
    }

    fn effective_in(&self) -> f64 {
        if self.fade_in_enabled {
            self.fade_in_duration
        } else {
            0.0
        }
    }

    fn effective_out(&self) -> f64 {
        if self.fade_out_enabled {
            self.fade_out_duration
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
struct Settings {
    loop_flags: PerCategory<bool>,
    volumes: PerCategory<f32>,
    fades: PerCategory<FadeSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            loop_flags: PerCategory::splat(false),
            volumes: PerCategory::splat(1.0),
            fades: PerCategory {
                music: FadeSettings::defaults_for(TrackCategory::Music),
                ambient: FadeSettings::defaults_for(TrackCategory::Ambient),
                mixed: FadeSettings::defaults_for(TrackCategory::Mixed),
            },
        }
    }
}

/// Posición: `elapsed = (now - started_at) + offset`, sin contar el tiempo en pausa
#[derive(Debug)]
struct Timeline {
    phase: PlaybackPhase,
    current: Option<CurrentTrack>,
    task_id: u64,
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    offset: f64,
}

impl Timeline {
    fn position(&self) -> Option<f64> {
        let started = self.started_at?;
        let now = self.paused_at.unwrap_or_else(Instant::now);
        Some(now.saturating_duration_since(started).as_secs_f64() + self.offset)
    }

    fn reset_clock(&mut self) {
        self.started_at = None;
        self.paused_at = None;
        self.offset = 0.0;
    }
}

/// Estado compartido entre un [`GuildPlayer`] y su task activa
pub(crate) struct PlayerShared {
    pub(crate) guild_id: GuildId,
    pub(crate) pipelines: Arc<PipelineBuilder>,
    settings: RwLock<Settings>,
    timeline: RwLock<Timeline>,
}

impl PlayerShared {
    pub(crate) fn volume(&self, category: TrackCategory) -> f32 {
        *self.settings.read().volumes.get(category)
    }

    pub(crate) fn loop_enabled(&self, category: TrackCategory) -> bool {
        *self.settings.read().loop_flags.get(category)
    }

    fn begin(&self, task_id: u64) {
        let mut timeline = self.timeline.write();
        timeline.task_id = task_id;
        timeline.phase = PlaybackPhase::Starting;
        timeline.reset_clock();
    }

    pub(crate) fn mark_starting(&self, task_id: u64) {
        let mut timeline = self.timeline.write();
        if timeline.task_id == task_id {
            timeline.phase = PlaybackPhase::Starting;
        }
    }

    pub(crate) fn mark_playing(&self, task_id: u64, seek_seconds: f64) {
        let mut timeline = self.timeline.write();
        if timeline.task_id == task_id {
            timeline.phase = PlaybackPhase::Playing;
            timeline.started_at = Some(Instant::now());
            timeline.paused_at = None;
            timeline.offset = seek_seconds;
        }
    }

    /// Fin natural o fallo: vuelve a Idle y el track sigue cargado.
    pub(crate) fn finish(&self, task_id: u64) {
        let mut timeline = self.timeline.write();
        if timeline.task_id == task_id {
            timeline.phase = PlaybackPhase::Idle;
            timeline.reset_clock();
        }
    }

    fn settle_idle(&self) {
        let mut timeline = self.timeline.write();
        timeline.phase = PlaybackPhase::Idle;
        timeline.reset_clock();
    }
}

/// Máquina de estados de reproducción por guild.
///
/// Toda transición que reemplaza la task activa mantiene `active` bloqueado
/// durante cancelar → esperar el fin → lanzar, así que nunca hay más de una
/// task sobre la conexión de voz.
pub struct GuildPlayer {
    guild_id: GuildId,
    shared: Arc<PlayerShared>,
    voice: RwLock<Option<Arc<dyn VoiceConnection>>>,
    active: Mutex<Option<PlaybackTask>>,
    next_task_id: AtomicU64,
    #[cfg(test)]
    replaced: parking_lot::Mutex<Vec<TaskOutcome>>,
}

impl GuildPlayer {
    pub fn new(guild_id: GuildId, pipelines: Arc<PipelineBuilder>) -> Self {
        Self {
            guild_id,
            shared: Arc::new(PlayerShared {
                guild_id,
                pipelines,
                settings: RwLock::new(Settings::default()),
                timeline: RwLock::new(Timeline {
                    phase: PlaybackPhase::Idle,
                    current: None,
                    task_id: 0,
                    started_at: None,
                    paused_at: None,
                    offset: 0.0,
                }),
            }),
            voice: RwLock::new(None),
            active: Mutex::new(None),
            next_task_id: AtomicU64::new(0),
            #[cfg(test)]
            replaced: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    // ---------- conexión de voz ----------

    pub fn attach_voice(&self, voice: Arc<dyn VoiceConnection>) {
        *self.voice.write() = Some(voice);
    }

    pub fn detach_voice(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.voice.write().take()
    }

    pub fn voice(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.voice.read().clone()
    }

    async fn live_voice(&self) -> PlayerResult<Arc<dyn VoiceConnection>> {
        match self.voice() {
            Some(voice) if voice.is_connected().await => Ok(voice),
            _ => Err(PlayerError::NotConnected),
        }
    }

    // ---------- consultas ----------

    pub fn phase(&self) -> PlaybackPhase {
        self.shared.timeline.read().phase
    }

    pub fn current_track(&self) -> Option<CurrentTrack> {
        self.shared.timeline.read().current.clone()
    }

    /// El track cargado, solo mientras suena o está en pausa.
    pub fn now_playing(&self) -> Option<(CurrentTrack, PlaybackPhase)> {
        let timeline = self.shared.timeline.read();
        match timeline.phase {
            PlaybackPhase::Playing | PlaybackPhase::Paused => {
                timeline.current.clone().map(|track| (track, timeline.phase))
            }
            _ => None,
        }
    }

    /// Segundos transcurridos del track, `None` si no suena nada.
    pub fn current_position(&self) -> Option<f64> {
        self.shared.timeline.read().position()
    }

    pub fn volume(&self, category: TrackCategory) -> f32 {
        self.shared.volume(category)
    }

    pub fn loop_enabled(&self, category: TrackCategory) -> bool {
        self.shared.loop_enabled(category)
    }

    pub async fn has_active_task(&self) -> bool {
        let mut active = self.active.lock().await;
        prune_finished(&mut active);
        active.is_some()
    }

    pub async fn duration(&self, path: &Path) -> f64 {
        self.shared.pipelines.durations().duration(path).await
    }

    // ---------- transiciones ----------

    /// Reproduce `path` desde el inicio, reemplazando lo que sonaba.
    ///
    /// Los fades explícitos mandan; si no, se aplican los activos de la categoría.
    pub async fn play(
        &self,
        path: impl Into<PathBuf>,
        category: TrackCategory,
        fade_in: Option<f64>,
        fade_out: Option<f64>,
    ) -> PlayerResult<()> {
        let path = path.into();
        let voice = self.live_voice().await?;

        if !tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(PlayerError::TrackNotFound(path));
        }

        let fades = self.fade_settings(category);
        let fade_in = fade_in.unwrap_or_else(|| fades.effective_in()).max(0.0);
        let fade_out = fade_out.unwrap_or_else(|| fades.effective_out()).max(0.0);

        let mut active = self.active.lock().await;
        self.cancel_locked(&mut active).await;

        self.shared.timeline.write().current = Some(CurrentTrack {
            path: path.clone(),
            category,
        });

        info!(
            "[{}] 🎵 Reproduciendo {} (categoría {})",
            self.guild_id,
            display_name(&path),
            category
        );

        let mut launch = Launch::new(path, category);
        launch.fade_in = fade_in;
        launch.fade_out = fade_out;
        self.launch_locked(&mut active, voice, launch);
        Ok(())
    }

    pub async fn pause(&self) -> PlayerResult<()> {
        let voice = self.voice().ok_or(PlayerError::NothingToPause)?;
        if self.phase() != PlaybackPhase::Playing || !voice.is_playing().await {
            return Err(PlayerError::NothingToPause);
        }
        if !voice.pause().await {
            return Err(PlayerError::NothingToPause);
        }

        let mut timeline = self.shared.timeline.write();
        timeline.phase = PlaybackPhase::Paused;
        timeline.paused_at = Some(Instant::now());
        info!("[{}] ⏸️ Reproducción pausada", self.guild_id);
        Ok(())
    }

    pub async fn resume(&self) -> PlayerResult<()> {
        let voice = self.voice().ok_or(PlayerError::NothingToResume)?;
        if self.phase() != PlaybackPhase::Paused || !voice.is_paused().await {
            return Err(PlayerError::NothingToResume);
        }
        if !voice.resume().await {
            return Err(PlayerError::NothingToResume);
        }

        let mut timeline = self.shared.timeline.write();
        if let (Some(started), Some(paused)) = (timeline.started_at, timeline.paused_at) {
            // el tiempo en pausa no cuenta como reproducido
            timeline.started_at = Some(started + Instant::now().saturating_duration_since(paused));
        }
        timeline.paused_at = None;
        timeline.phase = PlaybackPhase::Playing;
        info!("[{}] ▶️ Reproducción reanudada", self.guild_id);
        Ok(())
    }

    /// Cancela la reproducción y descarga el track. Se puede repetir: la
    /// segunda llamada devuelve `NothingToStop` y deja el player en Idle.
    pub async fn stop(&self) -> PlayerResult<()> {
        let mut active = self.active.lock().await;
        prune_finished(&mut active);
        let had_task = active.is_some();
        self.cancel_locked(&mut active).await;

        if let Some(voice) = self.voice() {
            if voice.is_playing().await || voice.is_paused().await {
                voice.stop().await;
            }
        }

        let had_track = {
            let mut timeline = self.shared.timeline.write();
            timeline.phase = PlaybackPhase::Idle;
            timeline.reset_clock();
            timeline.current.take().is_some()
        };

        if had_task || had_track {
            info!("[{}] ⏹️ Reproducción detenida", self.guild_id);
        }

        if had_task {
            Ok(())
        } else {
            Err(PlayerError::NothingToStop)
        }
    }

    /// Reinicia el track cargado en `position`. Posiciones en o tras el final
    /// vuelven a 0. Devuelve la posición usada.
    pub async fn seek(&self, position: f64) -> PlayerResult<f64> {
        let mut active = self.active.lock().await;
        let current = self.current_track().ok_or(PlayerError::NoCurrentTrack)?;
        let voice = self.live_voice().await?;

        let duration = self.duration(&current.path).await;
        let position = effective_seek(position, duration);
        if duration > 0.0 {
            info!(
                "[{}] ⏩ Seek a {:.1}s de {:.1}s en {}",
                self.guild_id,
                position,
                duration,
                current.file_name()
            );
        }

        self.cancel_locked(&mut active).await;

        let mut launch = Launch::new(current.path, current.category);
        launch.seek_seconds = position;
        launch.fade_out = self.fade_settings(current.category).effective_out();
        self.launch_locked(&mut active, voice, launch);
        Ok(position)
    }

    /// Fija el volumen de una categoría (entre `0.0` y `2.0`). Si esa categoría
    /// está sonando, el track se reinicia desde 0 con el volumen nuevo; en pausa
    /// solo se guarda.
    pub async fn set_volume(&self, category: TrackCategory, value: f32) -> PlayerResult<f32> {
        let value = value.clamp(0.0, MAX_VOLUME);
        *self.shared.settings.write().volumes.get_mut(category) = value;
        info!("[{}] 🔊 Volumen de '{}' = {:.2}", self.guild_id, category, value);

        let mut active = self.active.lock().await;
        prune_finished(&mut active);

        // en pausa solo se guarda; se aplica en el próximo lanzamiento
        let on_air = matches!(self.phase(), PlaybackPhase::Playing | PlaybackPhase::Starting);
        let current = match self.current_track() {
            Some(track) if track.category == category && active.is_some() && on_air => track,
            _ => return Ok(value),
        };
        let voice = self.live_voice().await?;

        debug!("[{}] Reiniciando el track para aplicar el volumen", self.guild_id);
        self.cancel_locked(&mut active).await;

        let fades = self.fade_settings(category);
        let mut launch = Launch::new(current.path, category);
        launch.fade_in = fades.effective_in();
        launch.fade_out = fades.effective_out();
        self.launch_locked(&mut active, voice, launch);
        Ok(value)
    }

    /// Desactivar el loop mientras suena esa categoría cancela la reproducción.
    pub async fn set_loop(&self, category: TrackCategory, enabled: bool) {
        *self.shared.settings.write().loop_flags.get_mut(category) = enabled;
        info!("[{}] 🔁 Loop de '{}' = {}", self.guild_id, category, enabled);

        if enabled {
            return;
        }

        let mut active = self.active.lock().await;
        prune_finished(&mut active);
        let same_category = active
            .as_ref()
            .is_some_and(|task| task.launch().category == category);

        if same_category {
            self.cancel_locked(&mut active).await;
            self.shared.settle_idle();
        }
    }

    /// Atenúa desde el punto actual durante `requested` segundos (recortado a
    /// lo que queda del track) y termina la reproducción. Devuelve la duración
    /// aplicada, o `None` si no había nada que atenuar.
    ///
    /// La pasada de fade-out se decodifica con ventana `-t` y no se repite
    /// aunque el loop de la categoría esté activo.
    pub async fn fade_out(&self, requested: f64) -> Option<f64> {
        let mut active = self.active.lock().await;

        let current = match self.current_track() {
            Some(track) => track,
            None => {
                info!("[{}] No hay track para fade-out", self.guild_id);
                return None;
            }
        };

        let voice = match self.live_voice().await {
            Ok(voice) if self.phase() == PlaybackPhase::Playing => voice,
            _ => {
                info!("[{}] Nada que atenuar", self.guild_id);
                return None;
            }
        };
        if !voice.is_playing().await {
            info!("[{}] Nada que atenuar", self.guild_id);
            return None;
        }

        let position = self.current_position().unwrap_or(0.0);
        let duration = self.duration(&current.path).await;
        let requested = requested.max(0.0);

        let applied = if duration > 0.0 {
            let remaining = duration - position;
            if remaining <= 0.0 {
                info!("[{}] El track ya está en el final", self.guild_id);
                return None;
            }
            requested.min(remaining)
        } else {
            requested
        };

        if applied <= 0.0 {
            return None;
        }

        self.cancel_locked(&mut active).await;

        info!(
            "[{}] 🌅 Fade-out de {:.1}s desde {:.1}s",
            self.guild_id, applied, position
        );

        let mut launch = Launch::new(current.path, current.category);
        launch.seek_seconds = position;
        launch.fade_out = applied;
        launch.window = Some(applied);
        self.launch_locked(&mut active, voice, launch);
        Some(applied)
    }

    /// Reinicia el track cargado desde 0 con un fade-in de `duration` segundos.
    pub async fn restart_with_fade_in(&self, duration: f64) -> PlayerResult<()> {
        let mut active = self.active.lock().await;
        let current = self.current_track().ok_or(PlayerError::NoCurrentTrack)?;
        let voice = self.live_voice().await?;

        self.cancel_locked(&mut active).await;

        info!("[{}] 🌄 Reinicio con fade-in de {:.1}s", self.guild_id, duration);
        let mut launch = Launch::new(current.path, current.category);
        launch.fade_in = duration.max(0.0);
        self.launch_locked(&mut active, voice, launch);
        Ok(())
    }

    /// Para la task activa sin descargar el track.
    pub async fn cancel_active_task(&self) -> Option<TaskOutcome> {
        let mut active = self.active.lock().await;
        let outcome = self.cancel_locked(&mut active).await;
        self.shared.settle_idle();
        outcome
    }

    // ---------- configuración de fades ----------

    pub fn fade_settings(&self, category: TrackCategory) -> FadeSettings {
        *self.shared.settings.read().fades.get(category)
    }

    pub fn set_fade_enabled(
        &self,
        category: TrackCategory,
        fade_in: Option<bool>,
        fade_out: Option<bool>,
    ) -> FadeSettings {
        let mut settings = self.shared.settings.write();
        let fades = settings.fades.get_mut(category);
        if let Some(enabled) = fade_in {
            fades.fade_in_enabled = enabled;
        }
        if let Some(enabled) = fade_out {
            fades.fade_out_enabled = enabled;
        }
        debug!("[{}] Fades de '{}': {:?}", self.guild_id, category, fades);
        *fades
    }

    pub fn set_fade_duration(
        &self,
        category: TrackCategory,
        fade_in: Option<f64>,
        fade_out: Option<f64>,
    ) -> FadeSettings {
        let mut settings = self.shared.settings.write();
        let fades = settings.fades.get_mut(category);
        if let Some(seconds) = fade_in {
            fades.fade_in_duration = seconds.max(0.0);
        }
        if let Some(seconds) = fade_out {
            fades.fade_out_duration = seconds.max(0.0);
        }
        debug!("[{}] Fades de '{}': {:?}", self.guild_id, category, fades);
        *fades
    }

    // ---------- internos (requieren el lock de `active`) ----------

    async fn cancel_locked(&self, active: &mut Option<PlaybackTask>) -> Option<TaskOutcome> {
        let task = active.take()?;
        let id = task.id();
        let outcome = task.cancel().await;
        debug!("[{}] Task {} terminó: {:?}", self.guild_id, id, outcome);
        if let TaskOutcome::Failed(reason) = &outcome {
            warn!("[{}] La reproducción anterior había fallado: {}", self.guild_id, reason);
        }
        #[cfg(test)]
        self.replaced.lock().push(outcome.clone());
        Some(outcome)
    }

    fn launch_locked(
        &self,
        active: &mut Option<PlaybackTask>,
        voice: Arc<dyn VoiceConnection>,
        launch: Launch,
    ) {
        debug_assert!(active.is_none(), "launch with a live task");
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.begin(id);
        *active = Some(PlaybackTask::spawn(id, self.shared.clone(), voice, launch));
    }
}

fn prune_finished(active: &mut Option<PlaybackTask>) {
    if active.as_ref().is_some_and(PlaybackTask::is_finished) {
        active.take();
    }
}
