//! Test doubles for the voice connection and the duration probe.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;
use tokio::sync::oneshot;

use crate::{
    audio::{
        duration::{DurationProbe, DurationResolver},
        pipeline::{Pipeline, PipelineBuilder, PlaybackRequest},
        player::GuildPlayer,
        voice::{Completion, StreamEnd, VoiceConnection},
    },
    error::{PlayerError, PlayerResult},
};

#[derive(Default)]
struct FakeState {
    connected: bool,
    channel: Option<ChannelId>,
    current: Option<oneshot::Sender<StreamEnd>>,
    paused: bool,
    launched: Vec<PlaybackRequest>,
    overlaps: usize,
    stops: usize,
    refuse_next: bool,
}

/// Registra cada pipeline que se le pide reproducir. Los streams solo terminan
/// cuando el test lo indica; un `play` con otro stream conectado cuenta como solapamiento.
#[derive(Default)]
pub struct FakeVoice {
    state: Mutex<FakeState>,
}

impl FakeVoice {
    pub fn connected() -> Arc<Self> {
        let voice = Self::default();
        voice.state.lock().connected = true;
        voice.state.lock().channel = Some(ChannelId::new(1));
        Arc::new(voice)
    }

    pub fn launched(&self) -> Vec<PlaybackRequest> {
        self.state.lock().launched.clone()
    }

    pub fn overlaps(&self) -> usize {
        self.state.lock().overlaps
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    /// Streams conectados ahora (0 o 1 si el player se comporta).
    pub fn live(&self) -> usize {
        usize::from(self.state.lock().current.is_some())
    }

    pub fn is_paused_now(&self) -> bool {
        self.state.lock().paused
    }

    pub fn is_connected_now(&self) -> bool {
        self.state.lock().connected
    }

    pub fn refuse_next_play(&self) {
        self.state.lock().refuse_next = true;
    }

    pub fn finish_current(&self) -> bool {
        self.end_current(StreamEnd::Finished)
    }

    pub fn fail_current(&self, reason: &str) -> bool {
        self.end_current(StreamEnd::Errored(reason.to_string()))
    }

    fn end_current(&self, end: StreamEnd) -> bool {
        let mut state = self.state.lock();
        state.paused = false;
        match state.current.take() {
            Some(tx) => {
                let _ = tx.send(end);
                true
            }
            None => false,
        }
    }

    pub async fn wait_for_launches(&self, count: usize) {
        for _ in 0..10_000 {
            if self.state.lock().launched.len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} launches, saw {}", self.launched().len());
    }
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    async fn play(&self, pipeline: &Pipeline) -> PlayerResult<Completion> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.refuse_next) {
            return Err(PlayerError::PipelineFailure("spawn refused".into()));
        }
        if state.current.is_some() {
            state.overlaps += 1;
        }

        let (tx, rx) = oneshot::channel();
        state.current = Some(tx);
        state.paused = false;
        state.launched.push(pipeline.request.clone());
        Ok(rx)
    }

    async fn stop(&self) {
        let mut state = self.state.lock();
        state.stops += 1;
        state.current = None;
        state.paused = false;
    }

    async fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.current.is_some() && !state.paused {
            state.paused = true;
            true
        } else {
            false
        }
    }

    async fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.current.is_some() && state.paused {
            state.paused = false;
            true
        } else {
            false
        }
    }

    async fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && !state.paused
    }

    async fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && state.paused
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn current_channel(&self) -> Option<ChannelId> {
        self.state.lock().channel
    }

    async fn move_to(&self, channel: ChannelId) -> Result<()> {
        self.state.lock().channel = Some(channel);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.channel = None;
        state.current = None;
        Ok(())
    }
}

/// Duraciones por nombre de archivo; si falta o es cero falla como un archivo roto
pub struct FixedProbe(pub HashMap<String, f64>);

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn probe(&self, path: &Path) -> PlayerResult<f64> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.0.get(&name) {
            Some(seconds) if *seconds > 0.0 => Ok(*seconds),
            _ => Err(PlayerError::ProbeFailure(format!("no duration for {name}"))),
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub player: Arc<GuildPlayer>,
    pub voice: Arc<FakeVoice>,
    pub pipelines: Arc<PipelineBuilder>,
}

impl Fixture {
    pub fn track(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn connected(self) -> Self {
        self.player.attach_voice(self.voice.clone());
        self
    }
}

/// Player sobre un directorio temporal con un archivo por cada `(name, duration)`
pub fn fixture(tracks: &[(&str, f64)]) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut durations = HashMap::new();
    for (name, seconds) in tracks {
        std::fs::write(dir.path().join(name), b"ID3").expect("write track");
        durations.insert(name.to_string(), *seconds);
    }

    let pipelines = pipelines_with(FixedProbe(durations));
    Fixture {
        dir,
        player: Arc::new(GuildPlayer::new(GuildId::new(1), pipelines.clone())),
        voice: FakeVoice::connected(),
        pipelines,
    }
}

pub fn pipelines_with(probe: impl DurationProbe + 'static) -> Arc<PipelineBuilder> {
    let resolver = Arc::new(DurationResolver::new(Arc::new(probe), 64));
    Arc::new(PipelineBuilder::new("ffmpeg", resolver))
}
