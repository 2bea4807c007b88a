use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
};
use tracing::debug;

use crate::audio::duration::DurationResolver;

/// Formato que espera el driver de voz: WAV estéreo a 48kHz por stdout
const SAMPLE_RATE: &str = "48000";
const CHANNELS: &str = "2";

/// "Reproducir `path` desde `seek_seconds` con estos fades y este volumen"
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub path: PathBuf,
    pub seek_seconds: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    pub volume: f32,
    /// Límite opcional de segundos decodificados (`-t`)
    pub limit: Option<f64>,
}

impl PlaybackRequest {
    pub fn new(path: impl Into<PathBuf>, volume: f32) -> Self {
        Self {
            path: path.into(),
            seek_seconds: 0.0,
            fade_in: 0.0,
            fade_out: 0.0,
            volume,
            limit: None,
        }
    }

    pub fn seek(mut self, seconds: f64) -> Self {
        self.seek_seconds = seconds;
        self
    }

    pub fn fades(mut self, fade_in: f64, fade_out: f64) -> Self {
        self.fade_in = fade_in;
        self.fade_out = fade_out;
        self
    }

    pub fn limit(mut self, seconds: f64) -> Self {
        self.limit = Some(seconds);
        self
    }
}

/// Invocación de ffmpeg ya resuelta para una reproducción
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// La petición tras ajustar el seek, tal como se lanza
    pub request: PlaybackRequest,
    pub filter: String,
}

impl Pipeline {
    /// Construye la invocación con la duración del track (0.0 = desconocida).
    pub fn new(program: &Path, mut request: PlaybackRequest, duration: f64) -> Self {
        let requested = request.seek_seconds;
        request.seek_seconds = effective_seek(requested, duration);
        if request.seek_seconds != requested {
            debug!(
                "Seek {:.3}s fuera de la duración {:.3}s, reinicio en 0",
                requested, duration
            );
        }

        let mut remaining = (duration - request.seek_seconds).max(0.0);
        if let Some(limit) = request.limit {
            // con -t el audio termina en `limit`, el fade-out se cuenta desde ahí
            remaining = if duration > 0.0 { remaining.min(limit) } else { limit };
        }
        let filter = filter_chain(request.volume, request.fade_in, request.fade_out, remaining);

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-nostdin".into(),
            // seek por entrada: -ss antes de -i
            "-ss".into(),
            secs(request.seek_seconds),
            "-i".into(),
            request.path.to_string_lossy().into_owned(),
        ];

        if let Some(limit) = request.limit {
            args.push("-t".into());
            args.push(secs(limit));
        }

        args.extend(
            [
                "-filter:a",
                filter.as_str(),
                "-vn",
                "-ac",
                CHANNELS,
                "-ar",
                SAMPLE_RATE,
                "-acodec",
                "pcm_s16le",
                "-f",
                "wav",
                "pipe:1",
            ]
            .map(String::from),
        );

        Self {
            program: program.to_path_buf(),
            args,
            request,
            filter,
        }
    }

    /// Proceso a lanzar; el audio se lee de su stdout.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}

/// Un seek en o más allá del final (o con duración desconocida) vuelve a 0
pub fn effective_seek(seek_seconds: f64, duration: f64) -> f64 {
    if !seek_seconds.is_finite() || seek_seconds < 0.0 || seek_seconds >= duration {
        0.0
    } else {
        seek_seconds
    }
}

/// `volume=<v>[,afade=t=in...][,afade=t=out...]`.
///
/// `remaining` es el audio que queda tras el seek; el fade-out se coloca para
/// terminar justo ahí.
pub fn filter_chain(volume: f32, fade_in: f64, fade_out: f64, remaining: f64) -> String {
    let mut filters = vec![format!("volume={:.3}", volume)];

    if fade_in > 0.0 {
        filters.push(format!("afade=t=in:st=0:d={}", secs(fade_in)));
    }

    if fade_out > 0.0 {
        let start = (remaining - fade_out).max(0.0);
        filters.push(format!("afade=t=out:st={}:d={}", secs(start), secs(fade_out)));
    }

    filters.join(",")
}

fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// Resuelve duraciones y convierte peticiones en [`Pipeline`]s
pub struct PipelineBuilder {
    ffmpeg: PathBuf,
    durations: Arc<DurationResolver>,
}

impl PipelineBuilder {
    pub fn new(ffmpeg: impl Into<PathBuf>, durations: Arc<DurationResolver>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            durations,
        }
    }

    pub async fn build(&self, request: PlaybackRequest) -> Pipeline {
        let duration = self.durations.duration(&request.path).await;
        Pipeline::new(&self.ffmpeg, request, duration)
    }

    pub fn durations(&self) -> &Arc<DurationResolver> {
        &self.durations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_filter_chain_volume_only() {
        assert_eq!(filter_chain(1.0, 0.0, 0.0, 120.0), "volume=1.000");
    }

    #[test]
    fn test_filter_chain_with_fades() {
        assert_eq!(
            filter_chain(0.5, 3.0, 5.0, 100.0),
            "volume=0.500,afade=t=in:st=0:d=3.000,afade=t=out:st=95.000:d=5.000"
        );
    }

    #[test]
    fn test_fade_out_start_never_negative() {
        assert_eq!(
            filter_chain(1.0, 0.0, 10.0, 4.0),
            "volume=1.000,afade=t=out:st=0.000:d=10.000"
        );
    }

    #[test]
    fn test_effective_seek() {
        assert_eq!(effective_seek(30.0, 120.0), 30.0);
        assert_eq!(effective_seek(120.0, 120.0), 0.0);
        assert_eq!(effective_seek(500.0, 120.0), 0.0);
        assert_eq!(effective_seek(-1.0, 120.0), 0.0);
        // duración desconocida
        assert_eq!(effective_seek(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_pipeline_seeks_before_input() {
        let request = PlaybackRequest::new("music/music/1/a.mp3", 1.0)
            .seek(60.0)
            .fades(0.0, 5.0);
        let pipeline = Pipeline::new(Path::new("ffmpeg"), request, 100.0);

        let ss = pipeline.args.iter().position(|a| a == "-ss").unwrap();
        let input = pipeline.args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(pipeline.args[ss + 1], "60.000");
        assert_eq!(pipeline.args[input + 1], "music/music/1/a.mp3");
        // quedan 40s, el fade-out empieza en 35s relativo al seek
        assert_eq!(pipeline.filter, "volume=1.000,afade=t=out:st=35.000:d=5.000");
        assert_eq!(pipeline.args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn test_pipeline_resets_out_of_range_seek() {
        let request = PlaybackRequest::new("a.mp3", 1.0).seek(250.0);
        let pipeline = Pipeline::new(Path::new("ffmpeg"), request, 200.0);
        assert_eq!(pipeline.request.seek_seconds, 0.0);
    }

    #[test]
    fn test_pipeline_duration_cap() {
        let request = PlaybackRequest::new("a.mp3", 1.0).limit(30.0);
        let pipeline = Pipeline::new(Path::new("ffmpeg"), request, 200.0);
        let t = pipeline.args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(pipeline.args[t + 1], "30.000");
    }

    #[test]
    fn test_limited_fade_out_starts_immediately() {
        let request = PlaybackRequest::new("a.mp3", 1.0)
            .seek(90.0)
            .fades(0.0, 4.0)
            .limit(4.0);
        let pipeline = Pipeline::new(Path::new("ffmpeg"), request.clone(), 100.0);
        assert_eq!(pipeline.filter, "volume=1.000,afade=t=out:st=0.000:d=4.000");

        // duración desconocida: la ventana manda
        let pipeline = Pipeline::new(Path::new("ffmpeg"), request.seek(0.0), 0.0);
        assert_eq!(pipeline.filter, "volume=1.000,afade=t=out:st=0.000:d=4.000");
    }
}
