use async_process::{Command, Stdio};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, error, info};

use crate::{audio::duration::DurationResolver, error::MixError};

/// Buffer (en muestras) del `aloop` infinito de la entrada más corta
const LOOP_BUFFER: &str = "2e+07";

/// Una entrada de la mezcla
#[derive(Debug, Clone, PartialEq)]
pub struct MixInput {
    pub path: PathBuf,
    pub volume: f32,
}

impl MixInput {
    pub fn new(path: impl Into<PathBuf>, volume: f32) -> Self {
        Self {
            path: path.into(),
            volume,
        }
    }
}

/// Qué entrada marca la duración de la salida y cuál se repite debajo
#[derive(Debug, Clone, PartialEq)]
pub struct MixPlan {
    pub primary: MixInput,
    pub looped: MixInput,
}

impl MixPlan {
    /// La entrada más larga es la principal; en empate, la primera.
    pub fn new(a: MixInput, a_duration: f64, b: MixInput, b_duration: f64) -> Self {
        if a_duration >= b_duration {
            Self {
                primary: a,
                looped: b,
            }
        } else {
            Self {
                primary: b,
                looped: a,
            }
        }
    }

    pub fn filter_complex(&self) -> String {
        format!(
            "[0:a]volume={:.3}[a0];[1:a]volume={:.3},aloop=loop=-1:size={}[a1];[a0][a1]amix=inputs=2:duration=first",
            self.primary.volume, self.looped.volume, LOOP_BUFFER
        )
    }

    pub fn args(&self, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            self.primary.path.to_string_lossy().into_owned(),
            "-i".into(),
            self.looped.path.to_string_lossy().into_owned(),
            "-filter_complex".into(),
            self.filter_complex(),
            "-c:a".into(),
            "libmp3lame".into(),
            "-threads".into(),
            "2".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

/// Mezclador offline de dos tracks
pub struct Mixer {
    ffmpeg: PathBuf,
    durations: Arc<DurationResolver>,
}

impl Mixer {
    pub fn new(ffmpeg: impl Into<PathBuf>, durations: Arc<DurationResolver>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            durations,
        }
    }

    pub async fn plan(&self, a: MixInput, b: MixInput) -> MixPlan {
        let a_duration = self.durations.duration(&a.path).await;
        let b_duration = self.durations.duration(&b.path).await;
        debug!("Duraciones para mezcla: {:.2}s / {:.2}s", a_duration, b_duration);
        MixPlan::new(a, a_duration, b, b_duration)
    }

    /// Mezcla `a` y `b` en `output`.
    ///
    /// ffmpeg escribe en un archivo temporal junto a `output`, que solo lo
    /// reemplaza si el proceso termina bien.
    pub async fn mix(&self, a: MixInput, b: MixInput, output: &Path) -> Result<PathBuf, MixError> {
        let plan = self.plan(a, b).await;

        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;
        let staging = tempfile::Builder::new()
            .prefix(".mix-")
            .suffix(".mp3")
            .tempfile_in(dir)?;

        let args = plan.args(staging.path());
        info!("🎚️ Mezclando: {} {}", self.ffmpeg.display(), args.join(" "));

        let result = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(MixError::Spawn)?;

        if !result.status.success() {
            let diagnostics = String::from_utf8_lossy(&result.stderr).trim().to_string();
            error!("❌ Error de mezcla ({}): {}", result.status, diagnostics);
            // `staging` se borra al salir del scope
            return Err(MixError::MixFailed {
                status: result.status.to_string(),
                diagnostics,
            });
        }

        staging
            .persist(output)
            .map_err(|e| MixError::Io(e.error))?;
        self.durations.invalidate(output);

        info!("✅ Mezcla guardada en {}", output.display());
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{duration::MockDurationProbe, testing::FixedProbe};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn input(name: &str, volume: f32) -> MixInput {
        MixInput::new(name, volume)
    }

    #[test]
    fn test_longer_track_is_primary() {
        let plan = MixPlan::new(input("music.mp3", 1.0), 60.0, input("rain.mp3", 0.5), 300.0);
        assert_eq!(plan.primary, input("rain.mp3", 0.5));
        assert_eq!(plan.looped, input("music.mp3", 1.0));
    }

    #[test]
    fn test_mix_plan_is_symmetric() {
        let ab = MixPlan::new(input("a.mp3", 1.0), 200.0, input("b.mp3", 0.4), 90.0);
        let ba = MixPlan::new(input("b.mp3", 0.4), 90.0, input("a.mp3", 1.0), 200.0);
        assert_eq!(ab, ba);
        assert_eq!(ab.filter_complex(), ba.filter_complex());
    }

    #[test]
    fn test_filter_complex_loops_secondary() {
        let plan = MixPlan::new(input("a.mp3", 1.0), 100.0, input("b.mp3", 0.5), 10.0);
        assert_eq!(
            plan.filter_complex(),
            "[0:a]volume=1.000[a0];[1:a]volume=0.500,aloop=loop=-1:size=2e+07[a1];[a0][a1]amix=inputs=2:duration=first"
        );
    }

    #[test]
    fn test_args_put_primary_first() {
        let plan = MixPlan::new(input("short.mp3", 1.0), 10.0, input("long.mp3", 0.5), 100.0);
        let args = plan.args(Path::new("out.mp3"));
        let inputs: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && args[i - 1] == "-i")
            .map(|(_, a)| a)
            .collect();
        assert_eq!(inputs, vec!["long.mp3", "short.mp3"]);
        assert_eq!(args.last().unwrap(), "out.mp3");
        assert!(args.contains(&"libmp3lame".to_string()));
    }

    #[tokio::test]
    async fn test_plan_uses_probed_durations() {
        let probe = FixedProbe(HashMap::from([
            ("a.mp3".to_string(), 30.0),
            ("b.mp3".to_string(), 45.0),
        ]));
        let resolver = Arc::new(DurationResolver::new(Arc::new(probe), 8));
        let mixer = Mixer::new("ffmpeg", resolver);

        let plan = mixer.plan(input("a.mp3", 1.0), input("b.mp3", 0.2)).await;
        assert_eq!(plan.primary.path, PathBuf::from("b.mp3"));
    }

    #[tokio::test]
    async fn test_failed_mix_leaves_no_output() {
        let mut probe = MockDurationProbe::new();
        probe.expect_probe().returning(|_| Ok(10.0));
        let resolver = Arc::new(DurationResolver::new(Arc::new(probe), 8));
        let mixer = Mixer::new("false", resolver);

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("mix.mp3");
        let err = mixer
            .mix(input("a.mp3", 1.0), input("b.mp3", 1.0), &output)
            .await
            .unwrap_err();

        assert!(matches!(err, MixError::MixFailed { .. } | MixError::Spawn(_)));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
