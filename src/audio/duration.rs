use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, warn};

use crate::{
    cache::{lru_cache::CacheMetrics, DurationCache},
    error::{PlayerError, PlayerResult},
};

/// Consulta a una herramienta externa la duración de un archivo
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> PlayerResult<f64>;
}

/// `ffprobe -show_entries format=duration` con timeout
pub struct FfprobeProbe {
    program: PathBuf,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> PlayerResult<f64> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| PlayerError::ProbeFailure(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| PlayerError::ProbeFailure(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlayerError::ProbeFailure(stderr.trim().to_string()));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_probe_output(stdout: &str) -> PlayerResult<f64> {
    let text = stdout.trim();
    text.parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| PlayerError::ProbeFailure(format!("unparseable duration `{}`", text)))
}

/// Memoización delante de un [`DurationProbe`].
///
/// Devuelve `0.0` si la consulta falla; quien llama lo trata como "desconocida"
/// y omite la lógica que depende de la duración. Los fallos no se guardan, así
/// que un archivo que aparece después se vuelve a consultar.
pub struct DurationResolver {
    probe: Arc<dyn DurationProbe>,
    cache: DurationCache,
}

impl DurationResolver {
    pub fn new(probe: Arc<dyn DurationProbe>, capacity: usize) -> Self {
        Self {
            probe,
            cache: DurationCache::new(capacity),
        }
    }

    pub async fn duration(&self, path: &Path) -> f64 {
        if let Some(seconds) = self.cache.get(&path.to_path_buf()) {
            return seconds;
        }

        match self.probe.probe(path).await {
            Ok(seconds) => {
                debug!("⏱️ Duración de {}: {:.2}s", path.display(), seconds);
                self.cache.insert(path.to_path_buf(), seconds);
                seconds
            }
            Err(e) => {
                warn!("No se pudo obtener la duración de {}: {}", path.display(), e);
                0.0
            }
        }
    }

    /// Olvida el valor guardado cuando el archivo se reemplaza, mueve o borra
    pub fn invalidate(&self, path: &Path) {
        if self.cache.remove(&path.to_path_buf()).is_some() {
            debug!("Duración invalidada para {}", path.display());
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_probe_output() {
        assert_eq!(parse_probe_output("183.456000\n").unwrap(), 183.456);
        assert!(parse_probe_output("N/A").is_err());
        assert!(parse_probe_output("").is_err());
    }

    #[tokio::test]
    async fn test_memoizes_by_path() {
        let mut probe = MockDurationProbe::new();
        probe.expect_probe().times(1).returning(|_| Ok(42.0));

        let resolver = DurationResolver::new(Arc::new(probe), 64);
        let path = Path::new("music/music/1/a.mp3");

        assert_eq!(resolver.duration(path).await, 42.0);
        assert_eq!(resolver.duration(path).await, 42.0);
        assert_eq!(resolver.metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_failure_is_zero_and_not_cached() {
        let mut probe = MockDurationProbe::new();
        probe
            .expect_probe()
            .times(2)
            .returning(|_| Err(PlayerError::ProbeFailure("boom".into())));

        let resolver = DurationResolver::new(Arc::new(probe), 64);
        let path = Path::new("missing.mp3");

        assert_eq!(resolver.duration(path).await, 0.0);
        assert_eq!(resolver.duration(path).await, 0.0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reprobe() {
        let mut probe = MockDurationProbe::new();
        let mut seq = mockall::Sequence::new();
        probe
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(10.0));
        probe
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(20.0));

        let resolver = DurationResolver::new(Arc::new(probe), 64);
        let path = Path::new("track.mp3");

        assert_eq!(resolver.duration(path).await, 10.0);
        resolver.invalidate(path);
        assert_eq!(resolver.duration(path).await, 20.0);
    }
}
