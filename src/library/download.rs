use std::{
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::mpsc,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::LibraryError;

/// Qué descargar y qué fragmento conservar
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub start: u64,
    pub end: Option<u64>,
    pub size_limit: u64,
}

impl DownloadRequest {
    /// Segundos a conservar desde `start`, si `end` es posterior.
    pub fn clip_length(&self) -> Option<u64> {
        self.end.filter(|end| *end > self.start).map(|end| end - self.start)
    }
}

/// Descarga audio de una URL con `yt-dlp` y lo convierte a mp3 con ffmpeg
pub struct UrlDownloader {
    ytdlp: PathBuf,
    ffmpeg: PathBuf,
}

impl UrlDownloader {
    pub fn new(ytdlp: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Solo acepta URLs http(s) absolutas.
    pub fn validate_url(url: &str) -> Result<Url, LibraryError> {
        let parsed = Url::parse(url.trim()).map_err(|e| LibraryError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
            other => Err(LibraryError::InvalidUrl(format!("unsupported scheme `{}`", other))),
        }
    }

    /// URL directa del mejor stream de audio.
    async fn resolve_stream(&self, url: &Url) -> Result<String, LibraryError> {
        let output = Command::new(&self.ytdlp)
            .args([
                "-f",
                "bestaudio/best",
                "-g",
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "--socket-timeout",
                "15",
            ])
            .arg(url.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LibraryError::DownloadFailed(format!("yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp falló: {}", stderr.trim());
            return Err(LibraryError::DownloadFailed(stderr.trim().to_string()));
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| LibraryError::DownloadFailed("yt-dlp returned no stream".into()))
    }

    /// Descarga en `target`; solo lo reemplaza si ffmpeg termina bien.
    ///
    /// Los segundos ya convertidos se envían por `progress` a medida que ffmpeg los reporta.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        target: &Path,
        progress: Option<mpsc::UnboundedSender<u64>>,
    ) -> Result<PathBuf, LibraryError> {
        let url = Self::validate_url(&request.url)?;
        let stream = self.resolve_stream(&url).await?;
        debug!("Stream resuelto para {}", url);

        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;
        let staging = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".mp3")
            .tempfile_in(dir)?;

        let args = transcode_args(&stream, request, staging.path());
        info!("📥 Descargando {} → {}", url, target.display());

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LibraryError::DownloadFailed(format!("ffmpeg: {}", e)))?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let (Some(tx), Some(seconds)) = (progress.as_ref(), parse_progress(&line)) {
                    let _ = tx.send(seconds);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            error!("❌ ffmpeg terminó con {} para {}", status, url);
            return Err(LibraryError::DownloadFailed(format!("ffmpeg exited with {}", status)));
        }

        staging.persist(target).map_err(|e| LibraryError::Io(e.error))?;
        info!("✅ Descarga completa: {}", target.display());
        Ok(target.to_path_buf())
    }
}

/// Argumentos de ffmpeg para la conversión
pub fn transcode_args(stream_url: &str, request: &DownloadRequest, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

    if request.start > 0 {
        args.push("-ss".into());
        args.push(request.start.to_string());
    }

    args.push("-i".into());
    args.push(stream_url.to_string());

    if let Some(length) = request.clip_length() {
        args.push("-t".into());
        args.push(length.to_string());
    }

    args.extend(
        [
            "-fs".to_string(),
            request.size_limit.to_string(),
            "-vn".into(),
            "-acodec".into(),
            "libmp3lame".into(),
            "-ab".into(),
            "64k".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
            output.to_string_lossy().into_owned(),
        ],
    );
    args
}

/// Líneas `out_time_ms=<micros>` de `-progress`, en segundos enteros
fn parse_progress(line: &str) -> Option<u64> {
    line.trim()
        .strip_prefix("out_time_ms=")?
        .parse::<u64>()
        .ok()
        .map(|micros| micros / 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(start: u64, end: Option<u64>) -> DownloadRequest {
        DownloadRequest {
            url: "https://example.com/watch?v=1".into(),
            start,
            end,
            size_limit: 8 * 1024 * 1024,
        }
    }

    #[test]
    fn test_validate_url() {
        assert!(UrlDownloader::validate_url("https://youtu.be/abc").is_ok());
        assert!(UrlDownloader::validate_url("ftp://host/file").is_err());
        assert!(UrlDownloader::validate_url("not a url").is_err());
        assert!(UrlDownloader::validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_clip_length() {
        assert_eq!(request(30, Some(90)).clip_length(), Some(60));
        assert_eq!(request(30, Some(10)).clip_length(), None);
        assert_eq!(request(0, None).clip_length(), None);
    }

    #[test]
    fn test_transcode_args_full_range() {
        let args = transcode_args("https://cdn/stream", &request(0, None), Path::new("out.mp3"));
        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-t".to_string()));
        let fs = args.iter().position(|a| a == "-fs").unwrap();
        assert_eq!(args[fs + 1], "8388608");
        assert_eq!(args.last().unwrap(), "out.mp3");
    }

    #[test]
    fn test_transcode_args_clip() {
        let args = transcode_args("https://cdn/stream", &request(90, Some(180)), Path::new("o.mp3"));
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert!(ss < input && input < t);
        assert_eq!(args[ss + 1], "90");
        assert_eq!(args[t + 1], "90");
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("out_time_ms=5500000"), Some(5));
        assert_eq!(parse_progress("out_time_ms=N/A"), None);
        assert_eq!(parse_progress("progress=continue"), None);
    }
}
