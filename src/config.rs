use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Paths
    pub music_dir: PathBuf,
    pub data_dir: PathBuf,

    // Herramientas externas
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub ytdlp_path: PathBuf,

    // Audio
    pub duration_cache_size: usize,
    pub probe_timeout_secs: u64,
    pub default_ambient_mix_volume: f32,

    // Límites
    pub upload_limit_mb: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.music_dir)
            .with_context(|| format!("No se pudo crear {}", config.music_dir.display()))?;
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("No se pudo crear {}", config.data_dir.display()))?;

        Ok(config)
    }

    /// Construye la configuración desde cualquier fuente clave/valor; las claves ausentes toman el valor por defecto.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .trim()
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            // Paths
            music_dir: var("MUSIC_DIR").map(PathBuf::from).unwrap_or(defaults.music_dir),
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),

            // Herramientas
            ffmpeg_path: var("FFMPEG_PATH").map(PathBuf::from).unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: var("FFPROBE_PATH").map(PathBuf::from).unwrap_or(defaults.ffprobe_path),
            ytdlp_path: var("YTDLP_PATH").map(PathBuf::from).unwrap_or(defaults.ytdlp_path),

            // Audio
            duration_cache_size: parse_or(var("DURATION_CACHE_SIZE"), "DURATION_CACHE_SIZE", defaults.duration_cache_size)?,
            probe_timeout_secs: parse_or(var("PROBE_TIMEOUT_SECS"), "PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs)?,
            default_ambient_mix_volume: parse_or(
                var("DEFAULT_AMBIENT_MIX_VOLUME"),
                "DEFAULT_AMBIENT_MIX_VOLUME",
                defaults.default_ambient_mix_volume,
            )?,

            // Límites
            upload_limit_mb: parse_or(var("UPLOAD_LIMIT_MB"), "UPLOAD_LIMIT_MB", defaults.upload_limit_mb)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Duration cache must hold at least one entry
    /// - Probe timeout and upload limit must be greater than 0
    /// - Ambient mix volume must be between 0.0 and 2.0
    pub fn validate(&self) -> Result<()> {
        if self.duration_cache_size == 0 {
            anyhow::bail!("Duration cache size must be greater than 0");
        }

        if self.probe_timeout_secs == 0 {
            anyhow::bail!("Probe timeout must be greater than 0");
        }

        if self.upload_limit_mb == 0 {
            anyhow::bail!("Upload limit must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.default_ambient_mix_volume) {
            anyhow::bail!(
                "Ambient mix volume must be between 0.0 and 2.0, got: {}",
                self.default_ambient_mix_volume
            );
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn upload_limit_bytes(&self) -> u64 {
        self.upload_limit_mb * 1024 * 1024
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Paths: music={}, data={}\n  \
            Tools: ffmpeg={}, ffprobe={}, yt-dlp={}\n  \
            Audio: {} cached durations, {}s probe timeout, {:.2} ambient mix vol\n  \
            Limits: {} MB upload",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.music_dir.display(),
            self.data_dir.display(),
            self.ffmpeg_path.display(),
            self.ffprobe_path.display(),
            self.ytdlp_path.display(),
            self.duration_cache_size,
            self.probe_timeout_secs,
            self.default_ambient_mix_volume,
            self.upload_limit_mb,
        )
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: `{}`", key, raw)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Path defaults
            music_dir: "music".into(),
            data_dir: "data".into(),

            // Tools from PATH
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            ytdlp_path: "yt-dlp".into(),

            // Audio defaults
            duration_cache_size: 64,
            probe_timeout_secs: 5,
            default_ambient_mix_volume: 0.5,

            // Limit defaults
            upload_limit_mb: 8, // límite de archivos de Discord sin nitro
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "secret"),
            ("APPLICATION_ID", "123"),
        ]))
        .unwrap();

        assert_eq!(config.application_id, 123);
        assert_eq!(config.guild_id, None);
        assert_eq!(config.music_dir, PathBuf::from("music"));
        assert_eq!(config.duration_cache_size, 64);
        assert_eq!(config.upload_limit_bytes(), 8 * 1024 * 1024);
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "secret"),
            ("APPLICATION_ID", "123"),
            ("GUILD_ID", "456"),
            ("MUSIC_DIR", "/srv/music"),
            ("DURATION_CACHE_SIZE", "128"),
            ("DEFAULT_AMBIENT_MIX_VOLUME", "0.25"),
        ]))
        .unwrap();

        assert_eq!(config.guild_id, Some(456));
        assert_eq!(config.music_dir, PathBuf::from("/srv/music"));
        assert_eq!(config.duration_cache_size, 128);
        assert_eq!(config.default_ambient_mix_volume, 0.25);
    }

    #[test]
    fn test_missing_token_fails() {
        assert!(Config::from_lookup(lookup(&[("APPLICATION_ID", "1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("APPLICATION_ID", "abc")
        ]))
        .is_err());
    }

    #[test]
    fn test_validation() {
        let base = [("DISCORD_TOKEN", "t"), ("APPLICATION_ID", "1")];
        for (key, value) in [
            ("DURATION_CACHE_SIZE", "0"),
            ("PROBE_TIMEOUT_SECS", "0"),
            ("UPLOAD_LIMIT_MB", "0"),
            ("DEFAULT_AMBIENT_MIX_VOLUME", "3.5"),
        ] {
            let mut pairs = base.to_vec();
            pairs.push((key, value));
            assert!(Config::from_lookup(lookup(&pairs)).is_err(), "{key}={value}");
        }
    }

    #[test]
    fn test_summary_hides_token() {
        let mut config = Config::default();
        config.discord_token = "super-secret".into();
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("64 cached durations"));
    }
}
