use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::PlayerError;

/// Espacio independiente de configuración de volumen, loop y fades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackCategory {
    Music,
    Ambient,
    Mixed,
}

impl TrackCategory {
    pub const ALL: [TrackCategory; 3] = [Self::Music, Self::Ambient, Self::Mixed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Ambient => "ambient",
            Self::Mixed => "mixed",
        }
    }

    /// Los tracks mezclados los produce el mezclador; no se suben
    pub fn accepts_uploads(&self) -> bool {
        !matches!(self, Self::Mixed)
    }
}

impl fmt::Display for TrackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackCategory {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "music" => Ok(Self::Music),
            "ambient" => Ok(Self::Ambient),
            "mixed" => Ok(Self::Mixed),
            other => Err(PlayerError::InvalidCategory(other.to_string())),
        }
    }
}

/// Valores por categoría, uno por cada [`TrackCategory`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerCategory<T> {
    pub music: T,
    pub ambient: T,
    pub mixed: T,
}

impl<T: Copy> PerCategory<T> {
    pub fn splat(value: T) -> Self {
        Self {
            music: value,
            ambient: value,
            mixed: value,
        }
    }
}

impl<T> PerCategory<T> {
    pub fn get(&self, category: TrackCategory) -> &T {
        match category {
            TrackCategory::Music => &self.music,
            TrackCategory::Ambient => &self.ambient,
            TrackCategory::Mixed => &self.mixed,
        }
    }

    pub fn get_mut(&mut self, category: TrackCategory) -> &mut T {
        match category {
            TrackCategory::Music => &mut self.music,
            TrackCategory::Ambient => &mut self.ambient,
            TrackCategory::Mixed => &mut self.mixed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing() {
        assert_eq!("music".parse::<TrackCategory>().unwrap(), TrackCategory::Music);
        assert_eq!(" Ambient ".parse::<TrackCategory>().unwrap(), TrackCategory::Ambient);
        assert_eq!("MIXED".parse::<TrackCategory>().unwrap(), TrackCategory::Mixed);
        assert!(matches!(
            "sfx".parse::<TrackCategory>(),
            Err(PlayerError::InvalidCategory(c)) if c == "sfx"
        ));
    }

    #[test]
    fn test_mixed_rejects_uploads() {
        assert!(TrackCategory::Music.accepts_uploads());
        assert!(TrackCategory::Ambient.accepts_uploads());
        assert!(!TrackCategory::Mixed.accepts_uploads());
    }
}
