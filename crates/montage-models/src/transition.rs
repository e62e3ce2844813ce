//! Scene transition tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a scene joins to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Hard concatenation, no overlap
    #[default]
    Cut,
    /// Fade between scenes
    Fade,
    /// Dissolve between scenes
    Dissolve,
    /// Crossfade between scenes
    Crossfade,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Cut => "cut",
            Transition::Fade => "fade",
            Transition::Dissolve => "dissolve",
            Transition::Crossfade => "crossfade",
        }
    }

    /// Blended transitions overlap the tail of one clip with the head of the
    /// next; a cut is a plain concatenation.
    pub fn is_blended(&self) -> bool {
        !matches!(self, Transition::Cut)
    }

    /// The FFmpeg `xfade` transition name for a blended tag.
    ///
    /// Returns `None` for a cut. `xfade` has no distinct crossfade mode, so
    /// crossfade maps to its plain fade.
    pub fn xfade_name(&self) -> Option<&'static str> {
        match self {
            Transition::Cut => None,
            Transition::Fade | Transition::Crossfade => Some("fade"),
            Transition::Dissolve => Some("dissolve"),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown transition string.
#[derive(Debug, Error)]
#[error("unknown transition: {0}")]
pub struct ParseTransitionError(pub String);

impl FromStr for Transition {
    type Err = ParseTransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cut" => Ok(Transition::Cut),
            "fade" => Ok(Transition::Fade),
            "dissolve" => Ok(Transition::Dissolve),
            "crossfade" => Ok(Transition::Crossfade),
            other => Err(ParseTransitionError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blended_tags() {
        assert!(!Transition::Cut.is_blended());
        assert!(Transition::Fade.is_blended());
        assert!(Transition::Dissolve.is_blended());
        assert!(Transition::Crossfade.is_blended());
    }

    #[test]
    fn test_xfade_names() {
        assert_eq!(Transition::Cut.xfade_name(), None);
        assert_eq!(Transition::Fade.xfade_name(), Some("fade"));
        assert_eq!(Transition::Dissolve.xfade_name(), Some("dissolve"));
        assert_eq!(Transition::Crossfade.xfade_name(), Some("fade"));
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Transition::Crossfade).unwrap();
        assert_eq!(json, "\"crossfade\"");
        let parsed: Transition = serde_json::from_str("\"dissolve\"").unwrap();
        assert_eq!(parsed, Transition::Dissolve);
    }
}
