use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

static RESOLUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*[xX]\s*(\d+)\s*$").expect("resolution pattern"));

/// Frame dimensions parsed from a `"<width>x<height>"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("resolution {0:?} is not of the form <width>x<height>")]
    Malformed(String),

    #[error("resolution {0:?} has a zero or out-of-range dimension")]
    OutOfRange(String),

    #[error("resolution {0} needs more than the {1}-byte image allocation limit")]
    TooLarge(Resolution, u64),
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FromStr for Resolution {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RESOLUTION_RE
            .captures(s)
            .ok_or_else(|| ResolutionError::Malformed(s.to_string()))?;

        let width = caps[1].parse::<u32>().ok().filter(|w| *w > 0);
        let height = caps[2].parse::<u32>().ok().filter(|h| *h > 0);
        match (width, height) {
            (Some(width), Some(height)) => Ok(Self { width, height }),
            _ => Err(ResolutionError::OutOfRange(s.to_string())),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
