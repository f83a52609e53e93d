use std::fmt;

use rand::Rng;
use time::OffsetDateTime;

pub mod persistence;
pub mod version;

const TRACKING_PREFIX: &str = "PRO";

/// Human-shareable parcel code: `PRO<millis><3 digits>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrackingCode(String);

impl TrackingCode {
    pub fn generate(now: OffsetDateTime) -> Self {
        Self::generate_with(now, &mut rand::rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(now: OffsetDateTime, rng: &mut R) -> Self {
        let millis = now.unix_timestamp_nanos() / 1_000_000;
        let suffix: u16 = rng.random_range(0..1000);
        Self(format!("{TRACKING_PREFIX}{millis}{suffix:03}"))
    }

    /// Accepts any `PRO` code followed only by digits (at least the three
    /// random ones).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix(TRACKING_PREFIX)?;
        if digits.len() > 3 && digits.chars().all(|c| c.is_ascii_digit()) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable age, e.g. `42s`, `5m`, `3h`, `2d`.
pub fn age_string(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}
