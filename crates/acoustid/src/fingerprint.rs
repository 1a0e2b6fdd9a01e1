// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

/// Audio fingerprint (Chromaprint) and the duration of the audio it came from.
///
/// The fingerprint string is opaque: it is produced by libchromaprint or
/// `fpcalc` and only ever transmitted as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fingerprint {
    /// Compressed, base64-encoded Chromaprint fingerprint.
    pub fingerprint: String,
    /// Duration of the whole audio file in seconds.
    pub duration: f64,
}

impl Fingerprint {
    /// Create a new fingerprint.
    pub fn new(fingerprint: impl Into<String>, duration: f64) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            duration,
        }
    }

    /// Duration truncated to whole seconds, as the web service expects it.
    pub fn duration_secs(&self) -> u64 {
        whole_seconds(self.duration)
    }
}

/// Truncate a duration to whole seconds; negative or non-finite values become 0.
pub(crate) fn whole_seconds(duration: f64) -> u64 {
    if duration.is_finite() && duration > 0.0 {
        duration.trunc() as u64
    } else {
        0
    }
}
