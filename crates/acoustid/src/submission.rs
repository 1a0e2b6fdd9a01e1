// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

use crate::fingerprint::whole_seconds;
use crate::{AcoustidError, Fingerprint, Result};

/// A fingerprint plus whatever metadata is known about the audio, for
/// submission to AcoustID.
///
/// `fingerprint` and `duration` are required; submitting a record without
/// them fails before anything is sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubmissionRecord {
    pub fingerprint: Option<String>,
    /// Duration in seconds; truncated to whole seconds when sent.
    pub duration: Option<f64>,
    /// MusicBrainz recording ID.
    pub mbid: Option<String>,
    pub puid: Option<String>,
    /// Identifier in a foreign catalog, as `namespace:id`.
    pub foreignid: Option<String>,
    pub track: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub albumartist: Option<String>,
    pub year: Option<u32>,
    pub trackno: Option<u32>,
    pub discno: Option<u32>,
    pub fileformat: Option<String>,
    /// Bitrate in kbps.
    pub bitrate: Option<u32>,
}

impl SubmissionRecord {
    /// A record carrying the fingerprint and duration of `fingerprint`.
    pub fn from_fingerprint(fingerprint: &Fingerprint) -> Self {
        Self {
            fingerprint: Some(fingerprint.fingerprint.clone()),
            duration: Some(fingerprint.duration),
            ..Default::default()
        }
    }

    pub fn mbid(mut self, mbid: impl Into<String>) -> Self {
        self.mbid = Some(mbid.into());
        self
    }

    pub fn track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Check that the required fields are present.
    pub fn validate(&self) -> Result<()> {
        if self.fingerprint.as_deref().map_or(true, str::is_empty) {
            return Err(AcoustidError::FingerprintSubmission(
                "missing required parameter: fingerprint".to_string(),
            ));
        }
        if self.duration.is_none() {
            return Err(AcoustidError::FingerprintSubmission(
                "missing required parameter: duration".to_string(),
            ));
        }
        Ok(())
    }

    /// Form fields for this record with the `.{index}` suffix AcoustID uses
    /// to tell records in one request apart.
    pub fn indexed_fields(&self, index: usize) -> Vec<(String, String)> {
        let duration = self.duration.map(|d| whole_seconds(d).to_string());

        let fields: [(&str, Option<String>); 14] = [
            ("fingerprint", self.fingerprint.clone()),
            ("duration", duration),
            ("mbid", self.mbid.clone()),
            ("puid", self.puid.clone()),
            ("foreignid", self.foreignid.clone()),
            ("track", self.track.clone()),
            ("artist", self.artist.clone()),
            ("album", self.album.clone()),
            ("albumartist", self.albumartist.clone()),
            ("year", self.year.map(|v| v.to_string())),
            ("trackno", self.trackno.map(|v| v.to_string())),
            ("discno", self.discno.map(|v| v.to_string())),
            ("fileformat", self.fileformat.clone()),
            ("bitrate", self.bitrate.map(|v| v.to_string())),
        ];

        fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (format!("{}.{}", name, index), v)))
            .collect()
    }
}
