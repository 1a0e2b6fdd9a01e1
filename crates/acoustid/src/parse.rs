// SPDX-License-Identifier: GPL-3.0-or-later

//! Validation and extraction of AcoustID JSON responses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AcoustidError, Result, WebServiceError};

/// One recording matched by a fingerprint lookup.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LookupMatch {
    /// Match score (0-1), higher is more confident.
    pub score: f64,
    /// MusicBrainz recording ID.
    pub recording_id: String,
    /// Title of the recording, if the service knows it.
    pub title: Option<String>,
    /// Artist names joined with `"; "`.
    pub artists: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    score: f64,
    #[serde(default)]
    recordings: Option<Vec<RecordingEntry>>,
}

#[derive(Debug, Deserialize)]
struct RecordingEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artists: Option<Vec<ArtistEntry>>,
}

#[derive(Debug, Deserialize)]
struct ArtistEntry {
    name: String,
}

impl RecordingEntry {
    fn into_match(self, score: f64) -> LookupMatch {
        let artists = self
            .artists
            .filter(|artists| !artists.is_empty())
            .map(|artists| {
                artists
                    .into_iter()
                    .map(|a| a.name)
                    .collect::<Vec<_>>()
                    .join("; ")
            });

        LookupMatch {
            score,
            recording_id: self.id,
            title: self.title,
            artists,
        }
    }
}

/// AcoustID track attached to a MusicBrainz recording.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Track IDs split by whether the service has disabled them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackList {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl FromIterator<Track> for TrackList {
    fn from_iter<I: IntoIterator<Item = Track>>(iter: I) -> Self {
        let mut list = TrackList::default();
        for track in iter {
            if track.disabled {
                list.disabled.push(track.id);
            } else {
                list.enabled.push(track.id);
            }
        }
        list
    }
}

#[derive(Debug, Deserialize)]
struct MbidEntry {
    mbid: String,
    #[serde(default)]
    tracks: Vec<Track>,
}

/// Processing state of a fingerprint submission.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SubmissionStatus {
    pub id: i64,
    pub status: String,
    /// AcoustID track the fingerprint was imported into.
    #[serde(default, deserialize_with = "deserialize_result_id", rename = "result")]
    pub track_id: Option<String>,
}

fn deserialize_result_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct SubmissionResult {
        id: String,
    }

    Ok(Option::<SubmissionResult>::deserialize(deserializer)?.map(|r| r.id))
}

/// Build a structured error from the `error` object of a response, if it
/// has both a code and a message.
pub fn service_error(data: &Value) -> Option<WebServiceError> {
    let error = data.get("error")?;
    let code = error.get("code")?.as_i64()?;
    let message = error.get("message")?.as_str()?;
    Some(WebServiceError::with_code(code, message))
}

fn status(data: &Value) -> Option<&str> {
    data.get("status").and_then(Value::as_str)
}

/// Fail unless the response status is `"ok"`.
///
/// The service's own error code and message are used when present; otherwise
/// the raw response is embedded in the message.
pub fn check_status(data: &Value) -> Result<()> {
    if status(data) == Some("ok") {
        return Ok(());
    }

    Err(service_error(data)
        .unwrap_or_else(|| WebServiceError::new(format!("response: {}", data)))
        .into())
}

fn malformed_results(detail: impl std::fmt::Display) -> AcoustidError {
    WebServiceError::new(format!("malformed lookup results: {}", detail)).into()
}

/// Validate a lookup response and iterate over its matches.
///
/// Results are visited in the order the server sent them. A result without
/// recordings yields nothing, and a result with several recordings yields one
/// match per recording. Each result is decoded only when the iterator reaches
/// it, so a malformed entry yields an error after the matches before it.
pub fn parse_lookup_result(
    mut data: Value,
) -> Result<impl Iterator<Item = Result<LookupMatch>>> {
    match status(&data) {
        Some("ok") => {}
        other => {
            let status = other.unwrap_or("missing");
            let err = match service_error(&data) {
                Some(service) => WebServiceError {
                    message: format!("status: {}: {}", status, service.message),
                    code: service.code,
                },
                None => WebServiceError::new(format!("status: {}", status)),
            };
            return Err(err.into());
        }
    }

    let results = match data.get_mut("results").map(Value::take) {
        Some(Value::Array(results)) => results,
        Some(_) => return Err(malformed_results("results is not a list")),
        None => return Err(WebServiceError::new("results not included").into()),
    };

    Ok(results.into_iter().flat_map(|entry| {
        let matches: Vec<Result<LookupMatch>> = match serde_json::from_value::<LookupResult>(entry) {
            Ok(result) => {
                let score = result.score;
                result
                    .recordings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|recording| Ok(recording.into_match(score)))
                    .collect()
            }
            Err(e) => vec![Err(malformed_results(e))],
        };
        matches
    }))
}

/// Tracks from a single-MBID `track/list_by_mbid` response.
pub fn parse_tracks(mut data: Value) -> Result<Vec<Track>> {
    check_status(&data)?;

    let tracks = data
        .get_mut("tracks")
        .map(Value::take)
        .ok_or_else(|| WebServiceError::new("tracks not included"))?;

    Ok(serde_json::from_value(tracks)
        .map_err(|e| WebServiceError::new(format!("malformed track list: {}", e)))?)
}

/// Tracks from a batch `track/list_by_mbid` response, keyed by the requested
/// MBIDs. MBIDs the service did not mention map to an empty list.
pub fn parse_track_batch(mut data: Value, mbids: &[&str]) -> Result<HashMap<String, Vec<Track>>> {
    check_status(&data)?;

    let entries = data
        .get_mut("mbids")
        .map(Value::take)
        .ok_or_else(|| WebServiceError::new("mbids not included"))?;

    let entries: Vec<MbidEntry> = serde_json::from_value(entries)
        .map_err(|e| WebServiceError::new(format!("malformed track batch: {}", e)))?;

    let mut by_mbid: HashMap<String, Vec<Track>> = mbids
        .iter()
        .map(|mbid| (mbid.to_string(), Vec::new()))
        .collect();

    for entry in entries {
        by_mbid.entry(entry.mbid).or_default().extend(entry.tracks);
    }

    Ok(by_mbid)
}

/// Submissions listed in a `submit` or `submission_status` response.
pub fn parse_submissions(mut data: Value) -> Result<Vec<SubmissionStatus>> {
    check_status(&data)?;

    let submissions = data
        .get_mut("submissions")
        .map(Value::take)
        .unwrap_or_else(|| Value::Array(Vec::new()));

    Ok(serde_json::from_value(submissions)
        .map_err(|e| WebServiceError::new(format!("malformed submission list: {}", e)))?)
}
