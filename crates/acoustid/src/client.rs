// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::backend::{Backend, FileFingerprinter};
use crate::error::{Result, WebServiceError};
use crate::fingerprint::Fingerprint;
use crate::generator::MAX_AUDIO_LENGTH;
use crate::parse::{self, LookupMatch, TrackList};
use crate::rate_limiter::{Pacing, RateLimiter, ACOUSTID_REQUEST_INTERVAL};
use crate::submission::SubmissionRecord;
use crate::transport::{RequestMethod, Transport};
use crate::AcoustidError;

const ACOUSTID_API_BASE: &str = "https://api.acoustid.org/v2/";
const USER_AGENT: &str = concat!("acoustid-rs/", env!("CARGO_PKG_VERSION"));

/// Metadata requested by default from lookups.
pub const DEFAULT_META: &str = "recordings";

/// URLs of the AcoustID API endpoints, derived from a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
    lookup: Url,
    submit: Url,
    submission_status: Url,
    track_list_by_mbid: Url,
}

impl Endpoints {
    /// Derive all endpoints from `base_url`. A missing trailing slash is added.
    pub fn new(base_url: &str) -> Result<Self> {
        let invalid = |e: &dyn std::fmt::Display| {
            AcoustidError::from(WebServiceError::new(format!("Invalid base URL: {}", e)))
        };

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let base = Url::parse(&base_url).map_err(|e| invalid(&e))?;
        if base.cannot_be_a_base() {
            return Err(invalid(&base_url));
        }

        let join = |path: &str| base.join(path).map_err(|e| invalid(&e));

        Ok(Self {
            lookup: join("lookup")?,
            submit: join("submit")?,
            submission_status: join("submission_status")?,
            track_list_by_mbid: join("track/list_by_mbid")?,
            base,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn lookup(&self) -> &Url {
        &self.lookup
    }

    pub fn submit(&self) -> &Url {
        &self.submit
    }

    pub fn submission_status(&self) -> &Url {
        &self.submission_status
    }

    pub fn track_list_by_mbid(&self) -> &Url {
        &self.track_list_by_mbid
    }
}

/// AcoustID API client.
///
/// Every request made through one client, or any of its clones, shares a
/// single rate limiter.
#[derive(Debug, Clone)]
pub struct AcoustidClient {
    transport: Transport,
    endpoints: Endpoints,
    api_key: String,
    fingerprinter: FileFingerprinter,
}

impl AcoustidClient {
    /// Create a new AcoustID client.
    ///
    /// # Arguments
    /// * `api_key` - AcoustID application API key for requests.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::builder(api_key).build()
    }

    /// Create a client builder for custom configuration.
    pub fn builder(api_key: impl Into<String>) -> AcoustidClientBuilder {
        AcoustidClientBuilder::new(api_key)
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn fingerprinter(&self) -> &FileFingerprinter {
        &self.fingerprinter
    }

    fn base_params(&self) -> Vec<(String, String)> {
        vec![
            ("format".to_string(), "json".to_string()),
            ("client".to_string(), self.api_key.clone()),
        ]
    }

    /// Look up a fingerprint and return the raw JSON response.
    ///
    /// # Arguments
    /// * `fingerprint` - The Chromaprint fingerprint and audio duration.
    /// * `meta` - Metadata to include, e.g. [`DEFAULT_META`] or
    ///   `"recordings releases"`.
    ///
    /// # Example
    /// ```no_run
    /// # use acoustid::{AcoustidClient, Fingerprint, DEFAULT_META};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = AcoustidClient::new("your-api-key")?;
    /// let fp = Fingerprint::new("AQADvEWZ", 120.0);
    /// let response = client.lookup(&fp, DEFAULT_META).await?;
    /// for m in acoustid::parse_lookup_result(response)? {
    ///     let m = m?;
    ///     println!("{} {:?}", m.recording_id, m.title);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn lookup(&self, fingerprint: &Fingerprint, meta: &str) -> Result<Value> {
        let mut params = self.base_params();
        params.extend([
            ("duration".to_string(), fingerprint.duration_secs().to_string()),
            ("fingerprint".to_string(), fingerprint.fingerprint.clone()),
            ("meta".to_string(), meta.to_string()),
        ]);

        debug!(
            target: "acoustid",
            duration = fingerprint.duration_secs(),
            meta,
            "AcoustID lookup"
        );

        self.transport.request(self.endpoints.lookup(), &params).await
    }

    /// Submit fingerprints with their metadata to AcoustID.
    ///
    /// Every record is validated before anything is sent; one record without
    /// a fingerprint or duration fails the whole call with
    /// [`AcoustidError::FingerprintSubmission`].
    ///
    /// # Arguments
    /// * `user_key` - API key of the submitting AcoustID user.
    /// * `records` - Fingerprints to submit.
    pub async fn submit(&self, user_key: &str, records: &[SubmissionRecord]) -> Result<Value> {
        if records.is_empty() {
            return Err(AcoustidError::FingerprintSubmission(
                "nothing to submit".to_string(),
            ));
        }
        for record in records {
            record.validate()?;
        }

        let mut params = self.base_params();
        params.push(("user".to_string(), user_key.to_string()));
        for (index, record) in records.iter().enumerate() {
            params.extend(record.indexed_fields(index));
        }

        debug!(target: "acoustid", count = records.len(), "AcoustID submit");

        let response = self.transport.request(self.endpoints.submit(), &params).await?;
        parse::check_status(&response)?;
        Ok(response)
    }

    /// Submit a single fingerprint.
    pub async fn submit_one(&self, user_key: &str, record: &SubmissionRecord) -> Result<Value> {
        self.submit(user_key, std::slice::from_ref(record)).await
    }

    /// Check the processing status of a submission.
    pub async fn get_submission_status(&self, submission_id: i64) -> Result<Value> {
        let mut params = self.base_params();
        params.push(("id".to_string(), submission_id.to_string()));

        let response = self
            .transport
            .request(self.endpoints.submission_status(), &params)
            .await?;
        parse::check_status(&response)?;
        Ok(response)
    }

    async fn request_tracks(&self, mbids: &[&str], disabled: bool, batch: bool) -> Result<Value> {
        let flag = |on: bool| if on { "1" } else { "0" }.to_string();

        let mut params = vec![("format".to_string(), "json".to_string())];
        params.extend(mbids.iter().map(|mbid| ("mbid".to_string(), mbid.to_string())));
        params.push(("disabled".to_string(), flag(disabled)));
        params.push(("batch".to_string(), flag(batch)));

        self.transport
            .request(self.endpoints.track_list_by_mbid(), &params)
            .await
    }

    /// AcoustID track IDs linked to a MusicBrainz recording. Disabled tracks
    /// are left out.
    pub async fn track_by_mbid(&self, mbid: &str) -> Result<Vec<String>> {
        let response = self.request_tracks(&[mbid], false, false).await?;
        Ok(parse::parse_tracks(response)?
            .into_iter()
            .map(|track| track.id)
            .collect())
    }

    /// AcoustID track IDs linked to a MusicBrainz recording, split into
    /// enabled and disabled tracks.
    pub async fn track_by_mbid_partitioned(&self, mbid: &str) -> Result<TrackList> {
        let response = self.request_tracks(&[mbid], true, false).await?;
        Ok(parse::parse_tracks(response)?.into_iter().collect())
    }

    /// [`track_by_mbid`](Self::track_by_mbid) for several recordings in one
    /// request. Every requested MBID is present in the result.
    pub async fn tracks_by_mbids(&self, mbids: &[&str]) -> Result<HashMap<String, Vec<String>>> {
        let response = self.request_tracks(mbids, false, true).await?;
        Ok(parse::parse_track_batch(response, mbids)?
            .into_iter()
            .map(|(mbid, tracks)| (mbid, tracks.into_iter().map(|t| t.id).collect()))
            .collect())
    }

    /// [`track_by_mbid_partitioned`](Self::track_by_mbid_partitioned) for
    /// several recordings in one request.
    pub async fn tracks_by_mbids_partitioned(
        &self,
        mbids: &[&str],
    ) -> Result<HashMap<String, TrackList>> {
        let response = self.request_tracks(mbids, true, true).await?;
        Ok(parse::parse_track_batch(response, mbids)?
            .into_iter()
            .map(|(mbid, tracks)| (mbid, tracks.into_iter().collect()))
            .collect())
    }

    /// Fingerprint an audio file with the configured backend.
    pub async fn fingerprint_file(&self, path: &Path) -> Result<Fingerprint> {
        self.fingerprinter.fingerprint_file(path).await
    }

    /// Fingerprint an audio file and look it up, returning the raw response.
    #[instrument(skip(self))]
    pub async fn match_file_raw(&self, path: &Path, meta: &str) -> Result<Value> {
        let fingerprint = self.fingerprint_file(path).await?;
        self.lookup(&fingerprint, meta).await
    }

    /// Fingerprint an audio file, look it up and parse the matches.
    pub async fn match_file(&self, path: &Path, meta: &str) -> Result<Vec<LookupMatch>> {
        let response = self.match_file_raw(path, meta).await?;
        parse::parse_lookup_result(response)?.collect()
    }
}

/// Builder for AcoustID client.
#[derive(Debug)]
pub struct AcoustidClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Option<Duration>,
    rate_limiter: Option<RateLimiter>,
    pacing: Pacing,
    request_method: RequestMethod,
    max_length: u32,
    force_fpcalc: bool,
    fpcalc_command: Option<String>,
}

impl AcoustidClientBuilder {
    /// Create a new builder.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ACOUSTID_API_BASE.to_string(),
            timeout: None,
            rate_limiter: None,
            pacing: Pacing::FixedInterval(ACOUSTID_REQUEST_INTERVAL),
            request_method: RequestMethod::Post,
            max_length: MAX_AUDIO_LENGTH,
            force_fpcalc: false,
            fpcalc_command: None,
        }
    }

    /// Set a custom base URL (useful for testing).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout. Requests have no timeout by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Minimum interval between requests; zero disables pacing.
    pub fn request_interval(mut self, interval: Duration) -> Self {
        self.pacing = Pacing::from_interval(interval);
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Share an existing rate limiter, e.g. between clients with different
    /// API keys. Overrides [`pacing`](Self::pacing).
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn request_method(mut self, method: RequestMethod) -> Self {
        self.request_method = method;
        self
    }

    /// Seconds of audio used for fingerprints (default 120).
    pub fn max_length(mut self, seconds: u32) -> Self {
        self.max_length = seconds;
        self
    }

    /// Always fingerprint through `fpcalc`, even when libchromaprint is available.
    pub fn force_fpcalc(mut self, force: bool) -> Self {
        self.force_fpcalc = force;
        self
    }

    /// Path or name of the `fpcalc` executable (default: `$FPCALC` or `fpcalc`).
    pub fn fpcalc_command(mut self, command: impl Into<String>) -> Self {
        self.fpcalc_command = Some(command.into());
        self
    }

    /// Build the AcoustID client.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The base URL is not a valid URL format
    /// - The HTTP client cannot be created
    pub fn build(self) -> Result<AcoustidClient> {
        let endpoints = Endpoints::new(&self.base_url)?;

        // Response decompression is done by the transport.
        let client = Client::builder().user_agent(USER_AGENT).no_gzip().build()?;

        let limiter = self
            .rate_limiter
            .unwrap_or_else(|| RateLimiter::new(self.pacing));
        let transport = Transport::new(client, limiter, self.request_method, self.timeout);

        let backend = Backend::detect(self.force_fpcalc, self.fpcalc_command.as_deref());
        let fingerprinter = FileFingerprinter::new(backend, self.max_length);

        Ok(AcoustidClient {
            transport,
            endpoints,
            api_key: self.api_key,
            fingerprinter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::decompress;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Match, Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Matches a gzip-compressed form body containing the given pair.
    struct FormParam(&'static str, &'static str);

    impl Match for FormParam {
        fn matches(&self, request: &Request) -> bool {
            decompress(&request.body)
                .map(|body| url::form_urlencoded::parse(&body).any(|(k, v)| k == self.0 && v == self.1))
                .unwrap_or(false)
        }
    }

    /// Matches a form body with the given number of occurrences of a key.
    struct FormParamCount(&'static str, usize);

    impl Match for FormParamCount {
        fn matches(&self, request: &Request) -> bool {
            decompress(&request.body)
                .map(|body| url::form_urlencoded::parse(&body).filter(|(k, _)| k == self.0).count() == self.1)
                .unwrap_or(false)
        }
    }

    fn test_client(server: &MockServer) -> AcoustidClient {
        AcoustidClient::builder("test-key")
            .base_url(server.uri())
            .request_interval(Duration::ZERO)
            .build()
            .unwrap()
    }

    fn sample_response() -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "results": [{
                "id": "9ff43b6a-4f16-427c-93c2-92307ca505e0",
                "score": 0.95,
                "recordings": [{
                    "id": "0dd2d1a0-88f2-41a4-b6da-0f3ba8caf50a",
                    "title": "Fake Plastic Trees",
                    "artists": [{
                        "id": "a74b1b7f-71a5-4011-9441-d0b5e4122711",
                        "name": "Radiohead"
                    }]
                }]
            }]
        })
    }

    fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"}))
    }

    #[test]
    fn test_endpoints_from_base_url() {
        let endpoints = Endpoints::new("https://api.example.com/v2").unwrap();
        assert_eq!(endpoints.base().as_str(), "https://api.example.com/v2/");
        assert_eq!(endpoints.lookup().as_str(), "https://api.example.com/v2/lookup");
        assert_eq!(endpoints.submit().as_str(), "https://api.example.com/v2/submit");
        assert_eq!(
            endpoints.submission_status().as_str(),
            "https://api.example.com/v2/submission_status"
        );
        assert_eq!(
            endpoints.track_list_by_mbid().as_str(),
            "https://api.example.com/v2/track/list_by_mbid"
        );

        // Trailing slash is not doubled
        let endpoints = Endpoints::new("https://api.example.com/v2/").unwrap();
        assert_eq!(endpoints.lookup().as_str(), "https://api.example.com/v2/lookup");
    }

    #[test]
    fn test_acoustid_invalid_base_url() {
        // Invalid URL should be caught during build()
        let result = AcoustidClient::builder("test-key")
            .base_url("not-a-valid-url")
            .build();

        assert!(result.is_err());

        // Also test with a malformed URL
        let result = AcoustidClient::builder("test-key")
            .base_url("ht!tp://invalid")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_acoustid_valid_base_url() {
        let result = AcoustidClient::builder("test-key")
            .base_url("https://api.example.com/v2")
            .build();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_acoustid_lookup() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/lookup"))
            .and(FormParam("format", "json"))
            .and(FormParam("client", "test-key"))
            .and(FormParam("fingerprint", "AQADvEWZ"))
            .and(FormParam("duration", "120"))
            .and(FormParam("meta", "recordings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);

        // Duration is truncated, not rounded
        let fp = Fingerprint::new("AQADvEWZ", 120.9);
        let response = client.lookup(&fp, DEFAULT_META).await.unwrap();
        let matches: Vec<_> = parse::parse_lookup_result(response)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].title, Some("Fake Plastic Trees".to_string()));
        assert_eq!(matches[0].artists, Some("Radiohead".to_string()));
        assert!(matches[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_submit_validates_before_sending() {
        let mock_server = MockServer::start().await;

        // No request may reach the server.
        Mock::given(wiremock::matchers::any())
            .respond_with(ok())
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);
        let valid = SubmissionRecord::from_fingerprint(&Fingerprint::new("AQAB", 200.0));
        let missing_duration = SubmissionRecord {
            fingerprint: Some("AQAB".to_string()),
            ..Default::default()
        };

        let result = client.submit("user-key", &[valid, missing_duration]).await;
        assert!(matches!(result, Err(AcoustidError::FingerprintSubmission(_))));

        let result = client.submit("user-key", &[]).await;
        assert!(matches!(result, Err(AcoustidError::FingerprintSubmission(_))));
    }

    #[tokio::test]
    async fn test_submit_flattens_records() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(FormParam("client", "test-key"))
            .and(FormParam("user", "user-key"))
            .and(FormParam("fingerprint.0", "AQAB"))
            .and(FormParam("duration.0", "200"))
            .and(FormParam("mbid.0", "0dd2d1a0-88f2-41a4-b6da-0f3ba8caf50a"))
            .and(FormParam("fingerprint.1", "AQAC"))
            .and(FormParam("duration.1", "31"))
            .and(FormParam("artist.1", "Radiohead"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "submissions": [
                    {"index": "0", "id": 100, "status": "pending"},
                    {"index": "1", "id": 101, "status": "pending"}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);
        let records = [
            SubmissionRecord::from_fingerprint(&Fingerprint::new("AQAB", 200.4))
                .mbid("0dd2d1a0-88f2-41a4-b6da-0f3ba8caf50a"),
            SubmissionRecord::from_fingerprint(&Fingerprint::new("AQAC", 31.0)).artist("Radiohead"),
        ];

        let response = client.submit("user-key", &records).await.unwrap();
        let submissions = parse::parse_submissions(response).unwrap();
        assert_eq!(submissions.iter().map(|s| s.id).collect::<Vec<_>>(), vec![100, 101]);
    }

    #[tokio::test]
    async fn test_submit_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error",
                "error": {"code": 6, "message": "invalid user API key"}
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);
        let record = SubmissionRecord::from_fingerprint(&Fingerprint::new("AQAB", 200.0));

        let err = client.submit_one("bad-user", &record).await.unwrap_err();
        assert_eq!(err.service_code(), Some(6));
        assert!(err.to_string().contains("invalid user API key"));
    }

    #[tokio::test]
    async fn test_submission_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submission_status"))
            .and(FormParam("client", "test-key"))
            .and(FormParam("id", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "submissions": [{"id": 100, "status": "imported", "result": {"id": "9ff43b6a-4f16-427c-93c2-92307ca505e0"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);
        let response = client.get_submission_status(100).await.unwrap();
        let submissions = parse::parse_submissions(response).unwrap();

        assert_eq!(submissions[0].status, "imported");
        assert_eq!(
            submissions[0].track_id.as_deref(),
            Some("9ff43b6a-4f16-427c-93c2-92307ca505e0")
        );
    }

    #[tokio::test]
    async fn test_track_by_mbid_single() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/track/list_by_mbid"))
            .and(FormParam("mbid", "m1"))
            .and(FormParam("disabled", "0"))
            .and(FormParam("batch", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "tracks": [{"id": "t1"}, {"id": "t2"}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);
        let tracks = client.track_by_mbid("m1").await.unwrap();
        assert_eq!(tracks, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_track_by_mbid_partitioned() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/track/list_by_mbid"))
            .and(FormParam("disabled", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "tracks": [{"id": "t1", "disabled": false}, {"id": "t2", "disabled": true}]
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);
        let tracks = client.track_by_mbid_partitioned("m1").await.unwrap();
        assert_eq!(tracks.enabled, vec!["t1"]);
        assert_eq!(tracks.disabled, vec!["t2"]);
    }

    #[tokio::test]
    async fn test_tracks_by_mbids_batch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/track/list_by_mbid"))
            .and(FormParamCount("mbid", 2))
            .and(FormParam("batch", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "mbids": [{"mbid": "m1", "tracks": [{"id": "t1"}]}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);
        let tracks = client.tracks_by_mbids(&["m1", "m2"]).await.unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks["m1"], vec!["t1"]);
        assert!(tracks["m2"].is_empty());
    }

    #[tokio::test]
    async fn test_tracks_by_mbids_partitioned() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/track/list_by_mbid"))
            .and(FormParam("batch", "1"))
            .and(FormParam("disabled", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "mbids": [
                    {"mbid": "m1", "tracks": [{"id": "t1"}, {"id": "t2", "disabled": true}]},
                    {"mbid": "m2", "tracks": []}
                ]
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server);
        let tracks = client.tracks_by_mbids_partitioned(&["m1", "m2"]).await.unwrap();

        assert_eq!(
            tracks["m1"],
            TrackList {
                enabled: vec!["t1".to_string()],
                disabled: vec!["t2".to_string()],
            }
        );
        assert_eq!(tracks["m2"], TrackList::default());
    }

    #[tokio::test]
    async fn test_match_file_reports_missing_backend() {
        let mock_server = MockServer::start().await;

        Mock::given(wiremock::matchers::any())
            .respond_with(ok())
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = AcoustidClient::builder("test-key")
            .base_url(mock_server.uri())
            .force_fpcalc(true)
            .fpcalc_command("acoustid-test-no-such-fpcalc")
            .build()
            .unwrap();

        let err = client
            .match_file(Path::new("song.flac"), DEFAULT_META)
            .await
            .unwrap_err();
        assert!(matches!(err, AcoustidError::NoBackend(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_match_file_with_fpcalc() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fpcalc");
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"FILE=$3\"\necho DURATION=187\necho FINGERPRINT=AQADtE2SJEkS\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/lookup"))
            .and(FormParam("fingerprint", "AQADtE2SJEkS"))
            .and(FormParam("duration", "187"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = AcoustidClient::builder("test-key")
            .base_url(mock_server.uri())
            .request_interval(Duration::ZERO)
            .force_fpcalc(true)
            .fpcalc_command(script.to_string_lossy())
            .build()
            .unwrap();

        let matches = client
            .match_file(Path::new("song.flac"), DEFAULT_META)
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].recording_id, "0dd2d1a0-88f2-41a4-b6da-0f3ba8caf50a");
    }

    /// Records when each request reached the server.
    #[derive(Clone, Default)]
    struct ArrivalLog(Arc<Mutex<Vec<std::time::Instant>>>);

    impl Respond for ArrivalLog {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.0.lock().unwrap().push(std::time::Instant::now());
            ok()
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_paced() {
        let interval = Duration::from_millis(200);
        let mock_server = MockServer::start().await;
        let arrivals = ArrivalLog::default();

        Mock::given(method("POST"))
            .and(path("/submission_status"))
            .respond_with(arrivals.clone())
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = AcoustidClient::builder("test-key")
            .base_url(mock_server.uri())
            .request_interval(interval)
            .build()
            .unwrap();

        let start = std::time::Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|id| {
                let client = client.clone();
                tokio::spawn(async move { client.get_submission_status(id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // The first call starts immediately, each later one waits a full interval.
        assert!(start.elapsed() >= interval * 2, "elapsed {:?}", start.elapsed());

        let mut arrivals = arrivals.0.lock().unwrap().clone();
        arrivals.sort();
        for pair in arrivals.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= interval - Duration::from_millis(50), "gap {:?}", gap);
        }
    }
}
