// SPDX-License-Identifier: GPL-3.0-or-later

//! Request codec for the AcoustID web service.
//!
//! Requests are URL-encoded forms sent gzip-compressed; responses are JSON,
//! optionally gzip-encoded. Every request goes through the client's
//! [`RateLimiter`].

use std::io::{Read, Write};
use std::time::Duration;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Result, WebServiceError};
use crate::parse;
use crate::rate_limiter::RateLimiter;

/// HTTP method used to reach the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMethod {
    /// Gzip-compressed form body.
    #[default]
    Post,
    /// Parameters in the query string, no body.
    Get,
}

/// Compress bytes into a gzip stream.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| WebServiceError::new(format!("failed to compress request body: {}", e)).into())
}

/// Decompress a gzip stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| WebServiceError::new(format!("failed to decompress response: {}", e)))?;
    Ok(out)
}

/// Serialize parameters as `application/x-www-form-urlencoded`.
pub fn encode_form(params: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// Rate-limited HTTP transport returning decoded JSON.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    limiter: RateLimiter,
    method: RequestMethod,
    timeout: Option<Duration>,
}

impl Transport {
    pub fn new(
        client: Client,
        limiter: RateLimiter,
        method: RequestMethod,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            limiter,
            method,
            timeout,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send `params` to `url` and return the parsed JSON body.
    pub async fn request(&self, url: &Url, params: &[(String, String)]) -> Result<Value> {
        self.limiter.run(|| self.send(url, params)).await
    }

    async fn send(&self, url: &Url, params: &[(String, String)]) -> Result<Value> {
        let request = match self.method {
            RequestMethod::Post => {
                let body = encode_form(params);
                trace!(target: "acoustid", "POST {} ({} bytes of form data)", url, body.len());
                self.client
                    .post(url.clone())
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .header(CONTENT_ENCODING, "gzip")
                    .body(compress(body.as_bytes())?)
            }
            RequestMethod::Get => {
                let mut url = url.clone();
                url.query_pairs_mut().extend_pairs(params);
                trace!(target: "acoustid", "GET {}", url);
                self.client.get(url)
            }
        }
        .header(ACCEPT_ENCODING, "gzip");

        let request = match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        };

        let response = request.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        debug!(target: "acoustid", "AcoustID response status: {}", status);

        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        let body = if gzipped {
            decompress(&body)?
        } else {
            body.to_vec()
        };

        decode_response(status, &body)
    }

    fn map_error(&self, err: reqwest::Error) -> WebServiceError {
        match self.timeout {
            Some(timeout) if err.is_timeout() => WebServiceError::new(format!(
                "HTTP request timed out ({}s)",
                timeout.as_secs_f64()
            )),
            _ => WebServiceError::new(format!("HTTP request failed: {}", err)),
        }
    }
}

fn decode_response(status: StatusCode, body: &[u8]) -> Result<Value> {
    let parsed = serde_json::from_slice::<Value>(body);
    if let Ok(value) = &parsed {
        trace!(target: "acoustid", "AcoustID response: {}", value);
    }

    if !status.is_success() {
        if let Some(err) = parsed.as_ref().ok().and_then(parse::service_error) {
            return Err(err.into());
        }
        return Err(WebServiceError::new(format!("HTTP request failed: status {}", status)).into());
    }

    parsed.map_err(|_| WebServiceError::new("response is not valid JSON").into())
}
