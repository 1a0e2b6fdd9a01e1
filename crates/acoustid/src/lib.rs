// SPDX-License-Identifier: GPL-3.0-or-later

//! Audio fingerprinting and AcoustID web service client.
//!
//! This crate provides functionality for:
//! - Generating Chromaprint fingerprints, in-process or through `fpcalc`
//! - Looking up fingerprints and parsing the matched MusicBrainz recordings
//! - Submitting fingerprints and checking submission status
//! - Listing AcoustID tracks linked to MusicBrainz recordings
//!
//! All requests to the web service are paced by a shared [`RateLimiter`].

pub mod backend;
pub mod client;
pub mod decoder;
pub mod error;
pub mod fingerprint;
pub mod fpcalc;
pub mod generator;
pub mod parse;
pub mod rate_limiter;
pub mod submission;
pub mod transport;

pub use backend::{Backend, FileFingerprinter};
pub use client::{AcoustidClient, AcoustidClientBuilder, Endpoints, DEFAULT_META};
pub use error::{AcoustidError, Result, WebServiceError};
pub use fingerprint::Fingerprint;
pub use parse::{
    parse_lookup_result, parse_submissions, LookupMatch, SubmissionStatus, Track, TrackList,
};
pub use rate_limiter::{Pacing, RateLimiter};
pub use submission::SubmissionRecord;
pub use transport::RequestMethod;
