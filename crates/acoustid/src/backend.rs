// SPDX-License-Identifier: GPL-3.0-or-later

//! Fingerprinting of audio files.
//!
//! Two backends exist: decoding the file in-process and feeding libchromaprint
//! (the `libchromaprint` feature), or running Chromaprint's `fpcalc` tool. The
//! backend is chosen once, when the [`FileFingerprinter`] is built.

use std::path::Path;

use tracing::{debug, instrument};

use crate::fpcalc;
use crate::generator::MAX_AUDIO_LENGTH;
use crate::{Fingerprint, Result};

/// How audio files are fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Decode with symphonia and fingerprint with libchromaprint.
    #[cfg(feature = "libchromaprint")]
    Library,
    /// Run an external `fpcalc` executable.
    Fpcalc { command: String },
}

impl Backend {
    /// Pick the best available backend.
    ///
    /// The in-process library is preferred unless `force_fpcalc` is set or the
    /// crate was built without `libchromaprint`. The `fpcalc` executable is
    /// `fpcalc_override`, then `$FPCALC`, then `fpcalc` from `PATH`.
    pub fn detect(force_fpcalc: bool, fpcalc_override: Option<&str>) -> Self {
        #[cfg(feature = "libchromaprint")]
        if !force_fpcalc {
            return Backend::Library;
        }

        #[cfg(not(feature = "libchromaprint"))]
        let _ = force_fpcalc;

        let command = fpcalc_override
            .map(str::to_string)
            .unwrap_or_else(fpcalc::fpcalc_command);
        Backend::Fpcalc { command }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "libchromaprint")]
            Backend::Library => "libchromaprint",
            Backend::Fpcalc { .. } => "fpcalc",
        }
    }
}

/// Computes fingerprints for audio files with a fixed backend and length cap.
#[derive(Debug, Clone)]
pub struct FileFingerprinter {
    backend: Backend,
    max_length: u32,
}

impl FileFingerprinter {
    pub fn new(backend: Backend, max_length: u32) -> Self {
        Self {
            backend,
            max_length,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    /// Fingerprint an audio file.
    ///
    /// The returned duration is that of the whole file, while only the first
    /// `max_length` seconds contribute to the fingerprint.
    ///
    /// # Errors
    ///
    /// - `NoBackend` if the `fpcalc` executable does not exist
    /// - `FingerprintGeneration` if the file cannot be decoded or fingerprinted
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn fingerprint_file(&self, path: &Path) -> Result<Fingerprint> {
        let fingerprint = match &self.backend {
            #[cfg(feature = "libchromaprint")]
            Backend::Library => fingerprint_with_library(path.to_path_buf(), self.max_length).await?,
            Backend::Fpcalc { command } => fpcalc::run_fpcalc(command, path, self.max_length).await?,
        };

        debug!(
            target: "acoustid",
            duration = fingerprint.duration,
            fingerprint_len = fingerprint.fingerprint.len(),
            "fingerprint generated"
        );

        Ok(fingerprint)
    }
}

impl Default for FileFingerprinter {
    fn default() -> Self {
        Self::new(Backend::detect(false, None), MAX_AUDIO_LENGTH)
    }
}

#[cfg(feature = "libchromaprint")]
async fn fingerprint_with_library(path: std::path::PathBuf, max_length: u32) -> Result<Fingerprint> {
    use crate::decoder::AudioFile;
    use crate::generator::{fingerprint_pcm, ChromaprintEngine};
    use crate::AcoustidError;

    // Decoding and fingerprinting are CPU-bound.
    tokio::task::spawn_blocking(move || {
        let mut audio = AudioFile::open(&path)?;
        let (sample_rate, channels) = (audio.sample_rate(), audio.channels());

        let mut engine = ChromaprintEngine::new();
        let fingerprint =
            fingerprint_pcm(&mut engine, sample_rate, channels, audio.by_ref(), max_length)?;

        // Without a container length the rest of the file has to be decoded
        // to learn the duration.
        if !audio.has_container_duration() {
            for block in audio.by_ref() {
                block?;
            }
        }

        Ok(Fingerprint::new(fingerprint, audio.duration()))
    })
    .await
    .map_err(|e| AcoustidError::FingerprintGeneration(format!("fingerprint task failed: {}", e)))?
}
