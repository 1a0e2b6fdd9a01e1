// SPDX-License-Identifier: GPL-3.0-or-later

//! Fingerprint generation from PCM audio.
//!
//! Blocks of interleaved 16-bit little-endian PCM are fed to a
//! [`FingerprintEngine`] until the input runs out or the length cap is
//! reached. With the `libchromaprint` feature, [`ChromaprintEngine`] drives
//! libchromaprint; tests and alternative backends can plug in their own engine.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "libchromaprint")]
//! # fn example() -> acoustid::Result<()> {
//! use acoustid::generator::{fingerprint_pcm, ChromaprintEngine, MAX_AUDIO_LENGTH};
//!
//! let blocks = (0..16).map(|_| Ok(vec![0u8; 4096]));
//! let mut engine = ChromaprintEngine::new();
//! let fingerprint = fingerprint_pcm(&mut engine, 44100, 2, blocks, MAX_AUDIO_LENGTH)?;
//! println!("{}", fingerprint);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use tracing::debug;

use crate::{AcoustidError, Result};

/// Maximum duration to use for fingerprinting (in seconds).
pub const MAX_AUDIO_LENGTH: u32 = 120;

/// An incremental fingerprinting engine.
pub trait FingerprintEngine {
    type Error: fmt::Display;

    fn start(&mut self, sample_rate: u32, channels: u16) -> std::result::Result<(), Self::Error>;

    /// Feed interleaved 16-bit little-endian samples.
    fn feed(&mut self, pcm: &[u8]) -> std::result::Result<(), Self::Error>;

    /// Finalize and return the compressed, encoded fingerprint.
    fn finish(&mut self) -> std::result::Result<String, Self::Error>;
}

/// Fingerprint PCM audio given its sample rate and channel count.
///
/// Feeding stops once `sample_rate * channels * max_length` samples have been
/// consumed; the block that crosses the limit is still fed. Errors from the
/// `blocks` iterator are returned unchanged, engine failures become
/// [`AcoustidError::FingerprintGeneration`].
pub fn fingerprint_pcm<E, I, B>(
    engine: &mut E,
    sample_rate: u32,
    channels: u16,
    blocks: I,
    max_length: u32,
) -> Result<String>
where
    E: FingerprintEngine,
    I: IntoIterator<Item = Result<B>>,
    B: AsRef<[u8]>,
{
    let end_position = u64::from(sample_rate) * u64::from(channels) * u64::from(max_length);

    engine.start(sample_rate, channels).map_err(engine_error)?;

    // Samples fed so far, 2 bytes each.
    let mut position: u64 = 0;
    for block in blocks {
        let block = block?;
        let block = block.as_ref();
        engine.feed(block).map_err(engine_error)?;

        position += (block.len() / 2) as u64;
        if position >= end_position {
            debug!(
                target: "acoustid",
                samples = position,
                max_length,
                "fingerprint length limit reached"
            );
            break;
        }
    }

    engine.finish().map_err(engine_error)
}

fn engine_error<E: fmt::Display>(err: E) -> AcoustidError {
    AcoustidError::FingerprintGeneration(format!("fingerprint calculation failed: {}", err))
}

#[cfg(feature = "libchromaprint")]
pub use chromaprint_engine::ChromaprintEngine;

#[cfg(feature = "libchromaprint")]
mod chromaprint_engine {
    use chromaprint::Chromaprint;

    use super::FingerprintEngine;

    /// [`FingerprintEngine`] backed by libchromaprint.
    pub struct ChromaprintEngine {
        ctx: Chromaprint,
        // Low byte of a sample split across two blocks.
        pending: Option<u8>,
        samples: Vec<i16>,
    }

    impl ChromaprintEngine {
        pub fn new() -> Self {
            Self {
                ctx: Chromaprint::new(),
                pending: None,
                samples: Vec::new(),
            }
        }
    }

    impl Default for ChromaprintEngine {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FingerprintEngine for ChromaprintEngine {
        type Error = &'static str;

        fn start(&mut self, sample_rate: u32, channels: u16) -> Result<(), Self::Error> {
            self.pending = None;
            let rate = i32::try_from(sample_rate).map_err(|_| "sample rate out of range")?;
            if self.ctx.start(rate, i32::from(channels)) {
                Ok(())
            } else {
                Err("failed to start Chromaprint")
            }
        }

        fn feed(&mut self, pcm: &[u8]) -> Result<(), Self::Error> {
            self.samples.clear();

            let mut bytes = pcm;
            if let Some(low) = self.pending.take() {
                match bytes.split_first() {
                    Some((&high, rest)) => {
                        self.samples.push(i16::from_le_bytes([low, high]));
                        bytes = rest;
                    }
                    None => {
                        self.pending = Some(low);
                        return Ok(());
                    }
                }
            }

            let mut chunks = bytes.chunks_exact(2);
            self.samples
                .extend(chunks.by_ref().map(|c| i16::from_le_bytes([c[0], c[1]])));
            self.pending = chunks.remainder().first().copied();

            if self.samples.is_empty() || self.ctx.feed(&self.samples) {
                Ok(())
            } else {
                Err("failed to feed samples to Chromaprint")
            }
        }

        fn finish(&mut self) -> Result<String, Self::Error> {
            if !self.ctx.finish() {
                return Err("Chromaprint finalize failed");
            }
            self.ctx
                .fingerprint()
                .ok_or("Chromaprint did not return a fingerprint")
        }
    }
}
