// SPDX-License-Identifier: GPL-3.0-or-later

//! Audio decoding for in-process fingerprinting, using symphonia.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use tracing::{debug, warn};

use crate::{AcoustidError, Result};

fn decode_failure(detail: impl std::fmt::Display) -> AcoustidError {
    AcoustidError::FingerprintGeneration(format!("audio could not be decoded: {}", detail))
}

/// An open audio file yielding interleaved 16-bit little-endian PCM blocks.
pub struct AudioFile {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    duration: Option<f64>,
    frames_decoded: u64,
    finished: bool,
}

/// Stream length in seconds as reported by the container, if it says.
fn container_duration(
    n_frames: Option<u64>,
    time_base: Option<TimeBase>,
    sample_rate: u32,
) -> Option<f64> {
    match (n_frames?, time_base) {
        (frames, Some(time_base)) => {
            let time = time_base.calc_time(frames);
            Some(time.seconds as f64 + time.frac)
        }
        (frames, None) => Some(frames as f64 / f64::from(sample_rate)),
    }
}

impl AudioFile {
    /// Open and probe an audio file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| decode_failure(format!("failed to open {}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(decode_failure)?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| decode_failure("no audio tracks found"))?;

        let track_id = track.id;
        let params = &track.codec_params;

        let sample_rate = params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| decode_failure("unknown sample rate"))?;
        let channels = params
            .channels
            .map(|channels| channels.count() as u16)
            .filter(|count| *count > 0)
            .ok_or_else(|| decode_failure("unknown channel count"))?;

        let duration = container_duration(params.n_frames, params.time_base, sample_rate);
        if duration.is_none() {
            warn!(
                target: "acoustid",
                path = %path.display(),
                "container does not report a length; duration will be counted while decoding"
            );
        }

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(decode_failure)?;

        debug!(
            target: "acoustid",
            sample_rate,
            channels,
            ?duration,
            "opened audio file"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            frames_decoded: 0,
            finished: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Whether the container reported the stream length up front.
    pub fn has_container_duration(&self) -> bool {
        self.duration.is_some()
    }

    /// Seconds of audio decoded so far.
    pub fn decoded_duration(&self) -> f64 {
        self.frames_decoded as f64 / f64::from(self.sample_rate)
    }

    /// Duration of the whole file in seconds. Without a container length this
    /// is the decoded length, which is only complete once the file has been
    /// read to the end.
    pub fn duration(&self) -> f64 {
        self.duration.unwrap_or_else(|| self.decoded_duration())
    }
}

impl Iterator for AudioFile {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    return None;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(decode_failure(e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    self.frames_decoded += decoded.frames() as u64;
                    let spec = *decoded.spec();
                    let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);

                    let bytes = buffer
                        .samples()
                        .iter()
                        .flat_map(|sample| sample.to_le_bytes())
                        .collect();
                    return Some(Ok(bytes));
                }
                // A corrupt frame is skipped, as players do.
                Err(SymphoniaError::DecodeError(msg)) => {
                    debug!(target: "acoustid", "skipping undecodable frame: {}", msg);
                    continue;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(decode_failure(e)));
                }
            }
        }
    }
}
