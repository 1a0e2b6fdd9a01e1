// SPDX-License-Identifier: GPL-3.0-or-later

//! Fingerprinting through Chromaprint's `fpcalc` command-line tool.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::{AcoustidError, Fingerprint, Result};

/// Executable used when nothing else is configured.
pub const FPCALC_COMMAND: &str = "fpcalc";

/// Environment variable overriding the `fpcalc` executable.
pub const FPCALC_ENVVAR: &str = "FPCALC";

fn generation_error(message: impl Into<String>) -> AcoustidError {
    AcoustidError::FingerprintGeneration(message.into())
}

/// The `fpcalc` executable to run: `$FPCALC` if set, otherwise `fpcalc`.
pub fn fpcalc_command() -> String {
    std::env::var(FPCALC_ENVVAR)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| FPCALC_COMMAND.to_string())
}

/// Run `fpcalc -length <max_length> <path>` and parse its output.
///
/// There is no timeout: this waits for the process to exit.
pub async fn run_fpcalc(command: &str, path: &Path, max_length: u32) -> Result<Fingerprint> {
    debug!(target: "acoustid", command, path = %path.display(), "running fpcalc");

    let output = Command::new(command)
        .arg("-length")
        .arg(max_length.to_string())
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => AcoustidError::NoBackend(format!("{} not found", command)),
            _ => generation_error(format!("fpcalc invocation failed: {}", e)),
        })?;

    if !output.status.success() {
        return Err(match output.status.code() {
            Some(code) => generation_error(format!("fpcalc exited with status {}", code)),
            None => generation_error("fpcalc was terminated by a signal"),
        });
    }

    parse_fpcalc_output(&output.stdout)
}

/// Parse the `KEY=VALUE` lines printed by `fpcalc`.
///
/// Only `DURATION` and `FINGERPRINT` are used; other keys such as `FILE` are
/// ignored.
pub fn parse_fpcalc_output(output: &[u8]) -> Result<Fingerprint> {
    let mut duration = None;
    let mut fingerprint = None;

    for line in output.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let split = line.iter().position(|b| *b == b'=');
        let Some(split) = split else {
            return Err(generation_error("malformed fpcalc output"));
        };
        let (key, value) = (&line[..split], &line[split + 1..]);

        match key {
            b"DURATION" => {
                let value = std::str::from_utf8(value)
                    .ok()
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .ok_or_else(|| generation_error("fpcalc duration not numeric"))?;
                duration = Some(value);
            }
            b"FINGERPRINT" => {
                let value = std::str::from_utf8(value)
                    .map_err(|_| generation_error("fpcalc fingerprint is not valid text"))?;
                fingerprint = Some(value.trim().to_string());
            }
            _ => {}
        }
    }

    match (duration, fingerprint) {
        (Some(duration), Some(fingerprint)) => Ok(Fingerprint::new(fingerprint, duration)),
        _ => Err(generation_error("missing fpcalc output")),
    }
}
