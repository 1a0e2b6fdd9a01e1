// SPDX-License-Identifier: GPL-3.0-or-later
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use acoustid::{
    parse_submissions, AcoustidClient, AcoustidError, Backend, FileFingerprinter, Fingerprint,
    LookupMatch, SubmissionRecord,
};
use acoustid_config::{load as load_config, AppConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Identify audio files with the AcoustID web service.
#[derive(Parser, Debug)]
#[command(name = "acoustid")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// AcoustID application API key (overrides the configuration)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprint files and print their MusicBrainz matches
    Match {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Print fingerprints in the format of Chromaprint's fpcalc
    Fpcalc {
        /// Seconds of audio used for the fingerprint
        #[arg(long, value_name = "SECS")]
        length: Option<u32>,
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Fingerprint files and submit them
    Submit {
        /// AcoustID user API key (overrides the configuration)
        #[arg(long)]
        user: Option<String>,
        /// MusicBrainz recording ID attached to every submitted file
        #[arg(long)]
        mbid: Option<String>,
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the status of a submission
    Status { id: i64 },
    /// List AcoustID tracks linked to MusicBrainz recordings
    Tracks {
        #[arg(value_name = "MBID", required = true)]
        mbids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    let succeeded = run(cli, &config).await?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer().with_writer(io::stderr).with_target(true).with_level(true);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Run a command; `Ok(false)` means at least one item failed.
async fn run(cli: Cli, config: &AppConfig) -> Result<bool> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Match { files } => {
            let client = build_client(config, cli.api_key)?;
            run_match(&client, &config.acoustid.meta, &files, &mut out).await
        }
        Command::Fpcalc { length, files } => {
            let fingerprinter = build_fingerprinter(config, length);
            run_fpcalc(&fingerprinter, &files, &mut out).await
        }
        Command::Submit { user, mbid, files } => {
            let user_key = user
                .or_else(|| config.acoustid.user_key.clone())
                .context("no user API key configured; pass --user or set acoustid.user_key")?;
            let client = build_client(config, cli.api_key)?;
            run_submit(&client, &user_key, mbid.as_deref(), &files, &mut out).await
        }
        Command::Status { id } => {
            let client = build_client(config, cli.api_key)?;
            let response = client.get_submission_status(id).await?;
            let submissions = parse_submissions(response)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&submissions)?)?;
            Ok(true)
        }
        Command::Tracks { mbids } => {
            let client = build_client(config, cli.api_key)?;
            run_tracks(&client, &mbids, &mut out).await
        }
    }
}

fn build_client(config: &AppConfig, api_key: Option<String>) -> Result<AcoustidClient> {
    let api_key = api_key
        .or_else(|| config.acoustid.api_key.clone())
        .context("no API key configured; pass --api-key or set acoustid.api_key")?;

    let mut builder = AcoustidClient::builder(api_key)
        .base_url(&config.acoustid.base_url)
        .request_interval(config.acoustid.request_interval())
        .max_length(config.fingerprint.max_length_secs)
        .force_fpcalc(config.fingerprint.force_fpcalc);

    if let Some(timeout) = config.acoustid.timeout() {
        builder = builder.timeout(timeout);
    }
    if let Some(fpcalc) = &config.fingerprint.fpcalc_path {
        builder = builder.fpcalc_command(fpcalc);
    }

    let client = builder.build()?;
    debug!(
        target: "cli",
        backend = client.fingerprinter().backend().name(),
        base_url = %client.endpoints().base(),
        "client ready"
    );
    Ok(client)
}

fn build_fingerprinter(config: &AppConfig, length: Option<u32>) -> FileFingerprinter {
    let backend = Backend::detect(
        config.fingerprint.force_fpcalc,
        config.fingerprint.fpcalc_path.as_deref(),
    );
    FileFingerprinter::new(backend, length.unwrap_or(config.fingerprint.max_length_secs))
}

fn report_failure(path: &Path, err: &AcoustidError) {
    if err.is_fingerprint_generation() {
        eprintln!("{}: fingerprint could not be calculated: {}", path.display(), err);
    } else {
        eprintln!("{}: web service request failed: {}", path.display(), err);
    }
}

async fn run_match(
    client: &AcoustidClient,
    meta: &str,
    files: &[PathBuf],
    out: &mut impl Write,
) -> Result<bool> {
    let mut succeeded = true;
    let mut first = true;

    for path in files {
        match client.match_file(path, meta).await {
            Ok(matches) => {
                info!(target: "cli", path = %path.display(), matches = matches.len(), "matched");
                for m in &matches {
                    if !first {
                        writeln!(out)?;
                    }
                    first = false;
                    write_match(out, m)?;
                }
            }
            Err(e) => {
                report_failure(path, &e);
                succeeded = false;
            }
        }
    }

    Ok(succeeded)
}

fn write_match(out: &mut impl Write, m: &LookupMatch) -> io::Result<()> {
    writeln!(
        out,
        "{} - {}",
        m.artists.as_deref().unwrap_or("Unknown Artist"),
        m.title.as_deref().unwrap_or("Unknown Title")
    )?;
    writeln!(out, "https://musicbrainz.org/recording/{}", m.recording_id)?;
    writeln!(out, "Score: {}%", (m.score * 100.0) as i64)
}

async fn run_fpcalc(
    fingerprinter: &FileFingerprinter,
    files: &[PathBuf],
    out: &mut impl Write,
) -> Result<bool> {
    let mut succeeded = true;
    let mut first = true;

    for path in files {
        match fingerprinter.fingerprint_file(path).await {
            Ok(fp) => {
                if !first {
                    writeln!(out)?;
                }
                first = false;
                write_fpcalc(out, path, &fp)?;
            }
            Err(e) => {
                debug!(target: "cli", path = %path.display(), error = %e, "fingerprinting failed");
                eprintln!(
                    "ERROR: unable to calculate fingerprint for file {}, skipping",
                    path.display()
                );
                succeeded = false;
            }
        }
    }

    Ok(succeeded)
}

fn write_fpcalc(out: &mut impl Write, path: &Path, fp: &Fingerprint) -> io::Result<()> {
    writeln!(out, "FILE={}", path.display())?;
    writeln!(out, "DURATION={}", fp.duration_secs())?;
    writeln!(out, "FINGERPRINT={}", fp.fingerprint)
}

async fn run_submit(
    client: &AcoustidClient,
    user_key: &str,
    mbid: Option<&str>,
    files: &[PathBuf],
    out: &mut impl Write,
) -> Result<bool> {
    let mut succeeded = true;
    let mut records = Vec::with_capacity(files.len());

    for path in files {
        match client.fingerprint_file(path).await {
            Ok(fp) => {
                let record = SubmissionRecord::from_fingerprint(&fp);
                records.push(match mbid {
                    Some(mbid) => record.mbid(mbid),
                    None => record,
                });
            }
            Err(e) => {
                report_failure(path, &e);
                succeeded = false;
            }
        }
    }

    if records.is_empty() {
        return Ok(false);
    }

    let response = client.submit(user_key, &records).await?;
    for submission in parse_submissions(response)? {
        writeln!(out, "submission {}: {}", submission.id, submission.status)?;
    }

    Ok(succeeded)
}

async fn run_tracks(client: &AcoustidClient, mbids: &[String], out: &mut impl Write) -> Result<bool> {
    if let [mbid] = mbids {
        for track in client.track_by_mbid(mbid).await? {
            writeln!(out, "{}", track)?;
        }
        return Ok(true);
    }

    let mbids: Vec<&str> = mbids.iter().map(String::as_str).collect();
    let tracks = client.tracks_by_mbids(&mbids).await?;
    for mbid in mbids {
        writeln!(out, "{}:", mbid)?;
        for track in tracks.get(mbid).into_iter().flatten() {
            writeln!(out, "  {}", track)?;
        }
    }

    Ok(true)
}
