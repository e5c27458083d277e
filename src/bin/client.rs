//! runstat-client: key holder tooling
//!
//! Generates key sets, packs and encrypts recorded runs for upload, and
//! decrypts the statistics the server returns.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use runstat::keys::{generate_key_blobs, validate_key_id, DirectoryStore, KeyStore};
use runstat::scheme::sim::SimScheme;
use runstat::scheme::ClientScheme;
use runstat::telemetry::CalendarBuckets;
use runstat::{DerivedBlobs, RunBlobs, RunReport, RunTrace, SchemeParams};

const SECRET_KEY_FILE: &str = "secret.key";
const PUBLIC_KEY_FILE: &str = "public.key";
const KEYSET_FILE: &str = "keyset.json";

#[derive(Parser)]
#[command(name = "runstat-client")]
#[command(about = "Key generation, run encryption and report decryption")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a key set and upload its evaluation keys
    Keygen {
        /// Key set id; names the remote container
        #[arg(long)]
        key_id: String,

        /// Directory receiving the secret and public keys
        #[arg(long, default_value = "runstat_client")]
        out_dir: PathBuf,

        /// Directory-backed remote key store to upload to
        #[arg(long, default_value = "runstat_keys")]
        remote_dir: PathBuf,

        /// Slot count; run encryption needs 4096
        #[arg(long, default_value = "4096")]
        slots: usize,
    },

    /// Pack and encrypt a recorded run into a stats request body
    EncryptRun {
        /// Run trace JSON
        #[arg(long)]
        trace: PathBuf,

        /// Directory written by `keygen`
        #[arg(long, default_value = "runstat_client")]
        key_dir: PathBuf,

        /// Output request JSON
        #[arg(long, default_value = "run_request.json")]
        out: PathBuf,
    },

    /// Decrypt a stats response and print the run report
    DecryptReport {
        /// Stats response JSON
        #[arg(long)]
        response: PathBuf,

        /// Directory written by `keygen`
        #[arg(long, default_value = "runstat_client")]
        key_dir: PathBuf,
    },
}

/// Key set metadata kept next to the keys
#[derive(Debug, Serialize, Deserialize)]
struct KeySetInfo {
    key_id: String,
    params: SchemeParams,
}

/// Body accepted by `POST /runs/stats`
#[derive(Debug, Serialize)]
struct StatsRequestBody<'a> {
    key_id: &'a str,
    #[serde(flatten)]
    run: &'a RunBlobs,
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn load_keyset(key_dir: &Path) -> Result<(KeySetInfo, SimScheme)> {
    let info: KeySetInfo = read_json(&key_dir.join(KEYSET_FILE))?;
    info.params
        .validate()
        .map_err(|e| eyre::eyre!("Invalid parameters in key set: {}", e))?;
    let scheme = SimScheme::new(info.params.clone());
    Ok((info, scheme))
}

fn keygen(key_id: &str, out_dir: &Path, remote_dir: &Path, slots: usize) -> Result<()> {
    validate_key_id(key_id)?;

    let params = match slots {
        256 => SchemeParams::slots_256(),
        4096 => SchemeParams::slots_4096(),
        _ => {
            return Err(eyre::eyre!(
                "Invalid slot count: {}. Must be 256 or 4096",
                slots
            ));
        }
    };
    params
        .validate()
        .map_err(|e| eyre::eyre!("Invalid parameters: {}", e))?;
    // Smaller sets can evaluate but never receive an encrypted run
    CalendarBuckets::check_layout(&params.layout())
        .map_err(|e| eyre::eyre!("Run encryption needs 4096 slots, got {} ({})", slots, e))?;

    info!("Key id: {}", key_id);
    info!("Slots: {}, ring dimension: {}", params.slot_count, params.ring_dim());

    let start = Instant::now();
    let scheme = SimScheme::new(params.clone());

    let pb = spinner("Generating keys...")?;
    let (sk, pk) = scheme.keygen()?;
    let blobs = generate_key_blobs(&scheme, &sk)?;
    pb.finish_with_message(format!("Keys generated in {:.2?}", start.elapsed()));

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    fs::write(out_dir.join(SECRET_KEY_FILE), scheme.save_secret_key(&sk)?)
        .with_context(|| "Failed to write secret key")?;
    fs::write(out_dir.join(PUBLIC_KEY_FILE), scheme.save_public_key(&pk)?)
        .with_context(|| "Failed to write public key")?;
    write_json(
        &out_dir.join(KEYSET_FILE),
        &KeySetInfo {
            key_id: key_id.to_string(),
            params,
        },
    )?;

    let pb = spinner("Uploading evaluation keys...")?;
    // Uploads go straight to the remote; the cache root is never touched
    let store = KeyStore::new(
        out_dir.join(".cache"),
        Box::new(DirectoryStore::new(remote_dir)),
    );
    store.upload(key_id, &blobs)?;
    pb.finish_with_message("Evaluation keys uploaded");

    println!();
    println!("=== Key set ready ===");
    println!("Key id:      {}", key_id);
    println!("Keys:        {}", out_dir.display());
    println!("Remote:      {}", remote_dir.join(key_id).display());
    println!("Elapsed:     {:.2?}", start.elapsed());
    Ok(())
}

fn encrypt_run(trace_path: &Path, key_dir: &Path, out: &Path) -> Result<()> {
    let (keyset, scheme) = load_keyset(key_dir)?;
    let pk_bytes = fs::read(key_dir.join(PUBLIC_KEY_FILE))
        .with_context(|| "Failed to read public key")?;
    let pk = scheme.load_public_key(&pk_bytes)?;

    let trace: RunTrace = read_json(trace_path)?;
    info!(
        "Run on {} with {} samples, {} motion readings",
        trace.date,
        trace.samples.len(),
        trace.motion.len()
    );

    let pb = spinner("Encrypting run...")?;
    let run = trace
        .encrypt(&scheme, &pk)
        .with_context(|| "Failed to encrypt run")?;
    pb.finish_with_message("Run encrypted");

    write_json(
        out,
        &StatsRequestBody {
            key_id: &keyset.key_id,
            run: &run,
        },
    )?;
    info!("Wrote request to {}", out.display());
    Ok(())
}

fn decrypt_report(response: &Path, key_dir: &Path) -> Result<()> {
    let (_, scheme) = load_keyset(key_dir)?;
    let sk_bytes = fs::read(key_dir.join(SECRET_KEY_FILE))
        .with_context(|| "Failed to read secret key")?;
    let sk = scheme.load_secret_key(&sk_bytes)?;

    // Extra response fields such as timing are ignored
    let derived: DerivedBlobs = read_json(response)?;
    let report = RunReport::decrypt(&scheme, &sk, &derived)
        .with_context(|| "Failed to decrypt run outputs")?;

    println!();
    println!("=== Run report ===");
    match report.date {
        Some(date) => println!("Date:        {}", date),
        None => println!("Date:        unknown"),
    }
    println!("Time:        {:.0} s", report.total_time_secs);
    println!("Distance:    {:.3} km", report.total_distance_km);
    println!("Pace:        {:.1} s/km", report.pace_secs_per_km);
    println!("Elevation:   {:.1} m", report.elevation_gain_m);
    println!("Score:       {:.4} (p = {:.3})", report.score, report.probability);
    Ok(())
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    match args.command {
        Command::Keygen {
            key_id,
            out_dir,
            remote_dir,
            slots,
        } => keygen(&key_id, &out_dir, &remote_dir, slots),
        Command::EncryptRun {
            trace,
            key_dir,
            out,
        } => encrypt_run(&trace, &key_dir, &out),
        Command::DecryptReport { response, key_dir } => decrypt_report(&response, &key_dir),
    }
}
