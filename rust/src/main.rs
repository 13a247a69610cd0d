//! Minimal CLI around the envseal library. File handling lives here; the
//! library itself never touches the filesystem for envelopes.
//!
//! The key is read from the source named in the JSON file at `ENVSEAL_CONFIG`,
//! or from `ENVSEAL_KEY` when no config file is set.

use std::env;
use std::fs;

use envseal::config::{load_config, EnvsealConfig};
use envseal::{bundle, generate_key, inspect, EnvelopeFormat};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "ENVSEAL_CONFIG";

fn print_usage() {
    eprintln!("Commands:\n  generate-key\n  encrypt <plaintext-file>\n  decrypt <envelope-file>\n  keys <envelope-file>\n  inspect <envelope-file>");
}

fn load_settings() -> Result<EnvsealConfig, String> {
    match env::var(CONFIG_ENV) {
        Ok(path) => {
            debug!(path = %path, "loading configuration");
            load_config(&path).map_err(|e| format!("config load failed: {e}"))
        }
        Err(_) => Ok(EnvsealConfig::from_env_defaults()),
    }
}

fn read_file(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("unable to read {path}: {e}"))
}

fn run(args: &[String]) -> Result<(), String> {
    let Some(command) = args.get(1) else {
        print_usage();
        return Ok(());
    };

    match (command.as_str(), args.get(2)) {
        ("generate-key", None) => {
            println!("{}", generate_key());
        }
        ("encrypt", Some(path)) => {
            let settings = load_settings()?;
            let key = settings.key.resolve().map_err(|e| e.to_string())?;
            let plaintext = read_file(path)?;
            let envelope = settings
                .build_codec()
                .encrypt(&plaintext, &key)
                .map_err(|e| format!("encryption failed: {e}"))?;
            println!("{envelope}");
        }
        ("decrypt", Some(path)) => {
            let settings = load_settings()?;
            let key = settings.key.resolve().map_err(|e| e.to_string())?;
            let envelope = read_file(path)?;
            let plaintext = settings
                .build_codec()
                .decrypt(envelope.trim(), &key)
                .map_err(|e| e.to_string())?;
            print!("{plaintext}");
        }
        ("keys", Some(path)) => {
            let settings = load_settings()?;
            let key = settings.key.resolve().map_err(|e| e.to_string())?;
            let envelope = read_file(path)?;
            let entries = bundle::open(&settings.build_codec(), envelope.trim(), &key)
                .map_err(|e| e.to_string())?;
            for name in entries.keys() {
                println!("{name}");
            }
        }
        ("inspect", Some(path)) => {
            let envelope = read_file(path)?;
            let info = inspect(envelope.trim()).map_err(|e| e.to_string())?;
            match info.format {
                EnvelopeFormat::Versioned { created_at_ms } => {
                    println!("format: v1\ncreated_at_ms: {created_at_ms}")
                }
                EnvelopeFormat::Legacy => println!("format: legacy"),
            }
            println!("ciphertext_bytes: {}", info.ciphertext_len);
        }
        _ => print_usage(),
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("envseal=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if let Err(error) = run(&args) {
        eprintln!("envseal: {error}");
        std::process::exit(1);
    }
}
