//! RefSeeker Client
//!
//! Command-line client for the job server: submit an extraction, poll its
//! status, and fetch the report.
//!
//! ## Usage
//!
//! ```bash
//! # Submit the sources listed in a JSON file
//! cargo run --bin refseeker-client -- extract sources.json
//!
//! # Poll until the job finishes
//! cargo run --bin refseeker-client -- wait <job_id>
//!
//! # Fetch the report
//! cargo run --bin refseeker-client -- results <job_id> -o result.json
//! ```
//!
//! The sources file holds `{"entries": [{"uri", "user", "password"}, ...]}`.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "refseeker-client", about = "RefSeeker job server client")]
struct Cli {
    /// Job server base URL
    #[arg(long, default_value = "http://127.0.0.1:8001")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the server is up
    Status,
    /// Submit an extraction request from a sources file
    Extract {
        /// JSON file with the sources to extract
        sources: PathBuf,
    },
    /// Poll a job until it leaves the queue
    Wait {
        job_id: String,
        /// Poll interval in seconds
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Fetch the report of a finished job
    Results {
        job_id: String,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    job_id: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::blocking::Client::new();

    match cli.command {
        Command::Status => {
            let response: StatusResponse = client
                .get(format!("{}/status", cli.server))
                .send()
                .context("server unreachable")?
                .json()?;
            println!("{}", response.status);
        }
        Command::Extract { sources } => {
            let body = fs::read_to_string(&sources)
                .with_context(|| format!("cannot read {}", sources.display()))?;
            let payload: serde_json::Value =
                serde_json::from_str(&body).context("sources file is not valid JSON")?;
            let response: ExtractionResponse = client
                .post(format!("{}/extract", cli.server))
                .json(&payload)
                .send()
                .context("server unreachable")?
                .json()?;
            println!("{}", response.job_id);
        }
        Command::Wait { job_id, interval } => loop {
            let response = client
                .get(format!("{}/jobs/{}", cli.server, job_id))
                .send()
                .context("server unreachable")?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                bail!("unknown job: {job_id}");
            }
            let status: StatusResponse = response.json()?;
            println!("{}", status.status);
            if status.status == "finished" || status.status.starts_with("failed") {
                break;
            }
            thread::sleep(Duration::from_secs(interval));
        },
        Command::Results { job_id, output } => {
            let response = client
                .get(format!("{}/jobs/{}/results", cli.server, job_id))
                .send()
                .context("server unreachable")?;
            if !response.status().is_success() {
                let status: StatusResponse = response.json()?;
                bail!("job not finished: {}", status.status);
            }
            let body = response.text()?;
            match output {
                Some(path) => {
                    fs::write(&path, &body)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
                None => println!("{body}"),
            }
        }
    }
    Ok(())
}
