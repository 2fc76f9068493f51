// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Bootstrap shared by the lease-data job binaries: CLI surface, YAML
//! config loading, structured logging, panic reporting, and an optional
//! readiness/metrics endpoint.
//!
//! A job here is a batch run that is expected to finish, not a serving
//! process: the runner returns when the job does, and the observability
//! endpoint (when configured) only lives alongside it. Its early exit is
//! the fault case, not the job's completion.

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    process,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use warp::Filter;

/// Command line surface shared by every job binary.
#[derive(Parser)]
pub struct JobArgs {
    /// Path to the YAML job configuration.
    #[clap(short, long, value_parser)]
    pub config_path: PathBuf,
}

impl JobArgs {
    /// Bootstrap logging and panic reporting, load the config, and drive
    /// the job to completion.
    pub async fn run<J>(&self) -> Result<()>
    where
        J: RunnableJob,
    {
        init_logging();
        install_panic_reporter();
        let config: JobConfig<J> = load_config(&self.config_path)?;
        config.run().await
    }
}

/// A runnable batch job, described entirely by its deserialized
/// configuration.
#[async_trait::async_trait]
pub trait RunnableJob: DeserializeOwned + Send + Sync + 'static {
    async fn run(&self) -> Result<()>;

    /// Short name used in log lines.
    fn job_name(&self) -> String;
}

/// Common wrapper around every job config. The readiness/metrics port is
/// optional; unattended batch runs only need it when something scrapes
/// them.
#[derive(Debug, Deserialize, Serialize)]
pub struct JobConfig<J> {
    #[serde(default)]
    pub health_check_port: Option<u16>,
    pub job: J,
}

impl<J: RunnableJob> JobConfig<J> {
    pub async fn run(&self) -> Result<()> {
        let name = self.job.job_name();
        let port = match self.health_check_port {
            Some(port) => port,
            None => return self.job.run().await,
        };

        info!(job = name.as_str(), port = port, "Serving readiness and metrics");
        let observability = tokio::spawn(serve_probes(port));
        tokio::select! {
            outcome = self.job.run() => outcome,
            joined = observability => {
                error!(job = name.as_str(), "Observability endpoint exited before the job");
                joined.context("Observability task panicked")?;
                anyhow::bail!("Observability endpoint exited before the job")
            },
        }
    }
}

/// Read and parse a YAML config file.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read config at {path:?}"))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Could not parse config at {path:?}"))
}

/// Structured JSON logging, filterable through RUST_LOG (defaults to info).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

/// Make any panic fatal to the whole process, tokio's swallow-and-continue
/// default included, after reporting what happened and where.
pub fn install_panic_reporter() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = backtrace::Backtrace::new();
        error!(panic = %panic_info, "Job panicked, aborting");
        // error! gives no flush guarantee on exit, so mirror to stderr.
        eprintln!("{panic_info}\n{backtrace:?}");
        process::exit(12);
    }));
}

/// Readiness probe plus the prometheus scrape endpoint.
async fn serve_probes(port: u16) {
    let readiness = warp::path("readiness").map(|| "ready");
    let metrics = warp::path("metrics").map(|| {
        let mut buffer = vec![];
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .expect("Failed to encode metrics");
        warp::http::Response::builder()
            .header("Content-Type", "text/plain")
            .body(buffer)
    });
    warp::serve(readiness.or(metrics))
        .run(([0, 0, 0, 0], port))
        .await;
}
