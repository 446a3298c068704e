/*!
 * bucketferry CLI
 *
 * Copies every object under a prefix of a bucket in another AWS account into a
 * bucket in the caller's account. Exit status: 0 on success, 1 when an object
 * copy failed, 2 for configuration, credential or listing failures.
 */

use anyhow::Context;
use bucketferry::{
    config::{LogLevel, TransferConfig},
    error::{TransferError, EXIT_FATAL, EXIT_SUCCESS},
    logging, CopyOrchestrator, ProgressEvent,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bucketferry")]
#[command(version, about = "Copy objects from another account's S3 bucket into your own", long_about = None)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bucket in the source account
    #[arg(short = 's', long = "source-bucket", value_name = "BUCKET")]
    source_bucket: Option<String>,

    /// Key prefix to copy (empty copies the whole bucket)
    #[arg(short = 'p', long = "prefix", value_name = "PREFIX")]
    prefix: Option<String>,

    /// Bucket in your own account
    #[arg(short = 'd', long = "dest-bucket", value_name = "BUCKET")]
    dest_bucket: Option<String>,

    /// Role in the source account to assume
    #[arg(short = 'r', long = "role-arn", value_name = "ARN")]
    role_arn: Option<String>,

    /// Session label for the assumed role
    #[arg(long = "session-name", value_name = "NAME")]
    session_name: Option<String>,

    /// Multipart chunk size in MiB (minimum 5)
    #[arg(long = "chunk-size-mb", value_name = "MIB")]
    chunk_size_mb: Option<usize>,

    /// AWS region for the destination and STS
    #[arg(long = "region")]
    region: Option<String>,

    /// AWS region of the source bucket, if different
    #[arg(long = "source-region")]
    source_region: Option<String>,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[arg(long = "endpoint", value_name = "URL")]
    endpoint: Option<String>,

    /// Use path-style addressing
    #[arg(long = "path-style")]
    path_style: bool,

    /// Per-operation timeout in seconds
    #[arg(long = "timeout", value_name = "SECONDS")]
    timeout_seconds: Option<u64>,

    /// Log level
    #[arg(long = "log-level", value_enum)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stderr
    #[arg(long = "log-file", value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Verbose logging (same as --log-level debug)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

impl Cli {
    /// Layer the flags over the file configuration
    fn apply(self, mut config: TransferConfig) -> TransferConfig {
        if let Some(bucket) = self.source_bucket {
            config.source_bucket = bucket;
        }
        if let Some(prefix) = self.prefix {
            config.prefix = prefix;
        }
        if let Some(bucket) = self.dest_bucket {
            config.dest_bucket = bucket;
        }
        if let Some(role_arn) = self.role_arn {
            config.role_arn = role_arn;
        }
        if let Some(label) = self.session_name {
            config.session_label = label;
        }
        if let Some(mib) = self.chunk_size_mb {
            config.chunk_size = mib.saturating_mul(1024 * 1024);
        }
        if self.region.is_some() {
            config.region = self.region;
        }
        if self.source_region.is_some() {
            config.source_region = self.source_region;
        }
        if self.endpoint.is_some() {
            config.endpoint = self.endpoint;
        }
        if self.path_style {
            config.force_path_style = true;
        }
        if self.timeout_seconds.is_some() {
            config.timeout_seconds = self.timeout_seconds;
        }
        if let Some(level) = self.log_level {
            config.log_level = level.into();
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
        config.verbose |= self.verbose;
        config
    }
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<TransferError>()
                .map(TransferError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let base_config = match cli.config {
        Some(ref path) => TransferConfig::from_file(path)?,
        None => TransferConfig::default(),
    };
    let config = cli.apply(base_config);

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    config.validate()?;

    let orchestrator = CopyOrchestrator::from_config(config).await;
    let report = orchestrator
        .run_with_progress(|event| match event {
            ProgressEvent::Started {
                index,
                source,
                destination,
            } => println!("[{}] {} -> {}", index, source, destination),
            ProgressEvent::Finished(outcome) if !outcome.is_success() => {
                println!("{}", outcome)
            }
            ProgressEvent::Finished(_) => {}
        })
        .await
        .context("cross-account copy stopped")?;

    println!("{}", report);
    Ok(())
}
