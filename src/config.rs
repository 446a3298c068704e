/*!
 * Configuration types for bucketferry
 */

use crate::credentials::DEFAULT_SESSION_LABEL;
use crate::error::{Result, TransferError};
use crate::storage::{S3StoreConfig, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters of one cross-account copy run
///
/// Every field can come from a TOML file; the CLI overrides individual values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Bucket in the source account
    #[serde(default)]
    pub source_bucket: String,

    /// Key prefix to copy (empty = whole bucket)
    #[serde(default)]
    pub prefix: String,

    /// Bucket in the caller's own account
    #[serde(default)]
    pub dest_bucket: String,

    /// Role in the source account to assume for reads
    #[serde(default)]
    pub role_arn: String,

    /// Session label passed to the identity issuer
    #[serde(default = "default_session_label")]
    pub session_label: String,

    /// Multipart chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Region for the destination client and the identity issuer
    #[serde(default)]
    pub region: Option<String>,

    /// Region of the source bucket, when it differs from `region`
    #[serde(default)]
    pub source_region: Option<String>,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Path-style addressing, needed by most S3-compatible services
    #[serde(default)]
    pub force_path_style: bool,

    /// Per-operation timeout in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            source_bucket: String::new(),
            prefix: String::new(),
            dest_bucket: String::new(),
            role_arn: String::new(),
            session_label: default_session_label(),
            chunk_size: default_chunk_size(),
            region: None,
            source_region: None,
            endpoint: None,
            force_path_style: false,
            timeout_seconds: None,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_session_label() -> String {
    DEFAULT_SESSION_LABEL.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl TransferConfig {
    pub fn new(
        source_bucket: impl Into<String>,
        prefix: impl Into<String>,
        dest_bucket: impl Into<String>,
        role_arn: impl Into<String>,
    ) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            prefix: prefix.into(),
            dest_bucket: dest_bucket.into(),
            role_arn: role_arn.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TransferError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents)
            .map_err(|e| TransferError::Config(format!("Invalid {}: {}", path.display(), e)))
    }

    /// Validate the configuration before any network call is made
    pub fn validate(&self) -> Result<()> {
        for (field, bucket) in [
            ("source_bucket", &self.source_bucket),
            ("dest_bucket", &self.dest_bucket),
        ] {
            if bucket.is_empty() {
                return Err(TransferError::Config(format!("{} is required", field)));
            }
            if !is_valid_bucket_name(bucket) {
                return Err(TransferError::Config(format!(
                    "{} '{}' is not a valid bucket name",
                    field, bucket
                )));
            }
        }

        if self.role_arn.trim().is_empty() {
            return Err(TransferError::Config("role_arn is required".to_string()));
        }

        if self.session_label.trim().is_empty() {
            return Err(TransferError::Config(
                "session_label cannot be empty".to_string(),
            ));
        }

        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(TransferError::Config(format!(
                "chunk_size must be at least {} bytes (5 MiB)",
                MIN_CHUNK_SIZE
            )));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(TransferError::Config(format!(
                "chunk_size cannot exceed {} bytes (5 GiB)",
                MAX_CHUNK_SIZE
            )));
        }

        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(TransferError::Config(
                    "endpoint must start with http:// or https://".to_string(),
                ));
            }
        }

        if self.timeout_seconds == Some(0) {
            return Err(TransferError::Config(
                "timeout_seconds must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Client settings for the source bucket
    pub fn source_store_config(&self) -> S3StoreConfig {
        S3StoreConfig {
            region: self.source_region.clone().or_else(|| self.region.clone()),
            ..self.dest_store_config()
        }
    }

    /// Client settings for the destination bucket
    pub fn dest_store_config(&self) -> S3StoreConfig {
        S3StoreConfig {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            force_path_style: self.force_path_style,
            timeout_seconds: self.timeout_seconds,
        }
    }
}

/// Validate S3 bucket name according to AWS rules
fn is_valid_bucket_name(name: &str) -> bool {
    let len = name.len();
    if !(3..=63).contains(&len) {
        return false;
    }

    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[len - 1]) {
        return false;
    }

    if !bytes
        .iter()
        .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return false;
    }

    if name.contains("..") {
        return false;
    }

    // Cannot be formatted as IP address
    name.parse::<std::net::Ipv4Addr>().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_config() -> TransferConfig {
        TransferConfig::new(
            "source-bucket",
            "logs/2024/",
            "dest-bucket",
            "arn:aws:iam::111122223333:role/SourceReader",
        )
    }

    #[test]
    fn test_default_values() {
        let config = TransferConfig::default();
        assert_eq!(config.session_label, "CrossAccountSession");
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.prefix.is_empty());
        assert!(!config.force_path_style);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut config = valid_config();
        config.source_bucket.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.role_arn = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.session_label.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut config = valid_config();
        config.chunk_size = 1024;
        assert!(config.validate().is_err());

        config.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(config.validate().is_err());

        config.chunk_size = 8 * 1024 * 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let mut config = valid_config();
        config.endpoint = Some("localhost:9000".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bucket_name_validation() {
        assert!(is_valid_bucket_name("my-bucket"));
        assert!(is_valid_bucket_name("my.bucket.123"));
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name("My-Bucket"));
        assert!(!is_valid_bucket_name("-bucket"));
        assert!(!is_valid_bucket_name("my..bucket"));
        assert!(!is_valid_bucket_name("192.168.1.1"));
        assert!(!is_valid_bucket_name("bucket_name"));
    }

    #[test]
    fn test_source_region_falls_back_to_region() {
        let mut config = valid_config();
        config.region = Some("eu-west-1".to_string());
        config.endpoint = Some("http://localhost:9000".to_string());
        assert_eq!(
            config.source_store_config().region.as_deref(),
            Some("eu-west-1")
        );
        assert_eq!(
            config.source_store_config().endpoint.as_deref(),
            Some("http://localhost:9000")
        );

        config.source_region = Some("us-east-2".to_string());
        assert_eq!(
            config.source_store_config().region.as_deref(),
            Some("us-east-2")
        );
        assert_eq!(config.dest_store_config().region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
source_bucket = "partner-exports"
prefix = "daily/"
dest_bucket = "ingest-landing"
role_arn = "arn:aws:iam::111122223333:role/ExportReader"
log_level = "debug"
"#
        )
        .unwrap();

        let config = TransferConfig::from_file(file.path()).unwrap();
        assert_eq!(config.source_bucket, "partner-exports");
        assert_eq!(config.prefix, "daily/");
        assert_eq!(config.session_label, DEFAULT_SESSION_LABEL);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let mut file = NamedTempFile::new().unwrap();
        let mut config = valid_config();
        config.timeout_seconds = Some(30);
        file.write_all(toml::to_string_pretty(&config).unwrap().as_bytes())
            .unwrap();

        assert_eq!(TransferConfig::from_file(file.path()).unwrap(), config);
    }

    #[test]
    fn test_from_missing_file_is_config_error() {
        let err = TransferConfig::from_file(Path::new("/nonexistent/bucketferry.toml"))
            .unwrap_err();
        assert!(matches!(err, TransferError::Config(_)));
    }
}
