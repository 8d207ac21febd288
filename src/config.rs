use crate::services::s3_backend::S3Settings;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub s3: S3Settings,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "HTTP file browser over an S3 bucket")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding index.html (overrides GATEWAY_STATIC_DIR)
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Directory for upload spooling and download staging (overrides GATEWAY_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Bucket name (overrides S3_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Custom S3 endpoint, e.g. a MinIO server (overrides S3_ENDPOINT_URL)
    #[arg(long)]
    pub endpoint_url: Option<String>,
}

impl AppConfig {
    /// Parse CLI args and the process environment into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed args over values from `lookup`.
    ///
    /// Credentials, region and bucket are required; a missing or empty value
    /// is an error.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let required = |name: &str| match var(name) {
            Some(value) => Ok(value),
            None => bail!("missing required environment variable {}", name),
        };

        let env_port = match var("GATEWAY_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing GATEWAY_PORT value `{}`", value))?,
            None => 5000,
        };

        let bucket = match args.bucket {
            Some(bucket) => bucket,
            None => required("S3_BUCKET")?,
        };
        let s3 = S3Settings {
            access_key: required("AWS_ACCESS_KEY")?,
            secret_key: required("AWS_SECRET_KEY")?,
            region: required("AWS_REGION")?,
            bucket,
            endpoint_url: args.endpoint_url.or_else(|| var("S3_ENDPOINT_URL")),
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| var("GATEWAY_HOST"))
                .unwrap_or_else(|| "127.0.0.1".into()),
            port: args.port.unwrap_or(env_port),
            static_dir: args
                .static_dir
                .or_else(|| var("GATEWAY_STATIC_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("static")),
            staging_dir: args
                .staging_dir
                .or_else(|| var("GATEWAY_STAGING_DIR").map(PathBuf::from))
                .unwrap_or_else(env::temp_dir),
            s3,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("AWS_ACCESS_KEY", "AKIDEXAMPLE"),
        ("AWS_SECRET_KEY", "wJalrXUtnFEMIK7MDENG"),
        ("AWS_REGION", "eu-west-1"),
        ("S3_BUCKET", "files"),
    ];

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let cfg = AppConfig::resolve(Args::default(), lookup(&REQUIRED)).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:5000");
        assert_eq!(cfg.static_dir, PathBuf::from("static"));
        assert_eq!(cfg.staging_dir, env::temp_dir());
        assert_eq!(cfg.s3.bucket, "files");
        assert_eq!(cfg.s3.region, "eu-west-1");
        assert!(cfg.s3.endpoint_url.is_none());
    }

    #[test]
    fn args_override_environment() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_PORT", "8080"));
        pairs.push(("GATEWAY_HOST", "0.0.0.0"));
        let args = Args {
            port: Some(9000),
            bucket: Some("other".into()),
            ..Args::default()
        };
        let cfg = AppConfig::resolve(args, lookup(&pairs)).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:9000");
        assert_eq!(cfg.s3.bucket, "other");
    }

    #[test]
    fn missing_or_empty_credentials_are_fatal() {
        let err = AppConfig::resolve(Args::default(), lookup(&REQUIRED[1..])).unwrap_err();
        assert!(err.to_string().contains("AWS_ACCESS_KEY"));

        let mut pairs = REQUIRED.to_vec();
        pairs[2] = ("AWS_REGION", "");
        let err = AppConfig::resolve(Args::default(), lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("AWS_REGION"));
    }

    #[test]
    fn bad_port_is_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_PORT", "eighty"));
        let err = AppConfig::resolve(Args::default(), lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("GATEWAY_PORT"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = AppConfig::resolve(Args::default(), lookup(&REQUIRED)).unwrap();
        let shown = format!("{:?}", cfg);
        assert!(!shown.contains("AKIDEXAMPLE"));
        assert!(!shown.contains("wJalrXUtnFEMIK7MDENG"));
    }
}
