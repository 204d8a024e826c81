use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pointctl", about = "Points ledger and review approval back office")]
pub struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "POINTCTL_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Username of the bootstrap admin account, created on startup if absent
    pub admin_username: String,
    pub cors: CorsConfig,
    pub sweep: SweepConfig,
    pub url_check: UrlCheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; "*" for any
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Run the periodic auto-refund sweep in this process
    pub enabled: bool,
    /// Time between sweep attempts
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Maximum candidates per sweep run
    pub batch_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlCheckConfig {
    /// Per-request timeout for URL liveness probes
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/pointctl".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            admin_username: "admin".to_string(),
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
            },
            sweep: SweepConfig {
                enabled: true,
                interval: Duration::from_secs(3600),
                batch_size: 500,
            },
            url_check: UrlCheckConfig {
                timeout: Duration::from_secs(10),
            },
        }
    }
}

impl Config {
    /// Defaults, overridden by the YAML file (if given), overridden by
    /// POINTCTL_* environment variables.
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = &args.config {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed("POINTCTL_").split("__")).extract()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
