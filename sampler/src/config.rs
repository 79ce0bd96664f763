use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub experiments_dir: PathBuf,
    pub server_host: String,
    pub server_port: u16,
    pub hot_reload: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            experiments_dir: std::env::var("EXPERIMENTS_DIR")
                .unwrap_or_else(|_| "../configs/experiments".to_string())
                .into(),
            server_host: std::env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: std::env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            hot_reload: std::env::var("HOT_RELOAD")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
        })
    }
}
