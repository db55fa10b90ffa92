use anyhow::{
    Context,
    Result,
    anyhow,
    bail,
};
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";
const HOME_DIR_NAME: &str = ".nova-admin";
const SESSION_FILE: &str = "session.json";
const LOG_DIR: &str = "logs";

/// Validates the admin API base URL. Only plain HTTP(S) endpoints are accepted.
pub fn parse_api_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Invalid API URL {raw:?}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("API URL must use http or https, got {other:?}"),
    }
}

pub fn default_home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| anyhow!("HOME environment variable not set"))?;
    Ok(PathBuf::from(home).join(HOME_DIR_NAME))
}

pub fn default_session_file() -> Result<PathBuf> {
    Ok(default_home_dir()?.join(SESSION_FILE))
}

pub fn default_log_dir() -> Result<PathBuf> {
    Ok(default_home_dir()?.join(LOG_DIR))
}

/// Expands a leading `~`; falls back to `default` when no path was given.
pub fn resolve_path(raw: Option<&str>, default: fn() -> Result<PathBuf>) -> Result<PathBuf> {
    match raw {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default(),
    }
}
