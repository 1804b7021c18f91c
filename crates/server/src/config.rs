use std::path::PathBuf;

use anyhow::{Context, Result};

/// Everything read from the environment at startup (`spec.md` §6), plus
/// the worker-count knobs SPEC_FULL.md adds. Constructed once in `main`
/// and handed to both planes as a dependency-injected value, per the
/// "process-wide state" design note.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub auth_port: u16,
    pub game_port: u16,
    pub read_buffer_size: Option<usize>,
    pub write_buffer_size: Option<usize>,
    pub jwt_secret: [u8; 32],
    pub auth_workers: usize,
    pub game_workers: usize,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

fn env_required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn env_u16(name: &str) -> Result<u16> {
    env_required(name)?
        .parse()
        .with_context(|| format!("{name} must be a u16"))
}

fn env_usize_opt(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(v) => Ok(Some(v.parse().with_context(|| format!("{name} must be a usize"))?)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("{name} is not valid unicode")),
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl ServerConfig {
    /// Loads every setting `spec.md` names from the environment.
    /// `cert_dir` is the directory the fixed `ca-cert.pem`/`ca-key.pem`
    /// filenames are resolved against (defaults to `.` via the CLI).
    pub fn load(cert_dir: PathBuf) -> Result<Self> {
        let jwt_secret_hex = env_required("JWT_SECRET")?;
        let jwt_secret_bytes =
            hex::decode(&jwt_secret_hex).context("JWT_SECRET must be hex-encoded")?;
        let jwt_secret: [u8; 32] = jwt_secret_bytes
            .try_into()
            .map_err(|v: Vec<u8>| anyhow::anyhow!("JWT_SECRET must decode to 32 bytes, got {}", v.len()))?;

        let nb_workers = std::env::var("NB_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_worker_count);

        Ok(Self {
            auth_port: env_u16("AUTH_PORT")?,
            game_port: env_u16("GAME_PORT")?,
            read_buffer_size: env_usize_opt("READ_BUFFER_SIZE")?,
            write_buffer_size: env_usize_opt("WRITE_BUFFER_SIZE")?,
            jwt_secret,
            auth_workers: env_usize_opt("AUTH_WORKERS")?.unwrap_or(nb_workers),
            game_workers: env_usize_opt("GAME_WORKERS")?.unwrap_or(nb_workers),
            cert_path: cert_dir.join("ca-cert.pem"),
            key_path: cert_dir.join("ca-key.pem"),
        })
    }
}
