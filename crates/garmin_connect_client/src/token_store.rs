//! On-disk persistence of the Garmin token bundle.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{GarminError, GarminTokens, OAuth1Token, OAuth2Token};

const OAUTH1_FILE: &str = "oauth1_token.json";
const OAUTH2_FILE: &str = "oauth2_token.json";
const DEFAULT_DIR: &str = ".garminconnect";

#[derive(Clone, Debug)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.garminconnect`
    pub fn default_location() -> Result<Self, GarminError> {
        let home = dirs::home_dir()
            .ok_or_else(|| GarminError::TokenStore("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(DEFAULT_DIR)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the bundle. `Ok(None)` when nothing has been stored yet.
    pub fn load(&self) -> Result<Option<GarminTokens>, GarminError> {
        let oauth1_path = self.dir.join(OAUTH1_FILE);
        let oauth2_path = self.dir.join(OAUTH2_FILE);
        if !oauth1_path.exists() || !oauth2_path.exists() {
            return Ok(None);
        }
        let oauth1: OAuth1Token = read_json(&oauth1_path)?;
        let oauth2: OAuth2Token = read_json(&oauth2_path)?;
        Ok(Some(GarminTokens { oauth1, oauth2 }))
    }

    /// Write the bundle, replacing whatever was there.
    pub fn dump(&self, tokens: &GarminTokens) -> Result<(), GarminError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            GarminError::TokenStore(format!("create {}: {e}", self.dir.display()))
        })?;
        write_json(&self.dir.join(OAUTH1_FILE), &tokens.oauth1)?;
        write_json(&self.dir.join(OAUTH2_FILE), &tokens.oauth2)?;
        tracing::debug!(dir = %self.dir.display(), "garmin tokens written");
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, GarminError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| GarminError::TokenStore(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| GarminError::TokenStore(format!("parse {}: {e}", path.display())))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), GarminError> {
    let raw = serde_json::to_string_pretty(value)
        .map_err(|e| GarminError::TokenStore(e.to_string()))?;
    let write_err =
        |e: std::io::Error| GarminError::TokenStore(format!("write {}: {e}", path.display()));
    let mut file = owner_only(fs::OpenOptions::new().write(true).create(true).truncate(true))
        .open(path)
        .map_err(write_err)?;
    // `mode` only applies on creation; tighten files left by older writers.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(write_err)?;
    }
    file.write_all(raw.as_bytes()).map_err(write_err)
}

/// Token files hold live credentials: readable by the owner only.
#[cfg(unix)]
fn owner_only(options: &mut fs::OpenOptions) -> &mut fs::OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600)
}

#[cfg(not(unix))]
fn owner_only(options: &mut fs::OpenOptions) -> &mut fs::OpenOptions {
    options
}
