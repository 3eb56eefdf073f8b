use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::vault::{write_private, StorageError};

/// Profile file name in the data directory
pub const PROFILE_FILE: &str = "profile.json";

/// Non-secret account state kept between runs.
///
/// Holds the email/password pair used to re-request an OTP and whether the
/// account has completed OTP verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

pub struct ProfileStore {
    path: PathBuf,
    data: Mutex<ProfileData>,
}

impl ProfileStore {
    /// Open the profile at `path`. A missing file is an empty profile.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&contents)
                .map_err(|e| StorageError::Corrupt(format!("profile: {}", e)))?
        } else {
            ProfileData::default()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn snapshot(&self) -> ProfileData {
        self.data.lock().clone()
    }

    /// The cached email/password pair, if both are present.
    pub fn login_pair(&self) -> Option<(String, String)> {
        let data = self.data.lock();
        match (&data.email, &data.password) {
            (Some(email), Some(password)) => Some((email.clone(), password.clone())),
            _ => None,
        }
    }

    pub fn save_login_pair(&self, email: &str, password: &str) -> Result<(), StorageError> {
        self.update(|d| {
            d.email = Some(email.to_string());
            d.password = Some(password.to_string());
        })
    }

    pub fn is_verified(&self) -> bool {
        self.data.lock().verified
    }

    pub fn set_verified(&self, verified: bool) -> Result<(), StorageError> {
        self.update(|d| d.verified = verified)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let mut data = self.data.lock();
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        *data = ProfileData::default();
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut ProfileData)) -> Result<(), StorageError> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        apply(&mut next);
        self.write(&next)?;
        *data = next;
        Ok(())
    }

    fn write(&self, data: &ProfileData) -> Result<(), StorageError> {
        let io_err = |source: std::io::Error| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        let contents = serde_json::to_string_pretty(data)
            .map_err(|e| StorageError::Corrupt(format!("profile: {}", e)))?;
        write_private(&self.path, contents.as_bytes()).map_err(io_err)?;
        debug!(path = %self.path.display(), "Profile saved");
        Ok(())
    }
}
