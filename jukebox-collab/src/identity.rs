use std::{
    fs, io,
    path::{Path, PathBuf},
};

use jukebox_core::{now_millis, random_base36, to_base36, MemberId};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const IDENTITY_FILE: &str = "identity.json";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Could not access identity file: {0}")]
    Io(#[from] io::Error),
    #[error("Could not serialize identity: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Display name cannot be empty")]
    EmptyName,
}

/// The stable identity of this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: MemberId,
    pub display_name: String,
}

impl Identity {
    /// Generates a new identity, such as `user_lxk2f9a1_k3j9x0`
    pub fn generate() -> Self {
        let stamp = to_base36(now_millis().max(0) as u64);

        Self {
            id: format!("user_{}_{}", stamp, random_base36(6)),
            display_name: format!("User_{stamp}"),
        }
    }
}

/// Issues and persists the identity of this client.
pub struct IdentityProvider {
    path: PathBuf,
    identity: Identity,
}

impl IdentityProvider {
    /// Loads the identity from the data directory, creating one if there is none yet.
    pub fn load_or_create(dir: &Path) -> Result<Self, IdentityError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(IDENTITY_FILE);

        let existing = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<Identity>(&contents)
                .map_err(|e| warn!("Identity file is corrupt, creating a new one: {}", e))
                .ok(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let provider = match existing {
            Some(identity) => Self { path, identity },
            None => {
                let provider = Self {
                    path,
                    identity: Identity::generate(),
                };

                provider.save()?;
                info!("Created identity {}", provider.identity.id);
                provider
            }
        };

        Ok(provider)
    }

    /// The platform data directory, if there is one
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("jukebox"))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn set_display_name(&mut self, name: &str) -> Result<(), IdentityError> {
        let name = name.trim();

        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }

        self.identity.display_name = name.to_string();
        self.save()
    }

    fn save(&self) -> Result<(), IdentityError> {
        let json = serde_json::to_string_pretty(&self.identity)?;
        fs::write(&self.path, json)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{Identity, IdentityProvider};

    #[test]
    fn generated_ids_have_expected_shape() {
        let identity = Identity::generate();
        let parts: Vec<_> = identity.id.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "user");
        assert_eq!(parts[2].len(), 6);
        assert_eq!(identity.display_name, format!("User_{}", parts[1]));
    }

    #[test]
    fn identity_is_stable_across_loads() {
        let dir = tempfile::tempdir().unwrap();

        let first = IdentityProvider::load_or_create(dir.path()).unwrap();
        let second = IdentityProvider::load_or_create(dir.path()).unwrap();

        assert_eq!(first.identity(), second.identity());
    }

    #[test]
    fn display_name_is_persisted() {
        let dir = tempfile::tempdir().unwrap();

        let mut provider = IdentityProvider::load_or_create(dir.path()).unwrap();
        provider.set_display_name("  DJ Test ").unwrap();
        assert!(provider.set_display_name(" ").is_err());

        let reloaded = IdentityProvider::load_or_create(dir.path()).unwrap();
        assert_eq!(reloaded.identity().display_name, "DJ Test");
    }

    #[test]
    fn corrupt_identity_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("identity.json"), "garbage").unwrap();

        let provider = IdentityProvider::load_or_create(dir.path()).unwrap();
        assert!(provider.identity().id.starts_with("user_"));
    }
}
