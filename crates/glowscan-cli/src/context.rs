use std::sync::Arc;

use anyhow::{Context as _, Result};
use glowscan_core::auth::{vault_passphrase, EncryptedFileVault, PROFILE_FILE};
use glowscan_core::{ApiClient, AuthGateway, Config, CredentialStore, ProfileStore};

const VAULT_FILE: &str = "credentials.vault";

/// Stores and clients shared by every command.
pub struct Context {
    pub config: Config,
    pub api: ApiClient,
    pub store: Arc<CredentialStore>,
    pub gateway: Arc<AuthGateway>,
}

impl Context {
    pub fn build(config: Config) -> Result<Self> {
        let data_dir = config.data_dir()?;
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;

        let passphrase = vault_passphrase().context("Failed to get the vault passphrase")?;
        let vault = EncryptedFileVault::open(data_dir.join(VAULT_FILE), &passphrase)?;
        let store = Arc::new(CredentialStore::open(Box::new(vault)));
        let profile = Arc::new(ProfileStore::open(data_dir.join(PROFILE_FILE))?);

        let api = ApiClient::new(config.endpoints(), store.clone())?;
        let gateway = Arc::new(AuthGateway::new(api.clone(), store.clone(), profile));

        Ok(Self {
            config,
            api,
            store,
            gateway,
        })
    }
}
