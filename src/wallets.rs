use crate::provider::{
    ProviderError,
    ProviderEvent,
    WalletProvider,
};
use alloy::{
    primitives::{
        Address,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
    },
    signers::local::PrivateKeySigner,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".betlink").join("keystores"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// Encrypted JSON keystores in `dir`, sorted by name.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

pub fn decrypt_signer(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<PrivateKeySigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    PrivateKeySigner::from_slice(&secret).map_err(|_| {
        eyre!(
            "Wallet '{}' contained unsupported key material",
            descriptor.name
        )
    })
}

/// Asks for the keystore password on the plain terminal, before the UI starts.
pub fn prompt_unlock(descriptor: &WalletDescriptor) -> Result<String> {
    let prompt = format!(
        "Enter password for wallet '{}' (leave empty to skip): ",
        descriptor.name
    );
    prompt_password(prompt).wrap_err("Failed to read wallet password")
}

#[derive(Debug, Default)]
struct KeystoreState {
    selected: Option<WalletDescriptor>,
    signer: Option<PrivateKeySigner>,
}

/// Wallet provider over a directory of encrypted keystores.
///
/// Unlocking with the keystore password is the approval step; locking again
/// plays the role of revoking the dApp's permissions.
pub struct KeystoreWallet {
    dir: PathBuf,
    rpc: DynProvider,
    state: Mutex<KeystoreState>,
    events: broadcast::Sender<ProviderEvent>,
}

impl KeystoreWallet {
    pub fn new(dir: PathBuf, rpc: DynProvider, preferred: Option<&str>) -> Result<Self> {
        let selected = match preferred {
            Some(name) => Some(find_wallet(&dir, name)?),
            None => list_wallets(&dir)?.into_iter().next(),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            dir,
            rpc,
            state: Mutex::new(KeystoreState {
                selected,
                signer: None,
            }),
            events,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn selected(&self) -> Option<WalletDescriptor> {
        self.lock().selected.clone()
    }

    pub fn signer(&self) -> Option<PrivateKeySigner> {
        self.lock().signer.clone()
    }

    /// Switches to another keystore. An unlocked wallet is locked first.
    pub fn select(&self, name: &str) -> Result<WalletDescriptor> {
        let descriptor = find_wallet(&self.dir, name)?;
        let was_unlocked = {
            let mut state = self.lock();
            if state.selected.as_ref() == Some(&descriptor) {
                return Ok(descriptor);
            }
            state.selected = Some(descriptor.clone());
            state.signer.take().is_some()
        };
        if was_unlocked {
            let _ = self.events.send(ProviderEvent::AccountsChanged(Vec::new()));
        }
        tracing::info!(wallet = %descriptor.name, "selected keystore");
        Ok(descriptor)
    }

    /// Name of the keystore after the selected one, wrapping around.
    pub fn next_wallet_name(&self) -> Result<Option<String>> {
        let wallets = list_wallets(&self.dir)?;
        let current = self.selected().map(|w| w.name);
        let position = current
            .as_ref()
            .and_then(|name| wallets.iter().position(|w| &w.name == name));
        let next = match position {
            Some(idx) => wallets.get((idx + 1) % wallets.len()),
            None => wallets.first(),
        };
        Ok(next.map(|w| w.name.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, KeystoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WalletProvider for KeystoreWallet {
    type Approval = String;

    async fn is_installed(&self) -> bool {
        list_wallets(&self.dir)
            .map(|wallets| !wallets.is_empty())
            .unwrap_or(false)
    }

    async fn request_accounts(
        &self,
        password: String,
    ) -> Result<Vec<Address>, ProviderError> {
        let descriptor = match self.selected() {
            Some(descriptor) => descriptor,
            None => list_wallets(&self.dir)
                .ok()
                .and_then(|wallets| wallets.into_iter().next())
                .ok_or(ProviderError::NotInstalled)?,
        };
        let to_decrypt = descriptor.clone();
        let signer = tokio::task::spawn_blocking(move || {
            decrypt_signer(&to_decrypt, &password)
        })
        .await
        .map_err(|err| ProviderError::Rpc(err.to_string()))?
        .map_err(|err| {
            tracing::warn!(wallet = %descriptor.name, %err, "keystore unlock failed");
            ProviderError::UserRejected
        })?;
        let account = signer.address();
        {
            let mut state = self.lock();
            state.selected = Some(descriptor);
            state.signer = Some(signer);
        }
        let _ = self
            .events
            .send(ProviderEvent::AccountsChanged(vec![account]));
        Ok(vec![account])
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self
            .lock()
            .signer
            .as_ref()
            .map(|signer| vec![signer.address()])
            .unwrap_or_default())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.rpc
            .get_chain_id()
            .await
            .map_err(|err| ProviderError::Rpc(err.to_string()))
    }

    async fn balance(&self, account: Address) -> Result<U256, ProviderError> {
        self.rpc
            .get_balance(account)
            .await
            .map_err(|err| ProviderError::Rpc(err.to_string()))
    }

    async fn revoke_permissions(&self) -> Result<(), ProviderError> {
        let had_signer = self.lock().signer.take().is_some();
        if had_signer {
            let _ = self.events.send(ProviderEvent::AccountsChanged(Vec::new()));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy::providers::ProviderBuilder;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "betlink-wallets-{label}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn offline_rpc() -> DynProvider {
        ProviderBuilder::new()
            .connect_http("http://127.0.0.1:9".parse().unwrap())
            .erased()
    }

    #[test]
    fn list_wallets__only_json_files_sorted_by_name() {
        // given
        let dir = scratch_dir("list");
        fs::write(dir.join("zed.json"), "{}").unwrap();
        fs::write(dir.join("alice.json"), "{}").unwrap();
        fs::write(dir.join("notes.txt"), "ignore me").unwrap();
        fs::create_dir_all(dir.join("nested.json")).unwrap();

        // when
        let wallets = list_wallets(&dir).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "zed"]);
    }

    #[test]
    fn list_wallets__missing_dir__is_empty() {
        let dir = std::env::temp_dir().join("betlink-wallets-does-not-exist");
        assert!(list_wallets(&dir).unwrap().is_empty());
    }

    #[test]
    fn find_wallet__unknown_name__errors() {
        // given
        let dir = scratch_dir("find");
        fs::write(dir.join("alice.json"), "{}").unwrap();

        // when
        let result = find_wallet(&dir, "bob");

        // then
        assert!(result.is_err());
    }

    #[test]
    fn resolve_wallet_dir__expands_tilde() {
        // given
        let home = std::env::var("HOME").unwrap();

        // when
        let dir = resolve_wallet_dir(Some("~/keys")).unwrap();

        // then
        assert_eq!(dir, PathBuf::from(home).join("keys"));
    }

    #[tokio::test]
    async fn request_accounts__undecryptable_keystore__is_rejected() {
        // given
        let dir = scratch_dir("reject");
        fs::write(dir.join("alice.json"), "{\"not\": \"a keystore\"}").unwrap();
        let wallet = KeystoreWallet::new(dir, offline_rpc(), None).unwrap();

        // when
        let result = wallet.request_accounts("hunter2".to_owned()).await;

        // then
        assert!(matches!(result, Err(ProviderError::UserRejected)));
        assert!(wallet.accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn is_installed__empty_dir__is_false() {
        // given
        let dir = scratch_dir("empty");
        let wallet = KeystoreWallet::new(dir, offline_rpc(), None).unwrap();

        // then
        assert!(!wallet.is_installed().await);
        assert!(wallet.selected().is_none());
    }

    #[test]
    fn next_wallet_name__wraps_around() {
        // given
        let dir = scratch_dir("cycle");
        fs::write(dir.join("alice.json"), "{}").unwrap();
        fs::write(dir.join("bob.json"), "{}").unwrap();
        let wallet = KeystoreWallet::new(dir, offline_rpc(), Some("bob")).unwrap();

        // when
        let next = wallet.next_wallet_name().unwrap();

        // then
        assert_eq!(next.as_deref(), Some("alice"));
    }
}
