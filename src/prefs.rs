use crate::session::Notice;
use alloy::primitives::Address;
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

const INTENT_FILE: &str = "session.json";

pub fn default_state_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".betlink"))
}

/// Marks that the user connected a wallet and expects it back next launch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionIntent {
    pub wallet: String,
    pub account: String,
    pub connected_at: String,
}

impl ConnectionIntent {
    pub fn new(wallet: impl Into<String>, account: Address) -> Self {
        Self {
            wallet: wallet.into(),
            account: account.to_checksum(None),
            connected_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let path = ensure_store(dir.as_ref())?;
        Ok(Self { path })
    }

    pub fn load(&self) -> Result<Option<ConnectionIntent>> {
        let data = fs::read(&self.path).wrap_err("Failed to read session file")?;
        if data.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice::<Option<ConnectionIntent>>(&data)
            .wrap_err("Failed to parse session file JSON")
    }

    pub fn remember(&self, intent: &ConnectionIntent) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(intent).wrap_err("Failed to serialize session")?;
        fs::write(&self.path, json).wrap_err("Failed to write session file")
    }

    pub fn forget(&self) -> Result<()> {
        fs::write(&self.path, b"null").wrap_err("Failed to clear session file")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentUpdate {
    Remember(Address),
    Forget,
}

/// How a session notice changes the remembered connection. Losing the network
/// keeps it; the wallet reporting no accounts drops it.
pub fn intent_update(notice: &Notice) -> Option<IntentUpdate> {
    match notice {
        Notice::Connected(account) | Notice::AccountChanged(account) => {
            Some(IntentUpdate::Remember(*account))
        }
        Notice::SignedOut => Some(IntentUpdate::Forget),
        Notice::ConnectFailed(_)
        | Notice::NotInstalled
        | Notice::NetworkChanged(_)
        | Notice::Disconnected => None,
    }
}

fn ensure_store(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir).wrap_err_with(|| {
            format!("Failed to create state directory {}", dir.display())
        })?;
    }

    let file_path = dir.join(INTENT_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).wrap_err_with(|| {
            format!("Failed to create session file at {:?}", file_path)
        })?;
        file.write_all(b"null")
            .wrap_err("Failed to initialize session file")?;
    }

    Ok(file_path)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "betlink-prefs-{label}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn new__missing_dir__creates_empty_store() {
        // given
        let dir = scratch_dir("create");

        // when
        let store = SessionStore::new(&dir).unwrap();

        // then
        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn remember__then_load__returns_intent() {
        // given
        let store = SessionStore::new(scratch_dir("remember")).unwrap();
        let intent = ConnectionIntent::new("alice", Address::repeat_byte(0x11));

        // when
        store.remember(&intent).unwrap();

        // then
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.wallet, "alice");
        assert_eq!(loaded.account, Address::repeat_byte(0x11).to_checksum(None));
    }

    #[test]
    fn forget__clears_intent() {
        // given
        let store = SessionStore::new(scratch_dir("forget")).unwrap();
        store
            .remember(&ConnectionIntent::new("alice", Address::repeat_byte(1)))
            .unwrap();

        // when
        store.forget().unwrap();

        // then
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn load__corrupt_file__errors() {
        // given
        let store = SessionStore::new(scratch_dir("corrupt")).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();

        // then
        assert!(store.load().is_err());
    }

    #[test]
    fn intent_update__connect_and_account_switch__remember_account() {
        // given
        let account = Address::repeat_byte(0x22);

        // then
        assert_eq!(
            intent_update(&Notice::Connected(account)),
            Some(IntentUpdate::Remember(account))
        );
        assert_eq!(
            intent_update(&Notice::AccountChanged(account)),
            Some(IntentUpdate::Remember(account))
        );
    }

    #[test]
    fn intent_update__no_accounts_reported__forgets() {
        assert_eq!(intent_update(&Notice::SignedOut), Some(IntentUpdate::Forget));
    }

    #[test]
    fn intent_update__network_loss__keeps_intent() {
        assert_eq!(intent_update(&Notice::Disconnected), None);
        assert_eq!(
            intent_update(&Notice::ConnectFailed("network".to_owned())),
            None
        );
    }
}
