//! In-memory stand-ins for the wallet provider and the betting contract.

use crate::{
    contract::{
        BetReader,
        BetWriter,
        ContractError,
        CreateBetCall,
        JoinBetCall,
        RawBet,
        ResolveBetCall,
        TxOutcome,
    },
    provider::{
        ProviderError,
        ProviderEvent,
        WalletProvider,
    },
};
use alloy::primitives::{
    Address,
    B256,
    U256,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::broadcast;

/// Far-future expiry (2100-01-01).
pub const SAMPLE_EXPIRY: u64 = 4_102_444_800;

pub fn sample_bet(
    id: u64,
    creator: Address,
    description: &str,
    stake: U256,
    status: u8,
) -> RawBet {
    RawBet {
        id: U256::from(id),
        creator_chain_id: U256::from(crate::contract::DESTINATION_CHAIN_ID),
        joiner_chain_id: U256::ZERO,
        creator,
        joiner: Address::ZERO,
        resolver: Address::repeat_byte(0xee),
        description: description.to_owned(),
        stake,
        winner: Address::ZERO,
        status,
        expiry_timestamp: U256::from(SAMPLE_EXPIRY),
    }
}

#[derive(Debug)]
pub struct FakeWalletState {
    pub installed: bool,
    /// `None` makes `accounts()` fail.
    pub accounts: Option<Vec<Address>>,
    pub grant: Vec<Address>,
    pub reject: bool,
    /// `None` makes `chain_id()` fail.
    pub chain_id: Option<u64>,
    pub balances: HashMap<Address, U256>,
    pub balance_fails: bool,
    pub revoke_fails: bool,
    pub balance_calls: usize,
    pub revoke_calls: usize,
}

impl Default for FakeWalletState {
    fn default() -> Self {
        Self {
            installed: true,
            accounts: Some(Vec::new()),
            grant: Vec::new(),
            reject: false,
            chain_id: Some(1),
            balances: HashMap::new(),
            balance_fails: false,
            revoke_fails: false,
            balance_calls: 0,
            revoke_calls: 0,
        }
    }
}

#[derive(Clone)]
pub struct FakeWalletProvider {
    state: Arc<Mutex<FakeWalletState>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for FakeWalletProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWalletProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Arc::new(Mutex::new(FakeWalletState::default())),
            events,
        }
    }

    pub fn not_installed() -> Self {
        let provider = Self::new();
        provider.lock().installed = false;
        provider
    }

    pub fn granting(accounts: Vec<Address>) -> Self {
        let provider = Self::new();
        provider.lock().grant = accounts;
        provider
    }

    pub fn state(&self) -> Arc<Mutex<FakeWalletState>> {
        self.state.clone()
    }

    pub fn set_balance(&self, account: Address, wei: U256) {
        self.lock().balances.insert(account, wei);
    }

    /// Changes what polling sees without emitting a push event.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.lock().accounts = Some(accounts);
    }

    pub fn set_chain(&self, chain_id: u64) {
        self.lock().chain_id = Some(chain_id);
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, FakeWalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WalletProvider for FakeWalletProvider {
    type Approval = ();

    async fn is_installed(&self) -> bool {
        self.lock().installed
    }

    async fn request_accounts(&self, _approval: ()) -> Result<Vec<Address>, ProviderError> {
        let mut state = self.lock();
        if !state.installed {
            return Err(ProviderError::NotInstalled);
        }
        if state.reject {
            return Err(ProviderError::UserRejected);
        }
        let granted = state.grant.clone();
        state.accounts = Some(granted.clone());
        Ok(granted)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.lock()
            .accounts
            .clone()
            .ok_or_else(|| ProviderError::Rpc("accounts unavailable".to_owned()))
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.lock()
            .chain_id
            .ok_or_else(|| ProviderError::Rpc("chain id unavailable".to_owned()))
    }

    async fn balance(&self, account: Address) -> Result<U256, ProviderError> {
        let mut state = self.lock();
        state.balance_calls += 1;
        if state.balance_fails {
            return Err(ProviderError::Rpc("balance unavailable".to_owned()));
        }
        Ok(state.balances.get(&account).copied().unwrap_or_default())
    }

    async fn revoke_permissions(&self) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.revoke_calls += 1;
        if state.revoke_fails {
            return Err(ProviderError::Unsupported("wallet_revokePermissions"));
        }
        state.accounts = Some(Vec::new());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submitted {
    Create(CreateBetCall),
    Join(JoinBetCall),
    Resolve(ResolveBetCall),
    CheckExpired(U256),
}

#[derive(Debug, Default)]
pub struct FakeContractState {
    pub bets: Vec<RawBet>,
    pub unreachable: bool,
    /// Reads that fail with a transient RPC error before reads succeed again.
    pub failures_remaining: usize,
    pub read_calls: usize,
    pub now: u64,
    pub reject_writes: bool,
    pub revert_reason: Option<String>,
    pub submitted: Vec<Submitted>,
}

#[derive(Clone, Default)]
pub struct FakeBetContract {
    state: Arc<Mutex<FakeContractState>>,
}

impl FakeBetContract {
    pub fn with_bets(bets: Vec<RawBet>) -> Self {
        let contract = Self::default();
        contract.lock().bets = bets;
        contract
    }

    pub fn state(&self) -> Arc<Mutex<FakeContractState>> {
        self.state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeContractState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&FakeContractState) -> Result<T, ContractError>,
    ) -> Result<T, ContractError> {
        let mut state = self.lock();
        state.read_calls += 1;
        if state.unreachable {
            return Err(ContractError::Unreachable);
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ContractError::Rpc("connection reset".to_owned()));
        }
        f(&state)
    }

    fn select(&self, keep: impl Fn(&RawBet) -> bool) -> Result<Vec<RawBet>, ContractError> {
        self.read(|state| Ok(state.bets.iter().filter(|b| keep(b)).cloned().collect()))
    }

    fn find(&self, bet_id: U256) -> Result<RawBet, ContractError> {
        self.read(|state| {
            state
                .bets
                .iter()
                .find(|b| b.id == bet_id)
                .cloned()
                .ok_or_else(|| ContractError::Reverted("bet does not exist".to_owned()))
        })
    }

    fn write(&self, submitted: Submitted) -> Result<TxOutcome, ContractError> {
        let mut state = self.lock();
        if state.reject_writes {
            return Err(ContractError::Rejected);
        }
        if let Some(reason) = state.revert_reason.clone() {
            return Err(ContractError::Reverted(reason));
        }
        state.submitted.push(submitted);
        let nonce = state.submitted.len() as u8;
        Ok(TxOutcome {
            tx_hash: B256::repeat_byte(nonce),
        })
    }
}

impl BetReader for FakeBetContract {
    async fn check_connection(&self) -> Result<u64, ContractError> {
        self.read(|_| Ok(crate::contract::DESTINATION_CHAIN_ID))
    }

    async fn active_bets(&self) -> Result<Vec<RawBet>, ContractError> {
        self.select(|bet| bet.status != 2)
    }

    async fn user_bets(&self, user: Address) -> Result<Vec<RawBet>, ContractError> {
        self.select(|bet| bet.creator == user || bet.joiner == user)
    }

    async fn bets_by_creator(&self, creator: Address) -> Result<Vec<RawBet>, ContractError> {
        self.select(|bet| bet.creator == creator)
    }

    async fn bets_by_joiner(&self, joiner: Address) -> Result<Vec<RawBet>, ContractError> {
        self.select(|bet| bet.joiner == joiner)
    }

    async fn bet_resolver(&self, bet_id: U256) -> Result<Address, ContractError> {
        self.find(bet_id).map(|bet| bet.resolver)
    }

    async fn is_bet_expired(&self, bet_id: U256) -> Result<bool, ContractError> {
        let now = self.lock().now;
        self.find(bet_id)
            .map(|bet| bet.expiry_timestamp <= U256::from(now))
    }

    async fn bet(&self, bet_id: U256) -> Result<RawBet, ContractError> {
        self.find(bet_id)
    }

    async fn bet_counter(&self) -> Result<U256, ContractError> {
        self.read(|state| Ok(U256::from(state.bets.len())))
    }
}

impl BetWriter for FakeBetContract {
    async fn create_bet(&self, call: CreateBetCall) -> Result<TxOutcome, ContractError> {
        self.write(Submitted::Create(call))
    }

    async fn join_bet(&self, call: JoinBetCall) -> Result<TxOutcome, ContractError> {
        self.write(Submitted::Join(call))
    }

    async fn resolve_bet(&self, call: ResolveBetCall) -> Result<TxOutcome, ContractError> {
        self.write(Submitted::Resolve(call))
    }

    async fn check_expired(&self, bet_id: U256) -> Result<TxOutcome, ContractError> {
        self.write(Submitted::CheckExpired(bet_id))
    }
}
