//! Binding to the deployed `WagerBet` contract.
//!
//! Reads and writes are split into [`BetReader`] and [`BetWriter`] so views and
//! mutation flows can run against an in-memory contract in tests.

use alloy::{
    network::{
        Ethereum,
        EthereumWallet,
    },
    primitives::{
        Address,
        B256,
        U256,
        address,
    },
    providers::{
        DynProvider,
        PendingTransactionBuilder,
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
    sol,
    transports::{
        RpcError,
        TransportErrorKind,
        http::reqwest::Url,
    },
};
use std::future::Future;
use thiserror::Error;

pub const BETTING_CONTRACT_ADDRESS: Address =
    address!("80eCd58D3C6Ffa3e2B598C0a75492e2127D1c72c");
pub const DESTINATION_CHAIN_ID: u64 = 420120001;
pub const DESTINATION_RPC_URL: &str = "https://interop-alpha-1.optimism.io";

// EIP-1193 code for a request the user declined
const USER_REJECTED_CODE: i64 = 4001;

sol! {
    #[sol(rpc)]
    interface WagerBet {
        struct Bet {
            uint256 id;
            uint256 creatorChainId;
            uint256 joinerChainId;
            address creator;
            address joiner;
            address resolver;
            string description;
            uint256 stake;
            address winner;
            uint8 status;
            uint256 expiryTimestamp;
        }

        error CallerNotL2toL2CrossDomainMessenger();
        error InvalidCrossDomainSender();
        error RequiredMessageNotSuccessful(bytes32 msgHash);

        event BetCreated(uint256 indexed id, address indexed creator, string description, uint256 stake, uint256 expiryTimestamp, address resolver);
        event BetExpired(uint256 indexed id);
        event BetJoinedDetailed(uint256 indexed betId, address indexed creator, address indexed joiner, uint256 stake, uint256 joinerChainId, uint8 status);
        event BetResolved(uint256 indexed id, address indexed winner);

        function betCounter() external view returns (uint256);
        function bets(uint256) external view returns (uint256 id, uint256 creatorChainId, uint256 joinerChainId, address creator, address joiner, address resolver, string description, uint256 stake, address winner, uint8 status, uint256 expiryTimestamp);
        function checkAndHandleExpiredBet(uint256 betId) external;
        function createBet(uint256 _destinationChainId, string description, uint256 _expiryTimestamp, address _resolver) external payable returns (bytes32);
        function getActiveBets() external view returns (Bet[] memory);
        function getAllUserBets(address user) external view returns (Bet[] memory);
        function getBetResolver(uint256 betId) external view returns (address);
        function getBetsByCreator(address creator) external view returns (Bet[] memory);
        function getBetsByJoiner(address joiner) external view returns (Bet[] memory);
        function isBetExpired(uint256 betId) external view returns (bool);
        function joinBet(uint256 _destinationChainId, uint256 betId, address creator, address joiner, uint256 stake) external payable returns (bytes32);
        function owner() external view returns (address);
        function resolveBet(uint256 _destinationChainId, uint256 betId, address winner) external returns (bytes32);
    }
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Failed to connect to RPC provider. Please check your internet connection.")]
    Unreachable,
    #[error("invalid RPC url '{0}'")]
    InvalidUrl(String),
    #[error("RPC request failed: {0}")]
    Rpc(String),
    #[error("Transaction rejected by the wallet")]
    Rejected,
    #[error("Contract reverted: {0}")]
    Reverted(String),
    #[error("No unlocked wallet is available to sign the transaction")]
    NoSigner,
}

impl ContractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ContractError::Unreachable | ContractError::Rpc(_))
    }
}

impl From<alloy::contract::Error> for ContractError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(rpc) => classify_rpc(rpc),
            other => ContractError::Rpc(other.to_string()),
        }
    }
}

fn classify_rpc(err: RpcError<TransportErrorKind>) -> ContractError {
    if let Some(payload) = err.as_error_resp() {
        if payload.code == USER_REJECTED_CODE {
            return ContractError::Rejected;
        }
        if payload.message.contains("revert") {
            return ContractError::Reverted(payload.message.to_string());
        }
    }
    ContractError::Rpc(err.to_string())
}

/// One bet record as stored on chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawBet {
    pub id: U256,
    pub creator_chain_id: U256,
    pub joiner_chain_id: U256,
    pub creator: Address,
    pub joiner: Address,
    pub resolver: Address,
    pub description: String,
    pub stake: U256,
    pub winner: Address,
    pub status: u8,
    pub expiry_timestamp: U256,
}

impl From<WagerBet::Bet> for RawBet {
    fn from(bet: WagerBet::Bet) -> Self {
        Self {
            id: bet.id,
            creator_chain_id: bet.creatorChainId,
            joiner_chain_id: bet.joinerChainId,
            creator: bet.creator,
            joiner: bet.joiner,
            resolver: bet.resolver,
            description: bet.description,
            stake: bet.stake,
            winner: bet.winner,
            status: bet.status,
            expiry_timestamp: bet.expiryTimestamp,
        }
    }
}

impl From<WagerBet::betsReturn> for RawBet {
    fn from(bet: WagerBet::betsReturn) -> Self {
        Self {
            id: bet.id,
            creator_chain_id: bet.creatorChainId,
            joiner_chain_id: bet.joinerChainId,
            creator: bet.creator,
            joiner: bet.joiner,
            resolver: bet.resolver,
            description: bet.description,
            stake: bet.stake,
            winner: bet.winner,
            status: bet.status,
            expiry_timestamp: bet.expiryTimestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateBetCall {
    pub destination_chain_id: u64,
    pub description: String,
    pub expiry_timestamp: u64,
    pub resolver: Address,
    pub stake: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinBetCall {
    pub destination_chain_id: u64,
    pub bet_id: U256,
    pub creator: Address,
    pub joiner: Address,
    pub stake: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveBetCall {
    pub destination_chain_id: u64,
    pub bet_id: U256,
    pub winner: Address,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: B256,
}

pub trait BetReader {
    /// Confirms the RPC endpoint answers before a list query is issued.
    fn check_connection(
        &self,
    ) -> impl Future<Output = Result<u64, ContractError>> + Send;

    fn active_bets(
        &self,
    ) -> impl Future<Output = Result<Vec<RawBet>, ContractError>> + Send;

    fn user_bets(
        &self,
        user: Address,
    ) -> impl Future<Output = Result<Vec<RawBet>, ContractError>> + Send;

    fn bets_by_creator(
        &self,
        creator: Address,
    ) -> impl Future<Output = Result<Vec<RawBet>, ContractError>> + Send;

    fn bets_by_joiner(
        &self,
        joiner: Address,
    ) -> impl Future<Output = Result<Vec<RawBet>, ContractError>> + Send;

    fn bet_resolver(
        &self,
        bet_id: U256,
    ) -> impl Future<Output = Result<Address, ContractError>> + Send;

    fn is_bet_expired(
        &self,
        bet_id: U256,
    ) -> impl Future<Output = Result<bool, ContractError>> + Send;

    fn bet(
        &self,
        bet_id: U256,
    ) -> impl Future<Output = Result<RawBet, ContractError>> + Send;

    fn bet_counter(&self) -> impl Future<Output = Result<U256, ContractError>> + Send;
}

/// State-changing calls. Each resolves once the transaction is confirmed.
pub trait BetWriter {
    fn create_bet(
        &self,
        call: CreateBetCall,
    ) -> impl Future<Output = Result<TxOutcome, ContractError>> + Send;

    fn join_bet(
        &self,
        call: JoinBetCall,
    ) -> impl Future<Output = Result<TxOutcome, ContractError>> + Send;

    fn resolve_bet(
        &self,
        call: ResolveBetCall,
    ) -> impl Future<Output = Result<TxOutcome, ContractError>> + Send;

    fn check_expired(
        &self,
        bet_id: U256,
    ) -> impl Future<Output = Result<TxOutcome, ContractError>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractConfig {
    pub rpc_url: String,
    pub address: Address,
    pub chain_id: u64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            rpc_url: DESTINATION_RPC_URL.to_owned(),
            address: BETTING_CONTRACT_ADDRESS,
            chain_id: DESTINATION_CHAIN_ID,
        }
    }
}

#[derive(Clone)]
pub struct AlloyBetContract {
    config: ContractConfig,
    url: Url,
    reader: DynProvider,
    writer: Option<DynProvider>,
}

impl AlloyBetContract {
    pub fn new(config: ContractConfig) -> Result<Self, ContractError> {
        let url: Url = config
            .rpc_url
            .parse()
            .map_err(|_| ContractError::InvalidUrl(config.rpc_url.clone()))?;
        let reader = ProviderBuilder::new().connect_http(url.clone()).erased();
        Ok(Self {
            config,
            url,
            reader,
            writer: None,
        })
    }

    /// A copy of this client that signs transactions with `signer`.
    pub fn with_signer(&self, signer: PrivateKeySigner) -> Self {
        let writer = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.url.clone())
            .erased();
        Self {
            writer: Some(writer),
            ..self.clone()
        }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    /// Read-only RPC handle, shared with the keystore wallet for balances.
    pub fn rpc(&self) -> DynProvider {
        self.reader.clone()
    }

    fn instance(&self) -> WagerBet::WagerBetInstance<DynProvider> {
        WagerBet::new(self.config.address, self.reader.clone())
    }

    fn signed_instance(
        &self,
    ) -> Result<WagerBet::WagerBetInstance<DynProvider>, ContractError> {
        let writer = self.writer.clone().ok_or(ContractError::NoSigner)?;
        Ok(WagerBet::new(self.config.address, writer))
    }
}

async fn confirm(
    pending: PendingTransactionBuilder<Ethereum>,
) -> Result<TxOutcome, ContractError> {
    let tx_hash = *pending.tx_hash();
    tracing::info!(%tx_hash, "transaction submitted, waiting for receipt");
    let receipt = pending
        .get_receipt()
        .await
        .map_err(|err| ContractError::Rpc(err.to_string()))?;
    if !receipt.status() {
        return Err(ContractError::Reverted(format!(
            "transaction {tx_hash} reverted"
        )));
    }
    Ok(TxOutcome { tx_hash })
}

fn into_raw(bets: Vec<WagerBet::Bet>) -> Vec<RawBet> {
    bets.into_iter().map(RawBet::from).collect()
}

impl BetReader for AlloyBetContract {
    async fn check_connection(&self) -> Result<u64, ContractError> {
        self.reader.get_chain_id().await.map_err(|err| {
            tracing::warn!(%err, "RPC pre-check failed");
            ContractError::Unreachable
        })
    }

    async fn active_bets(&self) -> Result<Vec<RawBet>, ContractError> {
        let contract = self.instance();
        let bets = contract.getActiveBets().call().await?;
        Ok(into_raw(bets))
    }

    async fn user_bets(&self, user: Address) -> Result<Vec<RawBet>, ContractError> {
        let contract = self.instance();
        let bets = contract.getAllUserBets(user).call().await?;
        Ok(into_raw(bets))
    }

    async fn bets_by_creator(
        &self,
        creator: Address,
    ) -> Result<Vec<RawBet>, ContractError> {
        let contract = self.instance();
        let bets = contract.getBetsByCreator(creator).call().await?;
        Ok(into_raw(bets))
    }

    async fn bets_by_joiner(
        &self,
        joiner: Address,
    ) -> Result<Vec<RawBet>, ContractError> {
        let contract = self.instance();
        let bets = contract.getBetsByJoiner(joiner).call().await?;
        Ok(into_raw(bets))
    }

    async fn bet_resolver(&self, bet_id: U256) -> Result<Address, ContractError> {
        let contract = self.instance();
        Ok(contract.getBetResolver(bet_id).call().await?)
    }

    async fn is_bet_expired(&self, bet_id: U256) -> Result<bool, ContractError> {
        let contract = self.instance();
        Ok(contract.isBetExpired(bet_id).call().await?)
    }

    async fn bet(&self, bet_id: U256) -> Result<RawBet, ContractError> {
        let contract = self.instance();
        let bet = contract.bets(bet_id).call().await?;
        Ok(RawBet::from(bet))
    }

    async fn bet_counter(&self) -> Result<U256, ContractError> {
        let contract = self.instance();
        Ok(contract.betCounter().call().await?)
    }
}

impl BetWriter for AlloyBetContract {
    async fn create_bet(&self, call: CreateBetCall) -> Result<TxOutcome, ContractError> {
        let contract = self.signed_instance()?;
        let pending = contract
            .createBet(
                U256::from(call.destination_chain_id),
                call.description,
                U256::from(call.expiry_timestamp),
                call.resolver,
            )
            .value(call.stake)
            .send()
            .await?;
        confirm(pending).await
    }

    async fn join_bet(&self, call: JoinBetCall) -> Result<TxOutcome, ContractError> {
        let contract = self.signed_instance()?;
        let pending = contract
            .joinBet(
                U256::from(call.destination_chain_id),
                call.bet_id,
                call.creator,
                call.joiner,
                call.stake,
            )
            .value(call.stake)
            .send()
            .await?;
        confirm(pending).await
    }

    async fn resolve_bet(
        &self,
        call: ResolveBetCall,
    ) -> Result<TxOutcome, ContractError> {
        let contract = self.signed_instance()?;
        let pending = contract
            .resolveBet(
                U256::from(call.destination_chain_id),
                call.bet_id,
                call.winner,
            )
            .send()
            .await?;
        confirm(pending).await
    }

    async fn check_expired(&self, bet_id: U256) -> Result<TxOutcome, ContractError> {
        let contract = self.signed_instance()?;
        let pending = contract.checkAndHandleExpiredBet(bet_id).send().await?;
        confirm(pending).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn contract_config__default__targets_destination_chain() {
        // when
        let config = ContractConfig::default();

        // then
        assert_eq!(config.chain_id, 420120001);
        assert_eq!(
            config.address.to_checksum(None),
            "0x80eCd58D3C6Ffa3e2B598C0a75492e2127D1c72c"
        );
        assert_eq!(config.rpc_url, "https://interop-alpha-1.optimism.io");
    }

    #[test]
    fn new__invalid_url__is_rejected() {
        // given
        let config = ContractConfig {
            rpc_url: "not a url".to_owned(),
            ..ContractConfig::default()
        };

        // when
        let result = AlloyBetContract::new(config);

        // then
        assert!(matches!(result, Err(ContractError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn create_bet__without_signer__fails_before_rpc() {
        // given
        let contract = AlloyBetContract::new(ContractConfig::default()).unwrap();
        let call = CreateBetCall {
            destination_chain_id: DESTINATION_CHAIN_ID,
            description: "Will it rain - Tomorrow in Lisbon".to_owned(),
            expiry_timestamp: 4_102_444_800,
            resolver: Address::repeat_byte(7),
            stake: U256::from(1u64),
        };

        // when
        let result = contract.create_bet(call).await;

        // then
        assert!(matches!(result, Err(ContractError::NoSigner)));
    }

    #[test]
    fn raw_bet__from_abi_struct__copies_every_field() {
        // given
        let bet = WagerBet::Bet {
            id: U256::from(3u64),
            creatorChainId: U256::from(10u64),
            joinerChainId: U256::from(420120001u64),
            creator: Address::repeat_byte(1),
            joiner: Address::ZERO,
            resolver: Address::repeat_byte(2),
            description: "BTC above 100k - by June".to_owned(),
            stake: U256::from(5u64),
            winner: Address::ZERO,
            status: 0,
            expiryTimestamp: U256::from(1_900_000_000u64),
        };

        // when
        let raw = RawBet::from(bet);

        // then
        assert_eq!(raw.id, U256::from(3u64));
        assert_eq!(raw.creator, Address::repeat_byte(1));
        assert_eq!(raw.resolver, Address::repeat_byte(2));
        assert_eq!(raw.status, 0);
        assert_eq!(raw.expiry_timestamp, U256::from(1_900_000_000u64));
    }

    #[test]
    fn contract_error__transient_kinds() {
        assert!(ContractError::Unreachable.is_transient());
        assert!(ContractError::Rpc("timeout".into()).is_transient());
        assert!(!ContractError::Rejected.is_transient());
        assert!(!ContractError::Reverted("nope".into()).is_transient());
    }
}
