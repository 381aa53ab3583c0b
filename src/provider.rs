use alloy::primitives::{
    Address,
    U256,
};
use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;

/// Push notifications a wallet provider may emit. Delivery is best effort; the
/// session also polls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnect { message: String },
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No wallet provider is installed")]
    NotInstalled,
    #[error("Request rejected by the user")]
    UserRejected,
    #[error("Provider does not support {0}")]
    Unsupported(&'static str),
    #[error("Provider request failed: {0}")]
    Rpc(String),
}

/// A wallet that can hand out accounts, read chain state and report changes.
pub trait WalletProvider {
    /// Whatever the user supplies to approve account access.
    type Approval: Send;

    fn is_installed(&self) -> impl Future<Output = bool> + Send;

    fn request_accounts(
        &self,
        approval: Self::Approval,
    ) -> impl Future<Output = Result<Vec<Address>, ProviderError>> + Send;

    fn accounts(
        &self,
    ) -> impl Future<Output = Result<Vec<Address>, ProviderError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, ProviderError>> + Send;

    fn balance(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, ProviderError>> + Send;

    fn revoke_permissions(
        &self,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}
