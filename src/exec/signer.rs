//! Signer port: signing, broadcast, and confirmation lookup.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{AccountId, MarketId, Outcome};
use crate::error::SignerError;

/// A taker order ready for signing, with its assigned sequence number
/// and fee ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub account: AccountId,
    pub sequence: u64,
    pub market_id: MarketId,
    pub side: Outcome,
    pub price: Decimal,
    pub size: Decimal,
    pub base_fee: Decimal,
    pub priority_fee: Decimal,
}

/// Opaque reference to a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHandle(pub String);

impl std::fmt::Display for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TxStatus {
    Pending,
    Confirmed { gas_paid: Decimal },
    Reverted { reason: String },
}

/// Port to the signing and broadcast infrastructure. Live execution
/// goes through this trait; dry run never constructs an implementation.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// The next usable sequence number for the account, from the
    /// authoritative on-chain view.
    async fn account_sequence(&self, account: &AccountId) -> Result<u64, SignerError>;

    /// Current network base fee.
    async fn base_fee(&self) -> Result<Decimal, SignerError>;

    async fn sign_and_broadcast(
        &self,
        tx: &UnsignedTransaction,
    ) -> Result<TxHandle, SignerError>;

    async fn transaction_status(&self, handle: &TxHandle) -> Result<TxStatus, SignerError>;
}
