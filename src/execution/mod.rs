pub mod fees;

pub use fees::{FeeEstimate, FeeEstimator};

use crate::chains::evm_chain_id;
use crate::types::{Chain, CurrencyKind, PaymentCurrency, TransactionResult, TxErrorKind};
use crate::validation::validate_address;
use crate::wallets::{PaymentPayload, WalletAdapter};
use alloy_primitives::{Address, U256};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Token currency {0} has no contract address")]
    MissingContract(String),
}

/// One payment submission. The amount is already scaled to base units by
/// the caller; this layer never rescales.
pub struct ExecutionRequest {
    pub currency: PaymentCurrency,
    pub amount_base_units: String,
    pub from_address: String,
    pub destination: String,
    pub adapter: Arc<dyn WalletAdapter>,
}

/// Dispatches a resolved payment to the chain-appropriate builder and
/// submits it through the connected adapter. Every branch returns a
/// normalized `TransactionResult`; nothing escapes as an error.
pub struct TransactionEngine;

impl TransactionEngine {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, request), fields(chain = request.currency.chain.as_str(), token = %request.currency.symbol))]
    pub async fn execute(&self, request: ExecutionRequest) -> TransactionResult {
        if request.currency.chain == Chain::Bitcoin {
            // UTXO selection is outside the injected-wallet pattern.
            return TransactionResult::failed(
                TxErrorKind::UnsupportedChainOperation,
                "Bitcoin payments are not supported; pick another chain to pay on",
            );
        }
        if let Err(err) = validate_address(request.currency.chain, &request.destination) {
            return TransactionResult::failed(
                TxErrorKind::TransactionFailed,
                format!("Invalid destination address: {err}"),
            );
        }
        let payload = match self.build_payload(&request) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Payment build failed: {}", err);
                return TransactionResult::failed(TxErrorKind::TransactionFailed, err.to_string());
            }
        };
        let result = request.adapter.send_payment(payload).await;
        if result.success {
            info!(
                "Payment of {} {} confirmed: {:?}",
                request.amount_base_units, request.currency.symbol, result.tx_hash
            );
        }
        result
    }

    fn build_payload(&self, request: &ExecutionRequest) -> Result<PaymentPayload, ExecutionError> {
        let currency = &request.currency;
        match currency.chain {
            Chain::Ethereum | Chain::Bnb | Chain::Polygon => self.build_evm_payload(request),
            Chain::Tron => self.build_tron_payload(request),
            Chain::Solana => Ok(PaymentPayload::SolanaTransfer {
                from: request.from_address.clone(),
                to: request.destination.clone(),
                amount: parse_u64_amount(&request.amount_base_units)?,
                token_mint: currency.contract_address.clone(),
            }),
            Chain::Ton => Ok(PaymentPayload::TonTransfer {
                from: request.from_address.clone(),
                to: request.destination.clone(),
                nanotons: parse_u64_amount(&request.amount_base_units)?,
                jetton_master: currency.contract_address.clone(),
            }),
            Chain::Bitcoin => unreachable!("handled before dispatch"),
        }
    }

    fn build_evm_payload(&self, request: &ExecutionRequest) -> Result<PaymentPayload, ExecutionError> {
        let currency = &request.currency;
        let amount = U256::from_str_radix(&request.amount_base_units, 10)
            .map_err(|_| ExecutionError::InvalidAmount(request.amount_base_units.clone()))?;
        let chain_id = evm_chain_id(currency.chain).unwrap_or(1);

        match currency.kind {
            CurrencyKind::Native => Ok(PaymentPayload::EvmTransaction {
                from: request.from_address.clone(),
                to: request.destination.clone(),
                value_hex: format!("0x{amount:x}"),
                data_hex: None,
                chain_id,
            }),
            CurrencyKind::Token => {
                let contract = currency
                    .contract_address
                    .as_deref()
                    .ok_or_else(|| ExecutionError::MissingContract(currency.symbol.clone()))?;
                let recipient = Address::from_str(&request.destination)
                    .map_err(|e| ExecutionError::InvalidAddress(e.to_string()))?;
                Ok(PaymentPayload::EvmTransaction {
                    from: request.from_address.clone(),
                    to: contract.to_string(),
                    value_hex: "0x0".to_string(),
                    data_hex: Some(encode_erc20_transfer(&recipient, amount)),
                    chain_id,
                })
            }
        }
    }

    fn build_tron_payload(&self, request: &ExecutionRequest) -> Result<PaymentPayload, ExecutionError> {
        let currency = &request.currency;
        let amount = parse_u64_amount(&request.amount_base_units)?;
        match currency.kind {
            CurrencyKind::Native => Ok(PaymentPayload::TronNativeTransfer {
                from: request.from_address.clone(),
                to: request.destination.clone(),
                amount_sun: amount,
            }),
            CurrencyKind::Token => {
                let contract = currency
                    .contract_address
                    .clone()
                    .ok_or_else(|| ExecutionError::MissingContract(currency.symbol.clone()))?;
                Ok(PaymentPayload::TronTokenTransfer {
                    from: request.from_address.clone(),
                    contract,
                    to: request.destination.clone(),
                    amount,
                })
            }
        }
    }
}

impl Default for TransactionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_u64_amount(amount: &str) -> Result<u64, ExecutionError> {
    amount
        .parse::<u64>()
        .map_err(|_| ExecutionError::InvalidAmount(amount.to_string()))
}

/// ABI-encode `transfer(address,uint256)` the way the wallet expects it:
/// 4-byte selector plus two 32-byte padded words.
fn encode_erc20_transfer(recipient: &Address, amount: U256) -> String {
    let mut data = String::from("0xa9059cbb");
    data.push_str(&format!("{:0>64}", hex::encode(recipient.as_slice())));
    data.push_str(&format!("{:0>64}", format!("{amount:x}")));
    data
}
