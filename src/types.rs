use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Chain {
    Ethereum,
    Bnb,
    Polygon,
    Bitcoin,
    Tron,
    Solana,
    Ton,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Bnb => "BNB",
            Chain::Polygon => "POL",
            Chain::Bitcoin => "BTC",
            Chain::Tron => "TRX",
            Chain::Solana => "SOL",
            Chain::Ton => "TON",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ETH" | "ETHEREUM" => Some(Chain::Ethereum),
            "BNB" | "BSC" => Some(Chain::Bnb),
            "POL" | "MATIC" | "POLYGON" => Some(Chain::Polygon),
            "BTC" | "BITCOIN" => Some(Chain::Bitcoin),
            "TRX" | "TRON" => Some(Chain::Tron),
            "SOL" | "SOLANA" => Some(Chain::Solana),
            "TON" => Some(Chain::Ton),
            _ => None,
        }
    }

    /// EVM-family chains share wallet products and transaction format.
    pub fn is_evm(&self) -> bool {
        matches!(self, Chain::Ethereum | Chain::Bnb | Chain::Polygon)
    }

    pub fn all() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Bnb,
            Chain::Polygon,
            Chain::Bitcoin,
            Chain::Tron,
            Chain::Solana,
            Chain::Ton,
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CurrencyKind {
    Native,
    Token,
}

/// One payable asset on one chain, resolved per purchase attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentCurrency {
    pub symbol: String,
    pub chain: Chain,
    pub kind: CurrencyKind,
    pub contract_address: Option<String>,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxErrorKind {
    WalletNotInstalled,
    UserRejected,
    NetworkMismatch,
    ConnectionTimeout,
    UnsupportedChainOperation,
    TransactionFailed,
    DistributionFailed,
}

/// Normalized outcome of one payment submission. Produced once per
/// `send_payment` call; the caller forwards `tx_hash` to distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub error_kind: Option<TxErrorKind>,
    pub error_message: Option<String>,
}

impl TransactionResult {
    pub fn confirmed(tx_hash: impl Into<String>) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash.into()),
            error_kind: None,
            error_message: None,
        }
    }

    pub fn failed(kind: TxErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }
}

#[derive(Error, Debug)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Token price must be positive, got {0}")]
    NonPositivePrice(Decimal),
    #[error("Amount overflow: {0}")]
    Overflow(String),
}

/// LUTAR amount a buyer receives for a USD entry, rounded to 2 decimals.
pub fn lutar_amount(usd_amount: Decimal, lutar_price: Decimal) -> Result<Decimal, AmountError> {
    if lutar_price <= Decimal::ZERO {
        return Err(AmountError::NonPositivePrice(lutar_price));
    }
    if usd_amount < Decimal::ZERO {
        return Err(AmountError::InvalidAmount(usd_amount.to_string()));
    }
    let raw = usd_amount
        .checked_div(lutar_price)
        .ok_or_else(|| AmountError::Overflow(usd_amount.to_string()))?;
    Ok(raw.round_dp(2))
}

/// Scale a human-readable amount into base units (wei, lamports, sun, ...).
/// The execution engine expects amounts already scaled through here.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<String, AmountError> {
    if amount < Decimal::ZERO {
        return Err(AmountError::InvalidAmount(amount.to_string()));
    }
    let multiplier = Decimal::from(10u64.pow(u32::from(decimals.min(18))));
    let scaled = amount
        .checked_mul(multiplier)
        .ok_or_else(|| AmountError::Overflow(amount.to_string()))?
        .trunc();
    scaled
        .to_u128()
        .map(|v| v.to_string())
        .ok_or_else(|| AmountError::Overflow(amount.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lutar_amount_standard_entry() {
        // 100 USD at 0.004 USD/LUTAR
        let amount = lutar_amount(dec!(100), dec!(0.004)).unwrap();
        assert_eq!(amount, dec!(25000.00));
    }

    #[test]
    fn test_lutar_amount_rounds_to_two_decimals() {
        let amount = lutar_amount(dec!(10), dec!(0.003)).unwrap();
        assert_eq!(amount, dec!(3333.33));
    }

    #[test]
    fn test_lutar_amount_rejects_zero_price() {
        assert!(lutar_amount(dec!(100), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_base_unit_scaling() {
        assert_eq!(to_base_units(dec!(1.5), 18).unwrap(), "1500000000000000000");
        assert_eq!(to_base_units(dec!(2), 6).unwrap(), "2000000");
        assert_eq!(to_base_units(dec!(0.000001), 6).unwrap(), "1");
    }

    #[test]
    fn test_chain_roundtrip() {
        for chain in Chain::all() {
            assert_eq!(Chain::from_str(chain.as_str()), Some(*chain));
        }
        assert_eq!(Chain::from_str("bsc"), Some(Chain::Bnb));
        assert_eq!(Chain::from_str("DOGE"), None);
    }
}
