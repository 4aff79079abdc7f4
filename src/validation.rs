use crate::types::Chain;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address must start with 0x")]
    MissingHexPrefix,
    #[error("Address must be exactly 40 hex characters after 0x, got {0}")]
    WrongLength(usize),
    #[error("Address contains non-hexadecimal characters")]
    NonHexCharacters,
    #[error("The zero address cannot receive funds")]
    ZeroAddress,
    #[error("The burn address cannot receive funds")]
    BurnAddress,
    #[error("Address must start with T")]
    MissingTronPrefix,
    #[error("Invalid base58 encoding")]
    InvalidBase58,
    #[error("Address length {0} outside expected range")]
    LengthOutOfRange(usize),
    #[error("Unrecognized address format for {0}")]
    UnrecognizedFormat(String),
}

/// EVM address check used for ETH/BNB/POL recipients. Each failure mode
/// reports its own message so the UI can explain exactly what is wrong.
pub fn validate_evm_address(address: &str) -> Result<(), AddressError> {
    let body = address
        .strip_prefix("0x")
        .ok_or(AddressError::MissingHexPrefix)?;
    if body.len() != 40 {
        return Err(AddressError::WrongLength(body.len()));
    }
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::NonHexCharacters);
    }
    if body.chars().all(|c| c == '0') {
        return Err(AddressError::ZeroAddress);
    }
    if body.chars().all(|c| c.eq_ignore_ascii_case(&'f')) {
        return Err(AddressError::BurnAddress);
    }
    Ok(())
}

pub fn validate_tron_address(address: &str) -> Result<(), AddressError> {
    if !address.starts_with('T') {
        return Err(AddressError::MissingTronPrefix);
    }
    if address.len() != 34 {
        return Err(AddressError::LengthOutOfRange(address.len()));
    }
    bs58::decode(address)
        .into_vec()
        .map_err(|_| AddressError::InvalidBase58)?;
    Ok(())
}

pub fn validate_solana_address(address: &str) -> Result<(), AddressError> {
    if !(32..=44).contains(&address.len()) {
        return Err(AddressError::LengthOutOfRange(address.len()));
    }
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|_| AddressError::InvalidBase58)?;
    if decoded.len() != 32 {
        return Err(AddressError::UnrecognizedFormat("SOL".to_string()));
    }
    Ok(())
}

pub fn validate_ton_address(address: &str) -> Result<(), AddressError> {
    // Friendly form (EQ../UQ.., base64url, 48 chars) or raw `0:<64 hex>`.
    let friendly = address.len() == 48
        && (address.starts_with("EQ") || address.starts_with("UQ"))
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    let raw = address
        .split_once(':')
        .map(|(wc, body)| {
            wc.parse::<i8>().is_ok() && body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
        })
        .unwrap_or(false);
    if friendly || raw {
        Ok(())
    } else {
        Err(AddressError::UnrecognizedFormat("TON".to_string()))
    }
}

pub fn validate_bitcoin_address(address: &str) -> Result<(), AddressError> {
    if address.starts_with("bc1") {
        if !(14..=74).contains(&address.len()) {
            return Err(AddressError::LengthOutOfRange(address.len()));
        }
        return Ok(());
    }
    if address.starts_with('1') || address.starts_with('3') {
        if !(26..=35).contains(&address.len()) {
            return Err(AddressError::LengthOutOfRange(address.len()));
        }
        bs58::decode(address)
            .into_vec()
            .map_err(|_| AddressError::InvalidBase58)?;
        return Ok(());
    }
    Err(AddressError::UnrecognizedFormat("BTC".to_string()))
}

pub fn validate_address(chain: Chain, address: &str) -> Result<(), AddressError> {
    match chain {
        Chain::Ethereum | Chain::Bnb | Chain::Polygon => validate_evm_address(address),
        Chain::Tron => validate_tron_address(address),
        Chain::Solana => validate_solana_address(address),
        Chain::Ton => validate_ton_address(address),
        Chain::Bitcoin => validate_bitcoin_address(address),
    }
}
