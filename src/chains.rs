use crate::types::{Chain, CurrencyKind, PaymentCurrency};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Immutable descriptor for one supported chain. Built once at startup,
/// never mutated.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain: Chain,
    pub name: &'static str,
    pub native_symbol: &'static str,
    pub native_decimals: u8,
    pub explorer_tx_template: &'static str,
    pub payment_tokens: &'static [&'static str],
    pub adapter_names: &'static [&'static str],
}

static CHAIN_TABLE: Lazy<HashMap<Chain, ChainConfig>> = Lazy::new(|| {
    let configs = [
        ChainConfig {
            chain: Chain::Ethereum,
            name: "Ethereum",
            native_symbol: "ETH",
            native_decimals: 18,
            explorer_tx_template: "https://etherscan.io/tx/{hash}",
            payment_tokens: &["ETH", "USDT", "USDC"],
            adapter_names: &["metamask", "trustwallet"],
        },
        ChainConfig {
            chain: Chain::Bnb,
            name: "BNB Smart Chain",
            native_symbol: "BNB",
            native_decimals: 18,
            explorer_tx_template: "https://bscscan.com/tx/{hash}",
            payment_tokens: &["BNB", "USDT", "USDC"],
            adapter_names: &["metamask", "trustwallet"],
        },
        ChainConfig {
            chain: Chain::Polygon,
            name: "Polygon",
            native_symbol: "POL",
            native_decimals: 18,
            explorer_tx_template: "https://polygonscan.com/tx/{hash}",
            payment_tokens: &["POL", "USDT", "USDC"],
            adapter_names: &["metamask", "trustwallet"],
        },
        ChainConfig {
            chain: Chain::Bitcoin,
            name: "Bitcoin",
            native_symbol: "BTC",
            native_decimals: 8,
            explorer_tx_template: "https://mempool.space/tx/{hash}",
            payment_tokens: &["BTC"],
            adapter_names: &["unisat"],
        },
        ChainConfig {
            chain: Chain::Tron,
            name: "Tron",
            native_symbol: "TRX",
            native_decimals: 6,
            explorer_tx_template: "https://tronscan.org/#/transaction/{hash}",
            payment_tokens: &["TRX", "USDT"],
            adapter_names: &["tronlink"],
        },
        ChainConfig {
            chain: Chain::Solana,
            name: "Solana",
            native_symbol: "SOL",
            native_decimals: 9,
            explorer_tx_template: "https://solscan.io/tx/{hash}",
            payment_tokens: &["SOL", "USDT", "USDC"],
            adapter_names: &["phantom", "solflare"],
        },
        ChainConfig {
            chain: Chain::Ton,
            name: "TON",
            native_symbol: "TON",
            native_decimals: 9,
            explorer_tx_template: "https://tonviewer.com/transaction/{hash}",
            payment_tokens: &["TON", "USDT"],
            adapter_names: &["tonkeeper"],
        },
    ];
    configs.into_iter().map(|c| (c.chain, c)).collect()
});

pub fn chain_config(chain: Chain) -> &'static ChainConfig {
    // Every Chain variant has an entry in the table above.
    &CHAIN_TABLE[&chain]
}

pub fn all_chain_configs() -> Vec<&'static ChainConfig> {
    Chain::all().iter().map(|c| chain_config(*c)).collect()
}

pub fn explorer_tx_url(chain: Chain, tx_hash: &str) -> String {
    chain_config(chain)
        .explorer_tx_template
        .replace("{hash}", tx_hash)
}

/// EVM chain ids used for wallet network switching.
pub fn evm_chain_id(chain: Chain) -> Option<u64> {
    match chain {
        Chain::Ethereum => Some(1),
        Chain::Bnb => Some(56),
        Chain::Polygon => Some(137),
        _ => None,
    }
}

/// Stablecoin contract address and decimals for a token on a chain.
/// Native currencies resolve without a contract.
fn token_contract(symbol: &str, chain: Chain) -> Option<(&'static str, u8)> {
    match (symbol, chain) {
        ("USDT", Chain::Ethereum) => Some(("0xdAC17F958D2ee523a2206206994597C13D831ec7", 6)),
        ("USDC", Chain::Ethereum) => Some(("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6)),
        ("USDT", Chain::Bnb) => Some(("0x55d398326f99059fF775485246999027B3197955", 18)),
        ("USDC", Chain::Bnb) => Some(("0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d", 18)),
        ("USDT", Chain::Polygon) => Some(("0xc2132D05D31c914a87C6611C10748AEb04B58e8F", 6)),
        ("USDC", Chain::Polygon) => Some(("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", 6)),
        ("USDT", Chain::Tron) => Some(("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", 6)),
        ("USDT", Chain::Solana) => Some(("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", 6)),
        ("USDC", Chain::Solana) => Some(("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6)),
        ("USDT", Chain::Ton) => Some(("EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs", 6)),
        _ => None,
    }
}

/// Resolve `(token_symbol, chain)` into a payable currency, or `None` when
/// the pair is not accepted on that chain.
pub fn resolve_payment_currency(token_symbol: &str, chain: Chain) -> Option<PaymentCurrency> {
    let config = chain_config(chain);
    let symbol = token_symbol.to_uppercase();
    if !config.payment_tokens.contains(&symbol.as_str()) {
        return None;
    }
    if symbol == config.native_symbol {
        return Some(PaymentCurrency {
            symbol,
            chain,
            kind: CurrencyKind::Native,
            contract_address: None,
            decimals: config.native_decimals,
        });
    }
    let (address, decimals) = token_contract(&symbol, chain)?;
    Some(PaymentCurrency {
        symbol,
        chain,
        kind: CurrencyKind::Token,
        contract_address: Some(address.to_string()),
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_chain_has_config_and_adapters() {
        for chain in Chain::all() {
            let config = chain_config(*chain);
            assert!(!config.adapter_names.is_empty());
            assert!(config.payment_tokens.contains(&config.native_symbol));
        }
    }

    #[test]
    fn test_native_currency_resolution() {
        let eth = resolve_payment_currency("ETH", Chain::Ethereum).unwrap();
        assert_eq!(eth.kind, CurrencyKind::Native);
        assert_eq!(eth.decimals, 18);
        assert!(eth.contract_address.is_none());
    }

    #[test]
    fn test_token_currency_resolution() {
        let usdt = resolve_payment_currency("usdt", Chain::Tron).unwrap();
        assert_eq!(usdt.kind, CurrencyKind::Token);
        assert_eq!(usdt.decimals, 6);
        assert!(usdt.contract_address.unwrap().starts_with('T'));
    }

    #[test]
    fn test_unaccepted_pair_resolves_to_none() {
        assert!(resolve_payment_currency("USDC", Chain::Bitcoin).is_none());
        assert!(resolve_payment_currency("SOL", Chain::Ethereum).is_none());
    }

    #[test]
    fn test_explorer_url() {
        let url = explorer_tx_url(Chain::Bnb, "0xabc");
        assert_eq!(url, "https://bscscan.com/tx/0xabc");
    }
}
