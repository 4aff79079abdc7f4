pub mod api;
pub mod chains;
pub mod distribution;
pub mod execution;
pub mod pricing;
pub mod session;
pub mod types;
pub mod validation;
pub mod wallets;

pub use chains::{chain_config, resolve_payment_currency};
pub use execution::TransactionEngine;
pub use pricing::{PriceService, PriceServiceConfig};
pub use session::{ReconnectPolicy, SessionManager, SessionStatus};
pub use types::{Chain, CurrencyKind, PaymentCurrency, TransactionResult, TxErrorKind};
pub use validation::validate_address;
pub use wallets::{AdapterRegistry, ProviderRegistry, WalletAdapter};
