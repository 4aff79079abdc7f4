pub mod prices;

pub use prices::{create_price_router, PriceApiState};
