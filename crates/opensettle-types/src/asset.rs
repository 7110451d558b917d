//! Supported-asset model.
//!
//! An [`Asset`] couples a currency tag with the pricing parameters used to
//! convert a fiat amount into asset units: the USD rate and the flat network
//! fee charged per transfer. Rates live inside a versioned snapshot (see
//! `opensettle-rates`), never in global mutable state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ASSET_SCALE;

/// Canonical asset tag (e.g. "eth", "btc", "usdt"). Lowercase by convention.
pub type AssetId = String;

/// A currency supported for settlement, with its pricing parameters.
///
/// `usd_rate` is the price of one asset unit in USD and must be positive.
/// `network_fee_usd` is the flat per-transfer fee, denominated in USD and
/// converted to asset units at quote time. `scale` is the number of decimal
/// places asset amounts are quoted at for this currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub symbol: String,
    pub usd_rate: Decimal,
    pub network_fee_usd: Decimal,
    pub scale: u32,
}

impl Asset {
    #[must_use]
    pub fn new(
        id: impl Into<AssetId>,
        symbol: impl Into<String>,
        usd_rate: Decimal,
        network_fee_usd: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            usd_rate,
            network_fee_usd,
            scale: DEFAULT_ASSET_SCALE,
        }
    }

    #[must_use]
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }
}
