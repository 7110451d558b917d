//! Cost calculation: fiat intent -> asset-denominated quote.
//!
//! Pure arithmetic over a fixed snapshot. Same snapshot and inputs produce
//! an identical quote, byte for byte. The calculator never reads the clock,
//! never refreshes rates, never touches a ledger.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use opensettle_types::{AssetId, OpensettleError, Result};

use crate::RateTable;

/// The priced cost of a payment intent, in both denominations.
///
/// `total_asset` is the sum of the two rounded parts, so the stored
/// breakdown always adds up exactly: `asset_amount + fee == total_asset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub asset: AssetId,
    /// The fiat principal this quote prices.
    pub usd_amount: Decimal,
    /// Principal in asset units, rounded to the asset's scale.
    pub asset_amount: Decimal,
    /// Flat network fee in asset units, rounded to the asset's scale.
    pub fee: Decimal,
    /// `asset_amount + fee`. The amount the sender's wallet must cover.
    pub total_asset: Decimal,
    /// `usd_amount + network_fee_usd`, exact.
    pub total_usd: Decimal,
    /// Version of the snapshot that priced this quote.
    pub rate_version: u64,
}

/// Converts fiat amounts into asset costs against one rate snapshot.
#[derive(Debug, Clone)]
pub struct CostCalculator {
    rates: Arc<RateTable>,
}

impl CostCalculator {
    #[must_use]
    pub fn new(rates: Arc<RateTable>) -> Self {
        Self { rates }
    }

    /// The snapshot this calculator prices against.
    #[must_use]
    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// Price `usd_amount` USD of `asset_id`.
    ///
    /// # Errors
    /// - `InvalidAmount` if `usd_amount` is zero or negative
    /// - `UnsupportedAsset` if the asset is not in the snapshot
    /// - `Configuration` if the snapshot carries a non-positive rate
    pub fn quote(&self, usd_amount: Decimal, asset_id: &str) -> Result<Quote> {
        if usd_amount <= Decimal::ZERO {
            return Err(OpensettleError::InvalidAmount { amount: usd_amount });
        }
        let asset = self
            .rates
            .get(asset_id)
            .ok_or_else(|| OpensettleError::UnsupportedAsset(asset_id.to_string()))?;
        if asset.usd_rate <= Decimal::ZERO {
            return Err(OpensettleError::Configuration(format!(
                "asset {asset_id} has non-positive rate {}",
                asset.usd_rate
            )));
        }

        let asset_amount = (usd_amount / asset.usd_rate).round_dp(asset.scale);
        let fee = (asset.network_fee_usd / asset.usd_rate).round_dp(asset.scale);

        Ok(Quote {
            asset: asset.id.clone(),
            usd_amount,
            asset_amount,
            fee,
            total_asset: asset_amount + fee,
            total_usd: usd_amount + asset.network_fee_usd,
            rate_version: self.rates.version(),
        })
    }
}
