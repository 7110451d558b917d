//! Versioned rate snapshots.
//!
//! A [`RateTable`] is an immutable snapshot of the supported-asset set with
//! their USD rates and flat network fees. Components that price payments are
//! handed a snapshot explicitly; nothing reads rates from global state. A new
//! snapshot is a new value with a higher version, and every quote records the
//! version that priced it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opensettle_types::{Asset, AssetId};

/// An immutable, versioned snapshot of supported assets and their pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    version: u64,
    published_at: DateTime<Utc>,
    assets: HashMap<AssetId, Asset>,
}

impl RateTable {
    #[must_use]
    pub fn new(version: u64, assets: impl IntoIterator<Item = Asset>) -> Self {
        Self {
            version,
            published_at: Utc::now(),
            assets: assets
                .into_iter()
                .map(|asset| (asset.id.clone(), asset))
                .collect(),
        }
    }

    /// Monotonically increasing snapshot version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Look up an asset by its canonical tag.
    #[must_use]
    pub fn get(&self, asset_id: &str) -> Option<&Asset> {
        self.assets.get(asset_id)
    }

    #[must_use]
    pub fn contains(&self, asset_id: &str) -> bool {
        self.assets.contains_key(asset_id)
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Dummy snapshot for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl RateTable {
    /// Version-1 snapshot: eth @ 2800 (fee 8.50), btc @ 65000 (fee 12),
    /// usdt @ 1 (fee 1, scale 6), sol @ 150 (fee 0.80).
    pub fn dummy() -> Self {
        use rust_decimal::Decimal;
        Self::new(
            1,
            [
                Asset::new("eth", "ETH", Decimal::new(2800, 0), Decimal::new(850, 2)),
                Asset::new("btc", "BTC", Decimal::new(65000, 0), Decimal::new(12, 0)),
                Asset::new("usdt", "USDT", Decimal::ONE, Decimal::ONE).with_scale(6),
                Asset::new("sol", "SOL", Decimal::new(150, 0), Decimal::new(80, 2)),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn lookup_by_tag() {
        let table = RateTable::dummy();
        let eth = table.get("eth").unwrap();
        assert_eq!(eth.symbol, "ETH");
        assert_eq!(eth.usd_rate, Decimal::new(2800, 0));
        assert_eq!(eth.network_fee_usd, Decimal::new(850, 2));
    }

    #[test]
    fn missing_asset_is_none() {
        let table = RateTable::dummy();
        assert!(table.get("doge").is_none());
        assert!(!table.contains("doge"));
    }

    #[test]
    fn version_and_size() {
        let table = RateTable::dummy();
        assert_eq!(table.version(), 1);
        assert_eq!(table.len(), 4);
        assert!(!table.is_empty());
    }

    #[test]
    fn later_snapshot_replaces_not_mutates() {
        let v1 = RateTable::dummy();
        let v2 = RateTable::new(
            2,
            [Asset::new(
                "eth",
                "ETH",
                Decimal::new(3100, 0),
                Decimal::new(850, 2),
            )],
        );
        assert_eq!(v1.get("eth").unwrap().usd_rate, Decimal::new(2800, 0));
        assert_eq!(v2.get("eth").unwrap().usd_rate, Decimal::new(3100, 0));
        assert!(v2.version() > v1.version());
    }

    #[test]
    fn serde_roundtrip() {
        let table = RateTable::dummy();
        let json = serde_json::to_string(&table).unwrap();
        let back: RateTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version(), table.version());
        assert_eq!(back.len(), table.len());
        assert_eq!(back.get("btc").unwrap().usd_rate, Decimal::new(65000, 0));
    }
}
