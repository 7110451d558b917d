//! System-wide constants for the OpenSettle settlement engine.

/// Decimal precision for USD amounts (2 decimal places).
pub const USD_PRECISION: u32 = 2;

/// Default decimal precision for asset amounts (8 decimal places).
pub const DEFAULT_ASSET_SCALE: u32 = 8;

/// Default hard timeout for a single transfer-oracle submission in
/// milliseconds. A submission still unresolved at the deadline is reported
/// as pending, never assumed successful.
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 2000;

/// Default maximum settlement-dispatch attempts before dead-lettering.
pub const DEFAULT_DISPATCH_MAX_ATTEMPTS: u32 = 5;

/// Default base delay between dispatch attempts in milliseconds.
/// Attempt `n` waits `base * 2^(n-1)`, capped at the maximum backoff.
pub const DEFAULT_DISPATCH_BASE_BACKOFF_MS: u64 = 100;

/// Default cap on a single dispatch backoff delay in milliseconds.
pub const DEFAULT_DISPATCH_MAX_BACKOFF_MS: u64 = 5000;

/// Default total wall-clock budget for one dispatch cycle in milliseconds.
/// Retries stop early once the budget is spent, whatever the attempt count.
pub const DEFAULT_DISPATCH_TOTAL_BUDGET_MS: u64 = 30_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "OpenSettle";
