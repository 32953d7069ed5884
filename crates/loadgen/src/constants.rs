//! Constants used throughout the load generator.

use std::time::Duration;

use alloy_primitives::U256;

/// One ether in wei.
pub const ONE_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Gas limit of a plain value transfer.
pub const NATIVE_TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Lower bound (inclusive) of the oversized calldata payload.
pub const HUGE_CALLDATA_MIN_BYTES: usize = 100 * 1024;

/// Upper bound (exclusive) of the oversized calldata payload.
///
/// Kept below the 128 KiB transaction size ceiling enforced by geth-derived
/// transaction pools.
pub const HUGE_CALLDATA_MAX_BYTES: usize = 127 * 1024;

/// Confirmations awaited for a submitted transaction.
pub const REQUIRED_CONFIRMATIONS: u64 = 1;

/// Interval at which the scheduler polls for in-flight dispatches to drain after stop.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Histogram buckets (seconds) for transaction latency.
pub const TX_DURATION_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0];

// ============================================================================
// Configuration defaults
// ============================================================================

/// Default complexity level (0-100).
pub const DEFAULT_COMPLEXITY: u8 = 20;

/// Default number of concurrently in-flight transactions.
pub const DEFAULT_CONCURRENCY: usize = 15;

/// Default pause between two rounds of the same slot.
pub const DEFAULT_TX_INTERVAL: Duration = Duration::from_secs(2);

/// Default per-transaction deadline.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of rotation groups.
pub const DEFAULT_ROTATION_GROUPS: usize = 4;

/// Default interval between progress reports.
pub const DEFAULT_REPORTING_INTERVAL: Duration = Duration::from_secs(2);

/// Default amount sent by a native transfer (0.00001 ETH).
pub const DEFAULT_NATIVE_TRANSFER_WEI: U256 = U256::from_limbs([10_000_000_000_000, 0, 0, 0]);

/// Default balance below which a sender is topped up (0.01 ETH).
pub const DEFAULT_BALANCE_THRESHOLD_WEI: U256 = U256::from_limbs([10_000_000_000_000_000, 0, 0, 0]);

/// Default balance a topped-up sender is brought back to (0.02 ETH).
pub const DEFAULT_TOP_UP_TARGET_WEI: U256 = U256::from_limbs([20_000_000_000_000_000, 0, 0, 0]);

// ============================================================================
// Retry defaults
// ============================================================================

/// Default number of retries after the first failed RPC query.
pub const DEFAULT_RPC_RETRIES: usize = 1;

/// Default fixed delay between RPC query attempts.
pub const DEFAULT_RPC_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Default deadline of a single RPC query attempt.
pub const DEFAULT_RPC_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Gas estimation
// ============================================================================

/// Gas limit multiplier numerator (120% = 6/5).
pub const GAS_LIMIT_MULTIPLIER_NUMERATOR: u64 = 6;

/// Gas limit multiplier denominator (120% = 6/5).
pub const GAS_LIMIT_MULTIPLIER_DENOMINATOR: u64 = 5;

/// Minimal contract deployed when no artifact is configured.
///
/// Init code copies a ten byte runtime (`PUSH1 0x2a PUSH1 0 MSTORE PUSH1 0x20 PUSH1 0 RETURN`)
/// into memory and returns it.
pub const DEFAULT_DEPLOY_BYTECODE: &str = "0x600a600c600039600a6000f3602a60005260206000f3";
