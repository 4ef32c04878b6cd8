// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

// =============================================================================
// CALLDATA COST MODEL
// =============================================================================

/// Fixed per-transaction envelope overhead (signature, RLP framing, target).
pub const TX_OVERHEAD_BYTES: u64 = 160;

/// Base execution gas charged for any transaction.
pub const BASE_TX_GAS: u64 = 21_000;

/// Gas charged per non-zero calldata byte.
///
/// The mining payload is always the repeating non-zero byte
/// [`MINE_PAYLOAD_BYTE`], so every payload byte is charged at this rate.
/// There is no zero-byte discount path; the derivation layer mints against
/// non-zero calldata gas and the pattern must stay byte-compatible with it.
pub const NONZERO_BYTE_GAS: u64 = 40;

/// Byte repeated to fill the mining payload.
pub const MINE_PAYLOAD_BYTE: u8 = 0x4d;

/// Hard ceiling on a single mining payload (100 KiB).
pub const MAX_PAYLOAD_BYTES: u64 = 100 * 1024;

// =============================================================================
// FEES & RETRY
// =============================================================================

/// Default fee multiplier applied to the observed gas price (1.5x, in bps).
pub const DEFAULT_FEE_MULTIPLIER_BPS: u64 = 15_000;

/// Priority fee floor used by fee escalation when no estimate is available.
pub const DEFAULT_PRIORITY_FEE_GWEI: u64 = 2;

/// Default attempts for one submission sequence.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Initial retry backoff; doubles per attempt up to [`MAX_BACKOFF_MS`].
pub const INITIAL_BACKOFF_MS: u64 = 1_000;
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Bounded wait for each confirmation layer (outer and inner).
pub const CONFIRMATION_TIMEOUT_SECS: u64 = 60;

/// Receipt poll cadence while awaiting confirmation.
pub const RECEIPT_POLL_MS: u64 = 2_000;

// =============================================================================
// QUOTES
// =============================================================================

/// Advisory fiat fallback when the rate source is unreachable.
pub const DEFAULT_ETH_USD_RATE: f64 = 3_000.0;

/// Cache quotes for this long before refreshing.
pub const QUOTE_CACHE_TTL_SECS: u64 = 60;

/// Wei per whole token / ether (18-decimal fixed point).
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

// =============================================================================
// LOGGING DEFAULTS
// =============================================================================

pub const DEFAULT_LOG_LEVEL: &str = "info";
