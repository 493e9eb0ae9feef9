/*!
 * System Limits and Constants
 *
 * Defaults for every tunable of the pipeline, grouped by component.
 * Configuration values override these; nothing else should hard-code them.
 */

use std::time::Duration;

// =============================================================================
// JOB SCHEDULER
// =============================================================================

/// Precheck workers per scheduler
pub const DEFAULT_PRECHECK_WORKERS: usize = 4;

/// Work channel capacity is this many times the worker count
pub const QUEUE_CAPACITY_FACTOR: usize = 2;

/// Poller tick
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum age of a recoverable precheck failure before the order is fetched again
pub const DEFAULT_RECHECK_DELAY: Duration = Duration::from_secs(60);

// =============================================================================
// PRECHECK
// =============================================================================

/// Upper bound of expanded doses for the adjusted compound
pub const DEFAULT_MAX_DOSES: usize = 100;

/// Population tag used when the patient carries no ethnicity
pub const DEFAULT_POPULATION: &str = "european";

// =============================================================================
// SIMULATION
// =============================================================================

/// Wall-clock budget for one run of the external model
pub const DEFAULT_SIMULATION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Concurrent simulation processes
pub const DEFAULT_MAX_CONCURRENT_SIMULATIONS: usize = 2;

/// Message handed to the external script when the first run timed out
pub const TIMEOUT_FALLBACK_MESSAGE: &str =
    "The dose adjustment simulation exceeded its time budget.";

/// Environment variable carrying a per-run marker; every process of a run
/// inherits it, which lets teardown find members that left the process tree
pub const PROCESS_TAG_ENV: &str = "DOSE_KERNEL_RUN_TAG";

/// Benign solver chatter dropped from the forwarded stderr stream
pub const DEFAULT_SUPPRESSED_STDERR_PREFIXES: &[&str] = &[
    "DLSODA-",
    "In above message",
    "      at t (=R1)",
    "      and h (=R2)",
    "      such that in the machine",
];

// =============================================================================
// DISPATCH
// =============================================================================

/// Dispatcher tick
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Orders uploaded per tick
pub const DEFAULT_DISPATCH_BATCH: usize = 10;

/// Attempts before an order is parked as `send_failed`
pub const DEFAULT_MAX_SEND_TRIES: i32 = 10;

/// Base delay before a failed upload is retried; doubles per attempt
pub const DEFAULT_SEND_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Cap of the exponential send backoff
pub const MAX_SEND_RETRY_BACKOFF: Duration = Duration::from_secs(60 * 60);

// =============================================================================
// HTTP CLIENTS
// =============================================================================

/// Request timeout for all outbound HTTP calls
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens are refreshed when they expire within this window
pub const DEFAULT_TOKEN_EXPIRY_THRESHOLD: Duration = Duration::from_secs(60);

/// User agent sent by every client
pub const USER_AGENT: &str = concat!("dose-kernel/", env!("CARGO_PKG_VERSION"));
