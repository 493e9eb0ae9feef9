/*!
 * Structured Tracing
 * Subscriber setup and timed spans for pipeline stages
 *
 * Features:
 * - Trace ID per precheck run for log correlation across stages
 * - JSON-formatted logs for structured parsing
 * - Slow-stage warnings with embedded durations
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Stages slower than this are reported at warn level
const SLOW_STAGE_THRESHOLD: Duration = Duration::from_secs(5);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - DOSE_TRACE_JSON: Enable JSON output (default: false)
///
/// Calling it more than once is harmless; later calls keep the first subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("DOSE_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        let installed = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok();
        if installed {
            info!("Structured tracing initialized with JSON output");
        }
    } else {
        let installed = registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .compact(),
            )
            .try_init()
            .is_ok();
        if installed {
            info!("Structured tracing initialized");
        }
    }
}

/// Generate a unique trace ID for request correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Timed span around one precheck stage
pub struct StageSpan {
    span: tracing::Span,
    start: Instant,
    stage: &'static str,
    trace_id: String,
}

impl StageSpan {
    pub fn new(stage: &'static str, trace_id: &str) -> Self {
        let span = span!(
            Level::DEBUG,
            "precheck_stage",
            trace_id = %trace_id,
            stage = stage,
            duration_ms = tracing::field::Empty,
            result = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            stage,
            trace_id: trace_id.to_string(),
        }
    }

    /// Record whether the stage succeeded
    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }
}

impl Drop for StageSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_millis() as u64);
        let _entered = self.span.enter();

        if duration > SLOW_STAGE_THRESHOLD {
            warn!(
                trace_id = %self.trace_id,
                stage = self.stage,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow precheck stage"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                stage = self.stage,
                duration_ms = duration.as_millis() as u64,
                "precheck stage completed"
            );
        }
    }
}
