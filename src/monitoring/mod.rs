/*!
 * Monitoring
 * Tracing subscriber setup and stage timing
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, StageSpan};
