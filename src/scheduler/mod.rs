/*!
 * Scheduler Module
 * Polling, bounded dispatch and precheck workers
 */

mod task;
mod worker;

pub use task::JobScheduler;
