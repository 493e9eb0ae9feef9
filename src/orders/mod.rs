/*!
 * Orders Module
 * Order model, patient submission and the storage contract
 */

pub mod memory;
pub mod patient;
pub mod postgres;
pub mod traits;
pub mod types;

// Re-export public API
pub use memory::MemoryOrderStore;
pub use patient::{Drug, Intake, PatientData, Sex};
pub use postgres::PgOrderStore;
pub use traits::OrderStore;
pub use types::{Order, OrderStatus, StoreError, StoreResult};
