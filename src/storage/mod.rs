pub mod memory;
pub mod persistence;

pub use memory::TenantItemBuffer;
pub use persistence::{DurableTenantStore, TenantRecord};
