pub mod error;
pub mod types;

pub use error::{CountError, Result};
pub use types::{CountResponse, Item, SubmitResponse, validate_tenant, worker_port};
