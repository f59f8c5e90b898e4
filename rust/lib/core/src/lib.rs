pub mod error;
pub mod module;
pub mod types;

pub use error::{error_kind, ServiceError};
pub use module::Module;
pub use types::{now, Timestamp};
