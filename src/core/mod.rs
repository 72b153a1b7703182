pub mod error;
pub mod types;
pub mod value;

pub use error::{DriverError, ModelError, Result};
pub(crate) use error::log_and_fail;
pub use types::{FieldMap, Row, SqlParams};
pub use value::{DataType, Value};
