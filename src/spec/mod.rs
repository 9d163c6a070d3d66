mod error;
mod load;
mod types;

pub use error::{ConfigError, ConfigErrorKind};
pub use load::{load_endpoint_dir, load_endpoints, load_endpoints_from_str};
pub(crate) use load::check_unique;
pub use types::*;
