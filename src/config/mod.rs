pub mod defaults;
pub mod loader;
pub mod overrides;
pub mod path;
pub mod schema;
pub mod validator;

pub use defaults::{DEFAULT_MONITOR_METRIC, DEFAULT_VERSION};
pub use loader::ConfigLoader;
pub use overrides::Override;
pub use path::KeyPath;
pub use schema::*;
pub use validator::ConfigValidator;
