mod errors;
mod loader;
mod schema;

pub use errors::ConfigError;
pub use loader::load;
pub use schema::*;
