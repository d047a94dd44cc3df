pub mod api_key;
pub mod middleware;
pub mod models;

pub use api_key::Authenticator;
pub use middleware::{authenticate, extract_api_key};
pub use models::{Caller, Capabilities, Principal};
