// Proxy module - per-request state shared between the HTTP layer and model resolution

pub mod context;

pub use context::{current_api_key, scope, sync_scope};
