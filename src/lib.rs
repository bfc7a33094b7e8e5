pub mod api;
pub mod config;
pub mod crypt;
pub mod directory;
pub mod envelope;
pub mod feature;
pub mod key_store;
pub mod signature_store;
pub mod term;
pub mod tracing_init;
