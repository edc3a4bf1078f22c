pub mod config;
pub mod goals;
pub mod profile;
pub mod record;
pub mod sync;
