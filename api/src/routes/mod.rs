pub mod artifacts;
pub mod auth;
pub mod memory;
pub mod sessions;
pub mod system;
pub mod tools;
