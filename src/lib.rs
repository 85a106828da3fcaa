pub mod admin;
pub mod engine;
pub mod reset;
pub mod transport;
