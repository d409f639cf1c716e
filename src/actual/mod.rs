//! Client for the Actual Budget sync server.
//!
//! Covers sign-in, locating a budget by its sync id, downloading and
//! (when needed) decrypting the budget archive, and unpacking it into the
//! local data directory.
pub mod api_types;
pub mod client;
pub mod crypto;
pub mod errors;
pub mod import;

pub use client::ActualClient;
pub use errors::{ActualError, DownloadFailure};
