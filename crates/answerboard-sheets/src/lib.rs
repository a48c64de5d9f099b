//! Spreadsheet access for the answer board.
//!
//! [`SheetsBackend`] is the seam: the REST client talks to the Sheets API
//! with a service-account token, [`MemorySheets`] keeps everything in
//! process for tests and local development.

pub mod a1;
pub mod auth;
pub mod backend;
pub mod client;
pub mod error;
pub mod memory;
pub mod repair;
pub mod retry;

pub use a1::A1Range;
pub use auth::{ServiceAccountAuth, ServiceAccountKey, TokenSource};
pub use backend::{SheetsBackend, ValueRange};
pub use client::SheetsApiClient;
pub use error::{SheetsError, SheetsResult};
pub use memory::MemorySheets;
pub use repair::{AccessRepair, DriveShareRepair};
pub use retry::RetryPolicy;
