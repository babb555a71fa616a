//! Domain models for the search API.

mod account;
mod options;
mod record;
mod server;

pub use account::Account;
pub use options::*;
pub use record::{SearchRecord, SearchResponse};
pub use server::Server;
