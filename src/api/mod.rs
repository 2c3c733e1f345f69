//! API client module: authenticated transport, credential lifecycle,
//! error taxonomy, and typed endpoint contracts.

mod client;
mod credentials;
mod error;
pub mod types;

pub use client::ApiClient;
pub use credentials::{Credential, CredentialCache, TokenExchanger};
pub use error::{classify_http_status, ApiError, ApiErrorKind};
