// omabus-api: Async Rust client for the Omada controller OpenAPI

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use auth::{ClientCredentials, IssuedTokens};
pub use client::{OmadaClient, paths};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};

pub use reqwest::Method;
