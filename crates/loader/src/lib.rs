//! Connection-scoped access to the ert experiment storage service.
//!
//! - [`ConnectionRegistry`] resolves a project to its storage connection
//!   through a [`ConnectionProvider`] and remembers the answer.
//! - [`ClientRegistry`] keeps exactly one [`DataLoader`] per connection key.
//! - [`DataLoader`] exposes the domain reads: ensembles, experiments,
//!   records, observations, priors and misfits. Failures come back as empty
//!   values and are logged.
//! - [`Lookup`] ties the two registries together.

mod client;
mod config;
mod connection;
pub mod decode;
mod error;
mod lookup;
mod registry;
#[cfg(test)]
mod testing;

pub use client::{CSV_MIME, DataLoader, PARQUET_MIME};
pub use config::{DEFAULT_CONNECTION_CACHE_CAPACITY, LoaderConfig, load_config_from_path};
pub use connection::{ConnectionProvider, ConnectionRegistry, SERVER_INFO_FILE, ServerFileProvider, StaticConnection};
pub use error::{ConnectionError, DecodeError, LoaderError};
pub use lookup::Lookup;
pub use registry::ClientRegistry;

pub use ertdata_types::{ConnectionInfo, ConnectionKey, Frame};
