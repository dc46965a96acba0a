//! chartpipe chart sources
//!
//! This crate turns chart references into charts on local disk:
//!
//! - **Classic repositories**: `index.yaml` plus `.tgz` archives over HTTP(S)
//! - **OCI registries**: login handshake, then chart layer pulls
//! - **Remote indexes**: unregistered repositories reached with inline
//!   credentials
//!
//! ## Security Notes
//!
//! - Credentials go only to the origin they were given for, redirect
//!   targets included, unless a repository opts into `passCredentialsAll`
//! - Passwords never appear in `Debug` output or logs
//! - Archive digests from the index are verified
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chartpipe_core::ChartReference;
//! use chartpipe_repo::{ChartLocator, CredentialProvider, HttpSettings, RepositoryEntry, RepositoryRegistrar};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registrar = Arc::new(RepositoryRegistrar::new("/tmp/chartpipe", HttpSettings::default()));
//! registrar
//!     .register_or_update(RepositoryEntry::new("bitnami", "https://charts.bitnami.com/bitnami"), None)
//!     .await?;
//!
//! let locator = ChartLocator::new(registrar, CredentialProvider::from_process());
//! let chart = locator
//!     .locate(&ChartReference::repository("bitnami", "wordpress", None), None)
//!     .await?;
//! println!("{}", chart.root.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod index;
pub mod locator;
pub mod oci;

pub use config::{RepositoryEntry, RepositoryFile, RepositoryRegistrar};
pub use credentials::{
    CredentialProvider, Credentials, EnvSource, HttpSettings, ResolvedCredentials,
    ScopedCredentials, SecureHttpClient,
};
pub use error::{AuthError, LocateError, RegistryError, RepoError, Result};
pub use http::HttpRepository;
pub use index::{ChartIndex, ChartVersion, compare_versions, select_version};
pub use locator::ChartLocator;
pub use oci::{OciReference, RegistryAuthenticator, RegistrySession};
