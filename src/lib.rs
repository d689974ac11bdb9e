//! GitLab provider plugin.
//!
//! Manages GitLab Pages domains and users, and looks up users, on behalf of
//! an infrastructure-as-code host. The host spawns the binary, reads the
//! handshake line from stdout and then talks gRPC to the advertised address:
//!
//! ```text
//! PROVIDER_PLUGIN|1|127.0.0.1:50051
//! ```
//!
//! Layout:
//!
//! - [`client`]: async GitLab REST client
//! - [`resources`] and [`data_sources`]: adapters between typed models and the API
//! - [`schema`], [`validation`], [`plan`]: schema-driven validation and planning
//! - [`provider`]: the registry plus the shared client, implementing [`ProviderService`]
//! - [`server`]: the gRPC server and handshake

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod logging;
pub mod plan;
pub mod protocol;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod utils;
pub mod validation;

pub use client::{ApiError, ClientConfig, GitlabClient};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, try_init_logging};
pub use provider::GitlabProvider;
pub use schema::{Diagnostic, ProviderSchema};
pub use server::{serve, serve_on, serve_with_options, serve_with_shutdown, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
