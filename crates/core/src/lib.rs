//! # HIE Core
//!
//! Core logic for resolving a patient's clinical documents from a health information
//! exchange and publishing documents to it.
//!
//! The resolution pipeline:
//! - extracts document unique ids from a registry query result ([`registry`])
//! - builds a retrieve document set request against the configured repository ([`retrieval`])
//! - keeps the retrieved documents carrying the target template ([`template`])
//! - renders the matches into one aggregate payload ([`aggregate`], [`render`])
//!
//! [`pipeline::HealthInformationService`] sequences these stages against the collaborator
//! traits in [`exchange`]. [`local_exchange::LocalExchange`] implements those traits on top
//! of a directory.
//!
//! **No API concerns**: HTTP servers and command-line handling belong in `api-rest` and `cli`.

pub mod aggregate;
pub mod config;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod local_exchange;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod retrieval;
pub mod template;
pub mod xml;

pub use aggregate::{AggregateResult, DocumentAggregator};
pub use config::{core_config_from_env_values, CoreConfig};
pub use constants::DEFAULT_EXCHANGE_DIR;
pub use error::{HieError, HieResult};
pub use exchange::{DocumentClass, ExchangeError, IdentifierSystem};
pub use local_exchange::LocalExchange;
pub use pipeline::{Collaborators, HealthInformationService};
pub use render::{CdaJsonRenderer, DocumentRenderer, RenderError};
pub use xds_types::{NonEmptyText, Oid};
