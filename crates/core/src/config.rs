//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Binaries read the environment; everything in here only works on
//! the values they hand over, so request handling never touches process-wide state.

use crate::constants::{
    CCD_TEMPLATE_ID_ROOT, DEFAULT_HOME_COMMUNITY_ID, DEFAULT_REPOSITORY_UNIQUE_ID,
};
use crate::{HieError, HieResult};
use xds_types::{NonEmptyText, Oid};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    repository_unique_id: NonEmptyText,
    home_community_id: NonEmptyText,
    template_root: Oid,
}

impl CoreConfig {
    /// Create a new `CoreConfig` targeting the CCD template.
    ///
    /// # Errors
    ///
    /// Returns `HieError::InvalidInput` if either identifier is blank.
    pub fn new(repository_unique_id: &str, home_community_id: &str) -> HieResult<Self> {
        let repository_unique_id = NonEmptyText::new(repository_unique_id).map_err(|_| {
            HieError::InvalidInput("repository_unique_id cannot be empty".into())
        })?;
        let home_community_id = NonEmptyText::new(home_community_id)
            .map_err(|_| HieError::InvalidInput("home_community_id cannot be empty".into()))?;

        Ok(Self {
            repository_unique_id,
            home_community_id,
            template_root: Oid::parse(CCD_TEMPLATE_ID_ROOT)
                .map_err(|e| HieError::InvalidInput(e.to_string()))?,
        })
    }

    /// Replace the template id root documents must carry to be aggregated.
    pub fn with_template_root(mut self, template_root: Oid) -> Self {
        self.template_root = template_root;
        self
    }

    pub fn repository_unique_id(&self) -> &NonEmptyText {
        &self.repository_unique_id
    }

    pub fn home_community_id(&self) -> &NonEmptyText {
        &self.home_community_id
    }

    pub fn template_root(&self) -> &Oid {
        &self.template_root
    }
}

/// Build a [`CoreConfig`] from optional raw values (typically environment variables).
///
/// `None`, empty and whitespace-only values fall back to the defaults in
/// [`crate::constants`].
///
/// # Errors
///
/// Returns `HieError::InvalidInput` if `template_root` is not a valid OID.
pub fn core_config_from_env_values(
    repository_unique_id: Option<String>,
    home_community_id: Option<String>,
    template_root: Option<String>,
) -> HieResult<CoreConfig> {
    fn non_blank(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    let repository_unique_id = non_blank(repository_unique_id)
        .unwrap_or_else(|| DEFAULT_REPOSITORY_UNIQUE_ID.into());
    let home_community_id =
        non_blank(home_community_id).unwrap_or_else(|| DEFAULT_HOME_COMMUNITY_ID.into());

    let cfg = CoreConfig::new(&repository_unique_id, &home_community_id)?;

    match non_blank(template_root) {
        Some(raw) => {
            let oid = Oid::parse(&raw)
                .map_err(|e| HieError::InvalidInput(format!("HIE_TEMPLATE_ROOT: {e}")))?;
            Ok(cfg.with_template_root(oid))
        }
        None => Ok(cfg),
    }
}
