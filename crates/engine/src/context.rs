//! Per-request context handed to every service and hook

use serde::{Deserialize, Serialize};

use crate::config::SiteConfig;

/// The user a request acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Username
    pub username: String,
    /// Authentication provider, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl User {
    /// A user with no provider
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            provider: None,
        }
    }
}

/// Request-scoped data: site, user and requested output format
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The site being served
    pub site: SiteConfig,
    /// Acting user
    pub user: Option<User>,
    /// Requested format extension (`html`, `json`, ...), selects a format hook
    pub extension: Option<String>,
}

impl RequestContext {
    /// Context for `site` with no user and no format
    pub fn for_site(site: SiteConfig) -> Self {
        Self {
            site,
            ..Self::default()
        }
    }

    /// Attach a user
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Request a format
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// The same context without a requested format
    ///
    /// Used when data is read to be written back (publish, clone), so format
    /// hooks never leak presentation output into stored records.
    pub fn for_storage(&self) -> Self {
        Self {
            site: self.site.clone(),
            user: self.user.clone(),
            extension: None,
        }
    }

    /// Address prefix of the site
    pub fn prefix(&self) -> String {
        self.site.prefix()
    }
}
