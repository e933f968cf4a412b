//! Domain name value objects
//!
//! The stack needs the same answer twice to "which zone owns this domain":
//! once for the certificate validation record and once for the final alias
//! record. Both go through [`DomainSplit`], which separates a fully
//! qualified domain into its subdomain and registered-domain parts using the
//! public suffix list, so `www.example.co.uk` splits into `www` +
//! `example.co.uk` rather than stopping at `co.uk`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ProvisionError, ProvisionResult};
use crate::provider::CloudProvider;

/// Fully qualified domain name validated against RFC 1123
///
/// Invariants: non-empty, total length ≤ 253, labels ≤ 63 characters,
/// alphanumeric plus hyphen, no leading or trailing hyphen per label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    pub const MAX_LENGTH: usize = 253;
    pub const MAX_LABEL_LENGTH: usize = 63;

    pub fn new(hostname: impl Into<String>) -> ProvisionResult<Self> {
        let hostname = hostname.into();
        if hostname.is_empty() {
            return Err(ProvisionError::Configuration(
                "target domain is empty".to_string(),
            ));
        }
        if hostname.len() > Self::MAX_LENGTH {
            return Err(ProvisionError::Configuration(format!(
                "'{hostname}' exceeds {} characters",
                Self::MAX_LENGTH
            )));
        }
        for label in hostname.split('.') {
            Self::validate_label(&hostname, label)?;
        }
        Ok(Self(hostname))
    }

    fn validate_label(hostname: &str, label: &str) -> ProvisionResult<()> {
        if label.is_empty() {
            return Err(ProvisionError::Configuration(format!(
                "'{hostname}' contains an empty label"
            )));
        }
        if label.len() > Self::MAX_LABEL_LENGTH {
            return Err(ProvisionError::Configuration(format!(
                "label '{label}' exceeds {} characters",
                Self::MAX_LABEL_LENGTH
            )));
        }
        if let Some(ch) = label.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
            return Err(ProvisionError::Configuration(format!(
                "invalid character '{ch}' in '{hostname}'"
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ProvisionError::Configuration(format!(
                "label '{label}' starts or ends with a hyphen"
            )));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A fully qualified domain split at the registered-domain boundary
///
/// `registered_domain` is the minimal domain that is itself a zone apex;
/// `subdomain` is whatever precedes it, possibly empty for apex domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSplit {
    pub subdomain: String,
    pub registered_domain: String,
}

impl DomainSplit {
    /// Split `fqdn` against the public suffix list.
    ///
    /// Fails when no registrable domain exists, e.g. a bare public suffix
    /// like `co.uk` or an unknown top-level domain.
    pub fn of(fqdn: &str) -> ProvisionResult<Self> {
        let registered = psl::domain_str(fqdn).ok_or_else(|| {
            ProvisionError::Configuration(format!("'{fqdn}' has no registrable domain"))
        })?;
        let subdomain = fqdn
            .strip_suffix(registered)
            .map(|rest| rest.trim_end_matches('.'))
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            subdomain,
            registered_domain: registered.to_string(),
        })
    }

    /// Reassemble the original fully qualified domain.
    pub fn fqdn(&self) -> String {
        if self.subdomain.is_empty() {
            self.registered_domain.clone()
        } else {
            format!("{}.{}", self.subdomain, self.registered_domain)
        }
    }
}

/// Identifier of a hosted DNS zone at the provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A DNS namespace delegation, identified by its apex domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsZone {
    pub zone_id: ZoneId,
    pub apex_domain: String,
}

/// Look up the one zone owning `registered_domain`.
///
/// The zone is an external precondition, never provisioned here: zero
/// matches is [`ProvisionError::ZoneNotFound`], more than one is
/// [`ProvisionError::AmbiguousZone`].
pub async fn resolve_zone(
    provider: &dyn CloudProvider,
    registered_domain: &str,
) -> ProvisionResult<DnsZone> {
    let mut zones = provider
        .find_zone(registered_domain)
        .await
        .map_err(|e| ProvisionError::Provider {
            resource: format!("zone lookup for '{registered_domain}'"),
            message: e.to_string(),
        })?;

    match zones.len() {
        0 => Err(ProvisionError::ZoneNotFound(registered_domain.to_string())),
        1 => Ok(zones.remove(0)),
        matches => Err(ProvisionError::AmbiguousZone {
            domain: registered_domain.to_string(),
            matches,
        }),
    }
}
