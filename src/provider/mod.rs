//! Cloud provider collaborator interface
//!
//! One async trait, one call per concern. The orchestrator never talks to a
//! cloud API directly; everything external goes through [`CloudProvider`],
//! which keeps the graph testable and keeps retry policy (if any) on the
//! provider side rather than in the orchestrator.
//!
//! Every create call is keyed by the spec's `logical_name` and must behave
//! as create-or-update: re-applying the same logical name after a partial
//! run converges instead of failing on "already exists".

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{DnsZone, ZoneId};

pub use memory::MemoryProvider;

/// Failure of a single provider call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderFailure {
    /// The underlying API call failed
    #[error("api call failed: {0}")]
    Api(String),

    /// Certificate validation did not complete in time
    #[error("certificate validation timed out")]
    ValidationTimeout,

    /// The certificate authority rejected the validation record
    #[error("certificate validation rejected: {0}")]
    ValidationRejected(String),
}

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderFailure>;

/// Canned access policy for a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketAcl {
    Private,
    PublicRead,
    LogDeliveryWrite,
}

/// Static-website configuration for a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteConfig {
    pub index_document: String,
    pub error_document: String,
}

/// Access-log delivery target for a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLogging {
    pub target_bucket: String,
    pub target_prefix: String,
}

/// Declarative bucket request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub logical_name: String,
    pub bucket: String,
    pub acl: BucketAcl,
    pub versioning: bool,
    /// Server-side encryption algorithm applied by default
    pub sse_algorithm: String,
    pub website: Option<WebsiteConfig>,
    pub logging: Option<BucketLogging>,
    pub tags: BTreeMap<String, String>,
}

/// Bucket attributes known only after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketHandle {
    /// Bucket name, also the storage-URI key
    pub id: String,
    pub bucket_domain_name: String,
    pub website_endpoint: String,
}

/// How certificate ownership is proven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationMethod {
    Dns,
    Email,
}

/// One per-domain validation record demanded by the certificate authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOption {
    pub domain_name: String,
    pub record_name: String,
    pub record_type: String,
    pub record_value: String,
}

/// A requested (not yet validated) certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateHandle {
    pub arn: String,
    pub validation_options: Vec<ValidationOption>,
}

/// Declarative DNS record request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSpec {
    pub logical_name: String,
    pub zone_id: ZoneId,
    pub name: String,
    pub record_type: String,
    pub values: Vec<String>,
    pub ttl_seconds: u64,
}

/// A created DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHandle {
    pub fqdn: String,
}

/// Origin the CDN pulls content from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnOrigin {
    pub origin_id: String,
    pub domain_name: String,
    /// Bucket website endpoints only speak plain HTTP
    pub protocol_policy: String,
    pub ssl_protocols: Vec<String>,
}

/// Cache behavior for the default path pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBehavior {
    pub allowed_methods: Vec<String>,
    pub cached_methods: Vec<String>,
    pub viewer_protocol_policy: String,
    pub min_ttl_seconds: u64,
    pub default_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    pub forward_query_string: bool,
    pub forward_cookies: bool,
}

/// TLS termination settings for the distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerCertificate {
    pub certificate_arn: String,
    pub ssl_support_method: String,
    pub minimum_protocol_version: String,
}

/// Mapping of an error status to a static error page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomErrorResponse {
    pub error_code: u16,
    pub response_code: u16,
    pub response_page_path: String,
}

/// Viewer geo restriction; `restriction_type` is `none`, `whitelist` or
/// `blacklist`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRestriction {
    pub restriction_type: String,
    pub locations: Vec<String>,
}

impl GeoRestriction {
    /// Serve every location.
    pub fn none() -> Self {
        Self {
            restriction_type: "none".to_string(),
            locations: Vec::new(),
        }
    }
}

/// Request-log delivery for the distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnLogging {
    pub bucket: String,
    pub prefix: String,
    pub include_cookies: bool,
}

/// Declarative CDN distribution request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnSpec {
    pub logical_name: String,
    pub enabled: bool,
    pub aliases: Vec<String>,
    pub origin: CdnOrigin,
    pub default_root_object: String,
    pub cache: CacheBehavior,
    pub price_class: String,
    pub custom_error_responses: Vec<CustomErrorResponse>,
    pub geo_restriction: GeoRestriction,
    pub viewer_certificate: ViewerCertificate,
    pub logging: CdnLogging,
    /// Distributions take many minutes to fully deploy; the run does not
    /// wait for that when this is false.
    pub wait_for_deployment: bool,
}

/// CDN attributes known only after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnHandle {
    pub domain_name: String,
    /// Provider-fixed zone the CDN's own domain lives in, needed for alias
    /// records targeting the distribution
    pub hosted_zone_id: ZoneId,
}

/// Target of a health-aware alias record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTarget {
    pub domain_name: String,
    pub hosted_zone_id: ZoneId,
    pub evaluate_target_health: bool,
}

/// Declarative alias record request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecordSpec {
    pub logical_name: String,
    pub zone_id: ZoneId,
    /// Subdomain label within the zone; empty for the zone apex
    pub name: String,
    pub target: AliasTarget,
}

/// Abstract cloud collaborator, one call per concern
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Create or update a bucket.
    async fn create_bucket(&self, spec: &BucketSpec) -> ProviderResult<BucketHandle>;

    /// Request a certificate for `domain`, returning the records the
    /// certificate authority wants to see before issuing.
    async fn request_certificate(
        &self,
        logical_name: &str,
        domain: &str,
        method: ValidationMethod,
    ) -> ProviderResult<CertificateHandle>;

    /// Create or update a DNS record.
    async fn create_dns_record(&self, spec: &DnsRecordSpec) -> ProviderResult<RecordHandle>;

    /// Long-poll until the certificate authority confirms the validation
    /// records are live, returning the validated certificate identifier.
    /// May suspend for minutes; cancelled by dropping the future.
    async fn await_certificate_validation(
        &self,
        arn: &str,
        record_fqdns: &[String],
    ) -> ProviderResult<String>;

    /// Create or update a CDN distribution.
    async fn create_cdn_distribution(&self, spec: &CdnSpec) -> ProviderResult<CdnHandle>;

    /// All hosted zones whose apex is exactly `registered_domain`.
    async fn find_zone(&self, registered_domain: &str) -> ProviderResult<Vec<DnsZone>>;

    /// Create or update a health-aware alias record.
    async fn create_alias_record(&self, spec: &AliasRecordSpec) -> ProviderResult<RecordHandle>;
}
