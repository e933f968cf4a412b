//! Static-site hosting stack
//!
//! Wires the fixed topology into a provisioning graph and executes it:
//!
//! ```text
//! requestLogs ──┬──► contentBucket ──┐
//!               │                    ├──► cdn ──► alias record
//! certificate ──► validation ──► await┘
//!   (skipped when an identifier is supplied)
//! ```
//!
//! The hosted zone is resolved once, up front, and shared by the validation
//! record and the alias record, so both agree on ownership and a missing
//! zone fails the run before any record exists.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::certificate::{wire_certificate, CertificateSource};
use crate::config::StackConfig;
use crate::domain::{resolve_zone, DomainSplit};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{ProvisioningGraph, ResourceKind};
use crate::provider::{
    AliasRecordSpec, AliasTarget, BucketAcl, BucketHandle, BucketLogging, BucketSpec,
    CacheBehavior, CdnHandle, CdnLogging, CdnOrigin, CdnSpec, CloudProvider,
    CustomErrorResponse, GeoRestriction, ViewerCertificate, WebsiteConfig,
};
use crate::value::{AsyncValue, DependencySet};

/// CDN default cache time-to-live
const CACHE_TTL_SECONDS: u64 = 600;

/// One static-site hosting stack, ready to provision
#[derive(Debug, Clone)]
pub struct SiteStack {
    config: StackConfig,
}

impl SiteStack {
    /// Validate the configuration; fails before any provisioning.
    pub fn new(config: StackConfig) -> ProvisionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Provision the full stack, bounded by the configured run deadline.
    ///
    /// A timeout leaves partial external state behind; that is recoverable,
    /// since re-running with the same configuration converges through the
    /// provider's create-or-update semantics.
    pub async fn provision(
        &self,
        provider: Arc<dyn CloudProvider>,
    ) -> ProvisionResult<ResolvedOutputs> {
        let deadline = Duration::from_secs(self.config.run_timeout_secs);
        match tokio::time::timeout(deadline, self.run(provider)).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Cancelled),
        }
    }

    async fn run(&self, provider: Arc<dyn CloudProvider>) -> ProvisionResult<ResolvedOutputs> {
        let target_domain = self.config.target_domain.clone();
        let split = DomainSplit::of(&target_domain)?;
        let zone = resolve_zone(provider.as_ref(), &split.registered_domain).await?;
        info!(
            domain = %target_domain,
            subdomain = %split.subdomain,
            zone = %zone.zone_id,
            "provisioning hosting stack"
        );

        let mut graph = ProvisioningGraph::new();

        let logs = bucket_node(
            &mut graph,
            &provider,
            "requestLogs",
            AsyncValue::literal(logs_bucket_spec(&self.config)),
        )?;

        let config = self.config.clone();
        let content = bucket_node(
            &mut graph,
            &provider,
            "contentBucket",
            logs.map(move |logs_handle| content_bucket_spec(&config, &logs_handle.id)),
        )?;

        let source = CertificateSource::from_config(
            &target_domain,
            self.config.certificate_arn.clone(),
        );
        let certificate_arn = wire_certificate(&mut graph, Arc::clone(&provider), source, &zone)?;

        let cdn = self.cdn_node(&mut graph, &provider, &content, &logs, &certificate_arn)?;
        self.alias_node(&mut graph, &provider, &split, &zone, &cdn)?;

        let outputs = StackOutputs {
            content_bucket_url: content.map(|h| format!("s3://{}", h.id)),
            content_bucket_website_endpoint: content.map(|h| h.website_endpoint),
            cloudfront_domain: cdn.map(|h| h.domain_name),
            target_domain_endpoint: AsyncValue::literal(format!("https://{target_domain}/")),
        };

        let report = graph.execute().await?;
        if let Some(error) = report.first_error() {
            return Err(error.clone());
        }
        outputs.resolve().await
    }

    fn cdn_node(
        &self,
        graph: &mut ProvisioningGraph,
        provider: &Arc<dyn CloudProvider>,
        content: &AsyncValue<BucketHandle>,
        logs: &AsyncValue<BucketHandle>,
        certificate_arn: &AsyncValue<String>,
    ) -> ProvisionResult<AsyncValue<CdnHandle>> {
        let node = graph.reserve(ResourceKind::CdnDistribution, "cdn")?;
        let (slot, handle) = graph.output::<CdnHandle>(node, "handle");

        let inputs = content.zip(logs).zip(certificate_arn);
        let deps = DependencySet::on(&inputs);
        let provider = Arc::clone(provider);
        let config = self.config.clone();
        graph.bind(node, deps, async move {
            let ((content, logs), arn) = inputs.resolve().await?;
            let spec = cdn_spec(&config, &content, &logs, &arn);
            match provider.create_cdn_distribution(&spec).await {
                Ok(cdn) => {
                    slot.fulfill(cdn);
                    Ok(())
                }
                Err(failure) => {
                    let err = ProvisionError::Provider {
                        resource: spec.logical_name,
                        message: failure.to_string(),
                    };
                    slot.fail(err.clone());
                    Err(err)
                }
            }
        })?;
        Ok(handle)
    }

    fn alias_node(
        &self,
        graph: &mut ProvisioningGraph,
        provider: &Arc<dyn CloudProvider>,
        split: &DomainSplit,
        zone: &crate::domain::DnsZone,
        cdn: &AsyncValue<CdnHandle>,
    ) -> ProvisionResult<()> {
        let logical_name = self.config.target_domain.clone();
        let node = graph.reserve(ResourceKind::AliasRecord, logical_name.clone())?;

        let deps = DependencySet::on(cdn);
        let provider = Arc::clone(provider);
        let cdn = cdn.clone();
        let zone_id = zone.zone_id.clone();
        let subdomain = split.subdomain.clone();
        graph.bind(node, deps, async move {
            let cdn = cdn.resolve().await?;
            let spec = AliasRecordSpec {
                logical_name,
                zone_id,
                name: subdomain,
                target: AliasTarget {
                    domain_name: cdn.domain_name,
                    hosted_zone_id: cdn.hosted_zone_id,
                    evaluate_target_health: true,
                },
            };
            match provider.create_alias_record(&spec).await {
                Ok(record) => {
                    info!(fqdn = %record.fqdn, "alias record bound to distribution");
                    Ok(())
                }
                Err(failure) => Err(ProvisionError::Provider {
                    resource: spec.logical_name,
                    message: failure.to_string(),
                }),
            }
        })
    }
}

/// Declare one bucket node whose spec may itself be deferred.
fn bucket_node(
    graph: &mut ProvisioningGraph,
    provider: &Arc<dyn CloudProvider>,
    logical_name: &'static str,
    spec: AsyncValue<BucketSpec>,
) -> ProvisionResult<AsyncValue<BucketHandle>> {
    let node = graph.reserve(ResourceKind::Bucket, logical_name)?;
    let (slot, handle) = graph.output::<BucketHandle>(node, "handle");

    let deps = DependencySet::on(&spec);
    let provider = Arc::clone(provider);
    graph.bind(node, deps, async move {
        let spec = spec.resolve().await?;
        match provider.create_bucket(&spec).await {
            Ok(bucket) => {
                slot.fulfill(bucket);
                Ok(())
            }
            Err(failure) => {
                let err = ProvisionError::Provider {
                    resource: spec.logical_name,
                    message: failure.to_string(),
                };
                slot.fail(err.clone());
                Err(err)
            }
        }
    })?;
    Ok(handle)
}

fn stack_tags() -> BTreeMap<String, String> {
    BTreeMap::from([("managed-by".to_string(), "sitestack".to_string())])
}

fn logs_bucket_spec(config: &StackConfig) -> BucketSpec {
    BucketSpec {
        logical_name: "requestLogs".to_string(),
        bucket: format!("{}-logs", config.target_domain),
        acl: BucketAcl::LogDeliveryWrite,
        versioning: true,
        sse_algorithm: "AES256".to_string(),
        website: None,
        logging: None,
        tags: stack_tags(),
    }
}

fn content_bucket_spec(config: &StackConfig, logs_bucket: &str) -> BucketSpec {
    let mut tags = stack_tags();
    tags.insert("allow_public".to_string(), "true".to_string());
    BucketSpec {
        logical_name: "contentBucket".to_string(),
        bucket: config.target_domain.clone(),
        acl: BucketAcl::PublicRead,
        versioning: true,
        sse_algorithm: "AES256".to_string(),
        website: Some(WebsiteConfig {
            index_document: config.index_document.clone(),
            error_document: config.error_document.clone(),
        }),
        logging: Some(BucketLogging {
            target_bucket: logs_bucket.to_string(),
            target_prefix: format!("{}/s3", config.target_domain),
        }),
        tags,
    }
}

fn cdn_spec(
    config: &StackConfig,
    content: &BucketHandle,
    logs: &BucketHandle,
    certificate_arn: &str,
) -> CdnSpec {
    CdnSpec {
        logical_name: "cdn".to_string(),
        enabled: true,
        aliases: vec![config.target_domain.clone()],
        origin: CdnOrigin {
            origin_id: content.id.clone(),
            domain_name: content.website_endpoint.clone(),
            protocol_policy: "http-only".to_string(),
            ssl_protocols: vec!["TLSv1.2".to_string()],
        },
        default_root_object: config.index_document.clone(),
        cache: CacheBehavior {
            allowed_methods: ["GET", "HEAD", "OPTIONS"].map(String::from).to_vec(),
            cached_methods: ["GET", "HEAD", "OPTIONS"].map(String::from).to_vec(),
            viewer_protocol_policy: "redirect-to-https".to_string(),
            min_ttl_seconds: 0,
            default_ttl_seconds: CACHE_TTL_SECONDS,
            max_ttl_seconds: CACHE_TTL_SECONDS,
            forward_query_string: false,
            forward_cookies: false,
        },
        price_class: "PriceClass_100".to_string(),
        custom_error_responses: vec![CustomErrorResponse {
            error_code: 404,
            response_code: 404,
            response_page_path: format!("/{}", config.error_document),
        }],
        geo_restriction: GeoRestriction::none(),
        viewer_certificate: ViewerCertificate {
            certificate_arn: certificate_arn.to_string(),
            ssl_support_method: "sni-only".to_string(),
            minimum_protocol_version: "TLSv1.2_2021".to_string(),
        },
        logging: CdnLogging {
            bucket: logs.bucket_domain_name.clone(),
            prefix: format!("{}/cloudfront", config.target_domain),
            include_cookies: false,
        },
        wait_for_deployment: false,
    }
}

/// The run's observable result, as asynchronous handles
#[derive(Debug, Clone)]
pub struct StackOutputs {
    pub content_bucket_url: AsyncValue<String>,
    pub content_bucket_website_endpoint: AsyncValue<String>,
    pub cloudfront_domain: AsyncValue<String>,
    pub target_domain_endpoint: AsyncValue<String>,
}

impl StackOutputs {
    /// Await every exported value. The run only counts as successful once
    /// all four have resolved.
    pub async fn resolve(&self) -> ProvisionResult<ResolvedOutputs> {
        let (content_bucket_url, content_bucket_website_endpoint, cloudfront_domain, target_domain_endpoint) = futures::try_join!(
            self.content_bucket_url.resolve(),
            self.content_bucket_website_endpoint.resolve(),
            self.cloudfront_domain.resolve(),
            self.target_domain_endpoint.resolve(),
        )?;
        Ok(ResolvedOutputs {
            content_bucket_url,
            content_bucket_website_endpoint,
            cloudfront_domain,
            target_domain_endpoint,
        })
    }
}

/// Fully resolved exports of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOutputs {
    pub content_bucket_url: String,
    pub content_bucket_website_endpoint: String,
    pub cloudfront_domain: String,
    pub target_domain_endpoint: String,
}

impl std::fmt::Display for ResolvedOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "content_bucket_url: {}", self.content_bucket_url)?;
        writeln!(
            f,
            "content_bucket_website_endpoint: {}",
            self.content_bucket_website_endpoint
        )?;
        writeln!(f, "cloudfront_domain: {}", self.cloudfront_domain)?;
        write!(f, "target_domain_endpoint: {}", self.target_domain_endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn content_bucket_logs_into_log_bucket() {
        let config = StackConfig::new("app.example.com");
        let spec = content_bucket_spec(&config, "app.example.com-logs");

        assert_eq!(spec.bucket, "app.example.com");
        assert_eq!(spec.acl, BucketAcl::PublicRead);
        let logging = spec.logging.unwrap();
        assert_eq!(logging.target_bucket, "app.example.com-logs");
        assert_eq!(logging.target_prefix, "app.example.com/s3");
        assert_eq!(spec.website.unwrap().index_document, "index.html");
        assert_eq!(spec.tags.get("allow_public").map(String::as_str), Some("true"));
    }

    #[test]
    fn cdn_spec_ties_the_stack_together() {
        let config = StackConfig::new("app.example.com");
        let content = BucketHandle {
            id: "app.example.com".to_string(),
            bucket_domain_name: "app.example.com.storage.test".to_string(),
            website_endpoint: "app.example.com.website.test".to_string(),
        };
        let logs = BucketHandle {
            id: "app.example.com-logs".to_string(),
            bucket_domain_name: "app.example.com-logs.storage.test".to_string(),
            website_endpoint: String::new(),
        };

        let spec = cdn_spec(&config, &content, &logs, "arn:cert:123");

        assert_eq!(spec.aliases, vec!["app.example.com"]);
        assert_eq!(spec.origin.domain_name, "app.example.com.website.test");
        assert_eq!(spec.origin.protocol_policy, "http-only");
        assert_eq!(spec.viewer_certificate.certificate_arn, "arn:cert:123");
        assert_eq!(spec.logging.bucket, "app.example.com-logs.storage.test");
        assert_eq!(spec.cache.default_ttl_seconds, 600);
        assert!(!spec.wait_for_deployment);
        assert_eq!(spec.custom_error_responses[0].response_page_path, "/404.html");
    }
}
