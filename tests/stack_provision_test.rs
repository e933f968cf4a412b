//! End-to-end provisioning scenarios against the in-memory provider

use std::sync::Arc;

use pretty_assertions::assert_eq;

use sitestack::errors::ProvisionError;
use sitestack::provider::ProviderFailure;
use sitestack::{MemoryProvider, SiteStack, StackConfig};

fn provider_with_zone(apex: &str) -> Arc<MemoryProvider> {
    Arc::new(MemoryProvider::new().with_zone(apex, "Z2FDTNDATAQYW2"))
}

#[tokio::test]
async fn provisions_the_full_stack_with_certificate_issuance() {
    let provider = provider_with_zone("example.com");
    let stack = SiteStack::new(StackConfig::new("app.example.com")).unwrap();

    let outputs = stack.provision(provider.clone()).await.unwrap();

    assert_eq!(outputs.content_bucket_url, "s3://app.example.com");
    assert_eq!(
        outputs.content_bucket_website_endpoint,
        "app.example.com.website.test"
    );
    assert_eq!(outputs.cloudfront_domain, "cdn.cdn.test");
    assert_eq!(outputs.target_domain_endpoint, "https://app.example.com/");

    // The certificate workflow ran end to end.
    assert_eq!(provider.call_count("request_certificate"), 1);
    let validation = provider.dns_record("app.example.com-validation").unwrap();
    assert_eq!(validation.record_type, "CNAME");
    assert_eq!(validation.ttl_seconds, 600);

    // The CDN used the validated certificate identifier.
    let cdn = provider.distribution("cdn").unwrap();
    assert_eq!(
        cdn.viewer_certificate.certificate_arn,
        "arn:mock:acm:app.example.com"
    );
    assert_eq!(cdn.aliases, vec!["app.example.com"]);

    // Alias record binds the subdomain with health-aware routing.
    let alias = provider.alias_record("app.example.com").unwrap();
    assert_eq!(alias.name, "app");
    assert!(alias.target.evaluate_target_health);

    // Validation is confirmed before the CDN materializes.
    let calls = provider.calls();
    let await_idx = calls
        .iter()
        .position(|c| c.starts_with("await_certificate_validation:"))
        .unwrap();
    let cdn_idx = calls
        .iter()
        .position(|c| c.starts_with("create_cdn_distribution:"))
        .unwrap();
    assert!(await_idx < cdn_idx);
}

#[tokio::test]
async fn supplied_certificate_bypasses_the_workflow() {
    let provider = provider_with_zone("example.com");
    let config = StackConfig::new("example.com").with_certificate_arn("arn:cert:123");
    let stack = SiteStack::new(config).unwrap();

    let outputs = stack.provision(provider.clone()).await.unwrap();

    // Zero certificate calls of any kind.
    assert_eq!(provider.call_count("request_certificate"), 0);
    assert_eq!(provider.call_count("await_certificate_validation"), 0);
    assert!(provider.dns_record("example.com-validation").is_none());

    let cdn = provider.distribution("cdn").unwrap();
    assert_eq!(cdn.viewer_certificate.certificate_arn, "arn:cert:123");

    // Apex domain: the alias record name is the empty subdomain.
    assert_eq!(provider.alias_record("example.com").unwrap().name, "");

    // All four exports are still present.
    assert_eq!(outputs.content_bucket_url, "s3://example.com");
    assert_eq!(outputs.target_domain_endpoint, "https://example.com/");
    assert!(!outputs.cloudfront_domain.is_empty());
    assert!(!outputs.content_bucket_website_endpoint.is_empty());
}

#[tokio::test]
async fn missing_zone_fails_before_any_resource_exists() {
    let provider = Arc::new(MemoryProvider::new());
    let stack = SiteStack::new(StackConfig::new("app.example.com")).unwrap();

    let err = stack
        .provision(provider.clone())
        .await
        .unwrap_err();

    assert_eq!(err, ProvisionError::ZoneNotFound("example.com".to_string()));
    assert_eq!(provider.resource_count(), 0);
}

#[tokio::test]
async fn ambiguous_zone_is_not_disambiguated() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_zone("example.com", "Z1")
            .with_zone("example.com", "Z2"),
    );
    let stack = SiteStack::new(StackConfig::new("app.example.com")).unwrap();

    let err = stack
        .provision(provider.clone())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProvisionError::AmbiguousZone {
            domain: "example.com".to_string(),
            matches: 2,
        }
    );
    assert_eq!(provider.resource_count(), 0);
}

#[tokio::test]
async fn rerunning_converges_without_duplicates() {
    let provider = provider_with_zone("example.com");
    let stack = SiteStack::new(StackConfig::new("app.example.com")).unwrap();

    let first = stack.provision(provider.clone()).await.unwrap();
    let count_after_first = provider.resource_count();

    let second = stack.provision(provider.clone()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.resource_count(), count_after_first);

    // Validation stays ordered before the CDN on the second run too.
    let calls = provider.calls();
    let last_await = calls
        .iter()
        .rposition(|c| c.starts_with("await_certificate_validation:"))
        .unwrap();
    let last_cdn = calls
        .iter()
        .rposition(|c| c.starts_with("create_cdn_distribution:"))
        .unwrap();
    assert!(last_await < last_cdn);
}

#[tokio::test]
async fn rejected_validation_stops_the_cdn_but_not_the_buckets() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_zone("example.com", "Z1")
            .with_validation_failure(ProviderFailure::ValidationRejected(
                "CAA record forbids issuance".to_string(),
            )),
    );
    let stack = SiteStack::new(StackConfig::new("app.example.com")).unwrap();

    let err = stack
        .provision(provider.clone())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ProvisionError::ValidationRejected {
            domain: "app.example.com".to_string(),
            reason: "CAA record forbids issuance".to_string(),
        }
    );

    // Everything downstream of validation is absent.
    assert!(provider.distribution("cdn").is_none());
    assert!(provider.alias_record("app.example.com").is_none());
    // Independent branches still materialized.
    assert!(provider.bucket("requestLogs").is_some());
    assert!(provider.bucket("contentBucket").is_some());
}

#[tokio::test]
async fn provider_failure_names_the_resource() {
    let provider = Arc::new(
        MemoryProvider::new()
            .with_zone("example.com", "Z1")
            .fail_on("contentBucket", ProviderFailure::Api("access denied".to_string())),
    );
    let stack = SiteStack::new(StackConfig::new("app.example.com")).unwrap();

    let err = stack
        .provision(provider.clone())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProvisionError::Provider {
            resource: "contentBucket".to_string(),
            message: "api call failed: access denied".to_string(),
        }
    );

    // The log bucket precedes the content bucket, so it still exists.
    assert!(provider.bucket("requestLogs").is_some());
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    assert!(SiteStack::new(StackConfig::new("")).is_err());
    assert!(SiteStack::new(StackConfig::new("bad..domain")).is_err());
}
