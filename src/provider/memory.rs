//! In-memory provider
//!
//! A recording fake used by the test suite and the demo binary. It honors
//! the provider contract: every create call is create-or-update keyed by
//! logical name, so repeated runs converge instead of duplicating objects.
//! Certificate validation only succeeds after the matching DNS record was
//! actually created here, which makes ordering bugs in the graph visible.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

use super::{
    AliasRecordSpec, BucketHandle, BucketSpec, CdnHandle, CdnSpec, CertificateHandle,
    CloudProvider, DnsRecordSpec, ProviderFailure, ProviderResult, RecordHandle,
    ValidationMethod, ValidationOption,
};
use crate::domain::{DnsZone, ZoneId};

#[derive(Default)]
struct MemoryState {
    zones: Vec<DnsZone>,
    buckets: BTreeMap<String, BucketSpec>,
    records: BTreeMap<String, DnsRecordSpec>,
    alias_records: BTreeMap<String, AliasRecordSpec>,
    distributions: BTreeMap<String, CdnSpec>,
    certificates: BTreeMap<String, String>,
    calls: Vec<String>,
    failures: HashMap<String, ProviderFailure>,
    validation_failure: Option<ProviderFailure>,
}

/// In-process [`CloudProvider`] with inspectable state
#[derive(Default)]
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a hosted zone; zones are a precondition, the
    /// orchestrator never creates them.
    pub fn with_zone(self, apex_domain: &str, zone_id: &str) -> Self {
        self.state.lock().unwrap().zones.push(DnsZone {
            zone_id: ZoneId(zone_id.to_string()),
            apex_domain: apex_domain.to_string(),
        });
        self
    }

    /// Make the next call for `logical_name` fail.
    pub fn fail_on(self, logical_name: &str, failure: ProviderFailure) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(logical_name.to_string(), failure);
        self
    }

    /// Make certificate validation fail instead of confirming.
    pub fn with_validation_failure(self, failure: ProviderFailure) -> Self {
        self.state.lock().unwrap().validation_failure = Some(failure);
        self
    }

    /// Every call made, as `method:key` strings in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// How many times `method` was invoked.
    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(&format!("{method}:")))
            .count()
    }

    /// Number of distinct external objects currently held.
    pub fn resource_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.buckets.len()
            + state.records.len()
            + state.alias_records.len()
            + state.distributions.len()
            + state.certificates.len()
    }

    pub fn bucket(&self, logical_name: &str) -> Option<BucketSpec> {
        self.state.lock().unwrap().buckets.get(logical_name).cloned()
    }

    pub fn dns_record(&self, logical_name: &str) -> Option<DnsRecordSpec> {
        self.state.lock().unwrap().records.get(logical_name).cloned()
    }

    pub fn alias_record(&self, logical_name: &str) -> Option<AliasRecordSpec> {
        self.state
            .lock()
            .unwrap()
            .alias_records
            .get(logical_name)
            .cloned()
    }

    pub fn distribution(&self, logical_name: &str) -> Option<CdnSpec> {
        self.state
            .lock()
            .unwrap()
            .distributions
            .get(logical_name)
            .cloned()
    }

    fn check_failure(state: &mut MemoryState, logical_name: &str) -> ProviderResult<()> {
        match state.failures.remove(logical_name) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CloudProvider for MemoryProvider {
    async fn create_bucket(&self, spec: &BucketSpec) -> ProviderResult<BucketHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create_bucket:{}", spec.logical_name));
        Self::check_failure(&mut state, &spec.logical_name)?;

        debug!(bucket = %spec.bucket, "memory provider: bucket upsert");
        state
            .buckets
            .insert(spec.logical_name.clone(), spec.clone());
        Ok(BucketHandle {
            id: spec.bucket.clone(),
            bucket_domain_name: format!("{}.storage.test", spec.bucket),
            website_endpoint: format!("{}.website.test", spec.bucket),
        })
    }

    async fn request_certificate(
        &self,
        logical_name: &str,
        domain: &str,
        _method: ValidationMethod,
    ) -> ProviderResult<CertificateHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("request_certificate:{logical_name}"));
        Self::check_failure(&mut state, logical_name)?;

        let arn = format!("arn:mock:acm:{domain}");
        state
            .certificates
            .insert(logical_name.to_string(), arn.clone());
        Ok(CertificateHandle {
            arn,
            validation_options: vec![ValidationOption {
                domain_name: domain.to_string(),
                record_name: format!("_validate.{domain}."),
                record_type: "CNAME".to_string(),
                record_value: format!("_token.{domain}.validations.test."),
            }],
        })
    }

    async fn create_dns_record(&self, spec: &DnsRecordSpec) -> ProviderResult<RecordHandle> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("create_dns_record:{}", spec.logical_name));
        Self::check_failure(&mut state, &spec.logical_name)?;

        state
            .records
            .insert(spec.logical_name.clone(), spec.clone());
        Ok(RecordHandle {
            fqdn: spec.name.trim_end_matches('.').to_string(),
        })
    }

    async fn await_certificate_validation(
        &self,
        arn: &str,
        record_fqdns: &[String],
    ) -> ProviderResult<String> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("await_certificate_validation:{arn}"));
        if let Some(failure) = state.validation_failure.take() {
            return Err(failure);
        }
        if !state.certificates.values().any(|known| known == arn) {
            return Err(ProviderFailure::Api(format!(
                "unknown certificate '{arn}'"
            )));
        }

        // The validation record must actually exist before confirmation.
        for fqdn in record_fqdns {
            let present = state
                .records
                .values()
                .any(|r| r.name.trim_end_matches('.') == fqdn.trim_end_matches('.'));
            if !present {
                return Err(ProviderFailure::ValidationRejected(format!(
                    "validation record '{fqdn}' not resolvable"
                )));
            }
        }
        Ok(arn.to_string())
    }

    async fn create_cdn_distribution(&self, spec: &CdnSpec) -> ProviderResult<CdnHandle> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("create_cdn_distribution:{}", spec.logical_name));
        Self::check_failure(&mut state, &spec.logical_name)?;

        state
            .distributions
            .insert(spec.logical_name.clone(), spec.clone());
        Ok(CdnHandle {
            domain_name: format!("{}.cdn.test", spec.logical_name),
            hosted_zone_id: ZoneId("ZCDNFIXED".to_string()),
        })
    }

    async fn find_zone(&self, registered_domain: &str) -> ProviderResult<Vec<DnsZone>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("find_zone:{registered_domain}"));
        Ok(state
            .zones
            .iter()
            .filter(|z| z.apex_domain == registered_domain)
            .cloned()
            .collect())
    }

    async fn create_alias_record(&self, spec: &AliasRecordSpec) -> ProviderResult<RecordHandle> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("create_alias_record:{}", spec.logical_name));
        Self::check_failure(&mut state, &spec.logical_name)?;

        let apex = state
            .zones
            .iter()
            .find(|z| z.zone_id == spec.zone_id)
            .map(|z| z.apex_domain.clone())
            .ok_or_else(|| ProviderFailure::Api(format!("unknown zone '{}'", spec.zone_id)))?;
        let fqdn = if spec.name.is_empty() {
            apex
        } else {
            format!("{}.{apex}", spec.name)
        };

        state
            .alias_records
            .insert(spec.logical_name.clone(), spec.clone());
        Ok(RecordHandle { fqdn })
    }
}
