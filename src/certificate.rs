//! Certificate sub-workflow
//!
//! A conditional branch of the provisioning graph. When the configuration
//! already carries a certificate identifier the branch is bypassed entirely
//! and the identifier is treated as already validated. Otherwise three nodes
//! are added to the graph:
//!
//! ```text
//! NotRequested ──request──► Requested ──record──► ValidationPending ──confirm──► Validated
//!
//!   certificate            validation record          validation await
//!   (issue + options)      (name/type/value from      (long-poll until the
//!                           the first option,          CA confirms, then the
//!                           TTL 600s)                  arn flows downstream)
//! ```
//!
//! The certificate identifier only becomes resolvable after the await node
//! succeeds, so everything consuming it (the CDN) is provably ordered after
//! validation.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::DnsZone;
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{ProvisioningGraph, ResourceKind};
use crate::provider::{CloudProvider, DnsRecordSpec, ProviderFailure, ValidationMethod, ValidationOption};
use crate::state_machine::{StateMachine, StateMachineWithHistory, TransitionError, TransitionResult};
use crate::value::{AsyncValue, DependencySet};

/// Time-to-live of the DNS validation record
pub const VALIDATION_RECORD_TTL_SECONDS: u64 = 600;

/// Lifecycle of one certificate issuance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateState {
    NotRequested,
    Requested,
    ValidationPending,
    Validated,
}

/// Workflow steps (FSM inputs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateCommand {
    /// Issue the certificate request at the certificate authority
    Request,
    /// The DNS validation record was created
    RecordCreated,
    /// The certificate authority confirmed validation
    Confirm,
}

impl StateMachine for CertificateState {
    type Input = CertificateCommand;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use CertificateCommand::*;
        use CertificateState::*;

        match (self, input) {
            (NotRequested, Request) => Ok((Requested, ())),
            (Requested, RecordCreated) => Ok((ValidationPending, ())),
            (ValidationPending, Confirm) => Ok((Validated, ())),
            (from, input) => Err(TransitionError::InvalidTransition {
                from: format!("{from:?}"),
                to: format!("{input:?}"),
            }),
        }
    }
}

/// Where the CDN's certificate identifier comes from
///
/// Decided once at graph-construction time; the rest of the stack never
/// checks the optional configuration value again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// An externally supplied identifier, already in the terminal
    /// `Validated` state; the sub-workflow never runs.
    Provided(String),
    /// Issue and validate a certificate for this domain.
    Issue { domain: String },
}

impl CertificateSource {
    pub fn from_config(domain: &str, certificate_arn: Option<String>) -> Self {
        match certificate_arn {
            Some(arn) => CertificateSource::Provided(arn),
            None => CertificateSource::Issue {
                domain: domain.to_string(),
            },
        }
    }

    pub fn is_bypassed(&self) -> bool {
        matches!(self, CertificateSource::Provided(_))
    }
}

/// Wire the certificate source into the graph, returning the identifier
/// handle the CDN consumes.
///
/// For a bypassed source this is a resolved literal with no dependencies;
/// for an issued certificate it resolves only after the validation await
/// node confirms.
pub fn wire_certificate(
    graph: &mut ProvisioningGraph,
    provider: Arc<dyn CloudProvider>,
    source: CertificateSource,
    zone: &DnsZone,
) -> ProvisionResult<AsyncValue<String>> {
    match source {
        CertificateSource::Provided(arn) => {
            debug!(%arn, "certificate workflow bypassed, identifier supplied");
            Ok(AsyncValue::literal(arn))
        }
        CertificateSource::Issue { domain } => wire_issuance(graph, provider, domain, zone),
    }
}

fn wire_issuance(
    graph: &mut ProvisioningGraph,
    provider: Arc<dyn CloudProvider>,
    domain: String,
    zone: &DnsZone,
) -> ProvisionResult<AsyncValue<String>> {
    let workflow = Arc::new(Mutex::new(StateMachineWithHistory::new(
        CertificateState::NotRequested,
    )));

    // Requested: issue the certificate, outputs arrive asynchronously.
    let request = graph.reserve(ResourceKind::Certificate, "certificate")?;
    let (arn_slot, arn) = graph.output::<String>(request, "arn");
    let (options_slot, options) =
        graph.output::<Vec<ValidationOption>>(request, "validation_options");
    {
        let provider = Arc::clone(&provider);
        let workflow = Arc::clone(&workflow);
        let domain = domain.clone();
        graph.bind(request, DependencySet::none(), async move {
            match provider
                .request_certificate("certificate", &domain, ValidationMethod::Dns)
                .await
            {
                Ok(handle) => {
                    workflow.lock().await.apply(CertificateCommand::Request)?;
                    info!(%domain, arn = %handle.arn, "certificate requested");
                    arn_slot.fulfill(handle.arn);
                    options_slot.fulfill(handle.validation_options);
                    Ok(())
                }
                Err(failure) => {
                    let err = issuance_error(&domain, "certificate", failure);
                    arn_slot.fail(err.clone());
                    options_slot.fail(err.clone());
                    Err(err)
                }
            }
        })?;
    }

    // ValidationPending: prove domain control with a DNS record. Only the
    // first validation option is used; multi-domain certificates with
    // independently varying records are not modeled.
    let record_logical = format!("{domain}-validation");
    let record = graph.reserve(ResourceKind::DnsRecord, record_logical.clone())?;
    let (fqdn_slot, record_fqdn) = graph.output::<String>(record, "fqdn");
    {
        let provider = Arc::clone(&provider);
        let workflow = Arc::clone(&workflow);
        let domain = domain.clone();
        let zone_id = zone.zone_id.clone();
        let input = options.clone();
        graph.bind(record, DependencySet::on(&options), async move {
            let resolved = input.resolve().await?;
            let first = match resolved.first() {
                Some(option) => option.clone(),
                None => {
                    let err = ProvisionError::ValidationRejected {
                        domain,
                        reason: "certificate returned no validation options".to_string(),
                    };
                    fqdn_slot.fail(err.clone());
                    return Err(err);
                }
            };

            let spec = DnsRecordSpec {
                logical_name: record_logical,
                zone_id,
                name: first.record_name,
                record_type: first.record_type,
                values: vec![first.record_value],
                ttl_seconds: VALIDATION_RECORD_TTL_SECONDS,
            };
            match provider.create_dns_record(&spec).await {
                Ok(handle) => {
                    workflow
                        .lock()
                        .await
                        .apply(CertificateCommand::RecordCreated)?;
                    info!(fqdn = %handle.fqdn, "validation record created");
                    fqdn_slot.fulfill(handle.fqdn);
                    Ok(())
                }
                Err(failure) => {
                    let err = issuance_error(&domain, &spec.logical_name, failure);
                    fqdn_slot.fail(err.clone());
                    Err(err)
                }
            }
        })?;
    }

    // Validated: long-poll the certificate authority. The arn only flows
    // downstream once this node succeeds.
    let awaiting = graph.reserve(ResourceKind::CertificateValidation, "certificateValidation")?;
    let (validated_slot, validated_arn) = graph.output::<String>(awaiting, "certificate_arn");
    {
        let inputs = arn.zip(&record_fqdn);
        let deps = DependencySet::on(&inputs);
        graph.bind(awaiting, deps, async move {
            let (arn, fqdn) = inputs.resolve().await?;
            match provider.await_certificate_validation(&arn, &[fqdn]).await {
                Ok(validated) => {
                    let mut workflow = workflow.lock().await;
                    workflow.apply(CertificateCommand::Confirm)?;
                    info!(arn = %validated, state = ?workflow.current_state(), "certificate validated");
                    validated_slot.fulfill(validated);
                    Ok(())
                }
                Err(failure) => {
                    let err = issuance_error(&domain, "certificateValidation", failure);
                    validated_slot.fail(err.clone());
                    Err(err)
                }
            }
        })?;
    }

    Ok(validated_arn)
}

/// Map provider failures to the workflow's error taxonomy. Validation
/// outcomes keep the domain they concern; everything else is a plain
/// provider failure attributed to the resource.
fn issuance_error(domain: &str, resource: &str, failure: ProviderFailure) -> ProvisionError {
    match failure {
        ProviderFailure::ValidationTimeout => {
            ProvisionError::ValidationTimeout(domain.to_string())
        }
        ProviderFailure::ValidationRejected(reason) => ProvisionError::ValidationRejected {
            domain: domain.to_string(),
            reason,
        },
        ProviderFailure::Api(message) => ProvisionError::Provider {
            resource: resource.to_string(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_advances_in_order() {
        let state = CertificateState::NotRequested;
        let (state, _) = state.transition(&CertificateCommand::Request).unwrap();
        assert_eq!(state, CertificateState::Requested);
        let (state, _) = state.transition(&CertificateCommand::RecordCreated).unwrap();
        assert_eq!(state, CertificateState::ValidationPending);
        let (state, _) = state.transition(&CertificateCommand::Confirm).unwrap();
        assert_eq!(state, CertificateState::Validated);
    }

    #[test]
    fn out_of_order_steps_rejected() {
        assert!(CertificateState::NotRequested
            .transition(&CertificateCommand::Confirm)
            .is_err());
        assert!(CertificateState::Requested
            .transition(&CertificateCommand::Request)
            .is_err());
        // Validated is terminal.
        assert!(CertificateState::Validated
            .transition(&CertificateCommand::Confirm)
            .is_err());
    }

    #[test]
    fn source_decided_once_from_config() {
        let provided = CertificateSource::from_config("example.com", Some("arn:cert:123".into()));
        assert!(provided.is_bypassed());

        let issued = CertificateSource::from_config("example.com", None);
        assert_eq!(
            issued,
            CertificateSource::Issue {
                domain: "example.com".to_string()
            }
        );
    }
}
