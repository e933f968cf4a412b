//! Declarative provisioning of a static-website hosting stack
//!
//! This crate materializes one fixed topology against an abstract cloud
//! provider: a request-log bucket, a content bucket configured as a
//! website, an optional DNS-validated TLS certificate, a CDN distribution
//! in front of the content bucket, and an alias record pointing the target
//! domain at the CDN.
//!
//! The interesting part is the orchestration, not any single call: resource
//! inputs can reference other resources' not-yet-known outputs through
//! [`AsyncValue`] handles, the [`ProvisioningGraph`] turns those references
//! into explicit dependency edges and executes them in order, and the
//! certificate branch is included or bypassed once at construction time.

pub mod certificate;
pub mod config;
pub mod domain;
pub mod errors;
pub mod graph;
pub mod provider;
pub mod stack;
pub mod state_machine;
pub mod value;

// Re-export commonly used types
pub use certificate::{CertificateSource, CertificateState};
pub use config::StackConfig;
pub use domain::{DnsZone, DomainSplit, Hostname, ZoneId};
pub use errors::{ProvisionError, ProvisionResult};
pub use graph::{ExecutionReport, NodeStatus, ProvisioningGraph, ResourceKind};
pub use provider::{CloudProvider, MemoryProvider};
pub use stack::{ResolvedOutputs, SiteStack, StackOutputs};
pub use value::{AsyncValue, DependencySet, OutputSlot};
