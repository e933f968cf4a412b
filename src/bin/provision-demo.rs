//! Provision the hosting stack against the in-memory provider.
//!
//! Reads `SITESTACK_TARGET_DOMAIN` (and optionally
//! `SITESTACK_CERTIFICATE_ARN`), runs a full provisioning pass, and prints
//! the resolved exports as JSON.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use sitestack::{DomainSplit, MemoryProvider, SiteStack, StackConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = StackConfig::from_env()?;
    let split = DomainSplit::of(&config.target_domain)?;

    // The zone is a precondition; seed one for the demo.
    let provider = Arc::new(
        MemoryProvider::new().with_zone(&split.registered_domain, "Z-DEMO-ZONE"),
    );

    let stack = SiteStack::new(config)?;
    let outputs = stack.provision(provider).await?;

    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}
