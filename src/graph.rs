//! Provisioning graph
//!
//! The graph is the only shared mutable structure of a run. Resources are
//! declared as nodes identified by `(kind, logical_name)`; the edges are the
//! [`AsyncValue`](crate::value::AsyncValue) references a node consumes, made
//! explicit through [`DependencySet`]. Execution materializes every node
//! such that a node never starts before all of its dependencies finished.
//!
//! ```text
//! declare ──► reserve (kind, logical_name)      unique per run
//!          └► output  slots + value handles     edges back to the node
//!          └► bind    deps + materialization    at-most-once future
//!
//! execute ──► cycle check (Kahn, before any provider call)
//!          └► ready nodes run concurrently in a JoinSet
//!          └► a failure marks all transitive dependents Upstream,
//!             unrelated branches keep running
//! ```
//!
//! Scheduling imposes no artificial concurrency cap; independent branches
//! run as wide as the runtime allows. Ordering between siblings is
//! unspecified. Re-running with the same logical names is safe because the
//! provider side of every materialization is create-or-update.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::{ProvisionError, ProvisionResult};
use crate::value::{AsyncValue, DependencySet, OutputSlot};

/// Identifier of one declared node within a single graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

/// The six resource kinds of the hosting stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Bucket,
    Certificate,
    DnsRecord,
    CertificateValidation,
    CdnDistribution,
    AliasRecord,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::Certificate => "certificate",
            ResourceKind::DnsRecord => "dns-record",
            ResourceKind::CertificateValidation => "certificate-validation",
            ResourceKind::CdnDistribution => "cdn-distribution",
            ResourceKind::AliasRecord => "alias-record",
        };
        write!(f, "{name}")
    }
}

struct GraphNode {
    kind: ResourceKind,
    logical_name: String,
    deps: BTreeSet<NodeId>,
    run: Option<BoxFuture<'static, ProvisionResult<()>>>,
}

/// Dependency-ordered collection of resource declarations for one run
#[derive(Default)]
pub struct ProvisioningGraph {
    nodes: Vec<GraphNode>,
    registered: HashSet<(ResourceKind, String)>,
}

impl ProvisioningGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register a node under its idempotency key.
    ///
    /// The `(kind, logical_name)` pair must be unique within one run; the
    /// same pair across runs is how the provider recognizes an existing
    /// object to update instead of recreate.
    pub fn reserve(
        &mut self,
        kind: ResourceKind,
        logical_name: impl Into<String>,
    ) -> ProvisionResult<NodeId> {
        let logical_name = logical_name.into();
        if !self.registered.insert((kind, logical_name.clone())) {
            return Err(ProvisionError::DuplicateResource {
                kind: kind.to_string(),
                logical_name,
            });
        }
        self.nodes.push(GraphNode {
            kind,
            logical_name,
            deps: BTreeSet::new(),
            run: None,
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Create an output handle produced by `node`.
    ///
    /// The returned [`AsyncValue`] carries `node` in its dependency set, so
    /// any resource consuming it is ordered after `node`. The slot goes into
    /// the node's materialization future.
    pub fn output<T: Clone + Send + Sync + 'static>(
        &self,
        node: NodeId,
        field: &str,
    ) -> (OutputSlot<T>, AsyncValue<T>) {
        let name = format!("{}.{field}", self.nodes[node.0].logical_name);
        let (slot, value) = AsyncValue::slot(name);
        (slot, value.with_dependency(node))
    }

    /// Attach dependencies and the materialization future to a reserved node.
    pub fn bind<F>(&mut self, node: NodeId, deps: DependencySet, run: F) -> ProvisionResult<()>
    where
        F: Future<Output = ProvisionResult<()>> + Send + 'static,
    {
        if deps.contains(node) {
            return Err(ProvisionError::CycleDetected(vec![self.nodes[node.0]
                .logical_name
                .clone()]));
        }
        let entry = &mut self.nodes[node.0];
        if entry.run.is_some() {
            return Err(ProvisionError::Configuration(format!(
                "resource '{}' bound twice",
                entry.logical_name
            )));
        }
        entry.deps = deps.0;
        entry.run = Some(run.boxed());
        Ok(())
    }

    /// Reserve and bind in one step.
    pub fn declare<F>(
        &mut self,
        kind: ResourceKind,
        logical_name: impl Into<String>,
        deps: DependencySet,
        run: F,
    ) -> ProvisionResult<NodeId>
    where
        F: Future<Output = ProvisionResult<()>> + Send + 'static,
    {
        let node = self.reserve(kind, logical_name)?;
        self.bind(node, deps, run)?;
        Ok(node)
    }

    /// Kahn's algorithm over the declared edges. Runs before anything is
    /// materialized, so a cycle is a construction-time rejection.
    fn check_acyclic(&self) -> ProvisionResult<()> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut dependents = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            indegree[i] = node.deps.len();
            for dep in &node.deps {
                dependents[dep.0].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut processed = 0usize;
        while let Some(i) = queue.pop_front() {
            processed += 1;
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    queue.push_back(d);
                }
            }
        }

        if processed < n {
            let cycle: Vec<String> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| indegree[*i] > 0)
                .map(|(_, node)| node.logical_name.clone())
                .collect();
            return Err(ProvisionError::CycleDetected(cycle));
        }
        Ok(())
    }

    /// Materialize every declared node in dependency order.
    ///
    /// Nodes whose dependencies are all resolved run concurrently. When a
    /// node fails, its transitive dependents are marked
    /// [`ProvisionError::Upstream`] without running; independent branches
    /// are unaffected. Every `(kind, logical_name)` materializes at most
    /// once per call.
    pub async fn execute(mut self) -> ProvisionResult<ExecutionReport> {
        let run_id = Uuid::now_v7();

        for node in &self.nodes {
            if node.run.is_none() {
                return Err(ProvisionError::Configuration(format!(
                    "resource '{}' reserved but never bound",
                    node.logical_name
                )));
            }
        }
        self.check_acyclic()?;

        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut dependents = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            indegree[i] = node.deps.len();
            for dep in &node.deps {
                dependents[dep.0].push(i);
            }
        }

        let mut runs: Vec<Option<BoxFuture<'static, ProvisionResult<()>>>> =
            self.nodes.iter_mut().map(|node| node.run.take()).collect();
        let mut status: Vec<Option<ProvisionResult<()>>> = (0..n).map(|_| None).collect();
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut tasks: JoinSet<(usize, ProvisionResult<()>)> = JoinSet::new();

        info!(%run_id, resources = n, "executing provisioning graph");

        loop {
            while let Some(i) = ready.pop_front() {
                let failed_dep = self.nodes[i]
                    .deps
                    .iter()
                    .find(|dep| matches!(&status[dep.0], Some(Err(_))));
                if let Some(dep) = failed_dep {
                    let via = self.nodes[dep.0].logical_name.clone();
                    let resource = self.nodes[i].logical_name.clone();
                    warn!(%run_id, %resource, %via, "skipping resource, upstream failed");
                    status[i] = Some(Err(ProvisionError::Upstream { resource, via }));
                    for &d in &dependents[i] {
                        indegree[d] -= 1;
                        if indegree[d] == 0 {
                            ready.push_back(d);
                        }
                    }
                    continue;
                }

                if let Some(run) = runs[i].take() {
                    info!(
                        %run_id,
                        resource = %self.nodes[i].logical_name,
                        kind = %self.nodes[i].kind,
                        "materializing resource"
                    );
                    tasks.spawn(async move { (i, run.await) });
                }
            }

            match tasks.join_next().await {
                None => break,
                Some(Ok((i, result))) => {
                    match &result {
                        Ok(()) => {
                            debug!(%run_id, resource = %self.nodes[i].logical_name, "materialized")
                        }
                        Err(e) => {
                            error!(%run_id, resource = %self.nodes[i].logical_name, error = %e, "materialization failed")
                        }
                    }
                    status[i] = Some(result);
                    for &d in &dependents[i] {
                        indegree[d] -= 1;
                        if indegree[d] == 0 {
                            ready.push_back(d);
                        }
                    }
                }
                Some(Err(join_err)) => {
                    error!(%run_id, error = %join_err, "materialization task aborted");
                    return Err(ProvisionError::Provider {
                        resource: "provisioning-graph".to_string(),
                        message: join_err.to_string(),
                    });
                }
            }
        }

        let outcomes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| NodeOutcome {
                kind: node.kind,
                logical_name: node.logical_name.clone(),
                status: match status[i].take() {
                    Some(Ok(())) => NodeStatus::Succeeded,
                    Some(Err(e)) => NodeStatus::Failed(e),
                    None => NodeStatus::Failed(ProvisionError::Cancelled),
                },
            })
            .collect();

        Ok(ExecutionReport { run_id, outcomes })
    }
}

/// Outcome of a single node within one run
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub kind: ResourceKind,
    pub logical_name: String,
    pub status: NodeStatus,
}

/// Terminal status of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Succeeded,
    Failed(ProvisionError),
}

impl NodeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeStatus::Succeeded)
    }
}

/// Per-node outcomes of one graph execution
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub outcomes: Vec<NodeOutcome>,
}

impl ExecutionReport {
    /// The error to surface for the whole run.
    ///
    /// Root-cause failures win over the `Upstream` markers they caused, so
    /// the run is attributed to the resource that actually failed.
    pub fn first_error(&self) -> Option<&ProvisionError> {
        let failures: Vec<&ProvisionError> = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.status {
                NodeStatus::Failed(e) => Some(e),
                NodeStatus::Succeeded => None,
            })
            .collect();
        failures
            .iter()
            .find(|e| !e.is_upstream())
            .or_else(|| failures.first())
            .copied()
    }

    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_success())
    }

    pub fn outcome(&self, logical_name: &str) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.logical_name == logical_name)
    }
}
