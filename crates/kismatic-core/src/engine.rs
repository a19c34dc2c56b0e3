//! Seams to the external engines that act on real machines.
//!
//! The installation engine runs plays against nodes, the provisioning
//! engine creates and destroys infrastructure, and the checks verify that
//! nodes and certificates are usable. Workflows only talk to these traits,
//! so every engine can be swapped for a fake in tests.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::plan::{Node, NodeRole, Plan, SshConfig};
use crate::validate::ValidationErrors;

/// Installation engine.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a single named play, e.g. `_docker.yaml`.
    async fn run_play(&self, task: &str, plan: &Plan, restart_services: bool) -> Result<()>;

    /// Install the whole cluster.
    async fn install(&self, plan: &Plan, restart_services: bool) -> Result<()>;

    async fn run_pre_flight_check(&self, plan: &Plan) -> Result<()>;

    async fn run_new_node_pre_flight_check(&self, plan: &Plan, node: &Node) -> Result<()>;

    async fn run_smoke_test(&self, plan: &Plan) -> Result<()>;

    /// Generate cluster certificates. Existing ones are kept unless `force`.
    async fn generate_certificates(&self, plan: &Plan, force: bool) -> Result<()>;

    /// Join `node` to an installed cluster and return the plan with the node
    /// recorded in each of `roles`.
    async fn add_node(
        &self,
        plan: &Plan,
        node: &Node,
        roles: &[NodeRole],
        restart_services: bool,
    ) -> Result<Plan>;
}

/// Options passed through to the provisioning engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Allow the provisioner to destroy machines no longer in the plan.
    pub allow_destruction: bool,
}

/// Infrastructure provisioning engine.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create the machines the plan describes and return the plan with
    /// their addresses filled in.
    async fn provision(&self, plan: &Plan, opts: &ProvisionOptions) -> Result<Plan>;

    async fn destroy(&self, provider: &str, cluster_name: &str) -> Result<()>;
}

/// SSH reachability of nodes.
#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    /// Check one node. `label` names the node in findings.
    async fn check_node(
        &self,
        ssh: &SshConfig,
        node: &Node,
        label: &str,
    ) -> Result<(), ValidationErrors>;

    /// Check every node in the plan, collecting all failures.
    async fn check_plan(&self, plan: &Plan) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::new("SSH connectivity");
        for (pool, node) in plan.all_nodes() {
            let label = format!("{pool} node {:?}", node.host);
            if let Err(found) = self.check_node(&plan.cluster.ssh, node, &label).await {
                errs.findings.extend(found.findings);
            }
        }
        errs.into_result()
    }
}

/// Consistency of previously generated certificates with the plan.
pub trait CertificateCheck: Send + Sync {
    fn validate_certificates(
        &self,
        plan: &Plan,
        generated_dir: &Path,
    ) -> Result<(), ValidationErrors>;
}

const _: () = {
    fn _assert_object_safe(
        _: &dyn Executor,
        _: &dyn Provisioner,
        _: &dyn ConnectivityCheck,
        _: &dyn CertificateCheck,
    ) {
    }
};
