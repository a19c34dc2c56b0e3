//! Shared test utilities for kismatic integration tests.
//!
//! Provides plan fixtures and recording fakes for the engine traits, so
//! workflows can be exercised without touching real machines.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;

use kismatic_core::engine::{
    CertificateCheck, ConnectivityCheck, Executor, ProvisionOptions, Provisioner,
};
use kismatic_core::plan::{Node, NodeGroup, NodeRole, Plan, SshConfig, apply_defaults};
use kismatic_core::validate::ValidationErrors;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A plan that passes structural validation: one etcd, one master and one
/// worker node.
pub fn sample_plan() -> Plan {
    let mut plan = apply_defaults(Plan::default());
    plan.cluster.name = "kubernetes".to_owned();
    plan.cluster.admin_password = "secret".to_owned();
    plan.cluster.ssh = SshConfig {
        user: "kismaticuser".to_owned(),
        key: "/home/kismatic/.ssh/id_rsa".to_owned(),
        port: 22,
    };
    let networking = &mut plan.cluster.networking;
    networking.pod_cidr_block = "172.16.0.0/16".to_owned();
    networking.service_cidr_block = "172.20.0.0/16".to_owned();
    plan.cluster.certificates.expiry = "17520h".to_owned();

    plan.etcd = NodeGroup {
        expected_count: 1,
        nodes: vec![Node::new("etcd01", "10.0.0.1")],
    };
    plan.master.expected_count = 1;
    plan.master.nodes = vec![Node::new("master01", "10.0.0.2")];
    plan.master.load_balanced_fqdn = "10.0.0.2".to_owned();
    plan.master.load_balanced_short_name = "10.0.0.2".to_owned();
    plan.worker = NodeGroup {
        expected_count: 1,
        nodes: vec![Node::new("worker01", "10.0.0.3")],
    };
    plan
}

/// [`sample_plan`] with `count` workers named `worker01..` on `10.0.1.x`.
pub fn plan_with_workers(count: u8) -> Plan {
    let mut plan = sample_plan();
    plan.worker = NodeGroup {
        expected_count: u32::from(count),
        nodes: (1..=count)
            .map(|i| Node::new(format!("worker{i:02}"), format!("10.0.1.{i}")))
            .collect(),
    };
    plan
}

// ---------------------------------------------------------------------------
// Fake installation engine
// ---------------------------------------------------------------------------

/// Records every call; fails the call whose name matches `fail_on`.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    pub fail_on: Option<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: &'static str) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::default()
        }
    }

    /// Calls seen so far, e.g. `["pre_flight", "install"]`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.to_owned());
        }
        let name = call.split(':').next().unwrap_or(call);
        if self.fail_on == Some(name) {
            bail!("{name} failed");
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn run_play(&self, task: &str, _plan: &Plan, _restart_services: bool) -> Result<()> {
        self.record(&format!("run_play:{task}"))
    }

    async fn install(&self, _plan: &Plan, restart_services: bool) -> Result<()> {
        if restart_services {
            self.record("install:restart")
        } else {
            self.record("install")
        }
    }

    async fn run_pre_flight_check(&self, _plan: &Plan) -> Result<()> {
        self.record("pre_flight")
    }

    async fn run_new_node_pre_flight_check(&self, _plan: &Plan, node: &Node) -> Result<()> {
        self.record(&format!("new_node_pre_flight:{}", node.host))
    }

    async fn run_smoke_test(&self, _plan: &Plan) -> Result<()> {
        self.record("smoke_test")
    }

    async fn generate_certificates(&self, _plan: &Plan, _force: bool) -> Result<()> {
        self.record("generate_certificates")
    }

    async fn add_node(
        &self,
        plan: &Plan,
        node: &Node,
        roles: &[NodeRole],
        _restart_services: bool,
    ) -> Result<Plan> {
        self.record(&format!("add_node:{}", node.host))?;
        let mut updated = plan.clone();
        updated.add_node(node, roles);
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Fake provisioning engine
// ---------------------------------------------------------------------------

/// Fills every empty node IP with `10.99.0.x` on provision; records destroys.
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    pub fail: bool,
    destroyed: Mutex<Vec<(String, String)>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(provider, cluster_name)` pairs passed to `destroy`.
    pub fn destroyed(&self) -> Vec<(String, String)> {
        self.destroyed.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(&self, plan: &Plan, _opts: &ProvisionOptions) -> Result<Plan> {
        if self.fail {
            bail!("provisioner failed");
        }
        let mut updated = plan.clone();
        let mut next = 1;
        for pool in [
            &mut updated.etcd.nodes,
            &mut updated.master.nodes,
            &mut updated.worker.nodes,
        ] {
            for node in pool.iter_mut().filter(|n| n.ip.is_empty()) {
                node.ip = format!("10.99.0.{next}");
                node.host = format!("node{next}");
                next += 1;
            }
        }
        Ok(updated)
    }

    async fn destroy(&self, provider: &str, cluster_name: &str) -> Result<()> {
        if self.fail {
            bail!("provisioner failed");
        }
        if let Ok(mut destroyed) = self.destroyed.lock() {
            destroyed.push((provider.to_owned(), cluster_name.to_owned()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake checks
// ---------------------------------------------------------------------------

/// Connectivity and certificate checks that fail on demand.
#[derive(Debug, Default)]
pub struct FakeChecks {
    /// Hosts that refuse SSH connections.
    pub unreachable: Vec<String>,
    /// Finding reported by the certificate check, if any.
    pub certificate_error: Option<String>,
}

impl FakeChecks {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn unreachable(hosts: &[&str]) -> Self {
        Self {
            unreachable: hosts.iter().map(|h| (*h).to_owned()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ConnectivityCheck for FakeChecks {
    async fn check_node(
        &self,
        _ssh: &SshConfig,
        node: &Node,
        label: &str,
    ) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::new(label);
        if self.unreachable.contains(&node.host) {
            errs.push(format!("{label}: could not connect to {}:22", node.ip));
        }
        errs.into_result()
    }
}

impl CertificateCheck for FakeChecks {
    fn validate_certificates(
        &self,
        _plan: &Plan,
        _generated_dir: &Path,
    ) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::new("certificates");
        if let Some(finding) = &self.certificate_error {
            errs.push(finding.clone());
        }
        errs.into_result()
    }
}
