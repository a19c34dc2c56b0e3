//! Structural validation of plans and candidate nodes.
//!
//! Validators collect every finding before reporting, so a user fixing a
//! plan sees all problems at once.

use std::fmt;
use std::net::Ipv4Addr;

use cidr::Ipv4Cidr;

use crate::plan::{Node, Plan};

/// Every finding from one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    /// What was validated, e.g. `"plan"` or `"node worker03"`.
    pub subject: String,
    pub findings: Vec<String>,
}

impl ValidationErrors {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            findings: Vec::new(),
        }
    }

    pub fn push(&mut self, finding: impl Into<String>) {
        self.findings.push(finding.into());
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// `Ok(())` when nothing was found.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed validation with {} error(s)",
            self.subject,
            self.findings.len()
        )?;
        for finding in &self.findings {
            write!(f, "\n  - {finding}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Checks plans and nodes before any remote action is taken.
pub trait PlanValidator: Send + Sync {
    fn validate_plan(&self, plan: &Plan) -> Result<(), ValidationErrors>;
    fn validate_node(&self, node: &Node) -> Result<(), ValidationErrors>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanValidator) {}
};

/// Offline checks on plan shape and field syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl PlanValidator for StructuralValidator {
    fn validate_plan(&self, plan: &Plan) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::new("plan");

        let cluster = &plan.cluster;
        if cluster.name.is_empty() {
            errs.push("cluster.name is required");
        }
        if cluster.ssh.user.is_empty() {
            errs.push("cluster.ssh.user is required");
        }
        if cluster.ssh.key.is_empty() {
            errs.push("cluster.ssh.ssh_key is required");
        }
        if cluster.ssh.port == 0 {
            errs.push("cluster.ssh.ssh_port must be a valid port");
        }

        let networking = &cluster.networking;
        for (field, block) in [
            ("pod_cidr_block", &networking.pod_cidr_block),
            ("service_cidr_block", &networking.service_cidr_block),
        ] {
            if block.parse::<Ipv4Cidr>().is_err() {
                errs.push(format!(
                    "cluster.networking.{field} {block:?} is not a valid CIDR block"
                ));
            }
        }
        if networking.service_cidr_block.parse::<Ipv4Cidr>().is_ok()
            && (plan.kubernetes_service_ip().is_err() || plan.dns_service_ip().is_err())
        {
            errs.push(format!(
                "cluster.networking.service_cidr_block {:?} has no room for the kubernetes \
                 and DNS service addresses",
                networking.service_cidr_block
            ));
        }

        for (field, value) in [
            ("expiry", &cluster.certificates.expiry),
            ("ca_expiry", &cluster.certificates.ca_expiry),
        ] {
            if !is_hour_duration(value) {
                errs.push(format!(
                    "cluster.certificates.{field} {value:?} must be a duration in hours such as 17520h"
                ));
            }
        }

        let pools = [
            ("etcd", plan.etcd.expected_count, &plan.etcd.nodes, true),
            ("master", plan.master.expected_count, &plan.master.nodes, true),
            ("worker", plan.worker.expected_count, &plan.worker.nodes, true),
            ("ingress", plan.ingress.expected_count, &plan.ingress.nodes, false),
            ("storage", plan.storage.expected_count, &plan.storage.nodes, false),
        ];
        for (pool, expected, nodes, required) in pools {
            if required && nodes.is_empty() {
                errs.push(format!("{pool}: at least one node is required"));
            }
            if expected as usize != nodes.len() {
                errs.push(format!(
                    "{pool}: expected_count is {expected} but {} node(s) are listed",
                    nodes.len()
                ));
            }
            for (i, node) in nodes.iter().enumerate() {
                for finding in node_findings(node) {
                    errs.push(format!("{pool}.nodes[{i}]: {finding}"));
                }
            }
        }

        for (i, volume) in plan.nfs.volumes.iter().enumerate() {
            if volume.host.is_empty() {
                errs.push(format!("nfs.nfs_volume[{i}]: nfs_host is required"));
            }
            if !volume.path.starts_with('/') {
                errs.push(format!(
                    "nfs.nfs_volume[{i}]: mount_path {:?} must start with '/'",
                    volume.path
                ));
            }
        }

        errs.into_result()
    }

    fn validate_node(&self, node: &Node) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::new(format!("node {:?}", node.host));
        for finding in node_findings(node) {
            errs.push(finding);
        }
        errs.into_result()
    }
}

fn node_findings(node: &Node) -> Vec<String> {
    let mut findings = Vec::new();
    if node.host.is_empty() {
        findings.push("host is required".to_owned());
    }
    if node.ip.parse::<Ipv4Addr>().is_err() {
        findings.push(format!("ip {:?} is not a valid IPv4 address", node.ip));
    }
    if !node.internal_ip.is_empty() && node.internal_ip.parse::<Ipv4Addr>().is_err() {
        findings.push(format!(
            "internalip {:?} is not a valid IPv4 address",
            node.internal_ip
        ));
    }
    findings
}

fn is_hour_duration(value: &str) -> bool {
    value
        .strip_suffix('h')
        .is_some_and(|hours| hours.parse::<u32>().is_ok_and(|h| h > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{NfsVolume, NodeGroup, apply_defaults};

    fn valid_plan() -> Plan {
        let mut plan = apply_defaults(Plan::default());
        plan.cluster.name = "demo".into();
        plan.cluster.ssh.user = "kismaticuser".into();
        plan.cluster.ssh.key = "/keys/id_rsa".into();
        plan.cluster.networking.pod_cidr_block = "172.16.0.0/16".into();
        plan.cluster.networking.service_cidr_block = "172.20.0.0/16".into();
        plan.cluster.certificates.expiry = "17520h".into();
        plan.etcd = NodeGroup {
            expected_count: 1,
            nodes: vec![Node::new("etcd01", "10.0.0.1")],
        };
        plan.master.expected_count = 1;
        plan.master.nodes = vec![Node::new("master01", "10.0.0.2")];
        plan.worker = NodeGroup {
            expected_count: 1,
            nodes: vec![Node::new("worker01", "10.0.0.3").internal_ip("192.168.0.3")],
        };
        plan
    }

    #[test]
    fn valid_plan_passes() {
        StructuralValidator.validate_plan(&valid_plan()).unwrap();
    }

    #[test]
    fn findings_are_aggregated() {
        let mut plan = valid_plan();
        plan.cluster.name.clear();
        plan.cluster.ssh.key.clear();
        plan.worker.expected_count = 3;
        plan.cluster.networking.pod_cidr_block = "nope".into();

        let errs = StructuralValidator.validate_plan(&plan).unwrap_err();
        assert_eq!(errs.findings.len(), 4, "{errs}");
        let text = errs.to_string();
        assert!(text.contains("cluster.name"));
        assert!(text.contains("ssh_key"));
        assert!(text.contains("worker: expected_count is 3"));
        assert!(text.contains("pod_cidr_block"));
    }

    #[test]
    fn template_placeholders_fail_validation() {
        let plan = crate::plan::build_from_template(&crate::plan::PlanTemplateOptions {
            cluster_name: "t".into(),
            etcd_nodes: 1,
            master_nodes: 1,
            worker_nodes: 1,
            ..Default::default()
        });
        let errs = StructuralValidator.validate_plan(&plan).unwrap_err();
        assert!(errs.findings.iter().any(|f| f.starts_with("etcd.nodes[0]: host")));
    }

    #[test]
    fn required_pools_must_have_nodes() {
        let mut plan = valid_plan();
        plan.etcd = NodeGroup::default();
        let errs = StructuralValidator.validate_plan(&plan).unwrap_err();
        assert_eq!(errs.findings, vec!["etcd: at least one node is required"]);
    }

    #[test]
    fn service_cidr_must_hold_service_addresses() {
        let mut plan = valid_plan();
        plan.cluster.networking.service_cidr_block = "172.20.0.0/31".into();
        let errs = StructuralValidator.validate_plan(&plan).unwrap_err();
        assert_eq!(errs.findings.len(), 1, "{errs}");
        assert!(errs.findings[0].contains("no room"));

        plan.cluster.networking.service_cidr_block = "172.20.0.0/30".into();
        StructuralValidator.validate_plan(&plan).unwrap();
    }

    #[test]
    fn certificate_durations_need_hours() {
        let mut plan = valid_plan();
        plan.cluster.certificates.expiry = "2y".into();
        plan.cluster.certificates.ca_expiry = "0h".into();
        let errs = StructuralValidator.validate_plan(&plan).unwrap_err();
        assert_eq!(errs.findings.len(), 2);
    }

    #[test]
    fn nfs_paths_must_be_absolute() {
        let mut plan = valid_plan();
        plan.nfs.volumes.push(NfsVolume {
            host: "nfs01".into(),
            path: "exports/data".into(),
        });
        let errs = StructuralValidator.validate_plan(&plan).unwrap_err();
        assert!(errs.findings[0].contains("must start with '/'"));
    }

    #[test]
    fn node_validation() {
        StructuralValidator
            .validate_node(&Node::new("w9", "10.0.0.9"))
            .unwrap();

        let errs = StructuralValidator
            .validate_node(&Node::new("", "10.0.0.300").internal_ip("x"))
            .unwrap_err();
        assert_eq!(errs.findings.len(), 3);
    }

    #[test]
    fn display_lists_every_finding() {
        let mut errs = ValidationErrors::new("plan");
        errs.push("first");
        errs.push("second");
        assert_eq!(
            errs.to_string(),
            "plan failed validation with 2 error(s)\n  - first\n  - second"
        );
    }
}
