//! Uniqueness check for nodes joining an installed cluster.

use crate::error::{NodeField, PlanError};
use crate::plan::{Node, NodeRole, Plan};

/// Fail if `candidate` shares a hostname, IP or internal IP with any node
/// in the worker, ingress or storage pools. Stops at the first collision.
pub fn ensure_node_is_new(plan: &Plan, candidate: &Node) -> Result<(), PlanError> {
    for role in NodeRole::ALL {
        for existing in &plan.pool(role).nodes {
            if let Some((field, value)) = collision(existing, candidate) {
                return Err(PlanError::DuplicateNode {
                    field,
                    value: value.to_owned(),
                    pool: role,
                });
            }
        }
    }
    Ok(())
}

fn collision<'a>(existing: &Node, candidate: &'a Node) -> Option<(NodeField, &'a str)> {
    if existing.host == candidate.host {
        return Some((NodeField::Host, &candidate.host));
    }
    if existing.ip == candidate.ip {
        return Some((NodeField::Ip, &candidate.ip));
    }
    if !candidate.internal_ip.is_empty() && existing.internal_ip == candidate.internal_ip {
        return Some((NodeField::InternalIp, &candidate.internal_ip));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Plan {
        let mut plan = Plan::default();
        plan.worker.nodes.push(Node::new("a", "1.1.1.1"));
        plan.storage
            .nodes
            .push(Node::new("s", "4.4.4.4").internal_ip("10.0.0.4"));
        plan
    }

    #[test]
    fn host_collision() {
        let err = ensure_node_is_new(&plan(), &Node::new("a", "2.2.2.2")).unwrap_err();
        assert!(matches!(
            err,
            PlanError::DuplicateNode {
                field: NodeField::Host,
                pool: NodeRole::Worker,
                ..
            }
        ));
    }

    #[test]
    fn ip_collision() {
        let err = ensure_node_is_new(&plan(), &Node::new("b", "1.1.1.1")).unwrap_err();
        assert!(matches!(
            err,
            PlanError::DuplicateNode {
                field: NodeField::Ip,
                ..
            }
        ));
    }

    #[test]
    fn new_node_is_admitted() {
        ensure_node_is_new(&plan(), &Node::new("b", "3.3.3.3")).unwrap();
    }

    #[test]
    fn internal_ip_collision_across_pools() {
        let candidate = Node::new("c", "5.5.5.5").internal_ip("10.0.0.4");
        let err = ensure_node_is_new(&plan(), &candidate).unwrap_err();
        assert!(matches!(
            err,
            PlanError::DuplicateNode {
                field: NodeField::InternalIp,
                pool: NodeRole::Storage,
                ..
            }
        ));
        assert!(err.to_string().contains("10.0.0.4"));
    }

    #[test]
    fn empty_internal_ips_never_collide() {
        let mut plan = Plan::default();
        plan.ingress.nodes.push(Node::new("i", "6.6.6.6"));
        ensure_node_is_new(&plan, &Node::new("j", "7.7.7.7")).unwrap();
    }

    #[test]
    fn etcd_and_master_pools_are_not_checked() {
        let mut plan = Plan::default();
        plan.etcd.nodes.push(Node::new("e", "8.8.8.8"));
        plan.master.nodes.push(Node::new("m", "9.9.9.9"));
        ensure_node_is_new(&plan, &Node::new("e", "9.9.9.9")).unwrap();
    }
}
