//! Plan templates for hand-editing.
//!
//! A template is a complete plan whose pools hold the requested number of
//! empty placeholder nodes, so the written file already has the right shape
//! and the user only fills in hosts and addresses.

use super::defaults::{
    self, CNI_PROVIDER_WEAVE, DEFAULT_CA_EXPIRY, DEFAULT_CERT_EXPIRY, DEFAULT_POD_CIDR,
    DEFAULT_SERVICE_CIDR, DEFAULT_SSH_PORT, DNS_PROVIDER, HEAPSTER_REPLICAS,
    HEAPSTER_SERVICE_TYPE, HEAPSTER_SINK, HELM_NAMESPACE, KUBERNETES_VERSION,
};
use super::migrate::LEGACY_PACKAGE_MANAGER_PROVIDER;
use super::model::{
    Cni, Dashboard, DockerLogs, HeapsterMonitoring, MasterNodeGroup, Node, NodeGroup, NfsVolume,
    Plan,
};

/// Infrastructure target on which calico is replaced by weave.
pub const WEAVE_INFRASTRUCTURE: &str = "azure";

/// What the user asked for when generating a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanTemplateOptions {
    pub cluster_name: String,
    /// Provisioner provider (e.g. `aws`), empty for existing machines.
    pub infrastructure_provisioner: String,
    pub etcd_nodes: u32,
    pub master_nodes: u32,
    pub worker_nodes: u32,
    pub ingress_nodes: u32,
    pub storage_nodes: u32,
    pub nfs_volumes: u32,
    pub admin_password: String,
}

/// Build a complete plan from template options.
pub fn build_from_template(opts: &PlanTemplateOptions) -> Plan {
    let mut plan = Plan::default();

    let cluster = &mut plan.cluster;
    cluster.name = opts.cluster_name.clone();
    cluster.version = KUBERNETES_VERSION.to_owned();
    cluster.admin_password = opts.admin_password.clone();
    cluster.ssh.port = DEFAULT_SSH_PORT;
    cluster.networking.pod_cidr_block = DEFAULT_POD_CIDR.to_owned();
    cluster.networking.service_cidr_block = DEFAULT_SERVICE_CIDR.to_owned();
    cluster.certificates.expiry = DEFAULT_CERT_EXPIRY.to_owned();
    cluster.certificates.ca_expiry = DEFAULT_CA_EXPIRY.to_owned();

    plan.provisioner.provider = opts.infrastructure_provisioner.clone();

    plan.docker.logs = DockerLogs {
        driver: defaults::DOCKER_LOG_DRIVER.to_owned(),
        opts: defaults::docker_log_opts().collect(),
    };
    let device = &mut plan.docker.storage.direct_lvm_block_device;
    device.thinpool_percent = defaults::THINPOOL_PERCENT.to_owned();
    device.thinpool_metapercent = defaults::THINPOOL_META_PERCENT.to_owned();
    device.thinpool_autoextend_threshold = defaults::THINPOOL_AUTOEXTEND_THRESHOLD.to_owned();
    device.thinpool_autoextend_percent = defaults::THINPOOL_AUTOEXTEND_PERCENT.to_owned();

    plan.add_ons.cni = Some(if opts.infrastructure_provisioner == WEAVE_INFRASTRUCTURE {
        Cni {
            provider: CNI_PROVIDER_WEAVE.to_owned(),
            ..Cni::default()
        }
    } else {
        defaults::calico_cni()
    });
    plan.add_ons.dns.provider = DNS_PROVIDER.to_owned();

    let mut heapster = HeapsterMonitoring::default();
    heapster.options.heapster.replicas = HEAPSTER_REPLICAS;
    heapster.options.heapster.service_type = HEAPSTER_SERVICE_TYPE.to_owned();
    heapster.options.heapster.sink = HEAPSTER_SINK.to_owned();
    plan.add_ons.heapster_monitoring = Some(heapster);

    plan.add_ons.package_manager.provider = LEGACY_PACKAGE_MANAGER_PROVIDER.to_owned();
    plan.add_ons.package_manager.options.helm.namespace = HELM_NAMESPACE.to_owned();
    plan.add_ons.dashboard = Some(Dashboard::default());

    plan.etcd = NodeGroup::placeholders(opts.etcd_nodes);
    plan.master = MasterNodeGroup {
        expected_count: opts.master_nodes,
        nodes: vec![Node::default(); opts.master_nodes as usize],
        ..MasterNodeGroup::default()
    };
    plan.worker = NodeGroup::placeholders(opts.worker_nodes);
    plan.ingress = NodeGroup::placeholders(opts.ingress_nodes);
    plan.storage = NodeGroup::placeholders(opts.storage_nodes);

    plan.nfs.volumes = (0..opts.nfs_volumes)
        .map(|_| NfsVolume {
            host: String::new(),
            path: "/".to_owned(),
        })
        .collect();

    plan
}
