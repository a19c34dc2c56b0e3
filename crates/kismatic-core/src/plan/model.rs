//! Installation plan entity types.
//!
//! These types map directly to the `kismatic-cluster.yaml` on-disk format.
//! Field names are the stable YAML keys; renaming one is a schema change that
//! needs a rule in [`super::migrate`]. Fields marked deprecated are accepted
//! on read and never written back.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use cidr::Cidr as _;
use cidr::Ipv4Cidr;
use serde::{Deserialize, Serialize};

/// Root of a plan file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub cluster: Cluster,
    pub docker: Docker,
    pub docker_registry: DockerRegistry,
    pub add_ons: AddOns,
    /// Feature toggles from before add-ons existed. Deprecated.
    #[serde(skip_serializing)]
    pub features: Option<Features>,
    pub etcd: NodeGroup,
    pub master: MasterNodeGroup,
    pub worker: NodeGroup,
    pub ingress: NodeGroup,
    pub storage: NodeGroup,
    pub nfs: Nfs,
    pub provisioner: Provisioner,
}

// ---------------------------------------------------------------------------
// cluster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cluster {
    pub name: String,
    pub version: String,
    pub admin_password: String,
    pub disable_package_installation: bool,
    /// Inverse of `disable_package_installation`. Deprecated.
    #[serde(skip_serializing)]
    pub allow_package_installation: Option<bool>,
    pub disconnected_installation: bool,
    pub networking: Networking,
    pub certificates: CertsConfig,
    pub ssh: SshConfig,
    pub kube_apiserver: KubeApiServer,
    pub cloud_provider: CloudProvider,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Networking {
    /// Calico mode before CNI add-ons existed. Deprecated.
    #[serde(rename = "type", skip_serializing)]
    pub network_type: String,
    pub pod_cidr_block: String,
    pub service_cidr_block: String,
    pub update_hosts_files: bool,
    pub http_proxy: String,
    pub https_proxy: String,
    pub no_proxy: String,
}

/// Certificate lifetimes, as hour durations such as `17520h`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertsConfig {
    pub expiry: String,
    pub ca_expiry: String,
}

/// SSH credentials shared by every node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    #[serde(rename = "ssh_key")]
    pub key: String,
    #[serde(rename = "ssh_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeApiServer {
    pub option_overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudProvider {
    pub provider: String,
    pub config: String,
}

// ---------------------------------------------------------------------------
// docker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Docker {
    pub disable: bool,
    pub logs: DockerLogs,
    pub storage: DockerStorage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerLogs {
    pub driver: String,
    pub opts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerStorage {
    pub driver: String,
    pub opts: BTreeMap<String, String>,
    pub direct_lvm_block_device: DirectLvmBlockDevice,
    /// Device-mapper settings from before storage opts existed. Deprecated.
    #[serde(skip_serializing)]
    pub direct_lvm: Option<DirectLvm>,
}

/// Block device carved into a thin pool for the devicemapper driver.
/// Percentages are kept as strings because they are passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectLvmBlockDevice {
    pub path: String,
    pub thinpool_percent: String,
    pub thinpool_metapercent: String,
    pub thinpool_autoextend_threshold: String,
    pub thinpool_autoextend_percent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectLvm {
    pub enabled: bool,
    pub block_device: String,
    pub enable_deferred_deletion: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerRegistry {
    pub server: String,
    /// Registry host, superseded by `server`. Deprecated.
    #[serde(skip_serializing)]
    pub address: String,
    /// Registry port, superseded by `server`. Deprecated.
    #[serde(skip_serializing)]
    pub port: u16,
    #[serde(rename = "CA")]
    pub ca: String,
    pub username: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// add_ons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddOns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cni: Option<Cni>,
    pub dns: Dns,
    #[serde(rename = "heapster", skip_serializing_if = "Option::is_none")]
    pub heapster_monitoring: Option<HeapsterMonitoring>,
    pub metrics_server: OptionalFeature,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<Dashboard>,
    /// The old dashboard toggle, under its historical misspelled key. Deprecated.
    #[serde(rename = "dashbard", skip_serializing)]
    pub dashboard_deprecated: Option<OptionalFeature>,
    pub package_manager: PackageManager,
    pub rescheduler: OptionalFeature,
}

/// An add-on with nothing to configure beyond turning it off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionalFeature {
    pub disable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cni {
    pub disable: bool,
    pub provider: String,
    pub options: CniOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CniOptions {
    pub calico: CalicoOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalicoOptions {
    pub mode: String,
    pub log_level: String,
    pub workload_mtu: u32,
    pub felix_input_mtu: u32,
    pub ip_autodetection_method: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dns {
    pub disable: bool,
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapsterMonitoring {
    pub disable: bool,
    pub options: HeapsterOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapsterOptions {
    pub heapster: Heapster,
    pub influxdb: InfluxDb,
    /// Flat replica count, superseded by `heapster.replicas`. Deprecated.
    #[serde(skip_serializing)]
    pub heapster_replicas: u32,
    /// Flat claim name, superseded by `influxdb.pvc_name`. Deprecated.
    #[serde(skip_serializing)]
    pub influxdb_pvc_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heapster {
    pub replicas: u32,
    pub service_type: String,
    pub sink: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxDb {
    pub pvc_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dashboard {
    pub disable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManager {
    pub disable: bool,
    pub provider: String,
    pub options: PackageManagerOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManagerOptions {
    pub helm: HelmOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmOptions {
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub package_manager: Option<FeatureToggle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggle {
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// node pools
// ---------------------------------------------------------------------------

/// A machine in the cluster. Identity is `(host, ip, internal_ip)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub host: String,
    pub ip: String,
    #[serde(rename = "internalip")]
    pub internal_ip: String,
    pub labels: BTreeMap<String, String>,
}

impl Node {
    pub fn new(host: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ip: ip.into(),
            ..Self::default()
        }
    }

    /// Set the internal IP.
    pub fn internal_ip(mut self, ip: impl Into<String>) -> Self {
        self.internal_ip = ip.into();
        self
    }

    /// Add a label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeGroup {
    pub expected_count: u32,
    pub nodes: Vec<Node>,
}

impl NodeGroup {
    /// A group pre-populated with `count` empty placeholder nodes.
    pub fn placeholders(count: u32) -> Self {
        Self {
            expected_count: count,
            nodes: vec![Node::default(); count as usize],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterNodeGroup {
    pub expected_count: u32,
    pub nodes: Vec<Node>,
    pub load_balanced_fqdn: String,
    pub load_balanced_short_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nfs {
    #[serde(rename = "nfs_volume")]
    pub volumes: Vec<NfsVolume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsVolume {
    #[serde(rename = "nfs_host")]
    pub host: String,
    #[serde(rename = "mount_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provisioner {
    pub provider: String,
    pub options: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Node roles
// ---------------------------------------------------------------------------

/// Pools a node may be added to after installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRole {
    Worker,
    Ingress,
    Storage,
}

impl NodeRole {
    pub const ALL: [NodeRole; 3] = [Self::Worker, Self::Ingress, Self::Storage];
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Worker => "worker",
            Self::Ingress => "ingress",
            Self::Storage => "storage",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeRole {
    type Err = NodeRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(Self::Worker),
            "ingress" => Ok(Self::Ingress),
            "storage" => Ok(Self::Storage),
            other => Err(NodeRoleParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`NodeRole`] string.
#[derive(Debug, Clone)]
pub struct NodeRoleParseError(pub String);

impl fmt::Display for NodeRoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid role {:?} (expected worker, ingress, or storage)",
            self.0
        )
    }
}

impl std::error::Error for NodeRoleParseError {}

// ---------------------------------------------------------------------------
// Queries and mutations
// ---------------------------------------------------------------------------

impl Plan {
    /// The pool a role maps to.
    pub fn pool(&self, role: NodeRole) -> &NodeGroup {
        match role {
            NodeRole::Worker => &self.worker,
            NodeRole::Ingress => &self.ingress,
            NodeRole::Storage => &self.storage,
        }
    }

    fn pool_mut(&mut self, role: NodeRole) -> &mut NodeGroup {
        match role {
            NodeRole::Worker => &mut self.worker,
            NodeRole::Ingress => &mut self.ingress,
            NodeRole::Storage => &mut self.storage,
        }
    }

    /// Append `node` to the pool of every role and bump its expected count.
    ///
    /// Callers run admission first; this does not check for duplicates.
    pub fn add_node(&mut self, node: &Node, roles: &[NodeRole]) {
        for role in roles {
            let pool = self.pool_mut(*role);
            pool.nodes.push(node.clone());
            pool.expected_count += 1;
        }
    }

    /// Every node across all pools, labelled with the pool name. A machine
    /// in several pools appears once per pool.
    pub fn all_nodes(&self) -> Vec<(&'static str, &Node)> {
        let pools: [(&'static str, &[Node]); 5] = [
            ("etcd", &self.etcd.nodes),
            ("master", &self.master.nodes),
            ("worker", &self.worker.nodes),
            ("ingress", &self.ingress.nodes),
            ("storage", &self.storage.nodes),
        ];
        pools
            .into_iter()
            .flat_map(|(name, nodes)| nodes.iter().map(move |n| (name, n)))
            .collect()
    }

    /// The first master node, used as the API endpoint when no load
    /// balancer is configured.
    pub fn master_node(&self) -> Option<&Node> {
        self.master.nodes.first()
    }

    /// True when a CNI plugin will be installed, meaning pods get a network
    /// and the smoke test can run.
    pub fn network_configured(&self) -> bool {
        match &self.add_ons.cni {
            Some(cni) => !cni.disable && cni.provider != "custom",
            None => false,
        }
    }

    /// First host address of the service CIDR.
    pub fn kubernetes_service_ip(&self) -> Result<Ipv4Addr, InvalidCidr> {
        nth_host(&self.cluster.networking.service_cidr_block, 1)
    }

    /// Second host address of the service CIDR.
    pub fn dns_service_ip(&self) -> Result<Ipv4Addr, InvalidCidr> {
        nth_host(&self.cluster.networking.service_cidr_block, 2)
    }
}

/// A CIDR block that could not be parsed or is too small.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid CIDR block {0:?}")]
pub struct InvalidCidr(pub String);

fn nth_host(block: &str, n: u32) -> Result<Ipv4Addr, InvalidCidr> {
    let cidr: Ipv4Cidr = block.parse().map_err(|_| InvalidCidr(block.to_owned()))?;
    let base = u32::from(cidr.first_address());
    let host_bits = 32 - u32::from(cidr.network_length());
    if host_bits < 32 && u64::from(n) >= (1u64 << host_bits) {
        return Err(InvalidCidr(block.to_owned()));
    }
    Ok(Ipv4Addr::from(base + n))
}
