//! Documentation comments injected into written plan files, keyed by the
//! dotted path of the field they describe.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::defaults::KUBERNETES_MINOR_VERSION;

static COMMENTS: LazyLock<HashMap<&'static str, Vec<String>>> = LazyLock::new(build_table);

/// The process-wide comment table.
pub fn comment_table() -> &'static HashMap<&'static str, Vec<String>> {
    &COMMENTS
}

fn build_table() -> HashMap<&'static str, Vec<String>> {
    let version = format!(
        "Kubernetes cluster version (supported minor version {KUBERNETES_MINOR_VERSION:?})."
    );
    let entries: Vec<(&'static str, Vec<&str>)> = vec![
        ("cluster.admin_password", vec![
            "This password is used to login to the Kubernetes Dashboard and can also be",
            "used for administration without a security certificate.",
        ]),
        ("cluster.version", vec![version.as_str()]),
        ("cluster.disable_package_installation", vec![
            "Set to true if the nodes have the required packages installed.",
        ]),
        ("cluster.disconnected_installation", vec![
            "Set to true if you are performing a disconnected installation.",
        ]),
        ("cluster.networking", vec!["Networking configuration of your cluster."]),
        ("cluster.networking.pod_cidr_block", vec![
            "Kubernetes will assign pods IPs in this range. Do not use a range that is",
            "already in use on your local network!",
        ]),
        ("cluster.networking.service_cidr_block", vec![
            "Kubernetes will assign services IPs in this range. Do not use a range",
            "that is already in use by your local network or pod network!",
        ]),
        ("cluster.networking.update_hosts_files", vec![
            "Set to true if your nodes cannot resolve each others' names using DNS.",
        ]),
        ("cluster.networking.http_proxy", vec![
            "Set the proxy server to use for HTTP connections.",
        ]),
        ("cluster.networking.https_proxy", vec![
            "Set the proxy server to use for HTTPs connections.",
        ]),
        ("cluster.networking.no_proxy", vec![
            "List of host names and/or IPs that shouldn't go through any proxy.",
            "All nodes' 'host' and 'IPs' are always set.",
        ]),
        ("cluster.certificates", vec!["Generated certs configuration."]),
        ("cluster.certificates.expiry", vec![
            "Self-signed certificate expiration period in hours; default is 2 years.",
        ]),
        ("cluster.certificates.ca_expiry", vec![
            "CA certificate expiration period in hours; default is 2 years.",
        ]),
        ("cluster.ssh", vec!["SSH configuration for cluster nodes."]),
        ("cluster.ssh.user", vec!["This user must be able to sudo without password."]),
        ("cluster.ssh.ssh_key", vec![
            "Absolute path to the ssh private key we should use to manage nodes.",
        ]),
        ("cluster.kube_apiserver", vec![
            "Override configuration of Kubernetes components.",
        ]),
        ("cluster.cloud_provider", vec!["Kubernetes cloud provider integration."]),
        ("cluster.cloud_provider.provider", vec![
            "Options: 'aws','azure','cloudstack','fake','gce','mesos','openstack',",
            "'ovirt','photon','rackspace','vsphere'.",
            "Leave empty for bare metal setups or other unsupported providers.",
        ]),
        ("cluster.cloud_provider.config", vec![
            "Path to the config file, leave empty if provider does not require it.",
        ]),
        ("docker", vec!["Docker daemon configuration of all cluster nodes."]),
        ("docker.disable", vec![
            "Set to true if docker is already installed and configured.",
        ]),
        ("docker.storage.driver", vec![
            "Leave empty to have docker automatically select the driver.",
        ]),
        ("docker.storage.direct_lvm_block_device", vec![
            "Used for setting up Device Mapper storage driver in direct-lvm mode.",
        ]),
        ("docker.storage.direct_lvm_block_device.path", vec![
            "Absolute path to the block device that will be used for direct-lvm mode.",
            "This device will be wiped and used exclusively by docker.",
        ]),
        ("docker_registry", vec![
            "If you want to use an internal registry for the installation or upgrade, you",
            "must provide its information here. You must seed this registry before the",
            "installation or upgrade of your cluster. This registry must be accessible from",
            "all nodes on the cluster.",
        ]),
        ("docker_registry.server", vec!["IP or hostname and port for your registry."]),
        ("docker_registry.CA", vec![
            "Absolute path to the certificate authority that should be trusted when",
            "connecting to your registry.",
        ]),
        ("docker_registry.username", vec!["Leave blank for unauthenticated access."]),
        ("docker_registry.password", vec!["Leave blank for unauthenticated access."]),
        ("add_ons", vec![
            "Add-ons are additional components that KET installs on the cluster.",
        ]),
        ("add_ons.cni.provider", vec![
            "Selecting 'custom' will result in a CNI ready cluster, however it is up to",
            "you to configure a plugin after the install.",
            "Options: 'calico','weave','contiv','custom'.",
        ]),
        ("add_ons.cni.options.calico.mode", vec!["Options: 'overlay','routed'."]),
        ("add_ons.cni.options.calico.log_level", vec!["Options: 'warning','info','debug'."]),
        ("add_ons.cni.options.calico.workload_mtu", vec![
            "MTU for the workload interface, configures the CNI config.",
        ]),
        ("add_ons.cni.options.calico.felix_input_mtu", vec![
            "MTU for the tunnel device used if IPIP is enabled.",
        ]),
        ("add_ons.cni.options.calico.ip_autodetection_method", vec![
            "Used to detect the IPv4 address of the host.",
        ]),
        ("add_ons.dns.provider", vec!["Options: 'kubedns','coredns'."]),
        ("add_ons.heapster.options.influxdb.pvc_name", vec![
            "Provide the name of the persistent volume claim that you will create",
            "after installation. If not specified, the data will be stored in",
            "ephemeral storage.",
        ]),
        ("add_ons.heapster.options.heapster.service_type", vec![
            "Specify kubernetes ServiceType. Defaults to 'ClusterIP'.",
            "Options: 'ClusterIP','NodePort','LoadBalancer','ExternalName'.",
        ]),
        ("add_ons.heapster.options.heapster.sink", vec![
            "Specify the sink to store heapster data. Defaults to an influxdb pod",
            "running on the cluster.",
        ]),
        ("add_ons.metrics_server", vec![
            "Metrics Server is a cluster-wide aggregator of resource usage data.",
        ]),
        ("add_ons.package_manager.provider", vec!["Options: 'helm'."]),
        ("add_ons.rescheduler", vec![
            "The rescheduler ensures that critical add-ons remain running on the cluster.",
        ]),
        ("etcd", vec![
            "Etcd nodes are the ones that run the etcd distributed key-value database.",
        ]),
        ("etcd.nodes", vec![
            "Provide the hostname and IP of each node. If the node has an IP for internal",
            "traffic, provide it in the internalip field. Otherwise, that field can be",
            "left blank.",
        ]),
        ("master", vec![
            "Master nodes are the ones that run the Kubernetes control plane components.",
        ]),
        ("master.load_balanced_fqdn", vec![
            "If you have set up load balancing for master nodes, enter the FQDN name here.",
            "Otherwise, use the IP address of a single master node.",
        ]),
        ("master.load_balanced_short_name", vec![
            "If you have set up load balancing for master nodes, enter the short name here.",
            "Otherwise, use the IP address of a single master node.",
        ]),
        ("worker", vec![
            "Worker nodes are the ones that will run your workloads on the cluster.",
        ]),
        ("ingress", vec!["Ingress nodes will run the ingress controllers."]),
        ("storage", vec![
            "Storage nodes will be used to create a distributed storage cluster that can",
            "be consumed by your workloads.",
        ]),
        ("nfs", vec![
            "A set of NFS volumes for use by on-cluster persistent workloads.",
        ]),
        ("nfs.nfs_volume.nfs_host", vec![
            "The host name or ip address of an NFS server.",
        ]),
        ("nfs.nfs_volume.mount_path", vec![
            "The mount path of an NFS share. Must start with '/'.",
        ]),
    ];

    entries
        .into_iter()
        .map(|(path, lines)| (path, lines.into_iter().map(str::to_owned).collect()))
        .collect()
}
