//! Defaulting cascade applied after migration.
//!
//! Every assignment is guarded by a zero-value check so a value the user
//! wrote is never replaced, and applying the cascade twice changes nothing.

use super::model::{Cni, Dashboard, HeapsterMonitoring, Plan};

/// Kubernetes release installed when the plan does not pin one.
pub const KUBERNETES_VERSION: &str = "v1.10.5";
/// Minor release line supported by this version of the tool.
pub const KUBERNETES_MINOR_VERSION: &str = "v1.10";

pub const DEFAULT_CERT_EXPIRY: &str = "17520h";
pub const DEFAULT_CA_EXPIRY: &str = "17520h";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_POD_CIDR: &str = "172.16.0.0/16";
pub const DEFAULT_SERVICE_CIDR: &str = "172.20.0.0/16";

pub const CNI_PROVIDER_CALICO: &str = "calico";
pub const CNI_PROVIDER_WEAVE: &str = "weave";
pub const CALICO_MODE_OVERLAY: &str = "overlay";
pub const CALICO_LOG_LEVEL: &str = "info";
pub const CALICO_WORKLOAD_MTU: u32 = 1500;
pub const CALICO_FELIX_INPUT_MTU: u32 = 1440;
pub const CALICO_IP_AUTODETECTION: &str = "first-found";

pub const DNS_PROVIDER: &str = "kubedns";
pub const HEAPSTER_REPLICAS: u32 = 2;
pub const HEAPSTER_SINK: &str = "influxdb:http://heapster-influxdb.kube-system.svc:8086";
pub const HEAPSTER_SERVICE_TYPE: &str = "ClusterIP";
pub const HELM_NAMESPACE: &str = "kube-system";

pub const DOCKER_LOG_DRIVER: &str = "json-file";
pub const DEVICEMAPPER_DRIVER: &str = "devicemapper";
pub const THINPOOL_PERCENT: &str = "95";
pub const THINPOOL_META_PERCENT: &str = "1";
pub const THINPOOL_AUTOEXTEND_THRESHOLD: &str = "80";
pub const THINPOOL_AUTOEXTEND_PERCENT: &str = "20";

/// Default json-file log rotation options.
pub fn docker_log_opts() -> impl Iterator<Item = (String, String)> {
    [("max-size", "50m"), ("max-file", "1")]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
}

/// A calico CNI block with every option filled in.
pub fn calico_cni() -> Cni {
    let mut cni = Cni {
        provider: CNI_PROVIDER_CALICO.to_owned(),
        ..Cni::default()
    };
    let calico = &mut cni.options.calico;
    calico.mode = CALICO_MODE_OVERLAY.to_owned();
    calico.log_level = CALICO_LOG_LEVEL.to_owned();
    calico.workload_mtu = CALICO_WORKLOAD_MTU;
    calico.felix_input_mtu = CALICO_FELIX_INPUT_MTU;
    calico.ip_autodetection_method = CALICO_IP_AUTODETECTION.to_owned();
    cni
}

/// Fill every unset field that has a default.
pub fn apply_defaults(mut plan: Plan) -> Plan {
    if plan.cluster.version.is_empty() {
        plan.cluster.version = KUBERNETES_VERSION.to_owned();
    }
    if plan.cluster.ssh.port == 0 {
        plan.cluster.ssh.port = DEFAULT_SSH_PORT;
    }
    if plan.cluster.certificates.ca_expiry.is_empty() {
        plan.cluster.certificates.ca_expiry = DEFAULT_CA_EXPIRY.to_owned();
    }

    docker_defaults(&mut plan);
    cni_defaults(&mut plan);

    if plan.add_ons.dns.provider.is_empty() {
        plan.add_ons.dns.provider = DNS_PROVIDER.to_owned();
    }

    let heapster = plan
        .add_ons
        .heapster_monitoring
        .get_or_insert_with(HeapsterMonitoring::default);
    let opts = &mut heapster.options.heapster;
    if opts.replicas == 0 {
        opts.replicas = HEAPSTER_REPLICAS;
    }
    if opts.sink.is_empty() {
        opts.sink = HEAPSTER_SINK.to_owned();
    }
    if opts.service_type.is_empty() {
        opts.service_type = HEAPSTER_SERVICE_TYPE.to_owned();
    }

    plan.add_ons.dashboard.get_or_insert_with(Dashboard::default);

    let helm = &mut plan.add_ons.package_manager.options.helm;
    if helm.namespace.is_empty() {
        helm.namespace = HELM_NAMESPACE.to_owned();
    }

    plan
}

fn docker_defaults(plan: &mut Plan) {
    let logs = &mut plan.docker.logs;
    if logs.driver.is_empty() {
        logs.driver = DOCKER_LOG_DRIVER.to_owned();
        if logs.opts.is_empty() {
            logs.opts.extend(docker_log_opts());
        }
    }

    let storage = &mut plan.docker.storage;
    // Options the installer used to set implicitly when it carved the pool.
    if storage.driver == DEVICEMAPPER_DRIVER && !storage.direct_lvm_block_device.path.is_empty() {
        for (key, value) in [
            ("dm.thinpooldev", "/dev/mapper/docker-thinpool"),
            ("dm.use_deferred_removal", "true"),
            ("dm.use_deferred_deletion", "false"),
        ] {
            storage
                .opts
                .entry(key.to_owned())
                .or_insert_with(|| value.to_owned());
        }
    }

    let device = &mut storage.direct_lvm_block_device;
    for (field, value) in [
        (&mut device.thinpool_percent, THINPOOL_PERCENT),
        (&mut device.thinpool_metapercent, THINPOOL_META_PERCENT),
        (
            &mut device.thinpool_autoextend_threshold,
            THINPOOL_AUTOEXTEND_THRESHOLD,
        ),
        (
            &mut device.thinpool_autoextend_percent,
            THINPOOL_AUTOEXTEND_PERCENT,
        ),
    ] {
        if field.is_empty() {
            *field = value.to_owned();
        }
    }
}

fn cni_defaults(plan: &mut Plan) {
    let cni = plan.add_ons.cni.get_or_insert_with(calico_cni);
    if cni.provider != CNI_PROVIDER_CALICO {
        return;
    }
    // Mode is only chosen for a synthesized block; an explicit block keeps its own.
    let calico = &mut cni.options.calico;
    if calico.log_level.is_empty() {
        calico.log_level = CALICO_LOG_LEVEL.to_owned();
    }
    if calico.workload_mtu == 0 {
        calico.workload_mtu = CALICO_WORKLOAD_MTU;
    }
    if calico.felix_input_mtu == 0 {
        calico.felix_input_mtu = CALICO_FELIX_INPUT_MTU;
    }
    if calico.ip_autodetection_method.is_empty() {
        calico.ip_autodetection_method = CALICO_IP_AUTODETECTION.to_owned();
    }
}
