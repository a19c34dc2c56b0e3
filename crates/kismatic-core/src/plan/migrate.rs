//! Backfill of deprecated plan fields.
//!
//! Each rule moves one legacy field into its current-schema replacement and
//! clears the legacy field, so after [`migrate`] the plan holds only the
//! current representation. Rules touch disjoint fields and can run in any
//! order; running the set twice is a no-op the second time.

use tracing::{debug, warn};

use super::model::{Cni, Dashboard, Plan};

/// Package manager provider implied by plans that predate the `provider` field.
pub const LEGACY_PACKAGE_MANAGER_PROVIDER: &str = "helm";

/// A named transformation from a deprecated field to its replacement.
///
/// `apply` returns `true` when it changed the plan.
#[derive(Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub apply: fn(&mut Plan) -> bool,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Migration").field(&self.name).finish()
    }
}

/// Every known deprecation, in no particular order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "features.package_manager",
        apply: package_manager_feature,
    },
    Migration {
        name: "cluster.allow_package_installation",
        apply: allow_package_installation,
    },
    Migration {
        name: "add_ons.dashbard",
        apply: dashboard_toggle,
    },
    Migration {
        name: "docker_registry.address",
        apply: registry_address,
    },
    Migration {
        name: "docker.storage.direct_lvm",
        apply: direct_lvm,
    },
    Migration {
        name: "cluster.networking.type",
        apply: networking_type,
    },
    Migration {
        name: "add_ons.heapster.options.heapster_replicas",
        apply: heapster_flat_options,
    },
];

/// Run every migration rule over `plan`.
pub fn migrate(mut plan: Plan) -> Plan {
    for rule in MIGRATIONS {
        if (rule.apply)(&mut plan) {
            debug!(rule = rule.name, "migrated deprecated plan field");
        }
    }
    plan
}

/// `features.package_manager.enabled` moved to `add_ons.package_manager.disable`.
pub fn package_manager_feature(plan: &mut Plan) -> bool {
    let Some(features) = plan.features.take() else {
        return false;
    };
    if let Some(toggle) = features.package_manager {
        plan.add_ons.package_manager.disable = !toggle.enabled;
        plan.add_ons.package_manager.provider = LEGACY_PACKAGE_MANAGER_PROVIDER.to_owned();
    }
    true
}

/// `allow_package_installation` was inverted into `disable_package_installation`.
pub fn allow_package_installation(plan: &mut Plan) -> bool {
    match plan.cluster.allow_package_installation.take() {
        Some(allow) => {
            plan.cluster.disable_package_installation = !allow;
            true
        }
        None => false,
    }
}

/// The misspelled `dashbard` toggle. The current `dashboard` block wins when
/// both are present.
pub fn dashboard_toggle(plan: &mut Plan) -> bool {
    let Some(old) = plan.add_ons.dashboard_deprecated.take() else {
        return false;
    };
    if plan.add_ons.dashboard.is_none() {
        plan.add_ons.dashboard = Some(Dashboard {
            disable: old.disable,
        });
    }
    true
}

/// Separate `address` and `port` collapse into `server` as `address:port`.
pub fn registry_address(plan: &mut Plan) -> bool {
    let registry = &mut plan.docker_registry;
    if registry.address.is_empty() && registry.port == 0 {
        return false;
    }
    if registry.server.is_empty() {
        if !registry.address.is_empty() && registry.port != 0 {
            registry.server = format!("{}:{}", registry.address, registry.port);
        } else {
            warn!(
                address = %registry.address,
                port = registry.port,
                "ignoring incomplete legacy registry address; set docker_registry.server instead"
            );
        }
    }
    registry.address.clear();
    registry.port = 0;
    true
}

/// `docker.storage.direct_lvm` becomes explicit devicemapper options plus a
/// block device with the thin-pool percentages that used to be implied.
/// Explicit storage options win.
pub fn direct_lvm(plan: &mut Plan) -> bool {
    let storage = &mut plan.docker.storage;
    let Some(lvm) = storage.direct_lvm.take() else {
        return false;
    };
    if lvm.enabled && storage.opts.is_empty() {
        storage.driver = "devicemapper".to_owned();
        storage.opts.insert(
            "dm.thinpooldev".to_owned(),
            "/dev/mapper/docker-thinpool".to_owned(),
        );
        storage
            .opts
            .insert("dm.use_deferred_removal".to_owned(), "true".to_owned());
        storage.opts.insert(
            "dm.use_deferred_deletion".to_owned(),
            lvm.enable_deferred_deletion.to_string(),
        );
        let device = &mut storage.direct_lvm_block_device;
        device.path = lvm.block_device;
        device.thinpool_percent = "95".to_owned();
        device.thinpool_metapercent = "1".to_owned();
        device.thinpool_autoextend_threshold = "80".to_owned();
        device.thinpool_autoextend_percent = "20".to_owned();
    }
    true
}

/// `cluster.networking.type` chose the calico mode before CNI add-ons. It
/// only applies when the plan has no CNI block of its own.
pub fn networking_type(plan: &mut Plan) -> bool {
    let legacy = std::mem::take(&mut plan.cluster.networking.network_type);
    if legacy.is_empty() {
        return false;
    }
    if plan.add_ons.cni.is_none() {
        let mut cni = Cni {
            provider: super::defaults::CNI_PROVIDER_CALICO.to_owned(),
            ..Cni::default()
        };
        cni.options.calico.mode = legacy;
        plan.add_ons.cni = Some(cni);
    }
    true
}

/// Flat `heapster_replicas` and `influxdb_pvc_name` moved into nested blocks.
pub fn heapster_flat_options(plan: &mut Plan) -> bool {
    let Some(heapster) = plan.add_ons.heapster_monitoring.as_mut() else {
        return false;
    };
    let opts = &mut heapster.options;
    let replicas = std::mem::take(&mut opts.heapster_replicas);
    let pvc = std::mem::take(&mut opts.influxdb_pvc_name);
    if replicas == 0 && pvc.is_empty() {
        return false;
    }
    if replicas != 0 && opts.heapster.replicas == 0 {
        opts.heapster.replicas = replicas;
    }
    if !pvc.is_empty() && opts.influxdb.pvc_name.is_empty() {
        opts.influxdb.pvc_name = pvc;
    }
    true
}
