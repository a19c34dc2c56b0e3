//! Workflow tests against fake engines and real plan stores.

use std::path::Path;

use kismatic_core::engine::ProvisionOptions;
use kismatic_core::locator::{ClusterPaths, PathFlags, resolve};
use kismatic_core::plan::{Node, NodeRole, PlanTemplateOptions};
use kismatic_core::store::{BufferPlanStore, FilePlanStore, PlanStore};
use kismatic_core::validate::StructuralValidator;
use kismatic_core::workflow::{
    self, AddNodeOptions, ApplyOptions, Engines, Output, ValidateOptions,
};
use kismatic_core::{NodeField, PlanError};
use kismatic_test_utils::{
    FakeChecks, FakeExecutor, FakeProvisioner, plan_with_workers, sample_plan,
};

fn engines<'a>(executor: &'a FakeExecutor, checks: &'a FakeChecks) -> Engines<'a> {
    Engines {
        executor,
        validator: &StructuralValidator,
        connectivity: checks,
        certificates: checks,
    }
}

fn stored(plan: &kismatic_core::plan::Plan) -> BufferPlanStore {
    let mut store = BufferPlanStore::new();
    store.write(plan).unwrap();
    store
}

fn text(out: Output<Vec<u8>>) -> String {
    String::from_utf8(out.into_inner()).unwrap()
}

#[tokio::test]
async fn validate_runs_every_check_then_preflight() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());

    let plan = workflow::validate(
        &mut out,
        &engines(&executor, &checks),
        &store,
        Path::new("generated"),
        ValidateOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(plan.cluster.name, "kubernetes");
    assert_eq!(executor.calls(), vec!["pre_flight"]);
    let text = text(out);
    assert!(text.contains("Validating installation plan file"));
    assert!(text.contains("Validating SSH connectivity to nodes"));
    assert!(text.contains("Validating cluster certificates"));
    assert!(!text.contains("[ERROR]"));
}

#[tokio::test]
async fn validate_reports_missing_plan() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let dir = tempfile::tempdir().unwrap();
    let store = FilePlanStore::new(dir.path().join("kismatic-cluster.yaml"));
    let mut out = Output::new(Vec::new());

    let err = workflow::validate(
        &mut out,
        &engines(&executor, &checks),
        &store,
        dir.path(),
        ValidateOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PlanError::MissingPlan { .. }));
    assert!(err.to_string().contains("kismatic install plan"));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn validate_stops_at_first_failing_check() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::unreachable(&["master01", "worker01"]);
    let store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());

    let err = workflow::validate(
        &mut out,
        &engines(&executor, &checks),
        &store,
        Path::new("generated"),
        ValidateOptions::default(),
    )
    .await
    .unwrap_err();

    let PlanError::Validation(errs) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errs.findings.len(), 2);
    assert!(executor.calls().is_empty());
    assert!(text(out).contains("Validating SSH connectivity to nodes"));
}

#[tokio::test]
async fn validate_skips_preflight_on_request() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());
    let opts = ValidateOptions {
        skip_preflight: true,
    };

    workflow::validate(&mut out, &engines(&executor, &checks), &store, Path::new("g"), opts)
        .await
        .unwrap();
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn certificate_findings_block_validation() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks {
        certificate_error: Some("CA key is missing".into()),
        ..FakeChecks::default()
    };
    let store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());

    let err = workflow::validate(
        &mut out,
        &engines(&executor, &checks),
        &store,
        Path::new("g"),
        ValidateOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PlanError::Validation(_)));
    assert!(text(out).contains("- CA key is missing"));
}

#[tokio::test]
async fn apply_installs_and_smoke_tests() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());

    workflow::apply(
        &mut out,
        &engines(&executor, &checks),
        &store,
        Path::new("clusters/kubernetes/generated"),
        ApplyOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(
        executor.calls(),
        vec!["pre_flight", "generate_certificates", "install", "smoke_test"]
    );
    let printed = text(out);
    assert!(printed.contains("clusters/kubernetes/generated/kubeconfig"));
    assert!(printed.contains("https://10.0.0.2:6443"));
}

#[tokio::test]
async fn apply_skips_smoke_test_without_network() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let mut plan = sample_plan();
    plan.add_ons.cni.as_mut().unwrap().provider = "custom".into();
    let store = stored(&plan);
    let mut out = Output::new(Vec::new());
    let opts = ApplyOptions {
        restart_services: true,
        skip_preflight: true,
    };

    workflow::apply(&mut out, &engines(&executor, &checks), &store, Path::new("g"), opts)
        .await
        .unwrap();
    assert_eq!(
        executor.calls(),
        vec!["generate_certificates", "install:restart"]
    );
}

#[tokio::test]
async fn apply_surfaces_engine_failure() {
    let executor = FakeExecutor::failing_on("install");
    let checks = FakeChecks::passing();
    let store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());

    let err = workflow::apply(
        &mut out,
        &engines(&executor, &checks),
        &store,
        Path::new("g"),
        ApplyOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PlanError::Engine { operation: "installation", .. }));
    assert!(!executor.calls().contains(&"smoke_test".to_owned()));
}

#[tokio::test]
async fn add_node_writes_updated_plan() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let mut store = stored(&plan_with_workers(2));
    let mut out = Output::new(Vec::new());
    let node = Node::new("worker03", "10.0.1.3").label("tier", "web");
    let opts = AddNodeOptions {
        roles: vec![NodeRole::Worker, NodeRole::Ingress],
        ..AddNodeOptions::default()
    };

    let updated = workflow::add_node(
        &mut out,
        &engines(&executor, &checks),
        &mut store,
        &node,
        &opts,
    )
    .await
        .unwrap();

    assert_eq!(
        executor.calls(),
        vec!["new_node_pre_flight:worker03", "add_node:worker03"]
    );
    assert_eq!(updated.worker.expected_count, 3);
    assert_eq!(updated.ingress.nodes, vec![node.clone()]);

    let reread = store.read().unwrap();
    assert_eq!(reread, updated);
    assert_eq!(reread.worker.nodes[2].labels["tier"], "web");
}

#[tokio::test]
async fn add_node_defaults_to_worker_role() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let mut store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());
    let opts = AddNodeOptions {
        skip_preflight: true,
        ..AddNodeOptions::default()
    };

    let updated = workflow::add_node(
        &mut out,
        &engines(&executor, &checks),
        &mut store,
        &Node::new("worker02", "10.0.0.9"),
        &opts,
    )
    .await
    .unwrap();
    assert_eq!(updated.worker.nodes.len(), 2);
    assert!(updated.ingress.nodes.is_empty());
    assert_eq!(executor.calls(), vec!["add_node:worker02"]);
}

#[tokio::test]
async fn add_node_rejects_duplicate_before_remote_work() {
    let executor = FakeExecutor::new();
    // An SSH check would fail; admission must reject the node first.
    let checks = FakeChecks::unreachable(&["fresh"]);
    let before = plan_with_workers(2);
    let mut store = stored(&before);
    let mut out = Output::new(Vec::new());

    let err = workflow::add_node(
        &mut out,
        &engines(&executor, &checks),
        &mut store,
        &Node::new("fresh", "10.0.1.2"),
        &AddNodeOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        PlanError::DuplicateNode {
            field: NodeField::Ip,
            pool: NodeRole::Worker,
            ..
        }
    ));
    assert!(executor.calls().is_empty());
    assert_eq!(store.read().unwrap(), before);
}

#[tokio::test]
async fn add_node_rejects_invalid_node() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let mut store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());

    let err = workflow::add_node(
        &mut out,
        &engines(&executor, &checks),
        &mut store,
        &Node::new("bad", "not-an-ip"),
        &AddNodeOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PlanError::Validation(_)));
    assert!(text(out).contains("Validating new node information"));
}

#[tokio::test]
async fn add_node_requires_ssh_to_new_node() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::unreachable(&["worker09"]);
    let mut store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());

    let err = workflow::add_node(
        &mut out,
        &engines(&executor, &checks),
        &mut store,
        &Node::new("worker09", "10.0.0.99"),
        &AddNodeOptions::default(),
    )
    .await
    .unwrap_err();
    let PlanError::Validation(errs) = err else {
        panic!("expected validation error");
    };
    assert!(errs.findings[0].starts_with("New node"));
}

#[tokio::test]
async fn step_runs_named_play_without_preflight() {
    let executor = FakeExecutor::new();
    let checks = FakeChecks::passing();
    let store = stored(&sample_plan());
    let mut out = Output::new(Vec::new());

    workflow::step(
        &mut out,
        &engines(&executor, &checks),
        &store,
        Path::new("g"),
        "_docker.yaml",
        false,
    )
    .await
    .unwrap();
    assert_eq!(executor.calls(), vec!["run_play:_docker.yaml"]);
    assert!(text(out).contains("Task completed successfully"));
}

#[tokio::test]
async fn provision_fills_addresses_and_writes_plan() {
    let provisioner = FakeProvisioner::new();
    let dir = tempfile::tempdir().unwrap();
    let paths = resolve(
        None,
        &PathFlags {
            plan_file: dir.path().join("kismatic-cluster.yaml"),
            ..PathFlags::default()
        },
    )
    .unwrap();
    let mut store = paths.store();
    let mut out = Output::new(Vec::new());

    workflow::write_template(
        &mut out,
        &mut store,
        &PlanTemplateOptions {
            cluster_name: "aws-demo".into(),
            infrastructure_provisioner: "aws".into(),
            etcd_nodes: 1,
            master_nodes: 1,
            worker_nodes: 2,
            ..PlanTemplateOptions::default()
        },
    )
    .unwrap();

    let updated = workflow::provision(
        &mut out,
        &provisioner,
        &mut store,
        &ProvisionOptions::default(),
    )
    .await
        .unwrap();
    assert_eq!(updated.worker.nodes[1].ip, "10.99.0.4");

    let reread = store.read().unwrap();
    assert_eq!(reread.etcd.nodes[0].host, "node1");
    assert_eq!(reread.provisioner.provider, "aws");
}

#[tokio::test]
async fn destroy_passes_provider_and_cluster_name() {
    let provisioner = FakeProvisioner::new();
    let mut plan = sample_plan();
    plan.provisioner.provider = "aws".into();
    let store = stored(&plan);
    let mut out = Output::new(Vec::new());

    workflow::destroy(&mut out, &provisioner, &store).await.unwrap();
    assert_eq!(
        provisioner.destroyed(),
        vec![("aws".to_owned(), "kubernetes".to_owned())]
    );
}

#[test]
fn write_template_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ClusterPaths::from_plan_file(dir.path().join("kismatic-cluster.yaml"));
    let mut store = paths.store();
    let mut out = Output::new(Vec::new());
    let opts = PlanTemplateOptions {
        etcd_nodes: 3,
        master_nodes: 2,
        worker_nodes: 4,
        ..PlanTemplateOptions::default()
    };

    let plan = workflow::write_template(&mut out, &mut store, &opts).unwrap();
    assert_eq!(plan.etcd.nodes.len(), 3);
    assert!(paths.exists());

    let err = workflow::write_template(&mut out, &mut store, &opts).unwrap_err();
    assert!(matches!(err, PlanError::PlanExists { .. }));
}
