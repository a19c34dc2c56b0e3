//! Command workflows shared by every entry point.
//!
//! Each workflow reads the plan from a [`PlanStore`], drives the engines
//! through their traits, reports progress on an [`Output`] and writes the
//! plan back when it changed. Nothing here knows about command-line flags.

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::admission::ensure_node_is_new;
use crate::engine::{CertificateCheck, ConnectivityCheck, Executor, ProvisionOptions, Provisioner};
use crate::error::PlanError;
use crate::plan::{Node, NodeRole, Plan, PlanTemplateOptions, build_from_template};
use crate::store::PlanStore;
use crate::validate::{PlanValidator, ValidationErrors};

/// Width of the status column in progress lines.
const STATUS_COLUMN: usize = 80;
/// Port the API server listens on for every master.
const KUBE_API_PORT: u16 = 6443;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Progress printer for the user. Separate from tracing; write failures on
/// the terminal are ignored.
#[derive(Debug)]
pub struct Output<W: Write> {
    out: W,
}

impl<W: Write> Output<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// A section title underlined with `=`.
    pub fn header(&mut self, title: &str) {
        let _ = writeln!(self.out, "\n{title}\n{}", "=".repeat(title.len()));
    }

    pub fn ok(&mut self, step: &str) {
        let _ = writeln!(self.out, "{step:<width$} [OK]", width = STATUS_COLUMN);
    }

    pub fn err(&mut self, step: &str) {
        let _ = writeln!(self.out, "{step:<width$} [ERROR]", width = STATUS_COLUMN);
    }

    pub fn findings(&mut self, errs: &ValidationErrors) {
        for finding in &errs.findings {
            let _ = writeln!(self.out, "- {finding}");
        }
    }

    pub fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
    }

    /// Report a validation step; findings are listed under the failed step.
    fn check(&mut self, step: &str, result: Result<(), ValidationErrors>) -> Result<(), PlanError> {
        match result {
            Ok(()) => {
                self.ok(step);
                Ok(())
            }
            Err(errs) => {
                self.err(step);
                self.findings(&errs);
                Err(errs.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators and options
// ---------------------------------------------------------------------------

/// The installation engine and the checks run before it.
#[derive(Clone, Copy)]
pub struct Engines<'a> {
    pub executor: &'a dyn Executor,
    pub validator: &'a dyn PlanValidator,
    pub connectivity: &'a dyn ConnectivityCheck,
    pub certificates: &'a dyn CertificateCheck,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    pub skip_preflight: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub restart_services: bool,
    pub skip_preflight: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddNodeOptions {
    /// Pools to join. Empty means worker only.
    pub roles: Vec<NodeRole>,
    pub restart_services: bool,
    pub skip_preflight: bool,
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// Read the plan and run every check against it. Returns the plan that was
/// validated.
pub async fn validate<W: Write>(
    out: &mut Output<W>,
    engines: &Engines<'_>,
    store: &dyn PlanStore,
    generated_dir: &Path,
    opts: ValidateOptions,
) -> Result<Plan, PlanError> {
    out.header("Validating");

    let reading = format!(
        "Reading installation plan file {:?}",
        store.location().display().to_string()
    );
    if !store.exists() {
        out.err(&reading);
        out.line("Run \"kismatic install plan\" to generate it");
        return Err(PlanError::MissingPlan {
            path: store.location().to_path_buf(),
        });
    }
    let plan = match store.read() {
        Ok(plan) => plan,
        Err(e) => {
            out.err(&reading);
            return Err(e);
        }
    };
    out.ok(&reading);

    out.check(
        "Validating installation plan file",
        engines.validator.validate_plan(&plan),
    )?;
    out.check(
        "Validating SSH connectivity to nodes",
        engines.connectivity.check_plan(&plan).await,
    )?;
    out.check(
        "Validating cluster certificates",
        engines
            .certificates
            .validate_certificates(&plan, generated_dir),
    )?;

    if !opts.skip_preflight {
        out.header("Running Pre-Flight Checks");
        engines
            .executor
            .run_pre_flight_check(&plan)
            .await
            .map_err(PlanError::engine("pre-flight check"))?;
    }
    Ok(plan)
}

/// Validate, then install the cluster the plan describes.
pub async fn apply<W: Write>(
    out: &mut Output<W>,
    engines: &Engines<'_>,
    store: &dyn PlanStore,
    generated_dir: &Path,
    opts: ApplyOptions,
) -> Result<(), PlanError> {
    let validate_opts = ValidateOptions {
        skip_preflight: opts.skip_preflight,
    };
    let plan = validate(out, engines, store, generated_dir, validate_opts).await?;
    let executor = engines.executor;

    info!(cluster = %plan.cluster.name, "installing cluster");
    out.header("Generating Certificates");
    executor
        .generate_certificates(&plan, false)
        .await
        .map_err(PlanError::engine("certificate generation"))?;

    out.header("Installing Cluster");
    executor
        .install(&plan, opts.restart_services)
        .await
        .map_err(PlanError::engine("installation"))?;

    if plan.network_configured() {
        out.header("Running Smoke Test");
        executor
            .run_smoke_test(&plan)
            .await
            .map_err(PlanError::engine("smoke test"))?;
    }

    out.line("\nThe cluster was installed successfully!\n");
    if let Some(endpoint) = api_endpoint(&plan) {
        out.line(&format!(
            "- The Kubernetes API server is listening at https://{endpoint}:{KUBE_API_PORT}"
        ));
    }
    out.line(&format!(
        "- To use the generated kubeconfig file with kubectl:\n    * use \"./kubectl --kubeconfig {dir}/kubeconfig\"\n    * or copy the config file \"cp {dir}/kubeconfig ~/.kube/config\"",
        dir = generated_dir.display()
    ));
    Ok(())
}

/// Address clients use for the API server: the load balancer when one is
/// named, otherwise the first master.
fn api_endpoint(plan: &Plan) -> Option<&str> {
    if !plan.master.load_balanced_fqdn.is_empty() {
        return Some(&plan.master.load_balanced_fqdn);
    }
    plan.master_node().map(|node| node.ip.as_str())
}

/// Join a new node to an installed cluster and record it in the plan.
///
/// The node is validated and checked for collisions before any remote
/// action, including the SSH check. Returns the updated plan.
pub async fn add_node<W: Write>(
    out: &mut Output<W>,
    engines: &Engines<'_>,
    store: &mut dyn PlanStore,
    node: &Node,
    opts: &AddNodeOptions,
) -> Result<Plan, PlanError> {
    let plan = store.read()?;

    out.check(
        "Validating new node information",
        engines.validator.validate_node(node),
    )?;
    out.check(
        "Validating installation plan file",
        engines.validator.validate_plan(&plan),
    )?;
    ensure_node_is_new(&plan, node)?;
    out.check(
        "Validating SSH connectivity to the new node",
        engines
            .connectivity
            .check_node(&plan.cluster.ssh, node, "New node")
            .await,
    )?;

    if !opts.skip_preflight {
        out.header("Running Pre-Flight Checks On New Node");
        engines
            .executor
            .run_new_node_pre_flight_check(&plan, node)
            .await
            .map_err(PlanError::engine("new node pre-flight check"))?;
    }

    let roles = if opts.roles.is_empty() {
        vec![NodeRole::Worker]
    } else {
        opts.roles.clone()
    };
    info!(host = %node.host, ip = %node.ip, ?roles, "adding node");
    let updated = engines
        .executor
        .add_node(&plan, node, &roles, opts.restart_services)
        .await
        .map_err(PlanError::engine("add node"))?;

    store.write(&updated)?;
    out.ok("Updating the plan file with the new node");
    Ok(updated)
}

/// Validate without pre-flight, then run a single play.
pub async fn step<W: Write>(
    out: &mut Output<W>,
    engines: &Engines<'_>,
    store: &dyn PlanStore,
    generated_dir: &Path,
    task: &str,
    restart_services: bool,
) -> Result<(), PlanError> {
    let opts = ValidateOptions {
        skip_preflight: true,
    };
    let plan = validate(out, engines, store, generated_dir, opts).await?;

    out.header("Running Task");
    engines
        .executor
        .run_play(task, &plan, restart_services)
        .await
        .map_err(PlanError::engine("task"))?;
    out.line("\nTask completed successfully\n");
    Ok(())
}

/// Create the plan's infrastructure and store the addresses it returns.
pub async fn provision<W: Write>(
    out: &mut Output<W>,
    provisioner: &dyn Provisioner,
    store: &mut dyn PlanStore,
    opts: &ProvisionOptions,
) -> Result<Plan, PlanError> {
    let plan = store.read()?;
    out.header("Provisioning");
    let updated = provisioner
        .provision(&plan, opts)
        .await
        .map_err(PlanError::engine("provisioning"))?;
    store.write(&updated)?;
    out.ok("Updating the plan file with provisioned nodes");
    Ok(updated)
}

/// Tear down the plan's infrastructure.
pub async fn destroy<W: Write>(
    out: &mut Output<W>,
    provisioner: &dyn Provisioner,
    store: &dyn PlanStore,
) -> Result<(), PlanError> {
    let plan = store.read()?;
    out.header("Destroying");
    provisioner
        .destroy(&plan.provisioner.provider, &plan.cluster.name)
        .await
        .map_err(PlanError::engine("destroy"))?;
    out.ok(&format!("Destroyed cluster {:?}", plan.cluster.name));
    Ok(())
}

/// Write a plan template for the user to fill in. Never overwrites.
pub fn write_template<W: Write>(
    out: &mut Output<W>,
    store: &mut dyn PlanStore,
    opts: &PlanTemplateOptions,
) -> Result<Plan, PlanError> {
    if store.exists() {
        return Err(PlanError::PlanExists {
            path: store.location().to_path_buf(),
        });
    }
    let plan = build_from_template(opts);
    store.write(&plan)?;
    out.ok(&format!(
        "Generating installation plan file template with:\n- {} etcd nodes\n- {} master nodes\n- {} worker nodes\n- {} ingress nodes\n- {} storage nodes\n- {} nfs volumes\n",
        opts.etcd_nodes,
        opts.master_nodes,
        opts.worker_nodes,
        opts.ingress_nodes,
        opts.storage_nodes,
        opts.nfs_volumes,
    ));
    out.line(&format!(
        "Wrote plan file template to {:?}",
        store.location().display().to_string()
    ));
    out.line(
        "Edit the plan file to further describe your cluster. \
         Once ready, execute the \"install validate\" command to proceed.",
    );
    Ok(plan)
}
