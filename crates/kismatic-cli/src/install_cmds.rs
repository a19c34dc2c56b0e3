//! `kismatic install` subcommands.
//!
//! Every subcommand resolves its target clusters through the locator, wires
//! the process-backed engines and hands off to the shared workflows.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use rand::Rng;
use rand::distr::Alphanumeric;

use kismatic_core::engine::ProvisionOptions;
use kismatic_core::locator::{self, ClusterPaths, DEFAULT_CLUSTER_NAME, PathFlags};
use kismatic_core::plan::{Node, NodeRole, PlanTemplateOptions};
use kismatic_core::validate::StructuralValidator;
use kismatic_core::workflow::{
    self, AddNodeOptions, ApplyOptions, Engines, Output, ValidateOptions,
};

use crate::checks::{LocalPki, TcpConnectivityCheck};
use crate::config::KismaticConfig;
use crate::engine::{CommandExecutor, CommandProvisioner, OutputFormat};

const ADMIN_PASSWORD_LEN: usize = 16;

/// Persistent path flags of `kismatic install`.
#[derive(Debug, Clone, Args)]
pub struct PathArgs {
    /// Path to the installation plan file
    #[arg(
        short = 'f',
        long = "plan-file",
        global = true,
        default_value_os_t = PathFlags::default().plan_file
    )]
    pub plan_file: PathBuf,
    /// Path to the directory where assets generated during the installation process will be stored
    #[arg(
        short = 'g',
        long = "generated-assets-dir",
        global = true,
        default_value_os_t = PathFlags::default().generated_dir
    )]
    pub generated_dir: PathBuf,
}

impl PathArgs {
    fn flags(&self) -> PathFlags {
        PathFlags {
            plan_file: self.plan_file.clone(),
            generated_dir: self.generated_dir.clone(),
        }
    }
}

/// Flags controlling the installation engine's output.
#[derive(Debug, Clone, Copy, Args)]
pub struct EngineArgs {
    /// Enable verbose logging from the installation
    #[arg(long)]
    pub verbose: bool,
    /// Installation output format
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Simple)]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum InstallCommands {
    /// Plan your Kubernetes cluster and generate a plan file
    Plan {
        /// Name of the cluster
        #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
        cluster_name: String,
        /// Infrastructure provisioner (e.g. aws), empty for existing machines
        #[arg(long, default_value = "")]
        infrastructure_provisioner: String,
        #[arg(long, default_value_t = 3)]
        etcd_nodes: u32,
        #[arg(long, default_value_t = 2)]
        master_nodes: u32,
        #[arg(long, default_value_t = 3)]
        worker_nodes: u32,
        #[arg(long, default_value_t = 2)]
        ingress_nodes: u32,
        #[arg(long, default_value_t = 0)]
        storage_nodes: u32,
        #[arg(long, default_value_t = 0)]
        nfs_volumes: u32,
        /// Kubernetes admin password (generated when omitted)
        #[arg(long)]
        admin_password: Option<String>,
    },
    /// Validate your plan file
    Validate {
        /// Clusters to validate (default: the cluster the path flags describe)
        clusters: Vec<String>,
        /// Skip pre-flight checks
        #[arg(long)]
        skip_preflight: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Install your Kubernetes cluster
    Apply {
        clusters: Vec<String>,
        /// Force restart cluster services (Use with care)
        #[arg(long)]
        restart_services: bool,
        /// Skip pre-flight checks, useful when rerunning kismatic
        #[arg(long)]
        skip_preflight: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Add a new node to an existing Kubernetes cluster
    #[command(alias = "add-worker")]
    AddNode {
        /// [CLUSTER_NAME] NODE_NAME NODE_IP [NODE_INTERNAL_IP]
        #[arg(required = true, num_args = 2..=4, value_name = "ARGS")]
        args: Vec<String>,
        /// Roles separated by ','
        #[arg(long, value_delimiter = ',')]
        roles: Vec<NodeRole>,
        /// key=value pairs separated by ','
        #[arg(short = 'l', long, value_delimiter = ',')]
        labels: Vec<String>,
        /// Force restart cluster services (Use with care)
        #[arg(long)]
        restart_services: bool,
        /// Skip pre-flight checks, useful when rerunning kismatic
        #[arg(long)]
        skip_preflight: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run a specific task of the installation workflow (debug feature)
    Step {
        /// [CLUSTER_NAME...] PLAY_NAME
        #[arg(required = true, num_args = 1.., value_name = "ARGS")]
        args: Vec<String>,
        /// Force restart cluster services (Use with care)
        #[arg(long)]
        restart_services: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Provision infrastructure for your cluster
    Provision {
        clusters: Vec<String>,
        /// Allow infrastructure destruction, required when scaling down (Use with care)
        #[arg(long)]
        allow_destruction: bool,
    },
    /// Destroy your provisioned cluster
    Destroy { clusters: Vec<String> },
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

fn is_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

/// Split `add-node` positionals into an optional cluster name and the node.
///
/// With three arguments the second being an IP means
/// `NODE_NAME NODE_IP NODE_INTERNAL_IP`; otherwise the third must be an IP
/// and the first is the cluster name.
pub fn parse_add_node_args(args: &[String]) -> Result<(Option<String>, Node)> {
    match args {
        [host, ip] => Ok((None, Node::new(host, ip))),
        [host, ip, internal] if is_ip(ip) => {
            Ok((None, Node::new(host, ip).internal_ip(internal)))
        }
        [cluster, host, ip] if is_ip(ip) => Ok((Some(cluster.clone()), Node::new(host, ip))),
        [_, _, _] => bail!(
            "expected [CLUSTER_NAME] NODE_NAME NODE_IP [NODE_INTERNAL_IP], found no valid node IP"
        ),
        [cluster, host, ip, internal] => Ok((
            Some(cluster.clone()),
            Node::new(host, ip).internal_ip(internal),
        )),
        _ => bail!("expected [CLUSTER_NAME] NODE_NAME NODE_IP [NODE_INTERNAL_IP]"),
    }
}

/// Parse `key=value` labels.
pub fn parse_labels(labels: &[String]) -> Result<BTreeMap<String, String>> {
    let mut parsed = BTreeMap::new();
    for label in labels {
        match label.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.contains('=') => {
                parsed.insert(key.to_owned(), value.to_owned());
            }
            _ => bail!("invalid label {label:?} provided, must be key=value pair"),
        }
    }
    Ok(parsed)
}

/// Split `step` positionals into the cluster names and the play.
pub fn split_step_args(args: &[String]) -> Result<(&[String], &str)> {
    match args.split_last() {
        Some((play, clusters)) => Ok((clusters, play.as_str())),
        None => bail!("expected [CLUSTER_NAME...] PLAY_NAME"),
    }
}

fn generate_admin_password() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(ADMIN_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run an install subcommand.
pub async fn run_install_command(
    command: InstallCommands,
    paths: &PathArgs,
    config: &KismaticConfig,
) -> Result<()> {
    let flags = paths.flags();
    let mut out = Output::new(std::io::stdout());

    match command {
        InstallCommands::Plan {
            cluster_name,
            infrastructure_provisioner,
            etcd_nodes,
            master_nodes,
            worker_nodes,
            ingress_nodes,
            storage_nodes,
            nfs_volumes,
            admin_password,
        } => {
            let target = if flags == PathFlags::default() {
                locator::resolve(Some(&cluster_name), &flags)?
            } else {
                locator::resolve(None, &flags)?
            };
            let opts = PlanTemplateOptions {
                cluster_name,
                infrastructure_provisioner,
                etcd_nodes,
                master_nodes,
                worker_nodes,
                ingress_nodes,
                storage_nodes,
                nfs_volumes,
                admin_password: admin_password.unwrap_or_else(generate_admin_password),
            };
            out.header("Plan your Kubernetes cluster");
            workflow::write_template(&mut out, &mut target.store(), &opts)?;
        }

        InstallCommands::Validate {
            clusters,
            skip_preflight,
            engine,
        } => {
            for target in locator::resolve_all(&clusters, &flags)? {
                let executor = command_executor(config, &target, engine);
                let opts = ValidateOptions { skip_preflight };
                workflow::validate(
                    &mut out,
                    &engines(&executor),
                    &target.store(),
                    &target.generated_dir,
                    opts,
                )
                .await?;
            }
        }

        InstallCommands::Apply {
            clusters,
            restart_services,
            skip_preflight,
            engine,
        } => {
            for target in locator::resolve_all(&clusters, &flags)? {
                let executor = command_executor(config, &target, engine);
                let opts = ApplyOptions {
                    restart_services,
                    skip_preflight,
                };
                workflow::apply(
                    &mut out,
                    &engines(&executor),
                    &target.store(),
                    &target.generated_dir,
                    opts,
                )
                .await?;
            }
        }

        InstallCommands::AddNode {
            args,
            roles,
            labels,
            restart_services,
            skip_preflight,
            engine,
        } => {
            let (cluster, mut node) = parse_add_node_args(&args)?;
            node.labels = parse_labels(&labels)?;
            let target = locator::resolve(cluster.as_deref(), &flags)?;
            if let Some(name) = &cluster {
                if !target.exists() {
                    bail!("cluster {name} not found");
                }
            }
            let executor = command_executor(config, &target, engine);
            let opts = AddNodeOptions {
                roles,
                restart_services,
                skip_preflight,
            };
            workflow::add_node(&mut out, &engines(&executor), &mut target.store(), &node, &opts)
                .await?;
            out.line("\nThe node was successfully added to the cluster\n");
        }

        InstallCommands::Step {
            args,
            restart_services,
            engine,
        } => {
            let (clusters, play) = split_step_args(&args)?;
            for target in locator::resolve_all(clusters, &flags)? {
                let executor = command_executor(config, &target, engine);
                workflow::step(
                    &mut out,
                    &engines(&executor),
                    &target.store(),
                    &target.generated_dir,
                    play,
                    restart_services,
                )
                .await?;
            }
        }

        InstallCommands::Provision {
            clusters,
            allow_destruction,
        } => {
            let provisioner = CommandProvisioner::new(config);
            let opts = ProvisionOptions { allow_destruction };
            for target in locator::resolve_all(&clusters, &flags)? {
                workflow::provision(&mut out, &provisioner, &mut target.store(), &opts).await?;
            }
        }

        InstallCommands::Destroy { clusters } => {
            let provisioner = CommandProvisioner::new(config);
            for target in locator::resolve_all(&clusters, &flags)? {
                workflow::destroy(&mut out, &provisioner, &target.store()).await?;
            }
        }
    }

    Ok(())
}

fn command_executor(
    config: &KismaticConfig,
    target: &ClusterPaths,
    engine: EngineArgs,
) -> CommandExecutor {
    CommandExecutor::new(config, &target.plan_file, &target.generated_dir)
        .verbose(engine.verbose)
        .output(engine.output)
}

fn engines(executor: &CommandExecutor) -> Engines<'_> {
    Engines {
        executor,
        validator: &StructuralValidator,
        connectivity: &TcpConnectivityCheck::DEFAULT,
        certificates: &LocalPki,
    }
}
