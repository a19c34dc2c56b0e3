mod checks;
mod clusters_cmd;
mod config;
mod engine;
mod install_cmds;
#[cfg(test)]
mod test_util;

use std::path::Path;

use clap::{CommandFactory, Parser, Subcommand};

use kismatic_core::locator::CLUSTERS_DIR;

use config::KismaticConfig;
use install_cmds::{InstallCommands, PathArgs};

#[derive(Parser)]
#[command(
    name = "kismatic",
    version,
    about = "Plan, install and grow multi-node Kubernetes clusters"
)]
struct Cli {
    /// Installation engine binary (overrides KISMATIC_INSTALLER env var)
    #[arg(long, global = true)]
    installer: Option<String>,

    /// Provisioning engine binary (overrides KISMATIC_PROVISIONER env var)
    #[arg(long, global = true)]
    provisioner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a kismatic config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// List the names of the clusters currently being managed
    Clusters {
        /// Print modification time and type of each entry
        #[arg(short, long)]
        verbose: bool,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
    /// Install and manage clusters
    Install {
        #[command(flatten)]
        paths: PathArgs,
        #[command(subcommand)]
        command: InstallCommands,
    },
}

/// Execute the `kismatic init` command: write config file.
fn cmd_init(installer: Option<&str>, provisioner: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut cfg = config::ConfigFile::default();
    if let Some(installer) = installer {
        cfg.engine.installer = installer.to_owned();
    }
    if let Some(provisioner) = provisioner {
        cfg.engine.provisioner = provisioner.to_owned();
    }

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  engine.installer = {}", cfg.engine.installer);
    println!("  engine.provisioner = {}", cfg.engine.provisioner);
    println!();
    println!("Next: run `kismatic install plan` to describe your cluster.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(cli.installer.as_deref(), cli.provisioner.as_deref(), force)?;
        }
        Commands::Clusters { verbose } => {
            clusters_cmd::run_clusters(&mut std::io::stdout(), Path::new(CLUSTERS_DIR), verbose)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "kismatic", &mut std::io::stdout());
        }
        Commands::Install { paths, command } => {
            let resolved =
                KismaticConfig::resolve(cli.installer.as_deref(), cli.provisioner.as_deref());
            install_cmds::run_install_command(command, &paths, &resolved).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use kismatic_core::plan::NodeRole;

    use super::*;
    use crate::engine::OutputFormat;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kismatic").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn install_path_flags_default_to_the_default_cluster() {
        let Commands::Install { paths, .. } = parse(&["install", "validate"]).command else {
            panic!("expected install");
        };
        assert_eq!(
            paths.plan_file,
            PathBuf::from("clusters/kubernetes/kismatic-cluster.yaml")
        );
        assert_eq!(paths.generated_dir, PathBuf::from("clusters/kubernetes/generated"));
    }

    #[test]
    fn path_flags_are_accepted_after_the_subcommand() {
        let Commands::Install { paths, command } =
            parse(&["install", "apply", "-f", "my/plan.yaml", "--skip-preflight"]).command
        else {
            panic!("expected install");
        };
        assert_eq!(paths.plan_file, PathBuf::from("my/plan.yaml"));
        assert!(matches!(
            command,
            InstallCommands::Apply {
                skip_preflight: true,
                restart_services: false,
                ..
            }
        ));
    }

    #[test]
    fn add_node_flags() {
        let Commands::Install { command, .. } = parse(&[
            "install",
            "add-worker",
            "prod",
            "w4",
            "10.0.0.4",
            "--roles",
            "worker,storage",
            "-l",
            "zone=a,tier=web",
            "-o",
            "raw",
        ])
        .command
        else {
            panic!("expected install");
        };
        let InstallCommands::AddNode {
            args,
            roles,
            labels,
            engine,
            ..
        } = command
        else {
            panic!("expected add-node");
        };
        assert_eq!(args, ["prod", "w4", "10.0.0.4"]);
        assert_eq!(roles, [NodeRole::Worker, NodeRole::Storage]);
        assert_eq!(labels, ["zone=a", "tier=web"]);
        assert_eq!(engine.output, OutputFormat::Raw);
    }

    #[test]
    fn add_node_rejects_unknown_role() {
        let result = Cli::try_parse_from([
            "kismatic", "install", "add-node", "w4", "10.0.0.4", "--roles", "master",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn step_collects_clusters_and_play() {
        let Commands::Install { command, .. } =
            parse(&["install", "step", "prod", "_docker.yaml", "--restart-services"]).command
        else {
            panic!("expected install");
        };
        let InstallCommands::Step {
            args,
            restart_services,
            ..
        } = command
        else {
            panic!("expected step");
        };
        assert_eq!(args, ["prod", "_docker.yaml"]);
        assert!(restart_services);
    }

    #[test]
    fn engine_overrides_are_global() {
        let cli = parse(&[
            "install",
            "provision",
            "--provisioner",
            "/bin/tf",
            "--allow-destruction",
        ]);
        assert_eq!(cli.provisioner.as_deref(), Some("/bin/tf"));
    }
}
