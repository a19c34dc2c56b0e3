//! Engine adapters that drive external binaries.
//!
//! The installation engine is spawned with the plan file and generated-assets
//! directory on its command line and its output streamed to the terminal.
//! The provisioning engine receives the plan on stdin and answers with the
//! updated plan on stdout, both in the buffer store's JSON encoding.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

use kismatic_core::engine::{Executor, ProvisionOptions, Provisioner};
use kismatic_core::plan::{Node, NodeRole, Plan};
use kismatic_core::store::{BufferPlanStore, PlanStore};

use crate::config::KismaticConfig;

/// How the installation engine formats its progress output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Simple,
    Raw,
}

impl OutputFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Raw => "raw",
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn describe(binary: &Path, args: &[OsString]) -> String {
    let mut line = binary.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

// ---------------------------------------------------------------------------
// Installation engine
// ---------------------------------------------------------------------------

/// [`Executor`] backed by the installation engine binary.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    binary: PathBuf,
    working_dir: PathBuf,
    plan_file: PathBuf,
    generated_dir: PathBuf,
    verbose: bool,
    output: OutputFormat,
}

impl CommandExecutor {
    pub fn new(config: &KismaticConfig, plan_file: &Path, generated_dir: &Path) -> Self {
        Self {
            binary: config.installer.clone(),
            working_dir: config.working_dir.clone(),
            plan_file: absolute(plan_file),
            generated_dir: absolute(generated_dir),
            verbose: false,
            output: OutputFormat::default(),
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }

    /// Arguments shared by every invocation, after the subcommand.
    fn args(&self, subcommand: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            subcommand.into(),
            "--plan-file".into(),
            self.plan_file.clone().into(),
            "--generated-assets-dir".into(),
            self.generated_dir.clone().into(),
            "--output".into(),
            self.output.as_str().into(),
        ];
        if self.verbose {
            args.push("--verbose".into());
        }
        args
    }

    fn node_args(args: &mut Vec<OsString>, node: &Node) {
        args.extend(["--host".into(), node.host.clone().into()]);
        args.extend(["--ip".into(), node.ip.clone().into()]);
        if !node.internal_ip.is_empty() {
            args.extend(["--internal-ip".into(), node.internal_ip.clone().into()]);
        }
    }

    async fn run(&self, args: Vec<OsString>) -> Result<()> {
        let line = describe(&self.binary, &args);
        debug!(command = %line, "running installation engine");
        let status = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .status()
            .await
            .with_context(|| format!("failed to execute installation engine ({line})"))?;
        if !status.success() {
            bail!("installation engine exited with {status} ({line})");
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn run_play(&self, task: &str, _plan: &Plan, restart_services: bool) -> Result<()> {
        let mut args = self.args("play");
        args.push(task.into());
        if restart_services {
            args.push("--restart-services".into());
        }
        self.run(args).await
    }

    async fn install(&self, _plan: &Plan, restart_services: bool) -> Result<()> {
        let mut args = self.args("install");
        if restart_services {
            args.push("--restart-services".into());
        }
        self.run(args).await
    }

    async fn run_pre_flight_check(&self, _plan: &Plan) -> Result<()> {
        self.run(self.args("preflight")).await
    }

    async fn run_new_node_pre_flight_check(&self, _plan: &Plan, node: &Node) -> Result<()> {
        let mut args = self.args("preflight-node");
        Self::node_args(&mut args, node);
        self.run(args).await
    }

    async fn run_smoke_test(&self, _plan: &Plan) -> Result<()> {
        self.run(self.args("smoke-test")).await
    }

    async fn generate_certificates(&self, _plan: &Plan, force: bool) -> Result<()> {
        let mut args = self.args("certificates");
        if force {
            args.push("--force".into());
        }
        self.run(args).await
    }

    async fn add_node(
        &self,
        plan: &Plan,
        node: &Node,
        roles: &[NodeRole],
        restart_services: bool,
    ) -> Result<Plan> {
        let mut args = self.args("add-node");
        Self::node_args(&mut args, node);
        let roles_arg: Vec<String> = roles.iter().map(ToString::to_string).collect();
        args.extend(["--roles".into(), roles_arg.join(",").into()]);
        for (key, value) in &node.labels {
            args.extend(["--label".into(), format!("{key}={value}").into()]);
        }
        if restart_services {
            args.push("--restart-services".into());
        }
        self.run(args).await?;

        let mut updated = plan.clone();
        updated.add_node(node, roles);
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Provisioning engine
// ---------------------------------------------------------------------------

/// [`Provisioner`] backed by the provisioning engine binary. Credentials
/// reach the engine through the inherited environment.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    binary: PathBuf,
    working_dir: PathBuf,
}

impl CommandProvisioner {
    pub fn new(config: &KismaticConfig) -> Self {
        Self {
            binary: config.provisioner.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    /// Run the engine, feed `input` on stdin and return its stdout.
    async fn run(&self, args: Vec<OsString>, input: &[u8]) -> Result<Vec<u8>> {
        let line = describe(&self.binary, &args);
        debug!(command = %line, "running provisioning engine");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute provisioning engine ({line})"))?;

        let mut stdin_pipe = child.stdin.take();
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let write_stdin = async {
            if let Some(mut pipe) = stdin_pipe.take() {
                // A child that exits without reading its input is not an error
                // by itself; its exit status decides.
                pipe.write_all(input).await.ok();
            }
        };
        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stdout_pipe {
                pipe.read_to_end(&mut buf).await.ok();
            }
            buf
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stderr_pipe {
                pipe.read_to_end(&mut buf).await.ok();
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        let (status, (), stdout, stderr) =
            tokio::join!(child.wait(), write_stdin, read_stdout, read_stderr);
        let status =
            status.with_context(|| format!("failed to wait on provisioning engine ({line})"))?;
        if !status.success() {
            bail!(
                "provisioning engine exited with {status} ({line}): {}",
                stderr.trim()
            );
        }
        Ok(stdout)
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self, plan: &Plan, opts: &ProvisionOptions) -> Result<Plan> {
        let mut request = BufferPlanStore::new();
        request.write(plan)?;

        let mut args: Vec<OsString> = vec![
            "provision".into(),
            "--provider".into(),
            plan.provisioner.provider.clone().into(),
            "--cluster".into(),
            plan.cluster.name.clone().into(),
        ];
        if opts.allow_destruction {
            args.push("--allow-destruction".into());
        }
        info!(provider = %plan.provisioner.provider, cluster = %plan.cluster.name, "provisioning");
        let reply = self.run(args, request.as_bytes()).await?;

        BufferPlanStore::from_bytes(reply)
            .read()
            .context("provisioning engine returned an unreadable plan")
    }

    async fn destroy(&self, provider: &str, cluster_name: &str) -> Result<()> {
        let args: Vec<OsString> = vec![
            "destroy".into(),
            "--provider".into(),
            provider.into(),
            "--cluster".into(),
            cluster_name.into(),
        ];
        info!(provider, cluster = cluster_name, "destroying");
        self.run(args, &[]).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(installer: &Path, provisioner: &Path, working_dir: &Path) -> KismaticConfig {
        KismaticConfig {
            installer: installer.to_path_buf(),
            provisioner: provisioner.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn executor_args_carry_paths_and_format() {
        let cfg = config(Path::new("/bin/runner"), Path::new("/bin/tf"), Path::new("/"));
        let exec = CommandExecutor::new(&cfg, Path::new("/c/plan.yaml"), Path::new("/c/generated"))
            .verbose(true)
            .output(OutputFormat::Raw);
        assert_eq!(
            strings(&exec.args("install")),
            [
                "install",
                "--plan-file",
                "/c/plan.yaml",
                "--generated-assets-dir",
                "/c/generated",
                "--output",
                "raw",
                "--verbose",
            ]
        );
    }

    #[test]
    fn relative_paths_are_made_absolute() {
        let cfg = config(Path::new("runner"), Path::new("tf"), Path::new("."));
        let exec = CommandExecutor::new(&cfg, Path::new("plan.yaml"), Path::new("generated"));
        assert!(exec.plan_file.is_absolute());
        assert!(exec.generated_dir.ends_with("generated"));
    }

    #[test]
    fn node_args_skip_empty_internal_ip() {
        let mut args = Vec::new();
        CommandExecutor::node_args(&mut args, &Node::new("w1", "10.0.0.9"));
        assert_eq!(strings(&args), ["--host", "w1", "--ip", "10.0.0.9"]);

        let mut args = Vec::new();
        let node = Node::new("w1", "10.0.0.9").internal_ip("192.168.0.9");
        CommandExecutor::node_args(&mut args, &node);
        assert_eq!(strings(&args)[4..], ["--internal-ip", "192.168.0.9"]);
    }

    #[cfg(unix)]
    mod process {
        use std::os::unix::fs::PermissionsExt;

        use kismatic_core::plan::normalize;
        use kismatic_test_utils::{plan_with_workers, sample_plan};

        use super::*;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn executor_add_node_records_node_after_success() {
            let tmp = tempfile::TempDir::new().unwrap();
            let runner = script(tmp.path(), "runner", "echo \"$@\" > args.txt");
            let cfg = config(&runner, Path::new("tf"), tmp.path());
            let exec = CommandExecutor::new(&cfg, &tmp.path().join("plan.yaml"), tmp.path());

            let node = Node::new("w9", "10.0.0.9").label("zone", "a");
            let roles = [NodeRole::Worker, NodeRole::Ingress];
            let updated = exec
                .add_node(&plan_with_workers(2), &node, &roles, true)
                .await
                .unwrap();

            assert_eq!(updated.worker.expected_count, 3);
            assert_eq!(updated.worker.nodes.last(), Some(&node));
            assert_eq!(updated.ingress.nodes, vec![node]);
            let args = std::fs::read_to_string(tmp.path().join("args.txt")).unwrap();
            assert!(args.starts_with("add-node --plan-file"));
            assert!(args.contains("--roles worker,ingress"));
            assert!(args.contains("--label zone=a"));
            assert!(args.trim_end().ends_with("--restart-services"));
        }

        #[tokio::test]
        async fn executor_reports_failing_engine() {
            let tmp = tempfile::TempDir::new().unwrap();
            let runner = script(tmp.path(), "runner", "exit 2");
            let cfg = config(&runner, Path::new("tf"), tmp.path());
            let exec = CommandExecutor::new(&cfg, &tmp.path().join("plan.yaml"), tmp.path());

            let err = exec.run_smoke_test(&Plan::default()).await.unwrap_err();
            assert!(err.to_string().contains("smoke-test"), "{err}");
        }

        #[tokio::test]
        async fn provisioner_round_trips_plan_through_stdio() {
            let tmp = tempfile::TempDir::new().unwrap();
            let tf = script(tmp.path(), "tf", "cat");
            let cfg = config(Path::new("runner"), &tf, tmp.path());

            let mut plan = sample_plan();
            plan.provisioner.provider = "aws".to_owned();

            let updated = CommandProvisioner::new(&cfg)
                .provision(&plan, &ProvisionOptions::default())
                .await
                .unwrap();
            assert_eq!(updated, normalize(plan));
        }

        #[tokio::test]
        async fn provisioner_error_includes_stderr() {
            let tmp = tempfile::TempDir::new().unwrap();
            let tf = script(tmp.path(), "tf", "echo 'no credentials' >&2\nexit 1");
            let cfg = config(Path::new("runner"), &tf, tmp.path());

            let err = CommandProvisioner::new(&cfg)
                .destroy("aws", "prod")
                .await
                .unwrap_err();
            assert!(err.to_string().contains("no credentials"), "{err}");
        }
    }
}
