//! Local implementations of the connectivity and certificate checks.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use kismatic_core::engine::{CertificateCheck, ConnectivityCheck};
use kismatic_core::plan::{Node, Plan, SshConfig};
use kismatic_core::validate::ValidationErrors;

/// Directory under the generated-assets dir holding the cluster PKI.
pub const KEYS_DIR: &str = "keys";
pub const CA_CERT: &str = "ca.pem";
pub const CA_KEY: &str = "ca-key.pem";

// ---------------------------------------------------------------------------
// SSH reachability
// ---------------------------------------------------------------------------

/// Reachability of each node's SSH port, tested with a plain TCP connect.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnectivityCheck {
    pub timeout: Duration,
}

impl TcpConnectivityCheck {
    pub const DEFAULT: Self = Self {
        timeout: Duration::from_secs(10),
    };
}

impl Default for TcpConnectivityCheck {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[async_trait]
impl ConnectivityCheck for TcpConnectivityCheck {
    async fn check_node(
        &self,
        ssh: &SshConfig,
        node: &Node,
        label: &str,
    ) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::new(label);
        let ip: IpAddr = match node.ip.parse() {
            Ok(ip) => ip,
            Err(_) => {
                errs.push(format!("{label}: invalid IP {:?}", node.ip));
                return errs.into_result();
            }
        };
        let addr = SocketAddr::new(ip, ssh.port);
        debug!(%addr, "checking SSH port");
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => errs.push(format!("{label}: could not connect to {addr}: {e}")),
            Err(_) => errs.push(format!(
                "{label}: timed out connecting to {addr} after {}s",
                self.timeout.as_secs()
            )),
        }
        errs.into_result()
    }
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

/// Checks the PKI under `<generated>/keys`. A missing directory is fine,
/// certificates are generated on apply. Certificates and their keys must
/// exist in pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPki;

impl CertificateCheck for LocalPki {
    fn validate_certificates(
        &self,
        plan: &Plan,
        generated_dir: &Path,
    ) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::new("certificates");
        let keys = generated_dir.join(KEYS_DIR);
        if !keys.is_dir() {
            return Ok(());
        }

        check_pair(&mut errs, &keys, "CA", CA_CERT, CA_KEY);
        let hosts: BTreeSet<&str> = plan
            .all_nodes()
            .into_iter()
            .map(|(_, node)| node.host.as_str())
            .filter(|host| !host.is_empty())
            .collect();
        for host in hosts {
            let cert = format!("{host}.pem");
            let key = format!("{host}-key.pem");
            check_pair(&mut errs, &keys, &format!("node {host:?}"), &cert, &key);
        }
        errs.into_result()
    }
}

fn check_pair(errs: &mut ValidationErrors, dir: &Path, what: &str, cert: &str, key: &str) {
    match (dir.join(cert).is_file(), dir.join(key).is_file()) {
        (true, false) => errs.push(format!(
            "{what} certificate {cert} exists in {} but its key {key} is missing",
            dir.display()
        )),
        (false, true) => errs.push(format!(
            "{what} key {key} exists in {} but its certificate {cert} is missing",
            dir.display()
        )),
        _ => {}
    }
}
