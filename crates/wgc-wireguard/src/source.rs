//! Live-state sources.
//!
//! [`LiveStateSource`] is what the reconciliation engine reads the host
//! through. [`SystemSource`] shells out to `wg` and `ip`, and
//! [`FakeSource`] serves canned data for tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, WireGuardError};

/// One address assigned to a host network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInterface {
    /// Interface name.
    pub name: String,
    /// Assigned address.
    pub addr: IpAddr,
    /// Whether this is a loopback address.
    pub is_loopback: bool,
}

impl HostInterface {
    /// Creates an entry, flagging loopback addresses.
    #[must_use]
    pub fn new(name: impl Into<String>, addr: IpAddr) -> Self {
        Self {
            name: name.into(),
            addr,
            is_loopback: addr.is_loopback(),
        }
    }
}

/// Source of live tunnel-interface state.
#[allow(async_fn_in_trait)]
pub trait LiveStateSource {
    /// Lists every address of every host interface.
    async fn interfaces(&self) -> Result<Vec<HostInterface>>;

    /// Returns the raw `wg show <interface> dump` text.
    async fn dump(&self, interface: &str) -> Result<String>;

    /// Returns the local address the host would use to reach `remote`.
    async fn local_addr_for(&self, remote: IpAddr) -> Result<Option<IpAddr>>;
}

/// Reads live state from the host using `get_if_addrs`, `wg` and `ip`.
#[derive(Debug, Clone)]
pub struct SystemSource {
    wg_command: String,
    ip_command: String,
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSource {
    /// Creates a source using `wg` and `ip` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            wg_command: "wg".to_string(),
            ip_command: "ip".to_string(),
        }
    }

    /// Overrides the `wg` binary.
    #[must_use]
    pub fn with_wg_command(mut self, command: impl Into<String>) -> Self {
        self.wg_command = command.into();
        self
    }

    /// Overrides the `ip` binary.
    #[must_use]
    pub fn with_ip_command(mut self, command: impl Into<String>) -> Self {
        self.ip_command = command.into();
        self
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let command_line = format!("{program} {}", args.join(" "));
        debug!(command = %command_line, "running");

        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WireGuardError::NotInstalled {
                command: program.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WireGuardError::command_failed(
                command_line,
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl LiveStateSource for SystemSource {
    async fn interfaces(&self) -> Result<Vec<HostInterface>> {
        let ifaces = get_if_addrs::get_if_addrs()
            .map_err(|e| WireGuardError::enumeration(e.to_string()))?;
        Ok(ifaces
            .into_iter()
            .map(|iface| HostInterface {
                is_loopback: iface.is_loopback(),
                addr: iface.ip(),
                name: iface.name,
            })
            .collect())
    }

    async fn dump(&self, interface: &str) -> Result<String> {
        self.run(&self.wg_command, &["show", interface, "dump"]).await
    }

    async fn local_addr_for(&self, remote: IpAddr) -> Result<Option<IpAddr>> {
        let family = if remote.is_ipv4() { "-4" } else { "-6" };
        let target = remote.to_string();
        let output = self
            .run(&self.ip_command, &[family, "route", "get", &target])
            .await?;
        Ok(parse_route_src(&output))
    }
}

/// Extracts the `src` address from `ip route get` output.
#[must_use]
pub fn parse_route_src(output: &str) -> Option<IpAddr> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "src" {
            return tokens.next()?.parse().ok();
        }
    }
    None
}

#[derive(Debug, Default)]
struct FakeState {
    interfaces: Vec<HostInterface>,
    dumps: HashMap<String, String>,
    routes: HashMap<IpAddr, IpAddr>,
    fail_enumeration: bool,
}

/// A live-state source serving canned data, for testing.
#[derive(Debug, Clone, Default)]
pub struct FakeSource {
    state: Arc<RwLock<FakeState>>,
}

impl FakeSource {
    /// Creates an empty fake source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interface address.
    pub async fn add_interface(&self, name: &str, addr: IpAddr) {
        self.state
            .write()
            .await
            .interfaces
            .push(HostInterface::new(name, addr));
    }

    /// Sets the dump text returned for an interface.
    pub async fn set_dump(&self, name: &str, dump: impl Into<String>) {
        self.state
            .write()
            .await
            .dumps
            .insert(name.to_string(), dump.into());
    }

    /// Sets the local address used to reach `remote`.
    pub async fn set_route(&self, remote: IpAddr, local: IpAddr) {
        self.state.write().await.routes.insert(remote, local);
    }

    /// Makes interface enumeration fail.
    pub async fn fail_enumeration(&self, fail: bool) {
        self.state.write().await.fail_enumeration = fail;
    }
}

impl LiveStateSource for FakeSource {
    async fn interfaces(&self) -> Result<Vec<HostInterface>> {
        let state = self.state.read().await;
        if state.fail_enumeration {
            return Err(WireGuardError::enumeration("fake enumeration failure"));
        }
        Ok(state.interfaces.clone())
    }

    async fn dump(&self, interface: &str) -> Result<String> {
        self.state
            .read()
            .await
            .dumps
            .get(interface)
            .cloned()
            .ok_or_else(|| {
                WireGuardError::command_failed(
                    format!("wg show {interface} dump"),
                    1,
                    "Unable to access interface: No such device",
                )
            })
    }

    async fn local_addr_for(&self, remote: IpAddr) -> Result<Option<IpAddr>> {
        Ok(self.state.read().await.routes.get(&remote).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().expect("addr")
    }

    #[test]
    fn route_src_v4() {
        let out = "192.0.2.10 via 10.0.0.1 dev eth0 src 10.0.0.23 uid 1000 \n    cache \n";
        assert_eq!(parse_route_src(out), Some(ip("10.0.0.23")));
    }

    #[test]
    fn route_src_v6() {
        let out = "2001:db8::10 from :: via fe80::1 dev eth0 proto ra src 2001:db8::23 metric 100 pref medium\n";
        assert_eq!(parse_route_src(out), Some(ip("2001:db8::23")));
    }

    #[test]
    fn route_src_missing() {
        assert_eq!(parse_route_src("unreachable 192.0.2.10"), None);
        assert_eq!(parse_route_src("dev eth0 src"), None);
        assert_eq!(parse_route_src("dev eth0 src garbage"), None);
    }

    #[test]
    fn host_interface_loopback_flag() {
        assert!(HostInterface::new("lo", ip("127.0.0.1")).is_loopback);
        assert!(!HostInterface::new("eth0", ip("10.0.0.1")).is_loopback);
    }

    #[tokio::test]
    async fn fake_serves_canned_state() {
        let fake = FakeSource::new();
        fake.add_interface("v4wgconnect0", ip("10.10.0.1")).await;
        fake.set_dump("v4wgconnect0", "priv pub 51820 off").await;
        fake.set_route(ip("192.0.2.10"), ip("192.0.2.1")).await;

        let ifaces = fake.interfaces().await.expect("interfaces");
        assert_eq!(ifaces.len(), 1);
        assert_eq!(fake.dump("v4wgconnect0").await.expect("dump"), "priv pub 51820 off");
        assert_eq!(
            fake.local_addr_for(ip("192.0.2.10")).await.expect("route"),
            Some(ip("192.0.2.1"))
        );
        assert_eq!(fake.local_addr_for(ip("192.0.2.99")).await.expect("route"), None);
    }

    #[tokio::test]
    async fn fake_missing_dump_is_command_failure() {
        let fake = FakeSource::new();
        let err = fake.dump("wg9").await.expect_err("missing");
        assert!(err.is_interface_scoped());
    }

    #[tokio::test]
    async fn fake_enumeration_failure() {
        let fake = FakeSource::new();
        fake.fail_enumeration(true).await;
        let err = fake.interfaces().await.expect_err("fails");
        assert!(matches!(err, WireGuardError::Enumeration { .. }));
    }

    #[tokio::test]
    async fn system_source_reports_missing_binary() {
        let source = SystemSource::new().with_wg_command("wgc-test-no-such-binary");
        let err = source.dump("wg0").await.expect_err("missing binary");
        assert!(matches!(err, WireGuardError::NotInstalled { .. }));
    }
}
