//! Active ICMP probing via the platform `ping` utility
//!
//! Raw ICMP sockets require `CAP_NET_RAW`; invoking the system `ping` binary
//! keeps the privilege boundary in one place (the capture interface) and
//! lets the probe run unprivileged. This mirrors the scanner workspace's
//! pattern of keeping a privileged primitive (`icmp_monitor`'s raw socket)
//! behind a narrow, swappable interface (§9: "external subprocess for ICMP").

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Issues ICMP echo probes by shelling out to `ping -c <count> -W <timeout>`.
#[derive(Clone)]
pub struct IcmpProber {
    count: u32,
    timeout_secs: f64,
    /// When `false`, `probe` always returns `None` without spawning a process
    /// (used by tests and environments without a `ping` binary).
    enabled: bool,
}

impl IcmpProber {
    pub fn new(count: u32, timeout_secs: f64) -> Self {
        IcmpProber {
            count,
            timeout_secs,
            enabled: true,
        }
    }

    /// A prober that never actually shells out; used by unit tests that only
    /// exercise the tracker's bookkeeping.
    pub fn new_disabled() -> Self {
        IcmpProber {
            count: 3,
            timeout_secs: 2.0,
            enabled: false,
        }
    }

    /// Runs `ping -c <count> -W <timeout_whole_seconds> <ip>` and returns the
    /// minimum RTT in milliseconds parsed from the `min/avg/max` summary
    /// line, or `None` on any failure (timeout, non-zero exit, unparseable
    /// output — §7 treats these as swallowed transient failures).
    ///
    /// `-W` takes whole seconds on most `ping` implementations, so the
    /// configured timeout is truncated (§9 open question: documented as
    /// whole seconds).
    pub async fn probe(&self, ip: IpAddr) -> Option<f64> {
        if !self.enabled {
            return None;
        }

        let whole_timeout_secs = self.timeout_secs.trunc().max(1.0) as u64;
        let wait_budget = Duration::from_secs_f64(
            self.timeout_secs * self.count as f64 + 2.0,
        );

        let mut cmd = Command::new("ping");
        cmd.arg("-c")
            .arg(self.count.to_string())
            .arg("-W")
            .arg(whole_timeout_secs.to_string())
            .arg(ip.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let output = match timeout(wait_budget, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("failed to spawn ping for {}: {}", ip, e);
                return None;
            }
            Err(_) => {
                debug!("ping probe for {} timed out", ip);
                return None;
            }
        };

        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_min_rtt(&stdout)
    }
}

/// Parses the minimum RTT, in milliseconds, out of a `ping` summary line
/// such as `rtt min/avg/max/mdev = 19.803/20.012/20.221/0.209 ms`.
fn parse_min_rtt(output: &str) -> Option<f64> {
    for line in output.lines() {
        if line.contains("min/avg/max") {
            let after_eq = line.split('=').nth(1)?;
            let first_field = after_eq.trim().split('/').next()?;
            return first_field.trim().parse().ok();
        }
    }
    None
}
