//! Presentation-layer subscription seam (§1, §10.1)
//!
//! The HTTP/WebSocket server that streams fingerprints to a browser is out
//! of scope for this repository; what's in scope is the contract it plugs
//! into. [`FingerprintSink`] is that contract — a registered sink receives
//! every fingerprint the engine produces or refreshes. This crate ships one
//! implementation, [`LoggingSink`], so the core pipeline has an observable
//! effect even with no presentation layer attached.

use parkranger_core::VPNFingerprint;
use tracing::info;

/// Receives every fingerprint as it is created or updated.
pub trait FingerprintSink: Send + Sync {
    fn publish(&self, fingerprint: &VPNFingerprint);
}

/// Logs a one-line summary of each fingerprint at info level.
pub struct LoggingSink;

impl FingerprintSink for LoggingSink {
    fn publish(&self, fingerprint: &VPNFingerprint) {
        if fingerprint.is_vpn_likely {
            info!(
                ip = %fingerprint.ip,
                tcp_rtt_ms = ?fingerprint.tcp_rtt_ms,
                icmp_rtt_ms = ?fingerprint.icmp_rtt_ms,
                estimated_distance_km = ?fingerprint.estimated_distance_km,
                confidence = fingerprint.confidence,
                candidate_cities = fingerprint.possible_cities.len(),
                "VPN likely"
            );
        } else {
            info!(
                ip = %fingerprint.ip,
                tcp_rtt_ms = ?fingerprint.tcp_rtt_ms,
                icmp_rtt_ms = ?fingerprint.icmp_rtt_ms,
                confidence = fingerprint.confidence,
                "fingerprint updated"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_sink_does_not_panic_on_a_bare_fingerprint() {
        let sink = LoggingSink;
        sink.publish(&VPNFingerprint::new("203.0.113.5"));
    }
}
