//! Privilege checking for raw packet capture
//!
//! `pcap` capture on Linux requires either root or `CAP_NET_RAW`; this is a
//! coarse, best-effort check reported to the operator before the (more
//! authoritative) open-device call in `PacketObserver::run_capture_loop`
//! fails with `Error::Privilege` if we were wrong (§6, §7: fatal errors are
//! reported and the process exits non-zero).

#[cfg(unix)]
pub fn running_as_root() -> bool {
    // SAFETY: geteuid() takes no arguments and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}
