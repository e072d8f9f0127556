//! Network connectivity reporting.

use std::fmt;

/// Reachability of the network as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// No network at all.
    None,
    /// Local network only (for example WiFi without upstream).
    Local,
    /// Remote hosts are reachable.
    Remote,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "No Connection",
            Self::Local => "Local",
            Self::Remote => "Remote",
        };
        f.write_str(name)
    }
}

/// Source of the current connectivity.
pub trait ConnectivityMonitor: Send + Sync {
    /// Current connectivity. Must not block.
    fn current_connectivity(&self) -> Connectivity;
}

/// Monitor that always reports the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedConnectivity(pub Connectivity);

impl ConnectivityMonitor for FixedConnectivity {
    fn current_connectivity(&self) -> Connectivity {
        self.0
    }
}

impl<F> ConnectivityMonitor for F
where
    F: Fn() -> Connectivity + Send + Sync,
{
    fn current_connectivity(&self) -> Connectivity {
        self()
    }
}
