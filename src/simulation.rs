use crate::qp_registry::QpRegistry;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Process-wide simulation tunables.
///
/// All values are read lock-free with relaxed ordering on every
/// residency-store operation and written only through the setters, so a
/// running workload can be re-tuned on the fly.
#[derive(Debug)]
pub struct SimConfig {
    /// Whether the middle (host-pinned) cache tier is present
    enable_middle_cache: AtomicBool,
    /// Injected latency of a host-swap tier access, in nanoseconds
    host_swap_delay_ns: AtomicU32,
    /// Injected latency of a device tier access, in nanoseconds
    device_delay_ns: AtomicU32,
    /// Injected latency of a middle cache access, in nanoseconds
    middle_delay_ns: AtomicU32,
}

impl SimConfig {
    /// Defaults: middle cache enabled, every delay zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            enable_middle_cache: AtomicBool::new(true),
            host_swap_delay_ns: AtomicU32::new(0),
            device_delay_ns: AtomicU32::new(0),
            middle_delay_ns: AtomicU32::new(0),
        }
    }

    /// Whether the middle cache tier is present
    #[inline]
    #[must_use]
    pub fn middle_cache_enabled(&self) -> bool {
        self.enable_middle_cache.load(Ordering::Relaxed)
    }

    /// Injected host-swap latency in nanoseconds
    #[inline]
    #[must_use]
    pub fn host_swap_delay_ns(&self) -> u32 {
        self.host_swap_delay_ns.load(Ordering::Relaxed)
    }

    /// Injected device-tier latency in nanoseconds
    #[inline]
    #[must_use]
    pub fn device_delay_ns(&self) -> u32 {
        self.device_delay_ns.load(Ordering::Relaxed)
    }

    /// Injected middle-cache latency in nanoseconds
    #[inline]
    #[must_use]
    pub fn middle_delay_ns(&self) -> u32 {
        self.middle_delay_ns.load(Ordering::Relaxed)
    }

    /// Reconfigure every tunable at once
    pub fn set_simulation_mode(
        &self,
        enable_middle_cache: bool,
        host_swap_delay_ns: u32,
        device_delay_ns: u32,
        middle_delay_ns: u32,
    ) {
        self.enable_middle_cache
            .store(enable_middle_cache, Ordering::Relaxed);
        self.host_swap_delay_ns
            .store(host_swap_delay_ns, Ordering::Relaxed);
        self.device_delay_ns
            .store(device_delay_ns, Ordering::Relaxed);
        self.middle_delay_ns
            .store(middle_delay_ns, Ordering::Relaxed);
    }
}

impl Default for SimConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// The simulation environment a device is constructed against: the shared
/// tunables plus the process-wide queue pair registry that two-sided
/// delivery resolves through.
///
/// `RdmaDevice::new` hands every device the process-default environment;
/// tests that need isolated tunings build their own and use
/// `RdmaDevice::with_env`.
#[derive(Debug, Default)]
pub struct SimEnv {
    /// Simulation tunables
    config: SimConfig,
    /// Cross-device queue pair registry
    registry: QpRegistry,
}

lazy_static! {
    /// The process-default simulation environment
    static ref GLOBAL_ENV: Arc<SimEnv> = Arc::new(SimEnv::new());
}

impl SimEnv {
    /// Create a fresh environment with default tunables and an empty
    /// registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SimConfig::new(),
            registry: QpRegistry::new(),
        }
    }

    /// The process-default environment shared by `RdmaDevice::new`
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::<Self>::clone(&GLOBAL_ENV)
    }

    /// The simulation tunables of this environment
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The queue pair registry of this environment
    #[inline]
    pub(crate) fn registry(&self) -> &QpRegistry {
        &self.registry
    }

    /// Reconfigure this environment's tunables at once
    pub fn set_simulation_mode(
        &self,
        enable_middle_cache: bool,
        host_swap_delay_ns: u32,
        device_delay_ns: u32,
        middle_delay_ns: u32,
    ) {
        self.config.set_simulation_mode(
            enable_middle_cache,
            host_swap_delay_ns,
            device_delay_ns,
            middle_delay_ns,
        );
    }
}
