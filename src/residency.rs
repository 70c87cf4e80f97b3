use crate::completion_queue::{CompletionEntry, CqValue};
use crate::simulation::SimEnv;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::trace;

/// Where a resource's backing record currently lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Tier {
    /// on-device SRAM table, fastest and capacity bounded
    Device,
    /// host-pinned middle cache, twice the device capacity
    Middle,
    /// unbounded host-memory swap
    Host,
}

/// Sleep for the injected per-tier latency
fn pause_ns(ns: u32) {
    if ns > 0 {
        thread::sleep(Duration::from_nanos(ns.into()));
    }
}

/// The three keyed maps behind one residency store.
#[derive(Debug)]
struct Tiers<V> {
    /// Device tier records
    device: HashMap<u32, V>,
    /// Middle cache records
    middle: HashMap<u32, V>,
    /// Middle cache recency order, least recently used at the front
    middle_lru: VecDeque<u32>,
    /// Host swap records
    host: HashMap<u32, V>,
}

/// A capacity-bounded, latency-injecting store for one resource kind.
///
/// Every record has exactly one home tier. A fresh record homes in the
/// device tier while there is room, then in the middle cache when that tier
/// is enabled, then in host swap. Middle-cache overflow evicts the least
/// recently used entry and demotes it to host swap, so a record stays
/// reachable until it is explicitly erased.
///
/// Lookups consult the device tier first, then the middle cache when
/// enabled, then host swap; each consulted tier imposes its configured
/// delay whether or not it holds the record. All three tiers sit behind one
/// lock, the owning device's per-kind lock.
#[derive(Debug)]
pub(crate) struct ResidencyStore<V> {
    /// Simulation environment supplying the tier delays
    env: Arc<SimEnv>,
    /// Capacity of the device tier
    device_capacity: usize,
    /// Capacity of the middle cache, twice the device capacity
    middle_capacity: usize,
    /// Test hook: when nonzero, replaces the configured middle-cache delay
    /// for this store's operations
    simulated_delay_ns: AtomicU32,
    /// The tier maps
    tiers: Mutex<Tiers<V>>,
}

impl<V> ResidencyStore<V> {
    /// Create a store with the given device-tier capacity
    pub(crate) fn new(env: Arc<SimEnv>, device_capacity: usize) -> Self {
        Self {
            env,
            device_capacity,
            middle_capacity: device_capacity.saturating_mul(2),
            simulated_delay_ns: AtomicU32::new(0),
            tiers: Mutex::new(Tiers {
                device: HashMap::new(),
                middle: HashMap::new(),
                middle_lru: VecDeque::new(),
                host: HashMap::new(),
            }),
        }
    }

    /// Override the middle-cache delay for this store alone
    pub(crate) fn set_simulated_delay_ns(&self, delay_ns: u32) {
        self.simulated_delay_ns.store(delay_ns, Ordering::Relaxed);
    }

    /// Impose the device-tier latency
    fn device_pause(&self) {
        pause_ns(self.env.config().device_delay_ns());
    }

    /// Impose the middle-cache latency, honoring the per-store override
    fn middle_pause(&self) {
        let override_ns = self.simulated_delay_ns.load(Ordering::Relaxed);
        if override_ns > 0 {
            pause_ns(override_ns);
        } else {
            pause_ns(self.env.config().middle_delay_ns());
        }
    }

    /// Impose the host-swap latency
    fn host_pause(&self) {
        pause_ns(self.env.config().host_swap_delay_ns());
    }

    /// Insert a fresh record, choosing its home tier by capacity
    pub(crate) fn put(&self, handle: u32, value: V) {
        let mut tiers = self.tiers.lock();
        if tiers.device.len() < self.device_capacity {
            self.device_pause();
            let _prev = tiers.device.insert(handle, value);
            return;
        }
        if self.env.config().middle_cache_enabled() {
            self.middle_pause();
            while tiers.middle.len() >= self.middle_capacity {
                let Some(victim) = tiers.middle_lru.pop_front() else {
                    break;
                };
                if let Some(evicted) = tiers.middle.remove(&victim) {
                    trace!("demoting entry {victim} from middle cache to host swap");
                    let _prev = tiers.host.insert(victim, evicted);
                }
            }
            let _prev = tiers.middle.insert(handle, value);
            tiers.middle_lru.push_back(handle);
            return;
        }
        self.host_pause();
        let _prev = tiers.host.insert(handle, value);
    }

    /// Run `f` against the record's home copy, walking the tiers in lookup
    /// order with their delays. Returns `None` when no tier holds `handle`.
    pub(crate) fn with_mut<R>(&self, handle: u32, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut tiers = self.tiers.lock();
        self.device_pause();
        if let Some(value) = tiers.device.get_mut(&handle) {
            return Some(f(value));
        }
        if self.env.config().middle_cache_enabled() {
            self.middle_pause();
            if tiers.middle.contains_key(&handle) {
                Self::touch_lru(&mut tiers.middle_lru, handle);
                // recheck after the recency update releases the borrow
                if let Some(value) = tiers.middle.get_mut(&handle) {
                    return Some(f(value));
                }
            }
        }
        self.host_pause();
        tiers.host.get_mut(&handle).map(f)
    }

    /// Snapshot the record, walking the tiers in lookup order with their
    /// delays
    pub(crate) fn get(&self, handle: u32) -> Option<V>
    where
        V: Clone,
    {
        self.with_mut(handle, |value| value.clone())
    }

    /// Whether any tier holds `handle`, with lookup delays imposed
    pub(crate) fn contains(&self, handle: u32) -> bool {
        self.with_mut(handle, |_| ()).is_some()
    }

    /// Remove the record from its home tier. Returns whether it existed.
    pub(crate) fn erase(&self, handle: u32) -> bool {
        let mut tiers = self.tiers.lock();
        self.device_pause();
        if tiers.device.remove(&handle).is_some() {
            return true;
        }
        if self.env.config().middle_cache_enabled() {
            self.middle_pause();
            if tiers.middle.remove(&handle).is_some() {
                tiers.middle_lru.retain(|h| *h != handle);
                return true;
            }
        }
        self.host_pause();
        tiers.host.remove(&handle).is_some()
    }

    /// Move `handle` to the back of the recency order
    fn touch_lru(lru: &mut VecDeque<u32>, handle: u32) {
        if let Some(pos) = lru.iter().position(|h| *h == handle) {
            let _removed = lru.remove(pos);
            lru.push_back(handle);
        }
    }

    /// The record's current home tier, without delays. Diagnostic only.
    pub(crate) fn home_tier(&self, handle: u32) -> Option<Tier> {
        let tiers = self.tiers.lock();
        if tiers.device.contains_key(&handle) {
            return Some(Tier::Device);
        }
        if tiers.middle.contains_key(&handle) {
            return Some(Tier::Middle);
        }
        if tiers.host.contains_key(&handle) {
            return Some(Tier::Host);
        }
        None
    }
}

impl ResidencyStore<CqValue> {
    /// Append completions to the FIFO of `cq_num` in its home tier.
    /// Returns `false` when no tier holds the queue.
    pub(crate) fn append_completions(&self, cq_num: u32, entries: Vec<CompletionEntry>) -> bool {
        self.with_mut(cq_num, |cq| {
            for entry in entries {
                let _stored = cq.push_completion(entry);
            }
        })
        .is_some()
    }

    /// Move up to `max` entries off the front of the FIFO of `cq_num`.
    /// Returns the moved entries, empty when the queue is missing or has
    /// nothing pending.
    pub(crate) fn take_completions(&self, cq_num: u32, max: u32) -> Vec<CompletionEntry> {
        self.with_mut(cq_num, |cq| cq.take_completions(max))
            .unwrap_or_default()
    }
}
