use crate::completion_queue::{CompletionEntry, CqValue};
use crate::memory_region::MrValue;
use crate::protection_domain::PdValue;
use crate::queue_pair::{QpState, QpValue, TransitionPolicy};
use crate::residency::ResidencyStore;
use crate::simulation::SimEnv;
use crate::work_request::{RdmaOpcode, WorkRequest};
use clippy_utilities::NumericCast;
use getset::CopyGetters;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Default device limit on simultaneously tracked connections (reserved)
pub(crate) const DEFAULT_MAX_CONNECTIONS: usize = 1024;
/// Default device-tier queue pair capacity
pub(crate) const DEFAULT_MAX_QPS: usize = 256;
/// Default device-tier completion queue capacity
pub(crate) const DEFAULT_MAX_CQS: usize = 256;
/// Default device-tier memory region capacity
pub(crate) const DEFAULT_MAX_MRS: usize = 1024;
/// Default device-tier protection domain capacity
pub(crate) const DEFAULT_MAX_PDS: usize = 64;

/// Period of the background maintenance heartbeat
const MAINTENANCE_PERIOD: Duration = Duration::from_millis(100);

/// Source of unique device ids within the process
static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Capacity limits of a simulated device, it follows the builder pattern.
#[derive(Copy, Clone, Debug, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct DeviceConfig {
    /// Maximum number of tracked connections. Stored and exposed but not
    /// enforced by the current device; reserved for a future connection
    /// table.
    max_connections: usize,
    /// Device-tier capacity for queue pairs
    max_qps: usize,
    /// Device-tier capacity for completion queues
    max_cqs: usize,
    /// Device-tier capacity for memory regions
    max_mrs: usize,
    /// Device-tier capacity for protection domains
    max_pds: usize,
}

impl DeviceConfig {
    /// Create a config with the default limits
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reserved connection limit
    #[inline]
    #[must_use]
    pub fn set_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the device-tier queue pair capacity
    #[inline]
    #[must_use]
    pub fn set_max_qps(mut self, max_qps: usize) -> Self {
        self.max_qps = max_qps;
        self
    }

    /// Set the device-tier completion queue capacity
    #[inline]
    #[must_use]
    pub fn set_max_cqs(mut self, max_cqs: usize) -> Self {
        self.max_cqs = max_cqs;
        self
    }

    /// Set the device-tier memory region capacity
    #[inline]
    #[must_use]
    pub fn set_max_mrs(mut self, max_mrs: usize) -> Self {
        self.max_mrs = max_mrs;
        self
    }

    /// Set the device-tier protection domain capacity
    #[inline]
    #[must_use]
    pub fn set_max_pds(mut self, max_pds: usize) -> Self {
        self.max_pds = max_pds;
        self
    }
}

impl Default for DeviceConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_qps: DEFAULT_MAX_QPS,
            max_cqs: DEFAULT_MAX_CQS,
            max_mrs: DEFAULT_MAX_MRS,
            max_pds: DEFAULT_MAX_PDS,
        }
    }
}

/// What happened to an inbound payload on the destination queue pair
enum DeliveryOutcome {
    /// a posted receive consumed it; a completion goes to `recv_cq`
    Consumed {
        /// completion queue bound to the destination's receive queue
        recv_cq: u32,
        /// bytes actually copied
        copied: u32,
    },
    /// no receive was posted; the payload was staged as pending data
    Staged,
}

/// What happened inside the locked section of `post_recv`
enum RecvOutcome {
    /// queue pair was not in `RTR` or `RTS`
    BadState,
    /// the buffer is armed and waiting for an inbound send
    Armed,
    /// staged pending data drained into the buffer immediately
    Drained {
        /// completion queue bound to the receive queue
        recv_cq: u32,
        /// bytes actually copied
        copied: u32,
    },
}

/// The state of one simulated device, shared between its public handle, the
/// process-wide queue pair registry, and the maintenance thread.
#[derive(Debug)]
pub(crate) struct DeviceShared {
    /// Unique id of this device within the process
    device_id: u64,
    /// Capacity limits
    config: DeviceConfig,
    /// Simulation environment: tunables plus the queue pair registry
    env: Arc<SimEnv>,
    /// Queue pair residency store
    qps: ResidencyStore<QpValue>,
    /// Completion queue residency store
    cqs: ResidencyStore<CqValue>,
    /// Memory region residency store
    mrs: ResidencyStore<MrValue>,
    /// Protection domain residency store
    pds: ResidencyStore<PdValue>,
    /// Next queue pair number; 0 is reserved for "invalid"
    next_qp_num: AtomicU32,
    /// Next completion queue number
    next_cq_num: AtomicU32,
    /// Next memory region key
    next_mr_lkey: AtomicU32,
    /// Next protection domain handle
    next_pd_handle: AtomicU32,
    /// Whether `modify_qp_state` accepts every transition
    permissive_transitions: AtomicBool,
}

impl DeviceShared {
    /// Deliver an inbound payload to the queue pair `qp_num` owned by this
    /// device: into its posted receive buffer when one is armed, otherwise
    /// into its pending-data stage (overwriting any prior staged payload).
    pub(crate) fn receive_payload(&self, qp_num: u32, payload: &[u8]) {
        let outcome = self.qps.with_mut(qp_num, |qp| {
            if qp.has_posted_recv() {
                let copied = payload.len().min(qp.recv_length().numeric_cast());
                if copied > 0 {
                    // SAFETY: the destination buffer was posted through
                    // `post_recv` and the caller keeps it alive and
                    // writable for at least `recv_length` bytes.
                    unsafe {
                        ptr::copy_nonoverlapping(payload.as_ptr(), qp.recv_addr(), copied);
                    }
                }
                let recv_cq = qp.recv_cq();
                qp.clear_recv();
                DeliveryOutcome::Consumed {
                    recv_cq,
                    copied: copied.numeric_cast(),
                }
            } else {
                qp.stage_pending(payload);
                DeliveryOutcome::Staged
            }
        });
        match outcome {
            None => error!(
                "device {}: delivery target queue pair {qp_num} not found in any tier",
                self.device_id
            ),
            Some(DeliveryOutcome::Staged) => debug!(
                "device {}: no receive posted on queue pair {qp_num}, staged {} pending bytes",
                self.device_id,
                payload.len()
            ),
            Some(DeliveryOutcome::Consumed { recv_cq, copied }) => {
                let entry = CompletionEntry::success(0, RdmaOpcode::Recv, copied);
                if self.cqs.append_completions(recv_cq, vec![entry]) {
                    debug!(
                        "device {}: added receive completion to cq {recv_cq}",
                        self.device_id
                    );
                } else {
                    error!(
                        "device {}: failed to find receive cq {recv_cq}, dropping completion",
                        self.device_id
                    );
                }
            }
        }
    }
}

/// Heartbeat of the per-device maintenance task.
///
/// Reserved for completion notification and asynchronous completion
/// delivery; today it only keeps the cadence.
fn maintenance_loop(device_id: u64, should_stop: &AtomicBool) {
    while !should_stop.load(Ordering::Relaxed) {
        trace!("device {device_id}: maintenance heartbeat");
        thread::sleep(MAINTENANCE_PERIOD);
    }
    trace!("device {device_id}: maintenance thread stopping");
}

/// A simulated RDMA NIC.
///
/// The device owns four tiered residency stores (queue pairs, completion
/// queues, memory regions, protection domains), allocates handles from four
/// independent monotonically increasing counters, validates and performs the
/// verbs operations, and routes completion events to the residency tier
/// holding the target completion queue.
///
/// Handle value 0 never names a live resource; every creation operation
/// returns 0 on failure.
#[derive(Debug)]
pub struct RdmaDevice {
    /// State shared with the registry and the maintenance thread
    shared: Arc<DeviceShared>,
    /// Stop flag of the maintenance thread
    should_stop: Arc<AtomicBool>,
    /// Maintenance thread handle, joined on drop
    maintenance: Option<JoinHandle<()>>,
}

impl RdmaDevice {
    /// Create a device against the process-default simulation environment
    #[must_use]
    #[inline]
    pub fn new(config: DeviceConfig) -> Self {
        Self::with_env(config, SimEnv::global())
    }

    /// Create a device against an explicit simulation environment.
    ///
    /// Devices sharing one environment share a queue pair registry and the
    /// simulation tunables; tests use separate environments to run with
    /// independent tunings in parallel.
    #[must_use]
    pub fn with_env(config: DeviceConfig, env: Arc<SimEnv>) -> Self {
        let device_id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(DeviceShared {
            device_id,
            config,
            qps: ResidencyStore::new(Arc::<SimEnv>::clone(&env), config.max_qps()),
            cqs: ResidencyStore::new(Arc::<SimEnv>::clone(&env), config.max_cqs()),
            mrs: ResidencyStore::new(Arc::<SimEnv>::clone(&env), config.max_mrs()),
            pds: ResidencyStore::new(Arc::<SimEnv>::clone(&env), config.max_pds()),
            env,
            next_qp_num: AtomicU32::new(1),
            next_cq_num: AtomicU32::new(1),
            next_mr_lkey: AtomicU32::new(1),
            next_pd_handle: AtomicU32::new(1),
            permissive_transitions: AtomicBool::new(false),
        });
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = Arc::<AtomicBool>::clone(&should_stop);
        let maintenance = thread::spawn(move || maintenance_loop(device_id, &stop));
        debug!("device {device_id}: created with {config:?}");
        Self {
            shared,
            should_stop,
            maintenance: Some(maintenance),
        }
    }

    /// Unique id of this device within the process
    #[inline]
    #[must_use]
    pub fn device_id(&self) -> u64 {
        self.shared.device_id
    }

    /// The capacity limits this device was created with
    #[inline]
    #[must_use]
    pub fn config(&self) -> DeviceConfig {
        self.shared.config
    }

    /// The simulation environment this device was created against
    #[inline]
    #[must_use]
    pub fn env(&self) -> Arc<SimEnv> {
        Arc::<SimEnv>::clone(&self.shared.env)
    }

    /// Reconfigure the process-default simulation environment: middle-cache
    /// switch and the three per-tier delays.
    ///
    /// Devices created with `with_env` are tuned through their own
    /// environment instead.
    pub fn set_simulation_mode(
        enable_middle_cache: bool,
        host_swap_delay_ns: u32,
        device_delay_ns: u32,
        middle_delay_ns: u32,
    ) {
        SimEnv::global().set_simulation_mode(
            enable_middle_cache,
            host_swap_delay_ns,
            device_delay_ns,
            middle_delay_ns,
        );
    }

    /// Test hook: an independent per-operation delay for this device's
    /// completion queue store, overriding the configured middle-cache delay
    /// while nonzero.
    pub fn set_cq_simulated_delay_ns(&self, delay_ns: u32) {
        self.shared.cqs.set_simulated_delay_ns(delay_ns);
    }

    /// Select how `modify_qp_state` validates transitions. The default is
    /// the canonical reliable-connection graph; `Permissive` is the
    /// accept-everything compatibility mode.
    pub fn set_transition_policy(&self, policy: TransitionPolicy) {
        self.shared
            .permissive_transitions
            .store(policy == TransitionPolicy::Permissive, Ordering::Relaxed);
    }

    /// The active transition validation policy
    #[must_use]
    pub fn transition_policy(&self) -> TransitionPolicy {
        if self.shared.permissive_transitions.load(Ordering::Relaxed) {
            TransitionPolicy::Permissive
        } else {
            TransitionPolicy::Canonical
        }
    }

    /// Create a protection domain. Returns its handle; never fails.
    pub fn create_pd(&self) -> u32 {
        let pd_handle = self.shared.next_pd_handle.fetch_add(1, Ordering::Relaxed);
        self.shared.pds.put(pd_handle, PdValue::new(pd_handle));
        debug!("device {}: created pd {pd_handle}", self.shared.device_id);
        pd_handle
    }

    /// Create a completion queue with the declared capacity `max_cqe`.
    /// Returns its handle, or 0 when `max_cqe` is 0.
    pub fn create_cq(&self, max_cqe: u32) -> u32 {
        if max_cqe == 0 {
            debug!(
                "device {}: rejecting completion queue with zero capacity",
                self.shared.device_id
            );
            return 0;
        }
        let cq_num = self.shared.next_cq_num.fetch_add(1, Ordering::Relaxed);
        self.shared.cqs.put(cq_num, CqValue::new(cq_num, max_cqe));
        debug!("device {}: created cq {cq_num}", self.shared.device_id);
        cq_num
    }

    /// Create a queue pair in `RESET`, bound to `send_cq` and `recv_cq`.
    ///
    /// Both completion queues must already exist in some residency tier of
    /// this device and the send queue depth must be nonzero; otherwise 0 is
    /// returned and no handle is consumed. `_max_recv_wr` is accepted for
    /// interface parity and is not yet enforced.
    pub fn create_qp(
        &self,
        max_send_wr: u32,
        _max_recv_wr: u32,
        send_cq: u32,
        recv_cq: u32,
    ) -> u32 {
        if max_send_wr == 0 {
            debug!(
                "device {}: rejecting queue pair with zero send depth",
                self.shared.device_id
            );
            return 0;
        }
        if !self.shared.cqs.contains(send_cq) || !self.shared.cqs.contains(recv_cq) {
            debug!(
                "device {}: rejecting queue pair bound to missing cq ({send_cq}, {recv_cq})",
                self.shared.device_id
            );
            return 0;
        }
        let qp_num = self.shared.next_qp_num.fetch_add(1, Ordering::Relaxed);
        self.shared
            .qps
            .put(qp_num, QpValue::new(qp_num, send_cq, recv_cq));
        debug!("device {}: created qp {qp_num}", self.shared.device_id);
        qp_num
    }

    /// Register a window of caller-owned memory. Returns the new `lkey`, or
    /// 0 when `addr` is null.
    pub fn register_mr(&self, addr: *mut u8, length: u64, access_flags: u32) -> u32 {
        if addr.is_null() {
            debug!(
                "device {}: rejecting memory region with null address",
                self.shared.device_id
            );
            return 0;
        }
        let lkey = self.shared.next_mr_lkey.fetch_add(1, Ordering::Relaxed);
        self.shared
            .mrs
            .put(lkey, MrValue::new(lkey, addr, length, access_flags));
        debug!("device {}: registered mr {lkey}", self.shared.device_id);
        lkey
    }

    /// Transition the queue pair to `new_state`.
    ///
    /// Returns false when the queue pair is unknown or the active policy
    /// rejects the transition.
    pub fn modify_qp_state(&self, qp_num: u32, new_state: QpState) -> bool {
        let permissive = self.shared.permissive_transitions.load(Ordering::Relaxed);
        self.shared
            .qps
            .with_mut(qp_num, |qp| {
                if !permissive && !qp.state().valid_transition(new_state) {
                    debug!(
                        "rejecting transition {:?} -> {new_state:?} on qp {qp_num}",
                        qp.state()
                    );
                    return false;
                }
                let _qp = qp.set_state(new_state);
                true
            })
            .unwrap_or(false)
    }

    /// Copy the peer identity (`dest_qp_num`, `remote_lid`, `remote_psn`,
    /// `remote_gid`) out of `remote` into the local queue pair. Returns
    /// false when the queue pair is unknown.
    pub fn connect_qp(&self, qp_num: u32, remote: &QpValue) -> bool {
        self.shared
            .qps
            .with_mut(qp_num, |qp| qp.apply_remote(remote))
            .is_some()
    }

    /// Post a send-side work request on a queue pair in `RTS`.
    ///
    /// A signaled request appends one completion to the tier holding the
    /// queue pair's send completion queue. A `SEND` or `RDMA_WRITE` opcode
    /// additionally delivers the payload to the destination queue pair
    /// found through the process-wide registry: into its posted receive
    /// buffer, or into its pending-data stage when none is armed.
    pub fn post_send(&self, qp_num: u32, wr: &WorkRequest) -> bool {
        let shared = &self.shared;
        let Some((state, send_cq, dest_qp_num)) = shared
            .qps
            .with_mut(qp_num, |qp| (qp.state(), qp.send_cq(), qp.dest_qp_num()))
        else {
            debug!(
                "device {}: post_send on unknown qp {qp_num}",
                shared.device_id
            );
            return false;
        };
        // the registry learns about queue pairs lazily, on their first post
        shared
            .env
            .registry()
            .register(qp_num, Arc::downgrade(shared));
        if state != QpState::Rts {
            debug!(
                "device {}: post_send on qp {qp_num} in {state:?}, needs RTS",
                shared.device_id
            );
            return false;
        }
        if wr.signaled() {
            let entry = CompletionEntry::success(wr.wr_id(), wr.opcode(), wr.length());
            if shared.cqs.append_completions(send_cq, vec![entry]) {
                debug!(
                    "device {}: added send completion to cq {send_cq}",
                    shared.device_id
                );
            } else {
                error!(
                    "device {}: failed to find cq {send_cq}, dropping send completion",
                    shared.device_id
                );
            }
        }
        if matches!(wr.opcode(), RdmaOpcode::Send | RdmaOpcode::RdmaWrite) {
            let payload = copy_payload(wr);
            // delivery runs with no originator lock held, so two devices
            // sending into each other concurrently cannot deadlock
            if let Some(dest) = shared.env.registry().resolve(dest_qp_num) {
                dest.receive_payload(dest_qp_num, &payload);
            } else {
                debug!(
                    "device {}: destination qp {dest_qp_num} not registered, payload dropped",
                    shared.device_id
                );
            }
        }
        true
    }

    /// Post a receive buffer on a queue pair in `RTR` or `RTS`.
    ///
    /// When pending data is already staged on the queue pair, the buffer is
    /// consumed immediately: up to `wr.length` staged bytes are copied in,
    /// a `RECV` completion is appended to the receive completion queue, and
    /// the stage is cleared.
    pub fn post_recv(&self, qp_num: u32, wr: &WorkRequest) -> bool {
        let shared = &self.shared;
        let result = shared.qps.with_mut(qp_num, |qp| {
            if !matches!(qp.state(), QpState::Rtr | QpState::Rts) {
                debug!(
                    "device {}: post_recv on qp {qp_num} in {:?}, needs RTR or RTS",
                    shared.device_id,
                    qp.state()
                );
                return RecvOutcome::BadState;
            }
            qp.stage_recv(wr.local_addr(), wr.length());
            if qp.pending_data().is_empty() {
                return RecvOutcome::Armed;
            }
            let pending = qp.take_pending();
            let copied = pending.len().min(wr.length().numeric_cast());
            if copied > 0 && !wr.local_addr().is_null() {
                // SAFETY: the caller posted `local_addr` with room for
                // `wr.length` bytes and keeps it alive until completion.
                unsafe {
                    ptr::copy_nonoverlapping(pending.as_ptr(), wr.local_addr(), copied);
                }
            }
            let recv_cq = qp.recv_cq();
            qp.clear_recv();
            RecvOutcome::Drained {
                recv_cq,
                copied: copied.numeric_cast(),
            }
        });
        let Some(outcome) = result else {
            debug!(
                "device {}: post_recv on unknown qp {qp_num}",
                shared.device_id
            );
            return false;
        };
        if matches!(outcome, RecvOutcome::BadState) {
            return false;
        }
        shared
            .env
            .registry()
            .register(qp_num, Arc::downgrade(shared));
        if let RecvOutcome::Drained { recv_cq, copied } = outcome {
            debug!(
                "device {}: drained {copied} staged bytes into qp {qp_num}",
                shared.device_id
            );
            let entry = CompletionEntry::success(wr.wr_id(), RdmaOpcode::Recv, copied);
            if !shared.cqs.append_completions(recv_cq, vec![entry]) {
                error!(
                    "device {}: failed to find receive cq {recv_cq}, dropping completion",
                    shared.device_id
                );
            }
        }
        true
    }

    /// Move up to `max_entries` completions off the front of the queue's
    /// FIFO into `completions`. Returns true iff at least one entry moved.
    pub fn poll_cq(
        &self,
        cq_num: u32,
        max_entries: u32,
        completions: &mut Vec<CompletionEntry>,
    ) -> bool {
        let taken = self.shared.cqs.take_completions(cq_num, max_entries);
        if taken.is_empty() {
            return false;
        }
        completions.extend(taken);
        true
    }

    /// Request a notification on the next completion arrival.
    ///
    /// Returns true iff the completion queue exists in some tier. Delivery
    /// of the notification itself is reserved for the maintenance thread.
    pub fn req_notify_cq(&self, cq_num: u32, _solicited_only: bool) -> bool {
        self.shared.cqs.contains(cq_num)
    }

    /// Destroy a queue pair and drop its process-wide registry entry.
    /// Silent on unknown handles.
    pub fn destroy_qp(&self, qp_num: u32) {
        if self.shared.qps.erase(qp_num) {
            debug!("device {}: destroyed qp {qp_num}", self.shared.device_id);
        }
        self.shared.env.registry().unregister(qp_num);
    }

    /// Destroy a completion queue. Silent on unknown handles.
    pub fn destroy_cq(&self, cq_num: u32) {
        if self.shared.cqs.erase(cq_num) {
            debug!("device {}: destroyed cq {cq_num}", self.shared.device_id);
        }
    }

    /// Deregister a memory region. The memory itself stays caller-owned.
    /// Silent on unknown handles.
    pub fn deregister_mr(&self, lkey: u32) {
        if self.shared.mrs.erase(lkey) {
            debug!("device {}: deregistered mr {lkey}", self.shared.device_id);
        }
    }

    /// Destroy a protection domain. Silent on unknown handles.
    pub fn destroy_pd(&self, pd_handle: u32) {
        if self.shared.pds.erase(pd_handle) {
            debug!(
                "device {}: destroyed pd {pd_handle}",
                self.shared.device_id
            );
        }
    }

    /// Snapshot a queue pair record from whichever tier holds it
    #[must_use]
    pub fn get_qp_info(&self, qp_num: u32) -> Option<QpValue> {
        self.shared.qps.get(qp_num)
    }

    /// Snapshot a completion queue record from whichever tier holds it
    #[must_use]
    pub fn get_cq_info(&self, cq_num: u32) -> Option<CqValue> {
        self.shared.cqs.get(cq_num)
    }

    /// Snapshot a memory region record from whichever tier holds it
    #[must_use]
    pub fn get_mr_info(&self, lkey: u32) -> Option<MrValue> {
        self.shared.mrs.get(lkey)
    }

    /// Snapshot a protection domain record from whichever tier holds it
    #[must_use]
    pub fn get_pd_info(&self, pd_handle: u32) -> Option<PdValue> {
        self.shared.pds.get(pd_handle)
    }

    /// Group `handle` under the protection domain as a resource of `kind`
    /// (e.g. "qp", "mr"). Returns false when the domain is unknown.
    pub fn add_pd_resource(&self, pd_handle: u32, kind: &str, handle: u32) -> bool {
        self.shared
            .pds
            .with_mut(pd_handle, |pd| pd.add_resource(kind, handle))
            .is_some()
    }

    /// Drop `handle` from the protection domain's `kind` group. Returns
    /// false when the domain or the handle is unknown.
    pub fn remove_pd_resource(&self, pd_handle: u32, kind: &str, handle: u32) -> bool {
        self.shared
            .pds
            .with_mut(pd_handle, |pd| pd.remove_resource(kind, handle))
            .unwrap_or(false)
    }
}

impl Drop for RdmaDevice {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.maintenance.take() {
            if handle.join().is_err() {
                error!(
                    "device {}: maintenance thread panicked",
                    self.shared.device_id
                );
            }
        }
    }
}

/// Snapshot the caller's send buffer so delivery can run without any
/// originator lock held
fn copy_payload(wr: &WorkRequest) -> Vec<u8> {
    let addr = wr.local_addr();
    let len: usize = wr.length().numeric_cast();
    if addr.is_null() || len == 0 {
        return Vec::new();
    }
    // SAFETY: the caller posted `local_addr` with `length` readable bytes
    // and keeps the buffer alive until the operation completes.
    unsafe { slice::from_raw_parts(addr.cast_const(), len) }.to_vec()
}
