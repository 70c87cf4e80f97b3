use crate::device::DeviceShared;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// The process-wide queue pair registry: `qp_num` to the device whose
/// residency stores hold that queue pair's record.
///
/// `post_send` resolves `dest_qp_num` here to deliver a two-sided operation
/// across device instances inside one process. Entries hold a weak device
/// handle and are resolved through the owning device's stores on use, so a
/// stale entry can never reach freed state. Population is lazy
/// (`post_send`/`post_recv`); `destroy_qp` prunes its entry; on a `qp_num`
/// collision between devices the last insert wins.
///
/// The registry lock is always taken after all per-device locks, never
/// before.
#[derive(Debug, Default)]
pub(crate) struct QpRegistry {
    /// Registered queue pairs
    entries: Mutex<HashMap<u32, Weak<DeviceShared>>>,
}

impl QpRegistry {
    /// Create an empty registry
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record `qp_num` as owned by `device`, replacing any prior entry
    pub(crate) fn register(&self, qp_num: u32, device: Weak<DeviceShared>) {
        let _prev = self.entries.lock().insert(qp_num, device);
    }

    /// Drop the entry for `qp_num` if present
    pub(crate) fn unregister(&self, qp_num: u32) {
        let _prev = self.entries.lock().remove(&qp_num);
    }

    /// Resolve `qp_num` to its owning device, if the entry is live
    pub(crate) fn resolve(&self, qp_num: u32) -> Option<Arc<DeviceShared>> {
        self.entries.lock().get(&qp_num).and_then(Weak::upgrade)
    }

    /// Number of live entries, for diagnostics
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
