use getset::{CopyGetters, Getters};
use std::collections::HashMap;

/// The backing record of a protection domain: an association scope grouping
/// queue pairs and memory regions.
///
/// The resource map is populated on demand through
/// `add_resource`/`remove_resource`; the device does not auto-maintain it
/// when resources are created or destroyed.
#[derive(Clone, Debug, Default, Getters, CopyGetters)]
pub struct PdValue {
    /// Protection domain handle
    #[getset(get_copy = "pub")]
    pd_handle: u32,
    /// Resource-kind name (e.g. "qp", "mr") to the handles grouped under
    /// this domain
    #[getset(get = "pub")]
    resources: HashMap<String, Vec<u32>>,
}

impl PdValue {
    /// Create an empty protection domain record
    pub(crate) fn new(pd_handle: u32) -> Self {
        Self {
            pd_handle,
            resources: HashMap::new(),
        }
    }

    /// Group `handle` under this domain as a resource of `kind`
    pub(crate) fn add_resource(&mut self, kind: &str, handle: u32) {
        self.resources.entry(kind.to_owned()).or_default().push(handle);
    }

    /// Drop `handle` from the `kind` group. Returns whether it was present.
    pub(crate) fn remove_resource(&mut self, kind: &str, handle: u32) -> bool {
        let Some(handles) = self.resources.get_mut(kind) else {
            return false;
        };
        let Some(pos) = handles.iter().position(|h| *h == handle) else {
            return false;
        };
        let _removed = handles.remove(pos);
        true
    }
}
