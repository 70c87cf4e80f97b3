//! An in-process, user-space RDMA NIC (RNIC) simulator.
//!
//! The crate emulates the queue-pair / completion-queue / memory-region /
//! protection-domain abstractions of a verbs-style RDMA stack, backed by a
//! tiered resource-residency cache that models how a real NIC spills state
//! between on-device SRAM, a host-pinned middle cache, and host-memory
//! swap, with configurable per-tier latencies.
//!
//! Two-sided operations are delivered as in-process memory copies between
//! registered buffers, resolved through a process-wide queue pair registry;
//! the out-of-band connection handshake runs over a length-prefixed TCP
//! control channel. No hardware, DMA, or wire-compatible InfiniBand framing
//! is involved: the simulator reproduces observable timing and ordering
//! only.
#![deny(
    // The following are allowed by default lints according to
    // https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html
    anonymous_parameters,
    bare_trait_objects,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unstable_features,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,

    clippy::all,
    clippy::pedantic,
    clippy::cargo
)]
#![allow(
    // Some explicitly allowed Clippy lints, must have clear reason to allow
    clippy::implicit_return, // actually omitting the return keyword is idiomatic Rust code
    clippy::module_name_repetitions, // repeation of module name in a struct name is not big deal
    clippy::multiple_crate_versions, // multi-version dependency crates is not able to fix
    clippy::missing_errors_doc, // TODO: add error docs
    clippy::exhaustive_enums,
    clippy::exhaustive_structs,
)]

/// Access permission flags
mod access;
/// The completion queue records and completion entries
mod completion_queue;
/// The control channel carrying the out-of-band handshake
mod control_channel;
/// The simulated RNIC device
mod device;
/// Gid for device
mod gid;
/// The connection-protocol drivers
mod handshake;
/// Random identifier helpers
mod id;
/// Memory region records
mod memory_region;
/// Control message model and wire codec
mod message;
/// Protection domain records
mod protection_domain;
/// The process-wide queue pair registry
mod qp_registry;
/// Queue pair records and the state machine
mod queue_pair;
/// The tiered residency store, one per resource kind
mod residency;
/// Process-wide simulation tunables and the injectable environment
mod simulation;
/// Work request model
mod work_request;

pub use access::{flags_from_raw, flags_into_raw, AccessFlag, DEFAULT_ACCESS};
pub use completion_queue::{
    CompletionEntry, CqValue, COMPLETION_STATUS_CQ_OVERRUN, COMPLETION_STATUS_SUCCESS,
};
pub use control_channel::{ChannelError, ConnectionState, ControlChannel};
pub use device::{DeviceConfig, RdmaDevice};
pub use gid::Gid;
pub use handshake::{initiate, respond};
pub use memory_region::MrValue;
pub use message::{
    decode, encode, ControlMsg, ControlMsgType, WireError, MAX_FRAME_LEN, WIRE_FIXED_LEN,
};
pub use protection_domain::PdValue;
pub use queue_pair::{QpState, QpValue, TransitionPolicy};
pub use simulation::{SimConfig, SimEnv};
pub use work_request::{RdmaOpcode, WorkRequest, WorkRequestBuilder, WorkRequestBuilderError};

#[macro_use]
extern crate lazy_static;
