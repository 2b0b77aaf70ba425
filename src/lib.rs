//! A safe wrapper around kfabric, the kernel-resident RDMA fabric interface.
//!
//! Main functionality lives in the [`rdma`] module: devices, protection
//! domains, completion queues and queue pairs, memory registration, and the
//! work-request translator that turns verbs-shaped operations into kfabric
//! calls.
//!
//! **WARNING: the interface is unstable and subject to change.**

#[cfg(not(target_os = "linux"))]
compile_error!("this crate currently only supports Linux");

/// Bindings of the kfabric C interface.
pub mod bindings;

/// Compile-time tunables and the mount-option configuration surface.
pub mod config;

/// The crate's error taxonomy.
pub mod error;

/// Shared utility functions.
mod utils;

/// RDMA functionalities.
/// Not to be publicly exposed, instead `pub use` necessary items.
mod rdma;

pub use error::{Error, FabricError, Result, WcStatus};
pub use rdma::auth::{parse_vni_from_options, AuthKey};
pub use rdma::cq::{CompletionCallback, Cq, Wc, WcOpcode};
pub use rdma::device::{Device, DeviceRegistry};
pub use rdma::fabric::real::RealFabric;
pub use rdma::fabric::{CapHints, FabricProvider, ProviderInfo};
#[cfg(any(test, feature = "fabric_fake"))]
pub use rdma::fabric::fake::FakeFabric;
pub use rdma::mr::{Access, Mr, MrRemote};
pub use rdma::pd::Pd;
pub use rdma::qp::{Qp, QpCaps, QpInitAttr, QpState};
pub use rdma::wr::{post_recv, post_send, post_send_batch, BatchContext, Opcode, PostFailure, Sge, WorkRequest};

/// The prelude: common imports for users of this crate.
pub mod prelude;
