//! The RDMA prelude.
//!
//! The purpose of this module is to alleviate imports of common RDMA
//! functionalities.

pub use crate::error::{Error, FabricError, Result, WcStatus};
pub use crate::rdma::auth::{parse_vni_from_options, AuthKey};
pub use crate::rdma::cq::{CompletionCallback, Cq, Wc, WcOpcode};
pub use crate::rdma::device::{Device, DeviceRegistry};
pub use crate::rdma::mr::{Access, Mr, MrRemote};
pub use crate::rdma::pd::Pd;
pub use crate::rdma::qp::{Qp, QpCaps, QpInitAttr, QpState};
pub use crate::rdma::wr::{post_recv, post_send, post_send_batch, BatchContext, Opcode, PostFailure, Sge, WorkRequest};
pub use crate::config::Config;
