//! Operation translator (component G): turns a chain of verbs-style work
//! requests into fabric submissions.
//!
//! The reference interface links work requests through a raw `next`
//! pointer and reports the first failing request through an out-parameter.
//! A safe wrapper has no business keeping that pointer chain: an ordered
//! slice plus a returned index serves the same contract without unsafe
//! aliasing.

use crate::config::Config;
use crate::error::{Error, FabricError, Result};
use crate::rdma::fabric::FabricProvider;
use crate::rdma::mr::{Mr, MrRemote};
use crate::rdma::qp::Qp;

/// One scatter-gather entry: a byte range within an already-registered MR.
pub struct Sge<'a> {
    pub mr: &'a Mr,
    pub offset: usize,
    pub len: usize,
}

impl Sge<'_> {
    fn addr(&self) -> usize {
        self.mr.addr() + self.offset
    }

    /// Local memory descriptor, queried from the provider via `mr_desc`.
    fn desc(&self, provider: &dyn FabricProvider) -> u64 {
        provider.mr_desc(self.mr.native_handle())
    }
}

/// Work request opcode. `imm` fields are accepted for interface parity with
/// the upper transport but the consumed fabric interface has no immediate-data
/// channel, so they are logged and otherwise dropped (see the design note on
/// SEND-WITH-INVALIDATE, which has the same shape of gap).
pub enum Opcode {
    Send { imm: Option<u32> },
    SendWithInvalidate,
    RdmaRead { remote: MrRemote },
    RdmaWrite { remote: MrRemote, imm: Option<u32> },
}

/// A single work request in a post_send/post_recv chain.
pub struct WorkRequest<'a> {
    pub wr_id: u64,
    pub opcode: Opcode,
    pub sgl: &'a [Sge<'a>],
}

/// Reports which request in the chain failed first, and why. Requests
/// before it were submitted; requests after it were never attempted.
#[derive(Debug)]
pub struct PostFailure {
    pub index: usize,
    pub wr_id: u64,
    pub error: Error,
}

/// A batch context (component I): stages up to [`Config::MAX_BATCH_SIZE`]
/// work requests for one batched submission call. Short-lived: built,
/// filled, and submitted by the caller around a single `post_send_batch`.
#[derive(Default)]
pub struct BatchContext<'a> {
    requests: Vec<WorkRequest<'a>>,
}

impl<'a> BatchContext<'a> {
    pub fn new() -> Self {
        Self {
            requests: Vec::with_capacity(Config::MAX_BATCH_SIZE),
        }
    }

    /// Stage one request. Fails invalid-argument once the batch already
    /// holds `Config::MAX_BATCH_SIZE` entries.
    pub fn push(&mut self, wr: WorkRequest<'a>) -> Result<()> {
        if self.requests.len() >= Config::MAX_BATCH_SIZE {
            return Err(Error::Fabric(FabricError::InvalidArg));
        }
        self.requests.push(wr);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Submit a staged batch. The current specification submits sequentially
/// (the same chain-walking path as [`post_send`]); a provider "more
/// pending" hint, when available, is an optimization left to a future
/// fabric-specific `FabricProvider` impl, not a change to this call's
/// contract.
pub fn post_send_batch(qp: &Qp, batch: &BatchContext<'_>) -> std::result::Result<(), PostFailure> {
    post_send(qp, &batch.requests)
}

/// Post a chain of send-side work requests (SEND, SEND-WITH-INVALIDATE, RDMA
/// READ/WRITE) under the QP's send lock. Stops at the first failure.
pub fn post_send(qp: &Qp, chain: &[WorkRequest<'_>]) -> std::result::Result<(), PostFailure> {
    let _guard = qp.send_lock().lock().unwrap();
    for (index, wr) in chain.iter().enumerate() {
        if let Err(error) = post_one(qp, wr) {
            return Err(PostFailure {
                index,
                wr_id: wr.wr_id,
                error,
            });
        }
    }
    Ok(())
}

/// Post a chain of receive buffers under the QP's receive lock. Only SEND
/// (or SEND-WITH-INVALIDATE, indistinguishable on the receive side) targets
/// are valid; anything else is a caller error.
pub fn post_recv(qp: &Qp, chain: &[WorkRequest<'_>]) -> std::result::Result<(), PostFailure> {
    let _guard = qp.recv_lock().lock().unwrap();
    for (index, wr) in chain.iter().enumerate() {
        if let Err(error) = post_one_recv(qp, wr) {
            return Err(PostFailure {
                index,
                wr_id: wr.wr_id,
                error,
            });
        }
    }
    Ok(())
}

fn check_sgl(sgl: &[Sge<'_>]) -> Result<()> {
    if sgl.is_empty() || sgl.len() > Config::MAX_SGE {
        return Err(Error::Fabric(FabricError::InvalidArg));
    }
    Ok(())
}

fn post_one(qp: &Qp, wr: &WorkRequest<'_>) -> Result<()> {
    check_sgl(wr.sgl)?;

    let provider = qp.device().provider().as_ref();
    let ep = qp.ep();
    let fi_addr = qp.peer_fi_addr().unwrap_or(0);
    let context = wr.wr_id as usize;

    match &wr.opcode {
        Opcode::Send { imm } => {
            log_imm(qp, "SEND", *imm);
            translate(post_send_op(provider, ep, wr.sgl, fi_addr, context))
        }
        Opcode::SendWithInvalidate => {
            if qp.mark_invalidate_degraded() {
                log::warn!(
                    "qp {}: SEND-WITH-INVALIDATE has no fabric primitive; degrading to SEND",
                    qp.id()
                );
            } else {
                log::debug!("qp {}: SEND-WITH-INVALIDATE degraded to SEND", qp.id());
            }
            translate(post_send_op(provider, ep, wr.sgl, fi_addr, context))
        }
        Opcode::RdmaRead { remote } => translate(post_rdma_op(provider, ep, wr.sgl, fi_addr, context, *remote, false)),
        Opcode::RdmaWrite { remote, imm } => {
            log_imm(qp, "RDMA WRITE", *imm);
            translate(post_rdma_op(provider, ep, wr.sgl, fi_addr, context, *remote, true))
        }
    }
}

fn post_one_recv(qp: &Qp, wr: &WorkRequest<'_>) -> Result<()> {
    check_sgl(wr.sgl)?;
    if !matches!(wr.opcode, Opcode::Send { .. } | Opcode::SendWithInvalidate) {
        return Err(Error::Fabric(FabricError::InvalidArg));
    }

    let provider = qp.device().provider().as_ref();
    let ep = qp.ep();
    let fi_addr = qp.peer_fi_addr().unwrap_or(0);
    let context = wr.wr_id as usize;

    if wr.sgl.len() == 1 {
        let sge = &wr.sgl[0];
        provider
            .recv(ep, sge.addr(), sge.len, sge.desc(provider), fi_addr, context)
            .map_err(classify)
    } else {
        let iov: Vec<(usize, usize)> = wr.sgl.iter().map(|s| (s.addr(), s.len)).collect();
        let descs: Vec<u64> = wr.sgl.iter().map(|s| s.desc(provider)).collect();
        provider.recvv(ep, &iov, &descs, fi_addr, context).map_err(classify)
    }
}

fn post_send_op(
    provider: &dyn FabricProvider,
    ep: crate::rdma::fabric::FabricHandle,
    sgl: &[Sge<'_>],
    fi_addr: u64,
    context: usize,
) -> std::result::Result<(), FabricError> {
    if sgl.len() == 1 {
        let sge = &sgl[0];
        provider.send(ep, sge.addr(), sge.len, sge.desc(provider), fi_addr, context)
    } else {
        let iov: Vec<(usize, usize)> = sgl.iter().map(|s| (s.addr(), s.len)).collect();
        let descs: Vec<u64> = sgl.iter().map(|s| s.desc(provider)).collect();
        provider.sendv(ep, &iov, &descs, fi_addr, context)
    }
}

#[allow(clippy::too_many_arguments)]
fn post_rdma_op(
    provider: &dyn FabricProvider,
    ep: crate::rdma::fabric::FabricHandle,
    sgl: &[Sge<'_>],
    fi_addr: u64,
    context: usize,
    remote: MrRemote,
    is_write: bool,
) -> std::result::Result<(), FabricError> {
    if sgl.len() == 1 {
        let sge = &sgl[0];
        if is_write {
            provider.write(ep, sge.addr(), sge.len, sge.desc(provider), fi_addr, remote.addr, remote.key as u64, context)
        } else {
            provider.read(ep, sge.addr(), sge.len, sge.desc(provider), fi_addr, remote.addr, remote.key as u64, context)
        }
    } else {
        let iov: Vec<(usize, usize)> = sgl.iter().map(|s| (s.addr(), s.len)).collect();
        let descs: Vec<u64> = sgl.iter().map(|s| s.desc(provider)).collect();
        if is_write {
            provider.writev(ep, &iov, &descs, fi_addr, remote.addr, remote.key as u64, context)
        } else {
            provider.readv(ep, &iov, &descs, fi_addr, remote.addr, remote.key as u64, context)
        }
    }
}

/// Translate a transient (EAGAIN) fabric error into the backpressure
/// contract: the caller sees this request as the first failing one and is
/// responsible for retrying the whole remaining chain.
fn translate(result: std::result::Result<(), FabricError>) -> Result<()> {
    result.map_err(classify)
}

fn classify(err: FabricError) -> Error {
    Error::Fabric(err)
}

fn log_imm(qp: &Qp, op: &str, imm: Option<u32>) {
    if imm.is_some() {
        log::debug!(
            "qp {}: {op}-WITH-IMM requested but the fabric interface carries no immediate-data channel; value dropped",
            qp.id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_context_rejects_beyond_max_batch_size() {
        let mut batch = BatchContext::new();
        let empty: [Sge<'_>; 0] = [];
        for i in 0..Config::MAX_BATCH_SIZE {
            batch
                .push(WorkRequest {
                    wr_id: i as u64,
                    opcode: Opcode::Send { imm: None },
                    sgl: &empty,
                })
                .unwrap();
        }
        assert_eq!(batch.len(), Config::MAX_BATCH_SIZE);

        let overflow = batch.push(WorkRequest {
            wr_id: 99,
            opcode: Opcode::Send { imm: None },
            sgl: &empty,
        });
        assert!(overflow.is_err());
        assert_eq!(batch.len(), Config::MAX_BATCH_SIZE);
    }
}
