//! Queue pair lifecycle and state machine (component F).
//!
//! kfabric has no connection handshake: "connecting" a QP means inserting the
//! peer's address into an address vector and enabling the endpoint. The
//! state machine below still mirrors the verbs RESET/INIT/RTR/RTS/ERR shape
//! so the upper transport's call sequence does not need to change.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::auth::{resolve_vni, AuthKey};
use super::cq::Cq;
use super::device::Device;
use super::fabric::FabricHandle;
use super::pd::Pd;
use crate::bindings::{KFI_BIND_RECV, KFI_BIND_TRANSMIT};
use crate::config::Config;
use crate::error::{Error, FabricError, Result};

static NEXT_QP_ID: AtomicU32 = AtomicU32::new(1);

/// Queue pair state, per the reference state machine: RESET -> INIT -> RTR ->
/// RTS, with a one-way transition to ERR from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpState {
    Reset,
    Init,
    Rtr,
    Rts,
    Err,
}

/// Queue pair creation capabilities, checked against the crate's own SGE
/// limit at creation time (the provider exposes no per-device attribute
/// query to check further against).
#[derive(Debug, Clone, Copy)]
pub struct QpCaps {
    pub max_send_wr: u32,
    pub max_recv_wr: u32,
    pub max_send_sge: u32,
    pub max_recv_sge: u32,
}

impl Default for QpCaps {
    fn default() -> Self {
        Self {
            max_send_wr: Config::DEFAULT_QP_DEPTH,
            max_recv_wr: Config::DEFAULT_QP_DEPTH,
            max_send_sge: Config::MAX_SGE as u32,
            max_recv_sge: Config::MAX_SGE as u32,
        }
    }
}

/// Queue pair creation attributes.
pub struct QpInitAttr {
    pub send_cq: Cq,
    pub recv_cq: Cq,
    pub caps: QpCaps,
}

struct QpInner {
    device: Device,
    pd: Pd,
    id: u32,
    ep: FabricHandle,
    send_cq: Cq,
    recv_cq: Cq,
    state: Mutex<QpState>,
    auth: Mutex<Option<AuthKey>>,
    av: Mutex<Option<FabricHandle>>,
    peer_addr: Mutex<Option<u64>>,
    send_lock: Mutex<()>,
    recv_lock: Mutex<()>,
    /// Whether the once-per-QP SEND-WITH-INVALIDATE degrade warning has
    /// already fired (see the operation translator).
    invalidate_warned: std::sync::atomic::AtomicBool,
}

impl Drop for QpInner {
    fn drop(&mut self) {
        if let Some(av) = self.av.lock().unwrap().take() {
            if let Err(e) = self.device.provider().close(av) {
                log::error!("qp {}: error closing address vector: {e}", self.id);
            }
        }
        if let Err(e) = self.device.provider().close(self.ep) {
            log::error!("qp {}: error closing endpoint: {e}", self.id);
        }
        self.send_cq.dec_usecnt();
        self.recv_cq.dec_usecnt();
        self.pd.dec_usecnt();
    }
}

/// A queue pair: one fabric endpoint plus the bookkeeping the upper
/// transport's verbs-style call sequence expects of it.
#[derive(Clone)]
pub struct Qp {
    inner: std::sync::Arc<QpInner>,
}

impl Qp {
    /// Create a QP bound to `pd`, with its send/recv CQs already usage-counted.
    pub fn new(pd: &Pd, init_attr: QpInitAttr) -> Result<Self> {
        if init_attr.caps.max_send_sge as usize > Config::MAX_SGE
            || init_attr.caps.max_recv_sge as usize > Config::MAX_SGE
        {
            return Err(Error::CapabilityNotSupported("max_sge"));
        }

        let device = pd.device().clone();
        let ep = device.provider().endpoint(device.domain()).map_err(Error::Fabric)?;
        device
            .provider()
            .ep_bind(ep, init_attr.send_cq.fid(), KFI_BIND_TRANSMIT as u64)
            .map_err(Error::Fabric)?;
        device
            .provider()
            .ep_bind(ep, init_attr.recv_cq.fid(), KFI_BIND_RECV as u64)
            .map_err(Error::Fabric)?;

        let id = NEXT_QP_ID.fetch_add(1, Ordering::Relaxed);
        init_attr.send_cq.inc_usecnt();
        init_attr.recv_cq.inc_usecnt();
        pd.inc_usecnt();

        Ok(Qp {
            inner: std::sync::Arc::new(QpInner {
                device,
                pd: pd.clone(),
                id,
                ep,
                send_cq: init_attr.send_cq,
                recv_cq: init_attr.recv_cq,
                state: Mutex::new(QpState::Reset),
                auth: Mutex::new(None),
                av: Mutex::new(None),
                peer_addr: Mutex::new(None),
                send_lock: Mutex::new(()),
                recv_lock: Mutex::new(()),
                invalidate_warned: std::sync::atomic::AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn state(&self) -> QpState {
        *self.inner.state.lock().unwrap()
    }

    pub fn send_cq(&self) -> &Cq {
        &self.inner.send_cq
    }

    pub fn recv_cq(&self) -> &Cq {
        &self.inner.recv_cq
    }

    pub(crate) fn device(&self) -> &Device {
        &self.inner.device
    }

    pub(crate) fn ep(&self) -> FabricHandle {
        self.inner.ep
    }

    pub(crate) fn peer_fi_addr(&self) -> Option<u64> {
        *self.inner.peer_addr.lock().unwrap()
    }

    pub(crate) fn send_lock(&self) -> &Mutex<()> {
        &self.inner.send_lock
    }

    pub(crate) fn recv_lock(&self) -> &Mutex<()> {
        &self.inner.recv_lock
    }

    /// Returns `true` only the first time it is called for this QP; the
    /// operation translator uses this to log the SEND-WITH-INVALIDATE
    /// degradation at `warn!` once and `debug!` on every call after.
    pub(crate) fn mark_invalidate_degraded(&self) -> bool {
        !self.inner.invalidate_warned.swap(true, Ordering::AcqRel)
    }

    /// Drive a state transition. `peer_addr` is the provider-specific address
    /// buffer to insert into the AV (only consulted on INIT -> RTR);
    /// `vni_override` is an out-of-band VNI (only consulted on RESET -> INIT).
    pub fn modify(&self, target: QpState, peer_addr: Option<&[u8]>, vni_override: Option<u16>) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        match (*state, target) {
            (QpState::Reset, QpState::Init) => self.transition_reset_to_init(vni_override)?,
            (QpState::Init, QpState::Rtr) => self.transition_init_to_rtr(peer_addr)?,
            (QpState::Rtr, QpState::Rts) => self.transition_rtr_to_rts()?,
            (_, QpState::Err) => {
                log::debug!("qp {}: transitioned to ERR", self.inner.id);
            }
            _ => return Err(Error::Fabric(FabricError::InvalidArg)),
        }
        *state = target;
        Ok(())
    }

    fn transition_reset_to_init(&self, vni_override: Option<u16>) -> Result<()> {
        let vni = resolve_vni(vni_override, self.inner.device.provider().as_ref())
            .ok_or(Error::Fabric(FabricError::Access))?;
        *self.inner.auth.lock().unwrap() = Some(AuthKey {
            vni,
            service_id: 0,
            traffic_class: 0,
        });
        log::debug!("qp {}: RESET -> INIT, vni={vni}", self.inner.id);
        Ok(())
    }

    fn transition_init_to_rtr(&self, peer_addr: Option<&[u8]>) -> Result<()> {
        let Some(peer_addr) = peer_addr else {
            log::debug!("qp {}: INIT -> RTR, no address vector requested", self.inner.id);
            return Ok(());
        };

        let provider = self.inner.device.provider();
        let av = provider
            .av_open(self.inner.device.domain(), 1)
            .map_err(Error::Fabric)?;
        let fi_addr = provider.av_insert(av, peer_addr).map_err(Error::Fabric)?;
        provider.ep_bind(self.inner.ep, av, 0).map_err(Error::Fabric)?;

        *self.inner.av.lock().unwrap() = Some(av);
        *self.inner.peer_addr.lock().unwrap() = Some(fi_addr);
        log::debug!("qp {}: INIT -> RTR, fi_addr={fi_addr:#x}", self.inner.id);
        Ok(())
    }

    fn transition_rtr_to_rts(&self) -> Result<()> {
        self.inner.device.provider().enable(self.inner.ep).map_err(Error::Fabric)?;
        log::debug!("qp {}: RTR -> RTS", self.inner.id);
        Ok(())
    }
}
