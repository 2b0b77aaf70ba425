//! Completion queue (component F) and work completion / completion
//! translator (component D).

mod wc;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub use self::wc::{Wc, WcOpcode};

use super::device::Device;
use super::fabric::FabricHandle;
use crate::config::Config;
use crate::error::{Error, FabricError, Result};

/// A completion callback, invoked with the drained batch and the opaque
/// context supplied at CQ creation.
pub type CompletionCallback = Box<dyn Fn(&[Wc], usize) + Send + Sync>;

/// A single-slot deferred-work channel: the progress engine enqueues a
/// drained batch and returns immediately; a consumer (never the progress
/// engine itself) drains it and invokes the registered callback. This keeps
/// user completion callbacks off the driver thread, per the design note on
/// completion delivery.
#[derive(Default)]
struct NotifySlot {
    pending: Mutex<Option<Vec<Wc>>>,
}

impl NotifySlot {
    fn signal(&self, wcs: Vec<Wc>) {
        *self.pending.lock().unwrap() = Some(wcs);
    }

    fn take(&self) -> Option<Vec<Wc>> {
        self.pending.lock().unwrap().take()
    }
}

struct CqInner {
    device: Device,
    cq: FabricHandle,
    capacity: u32,
    usecnt: AtomicU32,
    notify: NotifySlot,
    callback: Option<CompletionCallback>,
    context: usize,
}

/// A completion queue. May not be destroyed while any QP still references
/// it (tracked via [`Cq::inc_usecnt`]/[`Cq::dec_usecnt`]).
#[derive(Clone)]
pub struct Cq {
    inner: Arc<CqInner>,
}

impl Cq {
    pub const DEFAULT_CQ_DEPTH: u32 = Config::DEFAULT_CQ_DEPTH;

    pub fn new(device: &Device, capacity: u32) -> Result<Self> {
        Self::with_callback(device, capacity, 0, None)
    }

    /// Create a CQ with a completion callback and its opaque context,
    /// invoked by [`Cq::dispatch_pending`] (never from the progress engine's
    /// own thread).
    pub fn with_callback(
        device: &Device,
        capacity: u32,
        context: usize,
        callback: Option<CompletionCallback>,
    ) -> Result<Self> {
        let cq = device
            .provider()
            .cq_open(device.domain(), capacity as usize)
            .map_err(Error::Fabric)?;

        Ok(Self {
            inner: Arc::new(CqInner {
                device: device.clone(),
                cq,
                capacity,
                usecnt: AtomicU32::new(0),
                notify: NotifySlot::default(),
                callback,
                context,
            }),
        })
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    pub(crate) fn fid(&self) -> FabricHandle {
        self.inner.cq
    }

    pub(crate) fn inc_usecnt(&self) {
        self.inner.usecnt.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_usecnt(&self) {
        self.inner.usecnt.fetch_sub(1, Ordering::AcqRel);
    }

    /// Non-blockingly poll up to `num` completions. Drains successful
    /// entries in a batch; on an error-carrying CQ, reads and translates
    /// exactly one error entry per call, per the reference implementation's
    /// `kfi_poll_cq`.
    pub fn poll(&self, num: usize) -> Result<Vec<Wc>> {
        let device = &self.inner.device;
        match device.provider().cq_read(self.inner.cq, num) {
            Ok(entries) => Ok(entries.into_iter().map(wc::translate_success).collect()),
            Err(FabricError::Again) => Ok(Vec::new()),
            Err(_) => {
                let err_entry = device
                    .provider()
                    .cq_readerr(self.inner.cq)
                    .map_err(Error::Fabric)?;
                Ok(vec![wc::translate_error(err_entry)])
            }
        }
    }

    /// Used only by the progress engine: attempt one drain-and-enqueue pass.
    /// Returns `Ok(true)` if any completions were produced (the caller
    /// should not sleep), `Ok(false)` on transient-empty. Never invokes the
    /// completion callback itself; it only enqueues onto the deferred-work
    /// channel, per the design note on completion delivery.
    pub(crate) fn progress_once(&self) -> Result<bool> {
        let wcs = self.poll(Config::PROGRESS_POLL_BATCH)?;
        if wcs.is_empty() {
            return Ok(false);
        }
        self.inner.notify.signal(wcs);
        Ok(true)
    }

    /// Drain the deferred-work channel and, if this CQ was created with a
    /// completion callback, invoke it with the batch and the opaque context.
    /// Returns the drained batch regardless. Call this from a thread other
    /// than the progress engine's driver thread.
    pub fn dispatch_pending(&self) -> Option<Vec<Wc>> {
        let wcs = self.inner.notify.take()?;
        if let Some(callback) = &self.inner.callback {
            callback(&wcs, self.inner.context);
        }
        Some(wcs)
    }

    /// Request notification of future completions. A no-op: the deferred
    /// notification channel already delivers every drained batch
    /// unconditionally, so there is nothing to arm.
    pub fn request_notify(&self) {}

    /// Destroy this CQ. Fails with [`Error::Busy`] if any QP still
    /// references it.
    pub fn destroy(self) -> Result<()> {
        if self.inner.usecnt.load(Ordering::Acquire) != 0 {
            return Err(Error::Busy);
        }
        self.inner
            .device
            .provider()
            .close(self.inner.cq)
            .map_err(Error::Fabric)
    }
}
