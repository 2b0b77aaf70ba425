//! Protection domain (component F).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::device::Device;
use crate::error::{Error, Result};

struct PdInner {
    device: Device,
    usecnt: AtomicU32,
}

/// A protection domain. No fabric call corresponds to PD allocation itself
/// (kfabric has no PD concept); this type exists purely to preserve the
/// verbs resource-ownership model the upper transport expects, scoping MRs
/// and QPs to a device.
#[derive(Clone)]
pub struct Pd {
    inner: Arc<PdInner>,
}

impl Pd {
    /// Allocate a protection domain bound to `device`.
    pub fn new(device: &Device) -> Self {
        Self {
            inner: Arc::new(PdInner {
                device: device.clone(),
                usecnt: AtomicU32::new(0),
            }),
        }
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub(crate) fn inc_usecnt(&self) {
        self.inner.usecnt.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_usecnt(&self) {
        self.inner.usecnt.fetch_sub(1, Ordering::AcqRel);
    }

    /// Explicitly destroy this PD. Fails with [`Error::Busy`] if any QP or
    /// MR still references it.
    pub fn destroy(self) -> Result<()> {
        if self.inner.usecnt.load(Ordering::Acquire) != 0 {
            return Err(Error::Busy);
        }
        Ok(())
    }
}
