//! Memory-region manager and MR cache (component C).
//!
//! Three distinct allocation paths share one [`Mr`] type: fast-registration
//! (empty handle, populated later via [`Mr::map_sg`]), the all-memory DMA MR
//! ([`Mr::alloc_dma`]), and the cache-backed per-range registration
//! ([`Mr::get`]/[`Mr::put`]) that the operation translator uses when the
//! device has no all-memory MR to fall back on.

pub(crate) mod cache;
mod access;
mod remote;

pub use access::Access;
pub use remote::MrRemote;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use self::cache::{CacheKey, LruCache};
use super::device::Device;
use super::pd::Pd;
use crate::config::Config;
use crate::error::{Error, Result};

/// Cache of per-range registrations, keyed by (address, length, access).
/// Payload is `Arc<Mr>` so a cached registration can outlive an eviction for
/// as long as some caller still holds a clone (see [`Mr::get`]).
pub(crate) type MrCache = LruCache<Arc<Mr>>;

/// The fabric-side half of a registration, filled in once the range is
/// known: immediately for [`Mr::get`]/[`Mr::alloc_dma`], on first
/// [`Mr::map_sg`] for a fast-registration handle.
struct Registration {
    native_handle: usize,
    #[allow(dead_code)] // kept for parity with the key-map entry data model; not read back.
    native_key: u64,
    external_key: u32,
    addr: usize,
    len: usize,
}

/// A registered memory region. Local and remote key are the same synthetic
/// 32-bit value by convention (see the key translator).
pub struct Mr {
    device: Device,
    pd: Pd,
    access: Access,
    usecnt: AtomicU32,
    reg: OnceLock<Registration>,
}

impl Mr {
    /// Fast-registration MR: an empty, zero-length handle. Call [`Mr::map_sg`]
    /// before using it for any fabric operation.
    pub fn alloc(pd: &Pd, access: Access) -> Self {
        pd.inc_usecnt();
        Mr {
            device: pd.device().clone(),
            pd: pd.clone(),
            access,
            usecnt: AtomicU32::new(1),
            reg: OnceLock::new(),
        }
    }

    /// Populate a fast-registration MR from a scatter-gather list. The
    /// provider has no vectored registration entry point, so only the first
    /// segment is actually registered; callers needing full gather semantics
    /// must split the request across multiple MRs. Returns the number of
    /// segments mapped (always 1 on success).
    ///
    /// Fails with an invalid-argument fabric error if `sg_list` is empty,
    /// exceeds [`Config::MAX_SGE`], or this handle was already mapped.
    pub fn map_sg(&self, sg_list: &[(usize, usize)], offset: usize, _page_size: usize) -> Result<usize> {
        use crate::error::FabricError;

        if sg_list.is_empty() || sg_list.len() > Config::MAX_SGE {
            return Err(Error::Fabric(FabricError::InvalidArg));
        }
        if self.reg.get().is_some() {
            return Err(Error::Fabric(FabricError::InvalidArg));
        }

        let (base, len) = sg_list[0];
        let addr = base + offset;
        let (native_handle, native_key) = self
            .device
            .provider()
            .mr_reg(self.device.domain(), addr, len, self.access.bits())
            .map_err(Error::Fabric)?;
        let external_key = self.device.keys().register(native_key).map_err(Error::Fabric)?;

        // Only fails if already set, which the check above rules out.
        let _ = self.reg.set(Registration {
            native_handle,
            native_key,
            external_key,
            addr,
            len,
        });
        Ok(1)
    }

    /// All-memory DMA MR, spanning every addressable byte. Only usable if
    /// [`Device::dma_mr_supported`] detected provider acceptance at open
    /// time; otherwise callers must fall back to [`Mr::get`].
    pub fn alloc_dma(pd: &Pd, access: Access) -> Result<Self> {
        let device = pd.device();
        if !device.dma_mr_supported() {
            return Err(Error::CapabilityNotSupported("all-memory DMA MR"));
        }

        let (native_handle, native_key) = device
            .provider()
            .mr_reg(device.domain(), 0, usize::MAX, access.bits())
            .map_err(Error::Fabric)?;
        let external_key = device.keys().register(native_key).map_err(Error::Fabric)?;

        let reg = OnceLock::new();
        let _ = reg.set(Registration {
            native_handle,
            native_key,
            external_key,
            addr: 0,
            len: usize::MAX,
        });

        pd.inc_usecnt();
        Ok(Mr {
            device: device.clone(),
            pd: pd.clone(),
            access,
            usecnt: AtomicU32::new(1),
            reg,
        })
    }

    /// Cache-backed per-range registration. On hit, returns the existing
    /// registration (bumping the cache entry's own refcount); on miss,
    /// registers `addr..addr+len` fresh and inserts it, evicting the LRU
    /// tail first if the cache is full and that tail is unreferenced.
    pub fn get(pd: &Pd, addr: usize, len: usize, access: Access) -> Result<Arc<Mr>> {
        let device = pd.device();
        let key = CacheKey {
            addr,
            len,
            access: access.bits(),
        };

        if let Some(hit) = device.mr_cache().get_or_miss(key, Arc::clone) {
            return Ok(hit);
        }

        let (native_handle, native_key) = device
            .provider()
            .mr_reg(device.domain(), addr, len, access.bits())
            .map_err(Error::Fabric)?;
        let external_key = device.keys().register(native_key).map_err(Error::Fabric)?;

        let reg = OnceLock::new();
        let _ = reg.set(Registration {
            native_handle,
            native_key,
            external_key,
            addr,
            len,
        });
        pd.inc_usecnt();
        let mr = Arc::new(Mr {
            device: device.clone(),
            pd: pd.clone(),
            access,
            usecnt: AtomicU32::new(1),
            reg,
        });

        // The evicted Arc (if any) drops at the end of this scope unless a
        // past caller still holds a clone; either way `Mr::drop` is the only
        // place that actually closes the fabric MR.
        if let Some(evicted) = device.mr_cache().insert(key, mr.clone()) {
            log::debug!(
                "mr cache: evicted {:#x}/{} to make room for {addr:#x}/{len}",
                evicted.addr(),
                evicted.len()
            );
        }

        Ok(mr)
    }

    /// Release a cache handle obtained from [`Mr::get`]. Does not evict;
    /// only makes the entry eligible for LRU eviction on a future miss.
    pub fn put(cached: &Arc<Mr>) {
        let key = CacheKey {
            addr: cached.addr(),
            len: cached.len(),
            access: cached.access.bits(),
        };
        cached.device.mr_cache().put(key);
    }

    /// Bump the in-flight reference count. Used by the operation translator
    /// to keep a fast-registration MR alive while a posted work request
    /// still references its key.
    pub(crate) fn acquire(&self) {
        self.usecnt.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) {
        self.usecnt.fetch_sub(1, Ordering::AcqRel);
    }

    fn registration(&self) -> &Registration {
        self.reg.get().expect("Mr used before map_sg/registration completed")
    }

    /// The synthetic 32-bit key, valid as both local and remote key.
    pub fn key(&self) -> u32 {
        self.registration().external_key
    }

    /// The fabric-native MR handle, for querying the local descriptor.
    pub(crate) fn native_handle(&self) -> usize {
        self.registration().native_handle
    }

    pub fn addr(&self) -> usize {
        self.registration().addr
    }

    pub fn len(&self) -> usize {
        self.registration().len
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn pd(&self) -> &Pd {
        &self.pd
    }

    /// View this registration as a remote handle, to hand to a peer for
    /// RDMA READ/WRITE.
    pub fn as_remote(&self) -> MrRemote {
        MrRemote::new(self.addr() as u64, self.len(), self.key())
    }

    /// Deregister. Fails with [`Error::Busy`] if something other than this
    /// handle's own base reference is still outstanding; the underlying
    /// fabric resource is released unconditionally once this value drops,
    /// via [`Drop`].
    pub fn dereg(self) -> Result<()> {
        if self.usecnt.load(Ordering::Acquire) > 1 {
            return Err(Error::Busy);
        }
        Ok(())
    }
}

impl Drop for Mr {
    fn drop(&mut self) {
        self.pd.dec_usecnt();
        let Some(reg) = self.reg.get() else {
            return;
        };
        if self.usecnt.load(Ordering::Acquire) > 1 {
            log::error!("mr: dropped with outstanding references (addr={:#x})", reg.addr);
        }
        self.device.keys().unregister(reg.external_key);
        if let Err(e) = self.device.provider().close(reg.native_handle) {
            log::error!("mr: error closing fabric MR: {e}");
        }
    }
}
