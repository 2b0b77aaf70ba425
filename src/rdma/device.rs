//! Device discovery, the global device registry, and the per-device
//! resources every PD/CQ/QP/MR on that device shares (component F, I).

use std::sync::{Arc, Mutex, OnceLock};

use super::cq::Cq;
use super::fabric::{CapHints, FabricHandle, FabricProvider, ProviderInfo};
use super::key::KeyTranslator;
use super::mr::MrCache;
use super::progress::ProgressHandle;
use crate::config::Config;
use crate::error::{Error, FabricError, Result};

struct DeviceInner {
    provider: Arc<dyn FabricProvider>,
    name: String,
    fabric: FabricHandle,
    domain: FabricHandle,
    keys: KeyTranslator,
    mr_cache: MrCache,
    /// Whether an all-memory DMA MR is usable on this device, detected once
    /// at open time (see the design note on all-memory MR caveats).
    dma_mr_supported: bool,
    default_cq: OnceLock<Cq>,
    progress: OnceLock<ProgressHandle>,
}

/// An opened fabric device: one fabric handle, one domain handle, the
/// memory-region cache, the default completion queue the progress engine
/// drives, and the progress driver itself.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    fn open(provider: Arc<dyn FabricProvider>, info: &ProviderInfo) -> Result<Self> {
        let fabric = provider.open_fabric(info).map_err(Error::Fabric)?;
        let domain = provider.open_domain(fabric, info).map_err(Error::Fabric)?;

        let dev = Self {
            inner: Arc::new(DeviceInner {
                provider: provider.clone(),
                name: info.fabric_name.clone(),
                fabric,
                domain,
                keys: KeyTranslator::new(),
                mr_cache: MrCache::new(Config::MR_CACHE_SIZE),
                dma_mr_supported: Self::probe_dma_mr(&provider, domain),
                default_cq: OnceLock::new(),
                progress: OnceLock::new(),
            }),
        };

        let cq = Cq::new(&dev, Config::DEFAULT_CQ_DEPTH)?;
        // OnceLock::set only fails if already set, which cannot happen here.
        let _ = dev.inner.default_cq.set(cq);

        let progress = super::progress::start(dev.clone());
        let _ = dev.inner.progress.set(progress);

        Ok(dev)
    }

    /// Detect at open time whether the provider accepts an all-memory
    /// (SIZE_MAX) DMA MR. If not, the MR cache must be disabled for this
    /// device and every I/O registers its own range.
    fn probe_dma_mr(provider: &Arc<dyn FabricProvider>, domain: FabricHandle) -> bool {
        provider.mr_reg(domain, 0, usize::MAX, 0).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn provider(&self) -> &Arc<dyn FabricProvider> {
        &self.inner.provider
    }

    pub(crate) fn fabric(&self) -> FabricHandle {
        self.inner.fabric
    }

    pub(crate) fn domain(&self) -> FabricHandle {
        self.inner.domain
    }

    pub(crate) fn keys(&self) -> &KeyTranslator {
        &self.inner.keys
    }

    pub(crate) fn mr_cache(&self) -> &MrCache {
        &self.inner.mr_cache
    }

    pub fn dma_mr_supported(&self) -> bool {
        self.inner.dma_mr_supported
    }

    /// The default CQ the progress engine drives. Always present once
    /// [`Device::open`] returns.
    pub fn default_cq(&self) -> &Cq {
        self.inner
            .default_cq
            .get()
            .expect("default CQ initialized by Device::open")
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        if let Some(progress) = self.progress.get() {
            progress.stop();
        }
        self.keys.shutdown();
        self.mr_cache.destroy(|_, _| {});
        if let Err(e) = self.provider.close(self.domain) {
            log::error!("device {}: error closing domain: {e}", self.name);
        }
        if let Err(e) = self.provider.close(self.fabric) {
            log::error!("device {}: error closing fabric: {e}", self.name);
        }
    }
}

/// Global registry of opened devices. Coarse lock held only during
/// discovery and shutdown.
pub struct DeviceRegistry {
    devices: Mutex<Vec<Device>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
        }
    }

    /// Discover and open every device offered by `provider` for the named
    /// fabric provider ("cxi" in production). Entries where opening the
    /// fabric or domain handle fails are skipped with a warning; discovery
    /// of the remaining entries continues.
    pub fn discover(&self, provider: Arc<dyn FabricProvider>, provider_name: &str) -> Result<usize> {
        let hints = CapHints {
            msg: true,
            rma: true,
            tagged: true,
        };
        let infos = provider
            .getinfo(provider_name, hints)
            .map_err(Error::Fabric)?;

        let mut devices = self.devices.lock().unwrap();
        let mut opened = 0;
        for info in &infos {
            match Device::open(provider.clone(), info) {
                Ok(dev) => {
                    devices.push(dev);
                    opened += 1;
                }
                Err(e) => {
                    log::warn!("skipping device '{}': {e}", info.fabric_name);
                }
            }
        }
        Ok(opened)
    }

    pub fn len(&self) -> usize {
        self.devices.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a clone of the `n`-th device.
    pub fn get(&self, n: usize) -> Option<Device> {
        self.devices.lock().unwrap().get(n).cloned()
    }

    /// Close every device, draining the registry.
    pub fn shutdown(&self) {
        self.devices.lock().unwrap().clear();
    }
}

/// Convenience wrapper matching the provider's own transient-error code,
/// used where a caller needs to distinguish "no device found" from a hard
/// discovery error.
pub fn no_such_device() -> Error {
    Error::Fabric(FabricError::NoEntry)
}
