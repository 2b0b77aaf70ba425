//! Bidirectional 32-bit/64-bit memory key translator (component B).
//!
//! Grounded on the reference key-mapping table: an ordered structure keyed
//! by the 32-bit external key and a hash structure keyed by the 64-bit
//! native key, with a monotonic counter for external-key allocation starting
//! above the reserved range.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::FabricError;

/// External keys below this value are reserved and never allocated.
pub const FIRST_EXTERNAL_KEY: u32 = 0x10000;

#[derive(Debug, Clone, Copy)]
struct Entry {
    native_key: u64,
    refcount: u32,
}

/// Bidirectional key translator. Holds two independently locked structures;
/// `register` acquires both locks in a fixed order (external, then native)
/// to keep lock ordering consistent across all call sites.
pub struct KeyTranslator {
    next_external: AtomicU32,
    by_external: Mutex<BTreeMap<u32, Entry>>,
    by_native: Mutex<HashMap<u64, u32>>,
}

impl Default for KeyTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyTranslator {
    pub fn new() -> Self {
        Self {
            next_external: AtomicU32::new(FIRST_EXTERNAL_KEY),
            by_external: Mutex::new(BTreeMap::new()),
            by_native: Mutex::new(HashMap::new()),
        }
    }

    /// Register a native key and return a fresh external key for it.
    ///
    /// The monotonic counter guarantees the external key is always fresh, so
    /// a duplicate-external collision here is a fatal invariant violation
    /// rather than an expected error path; it is still reported rather than
    /// causing a panic.
    pub fn register(&self, native_key: u64) -> Result<u32, FabricError> {
        let external = self.next_external.fetch_add(1, Ordering::Relaxed);

        let mut by_external = self.by_external.lock().unwrap();
        let mut by_native = self.by_native.lock().unwrap();

        if by_external.contains_key(&external) {
            log::error!("key translator: external key {external:#x} already present, counter invariant violated");
            return Err(FabricError::Other);
        }

        by_external.insert(
            external,
            Entry {
                native_key,
                refcount: 1,
            },
        );
        by_native.insert(native_key, external);
        log::debug!("key translator: registered native={native_key:#x} external={external:#x}");
        Ok(external)
    }

    pub fn lookup_by_external(&self, external: u32) -> Option<u64> {
        self.by_external
            .lock()
            .unwrap()
            .get(&external)
            .map(|e| e.native_key)
    }

    pub fn lookup_by_native(&self, native_key: u64) -> Option<u32> {
        self.by_native.lock().unwrap().get(&native_key).copied()
    }

    /// Remove the mapping for `external`. Idempotent: unregistering an
    /// already-absent key is a no-op.
    pub fn unregister(&self, external: u32) {
        let mut by_external = self.by_external.lock().unwrap();
        if let Some(entry) = by_external.remove(&external) {
            self.by_native.lock().unwrap().remove(&entry.native_key);
            log::debug!("key translator: unregistered external={external:#x}");
        }
    }

    /// Remove every entry. Used on device shutdown.
    pub fn shutdown(&self) {
        self.by_external.lock().unwrap().clear();
        self.by_native.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_lookup_unregister_round_trip() {
        let kt = KeyTranslator::new();
        let external = kt.register(0x1234_5678_9abc_def0).unwrap();
        assert!(external >= FIRST_EXTERNAL_KEY);
        assert_eq!(kt.lookup_by_external(external), Some(0x1234_5678_9abc_def0));
        assert_eq!(kt.lookup_by_native(0x1234_5678_9abc_def0), Some(external));

        kt.unregister(external);
        assert_eq!(kt.lookup_by_external(external), None);
        assert_eq!(kt.lookup_by_native(0x1234_5678_9abc_def0), None);
    }

    #[test]
    fn distinct_native_keys_never_collide() {
        let kt = KeyTranslator::new();
        let e1 = kt.register(0x1111_1111_1111_1111).unwrap();
        let e2 = kt.register(0x2222_2222_2222_2222).unwrap();
        assert_ne!(e1, e2);
    }

    #[test]
    fn unregister_is_idempotent() {
        let kt = KeyTranslator::new();
        let external = kt.register(0xdead_beef).unwrap();
        kt.unregister(external);
        kt.unregister(external);
    }

    #[test]
    fn shutdown_clears_all_entries() {
        let kt = KeyTranslator::new();
        let e1 = kt.register(1).unwrap();
        let e2 = kt.register(2).unwrap();
        kt.shutdown();
        assert_eq!(kt.lookup_by_external(e1), None);
        assert_eq!(kt.lookup_by_external(e2), None);
    }
}
