use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use dashmap::DashMap;

bitflags::bitflags! {
    /// Allocation-policy flags of a memory object. The default (empty) policy
    /// is a plain device-only allocation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemFlags: u32 {
        /// Use the application's host allocation as backing storage.
        const USE_HOST_PTR = 1 << 0;
        /// Allocate host-visible (page-locked) backing storage.
        const ALLOC_HOST_PTR = 1 << 1;
        /// Seed device storage from the host pointer when first allocated.
        const COPY_HOST_PTR = 1 << 2;
    }
}

/// Where a memory object's bytes live on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidencySlot {
    /// Device address of the allocation (or the device-mapped host address).
    pub dev_ptr: u64,
    /// Global-memory region the allocation belongs to.
    pub region: u32,
}

/// One application-visible buffer, possibly resident on several devices.
///
/// Device storage is allocated at most once per global-memory region; the
/// region id shares the index space of device indices (a region is named by
/// the first device backed by it), so logical devices over the same physical
/// memory alias one slot. Slots are written once, lazily, on first touch and
/// read-only afterwards.
pub struct MemObject {
    pub id: u64,
    pub size: usize,
    pub flags: MemFlags,
    host_ptr: AtomicPtr<u8>,
    slots: DashMap<u32, ResidencySlot>,
    /// Set when the device copy must be kept coherent by explicit copies
    /// around each launch (host registration unavailable on this platform).
    explicit_sync: AtomicBool,
}

impl MemObject {
    pub fn new(id: u64, size: usize, flags: MemFlags, host_ptr: Option<*mut u8>) -> Self {
        Self {
            id,
            size,
            flags,
            host_ptr: AtomicPtr::new(host_ptr.unwrap_or(std::ptr::null_mut())),
            slots: DashMap::new(),
            explicit_sync: AtomicBool::new(false),
        }
    }

    /// Host-side address, or null if the object has none (yet).
    pub fn host_ptr(&self) -> *mut u8 {
        self.host_ptr.load(Ordering::Acquire)
    }

    /// Record the host-side address (pinned allocation made on first touch).
    pub fn set_host_ptr(&self, ptr: *mut u8) {
        self.host_ptr.store(ptr, Ordering::Release);
    }

    /// Clear and return the host-side address.
    pub fn take_host_ptr(&self) -> *mut u8 {
        self.host_ptr.swap(std::ptr::null_mut(), Ordering::AcqRel)
    }

    pub fn slot(&self, index: u32) -> Option<ResidencySlot> {
        self.slots.get(&index).map(|s| *s)
    }

    /// Copy an already-resolved residency slot into `index`'s slot.
    pub fn set_slot(&self, index: u32, slot: ResidencySlot) {
        self.slots.insert(index, slot);
    }

    /// Idempotent slot resolution: returns the existing slot for `index`, or
    /// inserts the one produced by `init`. Later racers observe the first
    /// inserted value.
    pub fn slot_or_try_insert<E>(
        &self,
        index: u32,
        init: impl FnOnce() -> Result<ResidencySlot, E>,
    ) -> Result<ResidencySlot, E> {
        use dashmap::mapref::entry::Entry;
        match self.slots.entry(index) {
            Entry::Occupied(e) => Ok(*e.get()),
            Entry::Vacant(v) => {
                let slot = init()?;
                v.insert(slot);
                Ok(slot)
            }
        }
    }

    pub fn remove_slot(&self, index: u32) -> Option<ResidencySlot> {
        self.slots.remove(&index).map(|(_, s)| s)
    }

    pub fn mark_explicit_sync(&self) {
        self.explicit_sync.store(true, Ordering::Release);
    }

    pub fn needs_explicit_sync(&self) -> bool {
        self.explicit_sync.load(Ordering::Acquire)
    }
}
