//! Memory object residency: lazy per-region device allocation under the four
//! host-pointer interoperability policies, the matching release paths, and
//! map/unmap staging.

use std::ffi::c_void;

use tracing::{debug, warn};

use helio_core::command::Mapping;
use helio_core::error::CoreError;
use helio_core::memory::{MemFlags, MemObject, ResidencySlot};

use crate::context::DeviceContext;
use crate::driver::{
    CUDA_ERROR_HOST_MEMORY_ALREADY_REGISTERED, CUDA_SUCCESS, CU_MEMHOSTALLOC_DEVICEMAP,
    CU_MEMHOSTREGISTER_DEVICEMAP,
};

/// Guarantee a device pointer exists for `mem`'s global-memory region and
/// record it in this device's residency slot. Idempotent: once the region is
/// resident, later calls only alias the existing pointer into the requesting
/// device's slot.
///
/// Only exhaustion on the plain device-only path is recoverable; any other
/// driver failure in here means a broken device context and aborts.
pub(crate) fn ensure_resident(
    ctx: &DeviceContext,
    mem: &MemObject,
) -> Result<ResidencySlot, CoreError> {
    let _current = ctx.make_current();
    let drv = ctx.driver();

    let slot = mem.slot_or_try_insert(ctx.region, || {
        let dev_ptr = if mem.flags.contains(MemFlags::USE_HOST_PTR) {
            if !ctx.can_map_host {
                // No host registration on this platform: plain device
                // storage, kept coherent by explicit copies around each
                // launch.
                mem.mark_explicit_sync();
                drv.mem_alloc(mem.size)
                    .unwrap_or_else(|e| drv.die(e, "cuMemAlloc"))
            } else {
                let host = mem.host_ptr() as *mut c_void;
                let res = unsafe {
                    drv.mem_host_register(host, mem.size, CU_MEMHOSTREGISTER_DEVICEMAP)
                };
                if res != CUDA_SUCCESS && res != CUDA_ERROR_HOST_MEMORY_ALREADY_REGISTERED {
                    drv.die(res, "cuMemHostRegister");
                }
                unsafe { drv.mem_host_get_device_pointer(host, 0) }
                    .unwrap_or_else(|e| drv.die(e, "cuMemHostGetDevicePointer"))
            }
        } else if mem.flags.contains(MemFlags::ALLOC_HOST_PTR) {
            let host = drv
                .mem_host_alloc(mem.size, CU_MEMHOSTALLOC_DEVICEMAP)
                .unwrap_or_else(|e| drv.die(e, "cuMemHostAlloc"));
            mem.set_host_ptr(host as *mut u8);
            unsafe { drv.mem_host_get_device_pointer(host, 0) }
                .unwrap_or_else(|e| drv.die(e, "cuMemHostGetDevicePointer"))
        } else {
            match drv.mem_alloc(mem.size) {
                Ok(ptr) => ptr,
                Err(e) => {
                    warn!(
                        mem = mem.id,
                        size = mem.size,
                        "failed to allocate device memory: {}",
                        drv.error_name(e)
                    );
                    return Err(CoreError::AllocationFailure);
                }
            }
        };

        if mem.flags.contains(MemFlags::COPY_HOST_PTR) {
            let host = mem.host_ptr();
            if !host.is_null() {
                let res = unsafe { drv.memcpy_htod(dev_ptr, host as *const c_void, mem.size) };
                drv.check(res, "cuMemcpyHtoD");
            }
        }

        debug!(mem = mem.id, size = mem.size, region = ctx.region, dev_ptr, "buffer resident");
        Ok(ResidencySlot { dev_ptr, region: ctx.region })
    })?;

    mem.set_slot(ctx.index, slot);
    Ok(slot)
}

/// Device address of `mem` for this context, allocating on first touch.
/// Exhaustion at this point is fatal: the scheduler accepted the object when
/// it was allocated, so losing the storage mid-command has no recovery.
pub(crate) fn resident_ptr(ctx: &DeviceContext, mem: &MemObject) -> u64 {
    match ensure_resident(ctx, mem) {
        Ok(slot) => slot.dev_ptr,
        Err(_) => {
            tracing::error!(mem = mem.id, "device memory exhausted during command execution");
            std::process::abort();
        }
    }
}

/// Free `mem`'s storage on this device, through the path matching how it was
/// obtained. Called exactly once, at the memory object's destruction.
pub(crate) fn release(ctx: &DeviceContext, mem: &MemObject) {
    let _current = ctx.make_current();
    let drv = ctx.driver();

    // Never touched on this device: nothing to release.
    if mem.slot(ctx.region).is_none() && mem.slot(ctx.index).is_none() {
        return;
    }

    if mem.flags.contains(MemFlags::ALLOC_HOST_PTR) {
        let host = mem.take_host_ptr();
        if !host.is_null() {
            let res = drv.mem_free_host(host as *mut c_void);
            drv.check(res, "cuMemFreeHost");
        }
    } else if mem.flags.contains(MemFlags::USE_HOST_PTR) && !mem.needs_explicit_sync() {
        // Registered host memory goes back through the registration path,
        // not a generic device free.
        let host = mem.host_ptr();
        if !host.is_null() {
            let res = unsafe { drv.mem_host_unregister(host as *mut c_void) };
            drv.check(res, "cuMemHostUnregister");
        }
    } else if let Some(slot) = mem.slot(ctx.index) {
        let res = drv.mem_free(slot.dev_ptr);
        drv.check(res, "cuMemFree");
    }

    mem.remove_slot(ctx.index);
    mem.remove_slot(ctx.region);
}

/// Map a sub-range to a host-visible address. Host-visible objects hand back
/// their own storage; everything else gets a staging copy of the range.
pub(crate) fn map(ctx: &DeviceContext, mem: &MemObject, mapping: &Mapping) {
    let _current = ctx.make_current();

    let host = mem.host_ptr();
    if !host.is_null() {
        mapping.record(unsafe { host.add(mapping.offset) }, false);
        return;
    }

    let dev_ptr = resident_ptr(ctx, mem);
    let mut staging = vec![0u8; mapping.size];
    let ptr = staging.as_mut_ptr();
    std::mem::forget(staging);

    let drv = ctx.driver();
    let res = unsafe {
        drv.memcpy_dtoh(ptr as *mut c_void, dev_ptr + mapping.offset as u64, mapping.size)
    };
    drv.check(res, "cuMemcpyDtoH");
    mapping.record(ptr, true);
}

/// Unmap: write a staged range back to the device and release the staging
/// copy. An identity mapping (host-visible object) has nothing to do.
pub(crate) fn unmap(ctx: &DeviceContext, mem: &MemObject, mapping: &Mapping) {
    let _current = ctx.make_current();

    if !mapping.is_staged() {
        mapping.take();
        return;
    }

    let ptr = mapping.take();
    if ptr.is_null() {
        return;
    }

    let dev_ptr = resident_ptr(ctx, mem);
    let drv = ctx.driver();
    let res = unsafe {
        drv.memcpy_htod(dev_ptr + mapping.offset as u64, ptr as *const c_void, mapping.size)
    };
    drv.check(res, "cuMemcpyHtoD");

    drop(unsafe { Vec::from_raw_parts(ptr, mapping.size, mapping.size) });
}
