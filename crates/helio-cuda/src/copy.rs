//! Copy engine: linear host↔device and device↔device transfers, plus the
//! unified rectangular path. All three rect operations build the same
//! [`CopyDescriptor`] and differ only in which side is tagged host vs device,
//! so origin/pitch arithmetic has exactly one place to be right.

use std::ffi::c_void;

use tracing::debug;

use helio_core::command::{CopyRect, HostRect};
use helio_core::memory::MemObject;

use crate::context::DeviceContext;
use crate::driver::{CUdeviceptr, Memcpy3D, CU_MEMORYTYPE_DEVICE, CU_MEMORYTYPE_HOST};
use crate::memory::resident_ptr;

// ── Linear transfers ──────────────────────────────────────────────

pub(crate) fn read(ctx: &DeviceContext, mem: &MemObject, offset: usize, size: usize, dst: *mut u8) {
    let _current = ctx.make_current();
    let src = resident_ptr(ctx, mem);
    let res = unsafe {
        ctx.driver().memcpy_dtoh(dst as *mut c_void, src + offset as u64, size)
    };
    ctx.driver().check(res, "cuMemcpyDtoH");
}

pub(crate) fn write(
    ctx: &DeviceContext,
    mem: &MemObject,
    offset: usize,
    size: usize,
    src: *const u8,
) {
    let _current = ctx.make_current();
    let dst = resident_ptr(ctx, mem);
    let res = unsafe {
        ctx.driver().memcpy_htod(dst + offset as u64, src as *const c_void, size)
    };
    ctx.driver().check(res, "cuMemcpyHtoD");
}

pub(crate) fn copy(
    ctx: &DeviceContext,
    src: &MemObject,
    src_offset: usize,
    dst: &MemObject,
    dst_offset: usize,
    size: usize,
) {
    let _current = ctx.make_current();
    let src_ptr = resident_ptr(ctx, src);
    let dst_ptr = resident_ptr(ctx, dst);

    // Self-copy elision: identical base pointers never reach the driver.
    if src_ptr == dst_ptr {
        debug!(mem = src.id, "device-to-device self-copy elided");
        return;
    }

    let res = ctx
        .driver()
        .memcpy_dtod(dst_ptr + dst_offset as u64, src_ptr + src_offset as u64, size);
    ctx.driver().check(res, "cuMemcpyDtoD");
}

// ── Rectangular transfers ─────────────────────────────────────────

/// One end of a rectangular transfer.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Endpoint {
    Host(*mut c_void),
    Device(CUdeviceptr),
}

/// The strided 3-D transfer description shared by every rectangular copy:
/// a region (width in bytes, height in rows, depth in slices) plus an
/// origin and row/slice pitch per side. Built fresh per call, lowered to the
/// driver's 3-D parameter block, never persisted.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CopyDescriptor {
    pub region: [usize; 3],
    pub src: Endpoint,
    pub src_origin: [usize; 3],
    pub src_row_pitch: usize,
    pub src_slice_pitch: usize,
    pub dst: Endpoint,
    pub dst_origin: [usize; 3],
    pub dst_row_pitch: usize,
    pub dst_slice_pitch: usize,
}

impl CopyDescriptor {
    /// Lower to the driver parameter block. Slice height for pitch purposes
    /// is slice_pitch / row_pitch.
    pub(crate) fn lower(&self) -> Memcpy3D {
        validate_pitches("source", self.region, self.src_row_pitch, self.src_slice_pitch);
        validate_pitches(
            "destination",
            self.region,
            self.dst_row_pitch,
            self.dst_slice_pitch,
        );

        let mut params = Memcpy3D::default();
        params.width_in_bytes = self.region[0];
        params.height = self.region[1];
        params.depth = self.region[2];

        match self.src {
            Endpoint::Host(p) => {
                params.src_memory_type = CU_MEMORYTYPE_HOST;
                params.src_host = p as *const c_void;
            }
            Endpoint::Device(d) => {
                params.src_memory_type = CU_MEMORYTYPE_DEVICE;
                params.src_device = d;
            }
        }
        params.src_x_in_bytes = self.src_origin[0];
        params.src_y = self.src_origin[1];
        params.src_z = self.src_origin[2];
        params.src_pitch = self.src_row_pitch;
        params.src_height = self.src_slice_pitch / self.src_row_pitch;

        match self.dst {
            Endpoint::Host(p) => {
                params.dst_memory_type = CU_MEMORYTYPE_HOST;
                params.dst_host = p;
            }
            Endpoint::Device(d) => {
                params.dst_memory_type = CU_MEMORYTYPE_DEVICE;
                params.dst_device = d;
            }
        }
        params.dst_x_in_bytes = self.dst_origin[0];
        params.dst_y = self.dst_origin[1];
        params.dst_z = self.dst_origin[2];
        params.dst_pitch = self.dst_row_pitch;
        params.dst_height = self.dst_slice_pitch / self.dst_row_pitch;

        params
    }
}

/// A pitch pair that cannot describe the region is a capability mismatch the
/// caller should have rejected before dispatch, not a runtime condition.
fn validate_pitches(side: &str, region: [usize; 3], row_pitch: usize, slice_pitch: usize) {
    assert!(
        row_pitch >= region[0],
        "{side} row pitch {row_pitch} smaller than region width {}",
        region[0]
    );
    assert!(
        slice_pitch % row_pitch == 0 && slice_pitch >= row_pitch * region[1],
        "{side} slice pitch {slice_pitch} incompatible with row pitch {row_pitch} and region height {}",
        region[1]
    );
}

pub(crate) fn read_rect(ctx: &DeviceContext, mem: &MemObject, host: *mut u8, rect: &HostRect) {
    let _current = ctx.make_current();
    let dev = resident_ptr(ctx, mem);
    let desc = CopyDescriptor {
        region: rect.region,
        src: Endpoint::Device(dev),
        src_origin: rect.buffer_origin,
        src_row_pitch: rect.buffer_row_pitch,
        src_slice_pitch: rect.buffer_slice_pitch,
        dst: Endpoint::Host(host as *mut c_void),
        dst_origin: rect.host_origin,
        dst_row_pitch: rect.host_row_pitch,
        dst_slice_pitch: rect.host_slice_pitch,
    };
    dispatch(ctx, &desc);
}

pub(crate) fn write_rect(ctx: &DeviceContext, mem: &MemObject, host: *const u8, rect: &HostRect) {
    let _current = ctx.make_current();
    let dev = resident_ptr(ctx, mem);
    let desc = CopyDescriptor {
        region: rect.region,
        src: Endpoint::Host(host as *mut c_void),
        src_origin: rect.host_origin,
        src_row_pitch: rect.host_row_pitch,
        src_slice_pitch: rect.host_slice_pitch,
        dst: Endpoint::Device(dev),
        dst_origin: rect.buffer_origin,
        dst_row_pitch: rect.buffer_row_pitch,
        dst_slice_pitch: rect.buffer_slice_pitch,
    };
    dispatch(ctx, &desc);
}

pub(crate) fn copy_rect(ctx: &DeviceContext, src: &MemObject, dst: &MemObject, rect: &CopyRect) {
    let _current = ctx.make_current();
    let src_ptr = resident_ptr(ctx, src);
    let dst_ptr = resident_ptr(ctx, dst);
    let desc = CopyDescriptor {
        region: rect.region,
        src: Endpoint::Device(src_ptr),
        src_origin: rect.src_origin,
        src_row_pitch: rect.src_row_pitch,
        src_slice_pitch: rect.src_slice_pitch,
        dst: Endpoint::Device(dst_ptr),
        dst_origin: rect.dst_origin,
        dst_row_pitch: rect.dst_row_pitch,
        dst_slice_pitch: rect.dst_slice_pitch,
    };
    dispatch(ctx, &desc);
}

fn dispatch(ctx: &DeviceContext, desc: &CopyDescriptor) {
    let params = desc.lower();
    let res = unsafe { ctx.driver().memcpy_3d(&params) };
    ctx.driver().check(res, "cuMemcpy3D");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_to_device_descriptor() -> CopyDescriptor {
        CopyDescriptor {
            region: [16, 4, 2],
            src: Endpoint::Host(0x1000 as *mut c_void),
            src_origin: [4, 1, 0],
            src_row_pitch: 32,
            src_slice_pitch: 128,
            dst: Endpoint::Device(0xd000_0000),
            dst_origin: [0, 2, 1],
            dst_row_pitch: 64,
            dst_slice_pitch: 512,
        }
    }

    #[test]
    fn lowers_origins_pitches_and_region() {
        let params = host_to_device_descriptor().lower();

        assert_eq!(params.width_in_bytes, 16);
        assert_eq!(params.height, 4);
        assert_eq!(params.depth, 2);

        assert_eq!(params.src_memory_type, CU_MEMORYTYPE_HOST);
        assert_eq!(params.src_host as usize, 0x1000);
        assert_eq!(params.src_device, 0);
        assert_eq!(
            (params.src_x_in_bytes, params.src_y, params.src_z),
            (4, 1, 0)
        );
        assert_eq!(params.src_pitch, 32);
        // Slice height is derived, not stored: slice_pitch / row_pitch.
        assert_eq!(params.src_height, 4);

        assert_eq!(params.dst_memory_type, CU_MEMORYTYPE_DEVICE);
        assert_eq!(params.dst_device, 0xd000_0000);
        assert!(params.dst_host.is_null());
        assert_eq!(
            (params.dst_x_in_bytes, params.dst_y, params.dst_z),
            (0, 2, 1)
        );
        assert_eq!(params.dst_pitch, 64);
        assert_eq!(params.dst_height, 8);
    }

    #[test]
    fn read_and_write_descriptors_are_mirrors() {
        // The same sides swapped must produce a transposed parameter block.
        let forward = host_to_device_descriptor();
        let mut backward = forward;
        std::mem::swap(&mut backward.src, &mut backward.dst);
        std::mem::swap(&mut backward.src_origin, &mut backward.dst_origin);
        std::mem::swap(&mut backward.src_row_pitch, &mut backward.dst_row_pitch);
        std::mem::swap(&mut backward.src_slice_pitch, &mut backward.dst_slice_pitch);

        let f = forward.lower();
        let b = backward.lower();
        assert_eq!(f.src_memory_type, b.dst_memory_type);
        assert_eq!(f.src_pitch, b.dst_pitch);
        assert_eq!(f.src_height, b.dst_height);
        assert_eq!(f.src_x_in_bytes, b.dst_x_in_bytes);
        assert_eq!(f.width_in_bytes, b.width_in_bytes);
    }

    #[test]
    fn packed_pitches_at_full_extent() {
        // 1-byte-wide rows, minimal packed pitches: the degenerate case the
        // descriptor must still describe exactly.
        let desc = CopyDescriptor {
            region: [1, 1, 1],
            src: Endpoint::Device(0x100),
            src_origin: [0, 0, 0],
            src_row_pitch: 1,
            src_slice_pitch: 1,
            dst: Endpoint::Device(0x200),
            dst_origin: [0, 0, 0],
            dst_row_pitch: 1,
            dst_slice_pitch: 1,
        };
        let params = desc.lower();
        assert_eq!(params.src_height, 1);
        assert_eq!(params.dst_height, 1);
        assert_eq!(
            (params.width_in_bytes, params.height, params.depth),
            (1, 1, 1)
        );
    }

    #[test]
    #[should_panic(expected = "row pitch")]
    fn row_pitch_below_width_is_rejected() {
        let mut desc = host_to_device_descriptor();
        desc.src_row_pitch = 8;
        desc.lower();
    }

    #[test]
    #[should_panic(expected = "slice pitch")]
    fn ragged_slice_pitch_is_rejected() {
        let mut desc = host_to_device_descriptor();
        desc.dst_slice_pitch = 200; // not a multiple of the 64-byte row pitch
        desc.lower();
    }
}
