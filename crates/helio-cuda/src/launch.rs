//! Argument marshaling and kernel launch: convert a kernel's typed argument
//! list into the positional native array `cuLaunchKernel` expects, computing
//! the dynamic shared-memory layout for local arguments on the way.

use std::ffi::{c_uint, c_void};
use std::marker::PhantomData;

use helio_core::command::LaunchGeometry;
use helio_core::kernel::{ArgKind, ArgValue, Kernel, NativeFunction};
use helio_core::memory::MemObject;

use crate::context::DeviceContext;
use crate::driver::{CUdeviceptr, CUfunction};
use crate::memory::resident_ptr;

/// Positional native argument block for one launch plus the computed dynamic
/// shared-memory size. Owns the storage the entries point into, so it lives
/// across the launch call and is dropped as soon as the launch returns.
pub(crate) struct ArgBlock<'a> {
    dev_ptrs: Vec<CUdeviceptr>,
    shared_offsets: Vec<c_uint>,
    params: Vec<*mut c_void>,
    pub shared_mem_bytes: u32,
    _args: PhantomData<&'a [ArgValue]>,
}

impl ArgBlock<'_> {
    pub(crate) fn params_mut(&mut self) -> &mut [*mut c_void] {
        &mut self.params
    }

    #[cfg(test)]
    fn shared_offsets(&self) -> &[u32] {
        &self.shared_offsets
    }
}

enum Slot {
    /// By-value argument: points straight at the bound bytes.
    Bytes(*const u8),
    /// Buffer argument: points at an entry of `dev_ptrs` (0 for unbound).
    Dev(usize),
    /// Local argument: points at an entry of `shared_offsets` — the driver
    /// resolves the offset against the shared-memory base at launch time.
    Shared(usize),
}

pub(crate) fn marshal<'a>(
    ctx: &DeviceContext,
    kernel: &Kernel,
    args: &'a [ArgValue],
) -> ArgBlock<'a> {
    marshal_with(kernel, args, |mem| resident_ptr(ctx, mem))
}

/// Marshaling core, parameterized over buffer resolution so the layout rules
/// are exercisable without a device.
pub(crate) fn marshal_with<'a>(
    kernel: &Kernel,
    args: &'a [ArgValue],
    mut resolve: impl FnMut(&MemObject) -> CUdeviceptr,
) -> ArgBlock<'a> {
    assert_eq!(
        kernel.args.len(),
        args.len(),
        "kernel `{}` declares {} arguments but {} were bound",
        kernel.name,
        kernel.args.len(),
        args.len()
    );

    let mut dev_ptrs = Vec::new();
    let mut shared_offsets = Vec::new();
    let mut shared_mem_bytes: u32 = 0;
    let mut slots = Vec::with_capacity(args.len() + kernel.automatic_locals.len());

    for (i, kind) in kernel.args.iter().enumerate() {
        match (kind, &args[i]) {
            (ArgKind::Value, ArgValue::Value(bytes)) => {
                slots.push(Slot::Bytes(bytes.as_ptr()));
            }
            (ArgKind::GlobalPtr, ArgValue::Mem(Some(mem))) => {
                dev_ptrs.push(resolve(mem));
                slots.push(Slot::Dev(dev_ptrs.len() - 1));
            }
            (ArgKind::GlobalPtr, ArgValue::Mem(None)) => {
                // Unbound pointer argument: pass a null device pointer.
                dev_ptrs.push(0);
                slots.push(Slot::Dev(dev_ptrs.len() - 1));
            }
            (ArgKind::LocalPtr, ArgValue::Local(size)) => {
                shared_offsets.push(shared_mem_bytes as c_uint);
                slots.push(Slot::Shared(shared_offsets.len() - 1));
                shared_mem_bytes += *size as u32;
            }
            (ArgKind::Image | ArgKind::Sampler, _) => {
                panic!(
                    "unhandled argument type for kernel `{}`: image and sampler arguments are unsupported",
                    kernel.name
                );
            }
            _ => panic!(
                "argument {i} of kernel `{}` does not match its declared kind",
                kernel.name
            ),
        }
    }

    // Automatic local allocations continue the same offset accumulation
    // after the explicit argument list.
    for size in &kernel.automatic_locals {
        shared_offsets.push(shared_mem_bytes as c_uint);
        slots.push(Slot::Shared(shared_offsets.len() - 1));
        shared_mem_bytes += *size as u32;
    }

    // The heap storage behind these vectors is stable from here on; params
    // may point into it.
    let params = slots
        .iter()
        .map(|slot| match slot {
            Slot::Bytes(p) => *p as *mut c_void,
            Slot::Dev(i) => &dev_ptrs[*i] as *const CUdeviceptr as *mut c_void,
            Slot::Shared(i) => &shared_offsets[*i] as *const c_uint as *mut c_void,
        })
        .collect();

    ArgBlock {
        dev_ptrs,
        shared_offsets,
        params,
        shared_mem_bytes,
        _args: PhantomData,
    }
}

/// Explicit host→device refresh before a launch, for buffer arguments whose
/// objects cannot be device-mapped on this platform.
pub(crate) fn sync_args_to_device(ctx: &DeviceContext, kernel: &Kernel, args: &[ArgValue]) {
    for_each_explicit_sync_arg(kernel, args, |mem| {
        let dev_ptr = resident_ptr(ctx, mem);
        let res = unsafe {
            ctx.driver()
                .memcpy_htod(dev_ptr, mem.host_ptr() as *const c_void, mem.size)
        };
        ctx.driver().check(res, "cuMemcpyHtoD");
    });
}

/// Explicit device→host copy-back after a launch. Unconditional for every
/// such argument, whether or not the kernel wrote it.
pub(crate) fn sync_args_to_host(ctx: &DeviceContext, kernel: &Kernel, args: &[ArgValue]) {
    for_each_explicit_sync_arg(kernel, args, |mem| {
        let dev_ptr = resident_ptr(ctx, mem);
        let res = unsafe {
            ctx.driver()
                .memcpy_dtoh(mem.host_ptr() as *mut c_void, dev_ptr, mem.size)
        };
        ctx.driver().check(res, "cuMemcpyDtoH");
    });
}

fn for_each_explicit_sync_arg(kernel: &Kernel, args: &[ArgValue], mut f: impl FnMut(&MemObject)) {
    for (kind, value) in kernel.args.iter().zip(args) {
        if let (ArgKind::GlobalPtr, ArgValue::Mem(Some(mem))) = (kind, value) {
            if mem.needs_explicit_sync() && !mem.host_ptr().is_null() {
                f(mem);
            }
        }
    }
}

pub(crate) fn launch(
    ctx: &DeviceContext,
    function: NativeFunction,
    geometry: &LaunchGeometry,
    block: &mut ArgBlock<'_>,
) {
    let drv = ctx.driver();
    let shared_mem_bytes = block.shared_mem_bytes;
    let res = unsafe {
        drv.launch_kernel(
            function.function as CUfunction,
            geometry.groups,
            geometry.local,
            shared_mem_bytes,
            std::ptr::null_mut(), // default stream
            block.params_mut(),
        )
    };
    drv.check(res, "cuLaunchKernel");
}
