//! Synchronous per-command driver: dispatches one command node to the copy
//! engine or to the marshaler/launcher, advances the command's event, and
//! provides the flush/join contract back to the scheduler.

use tracing::debug;

use helio_core::command::{Command, CommandNode, CopyRect, HostRect, Mapping};
use helio_core::config::CudaConfig;
use helio_core::error::CoreError;
use helio_core::kernel::Kernel;
use helio_core::memory::MemObject;
use helio_core::ops::{self, DeviceOps};

use crate::context::DeviceContext;
use crate::driver::{CudaDriver, CUDA_SUCCESS};
use crate::module::KernelLoader;
use crate::{copy, launch, memory};

/// One CUDA device exposed to the runtime: context handle, kernel loader,
/// and the synchronous command executor.
///
/// Execution is one command at a time; `submit` blocks the calling thread
/// until the command's native call returns. Cross-command ordering beyond
/// the driver's in-stream ordering is the upstream scheduler's job.
pub struct CudaDevice {
    ctx: DeviceContext,
    loader: KernelLoader,
}

impl CudaDevice {
    /// Bring up CUDA device `ordinal` as runtime device `index`, backed by
    /// global-memory region `region`. Fails only when no usable driver
    /// library is present; once the driver is loaded, init errors are fatal.
    pub fn init(ordinal: i32, index: u32, region: u32, config: &CudaConfig) -> Result<Self, CoreError> {
        let driver = CudaDriver::load().map_err(CoreError::DriverUnavailable)?;
        let ctx = DeviceContext::init(driver, ordinal, index, region, config);
        let loader = KernelLoader::new(config);
        Ok(Self { ctx, loader })
    }

    /// Number of CUDA devices visible, or zero when no driver is available.
    pub fn probe() -> usize {
        match CudaDriver::load() {
            Ok(driver) => {
                if driver.init(0) != CUDA_SUCCESS {
                    return 0;
                }
                driver
                    .device_get_count()
                    .map(|n| n.max(0) as usize)
                    .unwrap_or(0)
            }
            Err(_) => 0,
        }
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    /// Establish device residency for a memory object. Idempotent; later
    /// commands reuse the recorded pointer. The one recoverable failure is
    /// exhaustion on the plain device-memory path.
    pub fn alloc_mem_obj(&self, mem: &MemObject) -> Result<(), CoreError> {
        memory::ensure_resident(&self.ctx, mem).map(|_| ())
    }

    /// Release a memory object's storage on this device. Called exactly once
    /// per object, at its destruction.
    pub fn free_mem_obj(&self, mem: &MemObject) {
        memory::release(&self.ctx, mem);
    }

    /// Idempotent pre-load of a kernel's native function for this device.
    pub fn compile_kernel(&self, kernel: &Kernel) {
        self.loader.load_or_generate(&self.ctx, kernel);
    }

    /// Execute one command synchronously, driving its event through
    /// submitted → (running →) complete. Non-kernel commands take the
    /// immediate path shared with other backends and complete within this
    /// call; kernel launches mark running before the native launch and
    /// complete after per-launch transients are released.
    pub fn submit(&self, node: &CommandNode) {
        let _current = self.ctx.make_current();

        node.event.mark_submitted();

        let Command::NdRangeKernel { kernel, args, geometry } = &node.command else {
            ops::execute_immediate(self, node);
            return;
        };

        let function = self.loader.load_or_generate(&self.ctx, kernel);

        let mut block = launch::marshal(&self.ctx, kernel, args);
        launch::sync_args_to_device(&self.ctx, kernel, args);

        node.event.mark_running();
        launch::launch(&self.ctx, function, geometry, &mut block);
        launch::sync_args_to_host(&self.ctx, kernel, args);

        debug!(
            kernel = %kernel.name,
            groups = ?geometry.groups,
            local = ?geometry.local,
            shared = block.shared_mem_bytes,
            "kernel launched"
        );

        // Per-launch transients (native argument array, shared-memory offset
        // table) are gone before the command reports complete.
        drop(block);
        node.event.mark_complete();
    }

    /// No-op: the execution model is already synchronous, nothing is queued.
    pub fn flush(&self) {}

    /// Block until all outstanding work on the device's default stream has
    /// completed. Unconditional and uninterruptible.
    pub fn join(&self) {
        let _current = self.ctx.make_current();
        let res = self.ctx.driver().stream_synchronize(std::ptr::null_mut());
        self.ctx.driver().check(res, "cuStreamSynchronize");
    }
}

impl DeviceOps for CudaDevice {
    fn read(&self, mem: &MemObject, offset: usize, size: usize, dst: *mut u8) {
        copy::read(&self.ctx, mem, offset, size, dst);
    }

    fn write(&self, mem: &MemObject, offset: usize, size: usize, src: *const u8) {
        copy::write(&self.ctx, mem, offset, size, src);
    }

    fn copy(
        &self,
        src: &MemObject,
        src_offset: usize,
        dst: &MemObject,
        dst_offset: usize,
        size: usize,
    ) {
        copy::copy(&self.ctx, src, src_offset, dst, dst_offset, size);
    }

    fn read_rect(&self, mem: &MemObject, host: *mut u8, rect: &HostRect) {
        copy::read_rect(&self.ctx, mem, host, rect);
    }

    fn write_rect(&self, mem: &MemObject, host: *const u8, rect: &HostRect) {
        copy::write_rect(&self.ctx, mem, host, rect);
    }

    fn copy_rect(&self, src: &MemObject, dst: &MemObject, rect: &CopyRect) {
        copy::copy_rect(&self.ctx, src, dst, rect);
    }

    fn map_mem(&self, mem: &MemObject, mapping: &Mapping) {
        memory::map(&self.ctx, mem, mapping);
    }

    fn unmap_mem(&self, mem: &MemObject, mapping: &Mapping) {
        memory::unmap(&self.ctx, mem, mapping);
    }
}
