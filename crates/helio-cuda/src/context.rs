//! Per-device session state: the CUDA context, the architecture string used
//! for code generation, and the memory accounting the runtime exposes.

use std::sync::Arc;

use tracing::info;

use helio_core::config::CudaConfig;

use crate::driver::{attr, CudaDriver, CUcontext, CUdevice, CU_CTX_MAP_HOST};

/// Device capability snapshot queried once at init. Only what this backend
/// itself consumes; full capability enumeration lives upstream.
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    pub name: String,
    pub max_work_group_size: u32,
    pub max_work_item_sizes: [u32; 3],
    pub compute_units: u32,
    pub clock_rate_khz: u32,
    pub local_mem_size: u64,
    pub constant_mem_size: u64,
    pub ecc_enabled: bool,
    pub integrated: bool,
}

/// Owns one device's execution context. Created at device init, destroyed at
/// teardown; every driver-facing operation binds it to the calling thread
/// first via [`DeviceContext::make_current`].
pub struct DeviceContext {
    driver: Arc<CudaDriver>,
    device: CUdevice,
    context: CUcontext,
    /// Index of this device in the runtime's device registry.
    pub index: u32,
    /// Global-memory region backing this device (shares the device index
    /// space; devices over the same physical memory name the same region).
    pub region: u32,
    /// Code-generation target, e.g. "sm_86".
    pub arch: String,
    pub props: DeviceProperties,
    pub global_mem_size: u64,
    pub global_mem_free: u64,
    /// max(total/4, 128 MiB): largest single allocation the runtime reports.
    pub max_alloc_size: u64,
    /// Whether host allocations can be registered and device-mapped here.
    /// When false, host-pointer-interop objects fall back to plain device
    /// storage with explicit copies around each launch.
    pub can_map_host: bool,
}

// SAFETY: the raw context pointer is only passed back to the driver, which
// manages its own thread association via push/pop current.
unsafe impl Send for DeviceContext {}
unsafe impl Sync for DeviceContext {}

impl DeviceContext {
    /// Bring up CUDA device `ordinal` as runtime device `index` backed by
    /// global-memory region `region`. Every driver failure here is fatal: a
    /// device that cannot initialize has no degraded mode.
    pub fn init(
        driver: Arc<CudaDriver>,
        ordinal: i32,
        index: u32,
        region: u32,
        config: &CudaConfig,
    ) -> Self {
        let res = driver.init(0);
        driver.check(res, "cuInit");

        let device = driver
            .device_get(ordinal)
            .unwrap_or_else(|e| driver.die(e, "cuDeviceGet"));
        let name = driver
            .device_get_name(device)
            .unwrap_or_else(|e| driver.die(e, "cuDeviceGetName"));
        let query = |attrib: i32| {
            driver
                .device_get_attribute(attrib, device)
                .unwrap_or_else(|e| driver.die(e, "cuDeviceGetAttribute"))
        };

        let props = DeviceProperties {
            name,
            max_work_group_size: query(attr::MAX_THREADS_PER_BLOCK) as u32,
            max_work_item_sizes: [
                query(attr::MAX_BLOCK_DIM_X) as u32,
                query(attr::MAX_BLOCK_DIM_Y) as u32,
                query(attr::MAX_BLOCK_DIM_Z) as u32,
            ],
            compute_units: query(attr::MULTIPROCESSOR_COUNT) as u32,
            clock_rate_khz: query(attr::CLOCK_RATE) as u32,
            local_mem_size: query(attr::MAX_SHARED_MEMORY_PER_MULTIPROCESSOR) as u64,
            constant_mem_size: query(attr::TOTAL_CONSTANT_MEMORY) as u64,
            ecc_enabled: query(attr::ECC_ENABLED) != 0,
            integrated: query(attr::INTEGRATED) != 0,
        };

        let sm_major = query(attr::COMPUTE_CAPABILITY_MAJOR);
        let sm_minor = query(attr::COMPUTE_CAPABILITY_MINOR);
        let arch = config
            .arch_override()
            .unwrap_or_else(|| format!("sm_{sm_major}{sm_minor}"));
        info!(device = %props.name, %arch, "GPU architecture selected");

        // Host registration needs driver support and is additionally absent
        // on ARM regardless of what the attribute reports.
        let can_map_host =
            !cfg!(target_arch = "arm") && query(attr::CAN_MAP_HOST_MEMORY) != 0;

        let context = driver
            .ctx_create(CU_CTX_MAP_HOST, device)
            .unwrap_or_else(|e| driver.die(e, "cuCtxCreate"));

        let (free, total) = driver
            .mem_get_info()
            .unwrap_or_else(|e| driver.die(e, "cuMemGetInfo"));
        let max_alloc_size = std::cmp::max(total as u64 / 4, 128 * 1024 * 1024);

        Self {
            driver,
            device,
            context,
            index,
            region,
            arch,
            props,
            global_mem_size: total as u64,
            global_mem_free: free as u64,
            max_alloc_size,
            can_map_host,
        }
    }

    pub fn driver(&self) -> &CudaDriver {
        &self.driver
    }

    pub fn device(&self) -> CUdevice {
        self.device
    }

    /// Bind this device's context to the calling thread for the duration of
    /// the returned guard. The driver associates the current context with a
    /// thread rather than a device handle, so every public entry point that
    /// touches the driver takes one of these first — including re-entrant
    /// map/unmap paths.
    pub fn make_current(&self) -> CurrentGuard<'_> {
        let res = self.driver.ctx_push_current(self.context);
        self.driver.check(res, "cuCtxPushCurrent");
        CurrentGuard { driver: &self.driver }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        let res = self.driver.ctx_destroy(self.context);
        self.driver.check(res, "cuCtxDestroy");
    }
}

/// Scoped current-context binding; pops the context on every exit path.
pub struct CurrentGuard<'a> {
    driver: &'a CudaDriver,
}

impl Drop for CurrentGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.driver.ctx_pop_current() {
            self.driver.die(e, "cuCtxPopCurrent");
        }
    }
}
