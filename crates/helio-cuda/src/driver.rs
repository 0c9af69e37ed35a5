//! Dynamic loading of the CUDA driver library.
//!
//! Uses `libloading` to load `nvcuda.dll` (Windows) or `libcuda.so.1` (Linux)
//! and provides safe Rust wrappers around the raw driver API functions this
//! backend calls. Driver errors split into two classes: allocation exhaustion
//! is returned to the caller, everything else goes through [`CudaDriver::check`],
//! which reports the driver's own error name/string and aborts — a failing
//! driver call of that kind means the execution context itself is gone.

use std::ffi::{c_char, c_int, c_uint, c_void, CStr, CString};
use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};
use tracing::{debug, error, info};

/// CUDA result type (CUresult).
pub type CUresult = c_int;

/// CUDA device ordinal handle.
pub type CUdevice = c_int;

/// Opaque CUDA types (represented as pointers).
pub type CUcontext = *mut c_void;
pub type CUmodule = *mut c_void;
pub type CUfunction = *mut c_void;
pub type CUstream = *mut c_void;
pub type CUarray = *mut c_void;
pub type CUdeviceptr = u64;

pub const CUDA_SUCCESS: CUresult = 0;
pub const CUDA_ERROR_HOST_MEMORY_ALREADY_REGISTERED: CUresult = 712;

/// cuCtxCreate flag: allow host memory to be mapped into the device space.
pub const CU_CTX_MAP_HOST: u32 = 0x08;
/// cuMemHostRegister flag: request a device-mapped pointer for the region.
pub const CU_MEMHOSTREGISTER_DEVICEMAP: u32 = 0x02;
/// cuMemHostAlloc flag: request a device-mapped pointer for the allocation.
pub const CU_MEMHOSTALLOC_DEVICEMAP: u32 = 0x02;

/// CUmemorytype values used in 3-D copy descriptors.
pub const CU_MEMORYTYPE_HOST: c_uint = 0x01;
pub const CU_MEMORYTYPE_DEVICE: c_uint = 0x02;

/// CUdevice_attribute values this backend queries at init.
pub mod attr {
    pub const MAX_THREADS_PER_BLOCK: i32 = 1;
    pub const MAX_BLOCK_DIM_X: i32 = 2;
    pub const MAX_BLOCK_DIM_Y: i32 = 3;
    pub const MAX_BLOCK_DIM_Z: i32 = 4;
    pub const TOTAL_CONSTANT_MEMORY: i32 = 9;
    pub const CLOCK_RATE: i32 = 13;
    pub const MULTIPROCESSOR_COUNT: i32 = 16;
    pub const INTEGRATED: i32 = 18;
    pub const CAN_MAP_HOST_MEMORY: i32 = 19;
    pub const ECC_ENABLED: i32 = 32;
    pub const COMPUTE_CAPABILITY_MAJOR: i32 = 75;
    pub const COMPUTE_CAPABILITY_MINOR: i32 = 76;
    pub const MAX_SHARED_MEMORY_PER_MULTIPROCESSOR: i32 = 81;
}

/// CUDA_MEMCPY3D parameter block for cuMemcpy3D. Field order and types match
/// the driver header; unused array/LOD fields stay zeroed.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Memcpy3D {
    pub src_x_in_bytes: usize,
    pub src_y: usize,
    pub src_z: usize,
    pub src_lod: usize,
    pub src_memory_type: c_uint,
    pub src_host: *const c_void,
    pub src_device: CUdeviceptr,
    pub src_array: CUarray,
    pub reserved0: *mut c_void,
    pub src_pitch: usize,
    pub src_height: usize,
    pub dst_x_in_bytes: usize,
    pub dst_y: usize,
    pub dst_z: usize,
    pub dst_lod: usize,
    pub dst_memory_type: c_uint,
    pub dst_host: *mut c_void,
    pub dst_device: CUdeviceptr,
    pub dst_array: CUarray,
    pub reserved1: *mut c_void,
    pub dst_pitch: usize,
    pub dst_height: usize,
    pub width_in_bytes: usize,
    pub height: usize,
    pub depth: usize,
}

impl Default for Memcpy3D {
    fn default() -> Self {
        Self {
            src_x_in_bytes: 0,
            src_y: 0,
            src_z: 0,
            src_lod: 0,
            src_memory_type: 0,
            src_host: std::ptr::null(),
            src_device: 0,
            src_array: std::ptr::null_mut(),
            reserved0: std::ptr::null_mut(),
            src_pitch: 0,
            src_height: 0,
            dst_x_in_bytes: 0,
            dst_y: 0,
            dst_z: 0,
            dst_lod: 0,
            dst_memory_type: 0,
            dst_host: std::ptr::null_mut(),
            dst_device: 0,
            dst_array: std::ptr::null_mut(),
            reserved1: std::ptr::null_mut(),
            dst_pitch: 0,
            dst_height: 0,
            width_in_bytes: 0,
            height: 0,
            depth: 0,
        }
    }
}

/// Function pointer type definitions for the CUDA driver API.
type FnCuInit = unsafe extern "C" fn(flags: c_uint) -> CUresult;
type FnCuDriverGetVersion = unsafe extern "C" fn(version: *mut c_int) -> CUresult;
type FnCuDeviceGetCount = unsafe extern "C" fn(count: *mut c_int) -> CUresult;
type FnCuDeviceGet = unsafe extern "C" fn(device: *mut CUdevice, ordinal: c_int) -> CUresult;
type FnCuDeviceGetName =
    unsafe extern "C" fn(name: *mut c_char, len: c_int, dev: CUdevice) -> CUresult;
type FnCuDeviceGetAttribute =
    unsafe extern "C" fn(pi: *mut c_int, attrib: c_int, dev: CUdevice) -> CUresult;

// Context management
type FnCuCtxCreate =
    unsafe extern "C" fn(pctx: *mut CUcontext, flags: c_uint, dev: CUdevice) -> CUresult;
type FnCuCtxDestroy = unsafe extern "C" fn(ctx: CUcontext) -> CUresult;
type FnCuCtxPushCurrent = unsafe extern "C" fn(ctx: CUcontext) -> CUresult;
type FnCuCtxPopCurrent = unsafe extern "C" fn(pctx: *mut CUcontext) -> CUresult;

// Memory management
type FnCuMemGetInfo = unsafe extern "C" fn(free: *mut usize, total: *mut usize) -> CUresult;
type FnCuMemAlloc = unsafe extern "C" fn(dptr: *mut CUdeviceptr, bytesize: usize) -> CUresult;
type FnCuMemFree = unsafe extern "C" fn(dptr: CUdeviceptr) -> CUresult;
type FnCuMemHostAlloc =
    unsafe extern "C" fn(pp: *mut *mut c_void, bytesize: usize, flags: c_uint) -> CUresult;
type FnCuMemFreeHost = unsafe extern "C" fn(p: *mut c_void) -> CUresult;
type FnCuMemHostRegister =
    unsafe extern "C" fn(p: *mut c_void, bytesize: usize, flags: c_uint) -> CUresult;
type FnCuMemHostUnregister = unsafe extern "C" fn(p: *mut c_void) -> CUresult;
type FnCuMemHostGetDevicePointer =
    unsafe extern "C" fn(pdptr: *mut CUdeviceptr, p: *mut c_void, flags: c_uint) -> CUresult;
type FnCuMemcpyHtoD =
    unsafe extern "C" fn(dst: CUdeviceptr, src: *const c_void, byte_count: usize) -> CUresult;
type FnCuMemcpyDtoH =
    unsafe extern "C" fn(dst: *mut c_void, src: CUdeviceptr, byte_count: usize) -> CUresult;
type FnCuMemcpyDtoD =
    unsafe extern "C" fn(dst: CUdeviceptr, src: CUdeviceptr, byte_count: usize) -> CUresult;
type FnCuMemcpy3D = unsafe extern "C" fn(params: *const Memcpy3D) -> CUresult;

// Module management
type FnCuModuleLoad = unsafe extern "C" fn(module: *mut CUmodule, fname: *const c_char) -> CUresult;
type FnCuModuleGetFunction = unsafe extern "C" fn(
    hfunc: *mut CUfunction,
    hmod: CUmodule,
    name: *const c_char,
) -> CUresult;

// Execution
type FnCuLaunchKernel = unsafe extern "C" fn(
    f: CUfunction,
    grid_dim_x: c_uint,
    grid_dim_y: c_uint,
    grid_dim_z: c_uint,
    block_dim_x: c_uint,
    block_dim_y: c_uint,
    block_dim_z: c_uint,
    shared_mem_bytes: c_uint,
    hstream: CUstream,
    kernel_params: *mut *mut c_void,
    extra: *mut *mut c_void,
) -> CUresult;
type FnCuStreamSynchronize = unsafe extern "C" fn(hstream: CUstream) -> CUresult;

// Error strings
type FnCuGetErrorName =
    unsafe extern "C" fn(error: CUresult, p_str: *mut *const c_char) -> CUresult;
type FnCuGetErrorString =
    unsafe extern "C" fn(error: CUresult, p_str: *mut *const c_char) -> CUresult;

/// Dynamically loaded CUDA driver library with resolved function pointers.
pub struct CudaDriver {
    _lib: Library,
    cu_init: FnCuInit,
    cu_driver_get_version: FnCuDriverGetVersion,
    cu_device_get_count: FnCuDeviceGetCount,
    cu_device_get: FnCuDeviceGet,
    cu_device_get_name: FnCuDeviceGetName,
    cu_device_get_attribute: FnCuDeviceGetAttribute,
    cu_ctx_create: FnCuCtxCreate,
    cu_ctx_destroy: FnCuCtxDestroy,
    cu_ctx_push_current: FnCuCtxPushCurrent,
    cu_ctx_pop_current: FnCuCtxPopCurrent,
    cu_mem_get_info: FnCuMemGetInfo,
    cu_mem_alloc: FnCuMemAlloc,
    cu_mem_free: FnCuMemFree,
    cu_mem_host_alloc: FnCuMemHostAlloc,
    cu_mem_free_host: FnCuMemFreeHost,
    cu_mem_host_register: FnCuMemHostRegister,
    cu_mem_host_unregister: FnCuMemHostUnregister,
    cu_mem_host_get_device_pointer: FnCuMemHostGetDevicePointer,
    cu_memcpy_htod: FnCuMemcpyHtoD,
    cu_memcpy_dtoh: FnCuMemcpyDtoH,
    cu_memcpy_dtod: FnCuMemcpyDtoD,
    cu_memcpy_3d: FnCuMemcpy3D,
    cu_module_load: FnCuModuleLoad,
    cu_module_get_function: FnCuModuleGetFunction,
    cu_launch_kernel: FnCuLaunchKernel,
    cu_stream_synchronize: FnCuStreamSynchronize,
    cu_get_error_name: Option<FnCuGetErrorName>,
    cu_get_error_string: Option<FnCuGetErrorString>,
}

// SAFETY: The CUDA driver library handles are valid from any thread.
// The driver API itself handles thread safety via context management.
unsafe impl Send for CudaDriver {}
unsafe impl Sync for CudaDriver {}

impl CudaDriver {
    /// Load the CUDA driver library and resolve the function pointers this
    /// backend uses.
    pub fn load() -> Result<Arc<Self>, String> {
        let lib = Self::load_library()?;

        unsafe {
            let driver = Self {
                cu_init: Self::load_fn(&lib, "cuInit")?,
                cu_driver_get_version: Self::load_fn(&lib, "cuDriverGetVersion")?,
                cu_device_get_count: Self::load_fn(&lib, "cuDeviceGetCount")?,
                cu_device_get: Self::load_fn(&lib, "cuDeviceGet")?,
                cu_device_get_name: Self::load_fn(&lib, "cuDeviceGetName")?,
                cu_device_get_attribute: Self::load_fn(&lib, "cuDeviceGetAttribute")?,
                cu_ctx_create: Self::load_fn(&lib, "cuCtxCreate_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuCtxCreate"))?,
                cu_ctx_destroy: Self::load_fn(&lib, "cuCtxDestroy_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuCtxDestroy"))?,
                cu_ctx_push_current: Self::load_fn(&lib, "cuCtxPushCurrent_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuCtxPushCurrent"))?,
                cu_ctx_pop_current: Self::load_fn(&lib, "cuCtxPopCurrent_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuCtxPopCurrent"))?,
                cu_mem_get_info: Self::load_fn(&lib, "cuMemGetInfo_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemGetInfo"))?,
                cu_mem_alloc: Self::load_fn(&lib, "cuMemAlloc_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemAlloc"))?,
                cu_mem_free: Self::load_fn(&lib, "cuMemFree_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemFree"))?,
                cu_mem_host_alloc: Self::load_fn(&lib, "cuMemHostAlloc")?,
                cu_mem_free_host: Self::load_fn(&lib, "cuMemFreeHost")?,
                cu_mem_host_register: Self::load_fn(&lib, "cuMemHostRegister_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemHostRegister"))?,
                cu_mem_host_unregister: Self::load_fn(&lib, "cuMemHostUnregister")?,
                cu_mem_host_get_device_pointer: Self::load_fn(&lib, "cuMemHostGetDevicePointer_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemHostGetDevicePointer"))?,
                cu_memcpy_htod: Self::load_fn(&lib, "cuMemcpyHtoD_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemcpyHtoD"))?,
                cu_memcpy_dtoh: Self::load_fn(&lib, "cuMemcpyDtoH_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemcpyDtoH"))?,
                cu_memcpy_dtod: Self::load_fn(&lib, "cuMemcpyDtoD_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemcpyDtoD"))?,
                cu_memcpy_3d: Self::load_fn(&lib, "cuMemcpy3D_v2")
                    .or_else(|_| Self::load_fn(&lib, "cuMemcpy3D"))?,
                cu_module_load: Self::load_fn(&lib, "cuModuleLoad")?,
                cu_module_get_function: Self::load_fn(&lib, "cuModuleGetFunction")?,
                cu_launch_kernel: Self::load_fn(&lib, "cuLaunchKernel")?,
                cu_stream_synchronize: Self::load_fn(&lib, "cuStreamSynchronize")?,
                cu_get_error_name: Self::load_fn_opt(&lib, "cuGetErrorName"),
                cu_get_error_string: Self::load_fn_opt(&lib, "cuGetErrorString"),
                _lib: lib,
            };

            info!("CUDA driver loaded");
            Ok(Arc::new(driver))
        }
    }

    fn load_library() -> Result<Library, String> {
        #[cfg(target_os = "windows")]
        let lib_names: &[&str] = &["nvcuda.dll"];

        #[cfg(target_os = "linux")]
        let lib_names: &[&str] = &["libcuda.so.1", "libcuda.so"];

        #[cfg(target_os = "macos")]
        let lib_names: &[&str] = &["libcuda.dylib"];

        let mut last_err = String::new();
        for name in lib_names {
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    info!("loaded CUDA driver from: {}", name);
                    return Ok(lib);
                }
                Err(e) => {
                    last_err = format!("{}: {}", name, e);
                    debug!("failed to load {}: {}", name, e);
                }
            }
        }

        Err(format!("failed to load CUDA driver library: {}", last_err))
    }

    unsafe fn load_fn<F: Copy>(lib: &Library, name: &str) -> Result<F, String> {
        let sym: Symbol<F> = unsafe { lib.get(name.as_bytes()) }
            .map_err(|e| format!("failed to load {}: {}", name, e))?;
        Ok(*sym)
    }

    unsafe fn load_fn_opt<F: Copy>(lib: &Library, name: &str) -> Option<F> {
        unsafe { lib.get(name.as_bytes()) }.ok().map(|s: Symbol<F>| *s)
    }

    // ── Error reporting ───────────────────────────────────────────

    /// Name of a driver error code, e.g. "CUDA_ERROR_OUT_OF_MEMORY".
    pub fn error_name(&self, result: CUresult) -> String {
        if let Some(func) = self.cu_get_error_name {
            let mut p: *const c_char = std::ptr::null();
            if unsafe { func(result, &mut p) } == CUDA_SUCCESS && !p.is_null() {
                return unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned();
            }
        }
        format!("CUDA_ERROR_{result}")
    }

    /// Human-readable description of a driver error code.
    pub fn error_string(&self, result: CUresult) -> String {
        if let Some(func) = self.cu_get_error_string {
            let mut p: *const c_char = std::ptr::null();
            if unsafe { func(result, &mut p) } == CUDA_SUCCESS && !p.is_null() {
                return unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned();
            }
        }
        "unknown error".to_string()
    }

    /// Abort with the driver's error name and description. After a failure
    /// in this class the execution context is presumed invalid; there is
    /// nothing to recover.
    pub fn die(&self, result: CUresult, api: &str) -> ! {
        error!(
            "{} failed: {}: {}",
            api,
            self.error_name(result),
            self.error_string(result)
        );
        std::process::abort();
    }

    /// Fatal-check a driver call: anything but success aborts via [`die`].
    ///
    /// [`die`]: CudaDriver::die
    pub fn check(&self, result: CUresult, api: &str) {
        if result != CUDA_SUCCESS {
            self.die(result, api);
        }
    }

    // ── Initialization / device queries ───────────────────────────

    pub fn init(&self, flags: u32) -> CUresult {
        unsafe { (self.cu_init)(flags as c_uint) }
    }

    pub fn driver_get_version(&self) -> Result<i32, CUresult> {
        let mut version: c_int = 0;
        let res = unsafe { (self.cu_driver_get_version)(&mut version) };
        if res == CUDA_SUCCESS { Ok(version) } else { Err(res) }
    }

    pub fn device_get_count(&self) -> Result<i32, CUresult> {
        let mut count: c_int = 0;
        let res = unsafe { (self.cu_device_get_count)(&mut count) };
        if res == CUDA_SUCCESS { Ok(count) } else { Err(res) }
    }

    pub fn device_get(&self, ordinal: i32) -> Result<CUdevice, CUresult> {
        let mut device: CUdevice = 0;
        let res = unsafe { (self.cu_device_get)(&mut device, ordinal) };
        if res == CUDA_SUCCESS { Ok(device) } else { Err(res) }
    }

    pub fn device_get_name(&self, device: CUdevice) -> Result<String, CUresult> {
        let mut buf = [0u8; 256];
        let res = unsafe {
            (self.cu_device_get_name)(buf.as_mut_ptr() as *mut c_char, 256, device)
        };
        if res == CUDA_SUCCESS {
            let name = unsafe { CStr::from_ptr(buf.as_ptr() as *const c_char) };
            Ok(name.to_string_lossy().into_owned())
        } else {
            Err(res)
        }
    }

    pub fn device_get_attribute(&self, attrib: i32, device: CUdevice) -> Result<i32, CUresult> {
        let mut value: c_int = 0;
        let res = unsafe { (self.cu_device_get_attribute)(&mut value, attrib, device) };
        if res == CUDA_SUCCESS { Ok(value) } else { Err(res) }
    }

    // ── Context management ────────────────────────────────────────

    pub fn ctx_create(&self, flags: u32, device: CUdevice) -> Result<CUcontext, CUresult> {
        let mut ctx: CUcontext = std::ptr::null_mut();
        let res = unsafe { (self.cu_ctx_create)(&mut ctx, flags as c_uint, device) };
        if res == CUDA_SUCCESS { Ok(ctx) } else { Err(res) }
    }

    pub fn ctx_destroy(&self, ctx: CUcontext) -> CUresult {
        unsafe { (self.cu_ctx_destroy)(ctx) }
    }

    pub fn ctx_push_current(&self, ctx: CUcontext) -> CUresult {
        unsafe { (self.cu_ctx_push_current)(ctx) }
    }

    pub fn ctx_pop_current(&self) -> Result<CUcontext, CUresult> {
        let mut ctx: CUcontext = std::ptr::null_mut();
        let res = unsafe { (self.cu_ctx_pop_current)(&mut ctx) };
        if res == CUDA_SUCCESS { Ok(ctx) } else { Err(res) }
    }

    // ── Memory management ─────────────────────────────────────────

    pub fn mem_get_info(&self) -> Result<(usize, usize), CUresult> {
        let mut free: usize = 0;
        let mut total: usize = 0;
        let res = unsafe { (self.cu_mem_get_info)(&mut free, &mut total) };
        if res == CUDA_SUCCESS { Ok((free, total)) } else { Err(res) }
    }

    pub fn mem_alloc(&self, bytesize: usize) -> Result<CUdeviceptr, CUresult> {
        let mut dptr: CUdeviceptr = 0;
        let res = unsafe { (self.cu_mem_alloc)(&mut dptr, bytesize) };
        if res == CUDA_SUCCESS { Ok(dptr) } else { Err(res) }
    }

    pub fn mem_free(&self, dptr: CUdeviceptr) -> CUresult {
        unsafe { (self.cu_mem_free)(dptr) }
    }

    pub fn mem_host_alloc(&self, bytesize: usize, flags: u32) -> Result<*mut c_void, CUresult> {
        let mut p: *mut c_void = std::ptr::null_mut();
        let res = unsafe { (self.cu_mem_host_alloc)(&mut p, bytesize, flags as c_uint) };
        if res == CUDA_SUCCESS { Ok(p) } else { Err(res) }
    }

    pub fn mem_free_host(&self, p: *mut c_void) -> CUresult {
        unsafe { (self.cu_mem_free_host)(p) }
    }

    /// Page-lock an existing host range.
    ///
    /// # Safety
    /// `p` must point to a live host allocation of at least `bytesize` bytes.
    pub unsafe fn mem_host_register(&self, p: *mut c_void, bytesize: usize, flags: u32) -> CUresult {
        unsafe { (self.cu_mem_host_register)(p, bytesize, flags as c_uint) }
    }

    /// # Safety
    /// `p` must have been registered with [`mem_host_register`].
    ///
    /// [`mem_host_register`]: CudaDriver::mem_host_register
    pub unsafe fn mem_host_unregister(&self, p: *mut c_void) -> CUresult {
        unsafe { (self.cu_mem_host_unregister)(p) }
    }

    /// # Safety
    /// `p` must be page-locked host memory obtained or registered with the
    /// device-map flag.
    pub unsafe fn mem_host_get_device_pointer(
        &self,
        p: *mut c_void,
        flags: u32,
    ) -> Result<CUdeviceptr, CUresult> {
        let mut dptr: CUdeviceptr = 0;
        let res = unsafe { (self.cu_mem_host_get_device_pointer)(&mut dptr, p, flags as c_uint) };
        if res == CUDA_SUCCESS { Ok(dptr) } else { Err(res) }
    }

    /// # Safety
    /// `src` must be readable for `byte_count` bytes.
    pub unsafe fn memcpy_htod(
        &self,
        dst: CUdeviceptr,
        src: *const c_void,
        byte_count: usize,
    ) -> CUresult {
        unsafe { (self.cu_memcpy_htod)(dst, src, byte_count) }
    }

    /// # Safety
    /// `dst` must be writable for `byte_count` bytes.
    pub unsafe fn memcpy_dtoh(
        &self,
        dst: *mut c_void,
        src: CUdeviceptr,
        byte_count: usize,
    ) -> CUresult {
        unsafe { (self.cu_memcpy_dtoh)(dst, src, byte_count) }
    }

    pub fn memcpy_dtod(&self, dst: CUdeviceptr, src: CUdeviceptr, byte_count: usize) -> CUresult {
        unsafe { (self.cu_memcpy_dtod)(dst, src, byte_count) }
    }

    /// # Safety
    /// Host addresses referenced by `params` must cover the described region.
    pub unsafe fn memcpy_3d(&self, params: &Memcpy3D) -> CUresult {
        unsafe { (self.cu_memcpy_3d)(params) }
    }

    // ── Module / execution ────────────────────────────────────────

    pub fn module_load(&self, path: &Path) -> Result<CUmodule, CUresult> {
        let c_path = CString::new(path.to_string_lossy().as_bytes()).map_err(|_| 1)?;
        let mut module: CUmodule = std::ptr::null_mut();
        let res = unsafe { (self.cu_module_load)(&mut module, c_path.as_ptr()) };
        if res == CUDA_SUCCESS { Ok(module) } else { Err(res) }
    }

    pub fn module_get_function(&self, module: CUmodule, name: &str) -> Result<CUfunction, CUresult> {
        let c_name = CString::new(name).map_err(|_| 1)?;
        let mut func: CUfunction = std::ptr::null_mut();
        let res = unsafe { (self.cu_module_get_function)(&mut func, module, c_name.as_ptr()) };
        if res == CUDA_SUCCESS { Ok(func) } else { Err(res) }
    }

    /// # Safety
    /// `params` entries must point at live argument storage matching the
    /// function's signature.
    pub unsafe fn launch_kernel(
        &self,
        f: CUfunction,
        grid_dim: [u32; 3],
        block_dim: [u32; 3],
        shared_mem_bytes: u32,
        stream: CUstream,
        params: &mut [*mut c_void],
    ) -> CUresult {
        unsafe {
            (self.cu_launch_kernel)(
                f,
                grid_dim[0],
                grid_dim[1],
                grid_dim[2],
                block_dim[0],
                block_dim[1],
                block_dim[2],
                shared_mem_bytes,
                stream,
                params.as_mut_ptr(),
                std::ptr::null_mut(),
            )
        }
    }

    pub fn stream_synchronize(&self, stream: CUstream) -> CUresult {
        unsafe { (self.cu_stream_synchronize)(stream) }
    }
}
