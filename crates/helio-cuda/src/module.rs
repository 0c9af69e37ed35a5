//! Kernel artifact loading: on first launch of a kernel on a device, turn
//! the cached work-group IR artifact into a loaded, launch-ready function,
//! invoking external code generation when no module exists on disk yet.
//! Resolved functions are cached in the kernel's device slot for the rest of
//! the process; modules are never unloaded.

use std::io;
use std::path::{Path, PathBuf};
use std::process;

use tracing::{error, info};

use helio_core::cache;
use helio_core::config::CudaConfig;
use helio_core::kernel::{Kernel, NativeFunction};

use crate::context::DeviceContext;

/// External code generation: produce a native module at `out` from the IR
/// artifact at `ir`, for one kernel and target architecture.
pub trait PtxGenerator: Send + Sync {
    fn generate(&self, ir: &Path, out: &Path, kernel_name: &str, arch: &str) -> io::Result<()>;
}

/// Production generator: shells out to the configured executable.
pub struct ToolGenerator {
    tool: PathBuf,
}

impl ToolGenerator {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }
}

impl PtxGenerator for ToolGenerator {
    fn generate(&self, ir: &Path, out: &Path, kernel_name: &str, arch: &str) -> io::Result<()> {
        let status = process::Command::new(&self.tool)
            .arg(ir)
            .arg("-o")
            .arg(out)
            .arg("--kernel")
            .arg(kernel_name)
            .arg("--arch")
            .arg(arch)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "{} exited with {status}",
                self.tool.display()
            )))
        }
    }
}

/// Ensures a compiled, launch-ready function exists per (kernel, device).
pub struct KernelLoader {
    cache_dir: PathBuf,
    generator: Box<dyn PtxGenerator>,
}

impl KernelLoader {
    pub fn new(config: &CudaConfig) -> Self {
        let cache_dir = config
            .cache_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(helio_common::platform::default_cache_dir);
        let tool = config.ptxgen.clone().unwrap_or_else(|| "helio-ptxgen".to_string());
        Self {
            cache_dir,
            generator: Box::new(ToolGenerator::new(tool)),
        }
    }

    /// Loader with an explicit generator (tests, embedders).
    pub fn with_generator(cache_dir: impl Into<PathBuf>, generator: Box<dyn PtxGenerator>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            generator,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Launch-ready function for (kernel, device). First use walks
    /// unloaded → artifact-on-disk? → generate → load module → resolve
    /// function → cached; later uses short-circuit on the kernel's device
    /// slot. Generation and load failures are fatal: there is no fallback
    /// kernel representation.
    pub fn load_or_generate(&self, ctx: &DeviceContext, kernel: &Kernel) -> NativeFunction {
        if let Some(function) = kernel.artifact(ctx.index) {
            return function;
        }

        let _current = ctx.make_current();

        let ir_path = cache::work_group_function_path(
            &self.cache_dir,
            &kernel.program,
            ctx.index,
            &kernel.name,
            (0, 0, 0),
        );
        let module_path = cache::module_path(&ir_path);

        if !module_path.exists() {
            info!(kernel = %kernel.name, arch = %ctx.arch, "generating native module");
            if let Err(e) =
                self.generator
                    .generate(&ir_path, &module_path, &kernel.name, &ctx.arch)
            {
                error!(kernel = %kernel.name, "code generation failed: {e}");
                std::process::abort();
            }
        }

        let drv = ctx.driver();
        let module = drv
            .module_load(&module_path)
            .unwrap_or_else(|e| drv.die(e, "cuModuleLoad"));
        let function = drv
            .module_get_function(module, &kernel.name)
            .unwrap_or_else(|e| drv.die(e, "cuModuleGetFunction"));

        kernel.artifact_or_insert(
            ctx.index,
            NativeFunction {
                module: module as usize,
                function: function as usize,
            },
        )
    }
}
