//! CUDA execution backend for the Helio compute runtime.
//!
//! Takes device-independent command nodes (memory transfers, kernel
//! launches) produced by the upstream command-queue scheduler and executes
//! them against one CUDA device through the driver API, loaded dynamically
//! at runtime. One synchronous command at a time per device context; kernel
//! modules are generated on first use by an external PTX generator and
//! cached on disk and in-process thereafter.

pub mod context;
pub mod driver;
pub mod executor;
pub mod module;

mod copy;
mod launch;
mod memory;

pub use context::{DeviceContext, DeviceProperties};
pub use executor::CudaDevice;
pub use module::{KernelLoader, PtxGenerator, ToolGenerator};
