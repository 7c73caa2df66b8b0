//! tilepipe — host-side runtime for a small GPU linear-algebra pipeline.
//!
//! Drives a chain of WGSL compute kernels (tiled matmul, ReLU, row softmax,
//! and a two-matmul self-attention composition) over `wgpu`. The work is in
//! the plumbing, not the arithmetic: device selection, runtime module
//! compilation with surfaced diagnostics, buffer allocation and binding,
//! tile-padded work-dimension planning, and hard completion barriers
//! between data-dependent stages.
//!
//! # Example
//!
//! ```no_run
//! use tilepipe::{DeviceClass, GpuContext, PipelineExecutor};
//!
//! let ctx = GpuContext::acquire(DeviceClass::Gpu)?;
//! let mut executor = PipelineExecutor::new(ctx);
//! let report = executor.run_linear(4, 128, 64, 1.0, -0.5)?;
//! println!("output[0] = {}", report.sample);
//! # Ok::<(), tilepipe::PipelineError>(())
//! ```

pub mod buffer;
pub mod compile;
pub mod context;
pub mod error;
pub mod invoke;
pub mod kernels;
pub mod logging;
pub mod matrix;
pub mod pipeline;
pub mod plan;

pub use buffer::{AccessMode, DeviceBuffer};
pub use compile::CompiledModule;
pub use context::{CompletionToken, DeviceClass, GpuContext};
pub use error::PipelineError;
pub use invoke::{Arg, KernelInvocation};
pub use kernels::{BuiltinKernels, KernelFamily, KernelSource, KernelSpec};
pub use matrix::Matrix;
pub use pipeline::{PipelineExecutor, PipelineReport};
pub use plan::{padded_global, WorkPlan, TILE_EDGE};
