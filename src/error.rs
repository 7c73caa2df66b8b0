//! Error taxonomy for the pipeline runtime.
//!
//! Every fallible step fails fast: a failed build or a mis-bound argument is
//! a configuration defect, so there is no retry anywhere in the crate. The
//! executor wraps errors with the failing stage name before they reach the
//! caller.

use crate::kernels::KernelFamily;

/// Errors surfaced by the pipeline runtime.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No compute platform (adapter) could be enumerated at all.
    #[error("no compute platform available")]
    PlatformUnavailable,

    /// Adapters exist, but none matched the requested device class, or the
    /// selected adapter refused to hand out a device.
    #[error("no capable compute device available")]
    DeviceUnavailable,

    /// The kernel source provider had no text for the requested family.
    #[error("kernel source missing for `{family}`")]
    KernelSourceMissing { family: KernelFamily },

    /// Device-side module build failed. The log is the underlying compiler
    /// diagnostic, preserved verbatim.
    #[error("kernel build failed:\n{log}")]
    Compile { log: String },

    /// The named entry point is absent from the compiled module. This is a
    /// user-facing configuration error, not a crash.
    #[error("entry point `{name}` not found in compiled module")]
    SymbolNotFound { name: String },

    /// Declared buffer size disagrees with the supplied host data.
    #[error("buffer declared {declared} bytes but host data is {actual} bytes")]
    SizeMismatch { declared: usize, actual: usize },

    /// Device buffers have their size fixed at creation; zero is not a size.
    #[error("device buffer size must be non-zero")]
    ZeroSizeBuffer,

    /// An argument slot was still unbound at enqueue time.
    #[error("argument slot {slot} unbound at enqueue")]
    InvalidArgument { slot: usize },

    /// Unrecoverable device-level failure (lost device, failed read-back).
    #[error("device execution fault: {0}")]
    DeviceExecutionFault(String),

    /// Context wrapper naming the pipeline stage that failed.
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Attach the name of the failing stage.
    pub fn in_stage(self, stage: &str) -> Self {
        PipelineError::Stage {
            stage: stage.to_string(),
            source: Box::new(self),
        }
    }
}
