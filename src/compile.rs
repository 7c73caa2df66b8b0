//! Kernel module compilation: WGSL source text into validated device
//! modules, with compiler diagnostics surfaced verbatim.

use crate::context::GpuContext;
use crate::error::PipelineError;
use crate::invoke::KernelInvocation;
use crate::kernels::KernelSpec;

/// Source text built into an executable module for one device.
#[derive(Debug)]
pub struct CompiledModule {
    module: wgpu::ShaderModule,
    label: String,
}

impl CompiledModule {
    /// Build `source` against the context's device.
    ///
    /// A failed device-side build surfaces [`PipelineError::Compile`] with
    /// the underlying compiler log.
    pub fn build(ctx: &GpuContext, source: &str, label: &str) -> Result<Self, PipelineError> {
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(PipelineError::Compile {
                log: err.to_string(),
            });
        }

        log::debug!("compiled module `{label}`");
        Ok(CompiledModule {
            module,
            label: label.to_string(),
        })
    }

    /// Resolve the entry point named by `spec` into an invocable kernel.
    ///
    /// A missing or renamed entry point is a configuration error surfaced
    /// as [`PipelineError::SymbolNotFound`], never a crash.
    pub fn kernel(
        &self,
        ctx: &GpuContext,
        spec: &KernelSpec,
    ) -> Result<KernelInvocation, PipelineError> {
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(spec.entry_point),
                layout: None,
                module: &self.module,
                entry_point: Some(spec.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });
        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            log::debug!(
                "pipeline creation for `{}` in module `{}` failed: {err}",
                spec.entry_point,
                self.label
            );
            return Err(PipelineError::SymbolNotFound {
                name: spec.entry_point.to_string(),
            });
        }

        let layout = pipeline.get_bind_group_layout(0);
        Ok(KernelInvocation::new(spec.clone(), pipeline, layout))
    }
}
