//! Device context: adapter selection, device + queue lifetime, host waits.

use crate::error::PipelineError;

/// Capability class used to filter enumerated adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Discrete, integrated, or virtual GPU adapters only (the default).
    Gpu,
    /// Any adapter, including CPU fallbacks. Used by tests so they can run
    /// on software rasterizers.
    Any,
}

impl DeviceClass {
    fn matches(self, device_type: wgpu::DeviceType) -> bool {
        match self {
            DeviceClass::Any => true,
            DeviceClass::Gpu => matches!(
                device_type,
                wgpu::DeviceType::DiscreteGpu
                    | wgpu::DeviceType::IntegratedGpu
                    | wgpu::DeviceType::VirtualGpu
            ),
        }
    }
}

/// Opaque handle for a submitted batch of device work. Waiting on it blocks
/// the host until that submission has completed on the device.
#[derive(Debug, Clone)]
pub struct CompletionToken(pub(crate) wgpu::SubmissionIndex);

/// One live device plus its command queue.
///
/// All buffers and kernels used together must be created against the same
/// context. Submission order on the queue is FIFO, but completion is
/// asynchronous relative to the host: the only ordering the host may rely
/// on comes from [`GpuContext::wait`] / [`GpuContext::wait_all`].
pub struct GpuContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    adapter_name: String,
}

impl GpuContext {
    /// Enumerate compute platforms and acquire the first device matching
    /// `class`.
    ///
    /// Fails with [`PipelineError::PlatformUnavailable`] when no adapters
    /// exist at all, and [`PipelineError::DeviceUnavailable`] when none
    /// matches the requested class (or the adapter refuses a device).
    pub fn acquire(class: DeviceClass) -> Result<Self, PipelineError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(wgpu::Backends::all());
        if adapters.is_empty() {
            return Err(PipelineError::PlatformUnavailable);
        }

        let adapter = adapters
            .into_iter()
            .find(|a| class.matches(a.get_info().device_type))
            .ok_or(PipelineError::DeviceUnavailable)?;

        let info = adapter.get_info();
        log::info!(
            "selected device: {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("tilepipe"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        ))
        .map_err(|err| {
            log::error!("device request failed: {err}");
            PipelineError::DeviceUnavailable
        })?;

        Ok(GpuContext {
            device,
            queue,
            adapter_name: info.name,
        })
    }

    /// Name of the adapter backing this context.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Block until the submission behind `token` has completed.
    pub fn wait(&self, token: &CompletionToken) {
        let _ = self
            .device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(token.0.clone()));
    }

    /// Block until all previously enqueued work on the queue has completed.
    pub fn wait_all(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}
