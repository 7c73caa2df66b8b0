//! Device buffer allocation, upload, and blocking read-back.

use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::error::PipelineError;

/// Declared access mode of a device buffer, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Written once from the host, read by kernels.
    ReadOnly,
    /// Written by kernels, read back to the host.
    WriteOnly,
    /// Mutated in place by successive kernels and read back.
    ReadWrite,
}

impl AccessMode {
    fn usages(self) -> wgpu::BufferUsages {
        match self {
            AccessMode::ReadOnly => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            AccessMode::WriteOnly => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            AccessMode::ReadWrite => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST
            }
        }
    }
}

/// Device-resident memory region with a byte size fixed at creation.
///
/// Owned by the [`GpuContext`] it was created against; must not be used with
/// any other context.
#[derive(Debug)]
pub struct DeviceBuffer {
    buffer: wgpu::Buffer,
    byte_size: usize,
    mode: AccessMode,
}

impl DeviceBuffer {
    /// Allocate `byte_size` bytes of device memory, optionally initialized
    /// from host data.
    ///
    /// `byte_size` must be non-zero. When `init` is supplied its length
    /// must equal `byte_size`; a disagreement fails with
    /// [`PipelineError::SizeMismatch`].
    pub fn allocate(
        ctx: &GpuContext,
        byte_size: usize,
        mode: AccessMode,
        init: Option<&[u8]>,
    ) -> Result<Self, PipelineError> {
        if byte_size == 0 {
            return Err(PipelineError::ZeroSizeBuffer);
        }

        let buffer = match init {
            Some(data) => {
                if data.len() != byte_size {
                    return Err(PipelineError::SizeMismatch {
                        declared: byte_size,
                        actual: data.len(),
                    });
                }
                ctx.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("tilepipe_buffer"),
                        contents: data,
                        usage: mode.usages(),
                    })
            }
            None => ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tilepipe_buffer"),
                size: byte_size as u64,
                usage: mode.usages(),
                mapped_at_creation: false,
            }),
        };

        Ok(DeviceBuffer {
            buffer,
            byte_size,
            mode,
        })
    }

    /// Overwrite the buffer contents from host data. Blocking with respect
    /// to subsequent kernel reads (the queue orders the transfer before any
    /// later submission).
    pub fn upload(&self, ctx: &GpuContext, data: &[u8]) -> Result<(), PipelineError> {
        if data.len() != self.byte_size {
            return Err(PipelineError::SizeMismatch {
                declared: self.byte_size,
                actual: data.len(),
            });
        }
        ctx.queue.write_buffer(&self.buffer, 0, data);
        Ok(())
    }

    /// Read the full buffer back to the host. Always blocking.
    ///
    /// The pipeline executor only calls this after the producing stage has
    /// completed; calling it on a buffer with in-flight writers reads an
    /// unspecified intermediate state.
    pub fn download(&self, ctx: &GpuContext) -> Result<Vec<u8>, PipelineError> {
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tilepipe_staging"),
            size: self.byte_size as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tilepipe_readback"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, self.byte_size as u64);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = ctx.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {
                let data = slice.get_mapped_range().to_vec();
                staging.unmap();
                Ok(data)
            }
            Ok(Err(err)) => Err(PipelineError::DeviceExecutionFault(format!(
                "read-back mapping failed: {err}"
            ))),
            Err(_) => Err(PipelineError::DeviceExecutionFault(
                "read-back completion never signaled".to_string(),
            )),
        }
    }

    /// Byte size fixed at creation.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Declared access mode.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub(crate) fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}
