//! Kernel invocation: positional argument binding and asynchronous enqueue.
//!
//! Binding follows the builder contract: `bind` associates a positional slot
//! with a buffer or scalar and is idempotent, and `enqueue` validates the
//! whole table at once so a forgotten slot fails in one place instead of
//! scattering return-code checks across call sites.

use std::collections::BTreeMap;
use std::rc::Rc;

use wgpu::util::DeviceExt;

use crate::buffer::DeviceBuffer;
use crate::context::{CompletionToken, GpuContext};
use crate::error::PipelineError;
use crate::kernels::KernelSpec;
use crate::plan::WorkPlan;

/// A value bound to one positional argument slot.
#[derive(Debug, Clone)]
pub enum Arg {
    Buffer(Rc<DeviceBuffer>),
    Scalar(u32),
}

/// Host-side positional binding table for one kernel.
///
/// Slot indices mirror the kernel signature. Buffers occupy storage bindings
/// in slot order; scalars pack in slot order into a single trailing uniform.
#[derive(Debug)]
pub struct ArgTable {
    arity: usize,
    slots: BTreeMap<usize, Arg>,
}

impl ArgTable {
    pub fn new(arity: usize) -> Self {
        ArgTable {
            arity,
            slots: BTreeMap::new(),
        }
    }

    /// Bind `arg` to `slot`. Re-binding a slot overwrites the previous
    /// value. The slot must lie below the declared arity; a stray slot
    /// would otherwise shift the positional packing.
    pub fn bind(&mut self, slot: usize, arg: Arg) {
        debug_assert!(
            slot < self.arity,
            "slot {slot} out of range for arity {}",
            self.arity
        );
        self.slots.insert(slot, arg);
    }

    /// First unbound slot below the declared arity, if any.
    pub fn first_unbound(&self) -> Option<usize> {
        (0..self.arity).find(|slot| !self.slots.contains_key(slot))
    }

    /// Bound buffers in slot order.
    fn buffers(&self) -> Vec<&Rc<DeviceBuffer>> {
        self.slots
            .values()
            .filter_map(|arg| match arg {
                Arg::Buffer(buf) => Some(buf),
                Arg::Scalar(_) => None,
            })
            .collect()
    }

    /// Bound scalars in slot order.
    fn scalars(&self) -> Vec<u32> {
        self.slots
            .values()
            .filter_map(|arg| match arg {
                Arg::Scalar(v) => Some(*v),
                Arg::Buffer(_) => None,
            })
            .collect()
    }
}

/// A compiled kernel entry point with its argument bindings, ready to be
/// enqueued with a work-dimension plan.
#[derive(Debug)]
pub struct KernelInvocation {
    spec: KernelSpec,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    args: ArgTable,
}

impl KernelInvocation {
    pub(crate) fn new(
        spec: KernelSpec,
        pipeline: wgpu::ComputePipeline,
        layout: wgpu::BindGroupLayout,
    ) -> Self {
        let arity = spec.arity();
        KernelInvocation {
            spec,
            pipeline,
            layout,
            args: ArgTable::new(arity),
        }
    }

    /// Entry point this invocation dispatches.
    pub fn entry_point(&self) -> &'static str {
        self.spec.entry_point
    }

    /// Bind a buffer or scalar to a positional slot (idempotent).
    pub fn bind(&mut self, slot: usize, arg: Arg) -> &mut Self {
        self.args.bind(slot, arg);
        self
    }

    /// Submit the kernel for asynchronous execution under `plan`.
    ///
    /// Fails with [`PipelineError::InvalidArgument`] if any slot below the
    /// kernel arity is unbound. Returns a completion token; the work may
    /// still be executing when this returns.
    pub fn enqueue(
        &self,
        ctx: &GpuContext,
        plan: &WorkPlan,
    ) -> Result<CompletionToken, PipelineError> {
        if let Some(slot) = self.args.first_unbound() {
            return Err(PipelineError::InvalidArgument { slot });
        }

        let buffers = self.args.buffers();
        let scalars = self.args.scalars();

        let mut entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buf.raw().as_entire_binding(),
            })
            .collect();

        // Scalars share one uniform binding after the storage buffers. A
        // lone scalar binds as u32, several pad out to a vec4<u32>.
        let uniform = if scalars.is_empty() {
            None
        } else {
            let mut packed = scalars;
            if packed.len() > 1 {
                packed.resize(4, 0);
            }
            Some(
                ctx.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("tilepipe_params"),
                        contents: bytemuck::cast_slice(&packed),
                        usage: wgpu::BufferUsages::UNIFORM,
                    }),
            )
        };
        if let Some(params) = &uniform {
            entries.push(wgpu::BindGroupEntry {
                binding: buffers.len() as u32,
                resource: params.as_entire_binding(),
            });
        }

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.spec.entry_point),
            layout: &self.layout,
            entries: &entries,
        });

        let counts = plan.workgroup_counts(self.spec.default_local);
        log::debug!(
            "enqueue `{}`: global {:?}, local {:?}, workgroups {:?}",
            self.spec.entry_point,
            plan.global,
            plan.local,
            counts
        );

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(self.spec.entry_point),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(self.spec.entry_point),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(counts[0], counts[1], counts[2]);
        }
        let index = ctx.queue.submit(std::iter::once(encoder.finish()));

        Ok(CompletionToken(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_slots_are_reported_lowest_first() {
        let mut table = ArgTable::new(3);
        assert_eq!(table.first_unbound(), Some(0));
        table.bind(0, Arg::Scalar(1));
        table.bind(2, Arg::Scalar(3));
        assert_eq!(table.first_unbound(), Some(1));
        table.bind(1, Arg::Scalar(2));
        assert_eq!(table.first_unbound(), None);
    }

    #[test]
    fn rebinding_a_slot_overwrites() {
        let mut table = ArgTable::new(1);
        table.bind(0, Arg::Scalar(7));
        table.bind(0, Arg::Scalar(9));
        assert_eq!(table.scalars(), vec![9]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn binding_past_the_arity_is_rejected() {
        let mut table = ArgTable::new(2);
        table.bind(2, Arg::Scalar(1));
    }

    #[test]
    fn scalars_pack_in_slot_order() {
        let mut table = ArgTable::new(4);
        // Bound out of order; packing must follow slot indices.
        table.bind(3, Arg::Scalar(0));
        table.bind(1, Arg::Scalar(64));
        table.bind(0, Arg::Scalar(4));
        table.bind(2, Arg::Scalar(128));
        assert_eq!(table.scalars(), vec![4, 64, 128, 0]);
    }
}
