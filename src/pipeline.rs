//! Pipeline executor: sequences data-dependent kernel stages with explicit
//! completion barriers and validates results on read-back.
//!
//! A stage moves `Pending -> Enqueued -> Completed`. A stage is enqueued
//! only after every producer of its input buffers has *completed*, never
//! merely been enqueued: within one queue, submission order is FIFO but
//! completion order is not guaranteed across independently enqueued
//! kernels, so the executor waits on the producer's completion token
//! instead of trusting issue order. Read-back likewise only happens after
//! the terminal stage completes.

use std::collections::HashMap;
use std::rc::Rc;

use crate::buffer::{AccessMode, DeviceBuffer};
use crate::compile::CompiledModule;
use crate::context::{CompletionToken, GpuContext};
use crate::error::PipelineError;
use crate::invoke::{Arg, KernelInvocation};
use crate::kernels::{self, BuiltinKernels, KernelFamily, KernelSource};
use crate::matrix::Matrix;
use crate::plan::{WorkPlan, TILE_EDGE};

/// Host-side result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// The terminal stage's output, read back after completion.
    pub output: Matrix,
    /// Sampled output value (element 0), the smoke diagnostic.
    pub sample: f32,
    /// Per-row sums, populated for softmax-terminated pipelines.
    pub row_sums: Option<Vec<f32>>,
}

enum StageState {
    Enqueued(CompletionToken),
    Completed,
}

/// One pipeline stage: a bound kernel invocation, its dispatch plan, and
/// the buffer ids it reads and writes. Buffer ids are indices local to one
/// chain; an in-place stage lists the same id as read and write.
struct Stage {
    name: &'static str,
    invocation: KernelInvocation,
    plan: WorkPlan,
    reads: Vec<usize>,
    writes: usize,
}

/// Orchestrates stage invocations against one device context.
///
/// An explicit instance, constructed with its context: independent
/// executors (and their pipelines) can coexist in one process. Compiled
/// modules are cached per family for the executor's lifetime.
pub struct PipelineExecutor {
    ctx: GpuContext,
    kernels: Box<dyn KernelSource>,
    modules: HashMap<KernelFamily, CompiledModule>,
}

impl PipelineExecutor {
    /// Executor using the crate's embedded kernel sources.
    pub fn new(ctx: GpuContext) -> Self {
        Self::with_kernels(ctx, Box::new(BuiltinKernels))
    }

    /// Executor with a custom kernel source provider.
    pub fn with_kernels(ctx: GpuContext, kernels: Box<dyn KernelSource>) -> Self {
        PipelineExecutor {
            ctx,
            kernels,
            modules: HashMap::new(),
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Tiled matmul only: C (m x n) = A (m x k) x B (k x n), constant fills.
    ///
    /// Dimensions need not be tile multiples; the plan pads the grid and
    /// the kernel bounds-checks.
    pub fn run_tiled_matmul(
        &mut self,
        m: usize,
        k: usize,
        n: usize,
        fill_a: f32,
        fill_b: f32,
    ) -> Result<PipelineReport, PipelineError> {
        let a = Matrix::filled(m, k, fill_a);
        let b = Matrix::filled(k, n, fill_b);

        let d_a = self.input_buffer(&a, "matmul")?;
        let d_b = self.input_buffer(&b, "matmul")?;
        let d_c = self.output_buffer(m * n, AccessMode::WriteOnly, "matmul")?;

        let mut matmul = self.kernel(KernelFamily::MatMul)?;
        matmul
            .bind(0, Arg::Buffer(d_a))
            .bind(1, Arg::Buffer(d_b))
            .bind(2, Arg::Buffer(d_c.clone()))
            .bind(3, Arg::Scalar(m as u32))
            .bind(4, Arg::Scalar(n as u32))
            .bind(5, Arg::Scalar(k as u32))
            .bind(6, Arg::Scalar(0));

        self.run_chain(vec![Stage {
            name: "matmul",
            invocation: matmul,
            plan: WorkPlan::tiled(n as u32, m as u32, TILE_EDGE),
            reads: vec![0, 1],
            writes: 2,
        }])?;

        let output = self.read_back(&d_c, m, n)?;
        Ok(PipelineReport {
            sample: output.as_slice()[0],
            row_sums: None,
            output,
        })
    }

    /// Linear chain: matmul -> ReLU -> row softmax, the activation and
    /// softmax mutating the matmul output in place.
    pub fn run_linear(
        &mut self,
        m: usize,
        k: usize,
        n: usize,
        fill_input: f32,
        fill_weights: f32,
    ) -> Result<PipelineReport, PipelineError> {
        let input = Matrix::filled(m, k, fill_input);
        let weights = Matrix::filled(k, n, fill_weights);

        let d_input = self.input_buffer(&input, "matmul")?;
        let d_weights = self.input_buffer(&weights, "matmul")?;
        let d_output = self.output_buffer(m * n, AccessMode::ReadWrite, "matmul")?;

        let mut matmul = self.kernel(KernelFamily::MatMul)?;
        matmul
            .bind(0, Arg::Buffer(d_input))
            .bind(1, Arg::Buffer(d_weights))
            .bind(2, Arg::Buffer(d_output.clone()))
            .bind(3, Arg::Scalar(m as u32))
            .bind(4, Arg::Scalar(n as u32))
            .bind(5, Arg::Scalar(k as u32))
            .bind(6, Arg::Scalar(0));

        let mut relu = self.kernel(KernelFamily::Relu)?;
        relu.bind(0, Arg::Buffer(d_output.clone()))
            .bind(1, Arg::Scalar((m * n) as u32));

        let mut softmax = self.kernel(KernelFamily::Softmax)?;
        softmax
            .bind(0, Arg::Buffer(d_output.clone()))
            .bind(1, Arg::Scalar(n as u32));

        self.run_chain(vec![
            Stage {
                name: "matmul",
                invocation: matmul,
                plan: WorkPlan::tiled(n as u32, m as u32, TILE_EDGE),
                reads: vec![0, 1],
                writes: 2,
            },
            Stage {
                name: "relu",
                invocation: relu,
                plan: WorkPlan::linear((m * n) as u32),
                reads: vec![2],
                writes: 2,
            },
            Stage {
                name: "softmax",
                invocation: softmax,
                plan: WorkPlan::linear(m as u32),
                reads: vec![2],
                writes: 2,
            },
        ])?;

        let output = self.read_back(&d_output, m, n)?;
        Ok(PipelineReport {
            sample: output.as_slice()[0],
            row_sums: Some(output.row_sums()),
            output,
        })
    }

    /// Self-attention chain: scores = Q x K^T, row softmax over scores in
    /// place, then output = scores x V.
    pub fn run_attention(
        &mut self,
        seq_len: usize,
        embed_dim: usize,
        fill_q: f32,
        fill_k: f32,
        fill_v: f32,
    ) -> Result<PipelineReport, PipelineError> {
        let l = seq_len;
        let d = embed_dim;
        let q = Matrix::filled(l, d, fill_q);
        let k_mat = Matrix::filled(l, d, fill_k);
        let v = Matrix::filled(l, d, fill_v);

        let d_q = self.input_buffer(&q, "scores")?;
        let d_k = self.input_buffer(&k_mat, "scores")?;
        let d_v = self.input_buffer(&v, "output")?;
        let d_scores = self.output_buffer(l * l, AccessMode::ReadWrite, "scores")?;
        let d_output = self.output_buffer(l * d, AccessMode::WriteOnly, "output")?;

        let mut scores = self.kernel(KernelFamily::MatMul)?;
        scores
            .bind(0, Arg::Buffer(d_q))
            .bind(1, Arg::Buffer(d_k))
            .bind(2, Arg::Buffer(d_scores.clone()))
            .bind(3, Arg::Scalar(l as u32))
            .bind(4, Arg::Scalar(l as u32))
            .bind(5, Arg::Scalar(d as u32))
            .bind(6, Arg::Scalar(1));

        let mut softmax = self.kernel(KernelFamily::Softmax)?;
        softmax
            .bind(0, Arg::Buffer(d_scores.clone()))
            .bind(1, Arg::Scalar(l as u32));

        let mut output = self.kernel(KernelFamily::MatMul)?;
        output
            .bind(0, Arg::Buffer(d_scores.clone()))
            .bind(1, Arg::Buffer(d_v))
            .bind(2, Arg::Buffer(d_output.clone()))
            .bind(3, Arg::Scalar(l as u32))
            .bind(4, Arg::Scalar(d as u32))
            .bind(5, Arg::Scalar(l as u32))
            .bind(6, Arg::Scalar(0));

        self.run_chain(vec![
            Stage {
                name: "scores",
                invocation: scores,
                plan: WorkPlan::tiled(l as u32, l as u32, TILE_EDGE),
                reads: vec![0, 1],
                writes: 3,
            },
            Stage {
                name: "softmax",
                invocation: softmax,
                plan: WorkPlan::linear(l as u32),
                reads: vec![3],
                writes: 3,
            },
            Stage {
                name: "output",
                invocation: output,
                plan: WorkPlan::tiled(d as u32, l as u32, TILE_EDGE),
                reads: vec![3, 2],
                writes: 4,
            },
        ])?;

        let result = self.read_back(&d_output, l, d)?;
        Ok(PipelineReport {
            sample: result.as_slice()[0],
            row_sums: None,
            output: result,
        })
    }

    /// Enqueue each stage in order, waiting on the completion token of any
    /// still-in-flight producer of its inputs (or of the buffer it
    /// overwrites) before submission, and on everything before returning.
    fn run_chain(&self, stages: Vec<Stage>) -> Result<(), PipelineError> {
        let mut states: Vec<StageState> = Vec::with_capacity(stages.len());
        let mut last_writer: HashMap<usize, usize> = HashMap::new();

        for (i, stage) in stages.iter().enumerate() {
            for &buf in stage.reads.iter().chain(std::iter::once(&stage.writes)) {
                let Some(&producer) = last_writer.get(&buf) else {
                    continue;
                };
                if let StageState::Enqueued(token) = &states[producer] {
                    log::debug!(
                        "barrier: `{}` waits on `{}`",
                        stage.name,
                        stages[producer].name
                    );
                    self.ctx.wait(token);
                    states[producer] = StageState::Completed;
                }
            }

            log::info!("launching stage `{}`", stage.name);
            let token = stage
                .invocation
                .enqueue(&self.ctx, &stage.plan)
                .map_err(|err| err.in_stage(stage.name))?;
            states.push(StageState::Enqueued(token));
            last_writer.insert(stage.writes, i);
        }

        // Terminal barrier: the caller reads back right after this.
        for (i, state) in states.iter_mut().enumerate() {
            if let StageState::Enqueued(token) = state {
                log::debug!("final wait on `{}`", stages[i].name);
                self.ctx.wait(token);
                *state = StageState::Completed;
            }
        }
        Ok(())
    }

    fn input_buffer(
        &self,
        matrix: &Matrix,
        stage: &str,
    ) -> Result<Rc<DeviceBuffer>, PipelineError> {
        DeviceBuffer::allocate(
            &self.ctx,
            matrix.byte_len(),
            AccessMode::ReadOnly,
            Some(matrix.as_bytes()),
        )
        .map(Rc::new)
        .map_err(|err| err.in_stage(stage))
    }

    fn output_buffer(
        &self,
        elements: usize,
        mode: AccessMode,
        stage: &str,
    ) -> Result<Rc<DeviceBuffer>, PipelineError> {
        DeviceBuffer::allocate(
            &self.ctx,
            elements * std::mem::size_of::<f32>(),
            mode,
            None,
        )
        .map(Rc::new)
        .map_err(|err| err.in_stage(stage))
    }

    fn read_back(
        &self,
        buffer: &DeviceBuffer,
        rows: usize,
        cols: usize,
    ) -> Result<Matrix, PipelineError> {
        let bytes = buffer
            .download(&self.ctx)
            .map_err(|err| err.in_stage("read-back"))?;
        Matrix::from_bytes(rows, cols, &bytes)
    }

    /// Compile (or fetch the cached module for) `family` and resolve its
    /// entry point.
    fn kernel(&mut self, family: KernelFamily) -> Result<KernelInvocation, PipelineError> {
        self.ensure_module(family)?;
        let spec = kernels::spec(family);
        self.modules[&family]
            .kernel(&self.ctx, &spec)
            .map_err(|err| err.in_stage(family.name()))
    }

    fn ensure_module(&mut self, family: KernelFamily) -> Result<(), PipelineError> {
        if self.modules.contains_key(&family) {
            return Ok(());
        }
        let source = self
            .kernels
            .source(family)
            .ok_or(PipelineError::KernelSourceMissing { family })
            .map_err(|err| err.in_stage(family.name()))?;
        let module = CompiledModule::build(&self.ctx, &source, family.name())
            .map_err(|err| err.in_stage(family.name()))?;
        self.modules.insert(family, module);
        Ok(())
    }
}
