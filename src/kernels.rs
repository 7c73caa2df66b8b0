//! Kernel families, their WGSL sources, and their binding signatures.
//!
//! Kernel bodies are opaque compilable text as far as the executor is
//! concerned: it resolves entry points by exact name and binds positional
//! argument slots per [`KernelSpec`]. Sources reach the executor through the
//! [`KernelSource`] provider; path lookup or fallback schemes belong to a
//! provider implementation, never to the pipeline.

use std::fmt;

/// Logical kernel module, one per compiled WGSL module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelFamily {
    MatMul,
    Relu,
    Softmax,
}

impl KernelFamily {
    pub fn name(self) -> &'static str {
        match self {
            KernelFamily::MatMul => "matmul",
            KernelFamily::Relu => "relu",
            KernelFamily::Softmax => "softmax",
        }
    }
}

impl fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binding signature of one kernel entry point.
///
/// Positional slots mirror the kernel signature: buffer slots first, then
/// scalar slots. Buffers become storage bindings in slot order; scalars pack
/// in slot order into one trailing uniform binding.
#[derive(Debug, Clone)]
pub struct KernelSpec {
    pub family: KernelFamily,
    pub entry_point: &'static str,
    pub buffer_slots: usize,
    pub scalar_slots: usize,
    /// Work-group size compiled into the kernel, used for plans that do not
    /// pin a local size.
    pub default_local: [u32; 2],
}

impl KernelSpec {
    /// Total positional argument slots that must be bound before enqueue.
    pub fn arity(&self) -> usize {
        self.buffer_slots + self.scalar_slots
    }
}

/// Signature for a kernel family.
pub fn spec(family: KernelFamily) -> KernelSpec {
    match family {
        // matmul(A, B, C, M, N, K, transpose)
        KernelFamily::MatMul => KernelSpec {
            family,
            entry_point: "matmul",
            buffer_slots: 3,
            scalar_slots: 4,
            default_local: [16, 16],
        },
        // relu_activation(buffer, count)
        KernelFamily::Relu => KernelSpec {
            family,
            entry_point: "relu_activation",
            buffer_slots: 1,
            scalar_slots: 1,
            default_local: [256, 1],
        },
        // softmax_row(buffer, rowWidth)
        KernelFamily::Softmax => KernelSpec {
            family,
            entry_point: "softmax_row",
            buffer_slots: 1,
            scalar_slots: 1,
            default_local: [64, 1],
        },
    }
}

/// Text provider for kernel source. Returns `None` when it has no source
/// for the family, which the executor reports as a configuration error.
pub trait KernelSource {
    fn source(&self, family: KernelFamily) -> Option<String>;
}

/// Serves the WGSL sources embedded in this crate.
pub struct BuiltinKernels;

impl KernelSource for BuiltinKernels {
    fn source(&self, family: KernelFamily) -> Option<String> {
        let src = match family {
            KernelFamily::MatMul => MATMUL_WGSL,
            KernelFamily::Relu => RELU_WGSL,
            KernelFamily::Softmax => SOFTMAX_WGSL,
        };
        Some(src.to_string())
    }
}

/// Tiled matrix multiply: C (MxN) = A (MxK) x B.
///
/// `dims` is (M, N, K, transpose). With transpose = 0, B is KxN row-major;
/// with transpose = 1, B is NxK and read transposed (the Q*K^T case). Both
/// input tiles stage through workgroup memory. Every global load/store is
/// bounds-checked because the dispatch grid is padded up to tile multiples,
/// and no invocation returns before the barriers.
const MATMUL_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> c: array<f32>;
@group(0) @binding(3) var<uniform> dims: vec4<u32>;

var<workgroup> tile_a: array<array<f32, 16>, 16>;
var<workgroup> tile_b: array<array<f32, 16>, 16>;

@compute @workgroup_size(16, 16)
fn matmul(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(local_invocation_id) lid: vec3<u32>,
) {
    let m = dims.x;
    let n = dims.y;
    let k = dims.z;
    let row = gid.y;
    let col = gid.x;

    var acc = 0.0;
    let steps = (k + 15u) / 16u;
    for (var t = 0u; t < steps; t = t + 1u) {
        let a_col = t * 16u + lid.x;
        if (row < m && a_col < k) {
            tile_a[lid.y][lid.x] = a[row * k + a_col];
        } else {
            tile_a[lid.y][lid.x] = 0.0;
        }

        let b_row = t * 16u + lid.y;
        if (b_row < k && col < n) {
            if (dims.w == 0u) {
                tile_b[lid.y][lid.x] = b[b_row * n + col];
            } else {
                tile_b[lid.y][lid.x] = b[col * k + b_row];
            }
        } else {
            tile_b[lid.y][lid.x] = 0.0;
        }

        workgroupBarrier();
        for (var i = 0u; i < 16u; i = i + 1u) {
            acc = fma(tile_a[lid.y][i], tile_b[i][lid.x], acc);
        }
        workgroupBarrier();
    }

    if (row < m && col < n) {
        c[row * n + col] = acc;
    }
}
"#;

/// Elementwise ReLU over the first `count` elements, in place.
const RELU_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<f32>;
@group(0) @binding(1) var<uniform> count: u32;

@compute @workgroup_size(256)
fn relu_activation(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= count) {
        return;
    }
    data[i] = max(data[i], 0.0);
}
"#;

/// Row-wise softmax, one invocation per row, in place.
///
/// Uses the max-subtraction form: naive exponentiation overflows for
/// unbounded inputs.
const SOFTMAX_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<f32>;
@group(0) @binding(1) var<uniform> width: u32;

@compute @workgroup_size(64)
fn softmax_row(@builtin(global_invocation_id) gid: vec3<u32>) {
    let row = gid.x;
    let rows = arrayLength(&data) / width;
    if (row >= rows) {
        return;
    }

    let base = row * width;
    var max_v = data[base];
    for (var i = 1u; i < width; i = i + 1u) {
        max_v = max(max_v, data[base + i]);
    }

    var sum = 0.0;
    for (var i = 0u; i < width; i = i + 1u) {
        let e = exp(data[base + i] - max_v);
        data[base + i] = e;
        sum = sum + e;
    }

    for (var i = 0u; i < width; i = i + 1u) {
        data[base + i] = data[base + i] / sum;
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sources_carry_their_entry_points() {
        let kernels = BuiltinKernels;
        for (family, entry) in [
            (KernelFamily::MatMul, "fn matmul("),
            (KernelFamily::Relu, "fn relu_activation("),
            (KernelFamily::Softmax, "fn softmax_row("),
        ] {
            let src = kernels.source(family).unwrap();
            assert!(src.contains(entry), "{family} missing {entry}");
        }
    }

    #[test]
    fn matmul_source_is_tiled_and_bounds_checked() {
        let src = BuiltinKernels.source(KernelFamily::MatMul).unwrap();
        assert!(src.contains("@workgroup_size(16, 16)"));
        assert!(src.contains("var<workgroup> tile_a"));
        assert!(src.contains("workgroupBarrier()"));
        assert!(src.contains("if (row < m && col < n)"));
    }

    #[test]
    fn softmax_source_subtracts_the_row_max() {
        let src = BuiltinKernels.source(KernelFamily::Softmax).unwrap();
        assert!(src.contains("exp(data[base + i] - max_v)"));
    }

    #[test]
    fn specs_match_the_kernel_signatures() {
        assert_eq!(spec(KernelFamily::MatMul).arity(), 7);
        assert_eq!(spec(KernelFamily::Relu).arity(), 2);
        assert_eq!(spec(KernelFamily::Softmax).arity(), 2);
        assert_eq!(spec(KernelFamily::MatMul).default_local, [16, 16]);
    }
}
