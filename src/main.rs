//! tilepipe — run one of the fixed GPU pipeline variants.
//!
//! ```bash
//! # Tiled 512x512x512 matmul
//! tilepipe matmul
//!
//! # Linear chain: matmul -> ReLU -> softmax
//! tilepipe linear
//!
//! # Self-attention chain: QK^T -> softmax -> xV
//! tilepipe attention
//! ```

use clap::{Parser, Subcommand};
use std::process;

use tilepipe::{logging, DeviceClass, GpuContext, PipelineError, PipelineExecutor};

#[derive(Parser)]
#[command(name = "tilepipe")]
#[command(version = "0.1.0")]
#[command(about = "GPU linear-algebra pipeline runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tiled matrix multiply, M=K=N=512
    Matmul,
    /// Linear chain (matmul -> ReLU -> softmax), M=4 K=128 N=64
    Linear,
    /// Self-attention chain, L=4 D=64
    Attention,
}

fn main() {
    logging::init_from_env();
    let cli = Cli::parse();
    if let Err(err) = run(cli.command) {
        log::error!("{err}");
        eprintln!("FAILURE: {err}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<(), PipelineError> {
    let ctx = GpuContext::acquire(DeviceClass::Gpu)?;
    println!("Device: {}", ctx.adapter_name());
    let mut executor = PipelineExecutor::new(ctx);

    match command {
        Command::Matmul => {
            let report = executor.run_tiled_matmul(512, 512, 512, 1.0, 2.0)?;
            println!("C[0] = {} (expected 1024)", report.sample);
            verdict((report.sample - 1024.0).abs() < 1e-3);
        }
        Command::Linear => {
            let report = executor.run_linear(4, 128, 64, 1.0, -0.5)?;
            let row0 = report.row_sums.as_ref().map_or(0.0, |sums| sums[0]);
            println!("Result[0]: {} (expected ~0.0156)", report.sample);
            println!("Sum of Row 0: {row0} (expected 1.0)");
            verdict(report.sample > 0.0 && (row0 - 1.0).abs() < 1e-3);
        }
        Command::Attention => {
            let report = executor.run_attention(4, 64, 1.0, 1.0, 2.0)?;
            println!("Attention Result[0]: {} (expected ~2.0)", report.sample);
            verdict((report.sample - 2.0).abs() < 0.1);
        }
    }
    Ok(())
}

fn verdict(ok: bool) {
    if ok {
        println!("SUCCESS: Pipeline Complete.");
    } else {
        println!("FAILURE: Check logic.");
        process::exit(1);
    }
}
