//! Onyx CLI — run a raw DSP56300 program image under the recompiler.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use onyx::{Core, Jit};

#[derive(Parser)]
#[command(name = "onyx", about = "DSP56300 dynamic recompiler", version)]
struct Cli {
    /// Raw program image: little-endian u32 per 24-bit word.
    image: PathBuf,

    /// Entry program counter.
    #[arg(long, default_value_t = 0)]
    entry: u32,

    /// Number of compiled units to execute.
    #[arg(long, default_value_t = 1024)]
    steps: usize,

    /// Program/data memory size in words.
    #[arg(long, default_value_t = 0x4000)]
    mem_words: usize,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("onyx=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(pc) => {
            println!("stopped at pc {pc:#08x}");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> onyx::Result<u32> {
    let data = std::fs::read(&cli.image)?;
    let words: Vec<u32> = data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()) & 0x00FF_FFFF)
        .collect();

    let mut core = Core::new(cli.mem_words);
    core.mem.load_program(0, &words);
    let mut jit = Jit::new(core);
    jit.run(cli.entry, cli.steps)
}
