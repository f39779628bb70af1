// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! `prts`: assemble, disassemble and run PixelRTS program images.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prts::{
    vm::{Vm, VmConfig},
    Grid,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod image_io;

#[derive(Parser)]
#[command(name = "prts")]
#[command(author, version, about = "PixelRTS assembler, disassembler and VM", long_about = None)]
struct Cli {
    /// Increase logging (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble source text into a PNG program image
    Assemble {
        #[arg(value_name = "SRC")]
        source: PathBuf,

        #[arg(short, long, value_name = "OUT.png")]
        output: PathBuf,
    },
    /// Print (or write) the assembly of a program image
    Disassemble {
        #[arg(value_name = "IMG")]
        image: PathBuf,

        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },
    /// Execute a program, given as source text or as a `.png` image
    Run {
        #[arg(value_name = "SRC|IMG.png")]
        program: PathBuf,

        /// Give up after this many instructions (0 for no limit)
        #[arg(long, env = "PRTS_MAX_STEPS", default_value = "100000")]
        max_steps: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Assemble { source, output } => {
            let grid = assemble_file(&source)?;
            let side = grid.side();
            image_io::save_grid(grid, &output)?;
            info!(side, output = %output.display(), "wrote program image");
        }
        Command::Disassemble { image, output } => {
            let grid = image_io::load_grid(&image)?;
            let source = prts::disassemble(&grid).with_context(|| {
                format!("failed to disassemble {}", image.display())
            })?;
            match output {
                Some(path) => fs::write(&path, source + "\n")
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{}", source),
            }
        }
        Command::Run { program, max_steps } => {
            let grid = if is_image(&program) {
                image_io::load_grid(&program)?
            } else {
                assemble_file(&program)?
            };

            let config = VmConfig {
                max_steps: (max_steps > 0).then_some(max_steps),
            };
            let mut vm = Vm::new(grid).with_config(config);
            vm.run()
                .with_context(|| format!("failed to run {}", program.display()))?;

            for (register, value) in vm.registers().iter() {
                if value != 0 {
                    println!("r{:<2} = {} (0x{:08X})", register, value, value);
                }
            }
            let flags = vm.flags();
            println!("flags: zero={} negative={}", flags.zero, flags.negative);
            println!("steps: {}", vm.steps());
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_directive = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn assemble_file(path: &Path) -> Result<Grid> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    prts::assemble(&source)
        .with_context(|| format!("failed to assemble {}", path.display()))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("png"))
}
