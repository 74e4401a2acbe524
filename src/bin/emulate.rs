use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use riscv64sim::{Hart, Memory};

/// Run a hex memory image on the RV64I simulator core.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a hex memory image (see the image-loader format)
    image: PathBuf,

    /// Number of instructions to execute
    #[arg(short, long, default_value_t = 1_000_000)]
    steps: u32,

    /// Halt at this address instead of running the full step count
    /// (accepts a `0x`-prefixed or bare hex address)
    #[arg(short, long)]
    breakpoint: Option<String>,

    /// Dump all 32 general-purpose registers after execution
    #[arg(short, long)]
    dump_registers: bool,

    /// Print the PC of every retired instruction as it runs
    #[arg(long)]
    trace: bool,
}

fn parse_hex_address(text: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(text.trim_start_matches("0x"), 16)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut memory = Memory::new();
    let loaded = match memory.load_image(&args.image) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("failed to load {}: {err}", args.image.display());
            return ExitCode::FAILURE;
        }
    };

    let mut hart = Hart::new();
    hart.set_pc(loaded.start_address);

    if let Some(text) = &args.breakpoint {
        match parse_hex_address(text) {
            Ok(addr) => hart.set_breakpoint(addr),
            Err(_) => {
                eprintln!("invalid breakpoint address: {text}");
                return ExitCode::FAILURE;
            }
        }
    }

    if args.trace {
        for _ in 0..args.steps {
            if args.breakpoint.is_some() && Some(hart.pc()) == hart.breakpoint_address() {
                println!("Breakpoint reached at {:016x}", hart.pc());
                break;
            }
            println!("trace: pc={:016x}", hart.pc());
            hart.step(&mut memory);
        }
    } else {
        hart.execute(args.steps, args.breakpoint.is_some(), &mut memory);
    }

    print!("pc: ");
    hart.show_pc();
    print!("prv: ");
    hart.show_prv();
    println!("instructions retired: {}", hart.get_instruction_count());

    if args.dump_registers {
        for i in 0..32u8 {
            print!("x{i:<2} = ");
            hart.show_reg(i);
        }
    }

    ExitCode::SUCCESS
}
