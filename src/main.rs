mod cache;
mod config;
mod cpu;
mod isa;
mod memory;
mod replace;
mod trace;

use std::{
    fs,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use color_eyre::eyre::{self, WrapErr};

use cache::{Cache, IsCache};
use config::Config;
use cpu::Cpu;
use memory::Memory;
use replace::lru::Lru;
use trace::Printer;

const USAGE: &str =
    "usage: cachesim <machine-code file> [<blockSizeInWords> <numberOfSets> <blocksPerSet>] \
     [--config <json> | -p <path>] [-i <max instructions>] [--json <stats path>] [-q] [--dump]";

/// Cache shape from `--config <json>`, else `-p <path>`, else the three
/// positional arguments after the program file.
fn read_config(args: &mut pico_args::Arguments) -> eyre::Result<Config> {
    let config_str: Option<String> = args.opt_value_from_str("--config")?;
    let config_path: Option<PathBuf> = args.opt_value_from_str("-p")?;
    let config = match (config_str, config_path) {
        (Some(config_str), _) => serde_json::from_str(&config_str)?,
        (None, Some(config_path)) => {
            let config_str = fs::read_to_string(&config_path)
                .wrap_err_with(|| format!("could not read config {}", config_path.display()))?;
            serde_json::from_str(&config_str)?
        }
        (None, None) => Config {
            block_size: args.free_from_str().wrap_err(USAGE)?,
            sets: args.free_from_str().wrap_err(USAGE)?,
            ways: args.free_from_str().wrap_err(USAGE)?,
        },
    };
    Ok(config)
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let mut args = pico_args::Arguments::from_env();
    let n_instr: u64 = args
        .opt_value_from_str("-i")
        .wrap_err("-i should be an integer")?
        .unwrap_or(1_000_000);
    let quiet = args.contains("-q");
    let dump = args.contains("--dump");
    let stats_path: Option<PathBuf> = args.opt_value_from_str("--json")?;
    let program_path: PathBuf = args.free_from_str().wrap_err(USAGE)?;
    let config = read_config(&mut args)?;
    let remaining = args.finish();
    if !remaining.is_empty() {
        eyre::bail!("unexpected arguments {:?}\n{}", remaining, USAGE);
    }

    let geometry = config.validate()?;
    log::info!(
        "{} sets x {} ways of {} words",
        geometry.n_sets(),
        geometry.n_ways(),
        geometry.block_size()
    );

    let mut mem = Memory::read(&program_path)
        .wrap_err_with(|| format!("can't open file {}", program_path.display()))?;
    log::info!("loaded {} words", mem.program_len());

    let out: Box<dyn Write> = if quiet {
        Box::new(io::sink())
    } else {
        Box::new(BufWriter::new(io::stdout()))
    };
    let mut cache: Cache<Lru, _> = Cache::new("L1".to_string(), geometry, Printer::new(out));
    let mut cpu = Cpu::new();

    let result = cpu.run(&mut cache, &mut mem, n_instr);
    cache.trace.flush()?;
    result?;

    if dump {
        let mut stdout = io::stdout().lock();
        cache.dump(&mut stdout)?;
        stdout.flush()?;
    }

    let stats = cache.make_stats(cpu.instr_idx);
    log::debug!("{:?}", stats);
    // stdout carries the transfer trace
    eprintln!("Ran {} instructions", cpu.instr_idx);
    if let Some(stats_path) = stats_path {
        let stats_file = fs::File::create(&stats_path)
            .wrap_err_with(|| format!("cannot open output file {}", stats_path.display()))?;
        serde_json::to_writer_pretty(stats_file, &stats)?;
    }
    Ok(())
}
