//! Load a program into the main bank and read it back, without running the chip.  This is the
//! first check on a new board: if the words come back unchanged the scan chain works.
//!
//! Usage: scan_roundtrip <program.hex> [board.toml]
//!
//! Set `SCAN_SIM=1` to run against the simulated chip instead of the FT2232H adapter.
use anyhow::{bail, Context};
use scan_chain::clock::StdClock;
use scan_chain::config::BoardConfig;
use scan_chain::engine::{LoadImage, ReadLength, ScanChain, UnloadLengths};
use scan_chain::gpio::mpsse::MpsseGpioBank;
use scan_chain::gpio::sim::SimulatedChip;
use scan_chain::gpio::{GpioBank, StdDelay};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scan_chain=info".parse()?))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(program) = args.next() else {
        bail!("usage: scan_roundtrip <program.hex> [board.toml]");
    };
    let config = match args.next() {
        Some(path) => BoardConfig::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => BoardConfig::default(),
    };

    let gpio: Box<dyn GpioBank> = if std::env::var_os("SCAN_SIM").is_some() {
        Box::new(SimulatedChip::new(&config.layout))
    } else {
        Box::new(MpsseGpioBank::open("Dual RS232-HS A", "Dual RS232-HS B", config.pinout.clone())?)
    };
    let mut chain = ScanChain::from_config(gpio, StdDelay, &config)?.with_clock(StdClock::default());

    let image = LoadImage::from_hex_dump_files(&config.layout, &program, None)
        .with_context(|| format!("reading {program}"))?;
    chain.clear_inputs()?;
    let written = chain.load_session(image)?;

    let out = chain.unload_session(UnloadLengths {
        main: ReadLength::from(Some(written.main.len() as u32)),
        ..Default::default()
    })?;

    if out.main == written.main {
        println!("main bank matches: {} words", written.main.len());
    } else {
        let first = written
            .main
            .iter()
            .zip(&out.main)
            .position(|(a, b)| a != b)
            .unwrap_or(written.main.len().min(out.main.len()));
        bail!(
            "main bank mismatch at word {first}: wrote {:#010x?}, read {:#010x?}",
            written.main.get(first),
            out.main.get(first)
        );
    }
    Ok(())
}
