//! The transaction engine.  `ScanChain` sequences resets, chain selection and payload shifting
//! into whole operations on the memory banks, and wraps those into the bring-up session: load the
//! banks, run the program, read the banks back.
//!
//! Every bank transaction starts with a scan reset and runs in test mode.  Nothing is retried: a
//! protocol fault means the shift registers are out of step, and only an explicit
//! [`ScanChain::bus_reset`] brings them back.
use alloc::vec::Vec;
use core::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::bank::{BankKind, ChainId, ChipLayout, MemoryBank};
use crate::clkgen::{self, ClockGenSetting};
use crate::clock::{Clock, PollCounter};
use crate::config::{BoardConfig, ScanTiming};
use crate::error::{Error, Result};
use crate::gpio::{GpioBank, Signal};
use crate::hexdump;
use crate::payload::ScanPayload;
use crate::shift::ScanPort;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Resetting,
    TestMode,
    Selected(ChainId),
    Shifting(ChainId),
    /// A protocol fault happened, the bus needs a reset
    Faulted,
}

/// How many words to read back from a bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadLength {
    /// Do not touch the bank
    #[default]
    Skip,
    /// Every row of the bank
    All,
    /// The first `n` rows.  `Words(0)` reads the whole bank like `All`.
    Words(u32),
}

impl ReadLength {
    fn resolve(self, capacity: u32) -> Option<u32> {
        match self {
            ReadLength::Skip => None,
            ReadLength::All | ReadLength::Words(0) => Some(capacity),
            ReadLength::Words(n) => Some(n),
        }
    }
}

impl From<Option<u32>> for ReadLength {
    /// `None` skips the bank, `Some(0)` reads all of it, `Some(n)` reads `n` words.
    fn from(len: Option<u32>) -> Self {
        match len {
            None => ReadLength::Skip,
            Some(0) => ReadLength::All,
            Some(n) => ReadLength::Words(n),
        }
    }
}

/// Data loaded into the chip before it runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadImage {
    /// Program, loaded into the main bank
    pub main: Vec<u32>,
    /// Optional data for the input bank
    pub input: Option<Vec<u32>>,
}

impl LoadImage {
    /// Build an image from hex dump text, packing bytes into words as `layout` demands.
    pub fn from_hex_dumps(layout: &ChipLayout, main: &str, input: Option<&str>) -> Result<Self> {
        layout.validate()?;
        let bytes_per_word = layout.bytes_per_word();
        let main = hexdump::bytes_to_words(&hexdump::parse(main)?, bytes_per_word);
        let input = match input {
            Some(text) => Some(hexdump::bytes_to_words(&hexdump::parse(text)?, bytes_per_word)),
            None => None,
        };
        Ok(Self { main, input })
    }

    #[cfg(feature = "std")]
    pub fn from_hex_dump_files(
        layout: &ChipLayout,
        main: impl AsRef<std::path::Path>,
        input: Option<&std::path::Path>,
    ) -> Result<Self> {
        let main = std::fs::read_to_string(main)?;
        let input = match input {
            Some(path) => Some(std::fs::read_to_string(path)?),
            None => None,
        };
        Self::from_hex_dumps(layout, &main, input.as_deref())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnloadLengths {
    pub main: ReadLength,
    pub input: ReadLength,
    pub output: ReadLength,
}

/// Words read back from each bank.  Skipped banks are empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Unloaded {
    pub main: Vec<u32>,
    pub input: Vec<u32>,
    pub output: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Program done rose after this long
    Completed(Duration),
    /// Program done was still low when the timeout expired.  The chip may have made partial
    /// progress, the banks can still be read.
    TimedOut(Duration),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// Sole owner of the board's lines.  There must be only one per board: bus selection lives in
/// the hardware, so two engines on the same lines would corrupt each other's transactions.  The
/// type is neither `Clone` nor `Copy` and every operation takes `&mut self`.
///
/// `C` measures how long [`ScanChain::run_program`] has waited.  The default only counts poll
/// intervals; use [`ScanChain::with_clock`] to plug in a real time source.
pub struct ScanChain<B, D, C = PollCounter> {
    port: ScanPort<B, D>,
    layout: ChipLayout,
    timing: ScanTiming,
    state: EngineState,
    clock: C,
}

impl<B: GpioBank, D: DelayNs> ScanChain<B, D> {
    pub fn new(gpio: B, delay: D, layout: ChipLayout, timing: ScanTiming) -> Result<Self> {
        layout.validate()?;
        timing.validate()?;
        tracing::debug!("scan chain engine ready: {:?}", layout);
        Ok(Self {
            port: ScanPort::new(gpio, delay, timing.half_period_ns),
            layout,
            timing,
            state: EngineState::Idle,
            clock: PollCounter::default(),
        })
    }

    pub fn from_config(gpio: B, delay: D, config: &BoardConfig) -> Result<Self> {
        config.pinout.validate()?;
        Self::new(gpio, delay, config.layout, config.timing)
    }
}

impl<B: GpioBank, D: DelayNs, C: Clock> ScanChain<B, D, C> {
    /// Replace the time source used by [`ScanChain::run_program`].
    pub fn with_clock<C2: Clock>(self, clock: C2) -> ScanChain<B, D, C2> {
        ScanChain {
            port: self.port,
            layout: self.layout,
            timing: self.timing,
            state: self.state,
            clock,
        }
    }

    pub fn layout(&self) -> &ChipLayout {
        &self.layout
    }

    pub fn timing(&self) -> &ScanTiming {
        &self.timing
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The target the bus was last pointed at.
    pub fn selected(&self) -> Option<ChainId> {
        self.port.selected()
    }

    pub fn gpio(&mut self) -> &mut B {
        self.port.gpio()
    }

    /// Give the lines back.
    pub fn release(self) -> (B, D) {
        self.port.release()
    }

    /// Drive every chip control line low.
    pub fn clear_inputs(&mut self) -> Result<()> {
        tracing::info!("Clearing inputs to 0");
        self.drive_inputs(false)
    }

    /// Drive every chip control line high.
    pub fn set_inputs(&mut self) -> Result<()> {
        tracing::info!("Setting inputs to 1");
        self.drive_inputs(true)
    }

    fn drive_inputs(&mut self, level: bool) -> Result<()> {
        for signal in Signal::CHIP_INPUTS {
            self.port.set(signal, level)?;
        }
        Ok(())
    }

    /// Clock the chip from the scan clock line so it can be ticked by hand.
    pub fn select_external_clock(&mut self) -> Result<()> {
        tracing::info!("Selecting external clock");
        self.port.set(Signal::ClockSelect, true)
    }

    /// Clock the chip from the on-chip clock generator.
    pub fn select_internal_clock(&mut self) -> Result<()> {
        tracing::info!("Selecting internal clock");
        self.port.set(Signal::ClockSelect, false)
    }

    /// Program the clock generator.  This does not switch the clock mux to it.
    pub fn configure_clock_generator(&mut self, freq_select: u8, ring_osc_select: u8) -> Result<()> {
        let setting = ClockGenSetting::new(freq_select, ring_osc_select)?;
        clkgen::configure(&mut self.port, setting)
    }

    fn fault(&mut self, e: Error) -> Error {
        if e.is_fatal() {
            self.state = EngineState::Faulted;
        }
        e
    }

    fn ensure_synchronized(&self) -> Result<()> {
        if self.state == EngineState::Faulted {
            return Err(Error::Desynchronized);
        }
        Ok(())
    }

    fn scan_reset(&mut self) -> Result<()> {
        self.state = EngineState::Resetting;
        self.port.set(Signal::ScanReset, true)?;
        self.port.pulse(self.timing.reset_cycles)?;
        self.port.set(Signal::ScanReset, false)?;
        self.port.pulse(1)?;
        self.port.forget_selection();
        self.state = EngineState::Idle;
        Ok(())
    }

    /// Reset the scan chain control logic.  This does not clear the data registers of the write
    /// chains, see [`ScanChain::full_chain_clear`].  Also clears a previous protocol fault.
    pub fn bus_reset(&mut self) -> Result<()> {
        tracing::debug!("Resetting scan bus");
        self.scan_reset()
    }

    fn test_mode(&mut self, on: bool) -> Result<()> {
        self.port.set(Signal::TestMode, on)?;
        self.port.pulse(1)?;
        self.state = if on {
            EngineState::TestMode
        } else {
            EngineState::Idle
        };
        Ok(())
    }

    fn select(&mut self, id: ChainId) -> Result<()> {
        self.port.select(id)?;
        self.state = EngineState::Selected(id);
        Ok(())
    }

    fn write_payload(&mut self, id: ChainId, payload: &ScanPayload) -> Result<()> {
        self.state = EngineState::Shifting(id);
        self.port.write_payload(payload)?;
        self.state = EngineState::Selected(id);
        Ok(())
    }

    /// Reset the bus, then flush every target with a disabled payload so none is left half way
    /// through a transaction.
    pub fn full_chain_clear(&mut self) -> Result<()> {
        tracing::debug!("Resetting scan chains");
        self.scan_reset()?;
        self.test_mode(true)?;
        for id in ChainId::all() {
            self.select(id)?;
            self.port.set(Signal::ScanInValid, true)?;
            self.write_payload(id, &ScanPayload::disabled())?;
            self.port.set(Signal::ScanInValid, false)?;
            self.port.pulse(1)?;
        }
        self.test_mode(false)
    }

    /// Write `words` to `kind`, starting at address 0.  Fails before touching the bus if the
    /// words do not fit.  One row stays unusable: a bank of `capacity` rows takes at most
    /// `capacity - 1` words.
    pub fn write_bank(&mut self, kind: BankKind, words: &[u32]) -> Result<()> {
        let bank = *self.layout.bank(kind);
        check_capacity(&bank, words.len())?;
        self.ensure_synchronized()?;
        tracing::debug!("Writing {} words to {:?} bank ({})", words.len(), kind, bank.write_target);

        self.scan_reset()?;
        self.test_mode(true)?;
        self.select(bank.write_target)?;
        self.port.set(Signal::ScanInValid, true)?;
        for (addr, word) in words.iter().enumerate() {
            let payload = ScanPayload::write(addr as u16, *word);
            self.write_payload(bank.write_target, &payload)?;
        }
        self.port.set(Signal::ScanInValid, false)?;
        self.port.pulse(1)?;
        self.test_mode(false)
    }

    /// Read words back from `kind`, starting at address 0.  [`ReadLength::Skip`] returns nothing
    /// and leaves the bus alone.
    ///
    /// Afterwards the bus points at the main bank's write target whichever bank was read: with a
    /// read target selected the chip never raises program done.
    pub fn read_bank(&mut self, kind: BankKind, length: ReadLength) -> Result<Vec<u32>> {
        let bank = *self.layout.bank(kind);
        let Some(count) = length.resolve(bank.capacity) else {
            tracing::debug!("Skip reading {:?} bank", kind);
            return Ok(Vec::new());
        };
        if count > bank.capacity {
            return Err(Error::Capacity {
                bank: kind,
                requested: count as usize,
                capacity: bank.capacity,
            });
        }
        self.ensure_synchronized()?;
        tracing::debug!("Reading {} words from {:?} bank ({})", count, kind, bank.read_target);

        self.scan_reset()?;
        self.test_mode(true)?;
        let mut words = Vec::with_capacity(count as usize);
        for addr in 0..count {
            // point the bank at the row, then read it through the read chain
            self.select(bank.write_target)?;
            self.port.set(Signal::ScanInValid, true)?;
            self.write_payload(bank.write_target, &ScanPayload::address(addr as u16))?;

            self.select(bank.read_target)?;
            self.state = EngineState::Shifting(bank.read_target);
            let bits = match self.port.read_field(self.layout.word_width_bits) {
                Ok(bits) => bits,
                Err(e) => return Err(self.fault(e)),
            };
            words.push(bits.value() as u32);
        }
        self.port.set(Signal::ScanInValid, false)?;
        self.port.pulse(1)?;

        self.select(self.layout.main.write_target)?;
        self.test_mode(false)?;
        Ok(words)
    }

    /// Load the program and input data with the chip held in reset.  Returns what was written.
    pub fn load_session(&mut self, image: LoadImage) -> Result<LoadImage> {
        check_capacity(&self.layout.main, image.main.len())?;
        if let Some(input) = &image.input {
            check_capacity(&self.layout.input, input.len())?;
        }
        tracing::info!("Loading in data");

        self.select_external_clock()?;
        tracing::debug!("Holding the chip in reset while loading data");
        self.port.set(Signal::ChipReset, true)?;

        self.full_chain_clear()?;

        tracing::info!("Loading in main bank data");
        tracing::trace!("main bank data: {:x?}", image.main);
        self.write_bank(BankKind::Main, &image.main)?;

        match &image.input {
            Some(input) => {
                tracing::info!("Loading in input bank data");
                tracing::trace!("input bank data: {:x?}", input);
                self.write_bank(BankKind::Input, input)?;
            }
            None => tracing::info!("No input bank data"),
        }
        Ok(image)
    }

    /// Read the three banks back with the chip held in reset, main first, then input, then
    /// output.
    pub fn unload_session(&mut self, lengths: UnloadLengths) -> Result<Unloaded> {
        tracing::info!("Loading out data");

        self.select_external_clock()?;
        tracing::debug!("Holding the chip in reset while reading data");
        self.port.set(Signal::ChipReset, true)?;

        tracing::info!("Loading out main bank data");
        let main = self.read_bank(BankKind::Main, lengths.main)?;
        tracing::trace!("main bank data: {:x?}", main);

        tracing::info!("Loading out input bank data");
        let input = self.read_bank(BankKind::Input, lengths.input)?;
        tracing::trace!("input bank data: {:x?}", input);

        tracing::info!("Loading out output bank data");
        let output = self.read_bank(BankKind::Output, lengths.output)?;
        tracing::trace!("output bank data: {:x?}", output);

        Ok(Unloaded { main, input, output })
    }

    /// Switch to the internal clock, release reset, and wait for program done.  The clock
    /// generator should be configured and the banks loaded first.
    pub fn run_program(&mut self, timeout: Duration) -> Result<RunOutcome> {
        tracing::info!("Running program");
        self.select_internal_clock()?;
        tracing::debug!("Releasing chip reset");
        self.port.set(Signal::ChipReset, false)?;

        tracing::info!("Waiting for program done signal");
        let poll = self.timing.poll_interval();
        self.clock.restart();
        loop {
            let done = self.port.read(Signal::ProgramDone)?;
            let elapsed = self.clock.elapsed();
            if done {
                tracing::info!("Program completed in {:?}", elapsed);
                return Ok(RunOutcome::Completed(elapsed));
            }
            if elapsed >= timeout {
                tracing::error!("Program did not complete in {:?}", timeout);
                return Ok(RunOutcome::TimedOut(elapsed));
            }
            self.port.delay().delay_us(self.timing.poll_interval_us);
            self.clock.slept(poll);
        }
    }
}

fn check_capacity(bank: &MemoryBank, words: usize) -> Result<()> {
    if words >= bank.capacity as usize {
        return Err(Error::Capacity {
            bank: bank.kind,
            requested: words,
            capacity: bank.capacity,
        });
    }
    Ok(())
}
