//! Backends that do not need a board.
//!
//! [`SimulatedChip`] models the chip side of the scan protocol at pin level: the chain select
//! register, the payload shift register, load and capture strobes, the three memory banks, the
//! clock generator scan register and the program done output.  It is good enough to dry run a
//! whole bring-up session and to inject faults.  [`Recorder`] only records what was driven.
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::bank::{BankKind, ChainId, ChipLayout, MemoryBank};
use crate::error::GpioError;
use crate::gpio::{GpioBank, Signal, SIGNAL_COUNT};
use crate::payload::{Bits, ScanPayload, DATA_BITS, PAYLOAD_BITS};

/// A delay that returns immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

struct SimBank {
    desc: MemoryBank,
    rows: Vec<u32>,
    address: u16,
}

pub struct SimulatedChip {
    levels: [bool; SIGNAL_COUNT],
    ctrl: u8,
    ctrl_pending: bool,
    selected: Option<ChainId>,
    payload: u64,
    banks: Vec<SimBank>,
    out_reg: u32,
    out_index: u32,
    out_active: bool,
    valid_fault_in: Option<u32>,
    clkgen: Vec<bool>,
    cycles_to_done: Option<u32>,
    cycles_run: u32,
    ticks: u64,
}

impl SimulatedChip {
    /// A chip whose banks are sized after `layout` and filled with zeros.
    pub fn new(layout: &ChipLayout) -> Self {
        let banks = layout
            .banks()
            .into_iter()
            .map(|desc| SimBank {
                desc: *desc,
                rows: vec![0; desc.capacity as usize],
                address: 0,
            })
            .collect();
        Self {
            levels: [false; SIGNAL_COUNT],
            ctrl: 0,
            ctrl_pending: false,
            selected: None,
            payload: 0,
            banks,
            out_reg: 0,
            out_index: 0,
            out_active: false,
            valid_fault_in: None,
            clkgen: vec![],
            cycles_to_done: None,
            cycles_run: 0,
            ticks: 0,
        }
    }

    /// Fill every row of every bank with `value`, the content of untouched memory.
    pub fn with_fill(mut self, value: u32) -> Self {
        for bank in &mut self.banks {
            bank.rows.fill(value);
        }
        self
    }

    /// Raise program done after the program has been polled `cycles` times while running.
    /// Without this the program never finishes.
    pub fn finish_after(mut self, cycles: u32) -> Self {
        self.cycles_to_done = Some(cycles);
        self
    }

    /// Make scan out valid read low once, on the `samples`-th sample from now.
    pub fn inject_valid_fault(&mut self, samples: u32) {
        self.valid_fault_in = Some(samples);
    }

    pub fn bank(&self, kind: BankKind) -> &[u32] {
        self.banks
            .iter()
            .find(|b| b.desc.kind == kind)
            .map(|b| b.rows.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected(&self) -> Option<ChainId> {
        self.selected
    }

    /// Scan clock ticks seen so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Bits shifted into the clock generator, in the order they arrived.
    pub fn clock_gen_scan(&self) -> &[bool] {
        &self.clkgen
    }

    pub fn level(&self, signal: Signal) -> bool {
        self.levels[signal.index()]
    }

    fn scan_clock(&mut self) {
        self.ticks += 1;
        if self.level(Signal::ScanReset) {
            self.ctrl = 0;
            self.ctrl_pending = false;
            self.selected = None;
            self.out_active = false;
            return;
        }
        let bit = self.level(Signal::ScanInPayload);
        if self.level(Signal::ChainSelectEnable) {
            self.ctrl = (self.ctrl >> 1) | (bit as u8) << 7;
            self.ctrl_pending = true;
            return;
        }
        if self.ctrl_pending {
            self.selected = ChainId::new(self.ctrl).ok();
            self.ctrl_pending = false;
            self.out_active = false;
            return;
        }
        if !self.level(Signal::TestMode) {
            return;
        }
        if self.level(Signal::ScanRead) {
            self.capture();
            return;
        }
        if self.level(Signal::ScanLoad) {
            self.commit();
            return;
        }
        if self.out_active {
            self.out_index += 1;
            if self.out_index >= DATA_BITS {
                self.out_active = false;
            }
        }
        if self.level(Signal::ScanInValid) {
            self.payload = (self.payload >> 1) | (bit as u64) << (PAYLOAD_BITS - 1);
        }
    }

    fn bank_for(&mut self, target: Option<ChainId>) -> Option<(&mut SimBank, bool)> {
        let target = target?;
        self.banks.iter_mut().find_map(|b| {
            if b.desc.write_target == target {
                Some((b, true))
            } else if b.desc.read_target == target {
                Some((b, false))
            } else {
                None
            }
        })
    }

    fn commit(&mut self) {
        let Some(p) = ScanPayload::decode(Bits::new(self.payload, PAYLOAD_BITS)) else {
            return;
        };
        let selected = self.selected;
        let Some((bank, true)) = self.bank_for(selected) else {
            return;
        };
        if !p.enable {
            return;
        }
        if p.write {
            if let Some(row) = bank.rows.get_mut(p.address as usize) {
                let mut lanes = 0u32;
                for lane in 0..4 {
                    if p.mask.bits() & (1 << lane) != 0 {
                        lanes |= 0xff << (lane * 8);
                    }
                }
                *row = (*row & !lanes) | (p.data & lanes);
            }
        }
        bank.address = p.address;
    }

    fn capture(&mut self) {
        let selected = self.selected;
        let word = match self.bank_for(selected) {
            Some((bank, false)) => bank.rows.get(bank.address as usize).copied(),
            _ => None,
        };
        match word {
            Some(word) => {
                self.out_reg = word;
                self.out_index = 0;
                self.out_active = true;
            }
            None => self.out_active = false,
        }
    }

    fn program_done(&mut self) -> bool {
        // held in reset, or still on the external clock
        if self.level(Signal::ChipReset) || self.level(Signal::ClockSelect) {
            return false;
        }
        // done never rises while the bus points at a read target
        if let Some((_, false)) = self.bank_for(self.selected) {
            return false;
        }
        match self.cycles_to_done {
            Some(cycles) if self.cycles_run >= cycles => true,
            Some(_) => {
                self.cycles_run += 1;
                false
            }
            None => false,
        }
    }

    fn scan_out_valid(&mut self) -> bool {
        if let Some(n) = self.valid_fault_in {
            if n == 0 {
                self.valid_fault_in = None;
                return false;
            }
            self.valid_fault_in = Some(n - 1);
        }
        self.out_active
    }
}

impl GpioBank for SimulatedChip {
    fn set(&mut self, signal: Signal, value: bool) -> Result<(), GpioError> {
        if !signal.is_output() {
            return Err(GpioError::NotAnOutput(signal));
        }
        let rising = value && !self.level(signal);
        self.levels[signal.index()] = value;
        if rising {
            match signal {
                Signal::ScanClock => self.scan_clock(),
                Signal::ClkGenScanClock => {
                    let bit = self.level(Signal::ClkGenScanIn);
                    self.clkgen.push(bit);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn read(&mut self, signal: Signal) -> Result<bool, GpioError> {
        Ok(match signal {
            Signal::ProgramDone => self.program_done(),
            Signal::ScanOutValid => self.scan_out_valid(),
            Signal::ScanOutPayload => self.out_active && (self.out_reg >> self.out_index) & 1 == 1,
            Signal::ClkGenScanOut => {
                let len = self.clkgen.len();
                len >= 18 && self.clkgen[len - 18]
            }
            Signal::HcdScanOut => false,
            driven => self.level(driven),
        })
    }
}

/// Records every level driven and answers reads from a queue.  Scan out valid reads high unless
/// a fault was requested.
#[derive(Default)]
pub struct Recorder {
    writes: Vec<(Signal, bool)>,
    levels: [Option<bool>; SIGNAL_COUNT],
    samples: VecDeque<bool>,
    valid_reads: u32,
    fail_valid_at: Option<u32>,
}

impl Recorder {
    pub fn writes(&self) -> &[(Signal, bool)] {
        &self.writes
    }

    pub fn level(&self, signal: Signal) -> Option<bool> {
        self.levels[signal.index()]
    }

    /// Number of rising edges on the scan clock.
    pub fn ticks(&self) -> usize {
        self.writes
            .iter()
            .filter(|w| **w == (Signal::ScanClock, true))
            .count()
    }

    /// Level of `signal` at every rising edge of the scan clock.
    pub fn driven_bits(&self, signal: Signal) -> Vec<bool> {
        let mut level = false;
        let mut bits = vec![];
        for (s, v) in &self.writes {
            if *s == signal {
                level = *v;
            } else if *s == Signal::ScanClock && *v {
                bits.push(level);
            }
        }
        bits
    }

    /// Values returned by successive reads of scan out payload.
    pub fn queue_samples(&mut self, samples: impl IntoIterator<Item = bool>) {
        self.samples.extend(samples);
    }

    /// Scan out valid reads low on the `n`-th read, counting from 0.
    pub fn fail_valid_at(&mut self, n: u32) {
        self.fail_valid_at = Some(n);
    }
}

impl GpioBank for Recorder {
    fn set(&mut self, signal: Signal, value: bool) -> Result<(), GpioError> {
        self.writes.push((signal, value));
        self.levels[signal.index()] = Some(value);
        Ok(())
    }

    fn read(&mut self, signal: Signal) -> Result<bool, GpioError> {
        Ok(match signal {
            Signal::ScanOutPayload => self.samples.pop_front().unwrap_or(false),
            Signal::ScanOutValid => {
                let n = self.valid_reads;
                self.valid_reads += 1;
                self.fail_valid_at != Some(n)
            }
            other => self.levels[other.index()].unwrap_or(false),
        })
    }
}
