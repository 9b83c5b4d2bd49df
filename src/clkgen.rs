//! The on-chip clock generator has its own small scan register, clocked by a separate scan clock.
//! Its 18 positions are, in scan order:
//!
//! ```text
//! FREQ_SELECT<14:1>  RO_SELECT<4:1>
//! ```
//!
//! Exactly one frequency bit and one ring oscillator bit are set.  `freq_select = 1` with
//! `ring_osc_select = 1` is the fastest setting, `14` with `4` the slowest.
use embedded_hal::delay::DelayNs;

use crate::error::{Error, Result};
use crate::gpio::{GpioBank, Signal};
use crate::payload::Bits;
use crate::shift::ScanPort;

pub const FREQ_SELECTS: u8 = 14;
pub const RING_OSC_SELECTS: u8 = 4;
pub const SCAN_POSITIONS: u32 = FREQ_SELECTS as u32 + RING_OSC_SELECTS as u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockGenSetting {
    freq_select: u8,
    ring_osc_select: u8,
}

impl ClockGenSetting {
    pub fn new(freq_select: u8, ring_osc_select: u8) -> Result<Self> {
        if !(1..=FREQ_SELECTS).contains(&freq_select) {
            return Err(Error::configuration(alloc::format!(
                "frequency select {freq_select} is outside 1..={FREQ_SELECTS}"
            )));
        }
        if !(1..=RING_OSC_SELECTS).contains(&ring_osc_select) {
            return Err(Error::configuration(alloc::format!(
                "ring oscillator select {ring_osc_select} is outside 1..={RING_OSC_SELECTS}"
            )));
        }
        Ok(Self {
            freq_select,
            ring_osc_select,
        })
    }

    pub fn freq_select(&self) -> u8 {
        self.freq_select
    }

    pub fn ring_osc_select(&self) -> u8 {
        self.ring_osc_select
    }

    /// The 18 scan positions, position 1 first.
    pub fn scan_bits(&self) -> Bits {
        let freq_pos = (FREQ_SELECTS + 1 - self.freq_select) as u32;
        let ro_pos = FREQ_SELECTS as u32 + (RING_OSC_SELECTS + 1 - self.ring_osc_select) as u32;
        Bits::from_msb_first((1..=SCAN_POSITIONS).map(|pos| pos == freq_pos || pos == ro_pos))
    }
}

/// Shift `setting` into the clock generator.  The chip keeps running from whatever clock the
/// mux selects; switching to the generated clock is up to the caller.
pub fn configure<B: GpioBank, D: DelayNs>(
    port: &mut ScanPort<B, D>,
    setting: ClockGenSetting,
) -> Result<()> {
    tracing::info!(
        "Configuring clock generator with freq select {}, ring osc select {}",
        setting.freq_select,
        setting.ring_osc_select
    );
    port.set(Signal::ClkGenEnableCommon, true)?;
    port.set(Signal::ClkGenGlobalEnableB, false)?;

    for bit in setting.scan_bits().iter() {
        port.set(Signal::ClkGenScanIn, bit)?;
        port.set(Signal::ClkGenScanClock, true)?;
        port.set(Signal::ClkGenScanClock, false)?;
        let out = port.read(Signal::ClkGenScanOut)?;
        tracing::trace!("clkgen scan in {}, scan out {}", bit as u8, out as u8);
    }
    Ok(())
}
