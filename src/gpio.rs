//! The board is reached through a handful of digital lines, each identified by a [`Signal`].
//! Backends implement the [`GpioBank`] trait, which drives or samples one line at a time.  The
//! protocol engine only ever talks to a `GpioBank`, so it does not care whether the lines are
//! embedded-hal pins, an FTDI adapter, or the simulated chip used by the tests.
use serde::{Deserialize, Serialize};

use crate::error::GpioError;

pub mod hal;
#[cfg(feature = "std")]
pub mod mpsse;
pub mod sim;

/// Every line between the host and the board.  Chip inputs are driven by the host, chip outputs
/// are only ever sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    // scan chain and chip control, driven by the host
    ChipReset,
    HcdScanIn,
    TestMode,
    ScanInValid,
    ScanInPayload,
    ScanLoad,
    ScanRead,
    ScanReset,
    ChainSelectEnable,
    /// External clock input of the chip, ticked by hand while the clock mux selects it
    ScanClock,
    // clock generator, driven by the host
    ClockSelect,
    ClkGenScanIn,
    ClkGenScanClock,
    ClkGenEnableCommon,
    /// Active low
    ClkGenGlobalEnableB,
    // chip outputs
    ProgramDone,
    HcdScanOut,
    ScanOutValid,
    ScanOutPayload,
    ClkGenScanOut,
}

impl Signal {
    pub const ALL: [Signal; 20] = [
        Signal::ChipReset,
        Signal::HcdScanIn,
        Signal::TestMode,
        Signal::ScanInValid,
        Signal::ScanInPayload,
        Signal::ScanLoad,
        Signal::ScanRead,
        Signal::ScanReset,
        Signal::ChainSelectEnable,
        Signal::ScanClock,
        Signal::ClockSelect,
        Signal::ClkGenScanIn,
        Signal::ClkGenScanClock,
        Signal::ClkGenEnableCommon,
        Signal::ClkGenGlobalEnableB,
        Signal::ProgramDone,
        Signal::HcdScanOut,
        Signal::ScanOutValid,
        Signal::ScanOutPayload,
        Signal::ClkGenScanOut,
    ];

    /// The chip control lines that `clear_inputs` and `set_inputs` drive together.
    pub const CHIP_INPUTS: [Signal; 9] = [
        Signal::ChipReset,
        Signal::HcdScanIn,
        Signal::TestMode,
        Signal::ScanInValid,
        Signal::ScanInPayload,
        Signal::ScanLoad,
        Signal::ScanRead,
        Signal::ScanReset,
        Signal::ChainSelectEnable,
    ];

    /// Position of the signal in [`Signal::ALL`], used to index capability maps.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// True when the host drives this line.
    pub const fn is_output(self) -> bool {
        !matches!(
            self,
            Signal::ProgramDone | Signal::HcdScanOut | Signal::ScanOutValid | Signal::ScanOutPayload
                | Signal::ClkGenScanOut
        )
    }
}

pub const SIGNAL_COUNT: usize = Signal::ALL.len();

pub trait GpioBank {
    /// Drive `signal` to `value`.  The change is assumed to take effect immediately.
    fn set(&mut self, signal: Signal, value: bool) -> Result<(), GpioError>;
    /// Sample the current level of `signal`.
    fn read(&mut self, signal: Signal) -> Result<bool, GpioError>;
}

impl<T: GpioBank + ?Sized> GpioBank for &mut T {
    fn set(&mut self, signal: Signal, value: bool) -> Result<(), GpioError> {
        (**self).set(signal, value)
    }

    fn read(&mut self, signal: Signal) -> Result<bool, GpioError> {
        (**self).read(signal)
    }
}

impl<T: GpioBank + ?Sized> GpioBank for alloc::boxed::Box<T> {
    fn set(&mut self, signal: Signal, value: bool) -> Result<(), GpioError> {
        (**self).set(signal, value)
    }

    fn read(&mut self, signal: Signal) -> Result<bool, GpioError> {
        (**self).read(signal)
    }
}

/// Sleeps the calling thread.
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(ns as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_table_order() {
        for (i, signal) in Signal::ALL.iter().enumerate() {
            assert_eq!(signal.index(), i);
        }
    }

    #[test]
    fn chip_inputs_are_outputs_of_the_host() {
        assert!(Signal::CHIP_INPUTS.iter().all(|s| s.is_output()));
        assert!(!Signal::ScanOutValid.is_output());
        assert!(!Signal::ClkGenScanOut.is_output());
        assert!(Signal::ClkGenGlobalEnableB.is_output());
    }
}
