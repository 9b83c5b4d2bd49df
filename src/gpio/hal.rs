//! `GpioBank` on top of embedded-hal pins, for running the engine on a board computer or a
//! microcontroller wired straight to the chip.
use embedded_hal::digital::{Error as _, InputPin, OutputPin, PinState};

use crate::error::GpioError;
use crate::gpio::{GpioBank, Signal, SIGNAL_COUNT};

/// Pins registered per signal.  All output pins share one type and all input pins another, which
/// is what HALs with type erased pins provide.
pub struct HalGpioBank<O, I> where O: OutputPin, I: InputPin {
    outputs: [Option<O>; SIGNAL_COUNT],
    inputs: [Option<I>; SIGNAL_COUNT],
}

impl<O, I> HalGpioBank<O, I> where O: OutputPin, I: InputPin {
    pub fn new() -> Self {
        Self {
            outputs: core::array::from_fn(|_| None),
            inputs: core::array::from_fn(|_| None),
        }
    }

    /// Drive `signal` with `pin`.  Fails if `signal` is a chip output.
    pub fn with_output(mut self, signal: Signal, pin: O) -> Result<Self, GpioError> {
        if !signal.is_output() {
            return Err(GpioError::NotAnOutput(signal));
        }
        self.outputs[signal.index()] = Some(pin);
        Ok(self)
    }

    /// Sample `signal` through `pin`.
    pub fn with_input(mut self, signal: Signal, pin: I) -> Self {
        self.inputs[signal.index()] = Some(pin);
        self
    }
}

impl<O, I> Default for HalGpioBank<O, I> where O: OutputPin, I: InputPin {
    fn default() -> Self {
        Self::new()
    }
}

impl<O, I> GpioBank for HalGpioBank<O, I> where O: OutputPin, I: InputPin {
    fn set(&mut self, signal: Signal, value: bool) -> Result<(), GpioError> {
        let pin = self.outputs[signal.index()]
            .as_mut()
            .ok_or(GpioError::Unwired(signal))?;
        pin.set_state(PinState::from(value))
            .map_err(|e| GpioError::Pin(e.kind()))
    }

    fn read(&mut self, signal: Signal) -> Result<bool, GpioError> {
        let pin = self.inputs[signal.index()]
            .as_mut()
            .ok_or(GpioError::Unwired(signal))?;
        pin.is_high().map_err(|e| GpioError::Pin(e.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use embedded_hal::digital::{ErrorKind, ErrorType};

    #[derive(Debug)]
    struct PinFault;

    impl embedded_hal::digital::Error for PinFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// A pin that remembers the last level and fails when asked to
    struct FakePin<'a> {
        level: &'a Cell<bool>,
        broken: bool,
    }

    impl ErrorType for FakePin<'_> {
        type Error = PinFault;
    }

    impl OutputPin for FakePin<'_> {
        fn set_low(&mut self) -> Result<(), PinFault> {
            if self.broken {
                return Err(PinFault);
            }
            self.level.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), PinFault> {
            if self.broken {
                return Err(PinFault);
            }
            self.level.set(true);
            Ok(())
        }
    }

    impl InputPin for FakePin<'_> {
        fn is_high(&mut self) -> Result<bool, PinFault> {
            Ok(self.level.get())
        }

        fn is_low(&mut self) -> Result<bool, PinFault> {
            Ok(!self.level.get())
        }
    }

    #[test]
    fn drives_and_samples_registered_pins() {
        let clock = Cell::new(false);
        let done = Cell::new(true);
        let mut bank = HalGpioBank::new()
            .with_output(Signal::ScanClock, FakePin { level: &clock, broken: false })
            .unwrap()
            .with_input(Signal::ProgramDone, FakePin { level: &done, broken: false });

        bank.set(Signal::ScanClock, true).unwrap();
        assert!(clock.get());
        assert!(bank.read(Signal::ProgramDone).unwrap());
        assert_eq!(bank.set(Signal::TestMode, true), Err(GpioError::Unwired(Signal::TestMode)));
        assert_eq!(bank.read(Signal::ScanOutValid), Err(GpioError::Unwired(Signal::ScanOutValid)));
    }

    #[test]
    fn pin_errors_carry_their_kind() {
        let level = Cell::new(false);
        let mut bank: HalGpioBank<FakePin, FakePin> = HalGpioBank::new()
            .with_output(Signal::ScanReset, FakePin { level: &level, broken: true })
            .unwrap();
        assert_eq!(
            bank.set(Signal::ScanReset, true),
            Err(GpioError::Pin(ErrorKind::Other))
        );
    }

    #[test]
    fn chip_outputs_cannot_be_registered_as_outputs() {
        let level = Cell::new(false);
        let bank: HalGpioBank<FakePin, FakePin> = HalGpioBank::new();
        assert!(bank
            .with_output(Signal::ScanOutPayload, FakePin { level: &level, broken: false })
            .is_err());
    }
}
