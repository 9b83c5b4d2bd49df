//! `GpioBank` for an FT2232H based adapter.  Both channels run in MPSSE mode and are used purely
//! as GPIO: channel A carries the chip pads, channel B the clock generator.  Each channel has 16
//! lines, ADBUS0-7 as the low byte and ACBUS0-7 as the high byte.
use alloc::format;

use ftdi_mpsse::{MpsseCmdBuilder, MpsseCmdExecutor};
use libftd2xx::{Ft2232h, FtdiMpsse};

use crate::config::{Pinout, Port};
use crate::error::GpioError;
use crate::gpio::{GpioBank, Signal};

fn adapter_error(what: &str, e: impl core::fmt::Debug) -> GpioError {
    GpioError::Adapter(format!("{what}: {e:?}"))
}

/// One MPSSE channel used as 16 GPIO lines.  The level of the driven lines is cached so that a
/// single line can be changed without reading the port back.
pub struct MpssePort<T> {
    ft: T,
    value: u16,
    direction: u16,
}

impl<T: FtdiMpsse + MpsseCmdExecutor> MpssePort<T>
    where <T as MpsseCmdExecutor>::Error: core::fmt::Debug
{
    /// Put `ft` in MPSSE mode with the lines in `direction` driven low and the others as inputs.
    pub fn new(mut ft: T, direction: u16) -> Result<Self, GpioError> {
        ft.initialize_mpsse_default()
            .map_err(|e| adapter_error("init", e))?;

        let mut port = Self {
            ft,
            value: 0,
            direction,
        };
        port.flush(true, true)?;
        Ok(port)
    }

    fn flush(&mut self, lower: bool, upper: bool) -> Result<(), GpioError> {
        let [lo, hi] = self.value.to_le_bytes();
        let [lo_dir, hi_dir] = self.direction.to_le_bytes();
        let mut builder = MpsseCmdBuilder::new();
        if lower {
            builder = builder.set_gpio_lower(lo, lo_dir);
        }
        if upper {
            builder = builder.set_gpio_upper(hi, hi_dir);
        }
        self.ft.send(builder.as_slice())
            .map_err(|e| adapter_error("send", e))
    }

    pub fn write(&mut self, bit: u8, level: bool) -> Result<(), GpioError> {
        if level {
            self.value |= 1 << bit;
        } else {
            self.value &= !(1 << bit);
        }
        self.flush(bit < 8, bit >= 8)
    }

    pub fn read(&mut self, bit: u8) -> Result<bool, GpioError> {
        let builder = if bit < 8 {
            MpsseCmdBuilder::new().gpio_lower()
        } else {
            MpsseCmdBuilder::new().gpio_upper()
        }
        .send_immediate();

        let mut buf = [0u8; 1];
        self.ft.xfer(builder.as_slice(), &mut buf)
            .map_err(|e| adapter_error("xfer", e))?;
        Ok(buf[0] & (1 << (bit % 8)) != 0)
    }
}

/// Both adapter channels, addressed through a [`Pinout`].
pub struct MpsseGpioBank<T> {
    iopad: MpssePort<T>,
    clkgen: MpssePort<T>,
    pinout: Pinout,
}

impl MpsseGpioBank<Ft2232h> {
    /// Open the two channels of an FT2232H by USB description, e.g. `"Dual RS232-HS A"` and
    /// `"Dual RS232-HS B"`.
    pub fn open(iopad_desc: &str, clkgen_desc: &str, pinout: Pinout) -> Result<Self, GpioError> {
        let iopad = Ft2232h::with_description(iopad_desc)
            .map_err(|e| adapter_error(iopad_desc, e))?;
        let clkgen = Ft2232h::with_description(clkgen_desc)
            .map_err(|e| adapter_error(clkgen_desc, e))?;
        Self::new(iopad, clkgen, pinout)
    }
}

impl<T: FtdiMpsse + MpsseCmdExecutor> MpsseGpioBank<T>
    where <T as MpsseCmdExecutor>::Error: core::fmt::Debug
{
    pub fn new(iopad: T, clkgen: T, pinout: Pinout) -> Result<Self, GpioError> {
        let iopad = MpssePort::new(iopad, pinout.direction_mask(Port::IoPad))?;
        let clkgen = MpssePort::new(clkgen, pinout.direction_mask(Port::ClockGen))?;
        tracing::debug!("MPSSE GPIO bank open");
        Ok(Self { iopad, clkgen, pinout })
    }

    fn port(&mut self, signal: Signal) -> Result<(&mut MpssePort<T>, u8), GpioError> {
        let loc = self.pinout.location(signal).ok_or(GpioError::Unwired(signal))?;
        let port = match loc.port {
            Port::IoPad => &mut self.iopad,
            Port::ClockGen => &mut self.clkgen,
        };
        Ok((port, loc.bit))
    }
}

impl<T: FtdiMpsse + MpsseCmdExecutor> GpioBank for MpsseGpioBank<T>
    where <T as MpsseCmdExecutor>::Error: core::fmt::Debug
{
    fn set(&mut self, signal: Signal, value: bool) -> Result<(), GpioError> {
        if !signal.is_output() {
            return Err(GpioError::NotAnOutput(signal));
        }
        let (port, bit) = self.port(signal)?;
        port.write(bit, value)
    }

    fn read(&mut self, signal: Signal) -> Result<bool, GpioError> {
        let (port, bit) = self.port(signal)?;
        port.read(bit)
    }
}
