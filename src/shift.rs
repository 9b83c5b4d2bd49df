//! Bit level access to the scan chain.  `ScanPort` owns the GPIO lines and knows how to pulse the
//! scan clock, shift a field in or out, and point the shared bus at one of its targets.  It does
//! not know anything about memory banks; that is the job of [`crate::engine::ScanChain`].
use embedded_hal::delay::DelayNs;

use crate::bank::ChainId;
use crate::error::{Error, Result};
use crate::gpio::{GpioBank, Signal};
use crate::payload::{Bits, ScanPayload, CTRL_BITS, MAX_FIELD_BITS};

pub struct ScanPort<B, D> {
    gpio: B,
    delay: D,
    half_period_ns: u32,
    selected: Option<ChainId>,
}

impl<B: GpioBank, D: DelayNs> ScanPort<B, D> {
    pub fn new(gpio: B, delay: D, half_period_ns: u32) -> Self {
        Self {
            gpio,
            delay,
            half_period_ns,
            selected: None,
        }
    }

    /// The target most recently latched by [`ScanPort::select`], if any since the last reset.
    pub fn selected(&self) -> Option<ChainId> {
        self.selected
    }

    pub(crate) fn forget_selection(&mut self) {
        self.selected = None;
    }

    pub fn gpio(&mut self) -> &mut B {
        &mut self.gpio
    }

    pub fn delay(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn release(self) -> (B, D) {
        (self.gpio, self.delay)
    }

    pub fn set(&mut self, signal: Signal, value: bool) -> Result<()> {
        self.gpio
            .set(signal, value)
            .map_err(|source| Error::Gpio { signal, source })
    }

    pub fn read(&mut self, signal: Signal) -> Result<bool> {
        self.gpio
            .read(signal)
            .map_err(|source| Error::Gpio { signal, source })
    }

    fn half_period(&mut self) {
        if self.half_period_ns > 0 {
            self.delay.delay_ns(self.half_period_ns);
        }
    }

    /// Tick the scan clock `count` times.  Every bit shifted or sampled needs exactly one tick,
    /// a missed tick leaves the chain out of step until the next reset.
    pub fn pulse(&mut self, count: u32) -> Result<()> {
        for _ in 0..count {
            self.set(Signal::ScanClock, true)?;
            self.half_period();
            self.set(Signal::ScanClock, false)?;
            self.half_period();
        }
        Ok(())
    }

    /// Shift `bits` onto the scan in payload line, last bit first.  The receiving shift register
    /// is filled from its tail, so the wire order mirrors the field order.
    pub fn shift_out(&mut self, bits: Bits) -> Result<()> {
        for bit in bits.iter().rev() {
            self.set(Signal::ScanInPayload, bit)?;
            self.pulse(1)?;
        }
        Ok(())
    }

    /// Sample `cycles` bits from the scan out payload line.  Scan out valid has to be high on
    /// every cycle, otherwise the chain is out of step and sampling stops immediately.
    ///
    /// Bits arrive tail first, the result is in field order (most significant bit first).
    pub fn shift_in(&mut self, cycles: u32) -> Result<Bits> {
        if cycles > MAX_FIELD_BITS {
            return Err(Error::configuration(alloc::format!(
                "cannot shift in {} bits, fields are at most {} bits",
                cycles, MAX_FIELD_BITS
            )));
        }
        let mut received = Bits::empty();
        for cycle in 0..cycles {
            let bit = self.read(Signal::ScanOutPayload)?;
            if !self.read(Signal::ScanOutValid)? {
                tracing::warn!("scan out valid low on cycle {} of {}", cycle, cycles);
                return Err(Error::ProtocolFault { cycle, cycles });
            }
            received = received.push(bit);
            self.pulse(1)?;
        }
        Ok(Bits::from_msb_first(received.iter().rev()))
    }

    /// Point the shared bus at `id`.  Must precede every transaction: a target that was not
    /// freshly selected returns stale data.
    pub fn select(&mut self, id: ChainId) -> Result<()> {
        tracing::trace!("selecting {}", id);
        self.set(Signal::ChainSelectEnable, true)?;
        self.shift_out(Bits::new(id.get() as u64, CTRL_BITS))?;
        self.set(Signal::ChainSelectEnable, false)?;
        // latch
        self.pulse(1)?;
        self.selected = Some(id);
        Ok(())
    }

    /// Shift `payload` into the selected target and strobe scan load to capture it.  Scan in
    /// valid must already be high.
    pub fn write_payload(&mut self, payload: &ScanPayload) -> Result<()> {
        tracing::trace!("scan write {:?}", payload);
        self.shift_out(payload.encode())?;
        self.set(Signal::ScanLoad, true)?;
        self.pulse(1)?;
        self.set(Signal::ScanLoad, false)?;
        self.pulse(1)
    }

    /// Capture the selected read target and shift out `cycles` bits of it.
    pub fn read_field(&mut self, cycles: u32) -> Result<Bits> {
        self.set(Signal::ScanRead, true)?;
        self.set(Signal::ScanInValid, false)?;
        self.pulse(1)?;
        self.set(Signal::ScanRead, false)?;
        self.set(Signal::ScanInValid, true)?;
        self.shift_in(cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::sim::{NoDelay, Recorder};
    use alloc::vec::Vec;

    fn port() -> ScanPort<Recorder, NoDelay> {
        ScanPort::new(Recorder::default(), NoDelay, 0)
    }

    #[test]
    fn pulse_toggles_twice_per_tick() {
        let mut port = port();
        port.pulse(3).unwrap();
        let clock: Vec<bool> = port
            .gpio()
            .writes()
            .iter()
            .filter(|(s, _)| *s == Signal::ScanClock)
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(clock, [true, false, true, false, true, false]);
    }

    #[test]
    fn shift_out_sends_last_bit_first() {
        let mut port = port();
        port.shift_out(Bits::from_msb_first([true, true, false])).unwrap();
        assert_eq!(port.gpio().driven_bits(Signal::ScanInPayload), [false, true, true]);
        assert_eq!(port.gpio().ticks(), 3);
    }

    #[test]
    fn select_shifts_eight_bits_then_latches() {
        let mut port = port();
        port.select(ChainId::OUTPUT_WRITE).unwrap();
        // 5 = 0b0000_0101, sent from the least significant end, then the latch tick
        assert_eq!(
            port.gpio().driven_bits(Signal::ScanInPayload),
            [true, false, true, false, false, false, false, false, false]
        );
        assert_eq!(port.gpio().ticks(), 9);
        assert_eq!(port.selected(), Some(ChainId::OUTPUT_WRITE));
        assert_eq!(port.gpio().level(Signal::ChainSelectEnable), Some(false));
    }

    #[test]
    fn write_payload_ticks_once_per_bit_plus_load() {
        let mut port = port();
        port.write_payload(&ScanPayload::write(1, 2)).unwrap();
        assert_eq!(port.gpio().ticks(), 54 + 2);
        assert_eq!(port.gpio().level(Signal::ScanLoad), Some(false));
    }

    #[test]
    fn shift_in_returns_field_order() {
        let mut port = port();
        // first sample is the least significant bit
        port.gpio().queue_samples([true, false, false, true, true]);
        let bits = port.shift_in(5).unwrap();
        assert_eq!(bits, Bits::new(0b11001, 5));
    }

    #[test]
    fn shift_in_rejects_fields_wider_than_64_bits() {
        let mut port = port();
        assert!(matches!(port.shift_in(65), Err(Error::Configuration(_))));
        assert_eq!(port.gpio().ticks(), 0);
    }

    #[test]
    fn shift_in_stops_on_invalid_cycle() {
        let mut port = port();
        port.gpio().queue_samples([true, true]);
        port.gpio().fail_valid_at(1);
        let err = port.shift_in(4).unwrap_err();
        assert!(matches!(err, Error::ProtocolFault { cycle: 1, cycles: 4 }));
        // no tick after the faulty sample
        assert_eq!(port.gpio().ticks(), 1);
    }
}
