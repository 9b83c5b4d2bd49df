//! Fixed-width bit fields shifted through the scan chain.
//!
//! A [`Bits`] value is an ordered bit sequence of at most 64 bits.  Logical index 0 is the most
//! significant bit, which matches the order fields are written down in: a [`ScanPayload`] is the
//! address followed by the data, enable, write and mask fields.  The serializer in
//! [`crate::shift`] transmits the sequence tail first.

pub const ADDR_BITS: u32 = 16;
pub const DATA_BITS: u32 = 32;
pub const MASK_BITS: u32 = 4;
/// Width of the chain select field shifted while chain select enable is high
pub const CTRL_BITS: u32 = 8;
pub const PAYLOAD_BITS: u32 = ADDR_BITS + DATA_BITS + 1 + 1 + MASK_BITS;
/// Widest field a [`Bits`] can hold
pub const MAX_FIELD_BITS: u32 = u64::BITS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bits {
    value: u64,
    width: u32,
}

impl Bits {
    /// Take the low `width` bits of `value`.  Anything above `width` is dropped, the field is
    /// zero padded, never sign extended.
    pub fn new(value: u64, width: u32) -> Self {
        assert!(width <= 64, "bit field wider than 64 bits");
        let value = if width == 64 { value } else { value & ((1 << width) - 1) };
        Self { value, width }
    }

    pub const fn empty() -> Self {
        Self { value: 0, width: 0 }
    }

    /// Build a field from bits given most significant first.
    pub fn from_msb_first(bits: impl IntoIterator<Item = bool>) -> Self {
        let mut out = Self::empty();
        for bit in bits {
            out = out.push(bit);
        }
        out
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Bit at logical position `index`, counted from the most significant end.
    pub fn bit(&self, index: u32) -> bool {
        assert!(index < self.width);
        (self.value >> (self.width - 1 - index)) & 1 == 1
    }

    /// Append one bit at the least significant end.
    pub fn push(self, bit: bool) -> Self {
        assert!(self.width < 64, "bit field full");
        Self {
            value: (self.value << 1) | bit as u64,
            width: self.width + 1,
        }
    }

    /// `self` followed by `tail`.
    pub fn concat(self, tail: Bits) -> Self {
        assert!(self.width + tail.width <= 64, "bit field wider than 64 bits");
        if tail.width == 0 {
            return self;
        }
        Self {
            value: (self.value << tail.width) | tail.value,
            width: self.width + tail.width,
        }
    }

    /// Split into the first `at` bits and the rest.
    pub fn split_at(self, at: u32) -> (Bits, Bits) {
        assert!(at <= self.width);
        let tail_width = self.width - at;
        let tail = Bits::new(self.value, tail_width);
        let head = if tail_width == 64 { 0 } else { self.value >> tail_width };
        (Bits::new(head, at), tail)
    }

    /// Iterate most significant bit first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = bool> + '_ {
        (0..self.width).map(move |i| self.bit(i))
    }
}

/// Byte lane select, one bit per byte of the 32-bit word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteMask(u8);

impl ByteMask {
    pub const ALL: ByteMask = ByteMask(0b1111);
    pub const NONE: ByteMask = ByteMask(0);

    pub fn new(lanes: u8) -> Self {
        Self(lanes & 0b1111)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }
}

/// One transaction for a memory bank scan chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanPayload {
    pub address: u16,
    pub data: u32,
    pub enable: bool,
    pub write: bool,
    pub mask: ByteMask,
}

impl ScanPayload {
    /// A write of `data` to `address` on all byte lanes.
    pub fn write(address: u16, data: u32) -> Self {
        Self {
            address,
            data,
            enable: true,
            write: true,
            mask: ByteMask::ALL,
        }
    }

    /// Point the bank at `address` without transferring data.
    pub fn address(address: u16) -> Self {
        Self {
            address,
            data: 0,
            enable: true,
            write: false,
            mask: ByteMask::ALL,
        }
    }

    /// A payload that leaves the target disabled, used to flush stale state out of a chain.
    pub fn disabled() -> Self {
        Self {
            address: 0,
            data: 0,
            enable: false,
            write: false,
            mask: ByteMask::ALL,
        }
    }

    pub fn encode(&self) -> Bits {
        Bits::new(self.address as u64, ADDR_BITS)
            .concat(Bits::new(self.data as u64, DATA_BITS))
            .concat(Bits::new(self.enable as u64, 1))
            .concat(Bits::new(self.write as u64, 1))
            .concat(Bits::new(self.mask.bits() as u64, MASK_BITS))
    }

    /// Inverse of [`ScanPayload::encode`].  Returns `None` if `bits` is not exactly
    /// [`PAYLOAD_BITS`] wide.
    pub fn decode(bits: Bits) -> Option<Self> {
        if bits.width() != PAYLOAD_BITS {
            return None;
        }
        let (address, rest) = bits.split_at(ADDR_BITS);
        let (data, rest) = rest.split_at(DATA_BITS);
        let (enable, rest) = rest.split_at(1);
        let (write, mask) = rest.split_at(1);
        Some(Self {
            address: address.value() as u16,
            data: data.value() as u32,
            enable: enable.value() == 1,
            write: write.value() == 1,
            mask: ByteMask::new(mask.value() as u8),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn payload_is_always_54_bits() {
        assert_eq!(PAYLOAD_BITS, 54);
        assert_eq!(ScanPayload::disabled().encode().width(), 54);
        let big = ScanPayload::write(u16::MAX, u32::MAX);
        assert_eq!(big.encode().width(), 54);
    }

    #[test]
    fn field_order_is_addr_data_enable_write_mask() {
        let p = ScanPayload {
            address: 0x8001,
            data: 0x8000_0001,
            enable: true,
            write: false,
            mask: ByteMask::new(0b1010),
        };
        let bits: Vec<bool> = p.encode().iter().collect();
        // address msb and lsb
        assert!(bits[0]);
        assert!(bits[15]);
        assert!(!bits[1]);
        // data msb and lsb
        assert!(bits[16]);
        assert!(bits[47]);
        assert!(!bits[17]);
        // enable, write
        assert!(bits[48]);
        assert!(!bits[49]);
        assert_eq!(&bits[50..], &[true, false, true, false]);
    }

    #[test]
    fn decode_inverts_encode() {
        let cases = [
            ScanPayload::disabled(),
            ScanPayload::write(0, 0),
            ScanPayload::write(4095, 0xdead_beef),
            ScanPayload::address(0x1234),
            ScanPayload {
                address: u16::MAX,
                data: u32::MAX,
                enable: false,
                write: true,
                mask: ByteMask::new(0b0110),
            },
        ];
        for p in cases {
            assert_eq!(ScanPayload::decode(p.encode()), Some(p));
        }
    }

    #[test]
    fn decode_rejects_wrong_width() {
        assert_eq!(ScanPayload::decode(Bits::new(0, 53)), None);
    }

    #[test]
    fn small_values_are_zero_padded() {
        let b = Bits::new(5, 8);
        let bits: Vec<bool> = b.iter().collect();
        assert_eq!(bits, [false, false, false, false, false, true, false, true]);
    }

    #[test]
    fn msb_first_round_trip() {
        let b = Bits::from_msb_first([true, false, false, true]);
        assert_eq!(b.value(), 0b1001);
        assert_eq!(b.width(), 4);
        let (head, tail) = Bits::new(0b1101_0110, 8).split_at(3);
        assert_eq!(head, Bits::new(0b110, 3));
        assert_eq!(tail, Bits::new(0b10110, 5));
    }

    #[test]
    fn mask_is_truncated_to_four_lanes() {
        assert_eq!(ByteMask::new(0xff), ByteMask::ALL);
    }
}
