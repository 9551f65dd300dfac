//! # Command Records
//!
//! A command is built as a zero-initialized dword array sized by the active
//! generation's layout, filled through named bitfields, then appended to a
//! command sink in one piece.
//!
//! ```text
//!  CommandRecord::begin(layout)      set(FIELD, v)?        append(sink)?
//!  ┌──────────────────────────┐    ┌────────────────┐    ┌──────────────┐
//!  │ DW0 = header | length    │───▶│ Fields-Set     │───▶│  Appended    │
//!  │ DW1..n = 0               │    │ (masked writes)│    │ (all or none)│
//!  └──────────────────────────┘    └────────────────┘    └──────────────┘
//! ```
//!
//! Field layouts are declared with [`command_fields!`](crate::command_fields),
//! which expands into one module of `Field` constants per command.

use alloc::vec;
use alloc::vec::Vec;

use vdbox_core::{CommandSink, Error, GpuAddr, Result};

// =============================================================================
// FIELD
// =============================================================================

/// A bitfield inside a command: dword index, bit shift, bit width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    /// Dword index inside the command (DW0 is the header)
    pub dword: u16,
    /// Lowest bit
    pub shift: u8,
    /// Width in bits (1..=32)
    pub width: u8,
}

impl Field {
    /// Field spanning bits `lo..=hi` of dword `dword`
    pub const fn bits(dword: u16, lo: u8, hi: u8) -> Self {
        Self {
            dword,
            shift: lo,
            width: hi - lo + 1,
        }
    }

    /// Whole dword
    pub const fn dword(dword: u16) -> Self {
        Self::bits(dword, 0, 31)
    }

    /// Same bits `dwords` further into the command (repeated groups)
    pub const fn offset(self, dwords: u16) -> Self {
        Self {
            dword: self.dword + dwords,
            ..self
        }
    }

    /// Unshifted value mask
    #[inline]
    pub const fn mask(self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Encode `value` into its position, truncating to the field width
    #[inline]
    pub const fn encode(self, value: u32) -> u32 {
        (value & self.mask()) << self.shift
    }

    /// Extract the field from a dword
    #[inline]
    pub const fn decode(self, dword: u32) -> u32 {
        (dword >> self.shift) & self.mask()
    }
}

/// Declare the field layout of a command
///
/// ```ignore
/// command_fields! {
///     /// HCP_QM_STATE
///     HcpQmState {
///         prediction_type = 1 [0:0],
///         size_id = 1 [2:1],
///     }
/// }
/// // => pub mod hcp_qm_state { pub const PREDICTION_TYPE: Field = ...; }
/// ```
#[macro_export]
macro_rules! command_fields {
    (
        $(#[$meta:meta])*
        $cmd:ident {
            $( $name:ident = $dw:literal [$hi:literal : $lo:literal] ),* $(,)?
        }
    ) => {
        paste::paste! {
            $(#[$meta])*
            pub mod [<$cmd:snake>] {
                use $crate::record::Field;

                $(
                    #[doc = concat!("`", stringify!($name), "`: DW", stringify!($dw),
                        "[", stringify!($hi), ":", stringify!($lo), "]")]
                    pub const [<$name:upper>]: Field = Field::bits($dw, $lo, $hi);
                )*
            }
        }
    };
}

// =============================================================================
// COMMAND LAYOUT
// =============================================================================

/// Static shape of one command on one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLayout {
    /// Hardware command name
    pub name: &'static str,
    /// DW0 without the length field
    pub header: u32,
    /// Fixed size in dwords, header included
    pub dwords: u16,
    /// DW0 length field, `None` for single-dword commands
    pub length: Option<Field>,
}

impl CommandLayout {
    /// DW0 length field of MFX / HCP / VDENC / HuC commands
    pub const MFX_LENGTH: Field = Field::bits(0, 0, 11);

    /// Create a layout
    pub const fn new(name: &'static str, header: u32, dwords: u16, length: Option<Field>) -> Self {
        Self {
            name,
            header,
            dwords,
            length,
        }
    }

    /// Parallel-video-pipe command (`type 3, pipeline 2`)
    pub const fn mfx(name: &'static str, opcode: u32, sub_opcode: u32, dwords: u16) -> Self {
        let header = (3 << 29) | (2 << 27) | ((opcode & 0xF) << 23) | ((sub_opcode & 0x7F) << 16);
        Self::new(name, header, dwords, Some(Self::MFX_LENGTH))
    }

    /// MI command (`type 0`)
    pub const fn mi(name: &'static str, opcode: u32, dwords: u16, length: Option<Field>) -> Self {
        Self::new(name, (opcode & 0x3F) << 23, dwords, length)
    }

    /// Fixed size in bytes
    #[inline]
    pub const fn size(&self) -> usize {
        self.dwords as usize * 4
    }
}

// =============================================================================
// COMMAND RECORD
// =============================================================================

/// A command under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    layout: CommandLayout,
    dwords: Vec<u32>,
}

impl CommandRecord {
    /// Zero-initialized record with DW0 already encoded
    pub fn begin(layout: &CommandLayout) -> Self {
        let mut dwords = vec![0u32; layout.dwords as usize];
        dwords[0] = layout.header;
        let mut rec = Self {
            layout: *layout,
            dwords,
        };
        rec.encode_length();
        rec
    }

    fn encode_length(&mut self) {
        if let Some(field) = self.layout.length {
            let length = self.dwords.len().saturating_sub(2) as u32;
            self.dwords[0] = (self.dwords[0] & !(field.mask() << field.shift)) | field.encode(length);
        }
    }

    /// Layout the record was started from
    pub fn layout(&self) -> &CommandLayout {
        &self.layout
    }

    /// Current dwords (header included)
    pub fn dwords(&self) -> &[u32] {
        &self.dwords
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.dwords.len() * 4
    }

    /// Write a field, truncating `value` to the field width
    ///
    /// Fails with `InvalidParameter` when the field lies outside the record,
    /// which happens when a field exists on a later generation only.
    pub fn set(&mut self, field: Field, value: u32) -> Result<()> {
        let dw = self.dwords.get_mut(field.dword as usize).ok_or(Error::InvalidParameter)?;
        *dw = (*dw & !(field.mask() << field.shift)) | field.encode(value);
        Ok(())
    }

    /// Write a one-bit flag
    #[inline]
    pub fn set_bool(&mut self, field: Field, value: bool) -> Result<()> {
        self.set(field, value as u32)
    }

    /// Write a signed value in two's complement of the field width
    #[inline]
    pub fn set_signed(&mut self, field: Field, value: i32) -> Result<()> {
        self.set(field, value as u32)
    }

    /// Read a field back
    pub fn get(&self, field: Field) -> Option<u32> {
        self.dwords.get(field.dword as usize).map(|&dw| field.decode(dw))
    }

    /// Overwrite a whole dword
    pub fn set_dword(&mut self, index: usize, value: u32) -> Result<()> {
        let dw = self.dwords.get_mut(index).ok_or(Error::InvalidParameter)?;
        *dw = value;
        Ok(())
    }

    /// Write a 64-bit graphics address into dwords `index` and `index + 1`
    ///
    /// Low bits below the field's alignment are left to the caller; buffer
    /// addresses handed out by the allocator are already aligned.
    pub fn set_address(&mut self, index: usize, addr: GpuAddr) -> Result<()> {
        if index + 1 >= self.dwords.len() {
            return Err(Error::InvalidParameter);
        }
        self.dwords[index] = addr.low();
        self.dwords[index + 1] = addr.high();
        Ok(())
    }

    /// Append an inline payload and grow the DW0 length accordingly
    pub fn extend(&mut self, payload: &[u32]) {
        self.dwords.extend_from_slice(payload);
        self.encode_length();
    }

    /// Serialize to little-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size());
        for dw in &self.dwords {
            bytes.extend_from_slice(&dw.to_le_bytes());
        }
        bytes
    }

    /// Append the whole record to `sink`
    ///
    /// Nothing is written when the sink cannot hold the full record.
    pub fn append(self, sink: &mut dyn CommandSink) -> Result<()> {
        if sink.remaining() < self.size() {
            log::debug!(
                "{}: {} bytes needed, {} left",
                self.layout.name,
                self.size(),
                sink.remaining()
            );
            return Err(Error::CommandBufferFull);
        }
        log::trace!("{} ({} dwords)", self.layout.name, self.dwords.len());
        sink.append(&self.to_bytes())
    }
}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

static_assertions::assert_impl_all!(Field: Send, Sync, Copy);
static_assertions::assert_impl_all!(CommandLayout: Send, Sync, Copy);
static_assertions::assert_impl_all!(CommandRecord: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::testing::VecSink;

    const TEST: CommandLayout = CommandLayout::mfx("TEST", 7, 0x10, 4);

    command_fields! {
        /// Test layout
        TestCommand {
            low_bit = 1 [0:0],
            middle = 1 [11:4],
            signed = 2 [4:0],
            wide = 3 [31:0],
            beyond = 9 [3:0],
        }
    }

    #[test]
    fn test_header_encoding() {
        let rec = CommandRecord::begin(&TEST);
        assert_eq!(rec.dwords()[0], 0x7390_0002);
        assert_eq!(rec.dwords()[1..], [0, 0, 0]);
    }

    #[test]
    fn test_field_masking() {
        let mut rec = CommandRecord::begin(&TEST);
        rec.set(test_command::MIDDLE, 0x1FF).unwrap();
        rec.set_bool(test_command::LOW_BIT, true).unwrap();
        rec.set_signed(test_command::SIGNED, -3).unwrap();
        rec.set(test_command::WIDE, 0xDEAD_BEEF).unwrap();

        assert_eq!(rec.dwords()[1], 0xFF1);
        assert_eq!(rec.get(test_command::SIGNED), Some(0x1D));
        assert_eq!(rec.get(test_command::WIDE), Some(0xDEAD_BEEF));
        assert_eq!(rec.set(test_command::BEYOND, 1), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_extend_updates_length() {
        let mut rec = CommandRecord::begin(&CommandLayout::mfx("INSERT", 7, 0x22, 2));
        rec.extend(&[1, 2, 3]);
        assert_eq!(rec.dwords()[0] & 0xFFF, 3);
        assert_eq!(rec.size(), 20);
    }

    #[test]
    fn test_append_all_or_nothing() {
        let mut sink = VecSink::with_capacity(12);
        let rec = CommandRecord::begin(&TEST);
        assert_eq!(rec.append(&mut sink), Err(Error::CommandBufferFull));
        assert_eq!(sink.used(), 0);

        let mut sink = VecSink::with_capacity(16);
        CommandRecord::begin(&TEST).append(&mut sink).unwrap();
        assert_eq!(sink.dwords(), [0x7390_0002, 0, 0, 0]);
    }

    #[test]
    fn test_address_split() {
        let mut rec = CommandRecord::begin(&TEST);
        rec.set_address(1, GpuAddr::new(0x1_2345_6780)).unwrap();
        assert_eq!(rec.dwords()[1..3], [0x2345_6780, 1]);
        assert_eq!(rec.set_address(3, GpuAddr::null()), Err(Error::InvalidParameter));
    }
}
