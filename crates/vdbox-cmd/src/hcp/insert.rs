//! # Header Insertion
//!
//! `HCP_PAK_INSERT_OBJECT` carries packed header bytes inline behind its two
//! fixed dwords. Three shapes exist:
//!
//! ```text
//!  generic      DW1 flags | ceil(bytes/4) payload dwords, bits % 32 in last dw
//!  EOS + EOB    DW1 eos|last, 16 bits | 3 fixed dwords
//!  EOS or EOB   DW1 eos|last,  8 bits | 2 fixed dwords per NAL
//! ```
//!
//! NAL units longer than the DW0 length field can describe are cut into
//! several inserts of at most [`MAX_INSERT_BYTES`].

use alloc::vec::Vec;

use arrayvec::ArrayVec;
use vdbox_core::{Error, PackedHeader, Result};

use crate::command_fields;
use crate::encoder::EncodeCommand;
use crate::generation::{CommandId, GenerationDescriptor};
use crate::record::CommandRecord;

command_fields! {
    /// HCP_PAK_INSERT_OBJECT
    HcpPakInsertObject {
        end_of_slice = 1 [1:1],
        last_header = 1 [2:2],
        emulation_insert = 1 [3:3],
        skip_emulation_count = 1 [7:4],
        data_bits_in_last_dw = 1 [13:8],
        slice_header_indicator = 1 [14:14],
        header_length_exclude_frame_size = 1 [15:15],
        indirect_payload = 1 [31:31],
    }
}

/// HEVC end-of-sequence NAL unit type
pub const NAL_END_OF_SEQUENCE: u32 = 36;

/// HEVC end-of-bitstream NAL unit type
pub const NAL_END_OF_BITSTREAM: u32 = 37;

/// Largest payload one insert can carry (12-bit dword length)
pub const MAX_INSERT_BYTES: u32 = ((2 << 11) - 1) * 4;

/// Payload closing both the sequence and the stream
pub const END_OF_STREAM_PAYLOAD: [u32; 3] = [
    (1 << 16) | ((NAL_END_OF_SEQUENCE << 1) << 24),
    1 | (1 << 24),
    (NAL_END_OF_BITSTREAM << 1) | (1 << 8),
];

/// Two-dword payload of a lone EOS or EOB NAL unit
const fn end_nal_payload(nal_type: u32) -> [u32; 2] {
    [(1 << 16) | ((nal_type << 1) << 24), 1]
}

// =============================================================================
// PAK INSERT
// =============================================================================

/// One HCP_PAK_INSERT_OBJECT
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PakInsert {
    /// Inline payload dwords
    pub payload: Vec<u32>,
    /// Valid bits in the last payload dword (1..=32)
    pub data_bits_in_last_dw: u8,
    /// Last data inserted for the slice
    pub end_of_slice: bool,
    /// Last header before slice data
    pub last_header: bool,
    /// Hardware emulation prevention
    pub emulation: bool,
    /// Leading bytes exempt from emulation prevention
    pub skip_emulation_count: u8,
    /// Restart the bitstream position (split slice headers)
    pub slice_header_indicator: bool,
}

/// Pack `bytes` into little-endian dwords, zero padding the tail
fn pack_dwords(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut dw = [0u8; 4];
            dw[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(dw)
        })
        .collect()
}

impl PakInsert {
    /// Generic insert of `bit_length` bits starting at `data[0]`
    pub fn from_bits(data: &[u8], bit_length: u32) -> Result<Self> {
        let bytes = ((bit_length + 7) >> 3) as usize;
        if bytes > data.len() || bytes as u32 > MAX_INSERT_BYTES {
            return Err(Error::InvalidParameter);
        }
        let bits = bit_length % 32;
        Ok(Self {
            payload: pack_dwords(&data[..bytes]),
            data_bits_in_last_dw: if bits == 0 { 32 } else { bits as u8 },
            ..Self::default()
        })
    }

    /// End-of-sequence and / or end-of-bitstream NAL units
    ///
    /// Returns `None` when neither is requested.
    pub fn end_of_stream(last_in_sequence: bool, last_in_stream: bool) -> Option<Self> {
        let (payload, bits) = match (last_in_sequence, last_in_stream) {
            (true, true) => (END_OF_STREAM_PAYLOAD.to_vec(), 16),
            (true, false) => (end_nal_payload(NAL_END_OF_SEQUENCE).to_vec(), 8),
            (false, true) => (end_nal_payload(NAL_END_OF_BITSTREAM).to_vec(), 8),
            (false, false) => return None,
        };
        Some(Self {
            payload,
            data_bits_in_last_dw: bits,
            end_of_slice: true,
            last_header: true,
            ..Self::default()
        })
    }

    /// Inserts for a VPS / SPS / PPS / SEI NAL unit, split at [`MAX_INSERT_BYTES`]
    pub fn nal_unit(header: &PackedHeader) -> Result<Vec<Self>> {
        let total_bytes = (header.bit_length + 7) >> 3;
        if total_bytes as usize > header.data.len() {
            return Err(Error::InvalidParameter);
        }

        let mut inserts = Vec::with_capacity(total_bytes.div_ceil(MAX_INSERT_BYTES).max(1) as usize);
        let mut offset = 0u32;
        loop {
            let remaining_bits = header.bit_length - offset * 8;
            let bits = remaining_bits.min(MAX_INSERT_BYTES * 8);
            let mut insert = Self::from_bits(&header.data[offset as usize..], bits)?;
            insert.emulation = header.emulation_required;
            insert.skip_emulation_count = header.skip_emulation_bytes;
            inserts.push(insert);

            if remaining_bits <= MAX_INSERT_BYTES * 8 {
                break;
            }
            offset += MAX_INSERT_BYTES;
        }
        Ok(inserts)
    }

    /// Inserts for a slice header
    ///
    /// With `starting_portion_bits` (slice-size control) the header is issued
    /// as two inserts: the start code and NAL header without emulation, then
    /// the rest from the next whole byte. Both restart the bitstream position.
    pub fn slice_header(header: &PackedHeader, starting_portion_bits: Option<u32>) -> Result<ArrayVec<Self, 2>> {
        let mut inserts = ArrayVec::new();
        match starting_portion_bits {
            None => {
                let mut insert = Self::from_bits(&header.data, header.bit_length)?;
                insert.last_header = true;
                insert.emulation = true;
                insert.skip_emulation_count = header.skip_emulation_bytes;
                inserts.push(insert);
            }
            Some(start) => {
                if start == 0 || start >= header.bit_length {
                    return Err(Error::InvalidParameter);
                }
                let mut first = Self::from_bits(&header.data, start)?;
                first.skip_emulation_count = header.skip_emulation_bytes;
                first.slice_header_indicator = true;

                let skip = ((start + 7) / 8) as usize;
                let mut rest = Self::from_bits(&header.data[skip..], header.bit_length - start)?;
                rest.last_header = true;
                rest.skip_emulation_count = header.skip_emulation_bytes;
                rest.slice_header_indicator = true;

                inserts.push(first);
                inserts.push(rest);
            }
        }
        Ok(inserts)
    }

    /// Size in bytes once encoded
    pub fn size(&self) -> usize {
        (2 + self.payload.len()) * 4
    }
}

impl EncodeCommand for PakInsert {
    const ID: CommandId = CommandId::HcpPakInsertObject;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use hcp_pak_insert_object as f;

        rec.set_bool(f::END_OF_SLICE, self.end_of_slice)?;
        rec.set_bool(f::LAST_HEADER, self.last_header)?;
        rec.set_bool(f::EMULATION_INSERT, self.emulation)?;
        rec.set(f::SKIP_EMULATION_COUNT, self.skip_emulation_count as u32)?;
        rec.set(f::DATA_BITS_IN_LAST_DW, self.data_bits_in_last_dw as u32)?;
        rec.set_bool(f::SLICE_HEADER_INDICATOR, self.slice_header_indicator)?;
        rec.extend(&self.payload);
        Ok(())
    }
}

/// Bytes of the inserts needed for a header of `header_bytes`
///
/// `insert_size` is the fixed part of one insert on the generation.
pub fn insert_commands_size(insert_size: usize, header_bytes: u32) -> usize {
    let commands = header_bytes.div_ceil(MAX_INSERT_BYTES).max(1) as usize;
    commands * insert_size + header_bytes.div_ceil(4) as usize * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use vdbox_core::Generation;

    fn gen12() -> &'static GenerationDescriptor {
        GenerationDescriptor::for_generation(Generation::Gen12)
    }

    #[test]
    fn test_end_of_stream_pattern() {
        let insert = PakInsert::end_of_stream(true, true).unwrap();
        assert_eq!(insert.payload, [0x4801_0000, 0x0100_0001, 0x0000_014A]);
        assert_eq!(insert.data_bits_in_last_dw, 16);

        let rec = insert.encode(gen12()).unwrap();
        // 2 fixed dwords + 3 padding dwords
        assert_eq!(rec.dwords()[0] & 0xFFF, 3);
        assert_eq!(rec.dwords()[1], (1 << 1) | (1 << 2) | (16 << 8));
        assert_eq!(rec.dwords()[2..], [0x4801_0000, 0x0100_0001, 0x0000_014A]);
    }

    #[test]
    fn test_single_end_nal() {
        let eos = PakInsert::end_of_stream(true, false).unwrap();
        assert_eq!(eos.payload, [0x4801_0000, 1]);
        assert_eq!(eos.data_bits_in_last_dw, 8);

        let eob = PakInsert::end_of_stream(false, true).unwrap();
        assert_eq!(eob.payload, [0x4A01_0000, 1]);
        assert!(PakInsert::end_of_stream(false, false).is_none());
    }

    #[test]
    fn test_generic_padding() {
        let insert = PakInsert::from_bits(&[0x00, 0x00, 0x01, 0x40, 0x01], 37).unwrap();
        assert_eq!(insert.payload, [0x4001_0000, 0x01]);
        assert_eq!(insert.data_bits_in_last_dw, 5);

        let aligned = PakInsert::from_bits(&[1, 2, 3, 4], 32).unwrap();
        assert_eq!(aligned.data_bits_in_last_dw, 32);
        assert_eq!(PakInsert::from_bits(&[1], 16), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_long_nal_split() {
        let header = PackedHeader {
            data: vec![0xAB; 20000],
            bit_length: 20000 * 8,
            skip_emulation_bytes: 5,
            emulation_required: true,
        };
        let inserts = PakInsert::nal_unit(&header).unwrap();
        assert_eq!(inserts.len(), 2);
        assert_eq!(inserts[0].payload.len() as u32, MAX_INSERT_BYTES / 4);
        assert_eq!(inserts[1].payload.len(), (20000 - MAX_INSERT_BYTES as usize).div_ceil(4));
        assert!(inserts.iter().all(|i| i.emulation && i.skip_emulation_count == 5));
    }

    #[test]
    fn test_slice_header_split() {
        let header = PackedHeader {
            data: vec![0, 0, 1, 0x26, 0x01, 0xAF, 0x10],
            bit_length: 52,
            skip_emulation_bytes: 5,
            emulation_required: true,
        };

        let whole = PakInsert::slice_header(&header, None).unwrap();
        assert_eq!(whole.len(), 1);
        assert!(whole[0].last_header && whole[0].emulation);

        let split = PakInsert::slice_header(&header, Some(40)).unwrap();
        assert_eq!(split.len(), 2);
        assert!(!split[0].last_header && !split[0].emulation);
        assert_eq!(split[0].data_bits_in_last_dw, 8);
        assert_eq!(split[1].payload, [0x10AF]);
        assert_eq!(split[1].data_bits_in_last_dw, 12);
        assert!(split.iter().all(|i| i.slice_header_indicator));

        assert_eq!(PakInsert::slice_header(&header, Some(52)).err(), Some(Error::InvalidParameter));
    }

    #[test]
    fn test_insert_size_estimate() {
        assert_eq!(insert_commands_size(8, 10), 8 + 12);
        assert_eq!(insert_commands_size(8, MAX_INSERT_BYTES + 1), 16 + MAX_INSERT_BYTES as usize + 4);
    }
}
