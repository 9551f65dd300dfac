//! # Scaling Lists
//!
//! HCP_QM_STATE carries the inverse quantization matrices, HCP_FQM_STATE the
//! forward (reciprocal) ones.
//!
//! ```text
//!  QM   size 4x4 | 8x8 | 16x16 | 32x32   x  intra, inter  x  Y, Cb, Cr   (32x32: Y only)  = 20
//!  FQM  size 4x4 | 8x8 | 16x16 | 32x32   x  intra, inter  x  Y                            =  8
//! ```

use alloc::vec::Vec;

use spin::Once;
use vdbox_core::{Error, QuantMatrix, Result};

use crate::command_fields;
use crate::encoder::EncodeCommand;
use crate::generation::{CommandId, GenerationDescriptor};
use crate::record::{CommandLayout, CommandRecord};

command_fields! {
    /// HCP_QM_STATE
    HcpQmState {
        prediction_type = 1 [0:0],
        size_id = 1 [2:1],
        color_component = 1 [4:3],
        dc_coefficient = 1 [12:5],
    }
}

command_fields! {
    /// HCP_FQM_STATE
    HcpFqmState {
        intra_inter = 1 [0:0],
        size_id = 1 [2:1],
        color_component = 1 [4:3],
        fqm_dc = 1 [31:16],
    }
}

/// HCP_QM_STATE commands per picture
pub const QM_COMMAND_COUNT: usize = 20;

/// HCP_FQM_STATE commands per picture
pub const FQM_COMMAND_COUNT: usize = 8;

/// First matrix dword
const MATRIX_DW: usize = 2;

/// Transform size class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SizeId {
    /// 4x4
    Size4x4 = 0,
    /// 8x8
    Size8x8 = 1,
    /// 16x16
    Size16x16 = 2,
    /// 32x32
    Size32x32 = 3,
}

impl SizeId {
    /// All size classes, smallest first
    pub const ALL: [SizeId; 4] = [Self::Size4x4, Self::Size8x8, Self::Size16x16, Self::Size32x32];

    /// Coefficients carried for the class
    pub const fn coefficients(self) -> usize {
        match self {
            Self::Size4x4 => 16,
            _ => 64,
        }
    }

    fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }
}

// =============================================================================
// RECIPROCAL SCALING
// =============================================================================

/// Forward scaling value for an inverse scaling entry
#[inline]
pub const fn reciprocal_scaling(value: u8) -> u16 {
    if value == 0 {
        0xFFFF
    } else {
        let v = value as u32;
        ((0xFFFF + v / 2) / v) as u16
    }
}

static RECIPROCALS: Once<[u16; 256]> = Once::new();

fn reciprocal_table() -> &'static [u16; 256] {
    RECIPROCALS.call_once(|| {
        let mut table = [0u16; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = reciprocal_scaling(i as u8);
        }
        table
    })
}

// =============================================================================
// QM STATE
// =============================================================================

/// One HCP_QM_STATE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QmState {
    /// Size class
    pub size: SizeId,
    /// 0 intra, 1 inter
    pub prediction_type: u8,
    /// 0 Y, 1 Cb, 2 Cr
    pub color: u8,
    /// DC coefficient (16x16 and 32x32)
    pub dc: u8,
    /// Row-major coefficients, `size.coefficients()` of them
    pub coefficients: [u8; 64],
}

impl EncodeCommand for QmState {
    const ID: CommandId = CommandId::HcpQmState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set(hcp_qm_state::PREDICTION_TYPE, self.prediction_type as u32)?;
        rec.set(hcp_qm_state::SIZE_ID, self.size as u32)?;
        rec.set(hcp_qm_state::COLOR_COMPONENT, self.color as u32)?;
        rec.set(hcp_qm_state::DC_COEFFICIENT, self.dc as u32)?;
        for (i, chunk) in self.coefficients.chunks_exact(4).enumerate() {
            rec.set_dword(MATRIX_DW + i, u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))?;
        }
        Ok(())
    }
}

/// List index of a (prediction type, color) pair for a size class
const fn list_index(size: SizeId, prediction_type: u8, color: u8) -> usize {
    match size {
        SizeId::Size32x32 => prediction_type as usize,
        _ => 3 * prediction_type as usize + color as usize,
    }
}

/// The 20 HCP_QM_STATE commands of a matrix set, in hardware order
pub fn qm_states(matrix: &QuantMatrix) -> Vec<QmState> {
    let mut states = Vec::with_capacity(QM_COMMAND_COUNT);
    for size in SizeId::ALL {
        for prediction_type in 0..2u8 {
            for color in 0..3u8 {
                if size == SizeId::Size32x32 && color != 0 {
                    break;
                }
                let idx = list_index(size, prediction_type, color);
                let mut coefficients = [0u8; 64];
                let dc = match size {
                    SizeId::Size4x4 => {
                        coefficients[..16].copy_from_slice(&matrix.list_4x4[idx]);
                        0
                    }
                    SizeId::Size8x8 => {
                        coefficients = matrix.list_8x8[idx];
                        0
                    }
                    SizeId::Size16x16 => {
                        coefficients = matrix.list_16x16[idx];
                        matrix.dc_16x16[idx]
                    }
                    SizeId::Size32x32 => {
                        coefficients = matrix.list_32x32[idx];
                        matrix.dc_32x32[idx]
                    }
                };
                states.push(QmState {
                    size,
                    prediction_type,
                    color,
                    dc,
                    coefficients,
                });
            }
        }
    }
    states
}

/// Parse a stream of serialized HCP_QM_STATE commands back into a matrix set
///
/// Entries not covered by the stream are left zero.
pub fn decode_qm(layout: &CommandLayout, dwords: &[u32]) -> Result<QuantMatrix> {
    let mut matrix = QuantMatrix {
        list_4x4: [[0; 16]; 6],
        list_8x8: [[0; 64]; 6],
        list_16x16: [[0; 64]; 6],
        list_32x32: [[0; 64]; 2],
        dc_16x16: [0; 6],
        dc_32x32: [0; 2],
    };

    let header_mask = !CommandLayout::MFX_LENGTH.mask();
    for cmd in dwords.chunks(layout.dwords as usize) {
        if cmd.len() != layout.dwords as usize || cmd[0] & header_mask != layout.header {
            return Err(Error::InvalidParameter);
        }
        let size = SizeId::from_raw(hcp_qm_state::SIZE_ID.decode(cmd[1])).ok_or(Error::InvalidParameter)?;
        let prediction_type = hcp_qm_state::PREDICTION_TYPE.decode(cmd[1]) as u8;
        let color = hcp_qm_state::COLOR_COMPONENT.decode(cmd[1]) as u8;
        if color > 2 || (size == SizeId::Size32x32 && color != 0) {
            return Err(Error::InvalidParameter);
        }
        let dc = hcp_qm_state::DC_COEFFICIENT.decode(cmd[1]) as u8;

        let mut bytes = [0u8; 64];
        for (i, dw) in cmd[MATRIX_DW..MATRIX_DW + 16].iter().enumerate() {
            bytes[4 * i..4 * i + 4].copy_from_slice(&dw.to_le_bytes());
        }

        let idx = list_index(size, prediction_type, color);
        match size {
            SizeId::Size4x4 => matrix.list_4x4[idx].copy_from_slice(&bytes[..16]),
            SizeId::Size8x8 => matrix.list_8x8[idx] = bytes,
            SizeId::Size16x16 => {
                matrix.list_16x16[idx] = bytes;
                matrix.dc_16x16[idx] = dc;
            }
            SizeId::Size32x32 => {
                matrix.list_32x32[idx] = bytes;
                matrix.dc_32x32[idx] = dc;
            }
        }
    }
    Ok(matrix)
}

// =============================================================================
// FQM STATE
// =============================================================================

/// One HCP_FQM_STATE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FqmState {
    /// Size class
    pub size: SizeId,
    /// 0 intra, 1 inter
    pub intra_inter: u8,
    /// Reciprocal DC (16x16 and 32x32)
    pub dc: u16,
    /// Reciprocal coefficients, zero beyond `size.coefficients()`
    pub coefficients: [u16; 64],
}

impl EncodeCommand for FqmState {
    const ID: CommandId = CommandId::HcpFqmState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set(hcp_fqm_state::INTRA_INTER, self.intra_inter as u32)?;
        rec.set(hcp_fqm_state::SIZE_ID, self.size as u32)?;
        rec.set(hcp_fqm_state::COLOR_COMPONENT, 0)?;
        rec.set(hcp_fqm_state::FQM_DC, self.dc as u32)?;
        for (i, pair) in self.coefficients.chunks_exact(2).enumerate() {
            rec.set_dword(MATRIX_DW + i, pair[0] as u32 | (pair[1] as u32) << 16)?;
        }
        Ok(())
    }
}

/// The 8 HCP_FQM_STATE commands of a matrix set (luma lists only)
pub fn fqm_states(matrix: &QuantMatrix) -> Vec<FqmState> {
    let table = reciprocal_table();
    let mut states = Vec::with_capacity(FQM_COMMAND_COUNT);
    for size in SizeId::ALL {
        for intra_inter in 0..2u8 {
            let idx = list_index(size, intra_inter, 0);
            let (list, dc): (&[u8], u16) = match size {
                SizeId::Size4x4 => (&matrix.list_4x4[idx][..], 0),
                SizeId::Size8x8 => (&matrix.list_8x8[idx][..], 0),
                SizeId::Size16x16 => (&matrix.list_16x16[idx][..], table[matrix.dc_16x16[idx] as usize]),
                SizeId::Size32x32 => (&matrix.list_32x32[idx][..], table[matrix.dc_32x32[idx] as usize]),
            };

            let mut coefficients = [0u16; 64];
            for (dst, &src) in coefficients.iter_mut().zip(list) {
                *dst = table[src as usize];
            }
            states.push(FqmState {
                size,
                intra_inter,
                dc,
                coefficients,
            });
        }
    }
    states
}
