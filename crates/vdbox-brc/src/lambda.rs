//! # Lambda Tables
//!
//! Rate-distortion and SAD lambdas per QP, loaded into the BRC constant
//! data buffer ahead of every update pass.
//!
//! ```text
//!  lambda(qp) = scale * 2^(max(0, qp - 12) / 3)
//!  rd         = min(65535, 4 * lambda + 0.5)        U14.2
//!  sad        = min(65535, 4 * sqrt(lambda) + 0.5)  U8.2
//! ```
//!
//! The scale depends on the coding type and, for low-delay and
//! random-access pyramids, on the hierarchy depth of the picture.

use arrayvec::ArrayVec;
use libm::{pow, sqrt};

use vdbox_core::{CodingType, Error, PictureParams, Result, SequenceParams};

/// QPs covered by the firmware constant tables
pub const HUC_QP_RANGE: usize = 52;

/// Largest table: 12-bit content extends the QP range by 24
pub const MAX_LAMBDA_QPS: usize = HUC_QP_RANGE + 24;

/// Bytes written by [`LambdaTables::write_const_data`]
pub const LAMBDA_CONST_DATA_SIZE: usize = 4 * HUC_QP_RANGE * 2;

/// Per-depth scale of low-delay P / B pictures
const LOW_DELAY_FACTORS: [f64; 3] = [0.578, 0.3524, 0.3524];

/// Random-access scales by GOP (4, 8): base, depth 0, depth 1, depth 2
const RA_SCALE: [[f64; 4]; 2] = [[1.8, 0.9, 1.7, 1.0], [2.0, 0.9, 1.4, 0.8]];

/// Lambda table of one picture
pub type LambdaTable = ArrayVec<u16, MAX_LAMBDA_QPS>;

/// RD and SAD lambdas for intra and inter coding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaTables {
    /// RD lambdas of intra pictures
    pub rd_intra: LambdaTable,
    /// RD lambdas of inter pictures
    pub rd_inter: LambdaTable,
    /// SAD lambdas of intra pictures
    pub sad_intra: LambdaTable,
    /// SAD lambdas of inter pictures
    pub sad_inter: LambdaTable,
}

impl LambdaTables {
    /// Compute the tables for a picture
    ///
    /// The inter tables follow the picture's own coding type; an intra
    /// picture gets P-picture inter tables. Bit depths above 12 are rejected.
    pub fn compute(seq: &SequenceParams, pic: &PictureParams) -> Result<Self> {
        let depth = seq.bit_depth_luma_minus8;
        if depth > 4 {
            return Err(Error::InvalidParameter);
        }
        let qps = HUC_QP_RANGE + 6 * depth as usize;

        let inter_type = match pic.coding_type {
            CodingType::I => CodingType::P,
            other => other,
        };

        let mut tables = Self {
            rd_intra: ArrayVec::new(),
            rd_inter: ArrayVec::new(),
            sad_intra: ArrayVec::new(),
            sad_inter: ArrayVec::new(),
        };
        for qp in 0..qps as u8 {
            let (sad, rd) = depth_based_lambda(seq, CodingType::I, pic.hierarchical_level_plus1, qp);
            tables.sad_intra.push(sad);
            tables.rd_intra.push(rd);

            let (sad, rd) = depth_based_lambda(seq, inter_type, pic.hierarchical_level_plus1, qp);
            tables.sad_inter.push(sad);
            tables.rd_inter.push(rd);
        }
        Ok(tables)
    }

    /// Number of QPs in each table
    pub fn len(&self) -> usize {
        self.rd_intra.len()
    }

    /// Whether the tables are empty
    pub fn is_empty(&self) -> bool {
        self.rd_intra.is_empty()
    }

    /// Write the SAD (I, P) then RD (I, P) tables as little-endian u16
    ///
    /// Only the first [`HUC_QP_RANGE`] entries of each table fit the
    /// firmware layout.
    pub fn write_const_data(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < LAMBDA_CONST_DATA_SIZE || self.len() < HUC_QP_RANGE {
            return Err(Error::CapacityExceeded);
        }
        let tables = [&self.sad_intra, &self.sad_inter, &self.rd_intra, &self.rd_inter];
        for (chunk, table) in out.chunks_exact_mut(HUC_QP_RANGE * 2).zip(tables) {
            for (dst, value) in chunk.chunks_exact_mut(2).zip(table.iter()) {
                dst.copy_from_slice(&value.to_le_bytes());
            }
        }
        Ok(LAMBDA_CONST_DATA_SIZE)
    }
}

/// `(sad, rd)` lambda of one QP
fn depth_based_lambda(seq: &SequenceParams, coding_type: CodingType, level_plus1: u8, qp: u8) -> (u16, u16) {
    let depth = level_plus1.saturating_sub(1) as usize;
    let mut scale = if coding_type == CodingType::I { 0.60 } else { 0.65 };

    if seq.low_delay {
        // Low-delay pyramids are treated as GOP 4
        let gop: f64 = 4.0;
        if coding_type == CodingType::I {
            scale = 0.57 * (1.0 - (0.05 * (gop - 1.0)).clamp(0.0, 0.5));
        } else {
            scale = LOW_DELAY_FACTORS[depth.min(LOW_DELAY_FACTORS.len() - 1)];
            if depth > 0 {
                scale *= ((qp as f64 - 12.0) / 6.0).clamp(2.0, 4.0);
            }
        }
    } else if coding_type == CodingType::B {
        let ra = match seq.gop_ref_dist {
            4 => Some((
                &RA_SCALE[0],
                match depth {
                    2 => 1.0 * RA_SCALE[0][3],
                    1 => 0.52 * RA_SCALE[0][2],
                    0 => 0.65 * RA_SCALE[0][1],
                    _ => 1.0,
                },
            )),
            8 => Some((
                &RA_SCALE[1],
                match depth {
                    3 => 1.0 * RA_SCALE[1][3],
                    1 | 2 => 0.52 * RA_SCALE[1][2],
                    0 => 0.65 * RA_SCALE[1][1],
                    _ => 1.0,
                },
            )),
            _ => None,
        };
        if let Some((row, ra_scale)) = ra {
            scale *= ra_scale * row[0];
        }
    }

    let lambda = scale * pow(2.0, (qp as f64 - 12.0).max(0.0) / 3.0);
    let rd = (lambda * 4.0 + 0.5).min(65535.0) as u16;
    let sad = (sqrt(lambda) * 4.0 + 0.5).min(65535.0) as u16;
    (sad, rd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_non_decreasing(table: &LambdaTable) {
        assert!(table.windows(2).all(|w| w[0] <= w[1]), "{:?}", table);
    }

    #[test]
    fn test_monotonic_in_qp() {
        let pyramids = [(true, 1u8, 0u8), (true, 1, 3), (false, 4, 2), (false, 8, 1), (false, 8, 4)];
        for (low_delay, gop_ref_dist, level) in pyramids {
            let seq = SequenceParams {
                low_delay,
                gop_ref_dist,
                ..SequenceParams::default()
            };
            let pic = PictureParams {
                coding_type: CodingType::B,
                hierarchical_level_plus1: level,
                ..PictureParams::default()
            };
            let tables = LambdaTables::compute(&seq, &pic).unwrap();
            assert_eq!(tables.len(), HUC_QP_RANGE);
            assert_non_decreasing(&tables.rd_intra);
            assert_non_decreasing(&tables.rd_inter);
            assert_non_decreasing(&tables.sad_intra);
            assert_non_decreasing(&tables.sad_inter);
        }
    }

    #[test]
    fn test_known_values() {
        let seq = SequenceParams {
            low_delay: false,
            ..SequenceParams::default()
        };
        let pic = PictureParams::default();
        let tables = LambdaTables::compute(&seq, &pic).unwrap();

        // qp 12: lambda = 0.60, rd = 2, sad = 3
        assert_eq!(tables.rd_intra[12], 2);
        assert_eq!(tables.sad_intra[12], 3);
        // qp 51: lambda = 0.60 * 2^13 = 4915.2
        assert_eq!(tables.rd_intra[51], 19661);
        assert_eq!(tables.sad_intra[51], 280);
        // Below 12 the table is flat
        assert_eq!(tables.rd_intra[0], tables.rd_intra[12]);
    }

    #[test]
    fn test_high_bit_depth_range() {
        let seq = SequenceParams {
            bit_depth_luma_minus8: 2,
            ..SequenceParams::default()
        };
        let tables = LambdaTables::compute(&seq, &PictureParams::default()).unwrap();
        assert_eq!(tables.len(), 64);

        let too_deep = SequenceParams {
            bit_depth_luma_minus8: 6,
            ..SequenceParams::default()
        };
        assert_eq!(
            LambdaTables::compute(&too_deep, &PictureParams::default()),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_write_const_data() {
        let tables = LambdaTables::compute(&SequenceParams::default(), &PictureParams::default()).unwrap();
        let mut out = [0u8; LAMBDA_CONST_DATA_SIZE];
        assert_eq!(tables.write_const_data(&mut out), Ok(416));

        let at = |table: usize, qp: usize| {
            let off = table * HUC_QP_RANGE * 2 + qp * 2;
            u16::from_le_bytes([out[off], out[off + 1]])
        };
        assert_eq!(at(0, 30), tables.sad_intra[30]);
        assert_eq!(at(1, 30), tables.sad_inter[30]);
        assert_eq!(at(2, 51), tables.rd_intra[51]);
        assert_eq!(at(3, 51), tables.rd_inter[51]);

        let mut short = [0u8; 100];
        assert_eq!(tables.write_const_data(&mut short), Err(Error::CapacityExceeded));
    }
}
