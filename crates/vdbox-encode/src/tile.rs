//! # Tile Partitioning
//!
//! Splits a picture into HEVC tiles and carves every per-frame streamout
//! buffer into disjoint per-tile regions.
//!
//! ```text
//!   colBd:   0        c1            c2 (= width in LCU)
//!            ┌────────┬─────────────┐ rowBd 0
//!            │ tile 0 │   tile 1    │
//!            ├────────┼─────────────┤ r1
//!            │ tile 2 │   tile 3    │
//!            └────────┴─────────────┘ r2 (= height in LCU)
//!
//!   bitstream  │ t0 ──────│ t1 ──────│ t2 ────│ t3 ────│ reserved tail │
//!              offsets in 64-byte units, proportional to tile LCU count
//! ```
//!
//! SAO and SSE row stores are shared between tile rows: their offsets
//! restart at zero at the beginning of each row. Every other offset keeps
//! growing in raster order across the whole picture.

use alloc::vec::Vec;

use vdbox_cmd::hcp::{CtbPosition, TileCoding};
use vdbox_cmd::vdenc::WalkerState;
use vdbox_core::{
    align_up, align_up_u64, div_ceil, Error, PictureParams, RateControlMode, Result, SequenceParams,
    CACHELINE_SIZE, MAX_TILE_COLUMNS, MAX_TILE_ROWS, PAGE_SIZE,
};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Narrowest tile VDEnc accepts, in pixels
pub const MIN_TILE_WIDTH: u32 = 256;

/// Shortest tile VDEnc accepts, in pixels
pub const MIN_TILE_HEIGHT: u32 = 128;

/// Bytes of one PAK CU record
pub const CU_RECORD_SIZE: u32 = 64;

/// SSE source-pixel row store bytes per LCU column
pub const SSE_ROWSTORE_PER_LCU: u32 = (64 * 8) << 1;

/// SAO streamout bytes per LCU
pub const SAO_STREAMOUT_PER_LCU: u32 = 16;

/// PAK frame statistics block
pub const PAK_FRAME_STATS_SIZE: u32 = 8 * CACHELINE_SIZE;

/// VDEnc statistics block
pub const VDENC_STATS_SIZE: u32 = 1216;

/// Slice-size streamout bytes per LCU
pub const SLICE_STREAMOUT_PER_LCU: u32 = CACHELINE_SIZE;

/// Dwords of PAK statistics each tile writes
const PAK_TILE_STATS_STRIDE: u32 = 9;

/// CU records per LCU, indexed by `min(3, log2_lcu - 3)`
const CU_RECORDS_PER_LCU: [u32; 4] = [1, 4, 16, 64];

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// One tile of the picture
///
/// Offsets are in 64-byte units into the buffer they name, except
/// `tile_size_streamout_offset` and `pak_tile_statistics_offset` which the
/// hardware scales itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileDescriptor {
    /// Raster index
    pub index: u32,
    /// Tile row
    pub row: u16,
    /// Tile column
    pub column: u16,
    /// Tiles in the picture
    pub num_tiles: u32,
    /// Tile columns in the picture
    pub num_columns: u16,

    /// First LCU column
    pub start_x: u32,
    /// First LCU row
    pub start_y: u32,
    /// One past the last LCU column
    pub end_x: u32,
    /// One past the last LCU row
    pub end_y: u32,
    /// Width in minimum coding blocks, minus one
    pub width_in_min_cb_minus1: u16,
    /// Height in minimum coding blocks, minus one
    pub height_in_min_cb_minus1: u16,
    /// Rightmost tile of its row
    pub is_last_in_row: bool,
    /// Bottom tile of its column
    pub is_last_in_column: bool,
    /// Column store parity
    pub column_store_select: bool,
    /// Row store parity
    pub row_store_select: bool,

    /// LCUs in the tile
    pub num_lcus: u32,
    /// Start of the tile's bitstream partition
    pub bitstream_offset: u32,
    /// Bytes of the tile's bitstream partition
    pub bitstream_size: u32,
    /// CU record streamout
    pub cu_record_offset: u32,
    /// CU-level streamout
    pub cu_level_streamout_offset: u32,
    /// SSE source-pixel row store
    pub sse_rowstore_offset: u32,
    /// SAO row store
    pub sao_rowstore_offset: u32,
    /// PAK tile statistics
    pub pak_tile_statistics_offset: u32,
    /// Tile size record
    pub tile_size_streamout_offset: u32,
    /// Slice size streamout, in LCUs
    pub slice_size_streamout_offset: u32,
    /// VDEnc stream-in, 4 cache lines per LCU
    pub streamin_offset: u32,
}

impl TileDescriptor {
    /// Tile width in LCUs
    pub const fn width_in_lcu(&self) -> u32 {
        self.end_x - self.start_x
    }

    /// Tile height in LCUs
    pub const fn height_in_lcu(&self) -> u32 {
        self.end_y - self.start_y
    }

    /// Whether LCU `(x, y)` lies inside the tile
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.start_x && x < self.end_x && y >= self.start_y && y < self.end_y
    }

    /// Top-left LCU
    pub const fn origin(&self) -> CtbPosition {
        CtbPosition {
            x: self.start_x,
            y: self.start_y,
        }
    }

    /// HCP_TILE_CODING for this tile
    pub fn tile_coding(&self, active_pipes: u8, non_first_pass: bool) -> TileCoding {
        TileCoding {
            active_pipes,
            row_store_select: self.row_store_select,
            column_store_select: self.column_store_select,
            num_tile_columns: self.num_columns,
            column_position: self.start_x as u16,
            row_position: self.start_y as u16,
            non_first_pass,
            is_last_in_row: self.is_last_in_row,
            is_last_in_column: self.is_last_in_column,
            width_in_min_cb_minus1: self.width_in_min_cb_minus1,
            height_in_min_cb_minus1: self.height_in_min_cb_minus1,
            bitstream_offset: (self.num_tiles > 1).then_some(self.bitstream_offset),
            pak_frame_statistics_offset: self.pak_tile_statistics_offset,
            cu_level_streamout_offset: self.cu_level_streamout_offset,
            slice_size_streamout_offset: self.slice_size_streamout_offset,
            cu_record_offset: self.cu_record_offset,
            sse_rowstore_offset: self.sse_rowstore_offset,
            sao_rowstore_offset: self.sao_rowstore_offset,
            tile_size_streamout_offset: self.tile_size_streamout_offset,
            vp9_probability_counter_offset: 0,
            tile_number: self.index as u8,
        }
    }

    /// Copy the tile geometry into a VDEnc walker
    pub fn apply_to_walker(&self, walker: &mut WalkerState) {
        walker.tile_row_store_select = self.row_store_select;
        walker.tile_number = self.index as u8;
        walker.tile_start = self.origin();
        walker.tile_width_minus1 = (self.width_in_lcu() - 1) as u16;
        walker.tile_height_minus1 = (self.height_in_lcu() - 1) as u16;
        if self.num_tiles > 1 {
            walker.streamin_offset = Some(self.streamin_offset);
            walker.lcu_streamout_offset = Some(self.cu_level_streamout_offset);
        }
    }
}

// =============================================================================
// PARTITIONER
// =============================================================================

/// Bitstream budget of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBudget {
    /// Bytes of the output bitstream buffer
    pub bitstream_size: u32,
}

/// Tile geometry of a picture
#[derive(Debug, Clone, Copy, Default)]
pub struct TilePartitioner;

impl TilePartitioner {
    /// Partition the picture into tiles in raster order
    ///
    /// A picture without tiles yields one descriptor covering the frame. On
    /// error nothing is produced.
    pub fn partition(seq: &SequenceParams, pic: &PictureParams, budget: &TileBudget) -> Result<Vec<TileDescriptor>> {
        let lcu = seq.lcu_size()?;
        let frame = seq.frame_size();
        let width_in_lcu = frame.width_in_lcu(lcu);
        let height_in_lcu = frame.height_in_lcu(lcu);

        let (columns, rows) = Self::boundaries(pic, width_in_lcu, height_in_lcu)?;
        let num_columns = columns.len() as u32;
        let num_rows = rows.len() as u32;
        let num_tiles = num_columns * num_rows;

        let max_tiles = div_ceil(frame.width, MIN_TILE_WIDTH) * div_ceil(frame.height, MIN_TILE_HEIGHT);
        if num_tiles > max_tiles {
            log::debug!("{} tiles exceed {} for {}x{}", num_tiles, max_tiles, frame.width, frame.height);
            return Err(Error::InvalidParameter);
        }

        let num_lcu_in_pic = Self::lcu_count(&columns, &rows)?;
        let active = Self::active_bitstream_size(seq, budget.bitstream_size)?;

        let shift = seq.log2_max_coding_block_size_minus3 - seq.log2_min_coding_block_size_minus3;
        let width_in_min_cb = seq.width_in_min_cb();
        let height_in_min_cb = seq.height_in_min_cb();
        let min_cb_per_lcu = 1u32 << shift;
        let cu_records = CU_RECORDS_PER_LCU[(seq.log2_max_coding_block_size_minus3 as usize).min(3)];

        let mut col_bd = [0u32; MAX_TILE_COLUMNS + 1];
        for (j, &width) in columns.iter().enumerate() {
            col_bd[j + 1] = col_bd[j] + width;
        }
        let mut row_bd = [0u32; MAX_TILE_ROWS + 1];
        for (i, &height) in rows.iter().enumerate() {
            row_bd[i + 1] = row_bd[i] + height;
        }

        let mut tiles = Vec::with_capacity(num_tiles as usize);
        let mut lcus_before = 0u32;
        let mut bitstream_offset = 0u32;
        let mut cu_level_streamout = 0u32;
        let mut slice_streamout = 0u32;

        for (i, &row_height) in rows.iter().enumerate() {
            let mut sse_rowstore = 0u32;
            let mut sao_rowstore = 0u32;
            let last_row = i as u32 == num_rows - 1;

            for (j, &column_width) in columns.iter().enumerate() {
                let last_column = j as u32 == num_columns - 1;
                let index = i as u32 * num_columns + j as u32;

                let width_in_cb = if last_column {
                    width_in_min_cb - (col_bd[j] << shift)
                } else {
                    column_width << shift
                };
                let height_in_cb = if last_row {
                    height_in_min_cb - (row_bd[i] << shift)
                } else {
                    row_height << shift
                };
                let tile_width_in_lcu = div_ceil(width_in_cb, min_cb_per_lcu);
                let tile_height_in_lcu = div_ceil(height_in_cb, min_cb_per_lcu);
                let num_lcus = row_height * column_width;

                let partition = align_up_u64(
                    (active * num_lcus as u64).div_ceil(num_lcu_in_pic as u64),
                    CACHELINE_SIZE as u64,
                ) as u32;

                tiles.push(TileDescriptor {
                    index,
                    row: i as u16,
                    column: j as u16,
                    num_tiles,
                    num_columns: num_columns as u16,
                    start_x: col_bd[j],
                    start_y: row_bd[i],
                    end_x: col_bd[j] + tile_width_in_lcu,
                    end_y: row_bd[i] + tile_height_in_lcu,
                    width_in_min_cb_minus1: (width_in_cb - 1) as u16,
                    height_in_min_cb_minus1: (height_in_cb - 1) as u16,
                    is_last_in_row: last_column,
                    is_last_in_column: last_row,
                    column_store_select: j % 2 == 1,
                    row_store_select: i % 2 == 1,
                    num_lcus,
                    bitstream_offset,
                    bitstream_size: partition,
                    cu_record_offset: align_up_u64(
                        cu_records as u64 * lcus_before as u64 * CU_RECORD_SIZE as u64,
                        CACHELINE_SIZE as u64,
                    ) as u32
                        / CACHELINE_SIZE,
                    cu_level_streamout_offset: cu_level_streamout,
                    sse_rowstore_offset: sse_rowstore,
                    sao_rowstore_offset: sao_rowstore,
                    pak_tile_statistics_offset: PAK_TILE_STATS_STRIDE * index,
                    tile_size_streamout_offset: index,
                    slice_size_streamout_offset: slice_streamout,
                    streamin_offset: 4 * (row_bd[i] * width_in_lcu + col_bd[j] * tile_height_in_lcu),
                });

                slice_streamout += tile_width_in_lcu * tile_height_in_lcu;
                cu_level_streamout += width_in_cb * height_in_cb * 16 / CACHELINE_SIZE;
                sse_rowstore += (column_width + 3) * SSE_ROWSTORE_PER_LCU / CACHELINE_SIZE;
                sao_rowstore += align_up(column_width, 4) * SAO_STREAMOUT_PER_LCU / CACHELINE_SIZE;
                bitstream_offset += partition / CACHELINE_SIZE;
                lcus_before += num_lcus;
            }
        }

        log::debug!(
            "{}x{} tiles over {} LCUs, bitstream {} of {} bytes",
            num_columns,
            num_rows,
            num_lcu_in_pic,
            active,
            budget.bitstream_size
        );
        Ok(tiles)
    }

    /// LCUs covered by the tile grid
    pub fn lcu_count(columns: &[u32], rows: &[u32]) -> Result<u32> {
        let count = columns.iter().sum::<u32>() * rows.iter().sum::<u32>();
        if count == 0 {
            return Err(Error::InvalidParameter);
        }
        Ok(count)
    }

    /// Bitstream bytes available to tiles
    ///
    /// CBR pads the last tile, so one frame's worth of the target rate
    /// (at most a tenth of the buffer) is held back at the end.
    pub fn active_bitstream_size(seq: &SequenceParams, bitstream_size: u32) -> Result<u64> {
        let size = bitstream_size as u64;
        if seq.rate_control != RateControlMode::Cbr {
            return Ok(size);
        }

        let rate = seq.frame_rate;
        if rate.denominator == 0 {
            return Err(Error::InvalidParameter);
        }
        let fps = (rate.numerator / rate.denominator) as u64;
        if fps == 0 {
            return Err(Error::InvalidParameter);
        }

        let reserved = seq.target_bitrate_kbps as u64 / 8 / fps * 1024;
        if reserved > size {
            log::debug!("CBR frame reserve {} above bitstream size {}", reserved, size);
            return Err(Error::InvalidParameter);
        }
        Ok(size - reserved.min(size / 10))
    }

    /// Column widths and row heights in LCUs
    fn boundaries(pic: &PictureParams, width_in_lcu: u32, height_in_lcu: u32) -> Result<(Vec<u32>, Vec<u32>)> {
        if !pic.tiles_enabled {
            return Ok((alloc::vec![width_in_lcu], alloc::vec![height_in_lcu]));
        }

        let num_columns = pic.tile_columns() as usize;
        let num_rows = pic.tile_rows() as usize;
        if num_columns > MAX_TILE_COLUMNS || num_rows > MAX_TILE_ROWS {
            return Err(Error::InvalidParameter);
        }

        let columns: Vec<u32> = pic.tile_column_width[..num_columns].iter().map(|&w| w as u32).collect();
        let rows: Vec<u32> = pic.tile_row_height[..num_rows].iter().map(|&h| h as u32).collect();
        if columns.contains(&0) || rows.contains(&0) {
            return Err(Error::InvalidParameter);
        }
        if columns.iter().sum::<u32>() != width_in_lcu || rows.iter().sum::<u32>() != height_in_lcu {
            log::debug!("tile grid does not cover the {}x{} LCU frame", width_in_lcu, height_in_lcu);
            return Err(Error::InvalidParameter);
        }
        Ok((columns, rows))
    }
}

// =============================================================================
// STATISTICS LAYOUT
// =============================================================================

/// Offsets of the regions inside one statistics buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatisticsRegions {
    /// HEVC PAK statistics
    pub pak: u32,
    /// VDEnc statistics
    pub vdenc: u32,
    /// Slice size streamout
    pub slice_streamout: u32,
}

/// Layout of the aggregated frame statistics and per-tile statistics
///
/// Every region starts on a page so it can be bound as its own HuC region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileStatisticsLayout {
    /// Regions of the aggregated frame statistics buffer
    pub frame: StatisticsRegions,
    /// Size of the aggregated frame statistics buffer
    pub frame_size: u32,
    /// Regions of the per-tile statistics buffer
    pub tile: StatisticsRegions,
    /// Size of the per-tile statistics buffer
    pub tile_size: u32,
    /// Size of the tile size record buffer
    pub tile_record_size: u32,
}

impl TileStatisticsLayout {
    /// Layout for `num_tiles` tiles over `num_lcus` LCUs
    pub fn new(num_tiles: u32, num_lcus: u32) -> Result<Self> {
        if num_tiles == 0 || num_lcus == 0 {
            return Err(Error::InvalidParameter);
        }
        let slice_bytes = SLICE_STREAMOUT_PER_LCU * num_lcus;

        let frame_vdenc = align_up(PAK_FRAME_STATS_SIZE, PAGE_SIZE);
        let frame_slice = align_up(frame_vdenc + VDENC_STATS_SIZE, PAGE_SIZE);
        let frame = StatisticsRegions {
            pak: 0,
            vdenc: frame_vdenc,
            slice_streamout: frame_slice,
        };

        let tile_vdenc = align_up(PAK_FRAME_STATS_SIZE * num_tiles, PAGE_SIZE);
        let tile_slice = align_up(tile_vdenc + VDENC_STATS_SIZE * num_tiles, PAGE_SIZE);
        let tile = StatisticsRegions {
            pak: 0,
            vdenc: tile_vdenc,
            slice_streamout: tile_slice,
        };

        Ok(Self {
            frame,
            frame_size: align_up(frame_slice + slice_bytes, PAGE_SIZE),
            tile,
            tile_size: align_up(tile_slice + slice_bytes, PAGE_SIZE),
            tile_record_size: CACHELINE_SIZE * num_tiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::FrameRate;

    fn two_by_two() -> PictureParams {
        let mut pic = PictureParams {
            tiles_enabled: true,
            num_tile_columns_minus1: 1,
            num_tile_rows_minus1: 1,
            ..PictureParams::default()
        };
        pic.tile_column_width[..2].copy_from_slice(&[15, 15]);
        pic.tile_row_height[..2].copy_from_slice(&[9, 8]);
        pic
    }

    const BUDGET: TileBudget = TileBudget {
        bitstream_size: 4_000_000,
    };

    #[test]
    fn test_untiled_frame_is_one_tile() {
        let seq = SequenceParams::default();
        let tiles = TilePartitioner::partition(&seq, &PictureParams::default(), &BUDGET).unwrap();
        assert_eq!(tiles.len(), 1);

        let tile = &tiles[0];
        assert_eq!((tile.end_x, tile.end_y), (30, 17));
        assert_eq!(tile.num_lcus, 510);
        assert_eq!(tile.width_in_min_cb_minus1, 239);
        assert_eq!(tile.height_in_min_cb_minus1, 135);
        assert!(tile.is_last_in_row && tile.is_last_in_column);
        assert_eq!(tile.tile_coding(1, false).bitstream_offset, None);
    }

    #[test]
    fn test_two_by_two_offsets() {
        let seq = SequenceParams::default();
        let tiles = TilePartitioner::partition(&seq, &two_by_two(), &BUDGET).unwrap();
        assert_eq!(tiles.len(), 4);

        let starts: Vec<_> = tiles.iter().map(|t| (t.start_x, t.start_y)).collect();
        assert_eq!(starts, [(0, 0), (15, 0), (0, 9), (15, 9)]);
        assert_eq!(tiles[1].width_in_min_cb_minus1, 119);
        assert_eq!(tiles[3].height_in_min_cb_minus1, 63);
        assert!(tiles[1].is_last_in_row && !tiles[1].is_last_in_column);

        let parity: Vec<_> = tiles.iter().map(|t| (t.column_store_select, t.row_store_select)).collect();
        assert_eq!(parity, [(false, false), (true, false), (false, true), (true, true)]);

        let cu_records: Vec<_> = tiles.iter().map(|t| t.cu_record_offset).collect();
        assert_eq!(cu_records, [0, 8640, 17280, 24960]);

        let cu_level: Vec<_> = tiles.iter().map(|t| t.cu_level_streamout_offset).collect();
        assert_eq!(cu_level, [0, 2160, 4320, 6240]);

        // Row stores restart on each tile row
        let sse: Vec<_> = tiles.iter().map(|t| t.sse_rowstore_offset).collect();
        assert_eq!(sse, [0, 288, 0, 288]);
        let sao: Vec<_> = tiles.iter().map(|t| t.sao_rowstore_offset).collect();
        assert_eq!(sao, [0, 4, 0, 4]);

        let slice: Vec<_> = tiles.iter().map(|t| t.slice_size_streamout_offset).collect();
        assert_eq!(slice, [0, 135, 270, 390]);
        let streamin: Vec<_> = tiles.iter().map(|t| t.streamin_offset).collect();
        assert_eq!(streamin, [0, 540, 1080, 1560]);

        assert_eq!(tiles[3].pak_tile_statistics_offset, 27);
        assert_eq!(tiles[3].tile_size_streamout_offset, 3);
    }

    #[test]
    fn test_bitstream_partitions() {
        let seq = SequenceParams::default();
        let tiles = TilePartitioner::partition(&seq, &two_by_two(), &BUDGET).unwrap();

        let offsets: Vec<_> = tiles.iter().map(|t| t.bitstream_offset).collect();
        assert_eq!(offsets, [0, 16545, 33090, 47796]);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));

        // Partitions are contiguous and cover at least the budget
        for pair in tiles.windows(2) {
            assert_eq!(pair[0].bitstream_offset * 64 + pair[0].bitstream_size, pair[1].bitstream_offset * 64);
        }
        let total: u32 = tiles.iter().map(|t| t.bitstream_size).sum();
        assert!(total >= BUDGET.bitstream_size);
        assert!(total < BUDGET.bitstream_size + 64 * tiles.len() as u32);
        assert_eq!(tiles[1].tile_coding(1, false).bitstream_offset, Some(16545));
    }

    #[test]
    fn test_cbr_reserve() {
        let seq = SequenceParams {
            rate_control: RateControlMode::Cbr,
            target_bitrate_kbps: 3000,
            frame_rate: FrameRate::new(30, 1),
            ..SequenceParams::default()
        };
        assert_eq!(TilePartitioner::active_bitstream_size(&seq, 4_000_000), Ok(4_000_000 - 12288));
        // Capped at a tenth of the buffer
        assert_eq!(TilePartitioner::active_bitstream_size(&seq, 100_000), Ok(90_000));
        // Reserve larger than the buffer
        assert_eq!(
            TilePartitioner::active_bitstream_size(&seq, 10_000),
            Err(Error::InvalidParameter)
        );

        let stalled = SequenceParams {
            frame_rate: FrameRate::new(1, 0),
            ..seq
        };
        assert_eq!(
            TilePartitioner::active_bitstream_size(&stalled, 4_000_000),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_too_many_tiles() {
        // 512x256: at most 2x2 tiles of 256x128
        let seq = SequenceParams {
            frame_width_in_min_cb_minus1: 63,
            frame_height_in_min_cb_minus1: 31,
            ..SequenceParams::default()
        };
        let mut pic = PictureParams {
            tiles_enabled: true,
            num_tile_columns_minus1: 2,
            num_tile_rows_minus1: 1,
            ..PictureParams::default()
        };
        pic.tile_column_width[..3].copy_from_slice(&[3, 3, 2]);
        pic.tile_row_height[..2].copy_from_slice(&[2, 2]);

        assert_eq!(
            TilePartitioner::partition(&seq, &pic, &BUDGET),
            Err(Error::InvalidParameter)
        );

        pic.num_tile_columns_minus1 = 1;
        pic.tile_column_width[..2].copy_from_slice(&[4, 4]);
        assert_eq!(TilePartitioner::partition(&seq, &pic, &BUDGET).map(|t| t.len()), Ok(4));
    }

    #[test]
    fn test_grid_must_cover_frame() {
        let seq = SequenceParams::default();
        let mut pic = two_by_two();
        pic.tile_column_width[1] = 14;
        assert_eq!(
            TilePartitioner::partition(&seq, &pic, &BUDGET),
            Err(Error::InvalidParameter)
        );

        let mut pic = two_by_two();
        pic.tile_row_height[0] = 0;
        pic.tile_row_height[1] = 17;
        assert_eq!(
            TilePartitioner::partition(&seq, &pic, &BUDGET),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_statistics_layout() {
        let layout = TileStatisticsLayout::new(4, 510).unwrap();
        assert_eq!(
            layout.frame,
            StatisticsRegions {
                pak: 0,
                vdenc: 4096,
                slice_streamout: 8192
            }
        );
        assert_eq!(layout.frame_size, 40960);
        assert_eq!(layout.tile.vdenc, 4096);
        assert_eq!(layout.tile.slice_streamout, 12288);
        assert_eq!(layout.tile_size, 45056);
        assert_eq!(layout.tile_record_size, 256);

        assert_eq!(TileStatisticsLayout::new(0, 510), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_walker_tile_fields() {
        let seq = SequenceParams::default();
        let tiles = TilePartitioner::partition(&seq, &two_by_two(), &BUDGET).unwrap();
        let mut walker = WalkerState::default();
        tiles[3].apply_to_walker(&mut walker);

        assert_eq!(walker.tile_start, CtbPosition { x: 15, y: 9 });
        assert_eq!((walker.tile_width_minus1, walker.tile_height_minus1), (14, 7));
        assert_eq!(walker.tile_number, 3);
        assert!(walker.tile_row_store_select);
        assert_eq!(walker.streamin_offset, Some(1560));
    }
}
