//! # Slice Placement
//!
//! Locates slices inside the tile grid and derives the start / next CTB
//! positions the slice and walker states carry.
//!
//! ```text
//!  tile (start_x, start_y) ┌──────────────┐
//!                          │ s ──────────►│   start = addr % width, addr / width
//!                          │─────────► e  │   end   = start + (n-1) % tile_w,
//!                          │              │           start + (n-1) / tile_w
//!                          └──────────────┘
//! ```
//!
//! A slice belongs to a tile when both its first and last LCU fall inside
//! it; it closes the tile when its last LCU is the tile's bottom-right one.

use alloc::vec::Vec;

use vdbox_cmd::hcp::CtbPosition;
use vdbox_core::{Error, Result, SequenceParams, SliceParams};

use crate::tile::TileDescriptor;

/// Slices one frame may carry
pub const MAX_SLICES: usize = 70;

/// Where a slice sits relative to one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceInTile {
    /// First and last LCU inside the tile
    pub in_tile: bool,
    /// Slice ends on the tile's last LCU
    pub last_in_tile: bool,
}

/// Tile a slice was placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicePlacement {
    /// Raster index of the tile
    pub tile: usize,
    /// Slice ends on the tile's last LCU
    pub last_in_tile: bool,
}

/// Start and next-slice positions of a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceAddress {
    /// First CTB of the slice
    pub start: CtbPosition,
    /// First CTB of the following slice, `(0, 0)` after the last one
    pub next: CtbPosition,
}

fn width_in_lcu(seq: &SequenceParams) -> Result<u32> {
    Ok(seq.frame_size().width_in_lcu(seq.lcu_size()?))
}

/// Whether `slice` lies in `tile`
pub fn slice_in_tile(seq: &SequenceParams, slice: &SliceParams, tile: &TileDescriptor) -> Result<SliceInTile> {
    if slice.num_lcus_in_slice == 0 {
        return Err(Error::InvalidParameter);
    }
    let start = CtbPosition::from_address(slice.slice_segment_address, width_in_lcu(seq)?)?;
    if !tile.contains(start.x, start.y) {
        return Ok(SliceInTile::default());
    }

    let tile_width = tile.width_in_lcu();
    let span = slice.num_lcus_in_slice - 1;
    let mut x = start.x + span % tile_width;
    let mut y = start.y + span / tile_width;
    if x >= tile.end_x {
        x -= tile_width;
        y += 1;
    }
    if !tile.contains(x, y) {
        return Ok(SliceInTile::default());
    }

    Ok(SliceInTile {
        in_tile: true,
        last_in_tile: x + 1 == tile.end_x && y + 1 == tile.end_y,
    })
}

/// Start / next positions of every slice
pub fn slice_addresses(seq: &SequenceParams, slices: &[SliceParams]) -> Result<Vec<SliceAddress>> {
    let width = width_in_lcu(seq)?;
    let mut addresses = Vec::with_capacity(slices.len());
    for (i, slice) in slices.iter().enumerate() {
        let next = match slices.get(i + 1) {
            Some(next) => CtbPosition::from_address(next.slice_segment_address, width)?,
            None => CtbPosition::default(),
        };
        addresses.push(SliceAddress {
            start: CtbPosition::from_address(slice.slice_segment_address, width)?,
            next,
        });
    }
    Ok(addresses)
}

/// Check that the slices cover the picture exactly once
///
/// Returns the picture's LCU count.
pub fn check_lcu_count(seq: &SequenceParams, slices: &[SliceParams]) -> Result<u32> {
    if slices.is_empty() {
        return Err(Error::NullParameter);
    }
    if slices.len() > MAX_SLICES {
        return Err(Error::InvalidParameter);
    }

    let lcus = seq.frame_size().lcu_count(seq.lcu_size()?);
    let mut total = 0u32;
    for slice in slices {
        if slice.slice_segment_address >= lcus {
            return Err(Error::InvalidParameter);
        }
        total = total
            .checked_add(slice.num_lcus_in_slice)
            .ok_or(Error::InvalidParameter)?;
    }
    if total != lcus {
        log::debug!("slices cover {} of {} LCUs", total, lcus);
        return Err(Error::InvalidParameter);
    }
    Ok(lcus)
}

/// Place every slice in its tile
///
/// Slices must not straddle tiles and must come in tile order.
pub fn assign_tiles(
    seq: &SequenceParams,
    slices: &[SliceParams],
    tiles: &[TileDescriptor],
) -> Result<Vec<SlicePlacement>> {
    let mut placements: Vec<SlicePlacement> = Vec::with_capacity(slices.len());
    for (i, slice) in slices.iter().enumerate() {
        let mut found = None;
        for (t, tile) in tiles.iter().enumerate() {
            let place = slice_in_tile(seq, slice, tile)?;
            if place.in_tile {
                found = Some(SlicePlacement {
                    tile: t,
                    last_in_tile: place.last_in_tile,
                });
                break;
            }
        }

        let Some(placement) = found else {
            log::debug!("slice {} at {} crosses a tile boundary", i, slice.slice_segment_address);
            return Err(Error::InvalidParameter);
        };
        if placements.last().is_some_and(|prev| prev.tile > placement.tile) {
            return Err(Error::InvalidParameter);
        }
        placements.push(placement);
    }
    Ok(placements)
}
