//! # Frame Pipeline
//!
//! Turns the parameters of one HEVC frame into the command stream of one
//! VDEnc + HCP submission.
//!
//! ```text
//!  FrameParams
//!      │
//!      ▼
//!  validate ──► derive ──► tiles / slices ──► capacity check
//!                                                  │
//!      ┌───────────────────────────────────────────┘
//!      ▼
//!  recycle slot ──► scratch / rowstore ──► BRC DMEM + const data
//!                                                  │
//!      ┌───────────────────────────────────────────┘
//!      ▼
//!  StagingBuffer:  [HuC init] [HuC update] VDEnc/HCP frame state
//!                  per tile { tile coding, per slice { refs, weights,
//!                  slice state, inserts, walker } } flush, batch end
//!      │
//!      ▼  commit on success only
//!  CommandSink
//! ```
//!
//! Every step returns its error unchanged. Nothing reaches the caller's sink
//! unless the whole frame serialized, and the BRC state only advances once
//! the frame is committed.

use alloc::vec::Vec;

use vdbox_brc::{
    build_init_dmem, build_update_dmem, BatchLayout, BrcFunction, BrcPhase, BrcState, LambdaTables, UpdateInputs,
    DMEM_SIZE, LAMBDA_CONST_DATA_SIZE,
};
use vdbox_cmd::hcp::insert::PakInsert;
use vdbox_cmd::hcp::{self, BufferAddress, BufferSlot, PixelFormat, RefEntry, SurfaceId, MAX_PIPE_REFERENCES};
use vdbox_cmd::vdenc::VdencSlot;
use vdbox_cmd::{huc, mi, vdenc, Capabilities, CommandId, CommandWriter, GenerationDescriptor, StagingBuffer, WriterStats};
use vdbox_core::config::{MAX_BRC_PASSES, MAX_RECYCLE_DEPTH};
use vdbox_core::{
    align_up, div_ceil, CommandSink, Conflict, EncoderConfig, Error, Generation, GpuAddr, PackedHeader,
    PictureParams, QuantMatrix, ResourceAllocator, ResourceHandle, ResourceKind, Result, SequenceParams,
    SliceParams, SliceType, Standard, CACHELINE_SIZE, PAGE_SIZE,
};
use vdbox_mem::{BufferKind, BufferSet, RecyclePool, RowstoreKind, RowstoreParams, RowstoreRegistry, SizeParams};

use crate::slice::{assign_tiles, check_lcu_count, slice_addresses, SlicePlacement};
use crate::tile::{
    TileBudget, TileDescriptor, TilePartitioner, TileStatisticsLayout, CU_RECORD_SIZE, MIN_TILE_WIDTH,
    SSE_ROWSTORE_PER_LCU,
};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Slots of the recycle ring
pub const RECYCLE_SLOTS: usize = MAX_RECYCLE_DEPTH as usize;

/// HuC regions of the BRC update call
mod region {
    pub const HISTORY: usize = 0;
    pub const VDENC_STATISTICS: usize = 1;
    pub const PAK_STATISTICS: usize = 2;
    pub const CONST_DATA: usize = 4;
    pub const SLICE_STATISTICS: usize = 7;
}

const MOCS: u8 = 0;

/// BRC history kept by the firmware between frames
const fn brc_history_size(generation: Generation) -> u32 {
    match generation {
        Generation::Gen11 => 6080,
        Generation::Gen9 | Generation::Gen12 => 2304,
    }
}

// =============================================================================
// FRAME PARAMETERS
// =============================================================================

/// Source and reconstructed surfaces of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSurfaces {
    /// Raw input picture
    pub source: GpuAddr,
    /// Reconstructed picture
    pub recon: GpuAddr,
    /// Pixel format shared by source, recon and references
    pub format: PixelFormat,
    /// Row pitch in bytes
    pub pitch: u32,
    /// Allocated height in rows
    pub height: u32,
}

/// A reference picture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePicture {
    /// Reconstructed surface
    pub surface: GpuAddr,
    /// Motion vectors the picture produced
    pub mv_temporal: GpuAddr,
}

/// Everything one frame is encoded from
#[derive(Debug, Clone, Copy)]
pub struct FrameParams<'a> {
    /// Sequence parameters
    pub seq: &'a SequenceParams,
    /// Picture parameters
    pub pic: &'a PictureParams,
    /// Slices in raster order
    pub slices: &'a [SliceParams],
    /// Packed slice header of every slice
    pub slice_headers: &'a [PackedHeader],
    /// VPS / SPS / PPS / SEI inserted ahead of the first slice
    pub nal_headers: &'a [PackedHeader],
    /// Pipe reference slots, indexed by [`RefEntry::frame_id`]
    pub references: &'a [ReferencePicture],
    /// Active references of L0 and L1
    pub ref_entries: [&'a [RefEntry]; 2],
    /// Picture surfaces
    pub surfaces: FrameSurfaces,
    /// Output bitstream
    pub bitstream: GpuAddr,
    /// Bytes of the output bitstream
    pub bitstream_size: u32,
    /// Scaling lists, flat when absent
    pub quant_matrix: Option<&'a QuantMatrix>,
    /// Run the HuC bitrate control ahead of the PAK
    pub brc: bool,
    /// PAK pass, 0-based
    pub pass: u8,
}

/// Outcome of a committed frame
#[derive(Debug, Clone)]
pub struct FrameSubmission {
    /// Fence the recycle slot now waits on
    pub fence: u64,
    /// Recycle slot used
    pub slot: usize,
    /// Frame number the pass belongs to, starting at 1
    pub frame_id: u32,
    /// Bytes appended to the sink
    pub bytes: usize,
    /// Commands appended to the sink
    pub stats: WriterStats,
    /// BRC init / reset the frame carried
    pub brc_function: Option<BrcFunction>,
    /// Tiles of the picture
    pub num_tiles: u32,
}

// =============================================================================
// RESOURCES
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Allocation {
    handle: ResourceHandle,
    size: u32,
}

/// Handle of an allocation at least `size` bytes large, replacing a smaller one
fn ensure(
    slot: &mut Option<Allocation>,
    kind: ResourceKind,
    size: u32,
    allocator: &mut dyn ResourceAllocator,
) -> Result<ResourceHandle> {
    if let Some(existing) = slot {
        if existing.size >= size {
            return Ok(existing.handle);
        }
    }
    let handle = allocator.allocate(kind, size)?;
    if let Some(old) = slot.replace(Allocation { handle, size }) {
        allocator.free(old.handle)?;
    }
    log::trace!("{:?} buffer of {} bytes", kind, size);
    Ok(handle)
}

fn ensure_address(
    slot: &mut Option<Allocation>,
    kind: ResourceKind,
    size: u32,
    allocator: &mut dyn ResourceAllocator,
) -> Result<GpuAddr> {
    let handle = ensure(slot, kind, size, allocator)?;
    allocator.address(handle)
}

fn release(slot: &mut Option<Allocation>, allocator: &mut dyn ResourceAllocator) -> Result<()> {
    match slot.take() {
        Some(allocation) => allocator.free(allocation.handle),
        None => Ok(()),
    }
}

fn write_locked(
    allocator: &mut dyn ResourceAllocator,
    handle: ResourceHandle,
    write: impl FnOnce(&mut [u8]) -> Result<()>,
) -> Result<()> {
    let out = allocator.lock(handle)?;
    let written = write(out);
    allocator.unlock(handle)?;
    written
}

/// Per-slot buffers the GPU may still read while later frames are built
#[derive(Debug, Default)]
struct FrameResources {
    init_dmem: Option<Allocation>,
    update_dmem: [Option<Allocation>; MAX_BRC_PASSES as usize],
    const_data: Option<Allocation>,
    frame_statistics: Option<Allocation>,
    tile_statistics: Option<Allocation>,
    tile_record: Option<Allocation>,
}

impl FrameResources {
    fn release(&mut self, allocator: &mut dyn ResourceAllocator) -> Result<()> {
        release(&mut self.init_dmem, allocator)?;
        for dmem in &mut self.update_dmem {
            release(dmem, allocator)?;
        }
        release(&mut self.const_data, allocator)?;
        release(&mut self.frame_statistics, allocator)?;
        release(&mut self.tile_statistics, allocator)?;
        release(&mut self.tile_record, allocator)
    }
}

/// Front-end buffers shared by every frame of the stream
#[derive(Debug, Default)]
struct StreamBuffers {
    cu_record: Option<Allocation>,
    cu_streamout: Option<Allocation>,
    intra_rowstore: Option<Allocation>,
    tile_rowstore: Option<Allocation>,
    sse_rowstore: Option<Allocation>,
    cumulative_cu: Option<Allocation>,
    brc_history: Option<Allocation>,
}

#[derive(Debug, Clone, Copy, Default)]
struct StreamAddresses {
    cu_record: GpuAddr,
    cu_streamout: GpuAddr,
    /// `None` while the VDEnc rowstore cache serves the intra row store
    intra_rowstore: Option<GpuAddr>,
    tile_rowstore: GpuAddr,
    sse_rowstore: GpuAddr,
    cumulative_cu: GpuAddr,
    brc_history: Option<GpuAddr>,
}

impl StreamBuffers {
    fn prepare(
        &mut self,
        seq: &SequenceParams,
        generation: Generation,
        intra_cached: bool,
        brc: bool,
        allocator: &mut dyn ResourceAllocator,
    ) -> Result<StreamAddresses> {
        let lcu = seq.lcu_size()?;
        let frame = seq.frame_size();
        let width_in_lcu = frame.width_in_lcu(lcu);
        let height_in_lcu = frame.height_in_lcu(lcu);
        let aligned_width = width_in_lcu * lcu.pixels();
        let aligned_height = height_in_lcu * lcu.pixels();

        let cu_record = (aligned_width / 8) * (aligned_height / 8) * CU_RECORD_SIZE;
        let cu_streamout = align_up(div_ceil(frame.width, 8) * div_ceil(frame.height, 8) * 16, CACHELINE_SIZE);
        let intra_rowstore = div_ceil(frame.width, lcu.pixels()) * CACHELINE_SIZE * 2 * 2;
        let tile_rowstore = div_ceil(frame.width, 32) * CACHELINE_SIZE * 2;
        let max_tile_columns = div_ceil(frame.width, MIN_TILE_WIDTH);
        let sse_rowstore = 2 * SSE_ROWSTORE_PER_LCU * (width_in_lcu + 3 * max_tile_columns);
        let cumulative_cu = align_up(width_in_lcu * height_in_lcu * 4, CACHELINE_SIZE);

        Ok(StreamAddresses {
            cu_record: ensure_address(&mut self.cu_record, ResourceKind::Streamout, cu_record, allocator)?,
            cu_streamout: ensure_address(&mut self.cu_streamout, ResourceKind::Streamout, cu_streamout, allocator)?,
            intra_rowstore: if intra_cached {
                None
            } else {
                Some(ensure_address(
                    &mut self.intra_rowstore,
                    ResourceKind::Scratch,
                    intra_rowstore,
                    allocator,
                )?)
            },
            tile_rowstore: ensure_address(&mut self.tile_rowstore, ResourceKind::Scratch, tile_rowstore, allocator)?,
            sse_rowstore: ensure_address(&mut self.sse_rowstore, ResourceKind::Scratch, sse_rowstore, allocator)?,
            cumulative_cu: ensure_address(&mut self.cumulative_cu, ResourceKind::Streamout, cumulative_cu, allocator)?,
            brc_history: if brc {
                Some(ensure_address(
                    &mut self.brc_history,
                    ResourceKind::Statistics,
                    brc_history_size(generation),
                    allocator,
                )?)
            } else {
                None
            },
        })
    }

    fn release(&mut self, allocator: &mut dyn ResourceAllocator) -> Result<()> {
        release(&mut self.cu_record, allocator)?;
        release(&mut self.cu_streamout, allocator)?;
        release(&mut self.intra_rowstore, allocator)?;
        release(&mut self.tile_rowstore, allocator)?;
        release(&mut self.sse_rowstore, allocator)?;
        release(&mut self.cumulative_cu, allocator)?;
        release(&mut self.brc_history, allocator)
    }
}

/// HCP slot fed by a scratch buffer kind
const fn buffer_slot(kind: BufferKind) -> Option<BufferSlot> {
    Some(match kind {
        BufferKind::DeblockLine => BufferSlot::DeblockLine,
        BufferKind::DeblockTileLine => BufferSlot::DeblockTileLine,
        BufferKind::DeblockTileColumn => BufferSlot::DeblockTileColumn,
        BufferKind::MvUpRightColumn => BufferSlot::MvUpRightColumn,
        BufferKind::MetadataLine => BufferSlot::MetadataLine,
        BufferKind::MetadataTileLine => BufferSlot::MetadataTileLine,
        BufferKind::MetadataTileColumn => BufferSlot::MetadataTileColumn,
        BufferKind::IntraPredUpRightColumn => BufferSlot::IntraPredUpRightColumn,
        BufferKind::IntraPredLeftReconColumn => BufferSlot::IntraPredLeftReconColumn,
        BufferKind::SaoLine => BufferSlot::SaoLine,
        BufferKind::SaoTileLine => BufferSlot::SaoTileLine,
        BufferKind::SaoTileColumn => BufferSlot::SaoTileColumn,
        BufferKind::CurrentMvTemporal => BufferSlot::CurrentMvTemporal,
        BufferKind::CabacStreamout => BufferSlot::CabacStreamout,
        _ => return None,
    })
}

// =============================================================================
// FRAME PLAN
// =============================================================================

/// DMEM and regions of the HuC calls of a frame
#[derive(Debug, Clone, Copy)]
struct HucCalls {
    init: Option<(GpuAddr, huc::VirtualAddrState)>,
    update: (GpuAddr, huc::VirtualAddrState),
}

/// Frame whose later PAK passes reuse the slot and frame number of pass 0
#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    slot: usize,
    frame_id: u32,
}

/// Addresses and geometry resolved before anything is serialized
struct FramePlan<'f> {
    frame: &'f FrameParams<'f>,
    pic: PictureParams,
    tiles: Vec<TileDescriptor>,
    placements: Vec<SlicePlacement>,
    pipe_buf: hcp::PipeBufAddr,
    ind_obj: hcp::IndObjBaseAddr,
    vdenc_buf: vdenc::PipeBufAddr,
    huc: Option<HucCalls>,
    rdoq: bool,
    tile_replay: bool,
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Per-stream HEVC VDEnc encode pipeline
#[derive(Debug)]
pub struct EncodePipeline {
    config: EncoderConfig,
    gen: &'static GenerationDescriptor,
    buffers: BufferSet,
    rowstore: RowstoreRegistry,
    streams: StreamBuffers,
    brc: BrcState,
    slots: RecyclePool<FrameResources, RECYCLE_SLOTS>,
    staging: StagingBuffer,
    open: Option<OpenFrame>,
    frames: u32,
}

impl EncodePipeline {
    /// Create a pipeline for a validated configuration
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "vdbox pipeline {}: {} recycle slots, {} BRC passes",
            config.name,
            config.recycle_depth,
            config.brc_passes
        );
        Ok(Self {
            gen: GenerationDescriptor::for_generation(config.generation),
            buffers: BufferSet::new(),
            rowstore: RowstoreRegistry::new(config.rowstore),
            streams: StreamBuffers::default(),
            brc: BrcState::new(),
            slots: RecyclePool::new(config.recycle_depth as usize, |_| FrameResources::default())?,
            staging: StagingBuffer::new(config.staging_capacity as usize),
            open: None,
            frames: 0,
            config,
        })
    }

    /// Configuration
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Rate-control state
    pub fn brc_state(&self) -> &BrcState {
        &self.brc
    }

    /// HCP scratch buffers
    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    /// Frames committed so far
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Encode one frame
    ///
    /// `completed_fence` is the last fence the GPU finished; the frame's
    /// recycle slot must be older. Pass 0 opens a frame; later passes re-encode
    /// it in the same slot under the same frame number. On error the sink, the
    /// BRC state and the frame count are left as they were.
    pub fn encode_frame(
        &mut self,
        frame: &FrameParams<'_>,
        sink: &mut dyn CommandSink,
        allocator: &mut dyn ResourceAllocator,
        completed_fence: u64,
    ) -> Result<FrameSubmission> {
        let result = self.encode(frame, sink, allocator, completed_fence);
        if let Err(err) = &result {
            log::error!("frame {} not submitted: {:?}", self.frames, err);
            self.staging.clear();
        }
        result
    }

    /// Free every allocation the pipeline holds
    pub fn release(&mut self, allocator: &mut dyn ResourceAllocator) -> Result<()> {
        self.buffers.release(allocator)?;
        self.streams.release(allocator)?;
        for resources in self.slots.values_mut() {
            resources.release(allocator)?;
        }
        self.brc.invalidate();
        self.open = None;
        Ok(())
    }

    fn validate(&self, frame: &FrameParams<'_>) -> Result<()> {
        if !self.gen.has(Capabilities::VDENC) || (frame.brc && !self.gen.has(Capabilities::HUC_BRC)) {
            log::warn!("{} has no HEVC VDEnc pipe", self.config.generation.name());
            return Err(Error::PlatformNotSupported);
        }
        if frame.brc {
            vdbox_brc::init::validate(frame.seq)?;
        }
        if frame.seq.slice_size_control && frame.pic.tiles_enabled && frame.pic.tile_columns() * frame.pic.tile_rows() > 1
        {
            return Err(Error::ConfigurationConflict(Conflict::SliceSizeControlWithTiles));
        }
        if frame.pass >= self.config.brc_passes {
            return Err(Error::ConfigurationConflict(Conflict::PassOutOfRange));
        }
        // A re-encode needs the frame's pass 0, and BRC updates need an init
        if frame.pass > 0 && (self.open.is_none() || (frame.brc && self.brc.phase() == BrcPhase::Uninitialized)) {
            log::debug!("pass {} without an opened frame", frame.pass);
            return Err(Error::ConfigurationConflict(Conflict::PassOutOfRange));
        }
        if frame.slice_headers.len() != frame.slices.len() || frame.references.len() > MAX_PIPE_REFERENCES {
            return Err(Error::InvalidParameter);
        }
        if frame.bitstream.is_null() || frame.surfaces.source.is_null() || frame.surfaces.recon.is_null() {
            return Err(Error::NullParameter);
        }
        Ok(())
    }

    /// Upper bound of the bytes the frame serializes to
    fn command_bytes(&self, frame: &FrameParams<'_>, num_tiles: u32) -> Result<usize> {
        let insert = self.gen.layout(CommandId::HcpPakInsertObject)?.size();
        let mut size = self.gen.state_commands_size(num_tiles)?;

        for header in frame.nal_headers {
            size += hcp::insert::insert_commands_size(insert, div_ceil(header.bit_length, 8));
        }
        for header in frame.slice_headers {
            size += self.gen.slice_commands_size(div_ceil(header.bit_length, 8))?;
            if frame.seq.slice_size_control {
                size += insert + 4;
            }
        }

        if frame.brc {
            let call = [
                CommandId::HucPipeModeSelect,
                CommandId::HucDmemState,
                CommandId::HucVirtualAddrState,
                CommandId::HucStart,
                CommandId::MiFlushDw,
            ]
            .iter()
            .try_fold(0usize, |acc, &id| Ok::<_, Error>(acc + self.gen.layout(id)?.size()))?;
            size += 2 * call;
        }
        Ok(size)
    }

    fn encode(
        &mut self,
        frame: &FrameParams<'_>,
        sink: &mut dyn CommandSink,
        allocator: &mut dyn ResourceAllocator,
        completed_fence: u64,
    ) -> Result<FrameSubmission> {
        self.validate(frame)?;
        let seq = frame.seq;
        let lcus = check_lcu_count(seq, frame.slices)?;

        let mut pic = frame.pic.clone();
        pic.lcu_max_bitsize_allowed = hcp::lcu_max_bitsize(seq, pic.lcu_max_bitsize_allowed);

        let budget = TileBudget {
            bitstream_size: frame.bitstream_size,
        };
        let tiles = TilePartitioner::partition(seq, &pic, &budget)?;
        let placements = assign_tiles(seq, frame.slices, &tiles)?;
        let num_tiles = tiles.len() as u32;

        let required = self.command_bytes(frame, num_tiles)?;
        if required > self.staging.capacity() || required > sink.remaining() {
            log::debug!(
                "frame needs {} bytes, staging {} sink {}",
                required,
                self.staging.capacity(),
                sink.remaining()
            );
            return Err(Error::CapacityExceeded);
        }

        // Scratch buffers and rowstore caches
        let lcu = seq.lcu_size()?;
        let size = SizeParams {
            standard: Standard::Hevc,
            width: seq.frame_size().width,
            height: seq.frame_size().height,
            max_bit_depth: seq.max_bit_depth(),
            chroma_format: seq.chroma_format,
            lcu,
            max_frame_size: frame.bitstream_size,
        };
        self.rowstore.update(&RowstoreParams {
            standard: Standard::Hevc,
            width: size.width,
            bit_depth_minus8: size.max_bit_depth - 8,
            chroma_format: seq.chroma_format,
        });
        self.buffers.prepare(&size, &self.rowstore, allocator)?;
        let intra_cache = self.rowstore.enabled_address(RowstoreKind::Vdenc);
        let streams = self.streams.prepare(
            seq,
            self.config.generation,
            intra_cache.is_some(),
            frame.brc,
            allocator,
        )?;

        // Per-frame buffers of the recycle slot
        let layout = TileStatisticsLayout::new(num_tiles, lcus)?;
        let (slot, frame_id) = match self.open {
            Some(open) if frame.pass > 0 => (open.slot, open.frame_id),
            _ => (self.slots.acquire(completed_fence)?.0, self.frames + 1),
        };
        let resources = self.slots.get_mut(slot).ok_or(Error::NotFound)?;
        let frame_stats = ensure_address(
            &mut resources.frame_statistics,
            ResourceKind::Statistics,
            layout.frame_size,
            allocator,
        )?;
        let tile_stats = if num_tiles > 1 {
            Some((
                ensure_address(&mut resources.tile_statistics, ResourceKind::Statistics, layout.tile_size, allocator)?,
                ensure_address(
                    &mut resources.tile_record,
                    ResourceKind::Streamout,
                    layout.tile_record_size,
                    allocator,
                )?,
            ))
        } else {
            None
        };

        // Rate control runs on a copy until the frame is committed
        let mut brc = self.brc.clone();
        let mut brc_function = None;
        let huc = if frame.brc {
            if frame.pass == 0 {
                brc_function = brc.begin_frame(seq)?;
            }
            let regions_history = {
                let mut regions = huc::VirtualAddrState::default();
                if let Some(history) = streams.brc_history {
                    regions.bind(region::HISTORY, history, MOCS)?;
                }
                regions
            };

            let init = match brc_function {
                Some(function) => {
                    let dmem = build_init_dmem(self.config.generation, function, seq, &pic)?;
                    let handle = ensure(&mut resources.init_dmem, ResourceKind::Dmem, DMEM_SIZE as u32, allocator)?;
                    write_locked(allocator, handle, |out| dmem.write_to(out))?;
                    Some((allocator.address(handle)?, regions_history))
                }
                None => None,
            };

            let update = build_update_dmem(&UpdateInputs {
                generation: self.config.generation,
                seq,
                pic: &pic,
                slices: frame.slices,
                frame_id,
                pass: frame.pass,
                max_passes: self.config.brc_passes,
                weighted_prediction: pic.weighted_pred || pic.weighted_bipred,
                tile_replay: self.config.tile_replay && num_tiles > 1,
                batch: BatchLayout::default(),
            })?;
            let pass_dmem = resources
                .update_dmem
                .get_mut(frame.pass as usize)
                .ok_or(Error::ConfigurationConflict(Conflict::PassOutOfRange))?;
            let handle = ensure(pass_dmem, ResourceKind::Dmem, DMEM_SIZE as u32, allocator)?;
            write_locked(allocator, handle, |out| update.write_to(out))?;
            let update_dmem = allocator.address(handle)?;

            let lambda = LambdaTables::compute(seq, &pic)?;
            let const_size = align_up(LAMBDA_CONST_DATA_SIZE as u32, PAGE_SIZE);
            let handle = ensure(&mut resources.const_data, ResourceKind::Dmem, const_size, allocator)?;
            write_locked(allocator, handle, |out| lambda.write_const_data(out).map(|_| ()))?;
            let const_data = allocator.address(handle)?;

            let stats = layout.frame;
            let mut regions = regions_history;
            regions.bind(region::VDENC_STATISTICS, frame_stats.offset(stats.vdenc as u64), MOCS)?;
            regions.bind(region::PAK_STATISTICS, frame_stats.offset(stats.pak as u64), MOCS)?;
            regions.bind(region::CONST_DATA, const_data, MOCS)?;
            regions.bind(region::SLICE_STATISTICS, frame_stats.offset(stats.slice_streamout as u64), MOCS)?;

            Some(HucCalls {
                init,
                update: (update_dmem, regions),
            })
        } else {
            None
        };
        if brc_function.is_none() && frame.brc && frame.pass == 0 {
            log::trace!("BRC epoch {} continues", brc.epoch());
        }

        // Buffer addresses of the HCP and VDEnc
        let surfaces = frame.surfaces;
        let mut pipe_buf = hcp::PipeBufAddr::default();
        pipe_buf.mocs = MOCS;
        pipe_buf.set_memory(BufferSlot::DecodedPicture, surfaces.recon);
        pipe_buf.set_memory(BufferSlot::OriginalSource, surfaces.source);
        for &kind in BufferKind::for_standard(Standard::Hevc) {
            let Some(slot) = buffer_slot(kind) else {
                continue;
            };
            let cache = self.buffers.get(kind).and_then(|d| d.rowstore).filter(|r| r.enabled);
            if let Some(cache) = cache {
                pipe_buf.set(slot, BufferAddress::Rowstore(cache.address));
            } else if let Some(addr) = self.buffers.address(kind, allocator)? {
                pipe_buf.set_memory(slot, addr);
            }
        }
        for (i, reference) in frame.references.iter().enumerate() {
            pipe_buf.references[i] = Some(reference.surface);
            pipe_buf.collocated_mv[i] = Some(reference.mv_temporal);
        }
        let (statistics, statistics_layout) = match tile_stats {
            Some((tile, _)) => (tile, layout.tile),
            None => (frame_stats, layout.frame),
        };
        pipe_buf.set_memory(BufferSlot::FrameStatistics, statistics.offset(statistics_layout.pak as u64));
        pipe_buf.set_memory(
            BufferSlot::SliceSizeStreamout,
            statistics.offset(statistics_layout.slice_streamout as u64),
        );
        pipe_buf.set_memory(BufferSlot::SseSourcePixel, streams.sse_rowstore);

        let ind_obj = hcp::IndObjBaseAddr {
            bitstream: frame.bitstream,
            bitstream_size: frame.bitstream_size,
            cu_object: streams.cu_record,
            tile_record: tile_stats.map(|(_, record)| record).unwrap_or_default(),
            cu_stats: streams.cu_streamout,
            mocs: MOCS,
            ..hcp::IndObjBaseAddr::default()
        };

        let mut vdenc_buf = vdenc::PipeBufAddr::default();
        vdenc_buf.mocs = MOCS;
        vdenc_buf.set_memory(VdencSlot::OriginalSource, surfaces.source);
        match (intra_cache, streams.intra_rowstore) {
            (Some(cache), _) => vdenc_buf.set(VdencSlot::RowStoreScratch, BufferAddress::Rowstore(cache)),
            (None, Some(addr)) => vdenc_buf.set_memory(VdencSlot::RowStoreScratch, addr),
            (None, None) => return Err(Error::NullParameter),
        }
        const FORWARD: [VdencSlot; 3] = [VdencSlot::FwdRef0, VdencSlot::FwdRef1, VdencSlot::FwdRef2];
        for (slot, entry) in FORWARD.iter().zip(frame.ref_entries[0]) {
            let reference = frame.references.get(entry.frame_id as usize).ok_or(Error::InvalidParameter)?;
            vdenc_buf.set_memory(*slot, reference.surface);
        }
        if let Some(entry) = frame.ref_entries[1].first() {
            let reference = frame.references.get(entry.frame_id as usize).ok_or(Error::InvalidParameter)?;
            vdenc_buf.set_memory(VdencSlot::BwdRef0, reference.surface);
        }
        if let Some(mv) = self.buffers.address(BufferKind::CurrentMvTemporal, allocator)? {
            vdenc_buf.set_memory(VdencSlot::ColocatedMv, mv);
        }
        vdenc_buf.set_memory(VdencSlot::Statistics, statistics.offset(statistics_layout.vdenc as u64));
        vdenc_buf.set_memory(VdencSlot::CuRecord, streams.cu_record);
        vdenc_buf.set_memory(VdencSlot::LcuPakObject, streams.cu_streamout);
        vdenc_buf.set_memory(VdencSlot::TileRowStore, streams.tile_rowstore);
        vdenc_buf.set_memory(VdencSlot::CumulativeCu, streams.cumulative_cu);

        let plan = FramePlan {
            frame,
            pic,
            tiles,
            placements,
            pipe_buf,
            ind_obj,
            vdenc_buf,
            huc,
            rdoq: self.config.rdoq && self.gen.has(Capabilities::RDOQ),
            tile_replay: self.config.tile_replay && self.gen.has(Capabilities::TILE_REPLAY) && num_tiles > 1,
        };

        // Serialize into the staging buffer, then hand over in one piece
        let mut writer = CommandWriter::new(self.gen, &mut self.staging);
        emit_frame(&mut writer, &plan)?;
        let stats = writer.stats().clone();
        let bytes = self.staging.commit(sink)?;

        // Later passes re-arm the slot so it stays busy until the last one
        let fence = self.slots.commit(slot)?;
        if frame.pass == 0 {
            if frame.brc {
                brc.mark_updated();
            }
            self.open = Some(OpenFrame { slot, frame_id });
            self.frames += 1;
        }
        self.brc = brc;
        log::debug!(
            "frame {} pass {} slot {} fence {}: {} commands, {} bytes, {} tiles",
            frame_id,
            frame.pass,
            slot,
            fence,
            stats.commands,
            bytes,
            num_tiles
        );

        Ok(FrameSubmission {
            fence,
            slot,
            frame_id,
            bytes,
            stats,
            brc_function,
            num_tiles,
        })
    }
}

// =============================================================================
// SERIALIZATION
// =============================================================================

fn emit_huc_call(writer: &mut CommandWriter<'_>, dmem: GpuAddr, regions: &huc::VirtualAddrState) -> Result<()> {
    writer.emit(&huc::PipeModeSelect::default())?;
    writer.emit(&huc::DmemState {
        source: dmem,
        destination: 0,
        length: DMEM_SIZE as u32,
        mocs: MOCS,
    })?;
    writer.emit(regions)?;
    writer.emit(&huc::Start::default())?;
    writer.emit(&mi::FlushDw {
        video_pipeline_cache_invalidate: true,
        ..mi::FlushDw::default()
    })
}

fn emit_frame(writer: &mut CommandWriter<'_>, plan: &FramePlan<'_>) -> Result<()> {
    let frame = plan.frame;
    let seq = frame.seq;
    let pic = &plan.pic;

    if let Some(huc) = &plan.huc {
        if let Some((dmem, regions)) = &huc.init {
            emit_huc_call(writer, *dmem, regions)?;
        }
        emit_huc_call(writer, huc.update.0, &huc.update.1)?;
    }

    // Frame state
    writer.emit(&vdenc::ControlState { initialize: true })?;
    writer.emit(&hcp::PipeModeSelect {
        advanced_rate_control: frame.brc,
        rdoq: plan.rdoq,
        tile_based_replay: plan.tile_replay,
        ..hcp::PipeModeSelect::default()
    })?;
    let surfaces = frame.surfaces;
    for id in [SurfaceId::Recon, SurfaceId::Source, SurfaceId::Reference] {
        writer.emit(&hcp::SurfaceState::planar(
            id,
            surfaces.format,
            surfaces.pitch,
            surfaces.height,
            seq,
        ))?;
    }
    writer.emit(&plan.pipe_buf)?;
    writer.emit(&plan.ind_obj)?;

    writer.emit(&vdenc::PipeModeSelect {
        pak_threshold_check: seq.slice_size_control,
        bit_depth: seq.bit_depth_luma_minus8 + 8,
        chroma_format: seq.chroma_format,
        random_access: frame.slices.iter().any(|s| s.slice_type == SliceType::B),
        tile_replay: plan.tile_replay,
        ..vdenc::PipeModeSelect::default()
    })?;
    let size = seq.frame_size();
    let surface = vdenc::Surface::planar(surfaces.format, size.width, surfaces.height, surfaces.pitch);
    writer.emit(&vdenc::SrcSurfaceState(surface))?;
    writer.emit(&vdenc::RefSurfaceState(surface))?;
    writer.emit(&plan.vdenc_buf)?;

    let flat;
    let matrix = match frame.quant_matrix {
        Some(matrix) => matrix,
        None => {
            flat = QuantMatrix::flat();
            &flat
        }
    };
    writer.emit_all(&hcp::qm::qm_states(matrix))?;
    writer.emit_all(&hcp::qm::fqm_states(matrix))?;
    writer.emit(&hcp::PicState::new(seq, pic)?)?;

    // Tiles and slices
    let addresses = slice_addresses(seq, frame.slices)?;
    for (t, tile) in plan.tiles.iter().enumerate() {
        if plan.tiles.len() > 1 {
            writer.emit(&tile.tile_coding(1, frame.pass > 0))?;
        }
        for (i, placement) in plan.placements.iter().enumerate() {
            if placement.tile == t {
                emit_slice(writer, plan, tile, i, &addresses[i].start, &addresses[i].next)?;
            }
        }
    }

    writer.emit(&mi::FlushDw {
        video_pipeline_cache_invalidate: true,
        ..mi::FlushDw::default()
    })?;
    writer.emit(&mi::BatchBufferEnd)
}

fn emit_slice(
    writer: &mut CommandWriter<'_>,
    plan: &FramePlan<'_>,
    tile: &TileDescriptor,
    index: usize,
    start: &hcp::CtbPosition,
    next: &hcp::CtbPosition,
) -> Result<()> {
    let frame = plan.frame;
    let seq = frame.seq;
    let pic = &plan.pic;
    let slice = &frame.slices[index];
    let following = frame.slices.get(index + 1);
    let placement = plan.placements[index];

    for list in 0..2u8 {
        let active = if list == 0 { slice.num_ref_l0() } else { slice.num_ref_l1() };
        if active > 0 {
            writer.emit(&hcp::RefIdxState::new(list, slice, frame.ref_entries[list as usize])?)?;
        }
    }
    for list in 0..2u8 {
        if let Some(weights) = hcp::WeightOffsetState::for_slice(pic, slice, list) {
            writer.emit(&weights)?;
        }
    }

    let header = &frame.slice_headers[index];
    let mut header_bits = header.bit_length;
    if index == 0 {
        header_bits += frame.nal_headers.iter().map(|h| h.bit_length).sum::<u32>();
    }
    let tail = match following {
        Some(_) => None,
        None => PakInsert::end_of_stream(pic.last_picture_in_sequence, pic.last_picture_in_stream),
    };

    let mut state = hcp::SliceState::new(seq, pic, slice, following)?;
    state.last_slice_of_tile = placement.last_in_tile;
    state.last_slice_of_tile_column = placement.last_in_tile && tile.is_last_in_column;
    state.tail_insertion = tail.is_some();
    state.header_bytes_inserted = div_ceil(header_bits, 8);
    writer.emit(&state)?;

    if index == 0 {
        for nal in frame.nal_headers {
            writer.emit_all(&PakInsert::nal_unit(nal)?)?;
        }
    }
    let starting_portion = seq
        .slice_size_control
        .then_some(header.skip_emulation_bytes as u32 * 8);
    writer.emit_all(&PakInsert::slice_header(header, starting_portion)?)?;
    if let Some(tail) = &tail {
        writer.emit(tail)?;
    }

    writer.emit(&vdenc::WeightsOffsetsState::for_slice(pic, slice, seq.bit_depth_luma_minus8))?;
    let mut walker = vdenc::WalkerState {
        start: *start,
        next: *next,
        first_super_slice: true,
        luma_log2_weight_denom: slice.luma_log2_weight_denom,
        num_pipes: 1,
        ..vdenc::WalkerState::default()
    };
    tile.apply_to_walker(&mut walker);
    writer.emit(&walker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use vdbox_core::testing::{CountingAllocator, VecSink};
    use vdbox_core::{FrameRate, RateControlMode};

    fn vbr() -> SequenceParams {
        SequenceParams {
            rate_control: RateControlMode::Vbr,
            target_bitrate_kbps: 3000,
            max_bitrate_kbps: 6000,
            vbv_buffer_size_bits: 6_000_000,
            init_vbv_fullness_bits: 3_000_000,
            frame_rate: FrameRate::new(30, 1),
            ..SequenceParams::default()
        }
    }

    fn slice(address: u32, lcus: u32) -> SliceParams {
        SliceParams {
            slice_segment_address: address,
            num_lcus_in_slice: lcus,
            ..SliceParams::default()
        }
    }

    fn header() -> PackedHeader {
        PackedHeader {
            data: vec![0x00, 0x00, 0x00, 0x01, 0x26, 0x01, 0xAF, 0x80],
            bit_length: 60,
            skip_emulation_bytes: 5,
            emulation_required: true,
        }
    }

    fn frame<'a>(
        seq: &'a SequenceParams,
        pic: &'a PictureParams,
        slices: &'a [SliceParams],
        headers: &'a [PackedHeader],
        brc: bool,
    ) -> FrameParams<'a> {
        FrameParams {
            seq,
            pic,
            slices,
            slice_headers: headers,
            nal_headers: &[],
            references: &[],
            ref_entries: [&[], &[]],
            surfaces: FrameSurfaces {
                source: GpuAddr::new(0x10_0000),
                recon: GpuAddr::new(0x20_0000),
                format: PixelFormat::Nv12,
                pitch: 2048,
                height: 1088,
            },
            bitstream: GpuAddr::new(0x40_0000),
            bitstream_size: 4_000_000,
            quant_matrix: None,
            brc,
            pass: 0,
        }
    }

    fn pipeline() -> EncodePipeline {
        EncodePipeline::new(EncoderConfig::gen12()).unwrap()
    }

    #[test]
    fn test_end_of_stream_tail() {
        let seq = SequenceParams::default();
        let pic = PictureParams {
            last_picture_in_sequence: true,
            last_picture_in_stream: true,
            ..PictureParams::default()
        };
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let mut pipe = pipeline();
        let sub = pipe
            .encode_frame(&frame(&seq, &pic, &slices, &headers, false), &mut sink, &mut alloc, 0)
            .unwrap();

        let dwords = sink.dwords();
        assert!(dwords
            .windows(3)
            .any(|w| w == [0x4801_0000, 0x0100_0001, 0x0000_014A]));
        assert_eq!(sub.bytes, sink.used());
        assert_eq!(sub.stats.count(CommandId::HcpPakInsertObject), 2);
        assert_eq!(sub.stats.count(CommandId::MiBatchBufferEnd), 1);
        assert_eq!(sub.stats.count(CommandId::HucStart), 0);
        assert_eq!(pipe.frames(), 1);
    }

    #[test]
    fn test_brc_under_constant_qp() {
        let seq = SequenceParams::default();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let mut pipe = pipeline();
        let err = pipe
            .encode_frame(&frame(&seq, &pic, &slices, &headers, true), &mut sink, &mut alloc, 0)
            .unwrap_err();

        assert_eq!(err, Error::ConfigurationConflict(Conflict::BrcUnderConstantQp));
        assert_eq!(sink.used(), 0);
        assert_eq!(alloc.count_of(ResourceKind::Dmem), 0);
        assert_eq!(pipe.brc_state().phase(), BrcPhase::Uninitialized);
        assert_eq!(pipe.frames(), 0);
    }

    #[test]
    fn test_small_sink_left_untouched() {
        let seq = vbr();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(256);
        let mut alloc = CountingAllocator::new();

        let mut pipe = pipeline();
        let err = pipe
            .encode_frame(&frame(&seq, &pic, &slices, &headers, true), &mut sink, &mut alloc, 0)
            .unwrap_err();
        assert_eq!(err, Error::CapacityExceeded);
        assert_eq!(sink.used(), 0);
        assert_eq!(pipe.brc_state().phase(), BrcPhase::Uninitialized);
    }

    #[test]
    fn test_gen9_has_no_vdenc() {
        let seq = SequenceParams::default();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let mut pipe = EncodePipeline::new(EncoderConfig::gen9()).unwrap();
        let err = pipe
            .encode_frame(&frame(&seq, &pic, &slices, &headers, false), &mut sink, &mut alloc, 0)
            .unwrap_err();
        assert_eq!(err, Error::PlatformNotSupported);
        assert_eq!(alloc.allocation_count(), 0);
    }

    #[test]
    fn test_recycle_slot_busy() {
        let seq = SequenceParams::default();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let config = EncoderConfig {
            recycle_depth: 2,
            ..EncoderConfig::gen12()
        };
        let mut pipe = EncodePipeline::new(config).unwrap();
        let params = frame(&seq, &pic, &slices, &headers, false);

        assert_eq!(pipe.encode_frame(&params, &mut sink, &mut alloc, 0).unwrap().fence, 1);
        assert_eq!(pipe.encode_frame(&params, &mut sink, &mut alloc, 0).unwrap().fence, 2);

        let used = sink.used();
        assert_eq!(pipe.encode_frame(&params, &mut sink, &mut alloc, 0).unwrap_err(), Error::ResourceBusy);
        assert_eq!(sink.used(), used);

        let third = pipe.encode_frame(&params, &mut sink, &mut alloc, 1).unwrap();
        assert_eq!(third.slot, 0);
        assert_eq!(third.fence, 3);
    }

    #[test]
    fn test_brc_init_then_update() {
        let seq = vbr();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let mut pipe = pipeline();
        let params = frame(&seq, &pic, &slices, &headers, true);

        let first = pipe.encode_frame(&params, &mut sink, &mut alloc, 0).unwrap();
        assert_eq!(first.brc_function, Some(BrcFunction::Init));
        assert_eq!(first.stats.count(CommandId::HucStart), 2);
        assert_eq!(pipe.brc_state().phase(), BrcPhase::Updated { epoch: 1, frames: 1 });

        let second = pipe.encode_frame(&params, &mut sink, &mut alloc, 0).unwrap();
        assert_eq!(second.brc_function, None);
        assert_eq!(second.stats.count(CommandId::HucStart), 1);
        assert_eq!(pipe.brc_state().phase(), BrcPhase::Updated { epoch: 1, frames: 2 });
    }

    #[test]
    fn test_second_pass_reuses_frame() {
        let seq = vbr();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let mut pipe = pipeline();
        let first_pass = frame(&seq, &pic, &slices, &headers, true);
        let second_pass = FrameParams { pass: 1, ..first_pass };

        let first = pipe.encode_frame(&first_pass, &mut sink, &mut alloc, 0).unwrap();
        let second = pipe.encode_frame(&second_pass, &mut sink, &mut alloc, 0).unwrap();
        assert_eq!(first.frame_id, 1);
        assert_eq!(second.slot, first.slot);
        assert_eq!(second.frame_id, first.frame_id);
        assert!(second.fence > first.fence);
        assert_eq!(second.brc_function, None);
        assert_eq!(second.stats.count(CommandId::HucStart), 1);
        assert_eq!(pipe.frames(), 1);
        assert_eq!(pipe.brc_state().phase(), BrcPhase::Updated { epoch: 1, frames: 1 });

        // Update blocks of both passes carry the same FrameID
        let update_ids: Vec<u32> = (0..alloc.allocation_count() as u32)
            .map(ResourceHandle::new)
            .filter_map(|h| alloc.get(h))
            .filter(|a| a.kind == ResourceKind::Dmem && a.size == DMEM_SIZE as u32)
            .skip(1)
            .map(|a| u32::from_le_bytes([a.data[4], a.data[5], a.data[6], a.data[7]]))
            .collect();
        assert_eq!(update_ids, [1, 1]);

        let next = pipe.encode_frame(&first_pass, &mut sink, &mut alloc, 0).unwrap();
        assert_eq!(next.frame_id, 2);
        assert_ne!(next.slot, first.slot);
        assert_eq!(pipe.frames(), 2);
    }

    #[test]
    fn test_second_pass_needs_opened_frame() {
        let seq = vbr();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let mut pipe = pipeline();
        let second_pass = FrameParams {
            pass: 1,
            ..frame(&seq, &pic, &slices, &headers, true)
        };
        let err = pipe.encode_frame(&second_pass, &mut sink, &mut alloc, 0).unwrap_err();
        assert_eq!(err, Error::ConfigurationConflict(Conflict::PassOutOfRange));
        assert_eq!(sink.used(), 0);
        assert_eq!(alloc.count_of(ResourceKind::Dmem), 0);

        // Opened without BRC, so no init was ever sent
        pipe.encode_frame(&frame(&seq, &pic, &slices, &headers, false), &mut sink, &mut alloc, 0)
            .unwrap();
        let used = sink.used();
        let err = pipe.encode_frame(&second_pass, &mut sink, &mut alloc, 0).unwrap_err();
        assert_eq!(err, Error::ConfigurationConflict(Conflict::PassOutOfRange));
        assert_eq!(sink.used(), used);
        assert_eq!(pipe.brc_state().phase(), BrcPhase::Uninitialized);
        assert_eq!(pipe.frames(), 1);
    }

    #[test]
    fn test_tiled_frame() {
        let seq = SequenceParams::default();
        let mut pic = PictureParams {
            tiles_enabled: true,
            num_tile_columns_minus1: 1,
            num_tile_rows_minus1: 1,
            ..PictureParams::default()
        };
        pic.tile_column_width[..2].copy_from_slice(&[15, 15]);
        pic.tile_row_height[..2].copy_from_slice(&[9, 8]);
        let slices = [slice(0, 135), slice(15, 135), slice(270, 120), slice(285, 120)];
        let headers = [header(), header(), header(), header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let mut pipe = pipeline();
        let sub = pipe
            .encode_frame(&frame(&seq, &pic, &slices, &headers, false), &mut sink, &mut alloc, 0)
            .unwrap();
        assert_eq!(sub.num_tiles, 4);
        assert_eq!(sub.stats.count(CommandId::HcpTileCoding), 4);
        assert_eq!(sub.stats.count(CommandId::HcpSliceState), 4);
        assert_eq!(sub.stats.count(CommandId::VdencWalkerState), 4);
    }

    #[test]
    fn test_slice_size_control_with_tiles() {
        let seq = SequenceParams {
            slice_size_control: true,
            ..SequenceParams::default()
        };
        let pic = PictureParams {
            tiles_enabled: true,
            num_tile_columns_minus1: 1,
            ..PictureParams::default()
        };
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let err = pipeline()
            .encode_frame(&frame(&seq, &pic, &slices, &headers, false), &mut sink, &mut alloc, 0)
            .unwrap_err();
        assert_eq!(err, Error::ConfigurationConflict(Conflict::SliceSizeControlWithTiles));
    }

    #[test]
    fn test_missing_slice_header() {
        let seq = SequenceParams::default();
        let pic = PictureParams::default();
        let slices = [slice(0, 255), slice(255, 255)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let err = pipeline()
            .encode_frame(&frame(&seq, &pic, &slices, &headers, false), &mut sink, &mut alloc, 0)
            .unwrap_err();
        assert_eq!(err, Error::InvalidParameter);
        assert_eq!(sink.used(), 0);
    }

    #[test]
    fn test_pass_out_of_range() {
        let seq = vbr();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let params = FrameParams {
            pass: 2,
            ..frame(&seq, &pic, &slices, &headers, true)
        };
        let err = pipeline().encode_frame(&params, &mut sink, &mut alloc, 0).unwrap_err();
        assert_eq!(err, Error::ConfigurationConflict(Conflict::PassOutOfRange));
    }

    #[test]
    fn test_release_frees_everything() {
        let seq = vbr();
        let pic = PictureParams::default();
        let slices = [slice(0, 510)];
        let headers = [header()];
        let mut sink = VecSink::with_capacity(1 << 20);
        let mut alloc = CountingAllocator::new();

        let mut pipe = pipeline();
        pipe.encode_frame(&frame(&seq, &pic, &slices, &headers, true), &mut sink, &mut alloc, 0)
            .unwrap();
        pipe.release(&mut alloc).unwrap();

        let live = alloc.allocation_count() - alloc.free_count();
        assert_eq!(live, 0);
        assert_eq!(pipe.brc_state().phase(), BrcPhase::Uninitialized);
    }
}
