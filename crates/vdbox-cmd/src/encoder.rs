//! # Command Encoder
//!
//! Turns typed command parameters into records for the active generation and
//! appends them to a command sink.

use vdbox_core::{CommandSink, Result};

use crate::generation::{CommandId, GenerationDescriptor};
use crate::record::CommandRecord;

// =============================================================================
// ENCODER TRAIT
// =============================================================================

/// A command parameter block that knows how to fill its record
pub trait EncodeCommand {
    /// Command this block encodes
    const ID: CommandId;

    /// Fill `rec`, which arrives zeroed with DW0 encoded
    ///
    /// Implementations run the generic fill first, then the generation's
    /// override for the command if it has one.
    fn fill(&self, gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()>;

    /// Build the record for `gen`
    fn encode(&self, gen: &GenerationDescriptor) -> Result<CommandRecord> {
        let mut rec = CommandRecord::begin(gen.layout(Self::ID)?);
        self.fill(gen, &mut rec)?;
        Ok(rec)
    }
}

// =============================================================================
// COMMAND WRITER
// =============================================================================

/// Writer statistics
#[derive(Debug, Clone, Default)]
pub struct WriterStats {
    /// Commands appended
    pub commands: u32,
    /// Bytes appended
    pub bytes: usize,
    per_command: [u32; CommandId::COUNT],
}

impl WriterStats {
    /// Records appended for one command id
    pub fn count(&self, id: CommandId) -> u32 {
        self.per_command[id.index()]
    }
}

/// Encodes commands for one generation into one sink
pub struct CommandWriter<'a> {
    gen: &'static GenerationDescriptor,
    sink: &'a mut dyn CommandSink,
    stats: WriterStats,
}

impl<'a> CommandWriter<'a> {
    /// Create a writer
    pub fn new(gen: &'static GenerationDescriptor, sink: &'a mut dyn CommandSink) -> Self {
        Self {
            gen,
            sink,
            stats: WriterStats::default(),
        }
    }

    /// Generation the writer encodes for
    pub fn generation(&self) -> &'static GenerationDescriptor {
        self.gen
    }

    /// Encode and append one command
    pub fn emit<C: EncodeCommand>(&mut self, cmd: &C) -> Result<()> {
        let rec = cmd.encode(self.gen)?;
        self.push(C::ID, rec)
    }

    /// Encode and append a sequence of commands of one kind
    pub fn emit_all<'c, C, I>(&mut self, cmds: I) -> Result<()>
    where
        C: EncodeCommand + 'c,
        I: IntoIterator<Item = &'c C>,
    {
        for cmd in cmds {
            self.emit(cmd)?;
        }
        Ok(())
    }

    /// Append an already built record
    pub fn push(&mut self, id: CommandId, rec: CommandRecord) -> Result<()> {
        let size = rec.size();
        rec.append(self.sink)?;
        self.stats.commands += 1;
        self.stats.bytes += size;
        self.stats.per_command[id.index()] += 1;
        Ok(())
    }

    /// Bytes still available in the sink
    pub fn remaining(&self) -> usize {
        self.sink.remaining()
    }

    /// Statistics
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}

impl core::fmt::Debug for CommandWriter<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandWriter")
            .field("generation", &self.gen.generation)
            .field("used", &self.sink.used())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::{BatchBufferEnd, FlushDw};
    use vdbox_core::testing::VecSink;
    use vdbox_core::{Error, Generation};

    #[test]
    fn test_writer_counts() {
        let gen = GenerationDescriptor::for_generation(Generation::Gen12);
        let mut sink = VecSink::with_capacity(256);
        let mut writer = CommandWriter::new(gen, &mut sink);

        writer.emit(&FlushDw::default()).unwrap();
        writer.emit(&BatchBufferEnd).unwrap();

        assert_eq!(writer.stats().commands, 2);
        assert_eq!(writer.stats().bytes, 24);
        assert_eq!(writer.stats().count(CommandId::MiFlushDw), 1);
        assert_eq!(sink.used(), 24);
    }

    #[test]
    fn test_writer_full_sink() {
        let gen = GenerationDescriptor::for_generation(Generation::Gen11);
        let mut sink = VecSink::with_capacity(8);
        let mut writer = CommandWriter::new(gen, &mut sink);

        assert_eq!(writer.emit(&FlushDw::default()), Err(Error::CommandBufferFull));
        assert_eq!(writer.stats().commands, 0);
        assert_eq!(sink.used(), 0);
    }
}
