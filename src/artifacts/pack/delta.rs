//! Delta encoding between two byte payloads.
//!
//! A delta describes the target payload as a sequence of instructions over a
//! base payload: either copy a run of bytes out of the base, or insert
//! literal bytes carried by the delta itself. The wire form starts with the
//! sizes of both payloads so a decoder can validate what it is about to
//! reconstruct before doing any work.
//!
//! The encoder indexes the base in fixed-size blocks and greedily extends
//! every block match, trading optimality for a single pass over the target.

use std::collections::HashMap;

use anyhow::{Context, Result, bail, ensure};
use bytes::Bytes;

use super::read_byte;

/// Granularity of the encoder's match index over the base payload.
const BLOCK_SIZE: usize = 16;

/// Longest run a single copy instruction can carry on the wire.
const MAX_COPY_SIZE: u64 = 0x00ff_ffff;

/// Longest literal run a single insert instruction can carry.
const MAX_INSERT_SIZE: usize = 0x7f;

#[derive(Debug, PartialEq, Eq)]
pub enum DeltaInstruction {
    /// Copy `size` bytes starting at `offset` in the base payload.
    Copy { offset: u64, size: u64 },
    /// Append the carried bytes verbatim.
    Insert(Bytes),
}

/// A parsed or freshly computed delta between two payloads.
#[derive(Debug)]
pub struct Delta {
    base_size: u64,
    result_size: u64,
    instructions: Vec<DeltaInstruction>,
}

impl Delta {
    /// Computes a delta that rebuilds `target` out of `base`.
    pub fn compute(base: &[u8], target: &[u8]) -> Self {
        let index = BlockIndex::build(base);
        let mut instructions = Vec::new();
        let mut literal = Vec::new();
        let mut position = 0;

        while position < target.len() {
            if let Some((offset, size)) = index.longest_match(base, target, position) {
                flush_literal(&mut instructions, &mut literal);
                push_copy(&mut instructions, offset as u64, size as u64);
                position += size;
            } else {
                literal.push(target[position]);
                position += 1;
            }
        }

        flush_literal(&mut instructions, &mut literal);

        Self {
            base_size: base.len() as u64,
            result_size: target.len() as u64,
            instructions,
        }
    }

    /// Parses the wire form of a delta.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut input = data;
        let base_size = read_size(&mut input).context("unable to read the delta base size")?;
        let result_size = read_size(&mut input).context("unable to read the delta result size")?;
        let mut instructions = Vec::new();

        while let Some((&command, rest)) = input.split_first() {
            input = rest;

            if command & 0x80 != 0 {
                let (offset, size) = read_copy(command, &mut input)?;
                instructions.push(DeltaInstruction::Copy { offset, size });
            } else if command != 0 {
                let length = command as usize;
                ensure!(
                    input.len() >= length,
                    "delta insert runs past the end of the stream"
                );

                let (literal, rest) = input.split_at(length);
                instructions.push(DeltaInstruction::Insert(Bytes::copy_from_slice(literal)));
                input = rest;
            } else {
                bail!("delta stream contains the reserved zero instruction");
            }
        }

        Ok(Self {
            base_size,
            result_size,
            instructions,
        })
    }

    /// Renders the delta in its wire form.
    pub fn serialize(&self) -> Bytes {
        let mut output = Vec::new();
        write_size(&mut output, self.base_size);
        write_size(&mut output, self.result_size);

        for instruction in &self.instructions {
            match instruction {
                DeltaInstruction::Copy { offset, size } => write_copy(&mut output, *offset, *size),
                DeltaInstruction::Insert(literal) => {
                    output.push(literal.len() as u8);
                    output.extend_from_slice(literal);
                }
            }
        }

        output.into()
    }

    /// Rebuilds the target payload from `base`, validating both declared
    /// sizes and every copy range along the way.
    pub fn apply(&self, base: &[u8]) -> Result<Bytes> {
        ensure!(
            base.len() as u64 == self.base_size,
            "delta expects a base of {} bytes but was handed {}",
            self.base_size,
            base.len()
        );

        let mut output = Vec::with_capacity(self.result_size as usize);

        for instruction in &self.instructions {
            match instruction {
                DeltaInstruction::Copy { offset, size } => {
                    let start = *offset as usize;
                    let end = start
                        .checked_add(*size as usize)
                        .filter(|end| *end <= base.len())
                        .context("delta copy reaches outside the base payload")?;

                    output.extend_from_slice(&base[start..end]);
                }
                DeltaInstruction::Insert(literal) => output.extend_from_slice(literal),
            }
        }

        ensure!(
            output.len() as u64 == self.result_size,
            "delta promised {} bytes but produced {}",
            self.result_size,
            output.len()
        );

        Ok(output.into())
    }

    pub fn result_size(&self) -> u64 {
        self.result_size
    }
}

fn flush_literal(instructions: &mut Vec<DeltaInstruction>, literal: &mut Vec<u8>) {
    for chunk in literal.chunks(MAX_INSERT_SIZE) {
        instructions.push(DeltaInstruction::Insert(Bytes::copy_from_slice(chunk)));
    }

    literal.clear();
}

fn push_copy(instructions: &mut Vec<DeltaInstruction>, mut offset: u64, mut size: u64) {
    while size > 0 {
        let step = size.min(MAX_COPY_SIZE);
        instructions.push(DeltaInstruction::Copy { offset, size: step });
        offset += step;
        size -= step;
    }
}

/// Reads a little endian varint with seven payload bits per byte.
fn read_size(input: &mut &[u8]) -> Result<u64> {
    let mut size = 0u64;
    let mut shift = 0;

    loop {
        let byte = read_byte(input)?;
        ensure!(shift <= 63, "delta size varint is too long");

        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok(size);
        }
    }
}

fn write_size(output: &mut Vec<u8>, mut size: u64) {
    loop {
        let byte = (size & 0x7f) as u8;
        size >>= 7;

        if size > 0 {
            output.push(byte | 0x80);
        } else {
            output.push(byte);
            return;
        }
    }
}

/// Reads the operands of a copy instruction. The command byte flags which
/// offset and size bytes are present; absent bytes are zero.
fn read_copy(command: u8, input: &mut &[u8]) -> Result<(u64, u64)> {
    let mut offset = 0u64;
    let mut size = 0u64;

    for bit in 0..4 {
        if command & (1 << bit) != 0 {
            offset |= (read_byte(input)? as u64) << (8 * bit);
        }
    }

    for bit in 0..3 {
        if command & (0x10 << bit) != 0 {
            size |= (read_byte(input)? as u64) << (8 * bit);
        }
    }

    // A copy with no size bytes means the maximum run of 0x10000.
    if size == 0 {
        size = 0x10000;
    }

    Ok((offset, size))
}

fn write_copy(output: &mut Vec<u8>, offset: u64, size: u64) {
    let command_slot = output.len();
    output.push(0x80);

    for bit in 0..4 {
        let byte = (offset >> (8 * bit)) as u8;

        if byte != 0 {
            output[command_slot] |= 1 << bit;
            output.push(byte);
        }
    }

    for bit in 0..3 {
        let byte = (size >> (8 * bit)) as u8;

        if byte != 0 {
            output[command_slot] |= 0x10 << bit;
            output.push(byte);
        }
    }
}

/// A hash index over non-overlapping blocks of the base payload.
struct BlockIndex {
    blocks: HashMap<u64, Vec<usize>>,
}

impl BlockIndex {
    fn build(base: &[u8]) -> Self {
        let mut blocks: HashMap<u64, Vec<usize>> = HashMap::new();

        for (block, chunk) in base.chunks_exact(BLOCK_SIZE).enumerate() {
            blocks
                .entry(hash_block(chunk))
                .or_default()
                .push(block * BLOCK_SIZE);
        }

        Self { blocks }
    }

    /// Finds the longest base run matching the target at `position`, or
    /// `None` when no full block matches there.
    fn longest_match(&self, base: &[u8], target: &[u8], position: usize) -> Option<(usize, usize)> {
        let window = target.get(position..position + BLOCK_SIZE)?;
        let candidates = self.blocks.get(&hash_block(window))?;
        let mut best: Option<(usize, usize)> = None;

        for &offset in candidates {
            if &base[offset..offset + BLOCK_SIZE] != window {
                continue;
            }

            let length = common_run(&base[offset..], &target[position..]);

            if best.is_none_or(|(_, best_length)| length > best_length) {
                best = Some((offset, length));
            }
        }

        best
    }
}

fn hash_block(block: &[u8]) -> u64 {
    // FNV-1a, folded over the block.
    block.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn common_run(left: &[u8], right: &[u8]) -> usize {
    left.iter().zip(right).take_while(|(l, r)| l == r).count()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn round_trip(base: &[u8], target: &[u8]) -> Delta {
        let delta = Delta::compute(base, target);
        let wire = delta.serialize();

        Delta::deserialize(&wire).unwrap()
    }

    #[rstest]
    fn identical_payloads_become_a_bare_copy() {
        let base = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let delta = Delta::compute(&base, &base);

        assert_eq!(
            delta.instructions,
            vec![DeltaInstruction::Copy {
                offset: 0,
                size: base.len() as u64
            }]
        );
        assert_eq!(delta.apply(&base).unwrap(), Bytes::from(base));
    }

    #[rstest]
    fn unrelated_payloads_fall_back_to_literals() {
        let base = b"0123456789abcdef".to_vec();
        let target = b"nothing in common with the base".to_vec();
        let delta = round_trip(&base, &target);

        assert!(
            delta
                .instructions
                .iter()
                .all(|instruction| matches!(instruction, DeltaInstruction::Insert(_)))
        );
        assert_eq!(delta.apply(&base).unwrap(), Bytes::from(target));
    }

    #[rstest]
    fn an_edit_in_the_middle_reuses_both_flanks() {
        let base: Vec<u8> = (0u8..=255).cycle().take(512).collect();
        let mut target = base.clone();
        target.splice(200..200, b"inserted run".iter().copied());

        let delta = round_trip(&base, &target);

        let copied: u64 = delta
            .instructions
            .iter()
            .filter_map(|instruction| match instruction {
                DeltaInstruction::Copy { size, .. } => Some(*size),
                DeltaInstruction::Insert(_) => None,
            })
            .sum();

        assert!(copied >= 400, "most of the target should be copied");
        assert_eq!(delta.apply(&base).unwrap(), Bytes::from(target));
    }

    #[rstest]
    fn long_literal_runs_are_chunked() {
        let base = Vec::new();
        let target = vec![42u8; 300];
        let delta = round_trip(&base, &target);

        assert!(delta.instructions.len() >= 3);
        assert_eq!(delta.apply(&base).unwrap(), Bytes::from(target));
    }

    #[rstest]
    #[case(0x7f)]
    #[case(0x80)]
    #[case(0x4000)]
    fn size_varints_survive_the_boundary_values(#[case] size: u64) {
        let mut buffer = Vec::new();
        write_size(&mut buffer, size);

        let mut input = buffer.as_slice();

        assert_eq!(read_size(&mut input).unwrap(), size);
        assert!(input.is_empty());
    }

    #[rstest]
    fn applying_against_the_wrong_base_is_rejected() {
        let base = b"first 16 bytes..and quite a bit more content".to_vec();
        let delta = Delta::compute(&base, b"first 16 bytes..trailer");

        let error = delta.apply(b"far too short").unwrap_err();

        assert!(error.to_string().contains("expects a base"));
    }

    #[rstest]
    fn the_reserved_instruction_is_rejected() {
        // base size 0, result size 1, then the reserved zero command.
        let error = Delta::deserialize(&[0, 1, 0]).unwrap_err();

        assert!(error.to_string().contains("reserved"));
    }

    #[rstest]
    fn a_copy_with_no_size_bytes_means_the_maximum_run() {
        let base = vec![7u8; 0x10000];
        // base and result sizes, then a copy with only the offset flag form.
        let mut wire = Vec::new();
        write_size(&mut wire, base.len() as u64);
        write_size(&mut wire, 0x10000);
        wire.push(0x80);

        let delta = Delta::deserialize(&wire).unwrap();

        assert_eq!(delta.apply(&base).unwrap().len(), 0x10000);
    }
}
