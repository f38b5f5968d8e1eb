//! Tiered wire codec for flag sets
//!
//! There is no length prefix or checksum: the decoder learns how many bytes
//! to consume purely from the headers it reads, so both sides must agree on
//! the [`Tier`] out of band (normally through a shared [`FlagDomain`]).
//!
//! ## Tiers
//!
//! - [`Tier::Single`] (capacity <= 8): the flag byte itself, `0` when empty.
//! - [`Tier::Presence`] (capacity <= 64): a presence byte whose bit `i`
//!   (LSB first) marks byte `i` as nonzero, then the nonzero bytes ascending.
//! - [`Tier::Sectioned`] (capacity <= 1152): the set is split into eight
//!   18-byte blocks. A section byte marks occupied blocks, and each occupied
//!   block follows as a group-header encoding.
//!
//! ## Block encoding
//!
//! A block's 18 positions are covered by four groups of 6, 5, 4 and 3 bytes.
//! Each group with a nonzero byte emits one header byte and then its nonzero
//! bytes. Header layout, most significant bit first:
//!
//! ```text
//! group 1: E 0 d d d d d d     positions  0..6
//! group 2: E 1 0 d d d d d     positions  6..11
//! group 3: E 1 1 0 d d d d     positions 11..15
//! group 4: E 1 1 1 0 d d d     positions 15..18
//! ```
//!
//! `E` is set on the last header of the block; `d` bits are a presence bitmap
//! over the group, LSB first.
//!
//! [`FlagDomain`]: crate::id::FlagDomain

use crate::errors::CodecError;
use crate::flags::{canonical_len, FlagSet};
use crate::id::FlagDomain;

/// Bits carried by one byte
pub const BITS_PER_BYTE: usize = 8;

/// Bytes in one block of the sectioned tier
pub const BLOCK_BYTES: usize = 18;

/// Blocks in a sectioned domain
pub const BLOCK_COUNT: usize = 8;

/// Largest flag set the codec can carry, in bytes
pub const MAX_BYTES: usize = BLOCK_BYTES * BLOCK_COUNT;

/// Largest domain capacity the codec can carry, in flags
pub const MAX_CAPACITY: u16 = (MAX_BYTES * BITS_PER_BYTE) as u16;

const END_OF_BLOCK: u8 = 0x80;

/// One group of a block: the positions it covers and its tag
struct Group {
    start: usize,
    len: usize,
    tag: u8,
}

impl Group {
    fn data_mask(&self) -> u8 {
        (1u8 << self.len) - 1
    }
}

const GROUPS: [Group; 4] = [
    Group { start: 0, len: 6, tag: 0b0000_0000 },
    Group { start: 6, len: 5, tag: 0b0100_0000 },
    Group { start: 11, len: 4, tag: 0b0110_0000 },
    Group { start: 15, len: 3, tag: 0b0111_0000 },
];

// =============================================================================
// Tier selection
// =============================================================================

/// Wire layout chosen from a domain's declared capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Up to 8 flags: one raw byte
    Single,
    /// Up to 64 flags: presence byte plus nonzero bytes
    Presence,
    /// Up to 1152 flags: section byte plus nested block encodings
    Sectioned,
}

impl Tier {
    /// Select the tier for a domain capacity
    pub fn for_capacity(capacity: u16) -> Self {
        match capacity {
            0..=8 => Tier::Single,
            9..=64 => Tier::Presence,
            _ => Tier::Sectioned,
        }
    }

    /// Largest canonical set, in bytes, this tier can carry
    pub fn max_bytes(self) -> usize {
        match self {
            Tier::Single => 1,
            Tier::Presence => 8,
            Tier::Sectioned => MAX_BYTES,
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Encoder/decoder for one tier. Stateless and safe to share across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagCodec {
    tier: Tier,
}

impl FlagCodec {
    /// Codec for an explicit tier
    pub fn new(tier: Tier) -> Self {
        Self { tier }
    }

    /// Codec agreed on through a shared domain
    pub fn for_domain(domain: &FlagDomain) -> Self {
        Self::new(domain.tier())
    }

    /// Tier this codec reads and writes
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Encode a flag set into a fresh buffer
    pub fn encode(&self, set: &FlagSet) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(1 + set.byte_len());
        self.encode_into(set.as_bytes(), &mut out)?;
        Ok(out)
    }

    /// Append the encoding of `flags` to `out`
    ///
    /// Trailing zero bytes in `flags` are ignored. On error nothing is written.
    /// Only the tier's byte width is checked; use
    /// [`encode_checked`](Self::encode_checked) to also reject ids at or above
    /// a domain's capacity.
    pub fn encode_into(&self, flags: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let flags = &flags[..canonical_len(flags)];
        if flags.len() > self.tier.max_bytes() {
            return Err(CodecError::ExceedsTier {
                len: flags.len(),
                tier: self.tier,
            });
        }

        match self.tier {
            Tier::Single => out.push(flags.first().copied().unwrap_or(0)),
            Tier::Presence => encode_presence(flags, out),
            Tier::Sectioned => encode_sectioned(flags, out),
        }
        Ok(())
    }

    /// [`encode_into`](Self::encode_into), first rejecting any id at or above
    /// `domain`'s capacity
    pub fn encode_checked(
        &self,
        domain: &FlagDomain,
        flags: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        if let Some(id) = highest_id(flags) {
            if id >= usize::from(domain.capacity()) {
                return Err(CodecError::OutsideDomain {
                    id,
                    domain: domain.name().to_string(),
                    capacity: domain.capacity(),
                });
            }
        }
        self.encode_into(flags, out)
    }

    /// Decode one flag set from the front of `input`, advancing past it
    pub fn decode(&self, input: &mut &[u8]) -> Result<FlagSet, CodecError> {
        let bytes = match self.tier {
            Tier::Single => {
                let byte = read_u8(input)?;
                if byte == 0 {
                    Vec::new()
                } else {
                    vec![byte]
                }
            }
            Tier::Presence => decode_presence(input)?,
            Tier::Sectioned => decode_sectioned(input)?,
        };
        Ok(FlagSet::from_bounded(bytes))
    }

    /// Exact number of bytes [`encode_into`](Self::encode_into) would write
    pub fn encoded_len(&self, flags: &[u8]) -> usize {
        let flags = &flags[..canonical_len(flags)];
        match self.tier {
            Tier::Single => 1,
            Tier::Presence => 1 + nonzero(flags),
            Tier::Sectioned => {
                1 + flags
                    .chunks(BLOCK_BYTES)
                    .map(|block| {
                        let headers = GROUPS
                            .iter()
                            .filter(|g| group_bitmap(block, g) != 0)
                            .count();
                        headers + nonzero(block)
                    })
                    .sum::<usize>()
            }
        }
    }
}

/// Index of the highest set flag, if any
fn highest_id(flags: &[u8]) -> Option<usize> {
    let len = canonical_len(flags);
    let last = *flags.get(len.checked_sub(1)?)?;
    Some((len - 1) * BITS_PER_BYTE + (BITS_PER_BYTE - 1 - last.trailing_zeros() as usize))
}

fn nonzero(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b != 0).count()
}

fn read_u8(input: &mut &[u8]) -> Result<u8, CodecError> {
    let (&byte, rest) = input
        .split_first()
        .ok_or(CodecError::UnexpectedEof { needed: 1 })?;
    *input = rest;
    Ok(byte)
}

/// Bitmap with bit `i` set iff `bytes[i]` is nonzero
fn presence_bitmap<'a>(chunks: impl Iterator<Item = &'a [u8]>) -> u8 {
    chunks
        .enumerate()
        .filter(|(_, chunk)| chunk.iter().any(|&b| b != 0))
        .fold(0u8, |bits, (i, _)| bits | (1u8 << i))
}

/// Positions named by a presence bitmap, ascending
fn present(bitmap: u8) -> impl Iterator<Item = usize> {
    (0..8).filter(move |&i| bitmap & (1u8 << i) != 0)
}

// =============================================================================
// Presence tier
// =============================================================================

fn encode_presence(flags: &[u8], out: &mut Vec<u8>) {
    out.push(presence_bitmap(flags.chunks(1)));
    out.extend(flags.iter().copied().filter(|&b| b != 0));
}

fn decode_presence(input: &mut &[u8]) -> Result<Vec<u8>, CodecError> {
    let presence = read_u8(input)?;
    let needed = presence.count_ones() as usize;
    if input.len() < needed {
        return Err(CodecError::UnexpectedEof {
            needed: needed - input.len(),
        });
    }

    let len = BITS_PER_BYTE - presence.leading_zeros() as usize;
    let mut bytes = vec![0u8; len];
    for i in present(presence) {
        bytes[i] = read_u8(input)?;
    }
    Ok(bytes)
}

// =============================================================================
// Sectioned tier
// =============================================================================

fn encode_sectioned(flags: &[u8], out: &mut Vec<u8>) {
    let sections = presence_bitmap(flags.chunks(BLOCK_BYTES));
    out.push(sections);
    for (block, chunk) in flags.chunks(BLOCK_BYTES).enumerate() {
        if sections & (1u8 << block) != 0 {
            encode_block(chunk, out);
        }
    }
}

fn decode_sectioned(input: &mut &[u8]) -> Result<Vec<u8>, CodecError> {
    let sections = read_u8(input)?;
    let blocks = BITS_PER_BYTE - sections.leading_zeros() as usize;
    let mut bytes = vec![0u8; blocks * BLOCK_BYTES];
    for block in present(sections) {
        let start = block * BLOCK_BYTES;
        decode_block(input, &mut bytes[start..start + BLOCK_BYTES])?;
    }
    bytes.truncate(canonical_len(&bytes));
    Ok(bytes)
}

/// Presence bitmap of one group within a (possibly short) block
fn group_bitmap(block: &[u8], group: &Group) -> u8 {
    let end = (group.start + group.len).min(block.len());
    if group.start >= end {
        return 0;
    }
    presence_bitmap(block[group.start..end].chunks(1))
}

/// Encode one block; `block` may be shorter than [`BLOCK_BYTES`] and must
/// contain at least one nonzero byte
fn encode_block(block: &[u8], out: &mut Vec<u8>) {
    let bitmaps: [u8; 4] = std::array::from_fn(|i| group_bitmap(block, &GROUPS[i]));
    let last = bitmaps.iter().rposition(|&bits| bits != 0);

    for (index, (group, &bits)) in GROUPS.iter().zip(&bitmaps).enumerate() {
        if bits == 0 {
            continue;
        }
        let mut header = group.tag | bits;
        if Some(index) == last {
            header |= END_OF_BLOCK;
        }
        out.push(header);
        out.extend(present(bits).map(|i| block[group.start + i]));
    }
}

/// Identify the group a header byte belongs to
fn header_group(header: u8) -> Result<usize, CodecError> {
    let markers = ((header & !END_OF_BLOCK) << 1).leading_ones() as usize;
    if markers < GROUPS.len() {
        Ok(markers)
    } else {
        Err(CodecError::InvalidGroupHeader { byte: header })
    }
}

fn decode_block(input: &mut &[u8], block: &mut [u8]) -> Result<(), CodecError> {
    let mut previous: Option<usize> = None;
    loop {
        let header = read_u8(input)?;
        let index = header_group(header)?;
        if let Some(previous) = previous.filter(|&p| p >= index) {
            return Err(CodecError::GroupOutOfOrder {
                group: index + 1,
                previous: previous + 1,
            });
        }
        previous = Some(index);

        let group = &GROUPS[index];
        for i in present(header & group.data_mask()) {
            block[group.start + i] = read_u8(input)?;
        }

        if header & END_OF_BLOCK != 0 {
            return Ok(());
        }
    }
}
