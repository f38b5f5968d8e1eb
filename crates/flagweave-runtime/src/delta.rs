//! Full and incremental update payloads
//!
//! An update is an encoded index set followed by one value per set index, in
//! ascending index order. A full update marks every index in `0..total`; an
//! incremental update marks only the owner's dirty indices. Both clear the
//! owner's dirty state, so the reader handles them identically.
//!
//! Value encoding belongs to the caller; this module only decides which
//! indices travel.

use std::hash::Hash;

use flagweave_core::{CodecError, FlagCodec, FlagSet, FlagTypeId, SharedFlagSet};

use crate::dirty::DirtyTracker;

/// Which indices an update carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Every index, ignoring dirty state; used on first contact
    Full,
    /// Only indices dirtied since the last flush; used in steady state
    Incremental,
}

/// Write an update for `owner` to `out`
///
/// `write_value` is called once per transmitted index, in ascending order.
/// Returns the number of values written. On error nothing is written and the
/// owner's dirty state is left as it was.
pub fn write_update<O, F>(
    tracker: &DirtyTracker<O>,
    owner: &O,
    mode: SyncMode,
    codec: &FlagCodec,
    total: u16,
    out: &mut Vec<u8>,
    mut write_value: F,
) -> Result<usize, CodecError>
where
    O: Eq + Hash + Clone,
    F: FnMut(FlagTypeId, &mut Vec<u8>),
{
    let taken = tracker.take(owner);
    let indices = match mode {
        SyncMode::Full => {
            let all: FlagSet = (0..total).map(FlagTypeId::new).collect();
            SharedFlagSet::from(all)
        }
        SyncMode::Incremental => taken.clone(),
    };

    if let Err(error) = codec.encode_into(indices.as_bytes(), out) {
        tracker.restore(owner, &taken);
        return Err(error);
    }

    let mut written = 0;
    for index in indices.iter() {
        write_value(index, out);
        written += 1;
    }
    tracing::trace!(?mode, written, "wrote flag update");
    Ok(written)
}

/// Read one update from the front of `input`
///
/// `read_value` is called once per transmitted index, in ascending order, and
/// must consume exactly that index's value. Returns the indices that were
/// updated.
pub fn read_update<F, E>(
    input: &mut &[u8],
    codec: &FlagCodec,
    mut read_value: F,
) -> Result<FlagSet, E>
where
    F: FnMut(FlagTypeId, &mut &[u8]) -> Result<(), E>,
    E: From<CodecError>,
{
    let indices = codec.decode(input).map_err(|error| {
        tracing::warn!(%error, "malformed flag update header");
        E::from(error)
    })?;

    for index in indices.iter() {
        read_value(index, input)?;
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagweave_core::Tier;

    fn id(index: u16) -> FlagTypeId {
        FlagTypeId::new(index)
    }

    #[test]
    fn incremental_update_carries_only_dirty_values() {
        let codec = FlagCodec::new(Tier::Presence);
        let tracker = DirtyTracker::new();
        tracker.set_dirty(&7u32, id(2));
        tracker.set_dirty(&7u32, id(10));

        let mut out = Vec::new();
        let written = write_update(
            &tracker,
            &7,
            SyncMode::Incremental,
            &codec,
            16,
            &mut out,
            |index, out| out.push(index.index() as u8),
        )
        .unwrap();

        assert_eq!(written, 2);
        assert_eq!(out, vec![0b0000_0011, 0b0010_0000, 0b0010_0000, 2, 10]);
        assert!(!tracker.is_dirty(&7));
    }

    #[test]
    fn full_update_carries_every_index_and_clears() {
        let codec = FlagCodec::new(Tier::Single);
        let tracker = DirtyTracker::new();
        tracker.set_dirty(&1u32, id(1));

        let mut out = Vec::new();
        let written = write_update(
            &tracker,
            &1,
            SyncMode::Full,
            &codec,
            3,
            &mut out,
            |index, out| out.push(index.index() as u8),
        )
        .unwrap();

        assert_eq!(written, 3);
        assert_eq!(out, vec![0b1110_0000, 0, 1, 2]);
        assert!(!tracker.is_dirty(&1));
    }

    #[test]
    fn flushed_owner_encodes_empty_update() {
        let codec = FlagCodec::new(Tier::Sectioned);
        let tracker = DirtyTracker::new();
        tracker.set_dirty(&"peer", id(500));

        let flush = |out: &mut Vec<u8>| {
            write_update(
                &tracker,
                &"peer",
                SyncMode::Incremental,
                &codec,
                1152,
                out,
                |_, out| out.push(0xFF),
            )
            .unwrap()
        };

        let mut first = Vec::new();
        assert_eq!(flush(&mut first), 1);

        let mut second = Vec::new();
        let written = flush(&mut second);

        assert_eq!(written, 0);
        assert_eq!(second, vec![0]);
    }

    #[test]
    fn failed_encode_restores_dirty_state() {
        let codec = FlagCodec::new(Tier::Single);
        let tracker = DirtyTracker::new();
        tracker.set_dirty(&1u32, id(20));

        let mut out = Vec::new();
        let result = write_update(
            &tracker,
            &1,
            SyncMode::Incremental,
            &codec,
            8,
            &mut out,
            |_, _| {},
        );

        assert!(result.is_err());
        assert!(out.is_empty());
        assert!(tracker.dirty(&1).has(id(20)));
    }

    #[test]
    fn reader_applies_values_in_index_order() {
        let codec = FlagCodec::new(Tier::Presence);
        let tracker = DirtyTracker::new();
        tracker.set_dirty(&0u8, id(30));
        tracker.set_dirty(&0u8, id(3));

        let mut wire = Vec::new();
        write_update(
            &tracker,
            &0,
            SyncMode::Incremental,
            &codec,
            64,
            &mut wire,
            |index, out| out.push(index.index() as u8 * 2),
        )
        .unwrap();

        let mut seen = Vec::new();
        let mut input = wire.as_slice();
        let indices = read_update::<_, CodecError>(&mut input, &codec, |index, input| {
            let (&value, rest) = input
                .split_first()
                .ok_or(CodecError::UnexpectedEof { needed: 1 })?;
            *input = rest;
            seen.push((index.index(), value));
            Ok(())
        })
        .unwrap();

        assert_eq!(indices.count(), 2);
        assert_eq!(seen, vec![(3, 6), (30, 60)]);
        assert!(input.is_empty());
    }

    #[test]
    fn reader_reports_truncated_header() {
        let codec = FlagCodec::new(Tier::Presence);
        let mut input: &[u8] = &[0b0000_0001];
        let result = read_update::<_, CodecError>(&mut input, &codec, |_, _| Ok(()));
        assert_eq!(result, Err(CodecError::UnexpectedEof { needed: 1 }));
    }
}
