use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::{AtomicU32, Ordering};

/// Default ring capacity. Generous compared to any realistic note rate;
/// a producer that outruns this without a drain in between corrupts history.
pub const RING_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
}

/// A note command crossing from the producer thread to the audio thread.
/// Packs losslessly into a single 32-bit word so the ring stays a plain
/// array of integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteCommand {
    pub kind: NoteKind,
    pub note: u8,
    pub split: usize,
}

impl NoteCommand {
    const NOTE_ON_BIT: u32 = 0x8000_0000;
    const SPLIT_SHIFT: u32 = 16;
    const SPLIT_MASK: u32 = 0x7fff;

    pub fn note_on(split: usize, note: u8) -> Self {
        Self { kind: NoteKind::On, note, split }
    }

    pub fn note_off(split: usize, note: u8) -> Self {
        Self { kind: NoteKind::Off, note, split }
    }

    /// Layout: bit 31 = note-on flag, bits 16..31 = split index, bits 0..8 = note.
    pub(crate) fn pack(self) -> u32 {
        let mut word = u32::from(self.note);
        word |= ((self.split as u32) & Self::SPLIT_MASK) << Self::SPLIT_SHIFT;
        if self.kind == NoteKind::On {
            word |= Self::NOTE_ON_BIT;
        }
        word
    }

    pub(crate) fn unpack(word: u32) -> Self {
        Self {
            kind: if word & Self::NOTE_ON_BIT != 0 {
                NoteKind::On
            } else {
                NoteKind::Off
            },
            note: word as u8,
            split: ((word >> Self::SPLIT_SHIFT) & Self::SPLIT_MASK) as usize,
        }
    }
}

/// Fixed-capacity single-producer/single-consumer ring of note commands.
///
/// The producer owns `write_count`, the consumer owns `read_count`, and the
/// only cross-thread synchronization is `published`: release-stored by
/// `enqueue`, acquire-loaded by `drain`. Neither side ever blocks.
///
/// Contract (not checked at runtime):
/// - exactly one thread calls `enqueue`, exactly one thread calls `drain`;
/// - `reset` is only called while neither side is active (backend start);
/// - the producer never gets more than `capacity` commands ahead of the
///   consumer. Overrun silently corrupts queued history.
pub struct NoteRing {
    slots: Box<[UnsafeCell<u32>]>,
    published: AtomicU32,
    write_count: Cell<u32>,
    read_count: Cell<u32>,
}

// SAFETY: the SPSC contract above means the two Cells are each touched by a
// single thread, and slot contents are handed over through the release/acquire
// pair on `published`.
unsafe impl Sync for NoteRing {}

impl NoteRing {
    /// Capacity must be a power of two so the index wrap is a mask.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two() && capacity > 0);
        Self {
            slots: (0..capacity).map(|_| UnsafeCell::new(0)).collect(),
            published: AtomicU32::new(0),
            write_count: Cell::new(0),
            read_count: Cell::new(0),
        }
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Producer side. Never blocks, never fails.
    pub fn enqueue(&self, command: NoteCommand) {
        let write = self.write_count.get();
        let slot = &self.slots[write as usize & self.mask()];
        // SAFETY: sole producer; the consumer only reads slots below
        // `published`, which still excludes this one.
        unsafe { *slot.get() = command.pack() };
        let next = write.wrapping_add(1);
        self.write_count.set(next);
        self.published.store(next, Ordering::Release);
    }

    /// Consumer side. Applies every published command in FIFO order.
    pub fn drain(&self, mut apply: impl FnMut(NoteCommand)) {
        let target = self.published.load(Ordering::Acquire);
        let mut read = self.read_count.get();
        while read != target {
            // SAFETY: sole consumer; the acquire load above ordered this slot
            // write before us.
            let word = unsafe { *self.slots[read as usize & self.mask()].get() };
            read = read.wrapping_add(1);
            self.read_count.set(read);
            apply(NoteCommand::unpack(word));
        }
    }

    /// Zeroes all counters. Only legal while no enqueue or drain is in
    /// flight; the engine calls this on backend start.
    pub fn reset(&self) {
        self.write_count.set(0);
        self.read_count.set(0);
        self.published.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_pack_roundtrip() {
        let cases = [
            NoteCommand::note_on(0, 60),
            NoteCommand::note_off(0, 60),
            NoteCommand::note_on(1, 127),
            NoteCommand::note_off(1, 0),
            NoteCommand::note_on(0, 255),
        ];
        for cmd in cases {
            assert_eq!(NoteCommand::unpack(cmd.pack()), cmd);
        }
    }

    #[test]
    fn test_fifo_order() {
        let ring = NoteRing::new(16);
        for note in 0..10u8 {
            ring.enqueue(NoteCommand::note_on(0, note));
        }

        let mut seen = Vec::new();
        ring.drain(|cmd| seen.push(cmd.note));
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        // Nothing left after a full drain.
        let mut count = 0;
        ring.drain(|_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_full_capacity_without_drain() {
        let ring = NoteRing::new(64);
        for i in 0..64u8 {
            ring.enqueue(NoteCommand::note_on(1, i));
        }

        let mut seen = Vec::new();
        ring.drain(|cmd| {
            assert_eq!(cmd.split, 1);
            seen.push(cmd.note);
        });
        assert_eq!(seen, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn test_reset_discards_pending() {
        let ring = NoteRing::new(16);
        ring.enqueue(NoteCommand::note_on(0, 1));
        ring.enqueue(NoteCommand::note_off(0, 1));
        ring.reset();

        let mut count = 0;
        ring.drain(|_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_concurrent_enqueue_drain_loses_nothing() {
        const TOTAL: u32 = 100_000;
        const WINDOW: u32 = 1024; // stay well inside capacity

        let ring = Arc::new(NoteRing::new(RING_CAPACITY));
        let applied = Arc::new(AtomicUsize::new(0));

        let producer = {
            let ring = Arc::clone(&ring);
            let applied = Arc::clone(&applied);
            std::thread::spawn(move || {
                for i in 0..TOTAL {
                    // Throttle so the producer never gets more than WINDOW
                    // ahead of the consumer (the contract the real producer
                    // honours by virtue of MIDI event rates).
                    while i - applied.load(Ordering::Acquire) as u32 >= WINDOW {
                        std::thread::yield_now();
                    }
                    let note = (i % 128) as u8;
                    ring.enqueue(NoteCommand::note_on((i % 2) as usize, note));
                }
            })
        };

        let mut expected = 0u32;
        while applied.load(Ordering::Acquire) < TOTAL as usize {
            ring.drain(|cmd| {
                assert_eq!(cmd.note, (expected % 128) as u8);
                assert_eq!(cmd.split, (expected % 2) as usize);
                expected += 1;
                applied.fetch_add(1, Ordering::Release);
            });
            std::thread::yield_now();
        }

        producer.join().unwrap();
        assert_eq!(expected, TOTAL);
    }
}
