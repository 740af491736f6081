//! Lock-free Command Queue
//!
//! Single-producer/single-consumer ring of timestamped register events, the
//! only data flowing from the bus sampler to the emulation engine.
//!
//! # Thread Safety
//! - One producer (bus sampler), one consumer (emulation engine)
//! - Slots are pairs of atomics; indices are monotonic `usize` counters
//! - Capacity is a power of two so `index & mask` selects the slot
//!
//! The producer never waits. When the consumer falls `capacity` or more
//! events behind, the oldest unread events are overwritten and the consumer
//! skips ahead so that at most `capacity - 1` unread events remain. A slot
//! that was being overwritten while the consumer read it is detected by
//! re-checking the write index and discarded.

use std::sync::atomic::{fence, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{BridgeError, Result};

/// Default ring capacity (events)
pub const DEFAULT_CAPACITY: usize = 256;

/// Upper bound on the ring capacity
const MAX_CAPACITY: usize = 1 << 20;

/// Destination of a captured write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetChip {
    /// Primary chip model
    ChipA,
    /// Second chip model
    ChipB,
    /// FM model, address port
    FmLow,
    /// FM model, data port
    FmHigh,
}

impl TargetChip {
    #[inline]
    fn bits(self) -> u16 {
        match self {
            TargetChip::ChipA => 0,
            TargetChip::ChipB => 1,
            TargetChip::FmLow => 2,
            TargetChip::FmHigh => 3,
        }
    }

    #[inline]
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => TargetChip::ChipA,
            1 => TargetChip::ChipB,
            2 => TargetChip::FmLow,
            _ => TargetChip::FmHigh,
        }
    }

    /// FM port number (0 = address, 1 = data)
    #[inline]
    pub fn fm_port(self) -> Option<u8> {
        match self {
            TargetChip::FmLow => Some(0),
            TargetChip::FmHigh => Some(1),
            _ => None,
        }
    }
}

/// One captured register write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEvent {
    /// Host cycle count at capture
    pub host_cycle: u64,
    /// Destination model
    pub target: TargetChip,
    /// Register index (0..=31)
    pub register: u8,
    /// Written value
    pub value: u8,
}

impl CommandEvent {
    /// Create an event
    pub fn new(host_cycle: u64, target: TargetChip, register: u8, value: u8) -> Self {
        CommandEvent {
            host_cycle,
            target,
            register: register & 0x1F,
            value,
        }
    }

    /// value | register << 8 | target << 13
    #[inline]
    fn pack(&self) -> u16 {
        self.value as u16 | ((self.register as u16 & 0x1F) << 8) | (self.target.bits() << 13)
    }

    #[inline]
    fn unpack(host_cycle: u64, packed: u16) -> Self {
        CommandEvent {
            host_cycle,
            target: TargetChip::from_bits(packed >> 13),
            register: ((packed >> 8) & 0x1F) as u8,
            value: (packed & 0xFF) as u8,
        }
    }
}

#[derive(Debug)]
struct Slot {
    cycle: AtomicU64,
    command: AtomicU16,
}

#[derive(Debug)]
struct Ring {
    slots: Box<[Slot]>,
    mask: usize,
    /// Published write position (producer)
    write: AtomicUsize,
    /// Read position (consumer)
    read: AtomicUsize,
    /// Events overwritten before they were read
    dropped: AtomicU64,
}

impl Ring {
    #[inline]
    fn capacity(&self) -> usize {
        self.mask + 1
    }
}

/// Fixed-capacity command ring
///
/// Construct, then [`split`](CommandQueue::split) into the producer and
/// consumer halves that move to their respective cores.
#[derive(Debug)]
pub struct CommandQueue {
    ring: Arc<Ring>,
}

impl CommandQueue {
    /// Create a queue
    /// Capacity will be rounded up to the next power of 2 (at least 2)
    ///
    /// # Errors
    ///
    /// Returns an error if the requested capacity is 0 or exceeds 2^20 events.
    pub fn new(requested_capacity: usize) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(BridgeError::InvalidArgument(
                "command queue capacity must be greater than 0".into(),
            ));
        }

        let capacity = requested_capacity.max(2).next_power_of_two();
        if capacity > MAX_CAPACITY {
            return Err(BridgeError::InvalidArgument(format!(
                "command queue capacity {capacity} exceeds maximum {MAX_CAPACITY}"
            )));
        }

        let slots = (0..capacity)
            .map(|_| Slot {
                cycle: AtomicU64::new(0),
                command: AtomicU16::new(0),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(CommandQueue {
            ring: Arc::new(Ring {
                slots,
                mask: capacity - 1,
                write: AtomicUsize::new(0),
                read: AtomicUsize::new(0),
                dropped: AtomicU64::new(0),
            }),
        })
    }

    /// Create a queue with [`DEFAULT_CAPACITY`]
    pub fn with_default_capacity() -> Result<Self> {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Ring capacity in events
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Split into producer and consumer halves
    pub fn split(self) -> (QueueProducer, QueueConsumer) {
        let producer = QueueProducer {
            ring: Arc::clone(&self.ring),
            write: 0,
        };
        let consumer = QueueConsumer {
            ring: self.ring,
            read: 0,
        };
        (producer, consumer)
    }
}

/// Producer half, owned by the bus sampler
#[derive(Debug)]
pub struct QueueProducer {
    ring: Arc<Ring>,
    write: usize,
}

impl QueueProducer {
    /// Append an event. Never blocks and never fails.
    #[inline]
    pub fn push(&mut self, event: CommandEvent) {
        let slot = &self.ring.slots[self.write & self.ring.mask];
        // Slot stores must not become visible before the previous publish.
        fence(Ordering::Release);
        slot.cycle.store(event.host_cycle, Ordering::Relaxed);
        slot.command.store(event.pack(), Ordering::Relaxed);
        self.write = self.write.wrapping_add(1);
        self.ring.write.store(self.write, Ordering::Release);
    }

    /// Number of events pushed so far
    pub fn pushed(&self) -> usize {
        self.write
    }
}

/// Consumer half, owned by the emulation engine
#[derive(Debug)]
pub struct QueueConsumer {
    ring: Arc<Ring>,
    read: usize,
}

impl QueueConsumer {
    /// Next event without consuming it
    pub fn peek(&mut self) -> Option<CommandEvent> {
        let capacity = self.ring.capacity();
        loop {
            let write = self.ring.write.load(Ordering::Acquire);
            if write == self.read {
                return None;
            }
            if write.wrapping_sub(self.read) >= capacity {
                self.skip_to(write.wrapping_sub(capacity - 1));
            }

            let slot = &self.ring.slots[self.read & self.ring.mask];
            let cycle = slot.cycle.load(Ordering::Relaxed);
            let command = slot.command.load(Ordering::Relaxed);
            fence(Ordering::Acquire);

            // The producer may have lapped us while the slot was read.
            let write_after = self.ring.write.load(Ordering::Relaxed);
            if write_after.wrapping_sub(self.read) >= capacity {
                self.skip_to(write_after.wrapping_sub(capacity - 1));
                continue;
            }

            return Some(CommandEvent::unpack(cycle, command));
        }
    }

    /// Consume the next event
    pub fn pop(&mut self) -> Option<CommandEvent> {
        let event = self.peek()?;
        self.read = self.read.wrapping_add(1);
        self.ring.read.store(self.read, Ordering::Release);
        Some(event)
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.ring.write.load(Ordering::Acquire) == self.read
    }

    /// Number of pending events (capped at capacity - 1)
    pub fn len(&self) -> usize {
        let write = self.ring.write.load(Ordering::Acquire);
        write.wrapping_sub(self.read).min(self.ring.capacity() - 1)
    }

    /// Discard every pending event
    pub fn clear(&mut self) {
        let write = self.ring.write.load(Ordering::Acquire);
        self.read = write;
        self.ring.read.store(self.read, Ordering::Release);
    }

    /// Total events lost to overwrite
    pub fn dropped(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }

    fn skip_to(&mut self, index: usize) {
        let lost = index.wrapping_sub(self.read) as u64;
        self.ring.dropped.fetch_add(lost, Ordering::Relaxed);
        self.read = index;
        self.ring.read.store(self.read, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(cycle: u64, value: u8) -> CommandEvent {
        CommandEvent::new(cycle, TargetChip::ChipA, 0x04, value)
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        assert_eq!(CommandQueue::new(100).unwrap().capacity(), 128);
        assert_eq!(CommandQueue::new(256).unwrap().capacity(), 256);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            CommandQueue::new(0),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fifo_order() {
        let (mut tx, mut rx) = CommandQueue::new(8).unwrap().split();
        for i in 0..5 {
            tx.push(event(i, i as u8));
        }
        assert_eq!(rx.len(), 5);
        for i in 0..5 {
            assert_eq!(rx.pop(), Some(event(i, i as u8)));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn test_drain_empty_is_noop() {
        let (mut tx, mut rx) = CommandQueue::new(4).unwrap().split();
        tx.push(event(1, 1));
        assert!(rx.pop().is_some());
        assert_eq!(rx.pop(), None);
        assert_eq!(rx.pop(), None);
        assert_eq!(rx.len(), 0);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let (mut tx, mut rx) = CommandQueue::new(4).unwrap().split();
        tx.push(event(7, 0x41));
        assert_eq!(rx.peek(), Some(event(7, 0x41)));
        assert_eq!(rx.peek(), Some(event(7, 0x41)));
        assert_eq!(rx.pop(), Some(event(7, 0x41)));
        assert_eq!(rx.peek(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let (mut tx, mut rx) = CommandQueue::new(4).unwrap().split();
        for i in 0..10 {
            tx.push(event(i, i as u8));
        }
        let drained: Vec<u64> = std::iter::from_fn(|| rx.pop()).map(|e| e.host_cycle).collect();
        assert_eq!(drained, vec![7, 8, 9]);
        assert_eq!(rx.dropped(), 7);
    }

    #[test]
    fn test_packing_keeps_every_field() {
        let (mut tx, mut rx) = CommandQueue::new(4).unwrap().split();
        let fm = CommandEvent::new(u64::MAX - 1, TargetChip::FmHigh, 0x1F, 0xA5);
        tx.push(fm);
        assert_eq!(rx.pop(), Some(fm));
        assert_eq!(fm.target.fm_port(), Some(1));
    }

    #[test]
    fn test_full_ring_keeps_capacity_minus_one() {
        let (mut tx, mut rx) = CommandQueue::new(4).unwrap().split();
        for i in 0..3 {
            tx.push(event(i, 0));
        }
        assert_eq!(rx.len(), 3);
        assert_eq!(rx.pop().map(|e| e.host_cycle), Some(0));
        assert_eq!(rx.dropped(), 0);
    }

    #[test]
    fn test_clear() {
        let (mut tx, mut rx) = CommandQueue::new(4).unwrap().split();
        tx.push(event(1, 1));
        tx.push(event(2, 2));
        rx.clear();
        assert!(rx.is_empty());
        tx.push(event(3, 3));
        assert_eq!(rx.pop(), Some(event(3, 3)));
    }
}
