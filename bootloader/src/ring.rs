// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// What `push` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Discard the new byte and count it.
    DropNewest,
    /// Hand the byte back to the caller.
    Reject,
}

/// Single producer, single consumer byte queue.
///
/// The UART receive interrupt is the producer and the download session is the
/// consumer. `head` is only written by the consumer and `tail` only by the
/// producer. Both count bytes since creation and wrap around.
pub struct ByteQueue<const N: usize> {
    head: AtomicUsize,
    tail: AtomicUsize,
    dropped: AtomicUsize,
    buf: UnsafeCell<[u8; N]>,
}

impl<const N: usize> ByteQueue<N> {
    pub const fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            buf: UnsafeCell::new([0; N]),
        }
    }

    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    /// Number of bytes discarded by [`Overflow::DropNewest`].
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Producer side.
    pub fn push(&self, byte: u8, overflow: Overflow) -> Result<(), u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail.wrapping_sub(self.head.load(Ordering::Acquire)) >= N {
            return match overflow {
                Overflow::DropNewest => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Overflow::Reject => Err(byte),
            };
        }
        // SAFETY: only the producer writes the slot at `tail`, and the
        // consumer does not read it before `tail` is published below.
        unsafe { self.slot(tail).write(byte) };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer side.
    pub fn pop(&self) -> Option<u8> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the slot at `head` was published by the producer and is not
        // reused before `head` moves past it.
        let byte = unsafe { self.slot(head).read() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(byte)
    }

    fn slot(&self, index: usize) -> *mut u8 {
        // In bounds, `index % N < N`.
        self.buf.get().cast::<u8>().wrapping_add(index % N)
    }

    /// Consumer side. Discard everything received so far.
    pub fn clear(&self) {
        let tail = self.tail.load(Ordering::Acquire);
        self.head.store(tail, Ordering::Release);
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: SPSC only, one producer context and one consumer context.
unsafe impl<const N: usize> Sync for ByteQueue<N> {}
