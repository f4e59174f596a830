/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! The address-ordered list of every segment of the heap, allocated or not.
//!
//! Headers are not stored inside the heap's pages: they live in a fixed-size
//! table owned by the list and reference each other through [`BlockHandle`]s,
//! so a bogus pointer handed to `free()` can never be dereferenced as a
//! header. Each segment still pays `header_size` bytes of address space in
//! front of the area given to the user.

use arrayvec::ArrayVec;

use crate::mem::VAddr;

/// Number of headers a heap can hold unless told otherwise.
pub const DEFAULT_MAX_BLOCKS: usize = 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockState {
    /// A free segment, available to a later allocation.
    Hole,

    /// A segment currently owned by a caller of `allocate()`.
    Allocated,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockHandle(u32);

impl BlockHandle {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// The address of the segment's first byte, i.e. of its header.
    pub(super) addr: VAddr,

    /// Total span of the segment including its header. Always greater than
    /// the header size.
    pub(super) length: usize,

    pub(super) state: BlockState,

    /// The segment immediately before in memory, `None` for the first one.
    pub(super) prev: Option<BlockHandle>,

    /// The segment immediately after in memory, `None` for the last one.
    pub(super) next: Option<BlockHandle>,
}

impl BlockHeader {
    #[inline]
    pub fn addr(&self) -> VAddr {
        self.addr
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn state(&self) -> BlockState {
        self.state
    }

    #[inline]
    pub fn is_hole(&self) -> bool {
        matches!(self.state, BlockState::Hole)
    }

    /// The address of the first byte past this segment.
    #[inline]
    pub fn end_addr(&self) -> VAddr {
        self.addr + self.length
    }
}

pub struct BlockList<const N: usize> {
    slots: ArrayVec<Option<BlockHeader>, N>,
    vacant: ArrayVec<BlockHandle, N>,
    head: Option<BlockHandle>,
    tail: Option<BlockHandle>,
    len: usize,
}

impl<const N: usize> BlockList<N> {
    pub const fn new() -> Self {
        Self {
            slots: ArrayVec::new_const(),
            vacant: ArrayVec::new_const(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn head(&self) -> Option<BlockHandle> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<BlockHandle> {
        self.tail
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Whether every header slot is taken, in which case neither a split nor
    /// a growth can create a new segment.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn get(&self, handle: BlockHandle) -> &BlockHeader {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .expect("kheap: stale block handle")
    }

    pub fn get_mut(&mut self, handle: BlockHandle) -> &mut BlockHeader {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .expect("kheap: stale block handle")
    }

    pub fn iter(&self) -> BlockIter<'_, N> {
        BlockIter {
            list: self,
            curr: self.head,
        }
    }

    /// Return the first hole, in address order, spanning at least `length`
    /// bytes (header included).
    pub fn first_fit(&self, length: usize) -> Option<BlockHandle> {
        self.iter()
            .find(|(_, header)| header.is_hole() && header.length >= length)
            .map(|(handle, _)| handle)
    }

    /// Locate the segment containing `addr`.
    ///
    /// # Return #
    ///
    /// The handle of the segment along with whether `addr` is exactly the
    /// segment's header address; `None` if `addr` is not covered by any
    /// segment.
    pub fn locate(&self, addr: VAddr) -> Option<(BlockHandle, bool)> {
        for (handle, header) in self.iter() {
            if header.addr > addr {
                break;
            }
            if addr < header.end_addr() {
                return Some((handle, header.addr == addr));
            }
        }

        None
    }

    /// Append a new segment at the end of the list. The caller guarantees the
    /// segment starts exactly where the current last one ends.
    pub fn push_back(
        &mut self,
        addr: VAddr,
        length: usize,
        state: BlockState,
    ) -> Option<BlockHandle> {
        let handle = self.take_slot(BlockHeader {
            addr,
            length,
            state,
            prev: self.tail,
            next: None,
        })?;

        match self.tail {
            Some(tail) => self.get_mut(tail).next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);

        Some(handle)
    }

    /// Insert a new segment right after `after` in the list.
    pub fn insert_after(
        &mut self,
        after: BlockHandle,
        addr: VAddr,
        length: usize,
        state: BlockState,
    ) -> Option<BlockHandle> {
        let next = self.get(after).next;
        let handle = self.take_slot(BlockHeader {
            addr,
            length,
            state,
            prev: Some(after),
            next,
        })?;

        self.get_mut(after).next = Some(handle);
        match next {
            Some(next) => self.get_mut(next).prev = Some(handle),
            None => self.tail = Some(handle),
        }

        Some(handle)
    }

    /// Unlink a segment from the list and release its slot. Its address range
    /// is not given to any neighbour, that is up to the caller.
    pub fn remove(&mut self, handle: BlockHandle) -> BlockHeader {
        let header = self.slots
            .get_mut(handle.index())
            .and_then(Option::take)
            .expect("kheap: removal of a stale block handle");

        match header.prev {
            Some(prev) => self.get_mut(prev).next = header.next,
            None => self.head = header.next,
        }
        match header.next {
            Some(next) => self.get_mut(next).prev = header.prev,
            None => self.tail = header.prev,
        }

        self.vacant.push(handle);
        self.len -= 1;

        header
    }

    /// Perform sanity check to ensure verifiable invariants are still valid.
    /// This is a valuable, albeit slow, function to call during development and
    /// testing to detect bugs and corruption. This will traverse the list and
    /// check headers and their links for discrepancies: the segments must
    /// cover `[start, end)` without gap nor overlap, no two holes may be
    /// neighbours and every segment must be larger than a bare header. Any
    /// issue detected will lead to a panic.
    pub fn self_check(&self, start: VAddr, header_size: usize) -> VAddr {
        let mut expected_addr = start;
        let mut prev: Option<BlockHandle> = None;
        let mut prev_is_hole = false;
        let mut count = 0;

        for (handle, header) in self.iter() {
            assert_eq!(
                header.addr, expected_addr,
                "block {:?} is not contiguous with its predecessor: {:?}",
                handle, header
            );
            assert_eq!(header.prev, prev, "block {:?} has a broken prev link", handle);
            assert!(
                header.length > header_size,
                "block {:?} is too small: {:?}",
                handle, header
            );
            assert!(
                !(prev_is_hole && header.is_hole()),
                "block {:?} is a hole next to another hole",
                handle
            );

            expected_addr = header.end_addr();
            prev = Some(handle);
            prev_is_hole = header.is_hole();
            count += 1;
        }

        assert_eq!(self.tail, prev, "the list's tail is not its last block");
        assert_eq!(count, self.len, "the list's length is out of sync");
        assert_eq!(
            self.slots.iter().filter(|slot| slot.is_some()).count(),
            self.len,
            "the header table holds unreachable headers"
        );

        expected_addr
    }

    fn take_slot(&mut self, header: BlockHeader) -> Option<BlockHandle> {
        let handle = if let Some(handle) = self.vacant.pop() {
            self.slots[handle.index()] = Some(header);
            handle
        } else {
            let handle = BlockHandle(self.slots.len() as u32);
            self.slots.try_push(Some(header)).ok()?;
            handle
        };

        self.len += 1;
        Some(handle)
    }
}

impl<const N: usize> Default for BlockList<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterates over the segments in address order.
pub struct BlockIter<'a, const N: usize> {
    list: &'a BlockList<N>,
    curr: Option<BlockHandle>,
}

impl<'a, const N: usize> Iterator for BlockIter<'a, N> {
    type Item = (BlockHandle, &'a BlockHeader);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.curr?;
        let header = self.list.get(handle);
        self.curr = header.next;

        Some((handle, header))
    }
}
