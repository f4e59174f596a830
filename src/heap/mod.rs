/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

pub mod block;
pub mod config;
pub mod locked;
pub mod region;
mod split;
pub mod stats;
mod unify;

pub use crate::heap::block::{BlockState, DEFAULT_MAX_BLOCKS};

use crate::error::{HeapError, InvalidFreeReason};
use crate::heap::block::{BlockHandle, BlockList};
use crate::heap::config::HeapConfig;
use crate::heap::region::{GrowError, HeapRegion};
use crate::heap::stats::HeapStats;
use crate::mem::VAddr;
use crate::mem::backend::{AddressMapper, PageFrameSupplier};
use crate::misc::{BinSize, is_aligned};
use crate::{debug, notice, warning};

/// A segment of the heap as seen from the outside.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Address of the segment's header.
    pub addr: VAddr,

    /// Span of the segment, header included.
    pub length: usize,

    pub state: BlockState,
}

/// A first-fit heap over `[start, max)`.
///
/// The range is split into segments, each one either allocated or a hole,
/// kept in address order. An allocation takes the first hole large enough,
/// cutting it if what remains can still be used; when no hole fits, the heap
/// is extended by mapping new pages past its end. A freed block is merged
/// with the holes around it and, if it ends up last, the pages it spans are
/// given back.
///
/// `Heap` is not reentrant: all calls must be serialized by the caller, see
/// [`LockedHeap`](crate::heap::locked::LockedHeap).
pub struct Heap<S, M, const N: usize = DEFAULT_MAX_BLOCKS> {
    config: HeapConfig,
    region: HeapRegion,
    blocks: BlockList<N>,
    supplier: S,
    mapper: M,
    nr_alloc_calls: usize,
    nr_free_calls: usize,
    nr_failed_calls: usize,
}

impl<S, M, const N: usize> Heap<S, M, N>
where
    S: PageFrameSupplier,
    M: AddressMapper,
{
    /// Create an empty heap: nothing is mapped until the first allocation.
    pub fn new(config: HeapConfig, supplier: S, mapper: M) -> Self {
        notice!(
            "kernel heap at {:?}, limit {:?}, {} headers",
            config.start(), config.ceiling(), N
        );

        Self {
            region: HeapRegion::new(&config),
            config,
            blocks: BlockList::new(),
            supplier,
            mapper,
            nr_alloc_calls: 0,
            nr_free_calls: 0,
            nr_failed_calls: 0,
        }
    }

    /// Allocate `size` bytes.
    ///
    /// # Return #
    ///
    /// The address of the first usable byte, right past the block's header.
    /// The `size` bytes starting there are mapped and belong to the caller
    /// until given to `free()`.
    ///
    /// # Errors #
    ///
    /// * `ZeroSizeRequest` if `size` is zero;
    /// * `HeapExhausted` if the heap would have to grow past its ceiling;
    /// * `OutOfMemory` if pages could not be obtained or mapped;
    /// * `BlockTableFull` if no header is left to describe a new segment.
    ///
    /// The heap is left unchanged on error.
    pub fn allocate(&mut self, size: usize) -> Result<VAddr, HeapError> {
        self.nr_alloc_calls += 1;

        let result = self.do_allocate(size);
        if result.is_err() {
            self.nr_failed_calls += 1;
        }

        result
    }

    /// Give back a block obtained through `allocate()`.
    ///
    /// # Errors #
    ///
    /// `InvalidFree` if `ptr` is not the address of a currently allocated
    /// block; the heap is left unchanged in that case.
    pub fn free(&mut self, ptr: VAddr) -> Result<(), HeapError> {
        self.nr_free_calls += 1;

        let block = match self.find_header(ptr) {
            Ok(block) => block,
            Err(reason) => {
                self.nr_failed_calls += 1;
                warning!("kheap: free(): invalid address {:?}: {}", ptr, reason);
                return Err(HeapError::InvalidFree { addr: ptr, reason });
            }
        };

        self.blocks.get_mut(block).state = BlockState::Hole;
        let hole = self.blocks.unify(block);

        if self.blocks.get(hole).next.is_none() {
            let addr = self.blocks.get(hole).addr;
            self.region.retract(addr, &mut self.supplier, &mut self.mapper);
            self.blocks.remove(hole);
        }

        Ok(())
    }

    /// Return the header of the block whose user area starts at `ptr`,
    /// whatever its state.
    pub fn header_of(&self, ptr: VAddr) -> Option<BlockInfo> {
        let addr = ptr.checked_sub(self.config.header_size())?;

        match self.blocks.locate(addr)? {
            (handle, true) => Some(Self::info(self.blocks.get(handle))),
            (_, false) => None,
        }
    }

    /// Iterate over all segments in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.blocks.iter().map(|(_, header)| Self::info(header))
    }

    pub fn count_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[inline]
    pub fn start(&self) -> VAddr {
        self.region.start()
    }

    /// The first address past the mapped part of the heap.
    #[inline]
    pub fn max(&self) -> VAddr {
        self.region.max()
    }

    pub fn supplier(&self) -> &S {
        &self.supplier
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn stats(&self) -> HeapStats {
        let (nr_pages_mapped, nr_pages_released) = self.region.page_counters();
        let mut stats = HeapStats {
            mapped_bytes: self.region.mapped_bytes(),
            header_bytes: self.blocks.len() * self.config.header_size(),
            nr_alloc_calls: self.nr_alloc_calls,
            nr_free_calls: self.nr_free_calls,
            nr_failed_calls: self.nr_failed_calls,
            nr_pages_mapped,
            nr_pages_released,
            ..HeapStats::default()
        };

        for (_, header) in self.blocks.iter() {
            if header.is_hole() {
                stats.nr_holes += 1;
                stats.free_bytes += header.length;
                stats.largest_hole = stats.largest_hole.max(header.length);
            } else {
                stats.nr_allocated += 1;
                stats.allocated_bytes += header.length;
            }
        }

        stats
    }

    /// Check every invariant of the heap, panicking on the first violation:
    /// the segments partition `[start, end)` without overlap, gap or adjacent
    /// holes; the heap never ends with a hole; and `max` is the first page
    /// boundary at or past `end`, unless pages the mapper refused to unmap
    /// are still held past it.
    pub fn self_check(&self) {
        let start = self.region.start();
        let max = self.region.max();
        let page_size = self.region.page_size();
        let end = self.blocks.self_check(start, self.config.header_size());

        let stuck = self.region.has_stuck_page();

        assert!(end <= max, "segments end at {:?}, past the heap's max {:?}", end, max);
        assert!(
            stuck || max.offset_from(end) < page_size,
            "unused pages are still mapped: last segment ends at {:?}, max is {:?}",
            end, max
        );
        assert!(
            is_aligned(max.offset_from(start), page_size),
            "the heap's max {:?} is not on a page boundary", max
        );

        if let Some(tail) = self.blocks.tail() {
            assert!(!self.blocks.get(tail).is_hole(), "the heap ends with a hole");
        } else {
            assert!(stuck || max == start, "an empty heap still has pages mapped");
        }
    }

    pub fn debug_print_blocks(&self) {
        debug!("heap {:?} -> {:?}: {}", self.start(), self.max(), self.stats());

        for (handle, header) in self.blocks.iter() {
            debug!(
                "{}  {:?}  {:>8}  {:?}  prev={:?}  next={:?}",
                if header.is_hole() { "FREE" } else { "USED" },
                header.addr,
                BinSize(header.length),
                handle,
                header.prev,
                header.next
            );
        }
    }

    fn do_allocate(&mut self, size: usize) -> Result<VAddr, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSizeRequest);
        }

        let header_size = self.config.header_size();
        let required = size
            .checked_add(header_size)
            .ok_or(HeapError::HeapExhausted {
                requested: size,
                ceiling: self.region.limit(),
            })?;

        let block = match self.blocks.first_fit(required) {
            Some(hole) => {
                self.blocks.split(hole, required, header_size);
                hole
            }
            None => self.grow(size, required)?,
        };

        let header = self.blocks.get_mut(block);
        header.state = BlockState::Allocated;

        Ok(header.addr + header_size)
    }

    /// Append a new allocated block of `required` bytes at the end of the
    /// heap, mapping pages as needed.
    fn grow(
        &mut self,
        size: usize,
        required: usize,
    ) -> Result<BlockHandle, HeapError> {
        if self.blocks.is_full() {
            warning!("kheap: all {} block headers are in use", N);
            return Err(HeapError::BlockTableFull { capacity: N });
        }

        let chunk_start = match self.blocks.tail() {
            Some(tail) => self.blocks.get(tail).end_addr(),
            None => self.region.start(),
        };
        let end = chunk_start
            .checked_add(required)
            .ok_or(HeapError::HeapExhausted {
                requested: size,
                ceiling: self.region.limit(),
            })?;

        self.region
            .ensure(end, &mut self.supplier, &mut self.mapper)
            .map_err(|err| match err {
                GrowError::LimitReached { limit } => HeapError::HeapExhausted {
                    requested: size,
                    ceiling: limit,
                },
                GrowError::OutOfFrames | GrowError::MapFailed(_) => {
                    HeapError::OutOfMemory { requested: size }
                }
            })?;

        self.blocks
            .push_back(chunk_start, required, BlockState::Allocated)
            .ok_or(HeapError::BlockTableFull { capacity: N })
    }

    /// Recover the header of an allocated block from the address handed to
    /// the user, refusing anything that is not exactly such an address.
    fn find_header(&self, ptr: VAddr) -> Result<BlockHandle, InvalidFreeReason> {
        let addr = ptr
            .checked_sub(self.config.header_size())
            .filter(|&addr| addr >= self.region.start() && addr < self.region.max())
            .ok_or(InvalidFreeReason::OutOfRange)?;

        match self.blocks.locate(addr) {
            Some((handle, _)) if self.blocks.get(handle).is_hole() => {
                Err(InvalidFreeReason::AlreadyFree)
            }
            Some((handle, true)) => Ok(handle),
            _ => Err(InvalidFreeReason::NotABlock),
        }
    }

    fn info(header: &block::BlockHeader) -> BlockInfo {
        BlockInfo {
            addr: header.addr(),
            length: header.length(),
            state: header.state(),
        }
    }
}
