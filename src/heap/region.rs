/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! The virtual address range backing the heap, `[start, max)`, which is
//! always entirely mapped. It grows and shrinks at its end only, one page at
//! a time.

use thiserror_no_std::Error;

use crate::heap::config::HeapConfig;
use crate::mem::backend::{AddressMapper, MapError, PageFrameSupplier};
use crate::mem::{MapFlags, VAddr};
use crate::misc::{BinSize, align_up, checked_align_up};
use crate::{debug, error, warning};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowError {
    #[error("growing would cross the limit at {limit:?}")]
    LimitReached { limit: VAddr },

    #[error("no physical frame available")]
    OutOfFrames,

    #[error("couldn't map a heap page: {0}")]
    MapFailed(#[source] MapError),
}

pub struct HeapRegion {
    start: VAddr,
    max: VAddr,
    ceiling: Option<VAddr>,
    page_size: usize,
    nr_pages_mapped: usize,
    nr_pages_released: usize,

    /// The last release stopped at a page the mapper refused to unmap.
    stuck: bool,
}

impl HeapRegion {
    pub fn new(config: &HeapConfig) -> Self {
        Self {
            start: config.start(),
            max: config.start(),
            ceiling: config.ceiling(),
            page_size: config.page_size(),
            nr_pages_mapped: 0,
            nr_pages_released: 0,
            stuck: false,
        }
    }

    #[inline]
    pub fn start(&self) -> VAddr {
        self.start
    }

    /// The first address past the mapped range.
    #[inline]
    pub fn max(&self) -> VAddr {
        self.max
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn mapped_bytes(&self) -> usize {
        self.max.offset_from(self.start)
    }

    /// Total number of pages mapped, and released, since creation.
    #[inline]
    pub fn page_counters(&self) -> (usize, usize) {
        (self.nr_pages_mapped, self.nr_pages_released)
    }

    /// Whether the last attempt to release pages left some mapped past the
    /// heap's last segment because the mapper refused to unmap them. They are
    /// retried on the next retraction.
    #[inline]
    pub fn has_stuck_page(&self) -> bool {
        self.stuck
    }

    /// The highest value `max` may ever take: the configured ceiling, or
    /// the last page boundary of the address space.
    pub fn limit(&self) -> VAddr {
        self.ceiling
            .unwrap_or(VAddr(usize::MAX & !(self.page_size - 1)))
    }

    /// Extend the mapped range until it covers every address below `end`.
    ///
    /// Nothing is done if `end` is already covered. Pages are requested from
    /// `supplier` one by one and mapped read/write at the current end of the
    /// range. No more pages than necessary are mapped.
    ///
    /// # Errors #
    ///
    /// `LimitReached` is returned without mapping anything if `end` lies past
    /// the ceiling. If a frame cannot be obtained or mapped midway, every page
    /// mapped by this call is unmapped and given back before returning, `max`
    /// is left as it was unless one of those pages cannot be unmapped.
    pub fn ensure<S, M>(
        &mut self,
        end: VAddr,
        supplier: &mut S,
        mapper: &mut M,
    ) -> Result<(), GrowError>
    where
        S: PageFrameSupplier + ?Sized,
        M: AddressMapper + ?Sized,
    {
        if end <= self.max {
            return Ok(());
        }

        let limit = self.limit();
        let new_max = checked_align_up(end.offset_from(self.start), self.page_size)
            .and_then(|len| self.start.checked_add(len))
            .filter(|&new_max| new_max <= limit)
            .ok_or(GrowError::LimitReached { limit })?;

        let initial_max = self.max;

        while end > self.max {
            if let Err(err) = self.map_one_page(supplier, mapper) {
                warning!(
                    "heap growth to {:?} failed at {:?} ({}), rolling back",
                    new_max, self.max, err
                );
                self.release_down_to(initial_max, supplier, mapper);
                return Err(err);
            }
        }

        debug!(
            "heap grown from {:?} to {:?} ({} mapped)",
            initial_max, self.max, BinSize(self.mapped_bytes())
        );

        Ok(())
    }

    /// Unmap every trailing page lying entirely at or above `addr`, giving
    /// their frames back to `supplier`. The page containing `addr`, if `addr`
    /// is not page-aligned, stays mapped.
    ///
    /// Retraction stops at the first page the mapper fails to unmap: that page
    /// and the ones below it stay part of the region so that a later growth
    /// never tries to map over them.
    pub fn retract<S, M>(&mut self, addr: VAddr, supplier: &mut S, mapper: &mut M)
    where
        S: PageFrameSupplier + ?Sized,
        M: AddressMapper + ?Sized,
    {
        let floor = if addr <= self.start {
            self.start
        } else {
            self.start + align_up(addr.offset_from(self.start), self.page_size)
        };

        if floor >= self.max {
            self.stuck = false;
            return;
        }

        let initial_max = self.max;
        self.release_down_to(floor, supplier, mapper);
        self.stuck = self.max > floor;

        debug!(
            "heap retracted from {:?} to {:?} ({} mapped)",
            initial_max, self.max, BinSize(self.mapped_bytes())
        );
    }

    fn map_one_page<S, M>(
        &mut self,
        supplier: &mut S,
        mapper: &mut M,
    ) -> Result<(), GrowError>
    where
        S: PageFrameSupplier + ?Sized,
        M: AddressMapper + ?Sized,
    {
        let frame = supplier.alloc_page().ok_or(GrowError::OutOfFrames)?;

        if let Err(err) = mapper.map(self.max, frame, MapFlags::HEAP) {
            supplier.free_page(frame);
            return Err(GrowError::MapFailed(err));
        }

        self.max += self.page_size;
        self.nr_pages_mapped += 1;

        Ok(())
    }

    fn release_down_to<S, M>(
        &mut self,
        floor: VAddr,
        supplier: &mut S,
        mapper: &mut M,
    ) where
        S: PageFrameSupplier + ?Sized,
        M: AddressMapper + ?Sized,
    {
        while self.max > floor {
            let page = self.max - self.page_size;

            match mapper.get_mapping(page) {
                Some(frame) => {
                    if let Err(err) = mapper.unmap(page) {
                        error!(
                            "couldn't unmap heap page {:?}: {}, keeping it",
                            page, err
                        );
                        self.stuck = true;
                        return;
                    }
                    supplier.free_page(frame);
                }
                None => error!("heap page {:?} was not mapped", page),
            }

            self.max = page;
            self.nr_pages_released += 1;
        }
    }
}
