/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! The heap's view of the rest of the memory manager. The heap never touches
//! page tables or the frame allocator directly: it is handed a supplier of
//! physical frames and a mapper able to bind those frames to virtual pages.

use thiserror_no_std::Error;

use crate::mem::{MapFlags, PAddr, VAddr};

/// A source of physical frames, one page at a time.
pub trait PageFrameSupplier {
    /// Allocate a single free frame from general purpose RAM.
    ///
    /// # Return #
    ///
    /// The physical address of the frame's first byte, `None` if physical
    /// memory is exhausted.
    fn alloc_page(&mut self) -> Option<PAddr>;

    /// Give back a frame previously returned by `alloc_page()`. The caller
    /// guarantees the frame is no longer mapped anywhere.
    fn free_page(&mut self, frame: PAddr);
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("page {0:?} is already mapped")]
    AlreadyMapped(VAddr),

    #[error("page {0:?} is not mapped")]
    NotMapped(VAddr),

    /// The mapper needed memory of its own (e.g. an intermediate page table)
    /// and could not get it.
    #[error("no memory left for page tables")]
    NoTableMemory,
}

/// Binds virtual pages to physical frames in the address space the heap
/// lives in. All addresses given to the mapper are page-aligned.
pub trait AddressMapper {
    /// Create a mapping of the page at `vaddr` onto `frame` with the given
    /// permissions.
    fn map(
        &mut self,
        vaddr: VAddr,
        frame: PAddr,
        flags: MapFlags,
    ) -> Result<(), MapError>;

    /// Remove the mapping of the page at `vaddr`. The frame it pointed to is
    /// not released, that is up to the caller.
    fn unmap(&mut self, vaddr: VAddr) -> Result<(), MapError>;

    /// Return the frame the page at `vaddr` is currently mapped onto, `None`
    /// if it is not mapped.
    fn get_mapping(&self, vaddr: VAddr) -> Option<PAddr>;
}

impl<S: PageFrameSupplier + ?Sized> PageFrameSupplier for &mut S {
    fn alloc_page(&mut self) -> Option<PAddr> {
        (**self).alloc_page()
    }

    fn free_page(&mut self, frame: PAddr) {
        (**self).free_page(frame)
    }
}

impl<M: AddressMapper + ?Sized> AddressMapper for &mut M {
    fn map(
        &mut self,
        vaddr: VAddr,
        frame: PAddr,
        flags: MapFlags,
    ) -> Result<(), MapError> {
        (**self).map(vaddr, frame, flags)
    }

    fn unmap(&mut self, vaddr: VAddr) -> Result<(), MapError> {
        (**self).unmap(vaddr)
    }

    fn get_mapping(&self, vaddr: VAddr) -> Option<PAddr> {
        (**self).get_mapping(vaddr)
    }
}
