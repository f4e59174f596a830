/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! In-memory frame supplier and page mapper. Nothing here touches real page
//! tables: frames are plain numbers and mappings are entries in a hash map,
//! which makes heap behaviour fully deterministic under test.

use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::mem::backend::{AddressMapper, MapError, PageFrameSupplier};
use crate::mem::{MapFlags, PAddr, VAddr};

pub const FAKE_FRAME_SIZE: u64 = 4096;

/// Physical address of the first fake frame; frames follow contiguously.
pub const FAKE_PHYS_BASE: u64 = 0x10_0000;

pub struct FakeFrameSupplier {
    allocated: Vec<bool>,
}

impl FakeFrameSupplier {
    pub fn new(nr_frames: usize) -> Self {
        Self {
            allocated: vec![false; nr_frames],
        }
    }

    pub fn nr_allocated(&self) -> usize {
        self.allocated.iter().filter(|&&a| a).count()
    }

    pub fn nr_free(&self) -> usize {
        self.allocated.len() - self.nr_allocated()
    }

    fn index_from_paddr(frame: PAddr) -> usize {
        ((frame.0 - FAKE_PHYS_BASE) / FAKE_FRAME_SIZE) as usize
    }
}

impl PageFrameSupplier for FakeFrameSupplier {
    fn alloc_page(&mut self) -> Option<PAddr> {
        let index = self.allocated.iter().position(|&a| !a)?;
        self.allocated[index] = true;

        Some(PAddr(FAKE_PHYS_BASE + index as u64 * FAKE_FRAME_SIZE))
    }

    fn free_page(&mut self, frame: PAddr) {
        let index = Self::index_from_paddr(frame);

        match self.allocated.get_mut(index) {
            Some(allocated) if *allocated => *allocated = false,
            Some(_) => panic!("trying to free unallocated frame {frame:?}"),
            None => panic!("free of out of bound frame {frame:?}"),
        }
    }
}

#[derive(Default)]
pub struct FakeMapper {
    mappings: HashMap<VAddr, (PAddr, MapFlags)>,
    max_mappings: Option<usize>,
    failing_unmap: Option<usize>,
    nr_map_calls: usize,
    nr_unmap_calls: usize,
}

impl FakeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mapper that refuses, with `MapError::NoTableMemory`, any mapping
    /// that would bring the number of live mappings above `max_mappings`.
    pub fn with_limit(max_mappings: usize) -> Self {
        Self {
            max_mappings: Some(max_mappings),
            ..Self::default()
        }
    }

    /// Make the `nth` call to `unmap()` (counting from zero) fail with
    /// `MapError::NoTableMemory`, leaving the mapping in place.
    pub fn failing_unmap(mut self, nth: usize) -> Self {
        self.failing_unmap = Some(nth);
        self
    }

    pub fn nr_mapped(&self) -> usize {
        self.mappings.len()
    }

    pub fn nr_map_calls(&self) -> usize {
        self.nr_map_calls
    }

    pub fn nr_unmap_calls(&self) -> usize {
        self.nr_unmap_calls
    }

    pub fn flags(&self, vaddr: VAddr) -> Option<MapFlags> {
        self.mappings.get(&vaddr).map(|&(_, flags)| flags)
    }

    pub fn is_mapped(&self, vaddr: VAddr) -> bool {
        self.mappings.contains_key(&vaddr)
    }
}

impl AddressMapper for FakeMapper {
    fn map(
        &mut self,
        vaddr: VAddr,
        frame: PAddr,
        flags: MapFlags,
    ) -> Result<(), MapError> {
        assert_eq!(vaddr.0 % FAKE_FRAME_SIZE as usize, 0,
                   "mapping of unaligned page {vaddr:?}");
        self.nr_map_calls += 1;

        if self.mappings.contains_key(&vaddr) {
            return Err(MapError::AlreadyMapped(vaddr));
        }
        if let Some(max) = self.max_mappings {
            if self.mappings.len() >= max {
                return Err(MapError::NoTableMemory);
            }
        }

        self.mappings.insert(vaddr, (frame, flags));
        Ok(())
    }

    fn unmap(&mut self, vaddr: VAddr) -> Result<(), MapError> {
        let call = self.nr_unmap_calls;
        self.nr_unmap_calls += 1;

        if self.failing_unmap == Some(call) {
            return Err(MapError::NoTableMemory);
        }

        self.mappings
            .remove(&vaddr)
            .map(|_| ())
            .ok_or(MapError::NotMapped(vaddr))
    }

    fn get_mapping(&self, vaddr: VAddr) -> Option<PAddr> {
        self.mappings.get(&vaddr).map(|&(frame, _)| frame)
    }
}
