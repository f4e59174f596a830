/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use core::fmt;
use core::fmt::Formatter;

use crate::misc::BinSize;

/// A snapshot of the heap's occupation.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes currently backed by mapped pages.
    pub mapped_bytes: usize,

    pub nr_allocated: usize,
    pub nr_holes: usize,

    /// Bytes spanned by allocated blocks, headers included.
    pub allocated_bytes: usize,

    /// Bytes spanned by holes, headers included.
    pub free_bytes: usize,

    pub largest_hole: usize,

    /// Address space taken by headers.
    pub header_bytes: usize,

    pub nr_alloc_calls: usize,
    pub nr_free_calls: usize,
    pub nr_failed_calls: usize,

    pub nr_pages_mapped: usize,
    pub nr_pages_released: usize,
}

impl HeapStats {
    #[inline]
    pub fn nr_blocks(&self) -> usize {
        self.nr_allocated + self.nr_holes
    }

    /// Mapped bytes past the last segment: what is left of the last page.
    #[inline]
    pub fn tail_slack(&self) -> usize {
        self.mapped_bytes - self.allocated_bytes - self.free_bytes
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mapped, {} in {} blocks, {} in {} holes (largest {})",
            BinSize(self.mapped_bytes),
            BinSize(self.allocated_bytes),
            self.nr_allocated,
            BinSize(self.free_bytes),
            self.nr_holes,
            BinSize(self.largest_hole),
        )
    }
}
