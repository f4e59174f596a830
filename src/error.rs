/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use thiserror_no_std::Error;

use crate::mem::VAddr;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// No physical frame could be obtained, or the mapper refused to map it.
    #[error("out of memory while growing the heap for a {requested}-byte request")]
    OutOfMemory { requested: usize },

    /// Growing the heap would cross its configured ceiling.
    #[error("heap exhausted: a {requested}-byte request would cross the ceiling at {ceiling:?}")]
    HeapExhausted { requested: usize, ceiling: VAddr },

    #[error("invalid free of {addr:?}: {reason}")]
    InvalidFree { addr: VAddr, reason: InvalidFreeReason },

    #[error("zero-sized allocation request")]
    ZeroSizeRequest,

    /// Every slot of the block header table is in use.
    #[error("block header table is full ({capacity} headers)")]
    BlockTableFull { capacity: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFreeReason {
    #[error("address is outside of the heap")]
    OutOfRange,

    #[error("address was not returned by the allocator")]
    NotABlock,

    #[error("double free")]
    AlreadyFree,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page size {0} is not a power of two")]
    PageSizeNotPowerOfTwo(usize),

    #[error("block header size must be non-zero")]
    ZeroHeaderSize,

    #[error("block header size {header_size} does not fit in a {page_size}-byte page")]
    HeaderLargerThanPage { header_size: usize, page_size: usize },

    #[error("heap start {0:?} is not page-aligned")]
    UnalignedStart(VAddr),

    #[error("heap ceiling {ceiling:?} is below heap start {start:?}")]
    CeilingBelowStart { start: VAddr, ceiling: VAddr },

    #[error("heap ceiling {0:?} is not page-aligned")]
    UnalignedCeiling(VAddr),
}
