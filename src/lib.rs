/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

//! Nucloid's kernel heap: a first-fit allocator over a single contiguous
//! virtual address range that grows and shrinks one page at a time.
//!
//! The heap does not know how to obtain physical memory nor how to touch
//! page tables: both are injected through the [`PageFrameSupplier`] and
//! [`AddressMapper`] traits. A [`Heap`] is not reentrant; wrap it in a
//! [`LockedHeap`] when more than one execution context may use it.

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

pub mod error;
pub mod heap;
pub mod logging;
pub mod mem;
pub mod misc;
pub mod sync;

pub use crate::error::{ConfigError, HeapError, InvalidFreeReason};
pub use crate::heap::config::{HeapConfig, HeapConfigBuilder};
pub use crate::heap::locked::LockedHeap;
pub use crate::heap::stats::HeapStats;
pub use crate::heap::{BlockState, Heap};
pub use crate::mem::backend::{AddressMapper, MapError, PageFrameSupplier};
pub use crate::mem::{MapFlags, PAddr, VAddr};
