/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use core::fmt::{self, Debug, Formatter};
use core::ops::{Add, AddAssign, Sub, SubAssign};

pub mod backend;
#[cfg(any(test, feature = "testing"))]
pub mod fake;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct PAddr(pub u64);

impl Debug for PAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PA {:#016x}", self.0)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VAddr(pub usize);

impl VAddr {
    #[inline]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as _
    }

    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as _
    }

    #[inline]
    pub fn checked_add(self, rhs: usize) -> Option<VAddr> {
        self.0.checked_add(rhs).map(VAddr)
    }

    #[inline]
    pub fn checked_sub(self, rhs: usize) -> Option<VAddr> {
        self.0.checked_sub(rhs).map(VAddr)
    }

    /// Number of bytes from `origin` up to `self`; `origin` must not be
    /// above `self`.
    #[inline]
    pub fn offset_from(self, origin: VAddr) -> usize {
        self.0 - origin.0
    }
}

impl<T> From<*const T> for VAddr {
    fn from(ptr: *const T) -> Self {
        Self(ptr as usize)
    }
}

impl<T> From<*mut T> for VAddr {
    fn from(ptr: *mut T) -> Self {
        Self(ptr as usize)
    }
}

impl Add<usize> for VAddr {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<usize> for VAddr {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl Sub<usize> for VAddr {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl SubAssign<usize> for VAddr {
    fn sub_assign(&mut self, rhs: usize) {
        self.0 -= rhs;
    }
}

impl Debug for VAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "VA {:#016x}", self.0)
    }
}

bitflags::bitflags! {
    /// Permissions requested when mapping a heap page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        const PRESENT     = 1 << 0;
        const WRITABLE    = 1 << 1;
        const EXECUTABLE  = 1 << 2;
        const USER        = 1 << 3;
    }
}

impl MapFlags {
    /// Flags of every page backing the heap: read/write, never executable.
    pub const HEAP: MapFlags = MapFlags::PRESENT.union(MapFlags::WRITABLE);
}
