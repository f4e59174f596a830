/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use crate::error::ConfigError;
use crate::mem::VAddr;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_HEADER_SIZE: usize = 16;

/// The fixed parameters of a heap, chosen once by whoever sets it up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    start: VAddr,
    ceiling: Option<VAddr>,
    page_size: usize,
    header_size: usize,
}

impl HeapConfig {
    pub fn builder(start: VAddr) -> HeapConfigBuilder {
        HeapConfigBuilder {
            start,
            ceiling: None,
            max_size: None,
            page_size: DEFAULT_PAGE_SIZE,
            header_size: DEFAULT_HEADER_SIZE,
        }
    }

    /// The address of the heap's first byte, where the first block header
    /// will sit.
    #[inline]
    pub fn start(&self) -> VAddr {
        self.start
    }

    /// The address the heap may never grow past, `None` for no limit other
    /// than the end of the address space.
    #[inline]
    pub fn ceiling(&self) -> Option<VAddr> {
        self.ceiling
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The number of bytes every block reserves in front of the user's area.
    #[inline]
    pub fn header_size(&self) -> usize {
        self.header_size
    }
}

pub struct HeapConfigBuilder {
    start: VAddr,
    ceiling: Option<VAddr>,
    max_size: Option<usize>,
    page_size: usize,
    header_size: usize,
}

impl HeapConfigBuilder {
    pub fn ceiling(&mut self, ceiling: VAddr) -> &mut Self {
        self.ceiling = Some(ceiling);
        self.max_size = None;
        self
    }

    /// Convenience for `ceiling(start + max_bytes)`. A size reaching past the
    /// end of the address space is clamped to its last page boundary.
    pub fn max_size(&mut self, max_bytes: usize) -> &mut Self {
        self.max_size = Some(max_bytes);
        self.ceiling = None;
        self
    }

    pub fn page_size(&mut self, page_size: usize) -> &mut Self {
        self.page_size = page_size;
        self
    }

    pub fn header_size(&mut self, header_size: usize) -> &mut Self {
        self.header_size = header_size;
        self
    }

    /// Validate the parameters and produce the configuration.
    ///
    /// # Errors #
    ///
    /// The page size must be a power of two and able to host at least one
    /// header plus one byte; the start and the ceiling must be page-aligned
    /// and the ceiling cannot sit below the start.
    pub fn build(&self) -> Result<HeapConfig, ConfigError> {
        if !self.page_size.is_power_of_two() {
            return Err(ConfigError::PageSizeNotPowerOfTwo(self.page_size));
        }
        if self.header_size == 0 {
            return Err(ConfigError::ZeroHeaderSize);
        }
        if self.header_size >= self.page_size {
            return Err(ConfigError::HeaderLargerThanPage {
                header_size: self.header_size,
                page_size: self.page_size,
            });
        }
        if self.start.0 & (self.page_size - 1) != 0 {
            return Err(ConfigError::UnalignedStart(self.start));
        }

        let ceiling = match self.max_size {
            Some(max_bytes) => Some(
                self.start
                    .checked_add(max_bytes)
                    .unwrap_or(VAddr(usize::MAX & !(self.page_size - 1)))
            ),
            None => self.ceiling,
        };

        if let Some(ceiling) = ceiling {
            if ceiling < self.start {
                return Err(ConfigError::CeilingBelowStart {
                    start: self.start,
                    ceiling,
                });
            }
            if ceiling.0 & (self.page_size - 1) != 0 {
                return Err(ConfigError::UnalignedCeiling(ceiling));
            }
        }

        Ok(HeapConfig {
            start: self.start,
            ceiling,
            page_size: self.page_size,
            header_size: self.header_size,
        })
    }
}
