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
use core::ops::{BitAnd, Not};
use num_integer::Integer;

/// A byte count displayed with a binary unit, for log messages.
pub struct BinSize(pub usize);

impl fmt::Display for BinSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        const KIO: usize = 1024;
        const MIO: usize = 1024 * KIO;

        if self.0 < KIO {
            write!(f, "{} o", self.0)
        } else if self.0 < MIO {
            write!(f, "{:.2} Kio", self.0 as f64 / KIO as f64)
        } else {
            write!(f, "{:.2} Mio", self.0 as f64 / MIO as f64)
        }
    }
}

/// Returns the next integer multiple of `multiple` or `n` if already a
/// multiple of `multiple`. `multiple` must be a power of two.
pub fn align_up<T>(n: T, multiple: T) -> T
    where T: Integer + Not<Output = T> + BitAnd<Output = T> + Copy
{
    (n + (multiple - T::one())) & !(multiple - T::one())
}

/// Same as [`align_up`] but returns `None` instead of overflowing.
pub fn checked_align_up(n: usize, multiple: usize) -> Option<usize> {
    let mask = multiple.checked_sub(1)?;
    Some(n.checked_add(mask)? & !mask)
}

pub fn is_aligned(n: usize, multiple: usize) -> bool {
    Integer::is_multiple_of(&n, &multiple)
}

#[cfg(test)]
mod test {
    use crate::misc::{BinSize, align_up, checked_align_up, is_aligned};

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0usize, 4096), 0);
        assert_eq!(align_up(1usize, 4096), 4096);
        assert_eq!(align_up(4096usize, 4096), 4096);
        assert_eq!(align_up(4097u64, 16), 4112);
    }

    #[test]
    fn test_checked_align_up() {
        assert_eq!(checked_align_up(17, 16), Some(32));
        assert_eq!(checked_align_up(usize::MAX - 2, 16), None);
        assert_eq!(checked_align_up(5, 0), None);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(8192, 4096));
        assert!(!is_aligned(8193, 4096));
    }

    #[test]
    fn test_bin_size() {
        assert_eq!(format!("{}", BinSize(512)), "512 o");
        assert_eq!(format!("{}", BinSize(6144)), "6.00 Kio");
        assert_eq!(format!("{}", BinSize(3 * 1024 * 1024)), "3.00 Mio");
    }
}
