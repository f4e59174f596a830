/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use crate::heap::block::{BlockHandle, BlockList};

impl<const N: usize> BlockList<N> {
    /// Merge a freshly freed hole with the holes around it.
    ///
    /// The right neighbour is merged first so that by the time the left one
    /// absorbs `hole`, `hole` already spans everything up to the next
    /// allocated block: a single pass each way is enough.
    ///
    /// # Return #
    ///
    /// The handle of the resulting hole: `hole` itself, or its predecessor if
    /// `hole` was folded into it.
    pub fn unify(&mut self, hole: BlockHandle) -> BlockHandle {
        assert!(self.get(hole).is_hole(), "kheap: unifying an allocated block");

        self.unify_right(hole);
        self.unify_left(hole)
    }

    /// Fold the segment right after `block` into it if that segment is a
    /// hole. Return whether a merge happened.
    pub fn unify_right(&mut self, block: BlockHandle) -> bool {
        let Some(next) = self.get(block).next else {
            return false;
        };
        if !self.get(next).is_hole() {
            return false;
        }

        let absorbed = self.remove(next);
        debug_assert_eq!(self.get(block).end_addr(), absorbed.addr);
        self.get_mut(block).length += absorbed.length;

        true
    }

    /// Fold `block` into the segment right before it if that segment is a
    /// hole, `block`'s header is discarded.
    pub fn unify_left(&mut self, block: BlockHandle) -> BlockHandle {
        let Some(prev) = self.get(block).prev else {
            return block;
        };
        if !self.get(prev).is_hole() {
            return block;
        }

        let absorbed = self.remove(block);
        debug_assert_eq!(self.get(prev).end_addr(), absorbed.addr);
        self.get_mut(prev).length += absorbed.length;

        prev
    }
}
