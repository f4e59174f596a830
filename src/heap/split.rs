/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use crate::debug;
use crate::heap::block::{BlockHandle, BlockList, BlockState};

impl<const N: usize> BlockList<N> {
    /// Cut the hole `hole` so that it spans exactly `length` bytes, turning
    /// what remains past it into a new hole.
    ///
    /// The hole is left untouched when the remainder could not host a header
    /// plus at least one byte: that slack is simply handed out along with the
    /// allocation. It is also left untouched if the header table is full.
    ///
    /// # Return #
    ///
    /// The handle of the residual hole, `None` if no split happened.
    pub fn split(
        &mut self,
        hole: BlockHandle,
        length: usize,
        header_size: usize,
    ) -> Option<BlockHandle> {
        let header = self.get(hole);
        assert!(header.is_hole(), "kheap: splitting an allocated block");
        assert!(
            length <= header.length,
            "the requested size exceeds the available space"
        );

        let residual = header.length - length;
        if residual <= header_size {
            return None;
        }

        let residual_addr = header.addr + length;
        let Some(right) =
            self.insert_after(hole, residual_addr, residual, BlockState::Hole)
        else {
            debug!("header table full, not splitting {residual} bytes off");
            return None;
        };

        self.get_mut(hole).length = length;

        Some(right)
    }
}

#[cfg(test)]
mod tests {
    use crate::heap::block::{BlockList, BlockState};
    use crate::mem::VAddr;

    const HSZ: usize = 16;
    const START: VAddr = VAddr(0x4000_0000);

    #[test]
    fn it_leaves_an_exact_residual() {
        let mut list: BlockList<4> = BlockList::new();
        let hole = list.push_back(START, 256, BlockState::Hole).unwrap();

        let right = list.split(hole, 8 + HSZ, HSZ).unwrap();
        assert_eq!(list.get(hole).length(), 8 + HSZ);
        assert_eq!(list.get(right).addr(), START + 8 + HSZ);
        assert_eq!(list.get(right).length(), 256 - (8 + HSZ));
        assert_eq!(list.tail(), Some(right));

        list.get_mut(hole).state = BlockState::Allocated;
        list.self_check(START, HSZ);
    }

    #[test]
    fn it_splits_at_the_smallest_viable_residual() {
        let mut list: BlockList<4> = BlockList::new();
        let hole = list.push_back(START, 8 + HSZ + HSZ + 1, BlockState::Hole)
            .unwrap();

        let right = list.split(hole, 8 + HSZ, HSZ).unwrap();
        assert_eq!(list.get(right).length(), HSZ + 1);
    }

    #[test]
    fn it_absorbs_small_slack() {
        let mut list: BlockList<4> = BlockList::new();
        let hole = list.push_back(START, 8 + HSZ + HSZ, BlockState::Hole)
            .unwrap();

        assert!(list.split(hole, 8 + HSZ, HSZ).is_none());
        assert_eq!(list.get(hole).length(), 8 + HSZ + HSZ);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn it_does_not_split_when_the_table_is_full() {
        let mut list: BlockList<1> = BlockList::new();
        let hole = list.push_back(START, 4096, BlockState::Hole).unwrap();

        assert!(list.split(hole, 64, HSZ).is_none());
        assert_eq!(list.get(hole).length(), 4096);
    }

    #[test]
    fn it_relinks_around_the_residual() {
        let mut list: BlockList<4> = BlockList::new();
        let hole = list.push_back(START, 128, BlockState::Hole).unwrap();
        let after = list.push_back(START + 128, 64, BlockState::Allocated)
            .unwrap();

        let right = list.split(hole, 48, HSZ).unwrap();
        list.get_mut(hole).state = BlockState::Allocated;
        assert_eq!(list.get(after).prev, Some(right));
        assert_eq!(list.get(right).next, Some(after));
        assert_eq!(list.tail(), Some(after));
        assert_eq!(list.self_check(START, HSZ), START + 192);
    }
}
