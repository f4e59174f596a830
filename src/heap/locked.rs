/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

use crate::error::{HeapError, InvalidFreeReason};
use crate::heap::{DEFAULT_MAX_BLOCKS, Heap};
use crate::mem::VAddr;
use crate::mem::backend::{AddressMapper, PageFrameSupplier};
use crate::misc::align_up;
use crate::sync::{Spinlock, SpinlockGuard};
use crate::{critical, error};

/// Alignment of every pointer handed out through `GlobalAlloc`, provided the
/// heap's header size is a multiple of it.
pub const HEAP_ALIGN: usize = 16;

/// A heap behind a spinlock, usable from any context and as the global
/// allocator. It may be created empty in a `static` and initialized once the
/// frame allocator and paging are up.
pub struct LockedHeap<S, M, const N: usize = DEFAULT_MAX_BLOCKS> {
    heap: Spinlock<Option<Heap<S, M, N>>>,
}

impl<S, M, const N: usize> LockedHeap<S, M, N> {
    pub const fn empty() -> Self {
        Self {
            heap: Spinlock::new(None),
        }
    }

    pub fn new(heap: Heap<S, M, N>) -> Self {
        Self {
            heap: Spinlock::new(Some(heap)),
        }
    }

    /// Install the heap. Panics if one was already installed.
    pub fn init(&self, heap: Heap<S, M, N>) {
        let mut guard = self.heap.lock();
        assert!(guard.is_none(), "kernel heap initialized twice");
        *guard = Some(heap);
    }

    /// Lock the heap for direct access, e.g. to gather statistics. Any
    /// allocation attempted while the guard is alive will spin forever.
    pub fn lock(&self) -> SpinlockGuard<'_, Option<Heap<S, M, N>>> {
        self.heap.lock()
    }
}

impl<S, M, const N: usize> LockedHeap<S, M, N>
where
    S: PageFrameSupplier,
    M: AddressMapper,
{
    pub fn allocate(&self, size: usize) -> Result<VAddr, HeapError> {
        match self.heap.lock().as_mut() {
            Some(heap) => heap.allocate(size),
            None => {
                error!("kheap: allocation of {size} bytes before initialization");
                Err(HeapError::OutOfMemory { requested: size })
            }
        }
    }

    pub fn free(&self, ptr: VAddr) -> Result<(), HeapError> {
        match self.heap.lock().as_mut() {
            Some(heap) => heap.free(ptr),
            None => Err(HeapError::InvalidFree {
                addr: ptr,
                reason: InvalidFreeReason::OutOfRange,
            }),
        }
    }
}

unsafe impl<S, M, const N: usize> GlobalAlloc for LockedHeap<S, M, N>
where
    S: PageFrameSupplier + Send,
    M: AddressMapper + Send,
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_ALIGN {
            error!(
                "kernel heap doesn't handle alignment requirements above {} bytes",
                HEAP_ALIGN
            );
            return ptr::null_mut();
        }

        let size = align_up(layout.size().max(1), HEAP_ALIGN);
        let Ok(addr) = self.allocate(size) else {
            return ptr::null_mut();
        };

        if addr.0 % layout.align() != 0 {
            error!("kernel heap returned {:?}, misaligned for {:?}", addr, layout);
            if let Err(err) = self.free(addr) {
                error!("kernel heap: couldn't give back {:?}: {}", addr, err);
            }
            return ptr::null_mut();
        }

        addr.as_mut_ptr()
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Err(err) = self.free(VAddr::from(ptr)) {
            critical!("kernel heap: dealloc(): {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::config::HeapConfig;
    use crate::mem::fake::{FakeFrameSupplier, FakeMapper};
    use std::boxed::Box;
    use std::thread;

    const NR_PAGES: usize = 16;

    /// Real memory standing in for the mapped heap: the fake mapper only
    /// does the bookkeeping, so the heap can be placed right on top of it.
    #[repr(C, align(4096))]
    struct Arena([u8; NR_PAGES * 4096]);

    type TestLockedHeap = LockedHeap<FakeFrameSupplier, FakeMapper, 128>;

    fn heap_on(arena: &mut Arena) -> TestLockedHeap {
        let config = HeapConfig::builder(VAddr::from(arena.0.as_mut_ptr()))
            .max_size(NR_PAGES * 4096)
            .build()
            .unwrap();

        LockedHeap::new(Heap::new(
            config,
            FakeFrameSupplier::new(NR_PAGES),
            FakeMapper::new(),
        ))
    }

    #[test]
    fn it_allocates_through_global_alloc() {
        let mut arena = Box::new(Arena([0xf9; NR_PAGES * 4096]));
        let heap = heap_on(&mut arena);

        unsafe {
            let a_layout = Layout::from_size_align(100, 8).unwrap();
            let a = heap.alloc(a_layout);
            assert!(!a.is_null());
            assert_eq!(a as usize % HEAP_ALIGN, 0);
            a.write_bytes(0xaa, 100);

            let b_layout = Layout::from_size_align(3000, 16).unwrap();
            let b = heap.alloc(b_layout);
            assert!(!b.is_null());
            assert_eq!(b as usize % HEAP_ALIGN, 0);
            b.write_bytes(0xbb, 3000);

            let a_bytes = core::slice::from_raw_parts(a, 100);
            assert!(a_bytes.iter().all(|&byte| byte == 0xaa));

            heap.dealloc(a, a_layout);
            heap.dealloc(b, b_layout);
        }

        let guard = heap.lock();
        let inner = guard.as_ref().unwrap();
        inner.self_check();
        assert!(inner.is_empty());
        assert_eq!(inner.supplier().nr_allocated(), 0);
    }

    #[test]
    fn it_refuses_large_alignments() {
        let mut arena = Box::new(Arena([0xf9; NR_PAGES * 4096]));
        let heap = heap_on(&mut arena);

        let layout = Layout::from_size_align(64, 64).unwrap();
        assert!(unsafe { heap.alloc(layout) }.is_null());
        assert!(heap.lock().as_ref().unwrap().is_empty());
    }

    #[test]
    fn it_gives_back_misaligned_blocks() {
        let mut arena = Box::new(Arena([0xf9; NR_PAGES * 4096]));
        let config = HeapConfig::builder(VAddr::from(arena.0.as_mut_ptr()))
            .header_size(8)
            .build()
            .unwrap();
        let heap: TestLockedHeap = LockedHeap::new(Heap::new(
            config,
            FakeFrameSupplier::new(NR_PAGES),
            FakeMapper::new(),
        ));

        let layout = Layout::from_size_align(32, 16).unwrap();
        assert!(unsafe { heap.alloc(layout) }.is_null());
        {
            let guard = heap.lock();
            let inner = guard.as_ref().unwrap();
            inner.self_check();
            assert!(inner.is_empty());
            assert_eq!(inner.supplier().nr_allocated(), 0);
        }

        let layout = Layout::from_size_align(32, 8).unwrap();
        let ptr = unsafe { heap.alloc(layout) };
        assert!(!ptr.is_null());
        unsafe { heap.dealloc(ptr, layout) };
    }

    #[test]
    fn it_returns_null_when_exhausted() {
        let mut arena = Box::new(Arena([0xf9; NR_PAGES * 4096]));
        let heap = heap_on(&mut arena);

        let layout = Layout::from_size_align(NR_PAGES * 4096, 8).unwrap();
        assert!(unsafe { heap.alloc(layout) }.is_null());
    }

    #[test]
    fn it_fails_before_initialization() {
        let heap: TestLockedHeap = LockedHeap::empty();

        assert_eq!(heap.allocate(8), Err(HeapError::OutOfMemory { requested: 8 }));
        assert!(unsafe { heap.alloc(Layout::new::<u64>()) }.is_null());

        let mut arena = Box::new(Arena([0xf9; NR_PAGES * 4096]));
        let config = HeapConfig::builder(VAddr::from(arena.0.as_mut_ptr()))
            .build()
            .unwrap();
        heap.init(Heap::new(config, FakeFrameSupplier::new(NR_PAGES), FakeMapper::new()));

        let addr = heap.allocate(8).unwrap();
        heap.free(addr).unwrap();
    }

    #[test]
    fn it_serializes_concurrent_users() {
        let mut arena = Box::new(Arena([0xf9; NR_PAGES * 4096]));
        let heap = heap_on(&mut arena);

        thread::scope(|s| {
            for id in 0..4u8 {
                let heap = &heap;
                s.spawn(move || {
                    for round in 0..200usize {
                        let size = 16 + (round * 7 + id as usize * 13) % 240;
                        let layout = Layout::from_size_align(size, 8).unwrap();

                        unsafe {
                            let ptr = heap.alloc(layout);
                            assert!(!ptr.is_null());
                            ptr.write_bytes(id, size);
                            thread::yield_now();

                            let bytes = core::slice::from_raw_parts(ptr, size);
                            assert!(bytes.iter().all(|&byte| byte == id));
                            heap.dealloc(ptr, layout);
                        }
                    }
                });
            }
        });

        let guard = heap.lock();
        let inner = guard.as_ref().unwrap();
        inner.self_check();
        assert!(inner.is_empty());
        assert_eq!(inner.stats().nr_alloc_calls, 800);
    }
}
