//! Global heap allocator. `alloc::vec::Vec`/`BTreeMap` usage throughout this
//! workspace (RPC caches, decoded frames, log snapshots) needs somewhere to
//! live; a free-list allocator over a fixed static region is the standard
//! no_std answer and is what `linked_list_allocator` provides.

use linked_list_allocator::LockedHeap;

use crate::config::HEAP_SIZE;

#[cfg_attr(not(test), global_allocator)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Hand the allocator its backing memory. Must run exactly once, before any
/// other code on this CPU touches `alloc`.
///
/// # Safety
/// Must be called before any allocation and at most once; the backing
/// region must not be aliased elsewhere.
pub unsafe fn init() {
    unsafe {
        let heap_start = core::ptr::addr_of_mut!(HEAP) as *mut u8;
        ALLOCATOR.lock().init(heap_start, HEAP_SIZE);
    }
}
