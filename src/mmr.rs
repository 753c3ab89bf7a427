//! Mapped Memory Regions and the MMR family registry.
//!
//! Follows xv6's `mmr_list`/`mmrlistinit`/`alloc_mmr_listid`/
//! `dealloc_mmr_listid`/`get_mmr_list`, and the MAP_SHARED
//! splice-into-ring logic in `fork`/`freeproc`.
//!
//! xv6 represents a family as a doubly-linked intrusive ring through
//! fields embedded in each process's MMR table entry. Here a family is
//! represented instead as a fixed-capacity *membership set* (bounded by
//! NPROC), since every externally observable rule only needs "is `p` a
//! member", "how many members remain", and "free exactly once, when the
//! last member departs" — never ring traversal order.

use crate::error::{KError, KResult};
use crate::param::{MAX_MMR, NPROC};
use crate::spinlock::Spinlock;

bitflags::bitflags! {
    #[derive(Copy, Clone)]
    pub struct MmrFlags: u32 {
        const MAP_PRIVATE = 0b01;
        const MAP_SHARED  = 0b10;
    }
}

/// A per-process record describing one mapped region.
#[derive(Copy, Clone)]
pub struct Mmr {
    pub valid: bool,
    pub addr: usize,
    pub length: usize,
    pub flags: MmrFlags,
    /// Index into the global family table; -1 for MAP_PRIVATE.
    pub listid: i32,
}

impl Mmr {
    pub const fn empty() -> Self {
        Mmr {
            valid: false,
            addr: 0,
            length: 0,
            flags: MmrFlags::MAP_PRIVATE,
            listid: -1,
        }
    }
}

pub type MmrTable = [Mmr; MAX_MMR];

pub const fn empty_mmr_table() -> MmrTable {
    [Mmr::empty(); MAX_MMR]
}

const NLISTID: usize = NPROC * MAX_MMR;

#[derive(Copy, Clone)]
struct FamilyEntry {
    valid: bool,
    members: [Option<usize>; NPROC],
}

impl FamilyEntry {
    const fn empty() -> Self {
        FamilyEntry {
            valid: false,
            members: [None; NPROC],
        }
    }

    fn count(&self) -> usize {
        self.members.iter().filter(|m| m.is_some()).count()
    }
}

/// Global family registry. One `Spinlock` per entry, serializing
/// membership changes for that family, plus one allocator lock for the
/// valid bitmap.
pub struct MmrFamilyTable {
    listid_lock: Spinlock<()>,
    entries: [Spinlock<FamilyEntry>; NLISTID],
}

impl MmrFamilyTable {
    pub fn new() -> Self {
        MmrFamilyTable {
            listid_lock: Spinlock::new("listid", ()),
            entries: core::array::from_fn(|_| Spinlock::new("mmrlist", FamilyEntry::empty())),
        }
    }

    /// Claim the first invalid slot, seed it with a singleton ring
    /// containing `owner`, and return its listid.
    pub fn alloc_listid(&self, owner: usize) -> KResult<i32> {
        let _guard = self.listid_lock.lock();
        for (i, entry_lock) in self.entries.iter().enumerate() {
            let mut entry = entry_lock.lock();
            if !entry.valid {
                entry.valid = true;
                entry.members = [None; NPROC];
                entry.members[0] = Some(owner);
                return Ok(i as i32);
            }
        }
        Err(KError::NoFreeListid)
    }

    pub fn dealloc_listid(&self, listid: i32) {
        let _guard = self.listid_lock.lock();
        let mut entry = self.entries[listid as usize].lock();
        entry.valid = false;
        entry.members = [None; NPROC];
    }

    /// Splice `newcomer` into `listid`'s family (fork of a MAP_SHARED MMR).
    pub fn join(&self, listid: i32, newcomer: usize) {
        let entry_lock = &self.entries[listid as usize];
        let mut entry = entry_lock.lock();
        for slot in entry.members.iter_mut() {
            if slot.is_none() {
                *slot = Some(newcomer);
                return;
            }
        }
        panic!("mmr family: ring full");
    }

    /// Remove `departing` from `listid`'s family. Returns `true` if
    /// `departing` was the *last* member (the region should now be freed
    /// and the listid returned to the free pool) or `false` if other
    /// members remain (no frames freed, listid stays allocated).
    pub fn leave(&self, listid: i32, departing: usize) -> bool {
        let entry_lock = &self.entries[listid as usize];
        let mut entry = entry_lock.lock();
        let was_last = entry.count() == 1;
        for slot in entry.members.iter_mut() {
            if *slot == Some(departing) {
                *slot = None;
                break;
            }
        }
        was_last
    }

    pub fn member_count(&self, listid: i32) -> usize {
        self.entries[listid as usize].lock().count()
    }
}

impl Default for MmrFamilyTable {
    fn default() -> Self {
        Self::new()
    }
}
