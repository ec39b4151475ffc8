// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: PID newtype and the fixed-size PID bitmap shared by the allocator and dirty tracker
//! OWNERS: @kernel-mm-team
//! PUBLIC API: Pid, PidSet, PidSetIter
//! DEPENDS_ON: config::{MAX_PIDS, PID_SHIFT}
//! INVARIANTS: Pid < MAX_PIDS; PidSet never stores bits at or above MAX_PIDS

use core::fmt;

use crate::config::{MAX_PIDS, PID_SHIFT};

const WORD_BITS: usize = u64::BITS as usize;
const BITMAP_WORDS: usize = MAX_PIDS / WORD_BITS;

/// FCSE process identifier selecting one 32MB relocation window.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u8);

impl Pid {
    /// PID 0, handed out last and shared by best-effort address spaces.
    pub const ZERO: Pid = Pid(0);

    #[inline]
    pub const fn new(raw: usize) -> Option<Self> {
        if raw < MAX_PIDS {
            Some(Self(raw as u8))
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Value programmed into CP15 c13 for this PID.
    #[inline]
    pub const fn register_value(self) -> u32 {
        (self.0 as u32) << PID_SHIFT
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid{}", self.0)
    }
}

/// Bit set over `[0, MAX_PIDS)`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct PidSet {
    bits: [u64; BITMAP_WORDS],
}

impl PidSet {
    pub const fn new() -> Self {
        Self { bits: [0; BITMAP_WORDS] }
    }

    #[inline]
    pub fn insert(&mut self, pid: Pid) -> bool {
        let (word, mask) = locate(pid);
        let fresh = self.bits[word] & mask == 0;
        self.bits[word] |= mask;
        fresh
    }

    #[inline]
    pub fn remove(&mut self, pid: Pid) -> bool {
        let (word, mask) = locate(pid);
        let present = self.bits[word] & mask != 0;
        self.bits[word] &= !mask;
        present
    }

    #[inline]
    pub fn contains(&self, pid: Pid) -> bool {
        let (word, mask) = locate(pid);
        self.bits[word] & mask != 0
    }

    /// First clear bit in `start..limit`, scanning upwards.
    pub fn find_next_clear(&self, start: usize, limit: usize) -> Option<Pid> {
        let limit = limit.min(MAX_PIDS);
        let mut index = start;
        while index < limit {
            let word = index / WORD_BITS;
            let bit = index % WORD_BITS;
            let free = !self.bits[word] >> bit;
            if free != 0 {
                let found = index + free.trailing_zeros() as usize;
                return if found < limit { Pid::new(found) } else { None };
            }
            index = (word + 1) * WORD_BITS;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.bits.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|word| *word == 0)
    }

    pub fn intersection(&self, other: &PidSet) -> PidSet {
        let mut out = *self;
        for (dst, src) in out.bits.iter_mut().zip(other.bits.iter()) {
            *dst &= *src;
        }
        out
    }

    pub fn iter(&self) -> PidSetIter<'_> {
        PidSetIter { set: self, next: 0 }
    }
}

#[inline]
fn locate(pid: Pid) -> (usize, u64) {
    let index = pid.index();
    (index / WORD_BITS, 1u64 << (index % WORD_BITS))
}

impl fmt::Debug for PidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Pid::index)).finish()
    }
}

impl FromIterator<Pid> for PidSet {
    fn from_iter<I: IntoIterator<Item = Pid>>(iter: I) -> Self {
        let mut set = PidSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<Pid> for PidSet {
    fn extend<I: IntoIterator<Item = Pid>>(&mut self, iter: I) {
        for pid in iter {
            self.insert(pid);
        }
    }
}

impl<'a> IntoIterator for &'a PidSet {
    type Item = Pid;
    type IntoIter = PidSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the members of a [`PidSet`].
pub struct PidSetIter<'a> {
    set: &'a PidSet,
    next: usize,
}

impl Iterator for PidSetIter<'_> {
    type Item = Pid;

    fn next(&mut self) -> Option<Pid> {
        while self.next < MAX_PIDS {
            let word = self.next / WORD_BITS;
            let bit = self.next % WORD_BITS;
            let pending = self.set.bits[word] >> bit;
            if pending == 0 {
                self.next = (word + 1) * WORD_BITS;
                continue;
            }
            let index = self.next + pending.trailing_zeros() as usize;
            self.next = index + 1;
            return Pid::new(index);
        }
        None
    }
}
