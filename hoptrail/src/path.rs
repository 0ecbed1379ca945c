//! Bounded hop list recorded in every packet.
//!
//! On the discovery leg each node that handles a packet writes its own address
//! at the packet's write cursor. The terminal node reverses the recorded list to
//! obtain the return route for its acknowledgement.

use core::fmt;

use crate::types::{MacAddr, MAX_PATH_HOPS};

/// Returned when a hop cannot be written because the path is at capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathFull;

impl fmt::Display for PathFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path capacity exceeded")
    }
}

/// Fixed-capacity ordered list of link addresses.
///
/// Slots past `len` are kept zeroed and are never part of the route.
#[derive(Clone, Copy)]
pub struct Path<const N: usize = MAX_PATH_HOPS> {
    hops: [MacAddr; N],
    len: u8,
}

impl<const N: usize> Default for Path<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Path<N> {
    /// Empty path.
    pub const fn new() -> Self {
        Self {
            hops: [MacAddr::ZERO; N],
            len: 0,
        }
    }

    /// Build a path from a hop list.
    ///
    /// Fails if the list would not leave the write cursor inside the array.
    pub fn from_hops(hops: &[MacAddr]) -> Result<Self, PathFull> {
        let mut path = Self::new();
        for (i, hop) in hops.iter().enumerate() {
            path.write(i, *hop)?;
        }
        Ok(path)
    }

    /// Write `addr` at slot `index`, extending the valid prefix to cover it.
    ///
    /// The cursor must stay strictly below the last slot: with capacity 9,
    /// writing at index 8 is rejected. A rejected write changes nothing.
    pub fn write(&mut self, index: usize, addr: MacAddr) -> Result<(), PathFull> {
        if index + 1 >= N {
            return Err(PathFull);
        }
        self.hops[index] = addr;
        self.len = self.len.max(index as u8 + 1);
        Ok(())
    }

    /// Reverse slots `0..=last` in place.
    ///
    /// Operates on raw slots regardless of content; `last` past the end is clamped.
    pub fn reverse_prefix(&mut self, last: usize) {
        if N == 0 {
            return;
        }
        let last = last.min(N - 1);
        let (mut lo, mut hi) = (0usize, last);
        while lo < hi {
            self.hops.swap(lo, hi);
            lo += 1;
            hi -= 1;
        }
    }

    /// Copy of this path with the valid hops in reverse order.
    pub fn reversed(&self) -> Self {
        let mut out = *self;
        if let Some(last) = self.last_index() {
            out.reverse_prefix(last);
        }
        out
    }

    /// Number of valid hops.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total slot count.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Index of the last valid hop.
    pub fn last_index(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }

    pub fn get(&self, index: usize) -> Option<MacAddr> {
        self.as_slice().get(index).copied()
    }

    pub fn as_slice(&self) -> &[MacAddr] {
        &self.hops[..self.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MacAddr> {
        self.as_slice().iter()
    }

    /// All slots, including unused trailing ones. Used by the wire encoder.
    pub(crate) fn raw_slots(&self) -> &[MacAddr; N] {
        &self.hops
    }

    /// Rebuild from decoded wire slots. `len` must already be validated.
    pub(crate) fn from_raw(hops: [MacAddr; N], len: u8) -> Self {
        let mut path = Self { hops, len };
        for slot in path.hops.iter_mut().skip(len as usize) {
            *slot = MacAddr::ZERO;
        }
        path
    }

    /// Diagnostic rendering of slots `0..=last`.
    pub fn render(&self, last: usize) -> Rendered<'_> {
        let end = if N == 0 { 0 } else { last.min(N - 1) + 1 };
        Rendered(&self.hops[..end])
    }
}

impl<const N: usize> PartialEq for Path<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<const N: usize> Eq for Path<N> {}

impl<const N: usize> fmt::Debug for Path<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Display adapter returned by [`Path::render`].
pub struct Rendered<'a>(&'a [MacAddr]);

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, hop) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", hop)?;
        }
        write!(f, "]")
    }
}
