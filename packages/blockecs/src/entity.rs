//! Entity handles.

use std::fmt::{self, Debug, Formatter};

/// The handle of a single entity.
///
/// A handle packs a 32-bit index (high half) and a 32-bit generation (low
/// half). The index names a slot in the `EntityManager`'s table. The
/// generation changes every time that slot is destroyed, so handles held
/// across a destroy stop resolving instead of aliasing the slot's next owner.
///
/// Handles are unique per `EntityManager`. They are not unique across worlds.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(u64);

impl EntityHandle {
    /// Create a handle from an index and a generation.
    pub const fn new(index: u32, generation: u32) -> EntityHandle {
        EntityHandle(((index as u64) << 32) | generation as u64)
    }

    /// Rebuild a handle from the value returned by `to_bits`.
    pub const fn from_bits(bits: u64) -> EntityHandle {
        EntityHandle(bits)
    }

    /// Return the packed 64-bit representation.
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Return the table index of this handle.
    pub const fn index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Return the generation of this handle.
    pub const fn generation(self) -> u32 {
        self.0 as u32
    }

    /// Return the handle the same slot will carry once it is reused.
    pub(crate) fn next_generation(self) -> EntityHandle {
        EntityHandle::new(self.index(), self.generation().wrapping_add(1))
    }
}

impl Debug for EntityHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({}v{})", self.index(), self.generation())
    }
}
