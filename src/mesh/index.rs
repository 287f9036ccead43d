//! Index types for mesh elements.
//!
//! This module provides type-safe handles for vertices, mesh edges, faces and
//! face-edges. Handles are generic over the underlying integer type so small
//! meshes can use `u16` and massive ones `u64`.

use std::fmt::{self, Debug};
use std::hash::Hash;

/// Trait for types that can be used as mesh indices.
///
/// This trait is implemented for `u16`, `u32`, and `u64`.
pub trait MeshIndex: Copy + Clone + Eq + PartialEq + Ord + PartialOrd + Hash + Debug + Send + Sync + 'static {
    /// The maximum valid index value.
    const MAX: Self;

    /// A sentinel value representing an invalid/null index.
    const INVALID: Self;

    /// Convert from usize to this index type.
    ///
    /// # Panics
    /// Panics in debug builds if the value is too large for this index type.
    fn from_usize(v: usize) -> Self;

    /// Convert to usize.
    fn to_usize(self) -> usize;

    /// Check if this is a valid (non-sentinel) index.
    fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl MeshIndex for u16 {
    const MAX: Self = u16::MAX - 1;
    const INVALID: Self = u16::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= Self::MAX as usize, "index {} too large for u16", v);
        v as u16
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl MeshIndex for u32 {
    const MAX: Self = u32::MAX - 1;
    const INVALID: Self = u32::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= Self::MAX as usize, "index {} too large for u32", v);
        v as u32
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl MeshIndex for u64 {
    const MAX: Self = u64::MAX - 1;
    const INVALID: Self = u64::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        v as u64
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// A type-safe vertex handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertexId<I: MeshIndex = u32>(I);

/// A type-safe mesh edge handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct EdgeId<I: MeshIndex = u32>(I);

/// A type-safe face handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceId<I: MeshIndex = u32>(I);

/// A type-safe face-edge (half-edge) handle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceEdgeId<I: MeshIndex = u32>(I);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl<I: MeshIndex> $name<I> {
            /// Create a new handle from a raw slot index.
            #[inline]
            pub fn new(index: usize) -> Self {
                Self(I::from_usize(index))
            }

            /// Create an invalid/null handle.
            #[inline]
            pub fn invalid() -> Self {
                Self(I::INVALID)
            }

            /// Get the raw slot index.
            #[inline]
            pub fn index(self) -> usize {
                self.0.to_usize()
            }

            /// Get the raw value of the underlying type.
            #[inline]
            pub fn raw(self) -> I {
                self.0
            }

            /// Check if this is a valid (non-null) handle.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0.is_valid()
            }

            /// `Some(self)` if valid, otherwise `None`.
            #[inline]
            pub fn valid(self) -> Option<Self> {
                if self.is_valid() {
                    Some(self)
                } else {
                    None
                }
            }
        }

        impl<I: MeshIndex> Debug for $name<I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $display, self.index())
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl<I: MeshIndex> Default for $name<I> {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl<I: MeshIndex> From<usize> for $name<I> {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertexId, "V");
impl_index_type!(EdgeId, "E");
impl_index_type!(FaceId, "F");
impl_index_type!(FaceEdgeId, "FE");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_id() {
        let v: VertexId = VertexId::new(42);
        assert_eq!(v.index(), 42);
        assert!(v.is_valid());
        assert_eq!(v.valid(), Some(v));

        let invalid: VertexId = VertexId::invalid();
        assert!(!invalid.is_valid());
        assert_eq!(invalid.valid(), None);
    }

    #[test]
    fn test_default_is_invalid() {
        let e: EdgeId = EdgeId::default();
        let fe: FaceEdgeId<u16> = FaceEdgeId::default();
        assert!(!e.is_valid());
        assert!(!fe.is_valid());
    }

    #[test]
    fn test_small_indices() {
        let v: VertexId<u16> = VertexId::new(1000);
        assert_eq!(v.index(), 1000);
        let f: FaceId<u64> = FaceId::new(1 << 40);
        assert_eq!(f.index(), 1 << 40);
    }

    #[test]
    fn test_debug_format() {
        let v: VertexId = VertexId::new(42);
        assert_eq!(format!("{:?}", v), "V(42)");

        let fe: FaceEdgeId = FaceEdgeId::new(7);
        assert_eq!(format!("{:?}", fe), "FE(7)");

        let invalid: EdgeId = EdgeId::invalid();
        assert_eq!(format!("{:?}", invalid), "E(INVALID)");
    }
}
