//! Typed index arenas.
//!
//! Every AST node, type, scope, symbol and MIR entity of a session lives in
//! an [`Arena`] and is referred to by a small copyable id. Nothing is freed
//! individually: an arena is dropped as a whole when its session ends, so an
//! id handed out once stays valid for the whole compilation.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A trait for types that can be used as arena indices.
pub trait Idx: Copy + Eq + fmt::Debug {
    fn new(raw: u32) -> Self;
    fn index(self) -> usize;
}

/// Declares a `u32` newtype id implementing [`Idx`].
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(pub u32);

        impl $crate::arena::Idx for $name {
            fn new(raw: u32) -> Self {
                Self(raw)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

pub(crate) use define_id;

/// Append-only storage addressed by a typed index.
#[derive(Debug, Clone)]
pub struct Arena<I: Idx, T> {
    raw: Vec<T>,
    _marker: PhantomData<fn(I) -> I>,
}

impl<I: Idx, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Idx, T> Arena<I, T> {
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            raw: Vec::with_capacity(cap),
            _marker: PhantomData,
        }
    }

    /// Push a value and return its index.
    pub fn push(&mut self, value: T) -> I {
        let idx = I::new(self.raw.len() as u32);
        self.raw.push(value);
        idx
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn get(&self, idx: I) -> Option<&T> {
        self.raw.get(idx.index())
    }

    pub fn get_mut(&mut self, idx: I) -> Option<&mut T> {
        self.raw.get_mut(idx.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.raw.iter()
    }

    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> {
        self.raw
            .iter()
            .enumerate()
            .map(|(i, v)| (I::new(i as u32), v))
    }

    pub fn ids(&self) -> impl Iterator<Item = I> + use<I, T> {
        (0..self.raw.len() as u32).map(I::new)
    }

    pub fn next_idx(&self) -> I {
        I::new(self.raw.len() as u32)
    }
}

impl<I: Idx, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, idx: I) -> &T {
        &self.raw[idx.index()]
    }
}

impl<I: Idx, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, idx: I) -> &mut T {
        &mut self.raw[idx.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_id!(TestId, "test");

    #[test]
    fn push_returns_sequential_ids() {
        let mut arena: Arena<TestId, &str> = Arena::new();
        let a = arena.push("first");
        let b = arena.push("second");

        assert_eq!(a, TestId(0));
        assert_eq!(b, TestId(1));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.next_idx(), TestId(2));
    }

    #[test]
    fn ids_stay_valid_after_growth() {
        let mut arena: Arena<TestId, u64> = Arena::with_capacity(1);
        let first = arena.push(7);
        for i in 0..100 {
            arena.push(i);
        }
        assert_eq!(arena[first], 7);
        arena[first] = 9;
        assert_eq!(arena.get(first), Some(&9));
    }

    #[test]
    fn iter_enumerated_pairs_ids_with_values() {
        let mut arena: Arena<TestId, char> = Arena::new();
        arena.push('a');
        arena.push('b');
        let items: Vec<_> = arena.iter_enumerated().collect();
        assert_eq!(items, vec![(TestId(0), &'a'), (TestId(1), &'b')]);
        assert_eq!(TestId(1).to_string(), "test#1");
    }
}
