//! Selectors and equality predicates.
//!
//! A selector derives a value from a state snapshot. Two selectors are the
//! same selector only if they are clones of one another: the sync protocol
//! compares them by pointer, the way it compares state snapshots.
//!
//! An equality predicate decides whether a freshly derived value differs
//! from the one a component last rendered. The default is identity:
//!
//! - `Arc<T>` values are identical when they point at the same allocation.
//! - Scalars and strings are identical when they are equal. Floats compare
//!   by bit pattern, so `NaN` is identical to itself and `0.0` is not
//!   identical to `-0.0`.
//!
//! Shallow equality compares one level deeper: two collections are shallowly
//! equal when they hold identical elements (or identical values under the
//! same keys).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::BoxError;

type SelectFn<S, T> = dyn Fn(&S) -> Result<T, BoxError> + Send + Sync;

/// A function deriving a value of type `T` from state `S`.
pub struct Selector<S, T>(Arc<SelectFn<S, T>>);

impl<S, T> Selector<S, T>
where
    S: 'static,
    T: 'static,
{
    /// Wrap an infallible selector.
    pub fn new<F>(select: F) -> Self
    where
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        Self(Arc::new(move |state: &S| Ok(select(state))))
    }

    /// Wrap a selector that may fail.
    pub fn fallible<F, E>(select: F) -> Self
    where
        F: Fn(&S) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self(Arc::new(move |state: &S| select(state).map_err(Into::into)))
    }
}

impl<S, T> Selector<S, T> {
    /// Derive a value from the given state.
    pub fn select(&self, state: &S) -> Result<T, BoxError> {
        (self.0)(state)
    }

    /// Whether both handles refer to the same selector.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.0) as *const () == Arc::as_ptr(&other.0) as *const ()
    }
}

impl<S, T> Clone for Selector<S, T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S, T> fmt::Debug for Selector<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector")
            .field(&(Arc::as_ptr(&self.0) as *const ()))
            .finish()
    }
}

/// Values that can be compared by identity.
pub trait Identity {
    fn identical(&self, other: &Self) -> bool;
}

macro_rules! identity_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identity for $ty {
                fn identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

identity_by_eq!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, String,
    &'static str,
);

impl Identity for f32 {
    fn identical(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl Identity for f64 {
    fn identical(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl<T: ?Sized> Identity for Arc<T> {
    fn identical(&self, other: &Self) -> bool {
        Arc::as_ptr(self) as *const u8 == Arc::as_ptr(other) as *const u8
    }
}

impl<T: Identity> Identity for Option<T> {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Values that can be compared one level deep.
pub trait ShallowEq {
    fn shallow_eq(&self, other: &Self) -> bool;
}

impl<T: Identity> ShallowEq for [T] {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.identical(b))
    }
}

impl<T: Identity> ShallowEq for Vec<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.as_slice().shallow_eq(other.as_slice())
    }
}

impl<K, V, H> ShallowEq for HashMap<K, V, H>
where
    K: Eq + Hash,
    V: Identity,
    H: BuildHasher,
{
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|o| value.identical(o)))
    }
}

impl<K, V, H> ShallowEq for IndexMap<K, V, H>
where
    K: Eq + Hash,
    V: Identity,
    H: BuildHasher,
{
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|o| value.identical(o)))
    }
}

impl<K: Ord, V: Identity> ShallowEq for BTreeMap<K, V> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|o| value.identical(o)))
    }
}

impl<T: ShallowEq + ?Sized> ShallowEq for Arc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.identical(other) || (**self).shallow_eq(&**other)
    }
}

impl<T: ShallowEq> ShallowEq for Option<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.shallow_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! shallow_tuple {
    ($(($($name:ident $index:tt),+)),* $(,)?) => {
        $(
            impl<$($name: Identity),+> ShallowEq for ($($name,)+) {
                fn shallow_eq(&self, other: &Self) -> bool {
                    $(self.$index.identical(&other.$index))&&+
                }
            }
        )*
    };
}

shallow_tuple!(
    (A 0, B 1),
    (A 0, B 1, C 2),
    (A 0, B 1, C 2, D 3),
);

/// Identity comparison, the default equality.
pub fn ref_equality<T: Identity + ?Sized>(a: &T, b: &T) -> bool {
    a.identical(b)
}

/// Shallow comparison, the named alternative.
pub fn shallow_equal<T: ShallowEq + ?Sized>(a: &T, b: &T) -> bool {
    a.shallow_eq(b)
}

type EqualityFn<T> = dyn Fn(&T, &T) -> bool + Send + Sync;

/// Predicate deciding whether two derived values are the same.
pub struct Equality<T>(Arc<EqualityFn<T>>);

impl<T: 'static> Equality<T> {
    pub fn new<F>(equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(equals))
    }

    /// Identity comparison.
    pub fn identity() -> Self
    where
        T: Identity,
    {
        Self::new(ref_equality::<T>)
    }

    /// Shallow comparison.
    pub fn shallow() -> Self
    where
        T: ShallowEq,
    {
        Self::new(shallow_equal::<T>)
    }

    /// Structural comparison through `PartialEq`.
    pub fn partial_eq() -> Self
    where
        T: PartialEq,
    {
        Self::new(|a: &T, b: &T| a == b)
    }
}

impl<T> Equality<T> {
    pub fn equals(&self, a: &T, b: &T) -> bool {
        (self.0)(a, b)
    }
}

impl<T: Identity + 'static> Default for Equality<T> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equality").finish_non_exhaustive()
    }
}
