//! Canonical interval sets for address and port membership
//!
//! An [`IntervalSet`] holds closed ranges `[begin, end]` over an unsigned
//! integer domain. After [`IntervalSet::clean`] the ranges are sorted by
//! `begin`, and no two ranges overlap or touch, so membership is a single
//! binary search.
//!
//! Two domains are used by the engine:
//!
//! - `u32` for IPv4 addresses and ports ([`Ipv4Ranges`], port sets)
//! - `u128` for IPv6 addresses ([`Ipv6Ranges`]). A `u128` compares exactly
//!   like a big-endian pair of 64-bit halves, high half first.
//!
//! # Example
//!
//! ```
//! use rangewall::core::interval::IntervalSet;
//!
//! let mut ports = IntervalSet::<u32>::new();
//! ports.insert_range(80, 443).unwrap();
//! ports.insert_range(444, 500).unwrap();
//! ports.clean();
//!
//! assert_eq!(ports.len(), 1);
//! assert!(ports.contains(444));
//! assert!(!ports.contains(79));
//! ```

use std::fmt;

/// Unsigned integer domain an interval set is built over.
pub trait Endpoint: Copy + Ord + fmt::Debug + fmt::Display {
    /// Smallest value of the domain.
    const MIN: Self;
    /// Largest value of the domain. Ranges ending here have no successor.
    const MAX: Self;

    /// Returns `self + 1`, or `None` at the domain maximum.
    fn successor(self) -> Option<Self>;

    /// Lossless widening used for error reporting.
    fn widen(self) -> u128;
}

macro_rules! impl_endpoint {
    ($($t:ty),*) => {
        $(
            impl Endpoint for $t {
                const MIN: Self = <$t>::MIN;
                const MAX: Self = <$t>::MAX;

                #[inline]
                fn successor(self) -> Option<Self> {
                    self.checked_add(1)
                }

                #[inline]
                fn widen(self) -> u128 {
                    self as u128
                }
            }
        )*
    };
}

impl_endpoint!(u32, u128);

/// A range whose `begin` is greater than its `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid range: begin {begin} is greater than end {end}")]
pub struct InvalidRange {
    pub begin: u128,
    pub end: u128,
}

/// Closed, inclusive range `[begin, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalPair<T> {
    begin: T,
    end: T,
}

impl<T: Endpoint> IntervalPair<T> {
    /// Creates a range, rejecting `begin > end`.
    pub fn new(begin: T, end: T) -> Result<Self, InvalidRange> {
        if begin > end {
            return Err(InvalidRange {
                begin: begin.widen(),
                end: end.widen(),
            });
        }
        Ok(Self { begin, end })
    }

    /// Range covering exactly one value.
    pub fn single(value: T) -> Self {
        Self {
            begin: value,
            end: value,
        }
    }

    pub fn begin(&self) -> T {
        self.begin
    }

    pub fn end(&self) -> T {
        self.end
    }

    #[inline]
    pub fn contains(&self, value: T) -> bool {
        self.begin <= value && value <= self.end
    }

    /// Absorbs `next` into `self` if they overlap or touch.
    ///
    /// `next.begin` must not be smaller than `self.begin`. A range that ends
    /// at the domain maximum absorbs everything that follows it.
    fn absorb(&mut self, next: &Self) -> bool {
        let Some(after) = self.end.successor() else {
            // Overflow: nothing lies behind us.
            return true;
        };
        if after < next.begin {
            return false;
        }
        if self.end < next.end {
            self.end = next.end;
        }
        true
    }
}

impl<T: Endpoint> fmt::Display for IntervalPair<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.begin == self.end {
            write!(f, "{}", self.begin)
        } else {
            write!(f, "{}-{}", self.begin, self.end)
        }
    }
}

/// Sorted, merged collection of [`IntervalPair`]s.
///
/// Insertion is batched: [`insert_range`](Self::insert_range) appends to an
/// unsorted working list and [`clean`](Self::clean) canonicalizes it.
/// Membership queries are fastest on a clean set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSet<T> {
    ranges: Vec<IntervalPair<T>>,
    canonical: bool,
}

/// IPv4 address ranges.
pub type Ipv4Ranges = IntervalSet<u32>;

/// IPv6 address ranges.
pub type Ipv6Ranges = IntervalSet<u128>;

impl<T: Endpoint> Default for IntervalSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Endpoint> IntervalSet<T> {
    /// Creates an empty (and therefore clean) set.
    pub fn new() -> Self {
        Self {
            ranges: Vec::new(),
            canonical: true,
        }
    }

    /// Set covering the entire domain.
    pub fn full() -> Self {
        Self {
            ranges: vec![IntervalPair {
                begin: T::MIN,
                end: T::MAX,
            }],
            canonical: true,
        }
    }

    /// Appends `[begin, end]` to the working list.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRange`] if `begin > end`. The set is left unchanged.
    pub fn insert_range(&mut self, begin: T, end: T) -> Result<(), InvalidRange> {
        let pair = IntervalPair::new(begin, end)?;
        self.push(pair);
        Ok(())
    }

    /// Appends an already validated pair to the working list.
    pub fn push(&mut self, pair: IntervalPair<T>) {
        self.ranges.push(pair);
        self.canonical = false;
    }

    /// Sorts by `begin` and merges overlapping or adjacent ranges.
    ///
    /// Idempotent: cleaning a clean set leaves it unchanged.
    pub fn clean(&mut self) {
        if self.canonical {
            return;
        }
        self.canonical = true;
        if self.ranges.len() < 2 {
            return;
        }

        self.ranges.sort_unstable_by_key(|pair| pair.begin);

        let mut merged: Vec<IntervalPair<T>> = Vec::with_capacity(self.ranges.len());
        let mut iter = self.ranges.iter();
        let Some(&first) = iter.next() else {
            return;
        };
        let mut current = first;
        for next in iter {
            if current.absorb(next) {
                continue;
            }
            merged.push(current);
            current = *next;
        }
        merged.push(current);
        merged.shrink_to_fit();

        self.ranges = merged;
    }

    /// Returns `true` if `value` lies in one of the ranges.
    ///
    /// O(log n) on a clean set. A set with pending insertions is scanned
    /// linearly.
    pub fn contains(&self, value: T) -> bool {
        if !self.canonical {
            return self.ranges.iter().any(|pair| pair.contains(value));
        }

        // First range starting after `value`; the candidate is the one before it.
        let idx = self.ranges.partition_point(|pair| pair.begin <= value);
        idx.checked_sub(1)
            .is_some_and(|candidate| self.ranges[candidate].contains(value))
    }

    /// Union of two sets, returned clean.
    pub fn merge(&self, other: &Self) -> Self {
        let mut ranges = Vec::with_capacity(self.ranges.len() + other.ranges.len());
        ranges.extend_from_slice(&self.ranges);
        ranges.extend_from_slice(&other.ranges);
        let mut set = Self {
            ranges,
            canonical: false,
        };
        set.clean();
        set
    }

    /// Appends every range of `other` to the working list.
    pub fn extend_from(&mut self, other: &Self) {
        if other.ranges.is_empty() {
            return;
        }
        self.ranges.extend_from_slice(&other.ranges);
        self.canonical = false;
    }

    pub fn is_clean(&self) -> bool {
        self.canonical
    }

    /// Number of ranges currently held.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntervalPair<T>> {
        self.ranges.iter()
    }
}

impl<T: Endpoint> FromIterator<IntervalPair<T>> for IntervalSet<T> {
    fn from_iter<I: IntoIterator<Item = IntervalPair<T>>>(iter: I) -> Self {
        let mut set = Self {
            ranges: iter.into_iter().collect(),
            canonical: false,
        };
        set.clean();
        set
    }
}

impl<T: Endpoint> fmt::Display for IntervalSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, pair) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{pair}")?;
        }
        f.write_str("}")
    }
}
