//! Keys of ring nodes and circular ordering.
//!
//! A [RingKey] is a primary value plus a [UniqueId] breaking ties, so two nodes
//! sharing a primary value still occupy distinct ring positions. Keys are totally
//! ordered; the ring closes the order into a circle, and [is_ordered] tests
//! positions on that circle.
//!
//! Since the ring has no natural zero, [BiasKey] takes a reference key as the zero
//! point and orders keys by their clockwise position from it.

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The application-level part of a key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

/// Tie breaker between equal primary values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueId(u128);

/// A position on the ring.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RingKey {
    primary: KeyValue,
    uid: UniqueId,
}

impl UniqueId {
    pub const MIN: UniqueId = UniqueId(0);
    pub const MAX: UniqueId = UniqueId(u128::MAX);

    pub fn new(v: u128) -> Self {
        Self(v)
    }

    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl RingKey {
    /// A node key with a fresh random unique id.
    pub fn new(primary: impl Into<KeyValue>) -> Self {
        Self::with_uid(primary, UniqueId::random())
    }

    pub fn with_uid(primary: impl Into<KeyValue>, uid: UniqueId) -> Self {
        Self {
            primary: primary.into(),
            uid,
        }
    }

    /// The smallest key with the given primary value, used as a search key:
    /// every node key with the same primary value sorts at or after it.
    pub fn search(primary: impl Into<KeyValue>) -> Self {
        Self::with_uid(primary, UniqueId::MIN)
    }

    pub fn primary(&self) -> &KeyValue {
        &self.primary
    }

    pub fn uid(&self) -> UniqueId {
        self.uid
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(v.into())
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{v}"),
            KeyValue::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0 as u32)
    }
}

impl fmt::Display for RingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.primary, self.uid)
    }
}

/// Whether walking clockwise from `a` reaches `b` before or at `c`.
/// Holds iff `a <= b <= c`, `b <= c <= a` or `c <= a <= b`.
pub fn is_ordered<T: Ord + ?Sized>(a: &T, b: &T, c: &T) -> bool {
    (a <= b && b <= c) || (b <= c && c <= a) || (c <= a && a <= b)
}

/// [is_ordered] with explicit inclusiveness of both ends.
/// When `from == to == val` the result is `from_incl || to_incl`.
pub fn is_ordered_with<T: Ord + ?Sized>(
    from: &T,
    from_incl: bool,
    val: &T,
    to: &T,
    to_incl: bool,
) -> bool {
    if from == to && to == val {
        return from_incl || to_incl;
    }
    let mut rc = is_ordered(from, val, to);
    if rc {
        if from == val {
            rc = from_incl;
        } else if val == to {
            rc = to_incl;
        }
    }
    rc
}

/// A key observed from a zero point: keys order by their clockwise position from `bias`,
/// and `bias` itself is the smallest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BiasKey<'a> {
    bias: &'a RingKey,
    key: &'a RingKey,
}

impl<'a> BiasKey<'a> {
    pub fn new(bias: &'a RingKey, key: &'a RingKey) -> Self {
        Self { bias, key }
    }

    fn pos(&self) -> (bool, &'a RingKey) {
        (self.key < self.bias, self.key)
    }
}

impl<'a> PartialOrd for BiasKey<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a> Ord for BiasKey<'a> {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.bias != other.bias {
            // observe the other key from our zero point
            self.pos().cmp(&BiasKey::new(self.bias, other.key).pos())
        } else {
            self.pos().cmp(&other.pos())
        }
    }
}

/// Sort keyed items clockwise starting at an origin.
pub trait SortRing {
    /// Clockwise from `origin`; `origin` itself, if present, comes first.
    fn sort_clockwise(&mut self, origin: &RingKey);

    /// Counter-clockwise from `origin`: the nearest left neighbor first, `origin` itself last.
    fn sort_counter_clockwise(&mut self, origin: &RingKey);
}

impl<T: AsRef<RingKey>> SortRing for Vec<T> {
    fn sort_clockwise(&mut self, origin: &RingKey) {
        self.sort_by(|a, b| BiasKey::new(origin, a.as_ref()).cmp(&BiasKey::new(origin, b.as_ref())))
    }

    fn sort_counter_clockwise(&mut self, origin: &RingKey) {
        self.sort_by(|a, b| {
            let a = BiasKey::new(origin, a.as_ref());
            let b = BiasKey::new(origin, b.as_ref());
            match (a.key == origin, b.key == origin) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => b.cmp(&a),
            }
        })
    }
}

impl AsRef<RingKey> for RingKey {
    fn as_ref(&self) -> &RingKey {
        self
    }
}
