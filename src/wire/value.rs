//! Decoded wire values
//!
//! A [`WireValue`] is one node of the recursive wire format: a raw
//! byte-string leaf or an ordered list of further values. Decoded trees
//! carry no schema; callers pull fields out with the type-coercing
//! accessors below.
//!
//! Accessors are intentionally lenient: on a type mismatch they return a
//! documented zero value (0, empty bytes, empty list) rather than failing,
//! so a single malformed field never takes down the whole message. Call
//! sites that need to distinguish "absent" from "zero" use the `try_`
//! variants instead.

use num_bigint::BigUint;

/// One decoded node of the wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    /// Raw bytes, never interpreted until an accessor asks for a type.
    Bytes(Vec<u8>),
    /// Ordered sequence of child values.
    List(Vec<WireValue>),
}

/// Sentinel returned for out-of-range list access.
static ABSENT: WireValue = WireValue::Bytes(Vec::new());

impl WireValue {
    /// Build a byte-string value.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        WireValue::Bytes(data.into())
    }

    /// Build a byte-string value from UTF-8 text.
    pub fn string(s: &str) -> Self {
        WireValue::Bytes(s.as_bytes().to_vec())
    }

    /// Build a byte-string holding `n` in minimal big-endian form.
    /// Zero encodes as the empty byte-string.
    pub fn uint(n: u64) -> Self {
        let buf = n.to_be_bytes();
        let skip = buf.iter().take_while(|b| **b == 0).count();
        WireValue::Bytes(buf[skip..].to_vec())
    }

    /// Build a list from already-constructed children.
    pub fn list(items: Vec<WireValue>) -> Self {
        WireValue::List(items)
    }

    /// Build an empty list, ready for [`WireValue::push`].
    pub fn empty_list() -> Self {
        WireValue::List(Vec::new())
    }

    /// Append a child. Appending to a byte-string leaf discards the leaf
    /// and starts a fresh single-element list.
    pub fn push(&mut self, child: WireValue) -> &mut Self {
        match self {
            WireValue::List(items) => items.push(child),
            WireValue::Bytes(_) => *self = WireValue::List(vec![child]),
        }
        self
    }

    pub fn is_list(&self) -> bool {
        matches!(self, WireValue::List(_))
    }

    /// Byte length for a byte-string, element count for a list.
    pub fn len(&self) -> usize {
        match self {
            WireValue::Bytes(b) => b.len(),
            WireValue::List(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coerce to an unsigned integer. Byte-strings are read as big-endian
    /// regardless of width (1, 2, 4, 8 or anything in between); widths
    /// beyond 8 bytes fold with wrapping shifts. Lists coerce to 0.
    pub fn as_u64(&self) -> u64 {
        match self {
            WireValue::Bytes(b) => b.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
            WireValue::List(_) => 0,
        }
    }

    /// Coerce to an arbitrary-precision unsigned integer. Lists coerce
    /// to zero.
    pub fn as_big(&self) -> BigUint {
        match self {
            WireValue::Bytes(b) => BigUint::from_bytes_be(b),
            WireValue::List(_) => BigUint::default(),
        }
    }

    /// Coerce to raw bytes. Lists coerce to the empty slice.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WireValue::Bytes(b) => b,
            WireValue::List(_) => &[],
        }
    }

    /// Coerce to text, replacing invalid UTF-8. Lists coerce to the
    /// empty string.
    pub fn as_str(&self) -> String {
        match self {
            WireValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            WireValue::List(_) => String::new(),
        }
    }

    /// Coerce to a list of children. Byte-strings coerce to the empty
    /// slice.
    pub fn as_list(&self) -> &[WireValue] {
        match self {
            WireValue::List(items) => items,
            WireValue::Bytes(_) => &[],
        }
    }

    /// Index into a list. Out-of-range access and indexing a byte-string
    /// both yield the absent value (an empty byte-string), so chained
    /// access over a short message stays total. Negative indices are
    /// unrepresentable by construction.
    pub fn get(&self, idx: usize) -> &WireValue {
        self.try_get(idx).unwrap_or(&ABSENT)
    }

    /// Fallible indexing: `None` when out of range or not a list.
    pub fn try_get(&self, idx: usize) -> Option<&WireValue> {
        match self {
            WireValue::List(items) => items.get(idx),
            WireValue::Bytes(_) => None,
        }
    }

    /// Fallible integer coercion: `Some` only for byte-strings that fit
    /// in 8 bytes.
    pub fn try_u64(&self) -> Option<u64> {
        match self {
            WireValue::Bytes(b) if b.len() <= 8 => Some(self.as_u64()),
            _ => None,
        }
    }
}

impl Default for WireValue {
    fn default() -> Self {
        WireValue::Bytes(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_coercion_is_width_independent() {
        // 1, 2, 4 and 8 byte encodings of the same number all read back
        // identically.
        for bytes in [
            vec![0x2a],
            vec![0x00, 0x2a],
            vec![0x00, 0x00, 0x00, 0x2a],
            vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2a],
        ] {
            assert_eq!(WireValue::bytes(bytes).as_u64(), 42);
        }

        assert_eq!(WireValue::bytes(vec![0x01, 0x00]).as_u64(), 256);
        assert_eq!(WireValue::bytes(vec![]).as_u64(), 0);
    }

    #[test]
    fn uint_constructor_round_trips() {
        for n in [0u64, 1, 255, 256, 65_535, u64::MAX] {
            assert_eq!(WireValue::uint(n).as_u64(), n);
        }
        // Zero is the empty byte-string, not a zero byte.
        assert_eq!(WireValue::uint(0), WireValue::bytes(vec![]));
    }

    #[test]
    fn lenient_accessors_return_zero_values_on_mismatch() {
        let list = WireValue::list(vec![WireValue::uint(1)]);
        assert_eq!(list.as_u64(), 0);
        assert_eq!(list.as_bytes(), &[] as &[u8]);
        assert_eq!(list.as_str(), "");
        assert_eq!(list.as_big(), BigUint::default());

        let leaf = WireValue::string("hello");
        assert_eq!(leaf.as_list(), &[] as &[WireValue]);
        assert_eq!(leaf.as_str(), "hello");
    }

    #[test]
    fn out_of_range_get_is_absent_not_error() {
        let list = WireValue::list(vec![WireValue::uint(7)]);
        assert_eq!(list.get(0).as_u64(), 7);
        assert_eq!(list.get(5), &WireValue::bytes(vec![]));
        assert_eq!(list.get(5).as_u64(), 0);
        assert!(list.try_get(5).is_none());

        // Indexing a leaf behaves the same way.
        assert_eq!(WireValue::string("x").get(0).as_u64(), 0);
    }

    #[test]
    fn try_u64_distinguishes_unrepresentable() {
        assert_eq!(WireValue::uint(9).try_u64(), Some(9));
        assert_eq!(WireValue::bytes(vec![1; 9]).try_u64(), None);
        assert_eq!(WireValue::empty_list().try_u64(), None);
    }

    #[test]
    fn big_integer_coercion() {
        let raw = vec![0xff; 12];
        let v = WireValue::bytes(raw.clone());
        assert_eq!(v.as_big(), BigUint::from_bytes_be(&raw));
    }

    #[test]
    fn push_builds_lists() {
        let mut v = WireValue::empty_list();
        v.push(WireValue::uint(1)).push(WireValue::string("two"));
        assert_eq!(v.len(), 2);
        assert_eq!(v.get(1).as_str(), "two");

        // Pushing onto a leaf starts a fresh list.
        let mut leaf = WireValue::string("old");
        leaf.push(WireValue::uint(3));
        assert_eq!(leaf.len(), 1);
        assert_eq!(leaf.get(0).as_u64(), 3);
    }
}
