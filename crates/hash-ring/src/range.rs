/// HashRange is the arc (begin, end] of the 128-bit key space owned by a
/// ring member: exclusive of `begin`, inclusive of `end`, wrapping through
/// zero when `begin > end`. A range whose begin equals its end is the
/// entire space, as held by the sole member of a one-node ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HashRange {
    pub begin: u128,
    pub end: u128,
}

impl HashRange {
    pub fn contains(&self, hash: u128) -> bool {
        if self.begin == self.end {
            true
        } else if self.begin < self.end {
            hash > self.begin && hash <= self.end
        } else {
            hash > self.begin || hash <= self.end
        }
    }

    pub fn begin_hex(&self) -> String {
        crate::position_hex(self.begin)
    }

    pub fn end_hex(&self) -> String {
        crate::position_hex(self.end)
    }
}

impl std::fmt::Display for HashRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}]", self.begin_hex(), self.end_hex())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_containment() {
        let plain = HashRange { begin: 0x10, end: 0x80 };
        assert!(!plain.contains(0x10)); // Exclusive lower bound.
        assert!(plain.contains(0x11));
        assert!(plain.contains(0x80)); // Inclusive upper bound.
        assert!(!plain.contains(0x81));

        // Wraps through zero.
        let wrapped = HashRange { begin: 0x80, end: 0x10 };
        assert!(wrapped.contains(0x81));
        assert!(wrapped.contains(u128::MAX));
        assert!(wrapped.contains(0));
        assert!(wrapped.contains(0x10));
        assert!(!wrapped.contains(0x11));
        assert!(!wrapped.contains(0x80));

        // Sole member of a one-node ring owns everything, itself included.
        let full = HashRange { begin: 0x42, end: 0x42 };
        assert!(full.contains(0));
        assert!(full.contains(0x42));
        assert!(full.contains(u128::MAX));
    }

    #[test]
    fn test_hex_rendering() {
        let range = HashRange { begin: 0x10, end: u128::MAX };
        assert_eq!(range.begin_hex(), "00000000000000000000000000000010");
        assert_eq!(range.end_hex(), "ffffffffffffffffffffffffffffffff");
        assert_eq!(
            range.to_string(),
            "(00000000000000000000000000000010, ffffffffffffffffffffffffffffffff]"
        );
    }
}
