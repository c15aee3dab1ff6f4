//! Fixed-width bit vectors
//!
//! [`Bits`] presents a kernel integer as a vector of `WIDTH` booleans. It's
//! used for event group flags ([`EventBits`]) and task notification values
//! ([`NotificationBits`]). Bits at or above `WIDTH` are never set in a
//! `Bits` value; they are masked off when converting from the native
//! representation.
use core::{fmt, iter, ops};

/// A bit vector of `WIDTH` (at most 32) bits.
///
/// # Examples
///
/// ```
/// use rtbind::kernel::NotificationBits;
/// let mut bits = NotificationBits::bit(0) | NotificationBits::bit(4);
/// assert!(bits.test(4));
/// bits.clear(4);
/// assert_eq!(bits.raw(), 0b1);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bits<const WIDTH: u32>(u32);

/// The number of usable event group bits.
#[cfg(not(feature = "tick16"))]
pub const EVENT_BITS_WIDTH: u32 = 24;

/// The number of usable event group bits.
#[cfg(feature = "tick16")]
pub const EVENT_BITS_WIDTH: u32 = 8;

/// Event group flags.
pub type EventBits = Bits<EVENT_BITS_WIDTH>;

/// A task notification value.
pub type NotificationBits = Bits<32>;

impl<const WIDTH: u32> Bits<WIDTH> {
    /// The number of bits.
    pub const WIDTH: u32 = WIDTH;

    /// The native integer with all usable bits set.
    pub const MASK: u32 = if WIDTH >= 32 {
        u32::MAX
    } else {
        (1 << WIDTH) - 1
    };

    /// No bits set.
    pub const EMPTY: Self = Self(0);

    /// All `WIDTH` bits set.
    pub const ALL: Self = Self(Self::MASK);

    /// Construct `Bits` from the native representation, discarding bits at
    /// or above `WIDTH`.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & Self::MASK)
    }

    /// Get the native representation.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Construct `Bits` with only bit `index` set.
    ///
    /// # Panics
    ///
    /// Panics if `index >= WIDTH`.
    #[inline]
    #[track_caller]
    pub const fn bit(index: u32) -> Self {
        assert!(index < WIDTH, "bit index out of range");
        Self(1 << index)
    }

    /// Get bit `index`. Bits at or above `WIDTH` read as `false`.
    #[inline]
    pub const fn test(self, index: u32) -> bool {
        index < WIDTH && self.0 & (1 << index) != 0
    }

    /// Set bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= WIDTH`.
    #[inline]
    #[track_caller]
    pub fn set(&mut self, index: u32) {
        self.0 |= Self::bit(index).0;
    }

    /// Clear bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= WIDTH`.
    #[inline]
    #[track_caller]
    pub fn clear(&mut self, index: u32) {
        self.0 &= !Self::bit(index).0;
    }

    /// Assign `value` to bit `index`.
    #[inline]
    #[track_caller]
    pub fn assign(&mut self, index: u32, value: bool) {
        if value {
            self.set(index);
        } else {
            self.clear(index);
        }
    }

    /// Return `self` with bit `index` set.
    #[inline]
    #[track_caller]
    pub const fn with(self, index: u32) -> Self {
        Self(self.0 | Self::bit(index).0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the number of set bits.
    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Get a flag indicating whether every bit set in `other` is also set in
    /// `self` ("wait for all" semantics).
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Get a flag indicating whether any bit set in `other` is also set in
    /// `self` ("wait for any" semantics).
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Iterate over the indices of the set bits in ascending order.
    pub fn iter(self) -> impl Iterator<Item = u32> {
        let mut rest = self.0;
        iter::from_fn(move || {
            if rest == 0 {
                None
            } else {
                let index = rest.trailing_zeros();
                rest &= rest - 1;
                Some(index)
            }
        })
    }
}

impl<const WIDTH: u32> From<Bits<WIDTH>> for u32 {
    #[inline]
    fn from(x: Bits<WIDTH>) -> Self {
        x.0
    }
}

impl<const WIDTH: u32> FromIterator<u32> for Bits<WIDTH> {
    #[track_caller]
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl<const WIDTH: u32> ops::BitAnd for Bits<WIDTH> {
    type Output = Self;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl<const WIDTH: u32> ops::BitOr for Bits<WIDTH> {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl<const WIDTH: u32> ops::BitXor for Bits<WIDTH> {
    type Output = Self;
    #[inline]
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl<const WIDTH: u32> ops::Not for Bits<WIDTH> {
    type Output = Self;
    #[inline]
    fn not(self) -> Self {
        Self(!self.0 & Self::MASK)
    }
}

impl<const WIDTH: u32> ops::BitAndAssign for Bits<WIDTH> {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl<const WIDTH: u32> ops::BitOrAssign for Bits<WIDTH> {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl<const WIDTH: u32> ops::BitXorAssign for Bits<WIDTH> {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl<const WIDTH: u32> fmt::Debug for Bits<WIDTH> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<const WIDTH: u32> fmt::Binary for Bits<WIDTH> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    type Bits8 = Bits<8>;

    #[test]
    fn masks() {
        assert_eq!(Bits8::MASK, 0xff);
        assert_eq!(Bits::<24>::MASK, 0xff_ffff);
        assert_eq!(NotificationBits::MASK, u32::MAX);
    }

    #[test]
    fn debug_lists_set_indices() {
        let bits = Bits8::bit(0) | Bits8::bit(4);
        assert_eq!(format!("{bits:?}"), "{0, 4}");
        assert_eq!(format!("{:?}", Bits8::EMPTY), "{}");
    }

    #[test]
    #[should_panic]
    fn bit_out_of_range() {
        let _ = Bits8::bit(8);
    }

    #[test]
    fn test_out_of_range_is_false() {
        assert!(!Bits8::ALL.test(8));
        assert!(!Bits8::ALL.test(31));
    }

    #[quickcheck]
    fn from_raw_discards_reserved_bits(raw: u32) {
        assert_eq!(Bits8::from_raw(raw).raw(), raw & 0xff);
        assert_eq!(Bits::<24>::from_raw(raw).raw(), raw & 0xff_ffff);
        assert_eq!(NotificationBits::from_raw(raw).raw(), raw);
    }

    #[quickcheck]
    fn set_and_clear_touch_one_bit(raw: u32, index: u8) {
        let index = u32::from(index) % 24;
        let orig = Bits::<24>::from_raw(raw);

        let mut bits = orig;
        bits.set(index);
        assert!(bits.test(index));
        assert_eq!(bits.raw() & !(1 << index), orig.raw() & !(1 << index));

        bits.clear(index);
        assert!(!bits.test(index));
        assert_eq!(bits.raw(), orig.raw() & !(1 << index));
    }

    #[quickcheck]
    fn operators_match_native(x: u32, y: u32) {
        let (bx, by) = (Bits::<24>::from_raw(x), Bits::<24>::from_raw(y));
        let (x, y) = (bx.raw(), by.raw());
        assert_eq!((bx & by).raw(), x & y);
        assert_eq!((bx | by).raw(), x | y);
        assert_eq!((bx ^ by).raw(), x ^ y);
        assert_eq!((!bx).raw(), !x & 0xff_ffff);
        assert_eq!(bx.contains(by), x & y == y);
        assert_eq!(bx.intersects(by), x & y != 0);
    }

    #[quickcheck]
    fn iter_collects_back(raw: u32) {
        let _ = env_logger::builder().is_test(true).try_init();
        let bits = NotificationBits::from_raw(raw);
        log::debug!("bits = {bits:?}");
        assert_eq!(bits.iter().count() as u32, bits.count());
        assert_eq!(bits.iter().collect::<NotificationBits>(), bits);
    }
}
