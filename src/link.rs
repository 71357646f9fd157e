//! The `(external_count, ptr)` pair stored in a stack's head, packed into one word so that both
//! halves are always compared and swapped together.

use crate::sync::Ordering;
use core::fmt::{Debug, Formatter};
use core::marker::PhantomData;

cfg_if::cfg_if! {
    if #[cfg(any(loom, feature = "shuttle"))] {
        // The model checkers stop at 64-bit atomics, so the pair shares one u64 there.
        use crate::sync::AtomicU64 as AtomicWord;
        type Word = u64;

        cfg_if::cfg_if! {
            if #[cfg(target_pointer_width = "64")] {
                pub(crate) const PTR_BIT_LENGTH: u32 = 48;
            } else if #[cfg(target_pointer_width = "32")] {
                pub(crate) const PTR_BIT_LENGTH: u32 = 32;
            } else {
                compile_error!("splitstack only supports 32-bit and 64-bit targets");
            }
        }
    } else {
        // A full pointer in the low half and a 64-bit external count in the high half.
        use crate::sync::AtomicU128 as AtomicWord;
        type Word = u128;

        pub(crate) const PTR_BIT_LENGTH: u32 = 64;
    }
}

/// The number of high bits which hold the external count.
pub(crate) const COUNT_BIT_LENGTH: u32 = Word::BITS - PTR_BIT_LENGTH;

/// A mask to extract the node address out of a packed link.
const PTR_MASK: Word = !(Word::MAX << PTR_BIT_LENGTH);

/// The largest external count a link can carry.
pub(crate) const MAX_EXTERNAL_COUNT: u64 = (Word::MAX >> PTR_BIT_LENGTH) as u64;

/// Combine a node address and an external count into a single word.
///
/// The address takes up the [PTR_BIT_LENGTH] least significant bits and the count takes up the
/// rest. Both checks hold in release builds too: a truncated count or address would free a node
/// at the wrong time.
fn construct_packed_link(address: usize, external_count: u64) -> Word {
    assert!(
        address as Word & !PTR_MASK == 0,
        "node address {address:#x} does not fit in {PTR_BIT_LENGTH} bits"
    );
    assert!(
        external_count <= MAX_EXTERNAL_COUNT,
        "external count {external_count} overflowed {COUNT_BIT_LENGTH} bits"
    );
    (external_count as Word) << PTR_BIT_LENGTH | address as Word
}

fn extract_address_from_packed_link(packed: Word) -> usize {
    (packed & PTR_MASK) as usize
}

fn extract_count_from_packed_link(packed: Word) -> u64 {
    (packed >> PTR_BIT_LENGTH) as u64
}

/// A pointer to a node together with the number of threads which have claimed it by reading it
/// out of the head.
///
/// A null link (the empty stack) still carries a count, but nothing ever dereferences through it.
pub(crate) struct CountedLink<N> {
    packed: Word,
    _node: PhantomData<*mut N>,
}

impl<N> CountedLink<N> {
    pub(crate) fn new(ptr: *mut N, external_count: u64) -> Self {
        Self::from_packed(construct_packed_link(ptr as usize, external_count))
    }

    pub(crate) fn null() -> Self {
        Self::from_packed(0)
    }

    fn from_packed(packed: Word) -> Self {
        Self {
            packed,
            _node: PhantomData,
        }
    }

    pub(crate) fn ptr(self) -> *mut N {
        extract_address_from_packed_link(self.packed) as *mut N
    }

    pub(crate) fn external_count(self) -> u64 {
        extract_count_from_packed_link(self.packed)
    }

    pub(crate) fn is_null(self) -> bool {
        extract_address_from_packed_link(self.packed) == 0
    }

    /// The same link with one more claim recorded against it.
    pub(crate) fn with_incremented_count(self) -> Self {
        let external_count: u64 = self.external_count();
        assert!(
            external_count < MAX_EXTERNAL_COUNT,
            "external count {external_count} is saturated"
        );
        Self::new(self.ptr(), external_count + 1)
    }
}

impl<N> Clone for CountedLink<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for CountedLink<N> {}

impl<N> PartialEq for CountedLink<N> {
    fn eq(&self, other: &Self) -> bool {
        self.packed == other.packed
    }
}

impl<N> Eq for CountedLink<N> {}

impl<N> Debug for CountedLink<N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CountedLink")
            .field("ptr", &self.ptr())
            .field("external_count", &self.external_count())
            .finish()
    }
}

/// An atomic slot holding a [CountedLink]. Every compare-and-swap covers the pointer and the count
/// at once.
pub(crate) struct AtomicCountedLink<N> {
    packed: AtomicWord,
    _node: PhantomData<*mut N>,
}

impl<N> AtomicCountedLink<N> {
    pub(crate) fn new(link: CountedLink<N>) -> Self {
        Self {
            packed: AtomicWord::new(link.packed),
            _node: PhantomData,
        }
    }

    pub(crate) fn load(&self, ordering: Ordering) -> CountedLink<N> {
        CountedLink::from_packed(self.packed.load(ordering))
    }

    pub(crate) fn compare_exchange(
        &self,
        current: CountedLink<N>,
        new: CountedLink<N>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CountedLink<N>, CountedLink<N>> {
        self.packed
            .compare_exchange(current.packed, new.packed, success, failure)
            .map(CountedLink::from_packed)
            .map_err(CountedLink::from_packed)
    }

    pub(crate) fn compare_exchange_weak(
        &self,
        current: CountedLink<N>,
        new: CountedLink<N>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CountedLink<N>, CountedLink<N>> {
        self.packed
            .compare_exchange_weak(current.packed, new.packed, success, failure)
            .map(CountedLink::from_packed)
            .map_err(CountedLink::from_packed)
    }
}

impl<N> Debug for AtomicCountedLink<N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("AtomicCountedLink")
            .field(&self.load(Ordering::Relaxed))
            .finish()
    }
}
