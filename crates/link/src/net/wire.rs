//! Fixed-layout field codec.
//!
//! Every type that appears on the wire implements [`Wire`] exactly once, and
//! message structs are composed from their field list with [`wire_struct!`].
//! Multi-byte values are big-endian; `f32` travels as its IEEE-754 bits.

use std::ops::Deref;

use bytes::{Buf, BufMut, BytesMut};

use super::protocol::WireError;

pub trait Wire: Sized {
    /// Encoded size in bytes. Constant for every type on the wire.
    const SIZE: usize;

    fn put(&self, out: &mut BytesMut);

    fn get(src: &mut Reader<'_>) -> Result<Self, WireError>;
}

/// Cursor over a received frame that remembers how many list counts had to
/// be clamped to capacity while decoding.
pub struct Reader<'a> {
    buf: &'a [u8],
    clamped: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, clamped: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn clamped(&self) -> usize {
        self.clamped
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        if self.buf.remaining() < needed {
            return Err(WireError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn skip(&mut self, len: usize) -> Result<(), WireError> {
        self.ensure(len)?;
        self.buf.advance(len);
        Ok(())
    }
}

macro_rules! wire_number {
    ($($ty:ty => $put:ident, $get:ident;)*) => {$(
        impl Wire for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn put(&self, out: &mut BytesMut) {
                out.$put(*self);
            }

            #[inline]
            fn get(src: &mut Reader<'_>) -> Result<Self, WireError> {
                src.ensure(Self::SIZE)?;
                Ok(src.buf.$get())
            }
        }
    )*};
}

wire_number! {
    u8 => put_u8, get_u8;
    i8 => put_i8, get_i8;
    u16 => put_u16, get_u16;
    i16 => put_i16, get_i16;
    u32 => put_u32, get_u32;
    u64 => put_u64, get_u64;
    f32 => put_f32, get_f32;
}

impl Wire for bool {
    const SIZE: usize = 1;

    fn put(&self, out: &mut BytesMut) {
        out.put_u8(u8::from(*self));
    }

    fn get(src: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(u8::get(src)? != 0)
    }
}

impl<T: Wire + Default, const N: usize> Wire for [T; N] {
    const SIZE: usize = N * T::SIZE;

    fn put(&self, out: &mut BytesMut) {
        for item in self {
            item.put(out);
        }
    }

    fn get(src: &mut Reader<'_>) -> Result<Self, WireError> {
        let mut items: [T; N] = std::array::from_fn(|_| T::default());
        for slot in &mut items {
            *slot = T::get(src)?;
        }
        Ok(items)
    }
}

/// Implements [`Wire`] for a struct from its field list, in wire order.
macro_rules! wire_struct {
    ($name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        impl $crate::net::wire::Wire for $name {
            const SIZE: usize = 0 $(+ <$ty as $crate::net::wire::Wire>::SIZE)*;

            fn put(&self, out: &mut ::bytes::BytesMut) {
                $(<$ty as $crate::net::wire::Wire>::put(&self.$field, out);)*
            }

            fn get(
                src: &mut $crate::net::wire::Reader<'_>,
            ) -> Result<Self, $crate::net::WireError> {
                Ok(Self {
                    $($field: <$ty as $crate::net::wire::Wire>::get(src)?,)*
                })
            }
        }
    };
}

pub(crate) use wire_struct;

/// A list with a fixed wire capacity of `N` entries.
///
/// On the wire it is a `u16` count followed by all `N` slots; unused slots are
/// zero. A received count above `N` is clamped to `N` and only the first `N`
/// entries are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedList<T, const N: usize> {
    items: Vec<T>,
}

impl<T, const N: usize> BoundedList<T, N> {
    pub const CAPACITY: usize = N;

    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Appends `item`, handing it back if the list is already full.
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        if self.items.len() >= N {
            return Err(item);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= N
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T, const N: usize> Default for BoundedList<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Deref for BoundedList<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

/// Collects at most `N` items; the rest of the iterator is ignored.
impl<T, const N: usize> FromIterator<T> for BoundedList<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().take(N).collect(),
        }
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a BoundedList<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Wire, const N: usize> Wire for BoundedList<T, N> {
    const SIZE: usize = u16::SIZE + N * T::SIZE;

    fn put(&self, out: &mut BytesMut) {
        (self.items.len() as u16).put(out);
        for item in &self.items {
            item.put(out);
        }
        out.put_bytes(0, (N - self.items.len()) * T::SIZE);
    }

    fn get(src: &mut Reader<'_>) -> Result<Self, WireError> {
        let count = usize::from(u16::get(src)?);
        let kept = count.min(N);
        if count > N {
            log::debug!("clamping list count {} to capacity {}", count, N);
            src.clamped += 1;
        }

        let mut items = Vec::with_capacity(kept);
        for _ in 0..kept {
            items.push(T::get(src)?);
        }
        src.skip((N - kept) * T::SIZE)?;

        Ok(Self { items })
    }
}
