//! Struct-of-arrays rings: one record type decomposed into parallel rings.
//!
//! `#[derive(RingRecord)]` turns a named-field struct into an
//! implementation of [`Record`]: one sub-ring per field, named
//! `"<base>-<field>"`, all sized to the same synchronised element count so
//! a logical index addresses the same record across every field.
//!
//! There is no cross-field atomicity. Mixing per-field pushes with
//! whole-record pushes, or writing from two handles, desynchronises the
//! logical indices; a multi-ring is single-writer, single-reader.

use bytemuck::Pod;

use mring_core::{RingError, RingResult};
use mring_platform::{RingMapping, mirror_granularity};

/// Decorated name of the sub-ring carrying `field` of the multi-ring
/// `base`. Used verbatim on create and open.
pub fn subring_name(base: &str, field: &str) -> String {
    format!("{base}-{field}")
}

/// A record type that can be decomposed into one ring per field.
/// Implemented by `#[derive(RingRecord)]`; the derive also emits the
/// `Rings`/`Slice`/`Pushed` companion types.
pub trait Record: Sized {
    /// One `Ring<field type, H>` per field.
    type Rings<H: Pod>;
    /// One contiguous `&[field type]` per field.
    type Slice<'a>;
    /// One post-push element count per field.
    type Pushed;

    const FIELD_NAMES: &'static [&'static str];
    const FIELD_SIZES: &'static [usize];

    fn create_rings<H: Pod>(base: &str, len: u64) -> RingResult<Self::Rings<H>>;
    fn open_rings<H: Pod>(base: &str) -> RingResult<Self::Rings<H>>;
    fn close_rings<H: Pod>(rings: Self::Rings<H>) -> RingResult<()>;
    fn rings_len<H: Pod>(rings: &Self::Rings<H>) -> u64;
    fn reset_rings<H: Pod>(rings: &mut Self::Rings<H>) -> RingResult<()>;
    fn push_record<H: Pod>(rings: &mut Self::Rings<H>, record: Self)
    -> RingResult<Self::Pushed>;
    fn push_columns<H: Pod>(
        rings: &mut Self::Rings<H>,
        columns: Self::Slice<'_>,
    ) -> RingResult<()>;
    fn slice_rings<'a, H: Pod>(
        rings: &'a Self::Rings<H>,
        start: u64,
        stop: u64,
    ) -> RingResult<Self::Slice<'a>>;
    fn slice_rings_from_tail<'a, H: Pod>(
        rings: &'a Self::Rings<H>,
        k: u64,
    ) -> RingResult<Self::Slice<'a>>;
    fn slice_rings_to_head<'a, H: Pod>(
        rings: &'a Self::Rings<H>,
        k: u64,
    ) -> RingResult<Self::Slice<'a>>;
}

/// The shared element count for a set of parallel rings.
///
/// Every field buffer must be a whole number of granularity units. For a
/// field of size `s` that takes `granularity / gcd(granularity, s)`
/// elements per unit; the least count that works for every field at once
/// is the lcm `m` of those, and the result is `m * ceil(requested / m)`.
pub fn synchronized_len(
    requested: u64,
    granularity: usize,
    field_sizes: &[usize],
) -> RingResult<u64> {
    if requested == 0 || field_sizes.is_empty() {
        return Err(RingError::InvalidCapacity);
    }
    let granularity = granularity as u64;
    let mut m = 1u64;
    for &size in field_sizes {
        if size == 0 {
            return Err(RingError::InvalidCapacity);
        }
        let per_unit = granularity / gcd(granularity, size as u64);
        m = lcm(m, per_unit);
    }
    Ok(m * requested.div_ceil(m))
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

/// Parallel rings over the fields of `R`, kept at one shared element count
/// so logical index `i` is the i-th record in every field.
pub struct MultiRing<R: Record, H: Pod = ()> {
    rings: R::Rings<H>,
    name: String,
    len: u64,
}

impl<R: Record, H: Pod> MultiRing<R, H> {
    /// Creates one sub-ring per field, each named `"<name>-<field>"` and
    /// sized to the synchronised element count for `requested` records.
    pub fn create(name: &str, requested: u64) -> RingResult<Self> {
        let len = synchronized_len(requested, mirror_granularity(), R::FIELD_SIZES)?;
        let rings = R::create_rings::<H>(name, len)?;
        debug_assert_eq!(R::rings_len(&rings), len);
        tracing::debug!(name, len, fields = R::FIELD_NAMES.len(), "created multi-ring");
        Ok(Self {
            rings,
            name: name.to_string(),
            len,
        })
    }

    /// Opens every sub-ring; fails if any is missing or their element
    /// counts diverge.
    pub fn open(name: &str) -> RingResult<Self> {
        let rings = R::open_rings::<H>(name)?;
        let len = R::rings_len(&rings);
        Ok(Self {
            rings,
            name: name.to_string(),
            len,
        })
    }

    /// True if every sub-ring's backing object is present.
    pub fn exists(name: &str) -> bool {
        R::FIELD_NAMES
            .iter()
            .all(|field| RingMapping::exists(&subring_name(name, field)))
    }

    /// Closes every sub-ring.
    pub fn close(self) -> RingResult<()> {
        R::close_rings(self.rings)
    }

    /// Shared element capacity of every sub-ring.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-field access: the sub-rings by field name, for single-field
    /// pushes, slices, and header access.
    pub fn rings(&self) -> &R::Rings<H> {
        &self.rings
    }

    pub fn rings_mut(&mut self) -> &mut R::Rings<H> {
        &mut self.rings
    }

    /// Resets every sub-ring's count/head/tail.
    pub fn reset(&mut self) -> RingResult<()> {
        R::reset_rings(&mut self.rings)
    }

    /// Pushes one record, field by field; returns each sub-ring's new
    /// count.
    pub fn push(&mut self, record: R) -> RingResult<R::Pushed> {
        R::push_record(&mut self.rings, record)
    }

    /// Pushes records one at a time, in record order.
    pub fn push_values(&mut self, records: &[R]) -> RingResult<()>
    where
        R: Copy,
    {
        for record in records {
            R::push_record(&mut self.rings, *record)?;
        }
        Ok(())
    }

    /// Columnar bulk push: one contiguous copy per field.
    pub fn push_columns(&mut self, columns: R::Slice<'_>) -> RingResult<()> {
        R::push_columns(&mut self.rings, columns)
    }

    /// Per-field contiguous views of the logical window `[start, stop)`.
    pub fn slice(&self, start: u64, stop: u64) -> RingResult<R::Slice<'_>> {
        R::slice_rings(&self.rings, start, stop)
    }

    /// Per-field views of the `k` oldest live records.
    pub fn slice_from_tail(&self, k: u64) -> RingResult<R::Slice<'_>> {
        R::slice_rings_from_tail(&self.rings, k)
    }

    /// Per-field views of the `k` most recent records.
    pub fn slice_to_head(&self, k: u64) -> RingResult<R::Slice<'_>> {
        R::slice_rings_to_head(&self.rings, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAN: usize = 4096;

    #[test]
    fn test_synchronized_len_uniform_fields() {
        // 8 byte fields, 4096 granularity: 512 elements per unit.
        let len = synchronized_len(1000, GRAN, &[8, 8, 8]).unwrap();
        assert_eq!(len, 1024);
    }

    #[test]
    fn test_synchronized_len_mixed_fields() {
        // 4 byte fields need 1024 per unit, 8 byte fields 512; lcm 1024.
        let len = synchronized_len(1, GRAN, &[4, 8]).unwrap();
        assert_eq!(len, 1024);
    }

    #[test]
    fn test_synchronized_len_coprime_field() {
        // A 3 byte field is coprime to the granularity.
        let len = synchronized_len(5000, GRAN, &[3]).unwrap();
        assert_eq!(len, 8192);
    }

    #[test]
    fn test_synchronized_len_fills_whole_units() {
        for sizes in [&[1usize, 2, 4][..], &[8, 16], &[24], &[3, 8]] {
            let len = synchronized_len(777, GRAN, sizes).unwrap();
            assert!(len >= 777);
            for &size in sizes {
                assert_eq!(len as usize * size % GRAN, 0);
            }
        }
    }

    #[test]
    fn test_synchronized_len_rejects_degenerate_input() {
        assert!(synchronized_len(0, GRAN, &[8]).is_err());
        assert!(synchronized_len(8, GRAN, &[]).is_err());
        assert!(synchronized_len(8, GRAN, &[0]).is_err());
    }

    #[test]
    fn test_subring_name() {
        assert_eq!(subring_name("samples", "x"), "samples-x");
        assert_eq!(subring_name("/samples", "timestamp"), "/samples-timestamp");
    }
}
