//! Named shared-memory ring buffers mapped twice in virtual memory.
//!
//! The buffer region of every ring is mapped at two adjacent virtual
//! addresses, so any window of up to the capacity is one contiguous slice,
//! wrap or no wrap. The same mechanism lifts to a struct-of-arrays
//! variant where one record type spans several parallel rings, one per
//! field.
//!
//! # Backends
//!
//! - names with a leading `/` are POSIX shared memory objects (unix),
//!   attachable read-write by name from other processes
//! - other names are memfd labels on Linux/Android/FreeBSD; secondary
//!   handles attach read-only, cross-process via `/proc/<pid>/fd/<n>`
//! - on Windows, names address page-backed sections mirrored with
//!   placeholder mappings
//!
//! # Example
//!
//! ```ignore
//! use mring::Ring;
//!
//! let mut ring: Ring<u32> = Ring::create("/samples", 1024)?;
//! ring.push(7)?;
//! ring.push_values(&[8, 9, 10])?;
//!
//! // Windows across the wrap point stay contiguous.
//! let recent = ring.slice_to_head(3)?;
//! assert_eq!(recent, &[8, 9, 10]);
//! ring.close()?;
//! ```
//!
//! A ring is single-producer: one writable handle mutates it, any number
//! of readers may attach. The library performs no cross-process
//! synchronisation of its own; readers racing the writer may see
//! partially updated state.

pub mod config;
pub mod registry;
pub mod ring;
pub mod soa;

pub use config::RingConfig;
pub use registry::RingRegistry;
pub use ring::Ring;
pub use soa::{MultiRing, Record, subring_name, synchronized_len};

pub use mring_core::{
    RingError, RingLayout, RingResult, RingState, STATE_PREFIX_SIZE, StateSnapshot,
};
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub use mring_platform::proc_fd_path;
pub use mring_platform::{
    Access, RingMapping, allocation_granularity, mirror_granularity, page_size,
};

pub use mring_macros::RingRecord;

// The derive-generated code and downstream header types need bytemuck's
// traits under a stable path.
pub use bytemuck;
