//! Platform-independent core of the mirrored ring buffer: layout
//! calculation, the in-band state header, and error definitions.
//!
//! Nothing in this crate touches the operating system. The platform mappers
//! live in `mring-platform`; the typed ring API lives in `mring`.

pub mod error;
pub mod layout;
pub mod state;

pub use error::{RingError, RingResult};
pub use layout::{RingLayout, align_up};
pub use state::{RingState, STATE_PREFIX_SIZE, StateSnapshot};
