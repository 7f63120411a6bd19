//! Master Domain
//!
//! Plain data shared by the master-side dispatcher: history records, the task and
//! report message shapes exchanged with slaves, identifiers and the clock seam.

pub mod clock;
pub mod message;
pub mod record;
pub mod value_objects;

pub use clock::*;
pub use message::*;
pub use record::*;
pub use value_objects::*;
