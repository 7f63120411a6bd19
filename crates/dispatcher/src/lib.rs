//! Master Dispatcher
//!
//! Master-side coordination core: roles are mapped many-to-many onto connected
//! slaves through a single [`Registry`], which picks the most idle slave for each
//! dispatched task, tracks every dispatch as a [`HistoryRecord`](master_domain::HistoryRecord)
//! and revalues slave performance / role resource indices as completions arrive.
//!
//! The registry is a single-sequencer structure; [`MasterService`] serialises all
//! access to it behind one async mutex and drains inbound slave events.

pub mod failover;
pub mod registry;
mod revaluation;
pub mod role;
pub mod sequence;
pub mod service;
pub mod slave;
pub mod snapshot;
pub mod strategies;
pub mod traits;
pub mod transport;

pub use failover::*;
pub use registry::*;
pub use role::*;
pub use sequence::*;
pub use service::*;
pub use slave::*;
pub use snapshot::*;
pub use strategies::*;
pub use traits::*;
pub use transport::*;
