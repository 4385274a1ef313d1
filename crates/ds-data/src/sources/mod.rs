//! Feed implementations for the two operating modes

pub mod empty;
pub mod live;
pub mod recorded;

pub use empty::EmptyFeed;
pub use live::LiveFeed;
pub use recorded::RecordedFeed;
