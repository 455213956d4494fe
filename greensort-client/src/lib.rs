//! greensort-client: streaming client for the realtime detection service
//!
//! A [`FrameChannel`] keeps one websocket session alive, reconnecting with
//! exponential backoff after abnormal closes. A [`FrameTicker`] feeds it at a
//! fixed cadence from a [`FrameSource`] without ever waiting on results.

pub mod backoff;
pub mod channel;
pub mod error;
pub mod guidance;
pub mod source;
pub mod tasks;
pub mod ticker;

pub use backoff::ReconnectBackoff;
pub use channel::{ChannelEvent, ChannelStats, ChannelStatus, FrameChannel};
pub use error::ChannelError;
pub use guidance::GuidanceView;
pub use source::{DirectoryFrameSource, FrameSource};
pub use tasks::ScheduledTasks;
pub use ticker::{FrameTicker, TickerStats};
