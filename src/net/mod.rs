//! 无线链路仿真模块
//!
//! 两个（或更多）RLC AM 端点、它们之间的有损信道，以及驱动它们的事件。

mod channel;
mod endpoint;
mod events;
mod id;
mod net_world;
mod radio_link;

pub use channel::{Channel, ChannelFate, ChannelStats};
pub use endpoint::{Endpoint, EndpointLog, LogSap};
pub use events::{DeliverPdu, HarqFeedback, RlcTimerExpiry, SubmitSdu, TxOpportunity};
pub use id::EndpointId;
pub use net_world::NetWorld;
pub use radio_link::{LinkStats, RadioLink};
