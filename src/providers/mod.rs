//! Ready-made event providers

pub mod channel;
pub mod replay;

pub use channel::ChannelProvider;
pub use replay::ReplayProvider;
