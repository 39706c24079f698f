#![forbid(unsafe_code)]

mod adapter;
mod api;

pub use adapter::{YouTubeConfig, YouTubeLiveChatAdapter};
pub use api::{ChannelRef, LiveChatPage, LiveVideo, Poll, YouTubeClient};
