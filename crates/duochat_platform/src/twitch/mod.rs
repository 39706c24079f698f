#![forbid(unsafe_code)]

mod adapter;
mod eventsub;
mod helix;

pub use adapter::{TwitchConfig, TwitchEventSubAdapter};
pub use helix::{TwitchTokenValidation, validate_user_token};
