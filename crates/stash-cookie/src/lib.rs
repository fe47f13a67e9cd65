//! Cookie codec: encodes key/value pairs plus attributes into `Set-Cookie`
//! style lines over a header channel, with optional value encryption.
//! Cookie expiry is enforced by whoever owns the channel.

pub mod channel;
pub mod codec;

pub use channel::{CookieChannel, MemoryCookieChannel};
pub use codec::{CookieCodec, CookieDefaults, CookieOptions};
