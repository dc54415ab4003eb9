//! Generation backends for BlueChat.
//!
//! Every backend implements the `bluechat_core::Backend` trait and shares
//! the prompt construction in [`prompt`]. [`router::build_from_config`]
//! picks the variant named by configuration at startup.

pub mod prompt;
#[cfg(feature = "local")]
pub mod local;
pub mod remote;
pub mod router;

#[cfg(feature = "local")]
pub use local::LocalBackend;
pub use remote::RemoteBackend;
pub use router::build_from_config;
