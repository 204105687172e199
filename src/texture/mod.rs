//! Texture Resources
//!
//! Streamed texture assets and the manager that owns them. A texture
//! resource's id is valid synchronously from the moment it is requested;
//! its pixel data arrives later through the resource streamer, with a
//! fallback texture substituted in the meantime so rendering never waits.

pub mod loader;
pub mod loaders;
pub mod manager;
pub mod resource;

pub use loader::{DecodedTexture, LoadContext, LoaderKind, TextureLoader};
pub use manager::TextureResourceManager;
pub use resource::{LoadState, ResourceListener, TextureResource, TextureResourceId};
