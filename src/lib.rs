#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]

pub mod asset;
pub mod compositor;
pub mod errors;
pub mod material;
pub mod renderable;
pub mod rhi;
pub mod scene;
pub mod streamer;
pub mod texture;

pub use asset::{AssetId, AssetProvider, MemoryAssetProvider, PropertyId};
pub use compositor::{
    CompositorWorkspace, CompositorWorkspaceDesc, FrameContext, FramePassData,
};
pub use errors::{EngineError, Result};
pub use material::{
    MaterialBlueprint, MaterialBlueprintLibrary, MaterialResource, MaterialResourceManager,
};
pub use renderable::{Renderable, RenderableManager};
pub use rhi::{CommandBuffer, NullDevice, RhiDevice, WgpuDevice};
pub use scene::{CameraItem, DirectionalLightItem, FrameScene};
pub use streamer::ResourceStreamer;
pub use texture::{LoadState, TextureResourceManager};
