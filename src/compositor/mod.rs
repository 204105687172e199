//! Compositor
//!
//! Turns a declarative graph of render nodes/targets/passes into the
//! ordered command stream for one frame.
//!
//! The graph exists twice:
//!
//! - the **resource graph** ([`desc`]): immutable, shareable descriptors,
//!   deserialized from the offline compiler's binary format or built in
//!   code. One resource graph may back many workspace instances.
//! - the **instance graph** ([`workspace`]): the live, GPU-resource-owning
//!   realization for one workspace. Render targets, framebuffers and
//!   per-pass transient state live here and are recreated when settings
//!   change, without touching the resource graph.

pub mod desc;
pub mod generation;
pub mod passes;
pub mod render_queue;
pub mod workspace;

pub use desc::{
    CompositorNodeDesc, CompositorPassDesc, CompositorTargetDesc, CompositorWorkspaceDesc,
};
pub use generation::{SettingsGeneration, SettingsState};
pub use render_queue::RenderQueue;
pub use workspace::{CompositorWorkspace, FrameContext, FramePassData};
