//! Compositor Pass Instances
//!
//! The live, GPU-resource-owning counterparts of the resource-graph pass
//! descriptors. Each instance records into the frame's command buffer
//! through [`fill_command_buffer`](PassInstance::fill_command_buffer);
//! the dispatch is an exhaustive match because the pass set is closed.

pub mod compute;
pub mod copy;
pub mod debug_gui;
pub mod mipmaps;
pub mod scene;
pub mod shadow;
pub mod shadow_math;

use std::sync::Arc;

use crate::asset::property;
use crate::compositor::desc::CompositorPassDesc;
use crate::compositor::workspace::{InstanceContext, PassContext};
use crate::errors::Result;
use crate::material::{MaterialProperties, PropertyValue};
use crate::rhi::CommandBuffer;

pub use shadow::{ShadowMapPass, ShadowPassData};

/// Live pass state, one variant per descriptor kind.
pub enum PassInstance {
    Scene(scene::ScenePass),
    ShadowMap(shadow::ShadowMapPass),
    Compute(compute::ComputePass),
    Copy(copy::CopyPass),
    GenerateMipmaps(mipmaps::GenerateMipmapsPass),
    DebugGui(debug_gui::DebugGuiPass),
}

impl PassInstance {
    /// Materializes the instance for one workspace.
    pub fn new(desc: &CompositorPassDesc, ctx: &mut InstanceContext<'_>) -> Result<Self> {
        Ok(match desc {
            CompositorPassDesc::Scene(desc) => Self::Scene(scene::ScenePass::new(desc.clone())),
            CompositorPassDesc::ShadowMap(desc) => {
                Self::ShadowMap(shadow::ShadowMapPass::new(desc, ctx)?)
            }
            CompositorPassDesc::Compute(desc) => {
                Self::Compute(compute::ComputePass::new(desc.clone()))
            }
            CompositorPassDesc::Copy(desc) => Self::Copy(copy::CopyPass::new(desc.clone())),
            CompositorPassDesc::GenerateMipmaps(desc) => {
                Self::GenerateMipmaps(mipmaps::GenerateMipmapsPass::new(desc.clone()))
            }
            CompositorPassDesc::DebugGui => Self::DebugGui(debug_gui::DebugGuiPass),
        })
    }

    /// Records this pass's commands for the current frame.
    pub fn fill_command_buffer(
        &mut self,
        ctx: &mut PassContext<'_, '_>,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        match self {
            Self::Scene(pass) => pass.fill_command_buffer(ctx, commands),
            Self::ShadowMap(pass) => pass.fill_command_buffer(ctx, commands),
            Self::Compute(pass) => pass.fill_command_buffer(ctx, commands),
            Self::Copy(pass) => pass.fill_command_buffer(ctx, commands),
            Self::GenerateMipmaps(pass) => pass.fill_command_buffer(ctx, commands),
            Self::DebugGui(pass) => pass.fill_command_buffer(ctx, commands),
        }
    }
}

/// Substitutes blueprint property values into WGSL source tokens.
///
/// Numeric/boolean properties become compile-time constants; the token
/// names are part of the blueprint authoring contract, keyed by the same
/// hashed property names the pass-side setters use.
#[must_use]
pub fn apply_blueprint_properties(source: &str, properties: &MaterialProperties) -> String {
    let mut out = source.to_string();
    if let Some(value) = properties.get(property::NUMBER_OF_MULTISAMPLES) {
        let n = match value {
            PropertyValue::Integer(v) => v.max(1),
            PropertyValue::Float(v) => v.max(1.0) as i32,
            _ => 1,
        };
        out = out.replace("%NUMBER_OF_MULTISAMPLES%", &n.to_string());
    }
    if let Some(value) = properties.get(property::VERTICAL_BLUR) {
        let flag = matches!(
            value,
            PropertyValue::Boolean(true) | PropertyValue::Integer(1..)
        );
        out = out.replace("%VERTICAL_BLUR%", if flag { "true" } else { "false" });
    }
    out
}

/// Shared handle alias for blueprint lookups.
pub type BlueprintHandle = Arc<crate::material::MaterialBlueprint>;
