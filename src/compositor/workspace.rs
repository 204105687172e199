//! Compositor Workspace Instance
//!
//! The live realization of a resource graph for one workspace: nodes,
//! targets and passes materialized with their GPU state, executed in the
//! fixed sequence baked into the resource graph. One frame's execution
//! records a single command buffer; submission is the caller's move.

use std::sync::Arc;

use crate::compositor::desc::{CompositorTargetDesc, CompositorWorkspaceDesc};
use crate::compositor::passes::{PassInstance, ShadowMapPass, ShadowPassData};
use crate::errors::Result;
use crate::material::MaterialBlueprintLibrary;
use crate::rhi::{Attachment, CommandBuffer, FramebufferDesc, RhiDevice, RhiFramebuffer, RhiTexture};
use crate::scene::FrameScene;
use crate::texture::TextureResourceManager;

/// Per-frame outputs passes leave for later passes in the same frame.
#[derive(Default)]
pub struct FramePassData {
    pub shadow: Option<ShadowPassData>,
}

/// Construction-time context for materializing pass instances.
pub struct InstanceContext<'a> {
    pub device: &'a Arc<dyn RhiDevice>,
    pub textures: &'a mut TextureResourceManager,
    pub blueprints: &'a MaterialBlueprintLibrary,
}

/// Frame-time context handed to every pass while recording.
pub struct PassContext<'a, 'b> {
    pub device: &'a Arc<dyn RhiDevice>,
    pub textures: &'a mut TextureResourceManager,
    pub blueprints: &'a MaterialBlueprintLibrary,
    pub scene: &'a FrameScene<'b>,
    pub stereo_instancing: bool,
    pub pass_data: &'a mut FramePassData,
    /// The enclosing target's framebuffer, when it names a render target.
    pub target_framebuffer: Option<RhiFramebuffer>,
}

/// Caller-assembled inputs for one frame.
pub struct FrameContext<'a, 'b> {
    pub textures: &'a mut TextureResourceManager,
    pub blueprints: &'a MaterialBlueprintLibrary,
    pub scene: FrameScene<'b>,
    /// Single-pass stereo halves the effective render-target width in
    /// per-texel computations.
    pub stereo_instancing: bool,
}

struct NodeInstance {
    targets: Vec<TargetInstance>,
}

struct TargetInstance {
    desc: CompositorTargetDesc,
    /// Cached (source texture, framebuffer) pair; rebuilt when the
    /// resolved texture allocation changes.
    framebuffer: Option<(RhiTexture, RhiFramebuffer)>,
    passes: Vec<PassInstance>,
}

impl TargetInstance {
    fn ensure_framebuffer(
        &mut self,
        device: &Arc<dyn RhiDevice>,
        textures: &TextureResourceManager,
    ) -> Result<Option<RhiFramebuffer>> {
        let Some(asset_id) = self.desc.render_target else {
            return Ok(None);
        };
        let Some(texture) = textures.texture_by_asset_id(asset_id) else {
            // Transient unavailability: the target's texture is still
            // streaming. The passes skip this frame.
            log::debug!("render target {asset_id:?} not resolvable yet");
            self.framebuffer = None;
            return Ok(None);
        };

        let up_to_date = self
            .framebuffer
            .as_ref()
            .is_some_and(|(cached, _)| cached.same_allocation(texture));
        if !up_to_date {
            let framebuffer = device.create_framebuffer(&FramebufferDesc {
                label: format!("Target {asset_id:?}"),
                color: Some(Attachment::base(texture.clone())),
                depth: None,
            })?;
            self.framebuffer = Some((texture.clone(), framebuffer));
        }
        Ok(self.framebuffer.as_ref().map(|(_, fb)| fb.clone()))
    }
}

/// Live workspace: owns the cross-node render-target chain and executes
/// the full node sequence once per frame.
pub struct CompositorWorkspace {
    desc: Arc<CompositorWorkspaceDesc>,
    nodes: Vec<NodeInstance>,
    pass_data: FramePassData,
}

impl CompositorWorkspace {
    /// Materializes the instance graph. Pass-owned render targets (the
    /// shadow chain) are created here and recreated later only when
    /// their settings change.
    pub fn new(
        desc: Arc<CompositorWorkspaceDesc>,
        textures: &mut TextureResourceManager,
        blueprints: &MaterialBlueprintLibrary,
    ) -> Result<Self> {
        let device = Arc::clone(textures.device());
        let mut ctx = InstanceContext {
            device: &device,
            textures,
            blueprints,
        };

        let mut nodes = Vec::with_capacity(desc.nodes.len());
        for node_desc in &desc.nodes {
            let mut targets = Vec::with_capacity(node_desc.targets.len());
            for target_desc in &node_desc.targets {
                let mut passes = Vec::with_capacity(target_desc.passes.len());
                for pass_desc in &target_desc.passes {
                    passes.push(PassInstance::new(pass_desc, &mut ctx)?);
                }
                targets.push(TargetInstance {
                    desc: target_desc.clone(),
                    framebuffer: None,
                    passes,
                });
            }
            nodes.push(NodeInstance { targets });
        }

        Ok(Self {
            desc,
            nodes,
            pass_data: FramePassData::default(),
        })
    }

    /// Records the full node sequence for one frame into a command
    /// buffer. Nodes execute in resource-graph order; nothing reorders
    /// across frames.
    pub fn execute(&mut self, ctx: &mut FrameContext<'_, '_>) -> Result<CommandBuffer> {
        let mut commands = CommandBuffer::new();
        self.pass_data = FramePassData::default();
        let device = Arc::clone(ctx.textures.device());

        for node in &mut self.nodes {
            for target in &mut node.targets {
                let framebuffer = target.ensure_framebuffer(&device, ctx.textures)?;
                for pass in &mut target.passes {
                    let mut pass_ctx = PassContext {
                        device: &device,
                        textures: &mut *ctx.textures,
                        blueprints: ctx.blueprints,
                        scene: &ctx.scene,
                        stereo_instancing: ctx.stereo_instancing,
                        pass_data: &mut self.pass_data,
                        target_framebuffer: framebuffer.clone(),
                    };
                    pass.fill_command_buffer(&mut pass_ctx, &mut commands)?;
                }
            }
        }
        Ok(commands)
    }

    /// Convenience wrapper: record and submit in one step.
    pub fn execute_and_submit(&mut self, ctx: &mut FrameContext<'_, '_>) -> Result<()> {
        let device = Arc::clone(ctx.textures.device());
        let commands = self.execute(ctx)?;
        device.submit(&commands)
    }

    /// The previous frame's shadow output, if a shadow pass ran.
    #[must_use]
    pub fn shadow_pass_data(&self) -> Option<&ShadowPassData> {
        self.pass_data.shadow.as_ref()
    }

    /// Mutable access to the first shadow pass instance, for settings
    /// mutation between frames.
    pub fn shadow_pass_mut(&mut self) -> Option<&mut ShadowMapPass> {
        for node in &mut self.nodes {
            for target in &mut node.targets {
                for pass in &mut target.passes {
                    if let PassInstance::ShadowMap(shadow) = pass {
                        return Some(shadow);
                    }
                }
            }
        }
        None
    }

    #[must_use]
    pub fn desc(&self) -> &Arc<CompositorWorkspaceDesc> {
        &self.desc
    }
}
