//! Render Queue
//!
//! A flat list of queued draws one pass fills, sorts and records. Entries
//! are plain ids and counts; they must not outlive the frame that filled
//! them, so owning passes clear their queue as soon as the recording is
//! done.

use crate::material::RenderableKey;
use crate::rhi::CommandBuffer;
use crate::scene::FrameScene;

#[derive(Debug, Clone, Copy)]
pub struct QueuedRenderable {
    pub key: RenderableKey,
    pub sort_key: u32,
    pub vertex_count: u32,
    pub instance_count: u32,
}

/// Per-pass draw list.
#[derive(Default)]
pub struct RenderQueue {
    entries: Vec<QueuedRenderable>,
}

impl RenderQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues every renderable whose cached queue index falls in
    /// `min..=max`, optionally restricted to shadow casters.
    pub fn add_renderables_from_range(
        &mut self,
        scene: &FrameScene<'_>,
        minimum_render_queue_index: u8,
        maximum_render_queue_index: u8,
        shadow_casters_only: bool,
    ) {
        for (key, renderable) in scene
            .renderables
            .iter_queue_range(minimum_render_queue_index, maximum_render_queue_index)
        {
            if shadow_casters_only && !renderable.casts_shadows() {
                continue;
            }
            let range = renderable.draw_range();
            self.entries.push(QueuedRenderable {
                key,
                sort_key: u32::from(renderable.render_queue_index()),
                vertex_count: range.end.saturating_sub(range.start),
                instance_count: 1,
            });
        }
    }

    /// Stable sort by queue bucket.
    pub fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.sort_key);
    }

    /// Records one draw per entry. The bound pipeline and render pass
    /// are the caller's responsibility.
    pub fn record_draws(&self, commands: &mut CommandBuffer) {
        for entry in &self.entries {
            if entry.vertex_count > 0 {
                commands.draw(entry.vertex_count, entry.instance_count);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[QueuedRenderable] {
        &self.entries
    }
}
