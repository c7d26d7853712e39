//! Dynamic rendering attachments (Vulkan 1.3).
//!
//! Each pass describes its targets with [`ColorAttachment`] and
//! [`DepthAttachment`], collects them in a [`RenderingConfig`] and hands the
//! built [`RenderingInfoBundle`] to `CommandBuffer::begin_rendering`.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use ember_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//! use ember_rhi::command::CommandBuffer;
//!
//! # fn example(draw_view: vk::ImageView, depth_view: vk::ImageView, cmd: &CommandBuffer) {
//! let bundle = RenderingConfig::new(vk::Extent2D { width: 1280, height: 720 })
//!     .with_color(ColorAttachment::new(draw_view))
//!     .with_depth(DepthAttachment::new(depth_view).with_clear_depth(1.0))
//!     .build();
//! cmd.begin_rendering(&bundle.info());
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// Color target. Loads existing contents unless a clear color is set.
#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment {
    view: vk::ImageView,
    layout: vk::ImageLayout,
    clear: Option<[f32; 4]>,
}

impl ColorAttachment {
    pub fn new(view: vk::ImageView) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            clear: None,
        }
    }

    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear = Some(color);
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let (load_op, clear_value) = match self.clear {
            Some(color) => (
                vk::AttachmentLoadOp::CLEAR,
                vk::ClearValue {
                    color: vk::ClearColorValue { float32: color },
                },
            ),
            None => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
        };
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear_value)
    }
}

/// Depth target. Cleared to the configured depth (0.0 by default) and stored.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    view: vk::ImageView,
    layout: vk::ImageLayout,
    clear_depth: f32,
}

impl DepthAttachment {
    pub fn new(view: vk::ImageView) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            clear_depth: 0.0,
        }
    }

    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Render area plus attachments for one `vkCmdBeginRendering`.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    extent: vk::Extent2D,
    color: Option<ColorAttachment>,
    depth: Option<DepthAttachment>,
}

impl RenderingConfig {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            extent,
            color: None,
            depth: None,
        }
    }

    pub fn with_color(mut self, attachment: ColorAttachment) -> Self {
        self.color = Some(attachment);
        self
    }

    pub fn with_depth(mut self, attachment: DepthAttachment) -> Self {
        self.depth = Some(attachment);
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            color_attachments: self
                .color
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            depth_attachment: self.depth.map(|d| d.to_rendering_attachment_info()),
            render_area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.extent,
            },
        }
    }
}

/// Owns the attachment infos a `vk::RenderingInfo` points at.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);
        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }
        info
    }

    #[inline]
    pub fn color_attachment_count(&self) -> usize {
        self.color_attachments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_attachment_loads_by_default() {
        let info = ColorAttachment::new(vk::ImageView::null()).to_rendering_attachment_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(info.image_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_color_attachment_clear() {
        let info = ColorAttachment::new(vk::ImageView::null())
            .with_clear_color([0.0, 0.0, 0.0, 1.0])
            .with_layout(vk::ImageLayout::GENERAL)
            .to_rendering_attachment_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.image_layout, vk::ImageLayout::GENERAL);
        assert_eq!(unsafe { info.clear_value.color.float32 }, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_depth_attachment_clears() {
        let info = DepthAttachment::new(vk::ImageView::null())
            .with_clear_depth(1.0)
            .to_rendering_attachment_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.image_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(unsafe { info.clear_value.depth_stencil.depth }, 1.0);
    }

    #[test]
    fn test_depth_only_config() {
        let extent = vk::Extent2D {
            width: 2048,
            height: 2048,
        };
        let bundle = RenderingConfig::new(extent)
            .with_depth(DepthAttachment::new(vk::ImageView::null()))
            .build();
        assert_eq!(bundle.color_attachment_count(), 0);
        let info = bundle.info();
        assert_eq!(info.render_area.extent, extent);
        assert_eq!(info.color_attachment_count, 0);
        assert!(!info.p_depth_attachment.is_null());
    }
}
