//! Views: viewport, clear, camera matrices and draw ordering.

use glam::{Mat4, Vec2, Vec3};

use crate::handle::FramebufferHandle;
use crate::sortkey::DrawOrder;
use crate::types::{BackbufferRatio, ClearFlags, Rect, Resolution};

/// How draws inside a view are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    /// Opaque before blended, then by program and depth.
    #[default]
    Default,
    /// Submission order.
    Sequential,
    /// Front to back by depth.
    DepthAscending,
    /// Back to front by depth.
    DepthDescending,
}

impl ViewMode {
    /// Sort payload for a draw submitted to a view in this mode.
    #[must_use]
    pub const fn draw_order(self, blend_class: u8, depth: u32, seq: u32) -> DrawOrder {
        match self {
            Self::Default => DrawOrder::Default { blend: blend_class, depth },
            Self::Sequential => DrawOrder::Sequential { seq },
            Self::DepthAscending => DrawOrder::DepthAscending { depth },
            Self::DepthDescending => DrawOrder::DepthDescending { depth },
        }
    }
}

/// What a view clears before its first item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewClear {
    /// Buffers to clear or discard.
    pub flags: ClearFlags,
    /// Clear color as `0xRRGGBBAA`.
    pub color: u32,
    /// Clear depth.
    pub depth: f32,
    /// Clear stencil.
    pub stencil: u8,
}

impl Default for ViewClear {
    fn default() -> Self {
        Self { flags: ClearFlags::empty(), color: 0x0000_00ff, depth: 1.0, stencil: 0 }
    }
}

impl ViewClear {
    /// Clear color as normalized RGBA.
    #[must_use]
    pub fn color_rgba(&self) -> [f32; 4] {
        let [r, g, b, a] = self.color.to_be_bytes();
        [r, g, b, a].map(|c| f32::from(c) / 255.0)
    }

    /// Returns true if the view clears any buffer.
    #[must_use]
    pub const fn clears_anything(&self) -> bool {
        self.flags.intersects(
            ClearFlags::COLOR.union(ClearFlags::DEPTH).union(ClearFlags::STENCIL),
        )
    }
}

/// One view's state, snapshotted into every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    /// Viewport. Width and height are recomputed from `ratio` when set.
    pub rect: Rect,
    /// Viewport size relative to the backbuffer.
    pub ratio: Option<BackbufferRatio>,
    /// Scissor, zero sized when unused.
    pub scissor: Rect,
    /// Clear parameters.
    pub clear: ViewClear,
    /// View matrix.
    pub view: Mat4,
    /// Projection matrix.
    pub projection: Mat4,
    /// Draw ordering.
    pub mode: ViewMode,
    /// Render target, invalid for the backbuffer.
    pub framebuffer: FramebufferHandle,
}

impl Default for View {
    /// Full backbuffer, no clear, identity matrices.
    fn default() -> Self {
        Self {
            rect: Rect::default(),
            ratio: Some(BackbufferRatio::Equal),
            scissor: Rect::default(),
            clear: ViewClear::default(),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            mode: ViewMode::Default,
            framebuffer: FramebufferHandle::INVALID,
        }
    }
}

impl View {
    /// Copy with a ratio-sized viewport resolved against `resolution`.
    #[must_use]
    pub fn resolved(&self, resolution: Resolution) -> Self {
        let mut view = *self;
        if let Some(ratio) = self.ratio {
            let (width, height) = ratio.apply(resolution);
            view.rect.width = width.min(u32::from(u16::MAX)) as u16;
            view.rect.height = height.min(u32::from(u16::MAX)) as u16;
        }
        view
    }

    /// Projection times view.
    #[inline]
    #[must_use]
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Window coordinates to normalized device coordinates.
    #[must_use]
    pub fn screen_to_clip(&self, x: f32, y: f32) -> Vec2 {
        let w = f32::from(self.rect.width.max(1));
        let h = f32::from(self.rect.height.max(1));
        let nx = (x - f32::from(self.rect.x)) / w * 2.0 - 1.0;
        let ny = 1.0 - (y - f32::from(self.rect.y)) / h * 2.0;
        Vec2::new(nx, ny)
    }

    /// Window coordinates at NDC depth `z` to world space.
    #[must_use]
    pub fn screen_to_world(&self, x: f32, y: f32, z: f32) -> Vec3 {
        let clip = self.screen_to_clip(x, y);
        self.view_proj().inverse().project_point3(clip.extend(z))
    }

    /// Normalized world-space ray direction through a window position.
    #[must_use]
    pub fn screen_to_world_dir(&self, x: f32, y: f32) -> Vec3 {
        let near = self.screen_to_world(x, y, -1.0);
        let far = self.screen_to_world(x, y, 1.0);
        (far - near).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> View {
        View { rect: Rect::new(0, 0, 200, 100), ratio: None, ..View::default() }
    }

    #[test]
    fn test_screen_to_clip_corners() {
        let view = viewport();
        assert_eq!(view.screen_to_clip(0.0, 0.0), Vec2::new(-1.0, 1.0));
        assert_eq!(view.screen_to_clip(200.0, 100.0), Vec2::new(1.0, -1.0));
        assert_eq!(view.screen_to_clip(100.0, 50.0), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_screen_to_world_identity() {
        let view = viewport();
        let p = view.screen_to_world(100.0, 50.0, 0.5);
        assert!((p - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-5);
    }

    #[test]
    fn test_ray_through_center_looks_forward() {
        let mut view = viewport();
        view.view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        view.projection = Mat4::perspective_rh_gl(1.0, 2.0, 0.1, 100.0);
        let dir = view.screen_to_world_dir(100.0, 50.0);
        assert!((dir - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn test_ratio_resolves_rect() {
        let view = View { ratio: Some(BackbufferRatio::Half), ..View::default() };
        let resolved = view.resolved(Resolution { width: 800, height: 600 });
        assert_eq!((resolved.rect.width, resolved.rect.height), (400, 300));
    }

    #[test]
    fn test_clear_color() {
        let clear = ViewClear { color: 0xff00_80ff, ..ViewClear::default() };
        let [r, g, b, a] = clear.color_rgba();
        assert_eq!((r, g, a), (1.0, 0.0, 1.0));
        assert!((b - 128.0 / 255.0).abs() < 1e-6);
        assert!(!clear.clears_anything());
    }
}
