use crate::app::Vec2;

/// Uniform world-to-window mapping. The world is scaled to fit and centred, letterboxed on the
/// long axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub offset: Vec2,
}

impl Viewport {
    pub fn fit(world_size: Vec2, width: u32, height: u32) -> Self {
        let scale = if world_size.x > 0.0 && world_size.y > 0.0 {
            (width as f32 / world_size.x).min(height as f32 / world_size.y)
        } else {
            1.0
        };
        let offset = Vec2::new(
            (width as f32 - world_size.x * scale) * 0.5,
            (height as f32 - world_size.y * scale) * 0.5,
        );
        Self {
            width,
            height,
            scale,
            offset,
        }
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        Vec2::new(
            world.x * self.scale + self.offset.x,
            world.y * self.scale + self.offset.y,
        )
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        Vec2::new(
            (screen.x - self.offset.x) / self.scale,
            (screen.y - self.offset.y) / self.scale,
        )
    }
}
