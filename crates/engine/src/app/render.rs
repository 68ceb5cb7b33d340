use super::{ResourceHandle, TextureData, Transform};

/// Sub-rectangle of a texture, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDraw<'a> {
    pub handle: ResourceHandle,
    pub texture: &'a TextureData,
    pub source: Option<SourceRect>,
    pub dest: Transform,
    pub layer: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct DialogueView<'a> {
    pub line: &'a str,
    pub line_index: usize,
    pub line_count: usize,
    pub background: Option<&'a TextureData>,
}

/// Layer assigned to scene backgrounds, below every entity.
pub const BACKGROUND_LAYER: i32 = i32::MIN;

/// Drawing backend. Calls arrive as begin, draws in final order, end.
pub trait RenderTarget {
    fn begin_frame(&mut self);

    fn draw_texture(&mut self, draw: &TextureDraw<'_>);

    fn draw_dialogue(&mut self, _view: &DialogueView<'_>) {}

    fn end_frame(&mut self);
}
