use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use tracing::warn;
use winit::window::Window;

use crate::app::{DialogueView, RenderTarget, SourceRect, TextureData, TextureDraw, Vec2};

use super::text::{draw_text_clipped, glyph_advance, line_advance, wrap_text};
use super::Viewport;

const CLEAR_COLOR: [u8; 4] = [12, 10, 18, 255];
const LETTERBOX_COLOR: [u8; 4] = [0, 0, 0, 255];
const DIALOGUE_PANEL_COLOR: [u8; 4] = [10, 12, 16, 215];
const DIALOGUE_BORDER_COLOR: [u8; 4] = [140, 118, 86, 255];
const DIALOGUE_TEXT_COLOR: [u8; 4] = [244, 238, 222, 255];
const DIALOGUE_HINT_COLOR: [u8; 4] = [176, 160, 128, 255];
const DIALOGUE_PANEL_HEIGHT_FRACTION: f32 = 0.28;
const DIALOGUE_PANEL_MARGIN_PX: i32 = 24;
const DIALOGUE_TEXT_SCALE: i32 = 4;
const DIALOGUE_HINT_SCALE: i32 = 2;

/// Screen-space destination rectangle in pixels, before rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScreenRect {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) width: f32,
    pub(crate) height: f32,
}

/// `pixels` framebuffer backend. The world is letterboxed into the window.
pub struct FrameRenderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
    world_size: Vec2,
    presented_frames: u64,
}

impl FrameRenderer {
    pub fn new(window: Arc<Window>, world_size: Vec2) -> Result<Self, Error> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);
        let pixels = Self::build_pixels(Arc::clone(&window), width, height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport::fit(world_size, width, height),
            world_size,
            presented_frames: 0,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport::fit(self.world_size, width, height);
        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn presented_frames(&self) -> u64 {
        self.presented_frames
    }

    /// Pushes the finished frame to the window surface.
    pub fn present(&mut self) -> Result<(), Error> {
        self.pixels.render()?;
        self.presented_frames = self.presented_frames.saturating_add(1);
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }
}

impl RenderTarget for FrameRenderer {
    fn begin_frame(&mut self) {
        let viewport = self.viewport;
        clear_with_letterbox(self.pixels.frame_mut(), viewport);
    }

    fn draw_texture(&mut self, draw: &TextureDraw<'_>) {
        let viewport = self.viewport;
        let extent = draw.dest.extent();
        let top_left = viewport.world_to_screen(draw.dest.position);
        let dest = ScreenRect {
            x: top_left.x,
            y: top_left.y,
            width: extent.x * viewport.scale,
            height: extent.y * viewport.scale,
        };
        let source = draw.source.unwrap_or(SourceRect {
            x: 0,
            y: 0,
            width: draw.texture.width,
            height: draw.texture.height,
        });
        if !blit_texture(
            self.pixels.frame_mut(),
            viewport.width,
            viewport.height,
            draw.texture,
            source,
            dest,
            draw.dest.rotation_degrees,
        ) {
            warn!(handle = %draw.handle, "renderer_texture_skipped");
        }
    }

    fn draw_dialogue(&mut self, view: &DialogueView<'_>) {
        let viewport = self.viewport;
        draw_dialogue_overlay(self.pixels.frame_mut(), viewport, view);
    }

    fn end_frame(&mut self) {}
}

fn clear_with_letterbox(frame: &mut [u8], viewport: Viewport) {
    let width = viewport.width as i32;
    let height = viewport.height as i32;
    fill_rect_clipped(frame, viewport.width, viewport.height, 0, 0, width, height, LETTERBOX_COLOR);
    fill_rect_clipped(
        frame,
        viewport.width,
        viewport.height,
        viewport.offset.x.round() as i32,
        viewport.offset.y.round() as i32,
        (width as f32 - viewport.offset.x * 2.0).round() as i32,
        (height as f32 - viewport.offset.y * 2.0).round() as i32,
        CLEAR_COLOR,
    );
}

fn draw_dialogue_overlay(frame: &mut [u8], viewport: Viewport, view: &DialogueView<'_>) {
    let width = viewport.width;
    let height = viewport.height;
    if let Some(background) = view.background {
        blit_texture(
            frame,
            width,
            height,
            background,
            SourceRect {
                x: 0,
                y: 0,
                width: background.width,
                height: background.height,
            },
            ScreenRect {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
            },
            0.0,
        );
    }

    let panel_height = (height as f32 * DIALOGUE_PANEL_HEIGHT_FRACTION) as i32;
    let panel_x = DIALOGUE_PANEL_MARGIN_PX;
    let panel_y = height as i32 - panel_height - DIALOGUE_PANEL_MARGIN_PX;
    let panel_width = width as i32 - DIALOGUE_PANEL_MARGIN_PX * 2;
    blend_rect_clipped(
        frame,
        width,
        height,
        panel_x,
        panel_y,
        panel_width,
        panel_height,
        DIALOGUE_PANEL_COLOR,
    );
    outline_rect_clipped(
        frame,
        width,
        height,
        panel_x,
        panel_y,
        panel_width,
        panel_height,
        DIALOGUE_BORDER_COLOR,
    );

    let inset = DIALOGUE_PANEL_MARGIN_PX;
    let text_width = panel_width - inset * 2;
    let max_chars = (text_width / glyph_advance(DIALOGUE_TEXT_SCALE)).max(1) as usize;
    let mut y = panel_y + inset;
    for line in wrap_text(view.line, max_chars) {
        if y + line_advance(DIALOGUE_TEXT_SCALE) > panel_y + panel_height {
            break;
        }
        draw_text_clipped(
            frame,
            width,
            height,
            panel_x + inset,
            y,
            &line,
            DIALOGUE_TEXT_SCALE,
            DIALOGUE_TEXT_COLOR,
        );
        y += line_advance(DIALOGUE_TEXT_SCALE);
    }

    let hint = format!("{}/{}  enter", view.line_index + 1, view.line_count);
    let hint_width = hint.chars().count() as i32 * glyph_advance(DIALOGUE_HINT_SCALE);
    draw_text_clipped(
        frame,
        width,
        height,
        panel_x + panel_width - inset - hint_width,
        panel_y + panel_height - inset,
        &hint,
        DIALOGUE_HINT_SCALE,
        DIALOGUE_HINT_COLOR,
    );
}

/// Nearest-neighbour blit of `source` into `dest`, rotated about the rect centre. Texels with
/// zero alpha are skipped. Returns false when the source rect lies outside the texture.
pub(crate) fn blit_texture(
    frame: &mut [u8],
    width: u32,
    height: u32,
    texture: &TextureData,
    source: SourceRect,
    dest: ScreenRect,
    rotation_degrees: f32,
) -> bool {
    let expected_len = texture.width as usize * texture.height as usize * 4;
    if texture.rgba.len() < expected_len
        || source.width == 0
        || source.height == 0
        || source.x.saturating_add(source.width) > texture.width
        || source.y.saturating_add(source.height) > texture.height
    {
        return false;
    }
    if dest.width <= 0.0 || dest.height <= 0.0 || width == 0 || height == 0 {
        return true;
    }

    let center_x = dest.x + dest.width * 0.5;
    let center_y = dest.y + dest.height * 0.5;
    let radians = rotation_degrees.to_radians();
    let (sin, cos) = radians.sin_cos();

    let half_w = dest.width * 0.5;
    let half_h = dest.height * 0.5;
    let reach_x = half_w * cos.abs() + half_h * sin.abs();
    let reach_y = half_w * sin.abs() + half_h * cos.abs();
    let left = ((center_x - reach_x).floor() as i32).max(0);
    let top = ((center_y - reach_y).floor() as i32).max(0);
    let right = ((center_x + reach_x).ceil() as i32).min(width as i32);
    let bottom = ((center_y + reach_y).ceil() as i32).min(height as i32);
    if left >= right || top >= bottom {
        return true;
    }

    let frame_width = width as usize;
    let texture_width = texture.width as usize;
    for out_y in top..bottom {
        let dy = out_y as f32 + 0.5 - center_y;
        for out_x in left..right {
            let dx = out_x as f32 + 0.5 - center_x;
            let local_x = dx * cos + dy * sin + half_w;
            let local_y = -dx * sin + dy * cos + half_h;
            if local_x < 0.0 || local_y < 0.0 || local_x >= dest.width || local_y >= dest.height {
                continue;
            }

            let u = ((local_x / dest.width) * source.width as f32) as u32;
            let v = ((local_y / dest.height) * source.height as f32) as u32;
            let src_x = source.x + u.min(source.width - 1);
            let src_y = source.y + v.min(source.height - 1);
            let src = (src_y as usize * texture_width + src_x as usize) * 4;
            let alpha = texture.rgba[src + 3];
            if alpha == 0 {
                continue;
            }
            let dst = (out_y as usize * frame_width + out_x as usize) * 4;
            let Some(pixel) = frame.get_mut(dst..dst + 4) else {
                continue;
            };
            pixel.copy_from_slice(&texture.rgba[src..src + 4]);
        }
    }
    true
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn fill_rect_clipped(
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    rect_width: i32,
    rect_height: i32,
    color: [u8; 4],
) {
    let start_x = x.max(0);
    let start_y = y.max(0);
    let end_x = x.saturating_add(rect_width).min(width as i32);
    let end_y = y.saturating_add(rect_height).min(height as i32);
    if end_x <= start_x || end_y <= start_y {
        return;
    }
    for py in start_y..end_y {
        for px in start_x..end_x {
            write_pixel_rgba_clipped(frame, width as usize, px, py, color);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn blend_rect_clipped(
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    rect_width: i32,
    rect_height: i32,
    color: [u8; 4],
) {
    let start_x = x.max(0);
    let start_y = y.max(0);
    let end_x = x.saturating_add(rect_width).min(width as i32);
    let end_y = y.saturating_add(rect_height).min(height as i32);
    let alpha = color[3] as u16;
    for py in start_y..end_y {
        for px in start_x..end_x {
            let offset = (py as usize * width as usize + px as usize) * 4;
            let Some(pixel) = frame.get_mut(offset..offset + 4) else {
                continue;
            };
            for channel in 0..3 {
                let blended =
                    (color[channel] as u16 * alpha + pixel[channel] as u16 * (255 - alpha)) / 255;
                pixel[channel] = blended as u8;
            }
            pixel[3] = 255;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn outline_rect_clipped(
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    rect_width: i32,
    rect_height: i32,
    color: [u8; 4],
) {
    if rect_width <= 1 || rect_height <= 1 {
        return;
    }
    fill_rect_clipped(frame, width, height, x, y, rect_width, 2, color);
    fill_rect_clipped(frame, width, height, x, y + rect_height - 2, rect_width, 2, color);
    fill_rect_clipped(frame, width, height, x, y, 2, rect_height, color);
    fill_rect_clipped(frame, width, height, x + rect_width - 2, y, 2, rect_height, color);
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];
    const CLEAR: [u8; 4] = [0, 0, 0, 0];

    fn pixel(frame: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * width + x) * 4) as usize;
        [
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]
    }

    /// Left column red, right column blue.
    fn two_tone() -> TextureData {
        TextureData {
            width: 2,
            height: 1,
            rgba: [RED, BLUE].concat(),
        }
    }

    fn full(texture: &TextureData) -> SourceRect {
        SourceRect {
            x: 0,
            y: 0,
            width: texture.width,
            height: texture.height,
        }
    }

    fn rect(x: f32, y: f32, width: f32, height: f32) -> ScreenRect {
        ScreenRect {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn blit_scales_to_destination() {
        let texture = two_tone();
        let mut frame = vec![0u8; 8 * 4 * 4];

        assert!(blit_texture(
            &mut frame,
            8,
            4,
            &texture,
            full(&texture),
            rect(0.0, 0.0, 8.0, 4.0),
            0.0
        ));

        assert_eq!(pixel(&frame, 8, 0, 0), RED);
        assert_eq!(pixel(&frame, 8, 3, 3), RED);
        assert_eq!(pixel(&frame, 8, 4, 0), BLUE);
        assert_eq!(pixel(&frame, 8, 7, 3), BLUE);
    }

    #[test]
    fn half_turn_mirrors_the_texture() {
        let texture = two_tone();
        let mut frame = vec![0u8; 4 * 2 * 4];

        blit_texture(
            &mut frame,
            4,
            2,
            &texture,
            full(&texture),
            rect(0.0, 0.0, 4.0, 2.0),
            180.0,
        );

        assert_eq!(pixel(&frame, 4, 0, 0), BLUE);
        assert_eq!(pixel(&frame, 4, 3, 1), RED);
    }

    #[test]
    fn transparent_texels_keep_the_frame() {
        let texture = TextureData {
            width: 2,
            height: 1,
            rgba: [CLEAR, BLUE].concat(),
        };
        let mut frame = [RED, RED].concat();

        blit_texture(
            &mut frame,
            2,
            1,
            &texture,
            full(&texture),
            rect(0.0, 0.0, 2.0, 1.0),
            0.0,
        );

        assert_eq!(pixel(&frame, 2, 0, 0), RED);
        assert_eq!(pixel(&frame, 2, 1, 0), BLUE);
    }

    #[test]
    fn source_rect_selects_a_region() {
        let texture = two_tone();
        let mut frame = vec![0u8; 2 * 2 * 4];

        blit_texture(
            &mut frame,
            2,
            2,
            &texture,
            SourceRect {
                x: 1,
                y: 0,
                width: 1,
                height: 1,
            },
            rect(0.0, 0.0, 2.0, 2.0),
            0.0,
        );

        assert!(frame.chunks(4).all(|texel| texel == BLUE));
    }

    #[test]
    fn out_of_range_source_is_rejected() {
        let texture = two_tone();
        let mut frame = vec![0u8; 4 * 4];

        let drawn = blit_texture(
            &mut frame,
            2,
            2,
            &texture,
            SourceRect {
                x: 1,
                y: 0,
                width: 2,
                height: 1,
            },
            rect(0.0, 0.0, 2.0, 2.0),
            0.0,
        );

        assert!(!drawn);
        assert!(frame.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn offscreen_destination_is_clipped_without_panicking() {
        let texture = two_tone();
        let mut frame = vec![0u8; 4 * 4 * 4];

        for dest in [
            rect(-100.0, -100.0, 10.0, 10.0),
            rect(2.0, 2.0, 50.0, 50.0),
            rect(1000.0, 0.0, 4.0, 4.0),
        ] {
            blit_texture(&mut frame, 4, 4, &texture, full(&texture), dest, 37.0);
        }

        assert_eq!(frame.len(), 4 * 4 * 4);
    }

    #[test]
    fn letterbox_clear_paints_bars_and_world() {
        let viewport = Viewport::fit(Vec2::new(200.0, 100.0), 100, 100);
        let mut frame = vec![9u8; 100 * 100 * 4];

        clear_with_letterbox(&mut frame, viewport);

        assert_eq!(pixel(&frame, 100, 50, 5), LETTERBOX_COLOR);
        assert_eq!(pixel(&frame, 100, 50, 50), CLEAR_COLOR);
    }

    #[test]
    fn dialogue_overlay_draws_panel_over_background() {
        let background = TextureData::solid(2, 2, BLUE);
        let viewport = Viewport::fit(Vec2::new(320.0, 240.0), 320, 240);
        let mut frame = vec![0u8; 320 * 240 * 4];

        draw_dialogue_overlay(
            &mut frame,
            viewport,
            &DialogueView {
                line: "hello there",
                line_index: 0,
                line_count: 2,
                background: Some(&background),
            },
        );

        assert_eq!(pixel(&frame, 320, 5, 5), BLUE);
        assert_ne!(pixel(&frame, 320, 160, 200), BLUE);
    }
}
