mod renderer;
mod text;
mod transform;

pub use renderer::FrameRenderer;
pub use transform::Viewport;
