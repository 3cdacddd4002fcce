use thiserror::Error;

/// Everything that can stop the water pipeline from coming up.
///
/// Numerical edge cases (zero-radius drops, a level outside the sphere) are
/// clamped where they happen and never surface here.
#[derive(Error, Debug)]
pub enum WaterError {
    #[error("Invalid water config: {0}")]
    InvalidConfig(String),

    #[error("Cannot allocate {what} ({width}x{height})")]
    Allocation {
        what: &'static str,
        width: u32,
        height: u32,
    },

    #[error("Pipeline '{pass}' failed: {reason}")]
    PipelineFailed { pass: &'static str, reason: String },

    #[error("Mesh generation failed: {0}")]
    Mesh(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
