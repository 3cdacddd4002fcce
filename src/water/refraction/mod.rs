//! Refraction views of the scene, one from each side of the water.
//!
//! Each view is a camera that copies the main camera every frame, swaps
//! its projection for an oblique one clipped at the water surface and
//! renders into its own texture. The surface material samples that texture
//! through the view's texture matrix.

pub mod clip_plane;
pub mod oblique;
pub mod renderer;
pub mod texture_matrix;

pub use clip_plane::ClipPlane;
pub use oblique::{ObliqueProjection, oblique_clip_from_view};
pub use renderer::{
    RefractionPlugin, RefractionSide, RefractionTargets, RefractionView, WaterViewer,
};
pub use texture_matrix::{TEXTURE_BIAS, texture_matrix};
