use std::path::{Path, PathBuf};

use bevy::{
    prelude::*,
    render::{
        Render, RenderApp, RenderSet,
        extract_resource::{ExtractResource, ExtractResourcePlugin},
        render_asset::RenderAssets,
        render_resource::{
            BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Extent3d, MapMode,
            Origin3d, TexelCopyBufferInfo, TexelCopyBufferLayout, TexelCopyTextureInfo,
            TextureAspect,
        },
        renderer::{RenderDevice, RenderQueue},
        texture::GpuImage,
    },
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use half::f16;

use super::caustics::CausticsTarget;
use super::error::WaterError;
use super::simulation::HeightFieldTextures;

/// Both captured textures are `Rgba16Float`.
const BYTES_PER_TEXEL: u32 = 8;
/// Rows of a texture-to-buffer copy must start on this boundary.
const ROW_ALIGNMENT: u32 = 256;
/// Heights outside this range saturate in the PNG.
const HEIGHT_RANGE: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureKind {
    HeightField,
    Caustics,
}

impl CaptureKind {
    pub fn default_path(&self) -> &'static str {
        match self {
            CaptureKind::HeightField => "height_field.png",
            CaptureKind::Caustics => "caustics.png",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureRequest {
    pub id: u64,
    pub kind: CaptureKind,
    pub image: Handle<Image>,
    pub path: PathBuf,
}

/* ----------------------------- Resources ------------------------------ */

/// Captures asked for by the UI and not answered yet. Extracted to the
/// render world whenever it changes.
#[derive(Resource, Clone, Default, ExtractResource)]
pub struct CaptureQueue {
    pub pending: Vec<CaptureRequest>,
    next_id: u64,
}

impl CaptureQueue {
    pub fn request(&mut self, kind: CaptureKind, image: Handle<Image>, path: impl Into<PathBuf>) {
        self.next_id += 1;
        self.pending.push(CaptureRequest {
            id: self.next_id,
            kind,
            image,
            path: path.into(),
        });
        info!("{:?} capture requested.", kind);
    }

    pub fn is_pending(&self, kind: CaptureKind) -> bool {
        self.pending.iter().any(|request| request.kind == kind)
    }
}

/// Channel receiver in main world (readback bytes arrive here)
#[derive(Resource)]
pub struct CaptureReadbackChannel {
    pub rx: Receiver<CaptureMessage>,
}

/// Channel sender in render world
#[derive(Resource)]
pub struct CaptureReadbackSender {
    pub tx: Sender<CaptureMessage>,
}

/// Render-world bookkeeping so every request is copied once.
#[derive(Resource, Default)]
pub struct CaptureRenderState {
    pub last_submitted: u64,
}

/// Sent from the render world once the copy is mapped, rows already
/// de-padded.
pub struct CaptureMessage {
    pub id: u64,
    pub kind: CaptureKind,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub data: Result<Vec<u8>, String>,
}

/* ------------------------------- Plugin ------------------------------- */

pub struct CapturePlugin;

impl Plugin for CapturePlugin {
    fn build(&self, app: &mut App) {
        let (tx, rx) = unbounded::<CaptureMessage>();

        app.init_resource::<CaptureQueue>()
            .insert_resource(CaptureReadbackChannel { rx })
            .add_systems(Update, poll_captures_and_save);

        if app.get_sub_app(RenderApp).is_none() {
            return;
        }
        app.add_plugins(ExtractResourcePlugin::<CaptureQueue>::default());

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        render_app
            .insert_resource(CaptureReadbackSender { tx })
            .init_resource::<CaptureRenderState>()
            .add_systems(Render, queue_capture_readback.in_set(RenderSet::Cleanup));
    }
}

/// Queues a capture of the texture a `kind` refers to right now.
pub fn request_capture(
    queue: &mut CaptureQueue,
    kind: CaptureKind,
    textures: &HeightFieldTextures,
    caustics: &CausticsTarget,
) {
    let image = match kind {
        CaptureKind::HeightField => textures.current().clone(),
        CaptureKind::Caustics => caustics.image.clone(),
    };
    queue.request(kind, image, kind.default_path());
}

/* -------------------- Render World: Queue Readback -------------------- */

fn padded_bytes_per_row(width: u32) -> u32 {
    (width * BYTES_PER_TEXEL).div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
}

fn queue_capture_readback(
    mut render_state: ResMut<CaptureRenderState>,
    queue: Option<Res<CaptureQueue>>,
    gpu_images: Res<RenderAssets<GpuImage>>,
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
    sender: Res<CaptureReadbackSender>,
) {
    let Some(queue) = queue else { return };

    for request in &queue.pending {
        if request.id <= render_state.last_submitted {
            continue;
        }
        let Some(gpu_image) = gpu_images.get(&request.image) else {
            warn!("{:?} capture: image not on the GPU yet", request.kind);
            return;
        };

        let width = gpu_image.size.width;
        let height = gpu_image.size.height;
        let unpadded = width * BYTES_PER_TEXEL;
        let padded = padded_bytes_per_row(width);

        let buffer = render_device.create_buffer(&BufferDescriptor {
            label: Some("water_capture_readback_buffer"),
            size: (padded * height) as u64,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = render_device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("water_capture_copy_encoder"),
        });
        encoder.copy_texture_to_buffer(
            TexelCopyTextureInfo {
                texture: &gpu_image.texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            TexelCopyBufferInfo {
                buffer: &buffer,
                layout: TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        render_queue.submit(std::iter::once(encoder.finish()));

        let tx = sender.tx.clone();
        let (id, kind, path) = (request.id, request.kind, request.path.clone());
        let mapped = buffer.clone();
        buffer.slice(..).map_async(MapMode::Read, move |result| {
            let data = result.map_err(|e| e.to_string()).map(|()| {
                let view = mapped.slice(..).get_mapped_range();
                let rows = view
                    .chunks(padded as usize)
                    .take(height as usize)
                    .flat_map(|row| &row[..unpadded as usize])
                    .copied()
                    .collect();
                drop(view);
                mapped.unmap();
                rows
            });
            let _ = tx.send(CaptureMessage {
                id,
                kind,
                path,
                width,
                height,
                data,
            });
        });

        render_state.last_submitted = request.id;
        info!("Queued {:?} GPU readback.", request.kind);
    }
}

/* -------------------- Main World: Poll & Save PNG --------------------- */

fn poll_captures_and_save(channel: Res<CaptureReadbackChannel>, mut queue: ResMut<CaptureQueue>) {
    while let Ok(message) = channel.rx.try_recv() {
        queue.pending.retain(|request| request.id != message.id);

        let saved = message
            .data
            .map_err(WaterError::Capture)
            .and_then(|data| encode_texels(message.kind, message.width, message.height, &data))
            .and_then(|rgba| save_rgba_png(&message.path, message.width, message.height, rgba));
        match saved {
            Ok(()) => info!("{:?} saved: {}", message.kind, message.path.display()),
            Err(e) => error!("{:?} capture failed: {e}", message.kind),
        }
    }
}

/* ------------------------------- Helpers ------------------------------- */

fn to_byte(value: f32, low: f32, high: f32) -> u8 {
    (((value - low) / (high - low)).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Turns raw `Rgba16Float` texels into viewable RGBA8.
///
/// Height fields become `(height, normal.x, normal.z, 255)` with the height
/// mapped from `[-0.1, 0.1]` and the normal from `[-1, 1]`. Caustics become
/// `(intensity, coverage, 0, 255)`, both clamped to `[0, 1]`.
pub fn encode_texels(
    kind: CaptureKind,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<Vec<u8>, WaterError> {
    let expected = (width * height * BYTES_PER_TEXEL) as usize;
    if data.len() != expected {
        return Err(WaterError::Capture(format!(
            "expected {expected} bytes for {width}x{height}, got {}",
            data.len()
        )));
    }

    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for texel in data.chunks_exact(BYTES_PER_TEXEL as usize) {
        let channel = |i: usize| f16::from_le_bytes([texel[2 * i], texel[2 * i + 1]]).to_f32();
        let pixel = match kind {
            CaptureKind::HeightField => [
                to_byte(channel(0), -HEIGHT_RANGE, HEIGHT_RANGE),
                to_byte(channel(2), -1.0, 1.0),
                to_byte(channel(3), -1.0, 1.0),
                255,
            ],
            CaptureKind::Caustics => [
                to_byte(channel(0), 0.0, 1.0),
                to_byte(channel(1), 0.0, 1.0),
                0,
                255,
            ],
        };
        rgba.extend_from_slice(&pixel);
    }
    Ok(rgba)
}

fn save_rgba_png(path: &Path, w: u32, h: u32, bytes: Vec<u8>) -> Result<(), WaterError> {
    use image::{ImageBuffer, Rgba};
    let img: ImageBuffer<Rgba<u8>, _> = ImageBuffer::from_raw(w, h, bytes)
        .ok_or_else(|| WaterError::Capture("byte count does not match image size".into()))?;
    img.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(values: [f32; 4]) -> Vec<u8> {
        values
            .iter()
            .flat_map(|v| f16::from_f32(*v).to_le_bytes())
            .collect()
    }

    #[test]
    fn test_height_encoding() {
        let data: Vec<u8> = [
            [0.0, 0.0, 0.0, 0.0],
            [0.1, 0.3, 1.0, -1.0],
            [-0.5, 0.0, 0.0, 0.0],
        ]
        .into_iter()
        .flat_map(texel)
        .collect();
        let rgba = encode_texels(CaptureKind::HeightField, 3, 1, &data).expect("sizes match");
        assert_eq!(&rgba[0..4], &[128, 128, 128, 255]);
        assert_eq!(&rgba[4..8], &[255, 255, 0, 255]);
        assert_eq!(rgba[8], 0, "heights below the range saturate");
    }

    #[test]
    fn test_caustics_encoding_clamps() {
        let data: Vec<u8> = [[2.5, 3.0, 0.0, 0.0], [0.5, 1.0, 0.0, 0.0]]
            .into_iter()
            .flat_map(texel)
            .collect();
        let rgba = encode_texels(CaptureKind::Caustics, 2, 1, &data).expect("sizes match");
        assert_eq!(&rgba[0..4], &[255, 255, 0, 255]);
        assert_eq!(&rgba[4..8], &[128, 255, 0, 255]);
    }

    #[test]
    fn test_size_mismatch_is_an_error() {
        let result = encode_texels(CaptureKind::Caustics, 4, 4, &[0; 8]);
        assert!(matches!(result, Err(WaterError::Capture(_))));
    }

    #[test]
    fn test_rows_are_aligned() {
        assert_eq!(padded_bytes_per_row(256), 2048);
        assert_eq!(padded_bytes_per_row(20), 256);
        assert_eq!(padded_bytes_per_row(33) % ROW_ALIGNMENT, 0);
    }

    #[test]
    fn test_requests_get_increasing_ids() {
        let mut queue = CaptureQueue::default();
        queue.request(CaptureKind::Caustics, Handle::default(), "a.png");
        queue.request(CaptureKind::HeightField, Handle::default(), "b.png");
        assert!(queue.pending[0].id < queue.pending[1].id);
        assert!(queue.is_pending(CaptureKind::Caustics));
    }
}
