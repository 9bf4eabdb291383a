//! Packed-surface to planar conversion.
//!
//! A mapped video-surface registration exposes four textures holding
//! field-split plane data: even/odd luma rows in textures 0/1, even/odd
//! chroma rows in textures 2/3. The pipeline reassembles them into two
//! standard planes (a full-resolution R8 luma plane and a half-resolution
//! RG8 chroma-pair plane) by running one row-parity pass per plane into a
//! reusable intermediate render target.
//!
//! The texture-unit mapping (plane `p` reads field textures `2p` and
//! `2p + 1`) and the even/odd selection rule must match: swapping either
//! corrupts every other scanline of the output.

use crate::frame::{InteropError, MappedFrame, OutputPlane, SamplingTarget};
use crate::interop::{GlInterop, GlTexture, PlaneStorage, RenderTargetId};

/// Right-shift per output plane, applied to both surface axes.
///
/// Plane 0 is luma at full resolution, plane 1 the 4:2:0 chroma pair at half
/// resolution in both axes. Shifts truncate, so odd surface dimensions lose
/// the last row/column of chroma (matching the texcoord scaling of the
/// parity pass, which also halves by truncation).
const PLANE_SHIFT: [(u32, u32); 2] = [(0, 0), (1, 1)];

/// The two intermediate render targets and the logic that fills them.
///
/// Render targets persist across frames; they are reallocated by the backend
/// only when the surface dimensions change, and released together with the
/// rest of the session's GPU objects.
#[derive(Debug, Default)]
pub struct ConversionPipeline {
    targets: [Option<RenderTargetId>; 2],
}

impl ConversionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts one mapped surface into two planar output textures.
    ///
    /// `planes` are the four registration textures, `surface_w`/`surface_h`
    /// the video surface's pixel dimensions as reported by the decode
    /// device.
    pub fn render<G: GlInterop>(
        &mut self,
        gl: &mut G,
        planes: &[GlTexture; 4],
        source_target: SamplingTarget,
        surface_w: u32,
        surface_h: u32,
    ) -> Result<MappedFrame, InteropError> {
        let mut out = [OutputPlane {
            texture: GlTexture(0),
            target: SamplingTarget::TwoD,
            width: 0,
            height: 0,
        }; 2];

        for (plane, &(sx, sy)) in PLANE_SHIFT.iter().enumerate() {
            let d_w = surface_w >> sx;
            let d_h = surface_h >> sy;
            let storage = match plane {
                0 => PlaneStorage::R8,
                _ => PlaneStorage::Rg8,
            };

            let target =
                gl.ensure_render_target(self.targets[plane].take(), d_w, d_h, storage)?;
            self.targets[plane] = Some(target);

            let even_field = planes[plane * 2];
            let odd_field = planes[plane * 2 + 1];
            gl.run_parity_pass(even_field, odd_field, source_target, target, d_w, d_h)?;

            out[plane] = OutputPlane {
                texture: gl.render_target_texture(target),
                target: SamplingTarget::TwoD,
                width: d_w,
                height: d_h,
            };
        }

        Ok(MappedFrame {
            planes: out,
            interlaced: false,
        })
    }

    /// Releases both render targets. Idempotent.
    pub fn release<G: GlInterop>(&mut self, gl: &mut G) {
        for target in &mut self.targets {
            if let Some(id) = target.take() {
                gl.delete_render_target(id);
            }
        }
    }
}
