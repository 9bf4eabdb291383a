//! GPU interop seam.
//!
//! Everything the session needs from the GL side of `GL_NV_vdpau_interop`:
//! binding the extension to a device context, turning decode surfaces into
//! sets of texture objects, and running the deinterleave pass into plain
//! render targets. The production implementation is [`GlVdpauBackend`];
//! tests substitute a mock with failure injection.
//!
//! Ordering contract (undefined behavior in the driver if violated, so the
//! session enforces it):
//!
//! 1. a registration must be unmapped before it is unregistered;
//! 2. a registration must be unregistered before its texture objects are
//!    deleted;
//! 3. a surface must be unregistered before the decode API destroys it.
//!
//! [`GlVdpauBackend`]: crate::gl::GlVdpauBackend

use crate::device::DeviceHandle;
use crate::frame::{InteropError, SamplingTarget, VideoSurfaceHandle};

/// GL texture object handle.
///
/// Always a live object name while reachable from session state; the old
/// zero-means-empty convention is replaced by `Option` at every storage
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlTexture(pub u32);

/// Handle to one registered surface binding (`GLvdpauSurfaceNV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceRegistration(pub u64);

/// Handle to one intermediate render target (texture + framebuffer pair)
/// owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u32);

/// Storage format of an intermediate render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneStorage {
    /// Single-channel, for the luma plane
    R8,
    /// Dual-channel, for the interleaved chroma plane
    Rg8,
}

/// The GL side of the interop, as consumed by the session and the
/// conversion pipeline.
///
/// Implementations own all GL objects behind the handles they give out and
/// may assume single-threaded use from the thread owning the GL context.
pub trait GlInterop {
    /// Whether the current GL context exposes `GL_NV_vdpau_interop` and a
    /// usable display connection. Checked once at session creation.
    fn supports_interop(&self) -> bool;

    /// Binds the interop subsystem to a device context
    /// (`VDPAUInitNV`). Must be balanced with [`fini_interop`].
    ///
    /// [`fini_interop`]: GlInterop::fini_interop
    fn init_interop(&mut self, device: DeviceHandle) -> Result<(), InteropError>;

    /// Releases the interop subsystem (`VDPAUFiniNV`). Safe to call only
    /// after every registration has been unregistered.
    fn fini_interop(&mut self);

    /// Allocates the four plane texture objects a video-surface registration
    /// binds to, configured for raw sample data: nearest-neighbor filtering
    /// and edge clamping, no wraparound and no interpolation.
    fn create_plane_textures(
        &mut self,
        target: SamplingTarget,
    ) -> Result<[GlTexture; 4], InteropError>;

    /// Deletes plane textures previously created by
    /// [`create_plane_textures`]. Callers guarantee no registration still
    /// binds them.
    ///
    /// [`create_plane_textures`]: GlInterop::create_plane_textures
    fn delete_plane_textures(&mut self, textures: [GlTexture; 4]);

    /// Registers a decode surface against the given plane textures
    /// (`VDPAURegisterVideoSurfaceNV`). The four textures receive the
    /// surface's field-split plane data once the registration is mapped:
    /// textures 0/1 carry the even/odd luma rows, textures 2/3 the even/odd
    /// chroma rows.
    fn register_video_surface(
        &mut self,
        surface: VideoSurfaceHandle,
        target: SamplingTarget,
        planes: &[GlTexture; 4],
    ) -> Result<SurfaceRegistration, InteropError>;

    /// Restricts a registration to GPU reads (`VDPAUSurfaceAccessNV` with
    /// `GL_READ_ONLY`).
    fn set_access_read_only(&mut self, registration: SurfaceRegistration);

    /// Makes the registered surface's sample data visible to the GPU
    /// (`VDPAUMapSurfacesNV`).
    fn map_surface(&mut self, registration: SurfaceRegistration) -> Result<(), InteropError>;

    /// Releases GPU access to a mapped registration
    /// (`VDPAUUnmapSurfacesNV`).
    fn unmap_surface(&mut self, registration: SurfaceRegistration);

    /// Destroys a registration (`VDPAUUnregisterSurfaceNV`). The caller has
    /// already unmapped it.
    fn unregister_surface(&mut self, registration: SurfaceRegistration);

    /// Abandons all interop state after the device context behind it was
    /// preempted. Issues no GL calls: every outstanding registration and the
    /// init binding are dangling handles into a dead device, and the next
    /// [`init_interop`] starts from scratch.
    ///
    /// [`init_interop`]: GlInterop::init_interop
    fn invalidate(&mut self);

    /// Returns a render target of exactly `width` x `height` with the given
    /// storage, reusing `existing` when its dimensions and storage already
    /// match and reallocating it otherwise.
    fn ensure_render_target(
        &mut self,
        existing: Option<RenderTargetId>,
        width: u32,
        height: u32,
        storage: PlaneStorage,
    ) -> Result<RenderTargetId, InteropError>;

    /// The texture backing a render target, for handing to the host
    /// renderer. Sampleable as `GL_TEXTURE_2D`.
    fn render_target_texture(&self, target: RenderTargetId) -> GlTexture;

    /// Destroys a render target and its backing texture.
    fn delete_render_target(&mut self, target: RenderTargetId);

    /// Runs the row-parity deinterleave pass: renders a full-viewport quad
    /// into `target`, sampling `even_field` for even destination rows and
    /// `odd_field` for odd destination rows (selection on
    /// `fract(gl_FragCoord.y / 2.0) < 0.5`). Texture coordinates span
    /// `(width, height / 2)` in the sources' texel space, since each field
    /// texture holds half the destination rows.
    fn run_parity_pass(
        &mut self,
        even_field: GlTexture,
        odd_field: GlTexture,
        source_target: SamplingTarget,
        target: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), InteropError>;

    /// Drains and logs the GL error state, tagged with `context`. Called
    /// around interop init and teardown.
    fn note_errors(&mut self, context: &str);
}
