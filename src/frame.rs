//! Core value types for the VDPAU interop bridge.
//!
//! These are the currency of the whole crate: frame parameters negotiated
//! with the host renderer, opaque decode-API handles, the per-frame input
//! ([`HwFrame`]) and output ([`MappedFrame`]) of the map operation, and the
//! crate-wide error type.

use std::fmt;

/// Pixel format as negotiated with the host renderer.
///
/// The driver accepts frames in the opaque hardware format and always
/// produces a two-plane 4:2:0 layout; `reinit` rewrites the caller's
/// format field accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Opaque VDPAU decode surface (input side, not CPU-accessible)
    Vdpau,
    /// NV12 (full-res luma plane + half-res interleaved chroma plane)
    Nv12,
}

impl PixelFormat {
    /// Returns the number of sampleable planes for this format.
    ///
    /// The opaque hardware format has no directly sampleable planes; it must
    /// be registered with the GL interop first.
    pub fn num_planes(&self) -> usize {
        match self {
            PixelFormat::Vdpau => 0,
            PixelFormat::Nv12 => 2,
        }
    }
}

/// VDPAU chroma subsampling type, as reported by
/// `VdpVideoSurfaceGetParameters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaType {
    Monochrome,
    Yuv420,
    Yuv422,
    Yuv444,
}

/// Frame parameters negotiated between the host renderer and the driver.
///
/// Passed mutably to `reinit`, which rewrites `format` to the output format
/// the conversion pipeline will produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParams {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format; input on call, output format after `reinit` returns
    pub format: PixelFormat,
}

/// Parameters of a decode surface as queried from the decode device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceParameters {
    /// Chroma subsampling of the surface
    pub chroma: ChromaType,
    /// Surface width in pixels
    pub width: u32,
    /// Surface height in pixels
    pub height: u32,
}

/// Opaque handle to a VDPAU video surface (one decoded frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoSurfaceHandle(pub u32);

impl fmt::Display for VideoSurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "video-surface#{}", self.0)
    }
}

/// Opaque handle to a VDPAU output surface (RGBA render target on the
/// decode-API side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSurfaceHandle(pub u32);

/// One decoded hardware frame handed to `map_frame`.
///
/// The decode surface travels in an explicit typed field. The C convention
/// of smuggling the handle through a pointer-sized plane slot is gone; there
/// is no pointer reinterpretation anywhere in this crate.
#[derive(Debug, Clone, Copy)]
pub struct HwFrame {
    /// The decode surface holding this frame's sample data
    pub surface: VideoSurfaceHandle,
}

/// GPU sampling geometry of a texture handed back to the host renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingTarget {
    /// `GL_TEXTURE_2D`, normalized texture coordinates
    TwoD,
    /// `GL_TEXTURE_RECTANGLE`, texel coordinates
    Rectangle,
}

/// One output texture plane produced by a successful `map_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPlane {
    /// GL texture object holding the plane
    pub texture: crate::interop::GlTexture,
    /// Sampling geometry of `texture`
    pub target: SamplingTarget,
    /// Plane width in pixels
    pub width: u32,
    /// Plane height in pixels
    pub height: u32,
}

/// The result of mapping one frame: two standard-layout planes the generic
/// renderer can sample directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedFrame {
    /// Plane 0: full-resolution luma (R8). Plane 1: half-resolution-in-both-
    /// axes chroma pair (RG8).
    pub planes: [OutputPlane; 2],
    /// Whether the frame needs deinterlacing downstream (always false here;
    /// the decode API hands out progressive surfaces)
    pub interlaced: bool,
}

/// VDPAU status code, carried in errors so log lines name the exact
/// decode-API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdpStatus {
    Ok,
    NoImplementation,
    DisplayPreempted,
    InvalidHandle,
    InvalidPointer,
    InvalidChromaType,
    InvalidSize,
    InvalidValue,
    ResourcesBusy,
    Resources,
    Error,
}

impl VdpStatus {
    /// Human-readable name used in log messages.
    pub fn name(self) -> &'static str {
        match self {
            VdpStatus::Ok => "VDP_STATUS_OK",
            VdpStatus::NoImplementation => "VDP_STATUS_NO_IMPLEMENTATION",
            VdpStatus::DisplayPreempted => "VDP_STATUS_DISPLAY_PREEMPTED",
            VdpStatus::InvalidHandle => "VDP_STATUS_INVALID_HANDLE",
            VdpStatus::InvalidPointer => "VDP_STATUS_INVALID_POINTER",
            VdpStatus::InvalidChromaType => "VDP_STATUS_INVALID_CHROMA_TYPE",
            VdpStatus::InvalidSize => "VDP_STATUS_INVALID_SIZE",
            VdpStatus::InvalidValue => "VDP_STATUS_INVALID_VALUE",
            VdpStatus::ResourcesBusy => "VDP_STATUS_RESOURCES_BUSY",
            VdpStatus::Resources => "VDP_STATUS_RESOURCES",
            VdpStatus::Error => "VDP_STATUS_ERROR",
        }
    }

    pub fn is_ok(self) -> bool {
        self == VdpStatus::Ok
    }
}

impl fmt::Display for VdpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur while bridging decode surfaces to GL textures.
#[derive(Debug, Clone, PartialEq)]
pub enum InteropError {
    /// Required GL extension or display connection is missing; try another
    /// backend
    MissingCapability(String),
    /// The decode-device factory could not supply a device context
    DeviceUnavailable(String),
    /// The device was preempted and could not be recovered
    Preempted,
    /// A decode-API call failed with the given status
    DecodeApi {
        /// The decode-API entry point that failed
        call: &'static str,
        /// Its returned status code
        status: VdpStatus,
    },
    /// The GL rejected the interop registration of a surface
    Registration(String),
    /// Mapping a registered surface for GPU access failed
    MapFailed(String),
    /// GL-side failure (texture allocation, render target, shader)
    Gpu(String),
    /// `map_frame` was called before a successful `reinit`
    NotConfigured,
    /// `reinit` was handed a format this driver was not selected for
    /// (caller contract violation; aborts in debug builds)
    BadInputFormat(PixelFormat),
}

impl fmt::Display for InteropError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteropError::MissingCapability(msg) => write!(f, "Missing capability: {msg}"),
            InteropError::DeviceUnavailable(msg) => write!(f, "Decode device unavailable: {msg}"),
            InteropError::Preempted => write!(f, "Device preempted beyond recovery"),
            InteropError::DecodeApi { call, status } => {
                write!(f, "Error when calling {call}: {}", status.name())
            }
            InteropError::Registration(msg) => write!(f, "Surface registration rejected: {msg}"),
            InteropError::MapFailed(msg) => write!(f, "Surface map failed: {msg}"),
            InteropError::Gpu(msg) => write!(f, "GL error: {msg}"),
            InteropError::NotConfigured => write!(f, "Session not configured (reinit required)"),
            InteropError::BadInputFormat(fmt_) => {
                write!(f, "Driver selected for VDPAU frames, got {fmt_:?}")
            }
        }
    }
}

impl std::error::Error for InteropError {}
