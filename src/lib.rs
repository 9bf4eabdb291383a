//! vdpau-interop: zero-copy VDPAU decode surfaces as OpenGL textures
//!
//! This crate bridges a VDPAU hardware decoder and an OpenGL renderer using
//! **GL_NV_vdpau_interop**, so decoded frames reach the screen without a
//! round trip through system memory.
//!
//! A decoded VDPAU video surface stores 4:2:0 video in two field-split
//! planes. Mapping one registers it against four GL textures (even/odd luma
//! rows, even/odd chroma rows), then a small row-parity pass re-interleaves
//! each pair into one progressive plane. The output is two ordinary
//! `GL_TEXTURE_2D` objects in NV12 layout, sampleable by any renderer.
//!
//! # Example
//!
//! ```ignore
//! use vdpau_interop::{DeviceRegistry, GlVdpauBackend, InteropSession};
//!
//! let gl = GlVdpauBackend::load(|name| glx_get_proc_address(name), vdp_get_proc)?;
//! let mut session = InteropSession::create(
//!     || open_vdpau_device(display),
//!     DeviceRegistry::new(),
//!     gl,
//!     /* probing */ true,
//! )?;
//!
//! session.reinit(&mut params)?; // params.format becomes Nv12
//! let mapped = session.map_frame(&frame)?;
//! // ... sample mapped.planes[0] / mapped.planes[1] ...
//! session.unmap();
//! ```
//!
//! # Preemption
//!
//! A VDPAU display preemption (VT switch, GPU reset) invalidates every
//! device object behind the session's back. [`InteropSession::map_frame`]
//! detects this, drops the dangling handles without touching the dead
//! device, and transparently reinitializes when the display comes back.

mod convert;
mod device;
mod frame;
mod gl;
mod interop;
mod registry;
mod session;

#[cfg(test)]
mod testing;

pub use device::{DecodeDevice, DeviceHandle, PreemptionStatus};
pub use frame::{
    ChromaType, FrameParams, HwFrame, InteropError, MappedFrame, OutputPlane,
    OutputSurfaceHandle, PixelFormat, SamplingTarget, SurfaceParameters, VdpStatus,
    VideoSurfaceHandle,
};
pub use gl::GlVdpauBackend;
pub use interop::{GlInterop, GlTexture, PlaneStorage, RenderTargetId, SurfaceRegistration};
pub use registry::{DeviceRegistry, RegistryEntry};
pub use session::{InteropSession, DRIVER_INPUT_FORMAT, DRIVER_NAME};
