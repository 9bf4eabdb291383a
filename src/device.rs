//! Decode-device seam.
//!
//! The connection to the VDPAU device, its function table, and its
//! preemption-recovery logic live outside this crate. The bridge only
//! consumes the operations below; the concrete implementation typically
//! wraps an X11 display connection and the `vdp_*` entry points obtained
//! from `vdp_get_proc_address`.

use crate::frame::{
    InteropError, OutputSurfaceHandle, SurfaceParameters, VideoSurfaceHandle,
};

/// Opaque handle identifying one decode-device context.
///
/// This is the value shared through the [`DeviceRegistry`] so other
/// subsystems can reuse the same device, and the value handed to
/// `GlInterop::init_interop` (the GL extension binds to a specific
/// `VdpDevice`).
///
/// [`DeviceRegistry`]: crate::registry::DeviceRegistry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// Result of a preemption-status query.
///
/// Preemption invalidates every resource the device context owns. Whether
/// the context itself survived decides between the two non-normal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreemptionStatus {
    /// No preemption since the caller's generation; resources are valid
    Active,
    /// The device was preempted but the context has been rebuilt; all
    /// previously created resources are gone and must be recreated
    Recovered,
    /// The device was preempted and recovery failed; the context is unusable
    Lost,
}

/// The vendor decode-API surface this bridge consumes.
///
/// One implementation per windowing/display flavor; the session is generic
/// over it, and the test suite substitutes a scripted mock. All calls are
/// synchronous and must be made from the thread owning the GL context, so
/// no `Sync` bound is required.
pub trait DecodeDevice: Send {
    /// The context handle shared with other subsystems and with the GL
    /// interop.
    fn handle(&self) -> DeviceHandle;

    /// Queries preemption state relative to `generation` and updates
    /// `generation` to the device's current one.
    ///
    /// A [`PreemptionStatus::Recovered`] result means the device context was
    /// rebuilt behind the caller's back: every surface and interop
    /// registration created against the old generation is dangling and must
    /// not be passed back to the device.
    fn check_preemption(
        &mut self,
        generation: &mut u64,
    ) -> Result<PreemptionStatus, InteropError>;

    /// Whether the device is a software emulation layer rather than real
    /// hardware. Used to reject the backend during capability probing.
    fn is_emulated(&self) -> bool;

    /// Allocates a B8G8R8A8 output surface at the given dimensions.
    fn create_output_surface(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<OutputSurfaceHandle, InteropError>;

    /// Destroys an output surface previously created by this device.
    ///
    /// Failures here are logged by the caller but never propagated; teardown
    /// is best-effort.
    fn destroy_output_surface(
        &mut self,
        surface: OutputSurfaceHandle,
    ) -> Result<(), InteropError>;

    /// Queries chroma type and pixel dimensions of a decoded video surface.
    fn surface_parameters(
        &self,
        surface: VideoSurfaceHandle,
    ) -> Result<SurfaceParameters, InteropError>;
}
