//! Interop session lifecycle.
//!
//! One [`InteropSession`] per video output target, driven by the host
//! renderer through the fixed four-call contract: [`create`], [`reinit`],
//! [`map_frame`] / [`unmap`] per frame, and destruction. The session owns
//! all interop state and keeps every resource field individually nullable so
//! teardown is safe from any intermediate state, including a creation or
//! reconfiguration that failed partway.
//!
//! Preemption handling: a recoverable preemption detected at map time marks
//! the decode-API objects invalid (no GPU cleanup calls; the device context
//! behind them is gone), reinitializes with the last negotiated frame
//! parameters, and proceeds. An unrecoverable one fails the map.
//!
//! [`create`]: InteropSession::create
//! [`reinit`]: InteropSession::reinit
//! [`map_frame`]: InteropSession::map_frame
//! [`unmap`]: InteropSession::unmap

use tracing::{debug, trace, warn};

use crate::convert::ConversionPipeline;
use crate::device::{DecodeDevice, PreemptionStatus};
use crate::frame::{
    FrameParams, HwFrame, InteropError, MappedFrame, OutputSurfaceHandle, PixelFormat,
    SamplingTarget,
};
use crate::interop::{GlInterop, GlTexture, SurfaceRegistration};
use crate::registry::{DeviceRegistry, RegistryEntry};

/// Driver identity, as listed in the host's driver table.
pub const DRIVER_NAME: &str = "vdpau-glx";

/// The input format this driver is selected for.
pub const DRIVER_INPUT_FORMAT: PixelFormat = PixelFormat::Vdpau;

/// Interop state for one video output target.
///
/// Generic over the decode-device context and the GL backend so the state
/// machine is testable without a display connection.
#[derive(Debug)]
pub struct InteropSession<D: DecodeDevice, G: GlInterop> {
    device: D,
    gl: G,
    registry: DeviceRegistry,
    preemption_generation: u64,
    /// Last parameters accepted by `reinit`, with the input format (the
    /// stored copy is what an implicit reinit replays, so it keeps
    /// [`DRIVER_INPUT_FORMAT`] rather than the rewritten output format).
    params: Option<FrameParams>,
    plane_textures: Option<[GlTexture; 4]>,
    interop_initialized: bool,
    mapped: bool,
    output_surface: Option<OutputSurfaceHandle>,
    video_registration: Option<SurfaceRegistration>,
    /// Registration slot for the output-surface path. Unused by the current
    /// conversion route but released on teardown like everything else.
    output_registration: Option<SurfaceRegistration>,
    pipeline: ConversionPipeline,
    target: SamplingTarget,
}

impl<D: DecodeDevice, G: GlInterop> InteropSession<D, G> {
    /// Creates a session for one output target.
    ///
    /// Verifies the GL context exposes the interop capability, obtains a
    /// decode-device context from `factory`, and advertises the device in
    /// `registry` for cross-subsystem reuse. With `probing` set, a device
    /// detected as a software emulation layer is rejected so capability
    /// probing fails over to another backend instead of silently degrading.
    pub fn create(
        factory: impl FnOnce() -> Result<D, InteropError>,
        registry: DeviceRegistry,
        gl: G,
        probing: bool,
    ) -> Result<Self, InteropError> {
        if !gl.supports_interop() {
            return Err(InteropError::MissingCapability(
                "GL context lacks GL_NV_vdpau_interop or a display connection".into(),
            ));
        }

        let mut device = factory()?;

        let mut generation = 0;
        if device.check_preemption(&mut generation)? == PreemptionStatus::Lost {
            return Err(InteropError::Preempted);
        }

        if probing && device.is_emulated() {
            debug!("rejecting emulated vdpau device during probing");
            return Err(InteropError::MissingCapability(
                "vdpau device is a software emulation layer".into(),
            ));
        }

        registry.add(RegistryEntry {
            device: device.handle(),
            driver: DRIVER_NAME,
        });

        Ok(Self {
            device,
            gl,
            registry,
            preemption_generation: generation,
            params: None,
            plane_textures: None,
            interop_initialized: false,
            mapped: false,
            output_surface: None,
            video_registration: None,
            output_registration: None,
            pipeline: ConversionPipeline::new(),
            target: SamplingTarget::Rectangle,
        })
    }

    /// Reconfigures the session for new frame parameters.
    ///
    /// Tears down all existing GPU-side objects first, so it is safe to call
    /// on a fresh session and safe to call redundantly. On return,
    /// `params.format` has been rewritten to the output format the
    /// conversion pipeline produces ([`PixelFormat::Nv12`]); downstream
    /// consumers should expect that format rather than the decode format.
    pub fn reinit(&mut self, params: &mut FrameParams) -> Result<(), InteropError> {
        self.release_gpu_resources();

        if params.format != DRIVER_INPUT_FORMAT {
            debug_assert!(
                false,
                "reinit called with {:?}, driver is selected for {:?}",
                params.format, DRIVER_INPUT_FORMAT
            );
            return Err(InteropError::BadInputFormat(params.format));
        }
        self.params = Some(*params);

        if self.device.check_preemption(&mut self.preemption_generation)?
            == PreemptionStatus::Lost
        {
            return Err(InteropError::Preempted);
        }

        self.gl.init_interop(self.device.handle())?;
        self.interop_initialized = true;

        self.output_surface = Some(
            self.device
                .create_output_surface(params.width, params.height)?,
        );

        self.target = SamplingTarget::Rectangle;
        self.plane_textures = Some(self.gl.create_plane_textures(self.target)?);

        self.gl.note_errors("after initializing vdpau GL interop");

        params.format = PixelFormat::Nv12;
        debug!(
            width = params.width,
            height = params.height,
            "vdpau interop configured, output format NV12"
        );
        Ok(())
    }

    /// Maps one decoded frame and converts it to two planar output textures.
    ///
    /// If the session is still mapped from the previous frame, that binding
    /// is released first (deterministic replace). On registration, map or
    /// conversion failure the binding is torn back down, so the session
    /// stays safely unmapped and the caller may retry with the next frame.
    pub fn map_frame(&mut self, frame: &HwFrame) -> Result<MappedFrame, InteropError> {
        match self
            .device
            .check_preemption(&mut self.preemption_generation)?
        {
            PreemptionStatus::Active => {}
            PreemptionStatus::Recovered => {
                debug!("display preempted and recovered, reinitializing interop");
                self.mark_decode_objects_invalid();
                let mut params = self.params.ok_or(InteropError::NotConfigured)?;
                self.reinit(&mut params)?;
            }
            PreemptionStatus::Lost => {
                self.mark_decode_objects_invalid();
                return Err(InteropError::Preempted);
            }
        }

        if self.mapped {
            self.unmap();
        }

        let planes = self.plane_textures.ok_or(InteropError::NotConfigured)?;
        let surface_params = self.device.surface_parameters(frame.surface)?;
        trace!(
            surface = %frame.surface,
            chroma = ?surface_params.chroma,
            width = surface_params.width,
            height = surface_params.height,
            "mapping decode surface"
        );

        let registration =
            self.gl
                .register_video_surface(frame.surface, self.target, &planes)?;
        self.gl.set_access_read_only(registration);
        if let Err(err) = self.gl.map_surface(registration) {
            self.gl.unregister_surface(registration);
            return Err(err);
        }

        match self.pipeline.render(
            &mut self.gl,
            &planes,
            self.target,
            surface_params.width,
            surface_params.height,
        ) {
            Ok(out) => {
                self.video_registration = Some(registration);
                self.mapped = true;
                Ok(out)
            }
            Err(err) => {
                self.gl.unmap_surface(registration);
                self.gl.unregister_surface(registration);
                Err(err)
            }
        }
    }

    /// Releases the current frame's binding. Idempotent; a no-op when
    /// nothing is mapped.
    pub fn unmap(&mut self) {
        if self.mapped {
            if let Some(registration) = self.video_registration.take() {
                self.gl.unmap_surface(registration);
                self.gl.unregister_surface(registration);
            }
        }
        self.mapped = false;
    }

    /// Destroys the session. Equivalent to dropping it; provided so call
    /// sites mirroring the host's driver table read naturally.
    pub fn destroy(self) {}

    /// Whether a frame is currently mapped.
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// The parameters accepted by the last successful `reinit`.
    pub fn frame_params(&self) -> Option<FrameParams> {
        self.params
    }

    /// Marks decode-API-backed objects invalid after a preemption, without
    /// issuing cleanup calls: the device context they belonged to is gone,
    /// and so is every interop registration made against it.
    fn mark_decode_objects_invalid(&mut self) {
        self.output_surface = None;
        self.video_registration = None;
        self.output_registration = None;
        self.mapped = false;
        self.gl.invalidate();
        self.interop_initialized = false;
    }

    /// Releases every GPU-side object the session holds. Callable from any
    /// state; each resource field is individually nullable, so a partially
    /// initialized session tears down cleanly.
    fn release_gpu_resources(&mut self) {
        self.unmap();

        if let Some(registration) = self.output_registration.take() {
            self.gl.unregister_surface(registration);
        }

        if let Some(textures) = self.plane_textures.take() {
            self.gl.delete_plane_textures(textures);
        }

        if let Some(surface) = self.output_surface.take() {
            if let Err(err) = self.device.destroy_output_surface(surface) {
                warn!("ignoring output surface destroy failure: {err}");
            }
        }

        self.pipeline.release(&mut self.gl);

        self.gl.note_errors("before uninitializing GL interop");
        if self.interop_initialized {
            self.gl.fini_interop();
        }
        self.interop_initialized = false;
        self.gl.note_errors("after uninitializing GL interop");
    }
}

impl<D: DecodeDevice, G: GlInterop> Drop for InteropSession<D, G> {
    fn drop(&mut self) {
        self.release_gpu_resources();
        self.registry.remove(self.device.handle());
    }
}
