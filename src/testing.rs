//! Scripted mock implementations of the device and GL seams.
//!
//! Both mocks keep their bookkeeping behind `Arc<Mutex<..>>` and are cheap
//! to clone, so a test can hand one clone to the session and keep another to
//! inspect resource counts, including after the session has been destroyed.
//! Failure injection is per-call-site, which is what the teardown-safety
//! tests need to fail creation at each allocation step in turn.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{DecodeDevice, DeviceHandle, PreemptionStatus};
use crate::frame::{
    ChromaType, InteropError, OutputSurfaceHandle, SamplingTarget, SurfaceParameters, VdpStatus,
    VideoSurfaceHandle,
};
use crate::interop::{
    GlInterop, GlTexture, PlaneStorage, RenderTargetId, SurfaceRegistration,
};

/// Opt-in tracing output for a test, via
/// `RUST_LOG=vdpau_interop=debug cargo test -- --nocapture`.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Mock decode device
// =============================================================================

#[derive(Debug, Default)]
struct MockDeviceInner {
    preemption_script: VecDeque<PreemptionStatus>,
    preemption_checks: usize,
    emulated: bool,
    fail_create_output: bool,
    fail_destroy_output: bool,
    next_output_surface: u32,
    live_output_surfaces: HashSet<OutputSurfaceHandle>,
    surface_params: HashMap<VideoSurfaceHandle, SurfaceParameters>,
}

/// Scripted [`DecodeDevice`].
#[derive(Debug, Clone)]
pub struct MockDevice {
    handle: DeviceHandle,
    inner: Arc<Mutex<MockDeviceInner>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            handle: DeviceHandle(1),
            inner: Arc::new(Mutex::new(MockDeviceInner {
                next_output_surface: 100,
                ..Default::default()
            })),
        }
    }

    /// Queues preemption statuses returned by successive
    /// `check_preemption` calls; once the script runs out the device reports
    /// `Active`.
    pub fn script_preemption(&self, statuses: impl IntoIterator<Item = PreemptionStatus>) {
        self.inner.lock().preemption_script.extend(statuses);
    }

    pub fn set_emulated(&self, emulated: bool) {
        self.inner.lock().emulated = emulated;
    }

    pub fn fail_create_output_surface(&self, fail: bool) {
        self.inner.lock().fail_create_output = fail;
    }

    pub fn fail_destroy_output_surface(&self, fail: bool) {
        self.inner.lock().fail_destroy_output = fail;
    }

    /// Registers the parameters reported for a decode surface.
    pub fn add_surface(&self, surface: VideoSurfaceHandle, params: SurfaceParameters) {
        self.inner.lock().surface_params.insert(surface, params);
    }

    /// Convenience: a 4:2:0 surface at the given dimensions.
    pub fn add_yuv420_surface(&self, surface: VideoSurfaceHandle, width: u32, height: u32) {
        self.add_surface(
            surface,
            SurfaceParameters {
                chroma: ChromaType::Yuv420,
                width,
                height,
            },
        );
    }

    pub fn live_output_surfaces(&self) -> usize {
        self.inner.lock().live_output_surfaces.len()
    }

    pub fn preemption_checks(&self) -> usize {
        self.inner.lock().preemption_checks
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeDevice for MockDevice {
    fn handle(&self) -> DeviceHandle {
        self.handle
    }

    fn check_preemption(
        &mut self,
        generation: &mut u64,
    ) -> Result<PreemptionStatus, InteropError> {
        let mut inner = self.inner.lock();
        inner.preemption_checks += 1;
        let status = inner
            .preemption_script
            .pop_front()
            .unwrap_or(PreemptionStatus::Active);
        if status != PreemptionStatus::Active {
            // A preemption destroyed everything the device owned.
            inner.live_output_surfaces.clear();
        }
        if status == PreemptionStatus::Recovered {
            *generation += 1;
        }
        Ok(status)
    }

    fn is_emulated(&self) -> bool {
        self.inner.lock().emulated
    }

    fn create_output_surface(
        &mut self,
        _width: u32,
        _height: u32,
    ) -> Result<OutputSurfaceHandle, InteropError> {
        let mut inner = self.inner.lock();
        if inner.fail_create_output {
            return Err(InteropError::DecodeApi {
                call: "vdp_output_surface_create",
                status: VdpStatus::Resources,
            });
        }
        let handle = OutputSurfaceHandle(inner.next_output_surface);
        inner.next_output_surface += 1;
        inner.live_output_surfaces.insert(handle);
        Ok(handle)
    }

    fn destroy_output_surface(
        &mut self,
        surface: OutputSurfaceHandle,
    ) -> Result<(), InteropError> {
        let mut inner = self.inner.lock();
        assert!(
            inner.live_output_surfaces.remove(&surface),
            "destroying unknown output surface {surface:?}"
        );
        if inner.fail_destroy_output {
            return Err(InteropError::DecodeApi {
                call: "vdp_output_surface_destroy",
                status: VdpStatus::InvalidHandle,
            });
        }
        Ok(())
    }

    fn surface_parameters(
        &self,
        surface: VideoSurfaceHandle,
    ) -> Result<SurfaceParameters, InteropError> {
        self.inner
            .lock()
            .surface_params
            .get(&surface)
            .copied()
            .ok_or(InteropError::DecodeApi {
                call: "vdp_video_surface_get_parameters",
                status: VdpStatus::InvalidHandle,
            })
    }
}

// =============================================================================
// Mock GL interop
// =============================================================================

/// Record of one row-parity pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityPass {
    pub even: GlTexture,
    pub odd: GlTexture,
    pub source_target: SamplingTarget,
    pub target: RenderTargetId,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
struct RegistrationState {
    planes: [GlTexture; 4],
    read_only: bool,
    mapped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderTargetState {
    width: u32,
    height: u32,
    storage: PlaneStorage,
}

#[derive(Debug, Default)]
struct MockGlInner {
    supports_interop: bool,
    initialized: bool,
    init_calls: usize,
    fini_calls: usize,
    next_texture: u32,
    next_registration: u64,
    next_render_target: u32,
    live_textures: HashSet<GlTexture>,
    registrations: HashMap<SurfaceRegistration, RegistrationState>,
    render_targets: HashMap<RenderTargetId, RenderTargetState>,
    render_targets_allocated: usize,
    render_target_storages: Vec<PlaneStorage>,
    parity_passes: Vec<ParityPass>,
    fail_init: bool,
    fail_create_textures: bool,
    fail_register: bool,
    fail_map: bool,
    fail_render_target: bool,
    fail_parity: bool,
}

/// Scripted [`GlInterop`] with failure injection and invariant checks.
///
/// The mock panics on the misuses that are undefined behavior on a real
/// driver: unmapping or unregistering an unknown registration, deleting
/// textures still bound by a mapped registration, and tearing the interop
/// subsystem down with a surface still mapped.
#[derive(Debug, Clone)]
pub struct MockGl {
    inner: Arc<Mutex<MockGlInner>>,
}

impl MockGl {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockGlInner {
                supports_interop: true,
                next_texture: 10,
                next_registration: 1,
                next_render_target: 1,
                ..Default::default()
            })),
        }
    }

    pub fn set_supports_interop(&self, supports: bool) {
        self.inner.lock().supports_interop = supports;
    }

    pub fn fail_init(&self, fail: bool) {
        self.inner.lock().fail_init = fail;
    }

    pub fn fail_create_textures(&self, fail: bool) {
        self.inner.lock().fail_create_textures = fail;
    }

    pub fn fail_register(&self, fail: bool) {
        self.inner.lock().fail_register = fail;
    }

    pub fn fail_map(&self, fail: bool) {
        self.inner.lock().fail_map = fail;
    }

    pub fn fail_render_target(&self, fail: bool) {
        self.inner.lock().fail_render_target = fail;
    }

    pub fn fail_parity(&self, fail: bool) {
        self.inner.lock().fail_parity = fail;
    }

    pub fn initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    pub fn init_calls(&self) -> usize {
        self.inner.lock().init_calls
    }

    pub fn fini_calls(&self) -> usize {
        self.inner.lock().fini_calls
    }

    pub fn live_plane_textures(&self) -> usize {
        self.inner.lock().live_textures.len()
    }

    pub fn live_registrations(&self) -> usize {
        self.inner.lock().registrations.len()
    }

    pub fn mapped_registrations(&self) -> usize {
        self.inner
            .lock()
            .registrations
            .values()
            .filter(|r| r.mapped)
            .count()
    }

    pub fn live_render_targets(&self) -> usize {
        self.inner.lock().render_targets.len()
    }

    pub fn render_targets_allocated(&self) -> usize {
        self.inner.lock().render_targets_allocated
    }

    pub fn render_target_storages(&self) -> Vec<PlaneStorage> {
        self.inner.lock().render_target_storages.clone()
    }

    pub fn parity_passes(&self) -> Vec<ParityPass> {
        self.inner.lock().parity_passes.clone()
    }
}

impl Default for MockGl {
    fn default() -> Self {
        Self::new()
    }
}

impl GlInterop for MockGl {
    fn supports_interop(&self) -> bool {
        self.inner.lock().supports_interop
    }

    fn init_interop(&mut self, _device: DeviceHandle) -> Result<(), InteropError> {
        let mut inner = self.inner.lock();
        if inner.fail_init {
            return Err(InteropError::Gpu("VDPAUInitNV failed".into()));
        }
        assert!(!inner.initialized, "init_interop while already initialized");
        inner.initialized = true;
        inner.init_calls += 1;
        Ok(())
    }

    fn fini_interop(&mut self) {
        let mut inner = self.inner.lock();
        assert!(inner.initialized, "fini_interop without init");
        assert_eq!(
            inner.registrations.values().filter(|r| r.mapped).count(),
            0,
            "fini_interop with a surface still mapped"
        );
        inner.initialized = false;
        inner.fini_calls += 1;
    }

    fn create_plane_textures(
        &mut self,
        _target: SamplingTarget,
    ) -> Result<[GlTexture; 4], InteropError> {
        let mut inner = self.inner.lock();
        if inner.fail_create_textures {
            return Err(InteropError::Gpu("glGenTextures failed".into()));
        }
        let mut planes = [GlTexture(0); 4];
        for plane in &mut planes {
            let tex = GlTexture(inner.next_texture);
            inner.next_texture += 1;
            inner.live_textures.insert(tex);
            *plane = tex;
        }
        Ok(planes)
    }

    fn delete_plane_textures(&mut self, textures: [GlTexture; 4]) {
        let mut inner = self.inner.lock();
        for tex in textures {
            assert!(
                !inner
                    .registrations
                    .values()
                    .any(|r| r.mapped && r.planes.contains(&tex)),
                "deleting texture {tex:?} bound by a mapped registration"
            );
            inner.live_textures.remove(&tex);
        }
    }

    fn register_video_surface(
        &mut self,
        _surface: VideoSurfaceHandle,
        _target: SamplingTarget,
        planes: &[GlTexture; 4],
    ) -> Result<SurfaceRegistration, InteropError> {
        let mut inner = self.inner.lock();
        assert!(inner.initialized, "register_video_surface without init");
        if inner.fail_register {
            return Err(InteropError::Registration(
                "VDPAURegisterVideoSurfaceNV returned 0".into(),
            ));
        }
        for tex in planes {
            assert!(
                inner.live_textures.contains(tex),
                "registering against deleted texture {tex:?}"
            );
        }
        let registration = SurfaceRegistration(inner.next_registration);
        inner.next_registration += 1;
        inner.registrations.insert(
            registration,
            RegistrationState {
                planes: *planes,
                read_only: false,
                mapped: false,
            },
        );
        Ok(registration)
    }

    fn set_access_read_only(&mut self, registration: SurfaceRegistration) {
        let mut inner = self.inner.lock();
        let state = inner
            .registrations
            .get_mut(&registration)
            .expect("set_access_read_only on unknown registration");
        state.read_only = true;
    }

    fn map_surface(&mut self, registration: SurfaceRegistration) -> Result<(), InteropError> {
        let mut inner = self.inner.lock();
        if inner.fail_map {
            return Err(InteropError::MapFailed("VDPAUMapSurfacesNV failed".into()));
        }
        let state = inner
            .registrations
            .get_mut(&registration)
            .expect("map_surface on unknown registration");
        assert!(state.read_only, "map_surface before access mode was set");
        assert!(!state.mapped, "map_surface on an already mapped registration");
        state.mapped = true;
        Ok(())
    }

    fn unmap_surface(&mut self, registration: SurfaceRegistration) {
        let mut inner = self.inner.lock();
        let state = inner
            .registrations
            .get_mut(&registration)
            .expect("unmap_surface on unknown registration");
        assert!(state.mapped, "unmap_surface on an unmapped registration");
        state.mapped = false;
    }

    fn unregister_surface(&mut self, registration: SurfaceRegistration) {
        let mut inner = self.inner.lock();
        let state = inner
            .registrations
            .remove(&registration)
            .expect("unregister_surface on unknown registration");
        assert!(!state.mapped, "unregister_surface while still mapped");
    }

    fn invalidate(&mut self) {
        let mut inner = self.inner.lock();
        // Dangling handles from a preempted device are dropped, not cleaned
        // up. The init/fini counters stay as they are: no GL call happened.
        inner.registrations.clear();
        inner.initialized = false;
    }

    fn ensure_render_target(
        &mut self,
        existing: Option<RenderTargetId>,
        width: u32,
        height: u32,
        storage: PlaneStorage,
    ) -> Result<RenderTargetId, InteropError> {
        let mut inner = self.inner.lock();
        let wanted = RenderTargetState {
            width,
            height,
            storage,
        };
        if let Some(id) = existing {
            let state = *inner
                .render_targets
                .get(&id)
                .expect("ensure_render_target with unknown existing target");
            if state == wanted {
                return Ok(id);
            }
            inner.render_targets.remove(&id);
        }
        if inner.fail_render_target {
            return Err(InteropError::Gpu("framebuffer incomplete".into()));
        }
        let id = RenderTargetId(inner.next_render_target);
        inner.next_render_target += 1;
        inner.render_targets.insert(id, wanted);
        inner.render_targets_allocated += 1;
        inner.render_target_storages.push(storage);
        Ok(id)
    }

    fn render_target_texture(&self, target: RenderTargetId) -> GlTexture {
        let inner = self.inner.lock();
        assert!(
            inner.render_targets.contains_key(&target),
            "render_target_texture on unknown target"
        );
        // Derived, stable id; render-target textures live outside the plane
        // texture set.
        GlTexture(1000 + target.0)
    }

    fn delete_render_target(&mut self, target: RenderTargetId) {
        let mut inner = self.inner.lock();
        assert!(
            inner.render_targets.remove(&target).is_some(),
            "delete_render_target on unknown target"
        );
    }

    fn run_parity_pass(
        &mut self,
        even_field: GlTexture,
        odd_field: GlTexture,
        source_target: SamplingTarget,
        target: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), InteropError> {
        let mut inner = self.inner.lock();
        if inner.fail_parity {
            return Err(InteropError::Gpu("parity program link failed".into()));
        }
        assert!(
            inner.render_targets.contains_key(&target),
            "parity pass into unknown render target"
        );
        inner.parity_passes.push(ParityPass {
            even: even_field,
            odd: odd_field,
            source_target,
            target,
            width,
            height,
        });
        Ok(())
    }

    fn note_errors(&mut self, _context: &str) {}
}
