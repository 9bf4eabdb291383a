//! Production GL backend.
//!
//! Resolves the GL and `GL_NV_vdpau_interop` entry points at runtime from a
//! caller-supplied `get_proc_address`, so there is no compile-time link
//! against a GL loader. The backend owns the plane textures, the
//! intermediate render targets (texture + framebuffer pairs) and the
//! row-parity program; the session drives it through [`GlInterop`].
//!
//! All calls must come from the thread owning the GL context. The raw
//! pointers inside keep the type `!Send`, which matches that requirement.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::ptr;

use bytemuck::{Pod, Zeroable};
use tracing::{debug, warn};

use crate::device::DeviceHandle;
use crate::frame::{InteropError, SamplingTarget, VideoSurfaceHandle};
use crate::interop::{
    GlInterop, GlTexture, PlaneStorage, RenderTargetId, SurfaceRegistration,
};

// ---------------------------------------------------------------------------
// GL types and constants (from gl.h / the extension spec)
// ---------------------------------------------------------------------------

type GLenum = u32;
type GLuint = u32;
type GLint = i32;
type GLsizei = i32;
type GLboolean = u8;
type GLchar = i8;
type GLvdpauSurfaceNV = isize;

const GL_NO_ERROR: GLenum = 0;
const GL_TRIANGLE_STRIP: GLenum = 0x0005;
const GL_UNSIGNED_BYTE: GLenum = 0x1401;
const GL_FLOAT: GLenum = 0x1406;
const GL_RED: GLenum = 0x1903;
const GL_NEAREST: GLint = 0x2600;
const GL_LINEAR: GLint = 0x2601;
const GL_TEXTURE_MAG_FILTER: GLenum = 0x2800;
const GL_TEXTURE_MIN_FILTER: GLenum = 0x2801;
const GL_TEXTURE_WRAP_S: GLenum = 0x2802;
const GL_TEXTURE_WRAP_T: GLenum = 0x2803;
const GL_TEXTURE_2D: GLenum = 0x0DE1;
const GL_TEXTURE_RECTANGLE: GLenum = 0x84F5;
const GL_CLAMP_TO_EDGE: GLint = 0x812F;
const GL_TEXTURE0: GLenum = 0x84C0;
const GL_R8: GLint = 0x8229;
const GL_RG8: GLint = 0x822B;
const GL_RG: GLenum = 0x8227;
const GL_READ_ONLY: GLenum = 0x88B8;
const GL_ARRAY_BUFFER: GLenum = 0x8892;
const GL_STREAM_DRAW: GLenum = 0x88E0;
const GL_FRAGMENT_SHADER: GLenum = 0x8B30;
const GL_VERTEX_SHADER: GLenum = 0x8B31;
const GL_COMPILE_STATUS: GLenum = 0x8B81;
const GL_LINK_STATUS: GLenum = 0x8B82;
const GL_COLOR_ATTACHMENT0: GLenum = 0x8CE0;
const GL_FRAMEBUFFER_COMPLETE: GLenum = 0x8CD5;
const GL_FRAMEBUFFER: GLenum = 0x8D40;

type GenTexturesFn = unsafe extern "system" fn(GLsizei, *mut GLuint);
type DeleteTexturesFn = unsafe extern "system" fn(GLsizei, *const GLuint);
type BindTextureFn = unsafe extern "system" fn(GLenum, GLuint);
type TexParameteriFn = unsafe extern "system" fn(GLenum, GLenum, GLint);
type TexImage2DFn = unsafe extern "system" fn(
    GLenum,
    GLint,
    GLint,
    GLsizei,
    GLsizei,
    GLint,
    GLenum,
    GLenum,
    *const c_void,
);
type ActiveTextureFn = unsafe extern "system" fn(GLenum);
type GetErrorFn = unsafe extern "system" fn() -> GLenum;
type ViewportFn = unsafe extern "system" fn(GLint, GLint, GLsizei, GLsizei);
type DrawArraysFn = unsafe extern "system" fn(GLenum, GLint, GLsizei);

type GenFramebuffersFn = unsafe extern "system" fn(GLsizei, *mut GLuint);
type DeleteFramebuffersFn = unsafe extern "system" fn(GLsizei, *const GLuint);
type BindFramebufferFn = unsafe extern "system" fn(GLenum, GLuint);
type FramebufferTexture2DFn =
    unsafe extern "system" fn(GLenum, GLenum, GLenum, GLuint, GLint);
type CheckFramebufferStatusFn = unsafe extern "system" fn(GLenum) -> GLenum;

type GenBuffersFn = unsafe extern "system" fn(GLsizei, *mut GLuint);
type DeleteBuffersFn = unsafe extern "system" fn(GLsizei, *const GLuint);
type BindBufferFn = unsafe extern "system" fn(GLenum, GLuint);
type BufferDataFn = unsafe extern "system" fn(GLenum, isize, *const c_void, GLenum);
type GenVertexArraysFn = unsafe extern "system" fn(GLsizei, *mut GLuint);
type DeleteVertexArraysFn = unsafe extern "system" fn(GLsizei, *const GLuint);
type BindVertexArrayFn = unsafe extern "system" fn(GLuint);
type EnableVertexAttribArrayFn = unsafe extern "system" fn(GLuint);
type VertexAttribPointerFn =
    unsafe extern "system" fn(GLuint, GLint, GLenum, GLboolean, GLsizei, *const c_void);

type CreateShaderFn = unsafe extern "system" fn(GLenum) -> GLuint;
type ShaderSourceFn =
    unsafe extern "system" fn(GLuint, GLsizei, *const *const GLchar, *const GLint);
type CompileShaderFn = unsafe extern "system" fn(GLuint);
type GetShaderivFn = unsafe extern "system" fn(GLuint, GLenum, *mut GLint);
type GetShaderInfoLogFn =
    unsafe extern "system" fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar);
type DeleteShaderFn = unsafe extern "system" fn(GLuint);
type CreateProgramFn = unsafe extern "system" fn() -> GLuint;
type AttachShaderFn = unsafe extern "system" fn(GLuint, GLuint);
type LinkProgramFn = unsafe extern "system" fn(GLuint);
type GetProgramivFn = unsafe extern "system" fn(GLuint, GLenum, *mut GLint);
type GetProgramInfoLogFn =
    unsafe extern "system" fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar);
type UseProgramFn = unsafe extern "system" fn(GLuint);
type DeleteProgramFn = unsafe extern "system" fn(GLuint);
type GetUniformLocationFn = unsafe extern "system" fn(GLuint, *const GLchar) -> GLint;
type Uniform1iFn = unsafe extern "system" fn(GLint, GLint);

type VdpauInitNvFn = unsafe extern "system" fn(*const c_void, *const c_void);
type VdpauFiniNvFn = unsafe extern "system" fn();
type VdpauRegisterVideoSurfaceNvFn = unsafe extern "system" fn(
    *const c_void,
    GLenum,
    GLsizei,
    *const GLuint,
) -> GLvdpauSurfaceNV;
type VdpauUnregisterSurfaceNvFn = unsafe extern "system" fn(GLvdpauSurfaceNV);
type VdpauSurfaceAccessNvFn = unsafe extern "system" fn(GLvdpauSurfaceNV, GLenum);
type VdpauMapSurfacesNvFn = unsafe extern "system" fn(GLsizei, *const GLvdpauSurfaceNV);
type VdpauUnmapSurfacesNvFn = unsafe extern "system" fn(GLsizei, *const GLvdpauSurfaceNV);

struct GlFns {
    gen_textures: GenTexturesFn,
    delete_textures: DeleteTexturesFn,
    bind_texture: BindTextureFn,
    tex_parameteri: TexParameteriFn,
    tex_image_2d: TexImage2DFn,
    active_texture: ActiveTextureFn,
    get_error: GetErrorFn,
    viewport: ViewportFn,
    draw_arrays: DrawArraysFn,
    gen_framebuffers: GenFramebuffersFn,
    delete_framebuffers: DeleteFramebuffersFn,
    bind_framebuffer: BindFramebufferFn,
    framebuffer_texture_2d: FramebufferTexture2DFn,
    check_framebuffer_status: CheckFramebufferStatusFn,
    gen_buffers: GenBuffersFn,
    delete_buffers: DeleteBuffersFn,
    bind_buffer: BindBufferFn,
    buffer_data: BufferDataFn,
    gen_vertex_arrays: GenVertexArraysFn,
    delete_vertex_arrays: DeleteVertexArraysFn,
    bind_vertex_array: BindVertexArrayFn,
    enable_vertex_attrib_array: EnableVertexAttribArrayFn,
    vertex_attrib_pointer: VertexAttribPointerFn,
    create_shader: CreateShaderFn,
    shader_source: ShaderSourceFn,
    compile_shader: CompileShaderFn,
    get_shaderiv: GetShaderivFn,
    get_shader_info_log: GetShaderInfoLogFn,
    delete_shader: DeleteShaderFn,
    create_program: CreateProgramFn,
    attach_shader: AttachShaderFn,
    link_program: LinkProgramFn,
    get_programiv: GetProgramivFn,
    get_program_info_log: GetProgramInfoLogFn,
    use_program: UseProgramFn,
    delete_program: DeleteProgramFn,
    get_uniform_location: GetUniformLocationFn,
    uniform_1i: Uniform1iFn,
    vdpau_init_nv: Option<VdpauInitNvFn>,
    vdpau_fini_nv: Option<VdpauFiniNvFn>,
    vdpau_register_video_surface_nv: Option<VdpauRegisterVideoSurfaceNvFn>,
    vdpau_unregister_surface_nv: Option<VdpauUnregisterSurfaceNvFn>,
    vdpau_surface_access_nv: Option<VdpauSurfaceAccessNvFn>,
    vdpau_map_surfaces_nv: Option<VdpauMapSurfacesNvFn>,
    vdpau_unmap_surfaces_nv: Option<VdpauUnmapSurfacesNvFn>,
}

/// Resolves a mandatory symbol, failing the whole load if it is absent.
macro_rules! required {
    ($loader:expr, $name:literal) => {{
        let ptr = $loader($name);
        if ptr.is_null() {
            return Err(InteropError::Gpu(format!(
                "GL entry point {} not found",
                $name
            )));
        }
        unsafe { std::mem::transmute(ptr) }
    }};
}

/// Resolves an extension symbol, yielding `None` if it is absent.
macro_rules! optional {
    ($loader:expr, $name:literal) => {{
        let ptr = $loader($name);
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { std::mem::transmute(ptr) })
        }
    }};
}

impl GlFns {
    fn load(loader: &mut dyn FnMut(&str) -> *const c_void) -> Result<Self, InteropError> {
        Ok(Self {
            gen_textures: required!(loader, "glGenTextures"),
            delete_textures: required!(loader, "glDeleteTextures"),
            bind_texture: required!(loader, "glBindTexture"),
            tex_parameteri: required!(loader, "glTexParameteri"),
            tex_image_2d: required!(loader, "glTexImage2D"),
            active_texture: required!(loader, "glActiveTexture"),
            get_error: required!(loader, "glGetError"),
            viewport: required!(loader, "glViewport"),
            draw_arrays: required!(loader, "glDrawArrays"),
            gen_framebuffers: required!(loader, "glGenFramebuffers"),
            delete_framebuffers: required!(loader, "glDeleteFramebuffers"),
            bind_framebuffer: required!(loader, "glBindFramebuffer"),
            framebuffer_texture_2d: required!(loader, "glFramebufferTexture2D"),
            check_framebuffer_status: required!(loader, "glCheckFramebufferStatus"),
            gen_buffers: required!(loader, "glGenBuffers"),
            delete_buffers: required!(loader, "glDeleteBuffers"),
            bind_buffer: required!(loader, "glBindBuffer"),
            buffer_data: required!(loader, "glBufferData"),
            gen_vertex_arrays: required!(loader, "glGenVertexArrays"),
            delete_vertex_arrays: required!(loader, "glDeleteVertexArrays"),
            bind_vertex_array: required!(loader, "glBindVertexArray"),
            enable_vertex_attrib_array: required!(loader, "glEnableVertexAttribArray"),
            vertex_attrib_pointer: required!(loader, "glVertexAttribPointer"),
            create_shader: required!(loader, "glCreateShader"),
            shader_source: required!(loader, "glShaderSource"),
            compile_shader: required!(loader, "glCompileShader"),
            get_shaderiv: required!(loader, "glGetShaderiv"),
            get_shader_info_log: required!(loader, "glGetShaderInfoLog"),
            delete_shader: required!(loader, "glDeleteShader"),
            create_program: required!(loader, "glCreateProgram"),
            attach_shader: required!(loader, "glAttachShader"),
            link_program: required!(loader, "glLinkProgram"),
            get_programiv: required!(loader, "glGetProgramiv"),
            get_program_info_log: required!(loader, "glGetProgramInfoLog"),
            use_program: required!(loader, "glUseProgram"),
            delete_program: required!(loader, "glDeleteProgram"),
            get_uniform_location: required!(loader, "glGetUniformLocation"),
            uniform_1i: required!(loader, "glUniform1i"),
            vdpau_init_nv: optional!(loader, "glVDPAUInitNV"),
            vdpau_fini_nv: optional!(loader, "glVDPAUFiniNV"),
            vdpau_register_video_surface_nv: optional!(loader, "glVDPAURegisterVideoSurfaceNV"),
            vdpau_unregister_surface_nv: optional!(loader, "glVDPAUUnregisterSurfaceNV"),
            vdpau_surface_access_nv: optional!(loader, "glVDPAUSurfaceAccessNV"),
            vdpau_map_surfaces_nv: optional!(loader, "glVDPAUMapSurfacesNV"),
            vdpau_unmap_surfaces_nv: optional!(loader, "glVDPAUUnmapSurfacesNV"),
        })
    }

    fn has_interop(&self) -> bool {
        self.vdpau_init_nv.is_some()
            && self.vdpau_fini_nv.is_some()
            && self.vdpau_register_video_surface_nv.is_some()
            && self.vdpau_unregister_surface_nv.is_some()
            && self.vdpau_surface_access_nv.is_some()
            && self.vdpau_map_surfaces_nv.is_some()
            && self.vdpau_unmap_surfaces_nv.is_some()
    }
}

// ---------------------------------------------------------------------------
// Parity program
// ---------------------------------------------------------------------------

const VERTEX_SHADER: &str = "\
#version 330
layout(location = 0) in vec2 position;
layout(location = 1) in vec2 texcoord;
out vec2 coord;
void main() {
    gl_Position = vec4(position, 0.0, 1.0);
    coord = texcoord;
}
";

// Even destination rows sample t0, odd rows t1. Both field textures hold
// half the destination height, so one source row serves two output rows.
const FRAGMENT_SHADER_RECT: &str = "\
#version 330
uniform sampler2DRect t0;
uniform sampler2DRect t1;
in vec2 coord;
out vec4 color;
void main() {
    color = fract(gl_FragCoord.y / 2.0) < 0.5
        ? texture(t0, coord)
        : texture(t1, coord);
}
";

const FRAGMENT_SHADER_2D: &str = "\
#version 330
uniform sampler2D t0;
uniform sampler2D t1;
in vec2 coord;
out vec4 color;
void main() {
    color = fract(gl_FragCoord.y / 2.0) < 0.5
        ? texture(t0, coord)
        : texture(t1, coord);
}
";

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    texcoord: [f32; 2],
}

struct ParityProgram {
    program: GLuint,
    vao: GLuint,
    vbo: GLuint,
    source_target: SamplingTarget,
}

struct RenderTarget {
    framebuffer: GLuint,
    texture: GLuint,
    width: u32,
    height: u32,
    storage: PlaneStorage,
}

fn gl_target(target: SamplingTarget) -> GLenum {
    match target {
        SamplingTarget::TwoD => GL_TEXTURE_2D,
        SamplingTarget::Rectangle => GL_TEXTURE_RECTANGLE,
    }
}

// VdpDevice and VdpVideoSurface are 32-bit handles smuggled through the
// extension's void-pointer parameters, per the extension spec.
fn handle_as_ptr(handle: u32) -> *const c_void {
    handle as usize as *const c_void
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// [`GlInterop`] over a live GL context with `GL_NV_vdpau_interop`.
pub struct GlVdpauBackend {
    fns: GlFns,
    /// `VdpGetProcAddress` of the decode device, handed to `VDPAUInitNV`.
    vdp_get_proc_address: *const c_void,
    initialized: bool,
    program: Option<ParityProgram>,
    render_targets: HashMap<RenderTargetId, RenderTarget>,
    next_render_target: u32,
}

impl GlVdpauBackend {
    /// Resolves all entry points through `get_proc_address`.
    ///
    /// Fails if a core GL symbol is missing. Missing `GL_NV_vdpau_interop`
    /// symbols are not an error here; they make [`supports_interop`] report
    /// false so session creation can fail over to another backend.
    ///
    /// `vdp_get_proc_address` is the device's `VdpGetProcAddress`, required
    /// by `VDPAUInitNV`.
    ///
    /// [`supports_interop`]: GlInterop::supports_interop
    pub fn load(
        mut get_proc_address: impl FnMut(&str) -> *const c_void,
        vdp_get_proc_address: *const c_void,
    ) -> Result<Self, InteropError> {
        let fns = GlFns::load(&mut get_proc_address)?;
        if !fns.has_interop() {
            debug!("GL context does not expose GL_NV_vdpau_interop");
        }
        Ok(Self {
            fns,
            vdp_get_proc_address,
            initialized: false,
            program: None,
            render_targets: HashMap::new(),
            next_render_target: 1,
        })
    }

    fn drain_errors(&self) -> GLenum {
        let mut last = GL_NO_ERROR;
        loop {
            let err = unsafe { (self.fns.get_error)() };
            if err == GL_NO_ERROR {
                return last;
            }
            last = err;
        }
    }

    fn compile_shader(&self, kind: GLenum, source: &str) -> Result<GLuint, InteropError> {
        let fns = &self.fns;
        unsafe {
            let shader = (fns.create_shader)(kind);
            let src = CString::new(source).map_err(|_| {
                InteropError::Gpu("shader source contains interior NUL".into())
            })?;
            let ptrs = [src.as_ptr()];
            let lens = [source.len() as GLint];
            (fns.shader_source)(shader, 1, ptrs.as_ptr(), lens.as_ptr());
            (fns.compile_shader)(shader);

            let mut status: GLint = 0;
            (fns.get_shaderiv)(shader, GL_COMPILE_STATUS, &mut status);
            if status == 0 {
                let mut log = vec![0 as GLchar; 1024];
                let mut len: GLsizei = 0;
                (fns.get_shader_info_log)(shader, log.len() as GLsizei, &mut len, log.as_mut_ptr());
                (fns.delete_shader)(shader);
                let log: Vec<u8> = log[..len.max(0) as usize].iter().map(|&c| c as u8).collect();
                return Err(InteropError::Gpu(format!(
                    "shader compilation failed: {}",
                    String::from_utf8_lossy(&log)
                )));
            }
            Ok(shader)
        }
    }

    fn build_program(&mut self, source_target: SamplingTarget) -> Result<(), InteropError> {
        let fragment_source = match source_target {
            SamplingTarget::TwoD => FRAGMENT_SHADER_2D,
            SamplingTarget::Rectangle => FRAGMENT_SHADER_RECT,
        };
        let vs = self.compile_shader(GL_VERTEX_SHADER, VERTEX_SHADER)?;
        let fs = match self.compile_shader(GL_FRAGMENT_SHADER, fragment_source) {
            Ok(fs) => fs,
            Err(err) => {
                unsafe { (self.fns.delete_shader)(vs) };
                return Err(err);
            }
        };

        let fns = &self.fns;
        unsafe {
            let program = (fns.create_program)();
            (fns.attach_shader)(program, vs);
            (fns.attach_shader)(program, fs);
            (fns.link_program)(program);
            (fns.delete_shader)(vs);
            (fns.delete_shader)(fs);

            let mut status: GLint = 0;
            (fns.get_programiv)(program, GL_LINK_STATUS, &mut status);
            if status == 0 {
                let mut log = vec![0 as GLchar; 1024];
                let mut len: GLsizei = 0;
                (fns.get_program_info_log)(
                    program,
                    log.len() as GLsizei,
                    &mut len,
                    log.as_mut_ptr(),
                );
                (fns.delete_program)(program);
                let log: Vec<u8> =
                    log[..len.max(0) as usize].iter().map(|&c| c as u8).collect();
                return Err(InteropError::Gpu(format!(
                    "parity program link failed: {}",
                    String::from_utf8_lossy(&log)
                )));
            }

            (fns.use_program)(program);
            let t0 = CString::new("t0").unwrap();
            let t1 = CString::new("t1").unwrap();
            (fns.uniform_1i)((fns.get_uniform_location)(program, t0.as_ptr()), 0);
            (fns.uniform_1i)((fns.get_uniform_location)(program, t1.as_ptr()), 1);

            let mut vao: GLuint = 0;
            (fns.gen_vertex_arrays)(1, &mut vao);
            (fns.bind_vertex_array)(vao);
            let mut vbo: GLuint = 0;
            (fns.gen_buffers)(1, &mut vbo);
            (fns.bind_buffer)(GL_ARRAY_BUFFER, vbo);
            let stride = std::mem::size_of::<Vertex>() as GLsizei;
            (fns.enable_vertex_attrib_array)(0);
            (fns.vertex_attrib_pointer)(0, 2, GL_FLOAT, 0, stride, ptr::null());
            (fns.enable_vertex_attrib_array)(1);
            (fns.vertex_attrib_pointer)(
                1,
                2,
                GL_FLOAT,
                0,
                stride,
                std::mem::size_of::<[f32; 2]>() as *const c_void,
            );
            (fns.bind_vertex_array)(0);
            (fns.use_program)(0);

            self.program = Some(ParityProgram {
                program,
                vao,
                vbo,
                source_target,
            });
        }
        Ok(())
    }

    fn delete_program(&mut self) {
        if let Some(p) = self.program.take() {
            let fns = &self.fns;
            unsafe {
                (fns.delete_program)(p.program);
                (fns.delete_vertex_arrays)(1, &p.vao);
                (fns.delete_buffers)(1, &p.vbo);
            }
        }
    }

    fn delete_target_objects(&mut self, target: RenderTarget) {
        let fns = &self.fns;
        unsafe {
            (fns.delete_framebuffers)(1, &target.framebuffer);
            (fns.delete_textures)(1, &target.texture);
        }
    }
}

impl GlInterop for GlVdpauBackend {
    fn supports_interop(&self) -> bool {
        self.fns.has_interop() && !self.vdp_get_proc_address.is_null()
    }

    fn init_interop(&mut self, device: DeviceHandle) -> Result<(), InteropError> {
        let init = self.fns.vdpau_init_nv.ok_or_else(|| {
            InteropError::MissingCapability("GL_NV_vdpau_interop not available".into())
        })?;
        self.drain_errors();
        unsafe { init(handle_as_ptr(device.0), self.vdp_get_proc_address) };
        let err = self.drain_errors();
        if err != GL_NO_ERROR {
            return Err(InteropError::Gpu(format!(
                "VDPAUInitNV failed with GL error 0x{err:x}"
            )));
        }
        self.initialized = true;
        Ok(())
    }

    fn fini_interop(&mut self) {
        if let Some(fini) = self.fns.vdpau_fini_nv {
            unsafe { fini() };
        }
        self.initialized = false;
    }

    fn create_plane_textures(
        &mut self,
        target: SamplingTarget,
    ) -> Result<[GlTexture; 4], InteropError> {
        let fns = &self.fns;
        let gl_tgt = gl_target(target);
        let mut names = [0 as GLuint; 4];
        unsafe {
            (fns.gen_textures)(4, names.as_mut_ptr());
            for &name in &names {
                (fns.bind_texture)(gl_tgt, name);
                (fns.tex_parameteri)(gl_tgt, GL_TEXTURE_MIN_FILTER, GL_NEAREST);
                (fns.tex_parameteri)(gl_tgt, GL_TEXTURE_MAG_FILTER, GL_NEAREST);
                (fns.tex_parameteri)(gl_tgt, GL_TEXTURE_WRAP_S, GL_CLAMP_TO_EDGE);
                (fns.tex_parameteri)(gl_tgt, GL_TEXTURE_WRAP_T, GL_CLAMP_TO_EDGE);
            }
            (fns.bind_texture)(gl_tgt, 0);
        }
        let err = self.drain_errors();
        if err != GL_NO_ERROR {
            unsafe { (fns.delete_textures)(4, names.as_ptr()) };
            return Err(InteropError::Gpu(format!(
                "plane texture setup failed with GL error 0x{err:x}"
            )));
        }
        Ok(names.map(GlTexture))
    }

    fn delete_plane_textures(&mut self, textures: [GlTexture; 4]) {
        let names = textures.map(|t| t.0);
        unsafe { (self.fns.delete_textures)(4, names.as_ptr()) };
    }

    fn register_video_surface(
        &mut self,
        surface: VideoSurfaceHandle,
        target: SamplingTarget,
        planes: &[GlTexture; 4],
    ) -> Result<SurfaceRegistration, InteropError> {
        let register = self.fns.vdpau_register_video_surface_nv.ok_or_else(|| {
            InteropError::MissingCapability("GL_NV_vdpau_interop not available".into())
        })?;
        let names = planes.map(|t| t.0);
        let handle = unsafe {
            register(
                handle_as_ptr(surface.0),
                gl_target(target),
                names.len() as GLsizei,
                names.as_ptr(),
            )
        };
        if handle == 0 {
            return Err(InteropError::Registration(format!(
                "VDPAURegisterVideoSurfaceNV failed for surface {surface}"
            )));
        }
        Ok(SurfaceRegistration(handle as u64))
    }

    fn set_access_read_only(&mut self, registration: SurfaceRegistration) {
        if let Some(access) = self.fns.vdpau_surface_access_nv {
            unsafe { access(registration.0 as GLvdpauSurfaceNV, GL_READ_ONLY) };
        }
    }

    fn map_surface(&mut self, registration: SurfaceRegistration) -> Result<(), InteropError> {
        let map = self.fns.vdpau_map_surfaces_nv.ok_or_else(|| {
            InteropError::MissingCapability("GL_NV_vdpau_interop not available".into())
        })?;
        self.drain_errors();
        let handle = registration.0 as GLvdpauSurfaceNV;
        unsafe { map(1, &handle) };
        let err = self.drain_errors();
        if err != GL_NO_ERROR {
            return Err(InteropError::MapFailed(format!(
                "VDPAUMapSurfacesNV failed with GL error 0x{err:x}"
            )));
        }
        Ok(())
    }

    fn unmap_surface(&mut self, registration: SurfaceRegistration) {
        if let Some(unmap) = self.fns.vdpau_unmap_surfaces_nv {
            let handle = registration.0 as GLvdpauSurfaceNV;
            unsafe { unmap(1, &handle) };
        }
    }

    fn unregister_surface(&mut self, registration: SurfaceRegistration) {
        if let Some(unregister) = self.fns.vdpau_unregister_surface_nv {
            unsafe { unregister(registration.0 as GLvdpauSurfaceNV) };
        }
    }

    fn invalidate(&mut self) {
        // The device behind the interop binding is gone; outstanding
        // registration handles are dangling and must not be passed back to
        // the driver. There is nothing to free on the GL side.
        self.initialized = false;
    }

    fn ensure_render_target(
        &mut self,
        existing: Option<RenderTargetId>,
        width: u32,
        height: u32,
        storage: PlaneStorage,
    ) -> Result<RenderTargetId, InteropError> {
        if let Some(id) = existing {
            match self.render_targets.get(&id) {
                Some(t) if t.width == width && t.height == height && t.storage == storage => {
                    return Ok(id);
                }
                _ => self.delete_render_target(id),
            }
        }

        let (internal, format) = match storage {
            PlaneStorage::R8 => (GL_R8, GL_RED),
            PlaneStorage::Rg8 => (GL_RG8, GL_RG),
        };
        let fns = &self.fns;
        let mut texture: GLuint = 0;
        let mut framebuffer: GLuint = 0;
        unsafe {
            (fns.gen_textures)(1, &mut texture);
            (fns.bind_texture)(GL_TEXTURE_2D, texture);
            (fns.tex_image_2d)(
                GL_TEXTURE_2D,
                0,
                internal,
                width as GLsizei,
                height as GLsizei,
                0,
                format,
                GL_UNSIGNED_BYTE,
                ptr::null(),
            );
            (fns.tex_parameteri)(GL_TEXTURE_2D, GL_TEXTURE_MIN_FILTER, GL_LINEAR);
            (fns.tex_parameteri)(GL_TEXTURE_2D, GL_TEXTURE_MAG_FILTER, GL_LINEAR);
            (fns.tex_parameteri)(GL_TEXTURE_2D, GL_TEXTURE_WRAP_S, GL_CLAMP_TO_EDGE);
            (fns.tex_parameteri)(GL_TEXTURE_2D, GL_TEXTURE_WRAP_T, GL_CLAMP_TO_EDGE);
            (fns.bind_texture)(GL_TEXTURE_2D, 0);

            (fns.gen_framebuffers)(1, &mut framebuffer);
            (fns.bind_framebuffer)(GL_FRAMEBUFFER, framebuffer);
            (fns.framebuffer_texture_2d)(
                GL_FRAMEBUFFER,
                GL_COLOR_ATTACHMENT0,
                GL_TEXTURE_2D,
                texture,
                0,
            );
            let status = (fns.check_framebuffer_status)(GL_FRAMEBUFFER);
            (fns.bind_framebuffer)(GL_FRAMEBUFFER, 0);
            if status != GL_FRAMEBUFFER_COMPLETE {
                (fns.delete_framebuffers)(1, &framebuffer);
                (fns.delete_textures)(1, &texture);
                return Err(InteropError::Gpu(format!(
                    "render target framebuffer incomplete, status 0x{status:x}"
                )));
            }
        }

        let id = RenderTargetId(self.next_render_target);
        self.next_render_target += 1;
        self.render_targets.insert(
            id,
            RenderTarget {
                framebuffer,
                texture,
                width,
                height,
                storage,
            },
        );
        Ok(id)
    }

    fn render_target_texture(&self, target: RenderTargetId) -> GlTexture {
        GlTexture(
            self.render_targets
                .get(&target)
                .map(|t| t.texture)
                .unwrap_or(0),
        )
    }

    fn delete_render_target(&mut self, target: RenderTargetId) {
        if let Some(t) = self.render_targets.remove(&target) {
            self.delete_target_objects(t);
        }
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
        match &self.program {
            Some(p) if p.source_target == source_target => {}
            _ => {
                self.delete_program();
                self.build_program(source_target)?;
            }
        }

        // Texture coordinates span the source field's texel space: the full
        // width, half the destination height. 2D targets use normalized
        // coordinates instead.
        let (tw, th) = match source_target {
            SamplingTarget::Rectangle => (width as f32, height as f32 / 2.0),
            SamplingTarget::TwoD => (1.0, 1.0),
        };
        let mut vertices = [Vertex::zeroed(); 4];
        for (n, v) in vertices.iter_mut().enumerate() {
            let x = (n / 2) as f32;
            let y = (n % 2) as f32;
            v.position = [x * 2.0 - 1.0, y * 2.0 - 1.0];
            v.texcoord = [x * tw, y * th];
        }

        let framebuffer = self
            .render_targets
            .get(&target)
            .map(|t| t.framebuffer)
            .ok_or(InteropError::NotConfigured)?;
        let program = self.program.as_ref().ok_or(InteropError::NotConfigured)?;
        let gl_tgt = gl_target(source_target);
        let fns = &self.fns;
        unsafe {
            (fns.bind_framebuffer)(GL_FRAMEBUFFER, framebuffer);
            (fns.viewport)(0, 0, width as GLsizei, height as GLsizei);
            (fns.use_program)(program.program);

            (fns.active_texture)(GL_TEXTURE0);
            (fns.bind_texture)(gl_tgt, even_field.0);
            (fns.active_texture)(GL_TEXTURE0 + 1);
            (fns.bind_texture)(gl_tgt, odd_field.0);

            (fns.bind_vertex_array)(program.vao);
            (fns.bind_buffer)(GL_ARRAY_BUFFER, program.vbo);
            let bytes: &[u8] = bytemuck::cast_slice(&vertices);
            (fns.buffer_data)(
                GL_ARRAY_BUFFER,
                bytes.len() as isize,
                bytes.as_ptr() as *const c_void,
                GL_STREAM_DRAW,
            );
            (fns.draw_arrays)(GL_TRIANGLE_STRIP, 0, 4);

            (fns.bind_vertex_array)(0);
            (fns.active_texture)(GL_TEXTURE0 + 1);
            (fns.bind_texture)(gl_tgt, 0);
            (fns.active_texture)(GL_TEXTURE0);
            (fns.bind_texture)(gl_tgt, 0);
            (fns.use_program)(0);
            (fns.bind_framebuffer)(GL_FRAMEBUFFER, 0);
        }
        let err = self.drain_errors();
        if err != GL_NO_ERROR {
            return Err(InteropError::Gpu(format!(
                "parity pass failed with GL error 0x{err:x}"
            )));
        }
        Ok(())
    }

    fn note_errors(&mut self, context: &str) {
        loop {
            let err = unsafe { (self.fns.get_error)() };
            if err == GL_NO_ERROR {
                break;
            }
            warn!("GL error 0x{err:x} {context}");
        }
    }
}

impl Drop for GlVdpauBackend {
    fn drop(&mut self) {
        self.delete_program();
        for (_, target) in std::mem::take(&mut self.render_targets) {
            self.delete_target_objects(target);
        }
        if self.initialized {
            self.fini_interop();
        }
    }
}
