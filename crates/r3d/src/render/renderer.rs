//! # Renderer
//!
//! Owns the device and every pipeline resource, collects draws between
//! [`Renderer::begin`] and [`Renderer::end`], and runs the passes in order when
//! the frame ends:
//!
//! 1. light culling and shadow maps
//! 2. camera culling and optional distance sorting
//! 3. G-buffer, decals, screen-space effects, lighting, ambient and compose
//!    (or a depth clear when nothing opaque was drawn)
//! 4. background
//! 5. prepass and forward transparency
//! 6. post chain: fog, depth of field, bloom, output, FXAA
//! 7. blit to the screen or a [`RenderTexture`]
//!
//! External GPU state is restored once the frame finishes, whichever way it
//! finishes.

use crate::config::RendererConfig;
use crate::foundation::bounds::BoundingBox;
use crate::foundation::math::{utils, Color, Mat4, Vec3};
use crate::foundation::time::Timer;
use crate::render::api::{
    Attachment, FramebufferId, RenderDevice, TextureDesc, TextureFormat, TextureId, TextureTarget,
};
use crate::render::camera::Camera;
use crate::render::draw::{DrawCategory, DrawCollector, DrawGroup, Instances, SortOrder};
use crate::render::environment::{BloomMode, DofMode, Environment, FogMode};
use crate::render::frame::{FrameContext, Layers, RenderFlags, ViewState, ViewUniforms};
use crate::render::lights::{Light, LightId, LightKind, LightManager};
use crate::render::material::Material;
use crate::render::mesh::{Decal, Mesh, MeshData, Model, ParticleSystem};
use crate::render::passes::{deferred, post, scene, shadow, PassContext, PassResources};
use crate::render::shader::{ShaderId, ShaderRegistry, VIEW_BLOCK_BINDING};
use crate::render::state::{ExternalState, ExternalStateGuard};
use crate::render::targets::RenderTargets;
use crate::render::{RenderError, RenderResult};

/// Offscreen color and depth target a frame can be rendered into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTexture {
    /// Framebuffer the final image is blitted to
    pub framebuffer: FramebufferId,
    /// RGBA8 color attachment
    pub color: TextureId,
    /// Depth attachment
    pub depth: TextureId,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl RenderTexture {
    /// Allocate the attachments and framebuffer
    pub fn new(device: &mut dyn RenderDevice, width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!("Invalid render texture size {width}x{height}")));
        }
        let color = device.create_texture(&TextureDesc::texture_2d(width, height, TextureFormat::Rgba8), None)?;
        let depth = match device.create_texture(&TextureDesc::texture_2d(width, height, TextureFormat::Depth24), None) {
            Ok(depth) => depth,
            Err(e) => {
                device.delete_texture(color);
                return Err(e);
            }
        };
        let framebuffer = match device.create_framebuffer() {
            Ok(fb) => fb,
            Err(e) => {
                device.delete_texture(depth);
                device.delete_texture(color);
                return Err(e);
            }
        };
        device.bind_framebuffer(Some(framebuffer));
        device.framebuffer_texture(Attachment::Color(0), TextureTarget::Texture2D, Some(color), 0);
        device.framebuffer_texture(Attachment::Depth, TextureTarget::Texture2D, Some(depth), 0);
        device.draw_buffers(1);
        let complete = device.framebuffer_complete();
        device.bind_framebuffer(None);

        let texture = Self { framebuffer, color, depth, width, height };
        if !complete {
            texture.destroy(device);
            return Err(RenderError::ResourceCreationFailed(format!("Incomplete render texture {width}x{height}")));
        }
        Ok(texture)
    }

    /// Release the framebuffer and attachments
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        device.delete_framebuffer(self.framebuffer);
        device.delete_texture(self.depth);
        device.delete_texture(self.color);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Output {
    framebuffer: Option<FramebufferId>,
    size: (u32, u32),
}

/// Passes that ran during the last `end`, by debug group label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Lights whose shadow maps were rendered
    pub shadow_maps: usize,
    /// Draw calls submitted
    pub draw_calls: usize,
    /// Labels of the passes, in execution order
    pub passes: Vec<&'static str>,
}

/// The deferred/forward renderer
pub struct Renderer {
    device: Box<dyn RenderDevice>,
    config: RendererConfig,
    frame: FrameContext,
    targets: RenderTargets,
    resources: PassResources,
    view_uniforms: ViewUniforms,
    custom: ShaderRegistry,
    draws: DrawCollector,
    lights: LightManager,
    timer: Timer,
    state: FrameState,
    screen_size: (u32, u32),
    output: Output,
    stats: FrameStats,
    pre_frame_flush: Option<Box<dyn FnMut()>>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("backend", &self.device.backend_name())
            .field("resolution", &self.targets.resolution())
            .field("state", &self.state)
            .field("lights", &self.lights.len())
            .field("custom_shaders", &self.custom.len())
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Build every pipeline resource on `device`
    pub fn new(mut device: Box<dyn RenderDevice>, config: RendererConfig) -> RenderResult<Self> {
        config.validate().map_err(RenderError::InitializationFailed)?;
        let (width, height) = config.resolution;
        let low_precision = config.flags.contains(RenderFlags::LOW_PRECISION_BUFFERS);

        let resources = PassResources::new(device.as_mut())
            .map_err(|e| RenderError::InitializationFailed(format!("Pipeline resources: {e}")))?;
        let mut targets = match RenderTargets::new(device.as_mut(), width, height, low_precision) {
            Ok(targets) => targets,
            Err(e) => {
                resources.destroy(device.as_mut());
                return Err(RenderError::InitializationFailed(format!("Render targets: {e}")));
            }
        };
        let view_uniforms = match ViewUniforms::new(device.as_mut()) {
            Ok(uniforms) => uniforms,
            Err(e) => {
                targets.destroy(device.as_mut());
                resources.destroy(device.as_mut());
                return Err(RenderError::InitializationFailed(format!("View uniforms: {e}")));
            }
        };

        log::info!("Renderer created on {} at {}x{}", device.backend_name(), width, height);
        Ok(Self {
            frame: FrameContext::new(config.resolution, config.flags, config.environment.clone()),
            lights: LightManager::new(config.default_shadow_resolution),
            screen_size: config.resolution,
            output: Output { framebuffer: None, size: config.resolution },
            device,
            config,
            targets,
            resources,
            view_uniforms,
            custom: ShaderRegistry::new(),
            draws: DrawCollector::new(),
            timer: Timer::new(),
            state: FrameState::Idle,
            stats: FrameStats::default(),
            pre_frame_flush: None,
        })
    }

    // ---- Frame ----

    /// Start recording a frame rendered to the screen
    pub fn begin(&mut self, camera: &Camera) {
        let output = Output { framebuffer: None, size: self.screen_size };
        self.begin_frame(camera, output);
    }

    /// Start recording a frame rendered into `target`
    pub fn begin_with_target(&mut self, camera: &Camera, target: &RenderTexture) {
        let output = Output { framebuffer: Some(target.framebuffer), size: (target.width, target.height) };
        self.begin_frame(camera, output);
    }

    fn begin_frame(&mut self, camera: &Camera, output: Output) {
        if self.state == FrameState::Recording {
            log::warn!("begin called while a frame is already recording; previous draws discarded");
        }
        if let Some(flush) = self.pre_frame_flush.as_mut() {
            flush();
        }

        self.timer.update();
        self.lights.tick(self.timer.delta_time());
        self.draws.clear();
        self.output = output;
        self.frame.view = ViewState::from_camera(camera, self.frame.aspect(), self.config.cull_near, self.config.cull_far);
        self.state = FrameState::Recording;
        log::trace!("Frame {} recording", self.timer.frame_count());
    }

    /// Run every pass and present the result
    ///
    /// Calling `end` without `begin` does nothing.
    pub fn end(&mut self) -> RenderResult<()> {
        if self.state != FrameState::Recording {
            log::warn!("end called without begin; ignored");
            return Ok(());
        }
        self.state = FrameState::Idle;

        let Self { device, frame, targets, resources, view_uniforms, custom, draws, lights, output, stats, screen_size, .. } =
            self;
        let (width, height) = *screen_size;
        let mut guard = ExternalStateGuard::acquire(device.as_mut(), ExternalState::for_output(width, height));

        stats.passes.clear();
        stats.draw_calls = draws.total_calls();
        view_uniforms.upload_and_bind(guard.device(), &frame.view, VIEW_BLOCK_BINDING);

        lights.update_and_cull(&frame.view.frustum, frame.view.position);
        stats.shadow_maps = shadow::render(guard.device(), frame, targets, resources, custom, draws, lights);
        if stats.shadow_maps > 0 {
            stats.passes.push("shadow");
        }

        if frame.flags.contains(RenderFlags::NO_FRUSTUM_CULLING) {
            draws.set_all_visible();
        } else {
            draws.compute_visible_groups(&frame.view.frustum);
        }
        sort_draws(draws, frame);

        {
            let mut ctx = PassContext::new(guard.device(), frame, targets, resources, custom, draws, lights);
            render_scene(&mut ctx, &mut stats.passes)?;
            render_post(&mut ctx, &mut stats.passes)?;
        }

        let device = guard.device();
        device.push_debug_group("blit");
        let result = targets.blit_to(
            device,
            output.framebuffer,
            output.size,
            frame.flags.contains(RenderFlags::ASPECT_KEEP),
            frame.flags.contains(RenderFlags::BLIT_LINEAR),
        );
        device.pop_debug_group();
        result?;
        stats.passes.push("blit");
        Ok(())
    }

    /// True between `begin` and `end`
    pub fn is_recording(&self) -> bool {
        self.state == FrameState::Recording
    }

    /// What the last `end` did
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Register a callback run at the start of every `begin`, before draws are reset
    ///
    /// Hosts that batch their own 2D drawing flush it here so it lands before the 3D frame.
    pub fn set_pre_frame_flush(&mut self, flush: impl FnMut() + 'static) {
        self.pre_frame_flush = Some(Box::new(flush));
    }

    // ---- Draw submission ----

    fn resolve<'m>(material: Option<&'m Material>, fallback: &'m Material) -> &'m Material {
        material.unwrap_or(fallback)
    }

    fn layer_visible(&self, mesh: &Mesh) -> bool {
        mesh.layer_mask.intersects(self.frame.active_layers)
    }

    fn push_mesh(&mut self, group: DrawGroup, mesh: &Mesh, material: Option<&Material>) {
        if !self.layer_visible(mesh) {
            return;
        }
        let fallback = Material::default();
        self.draws.push_group(group);
        self.draws.push_call(mesh, Self::resolve(material, &fallback), false);
    }

    fn push_model(&mut self, group: DrawGroup, model: &Model) {
        if !model.meshes.iter().any(|m| self.layer_visible(m)) {
            return;
        }
        let fallback = Material::default();
        self.draws.push_group(group.with_skin(model.skin_texture()));
        for (i, mesh) in model.meshes.iter().enumerate() {
            if !self.layer_visible(mesh) {
                continue;
            }
            let material = model.material_for(i).unwrap_or(&fallback);
            self.draws.push_call(mesh, material, false);
        }
    }

    /// Draw a mesh; `None` uses the default material
    pub fn draw_mesh(&mut self, mesh: &Mesh, material: Option<&Material>, transform: &Mat4) {
        self.push_mesh(DrawGroup::new(*transform, mesh.aabb), mesh, material);
    }

    /// Draw a mesh once per transform
    pub fn draw_mesh_instanced(&mut self, mesh: &Mesh, material: Option<&Material>, transforms: &[Mat4]) {
        self.draw_mesh_instanced_pro(mesh, material, None, &Mat4::identity(), transforms, None);
    }

    /// Draw a mesh once per transform with a color per instance
    pub fn draw_mesh_instanced_ex(&mut self, mesh: &Mesh, material: Option<&Material>, transforms: &[Mat4], colors: &[Color]) {
        self.draw_mesh_instanced_pro(mesh, material, None, &Mat4::identity(), transforms, Some(colors));
    }

    /// Draw a mesh once per transform under a shared transform
    ///
    /// `global_aabb` bounds every instance in the shared space and enables
    /// culling; without it the group is always considered visible. An empty
    /// `transforms` slice draws nothing.
    pub fn draw_mesh_instanced_pro(
        &mut self,
        mesh: &Mesh,
        material: Option<&Material>,
        global_aabb: Option<&BoundingBox>,
        global_transform: &Mat4,
        transforms: &[Mat4],
        colors: Option<&[Color]>,
    ) {
        let Some(instances) = make_instances(transforms, colors) else { return };
        let aabb = global_aabb.copied().unwrap_or_default();
        let group = DrawGroup::new(*global_transform, aabb).with_instances(instances);
        self.push_mesh(group, mesh, material);
    }

    /// Draw a model at a position with a uniform scale
    pub fn draw_model(&mut self, model: &Model, position: Vec3, scale: f32) {
        let transform = Mat4::new_translation(&position) * Mat4::new_scaling(scale);
        self.draw_model_pro(model, &transform);
    }

    /// Draw a model with a rotation of `angle` degrees around `axis`
    pub fn draw_model_ex(&mut self, model: &Model, position: Vec3, axis: Vec3, angle: f32, scale: Vec3) {
        let transform = utils::scale_rotation_translation(scale, axis, utils::deg_to_rad(angle), position);
        self.draw_model_pro(model, &transform);
    }

    /// Draw a model with a full transform
    pub fn draw_model_pro(&mut self, model: &Model, transform: &Mat4) {
        self.push_model(DrawGroup::new(*transform, model.aabb), model);
    }

    /// Draw a model once per transform
    pub fn draw_model_instanced(&mut self, model: &Model, transforms: &[Mat4]) {
        self.draw_model_instanced_pro(model, None, &Mat4::identity(), transforms, None);
    }

    /// Draw a model once per transform with a color per instance
    pub fn draw_model_instanced_ex(&mut self, model: &Model, transforms: &[Mat4], colors: &[Color]) {
        self.draw_model_instanced_pro(model, None, &Mat4::identity(), transforms, Some(colors));
    }

    /// Instanced model draw under a shared transform, see [`draw_mesh_instanced_pro`](Self::draw_mesh_instanced_pro)
    pub fn draw_model_instanced_pro(
        &mut self,
        model: &Model,
        global_aabb: Option<&BoundingBox>,
        global_transform: &Mat4,
        transforms: &[Mat4],
        colors: Option<&[Color]>,
    ) {
        let Some(instances) = make_instances(transforms, colors) else { return };
        let aabb = global_aabb.copied().unwrap_or_default();
        self.push_model(DrawGroup::new(*global_transform, aabb).with_instances(instances), model);
    }

    /// Project a decal inside the unit cube placed by `transform`
    pub fn draw_decal(&mut self, decal: &Decal, transform: &Mat4) {
        let cube = &self.resources.primitives.cube;
        self.draws.push_group(DrawGroup::new(*transform, cube.aabb));
        self.draws.push_call(cube, &decal.material, true);
    }

    /// Project a decal once per transform
    pub fn draw_decal_instanced(&mut self, decal: &Decal, transforms: &[Mat4]) {
        let Some(instances) = make_instances(transforms, None) else { return };
        self.draws.push_group(DrawGroup::new(Mat4::identity(), BoundingBox::default()).with_instances(instances));
        self.draws.push_call(&self.resources.primitives.cube, &decal.material, true);
    }

    /// Draw the live particles of a system as instances of `mesh`
    pub fn draw_particle_system(&mut self, system: &ParticleSystem, mesh: &Mesh, material: Option<&Material>) {
        self.draw_particle_system_ex(system, mesh, material, &Mat4::identity());
    }

    /// Draw the live particles of a system under a transform
    pub fn draw_particle_system_ex(&mut self, system: &ParticleSystem, mesh: &Mesh, material: Option<&Material>, transform: &Mat4) {
        let (transforms, colors) = system.instances();
        self.draw_mesh_instanced_pro(mesh, material, Some(&system.aabb), transform, &transforms, Some(&colors));
    }

    // ---- Custom shaders and materials ----

    /// Compile user fragment logic into a geometry shader
    pub fn create_custom_shader(&mut self, code: &str) -> RenderResult<ShaderId> {
        self.custom.create(self.device.as_mut(), code)
    }

    /// Release a custom shader
    ///
    /// Materials still holding the handle fall back to the default geometry program.
    pub fn destroy_custom_shader(&mut self, id: ShaderId) -> bool {
        self.custom.destroy(self.device.as_mut(), id)
    }

    /// Live custom shaders
    pub fn custom_shaders(&self) -> &ShaderRegistry {
        &self.custom
    }

    /// Free the textures of a material, leaving default textures alone
    pub fn unload_material(&mut self, material: &Material) {
        material.unload(self.device.as_mut(), &self.resources.defaults);
    }

    // ---- Resources ----

    /// Upload mesh data
    pub fn upload_mesh(&mut self, data: &MeshData) -> RenderResult<Mesh> {
        Mesh::upload(self.device.as_mut(), data)
    }

    /// Release a mesh
    pub fn unload_mesh(&mut self, mesh: &Mesh) {
        mesh.unload(self.device.as_mut());
    }

    /// Load an image file as a mipmapped texture
    pub fn load_texture(&mut self, path: impl AsRef<std::path::Path>) -> RenderResult<TextureId> {
        crate::render::textures::load_texture(self.device.as_mut(), path)
    }

    /// Allocate an offscreen target for [`begin_with_target`](Self::begin_with_target)
    pub fn create_render_texture(&mut self, width: u32, height: u32) -> RenderResult<RenderTexture> {
        RenderTexture::new(self.device.as_mut(), width, height)
    }

    /// Release an offscreen target
    pub fn destroy_render_texture(&mut self, target: &RenderTexture) {
        target.destroy(self.device.as_mut());
    }

    /// Direct device access for resources the renderer does not wrap
    pub fn device_mut(&mut self) -> &mut dyn RenderDevice {
        self.device.as_mut()
    }

    // ---- Lights ----

    /// Create a light with defaults
    pub fn create_light(&mut self, kind: LightKind) -> LightId {
        self.lights.create(kind)
    }

    /// Destroy a light and its shadow map
    pub fn destroy_light(&mut self, id: LightId) {
        self.lights.destroy(self.device.as_mut(), id);
    }

    /// Light by handle
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    /// Mutable light by handle
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    /// Turn shadows on; `0` picks the configured default resolution
    pub fn enable_shadow(&mut self, id: LightId, resolution: u32) {
        self.lights.enable_shadow(id, resolution);
    }

    /// Turn shadows off and free the map
    pub fn disable_shadow(&mut self, id: LightId) {
        self.lights.disable_shadow(self.device.as_mut(), id);
    }

    /// Request a refresh of a manually updated shadow map
    pub fn update_shadow_map(&mut self, id: LightId) {
        self.lights.update_shadow_map(id);
    }

    /// Place a light and aim it at `target`
    pub fn light_look_at(&mut self, id: LightId, position: Vec3, target: Vec3) {
        self.lights.look_at(id, position, target);
    }

    // ---- Settings ----

    /// Current flags
    pub fn flags(&self) -> RenderFlags {
        self.frame.flags
    }

    /// Replace the flags; switching buffer precision re-creates the targets
    pub fn set_flags(&mut self, flags: RenderFlags) -> RenderResult<()> {
        let precision_changed = (flags ^ self.frame.flags).contains(RenderFlags::LOW_PRECISION_BUFFERS);
        self.frame.flags = flags;
        self.config.flags = flags;
        if precision_changed {
            let (width, height) = self.targets.resolution();
            self.recreate_targets(width, height)?;
        }
        Ok(())
    }

    /// Layers drawn from now on
    pub fn set_active_layers(&mut self, layers: Layers) {
        self.frame.active_layers = layers;
    }

    /// Layers currently drawn
    pub fn active_layers(&self) -> Layers {
        self.frame.active_layers
    }

    /// Current environment
    pub fn environment(&self) -> &Environment {
        &self.frame.environment
    }

    /// Mutable environment, read by the next `end`
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.frame.environment
    }

    /// Replace the environment
    pub fn set_environment(&mut self, environment: Environment) {
        self.frame.environment = environment;
    }

    /// Size of the default output surface
    pub fn set_screen_size(&mut self, width: u32, height: u32) {
        self.screen_size = (width, height);
    }

    /// Internal resolution
    pub fn resolution(&self) -> (u32, u32) {
        self.targets.resolution()
    }

    /// Change the internal resolution, re-creating every target
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.recreate_targets(width, height)?;
        self.config.resolution = (width, height);
        self.frame.resolution = (width, height);
        log::debug!("Renderer resized to {width}x{height}");
        Ok(())
    }

    fn recreate_targets(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let low_precision = self.frame.flags.contains(RenderFlags::LOW_PRECISION_BUFFERS);
        self.targets.destroy(self.device.as_mut());
        self.targets = RenderTargets::new(self.device.as_mut(), width, height, low_precision)?;
        Ok(())
    }

    /// Release every GPU resource the renderer owns
    pub fn shutdown(mut self) {
        let device = self.device.as_mut();
        self.lights.destroy_all(device);
        self.custom.destroy_all(device);
        self.targets.destroy(device);
        self.view_uniforms.destroy(device);
        self.resources.destroy(device);
        log::info!("Renderer shut down");
    }
}

/// Instance data for a submission, `None` when there is nothing to draw
///
/// Colors shorter than the transforms are ignored.
fn make_instances(transforms: &[Mat4], colors: Option<&[Color]>) -> Option<Instances> {
    if transforms.is_empty() {
        return None;
    }
    let colors = match colors {
        Some(colors) if colors.len() >= transforms.len() => Some(colors[..transforms.len()].to_vec()),
        Some(colors) => {
            log::debug!("Instance colors ignored: {} colors for {} transforms", colors.len(), transforms.len());
            None
        }
        None => None,
    };
    Some(Instances { transforms: transforms.to_vec(), colors })
}

fn sort_draws(draws: &mut DrawCollector, frame: &FrameContext) {
    let eye = frame.view.position;
    if frame.flags.contains(RenderFlags::OPAQUE_SORTING) {
        draws.sort(DrawCategory::Deferred, eye, SortOrder::FrontToBack);
    }
    if frame.flags.contains(RenderFlags::TRANSPARENT_SORTING) {
        draws.sort(DrawCategory::Prepass, eye, SortOrder::BackToFront);
        draws.sort(DrawCategory::Forward, eye, SortOrder::BackToFront);
    }
}

type PassFn = fn(&mut PassContext<'_>) -> RenderResult<()>;

fn run(ctx: &mut PassContext<'_>, passes: &mut Vec<&'static str>, label: &'static str, pass: PassFn) -> RenderResult<()> {
    ctx.group(label, pass)?;
    passes.push(label);
    Ok(())
}

fn render_scene(ctx: &mut PassContext<'_>, passes: &mut Vec<&'static str>) -> RenderResult<()> {
    let frame = ctx.frame;
    let draws = ctx.draws;
    let lights = ctx.lights;
    let env = &frame.environment;

    if draws.has_deferred() {
        run(ctx, passes, "geometry", |c| {
            scene::clear_gbuffer(c)?;
            scene::geometry(c)
        })?;
        if draws.has_decals() {
            run(ctx, passes, "decals", scene::decals)?;
        }
        if env.ssao.enabled {
            run(ctx, passes, "ssao", deferred::ssao)?;
        }
        if lights.visible().next().is_some() {
            run(ctx, passes, "lighting", deferred::lighting)?;
        }
        if env.ssil.enabled {
            run(ctx, passes, "ssil", deferred::ssil)?;
        }
        if env.ssr.enabled {
            run(ctx, passes, "ssr", deferred::ssr)?;
        }
        run(ctx, passes, "ambient", deferred::ambient)?;
        run(ctx, passes, "compose", deferred::compose)?;
    } else {
        run(ctx, passes, "clear", scene::clear_depth)?;
    }

    run(ctx, passes, "background", scene::background)?;

    if draws.has_forward() {
        if draws.count(DrawCategory::Prepass) > 0 {
            run(ctx, passes, "prepass", scene::prepass)?;
        }
        run(ctx, passes, "forward", scene::forward)?;
    }
    Ok(())
}

fn render_post(ctx: &mut PassContext<'_>, passes: &mut Vec<&'static str>) -> RenderResult<()> {
    let frame = ctx.frame;
    let env = &frame.environment;

    if env.fog.mode != FogMode::Disabled {
        run(ctx, passes, "fog", post::fog)?;
    }
    if env.dof.mode != DofMode::Disabled {
        run(ctx, passes, "dof", post::dof)?;
    }
    if env.bloom.mode != BloomMode::Disabled {
        run(ctx, passes, "bloom", post::bloom)?;
    }
    run(ctx, passes, "output", post::output)?;
    if frame.flags.contains(RenderFlags::FXAA) {
        run(ctx, passes, "fxaa", post::fxaa)?;
    }
    Ok(())
}
