//! # Light Manager
//!
//! Registered lights, their shadow maps and the per-frame work done on them:
//! frustum culling, view-projection matrices, shadow refresh decisions and
//! screen-space scissor rectangles for the lighting pass.

use slotmap::{new_key_type, SlotMap};

use crate::foundation::bounds::{BoundingBox, Frustum};
use crate::foundation::math::{utils, Color, Mat4, Rect, Vec3};
use crate::render::api::{
    Attachment, FramebufferId, RenderDevice, TextureDesc, TextureFormat, TextureId, TextureTarget,
};
use crate::render::RenderResult;

new_key_type! {
    /// Handle to a registered light
    pub struct LightId;
}

/// Near plane of every shadow projection
pub const SHADOW_NEAR: f32 = 0.05;

/// Light type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Infinitely distant, lights everything
    Directional,
    /// Cone from a point
    Spot,
    /// Sphere from a point
    Omni,
}

/// When a shadow map is re-rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowUpdateMode {
    /// Only after `update_shadow_map`
    Manual,
    /// Every `frequency` seconds
    Interval,
    /// Every frame
    #[default]
    Continuous,
}

/// Depth texture a light renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMap {
    /// 2D depth texture, or a depth cube map for omni lights
    pub texture: TextureId,
    /// Framebuffer with the depth attachment
    pub framebuffer: FramebufferId,
    /// Side length in texels
    pub resolution: u32,
}

/// Shadow parameters of a light
#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    /// Casting enabled
    pub enabled: bool,
    /// Requested map size
    pub resolution: u32,
    /// PCF kernel radius in texels
    pub softness: f32,
    /// Constant depth bias
    pub depth_bias: f32,
    /// Slope-scaled depth bias
    pub slope_bias: f32,
    /// Refresh policy
    pub update_mode: ShadowUpdateMode,
    /// Refresh period for `Interval`, in seconds
    pub frequency: f32,
    timer: f32,
    requested: bool,
    populated: bool,
    map: Option<ShadowMap>,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            enabled: false,
            resolution: 0,
            softness: 1.0,
            depth_bias: 0.0002,
            slope_bias: 0.002,
            update_mode: ShadowUpdateMode::Continuous,
            frequency: 0.016,
            timer: 0.0,
            requested: false,
            populated: false,
            map: None,
        }
    }
}

impl Shadow {
    /// Current shadow map, if allocated
    pub fn map(&self) -> Option<&ShadowMap> {
        self.map.as_ref()
    }
}

/// A light source
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Type
    pub kind: LightKind,
    /// Color
    pub color: Color,
    /// Diffuse energy
    pub energy: f32,
    /// Specular multiplier
    pub specular: f32,
    /// Reach for spot/omni lights; half extent of the shadow box for directional lights
    pub range: f32,
    /// Distance attenuation exponent
    pub attenuation: f32,
    /// Full-intensity cone angle in degrees
    pub inner_angle: f32,
    /// Cone cut-off angle in degrees
    pub outer_angle: f32,
    /// World position
    pub position: Vec3,
    /// Normalized direction
    pub direction: Vec3,
    /// Disabled lights are ignored entirely
    pub enabled: bool,
    /// Shadow parameters
    pub shadow: Shadow,
    view_proj: [Mat4; 6],
    visible: bool,
}

impl Light {
    /// Light with renderer defaults
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            color: Color::WHITE,
            energy: 1.0,
            specular: 0.5,
            range: 50.0,
            attenuation: 1.0,
            inner_angle: 45.0,
            outer_angle: 60.0,
            position: Vec3::zeros(),
            direction: -Vec3::y(),
            enabled: true,
            shadow: Shadow::default(),
            view_proj: [Mat4::identity(); 6],
            visible: false,
        }
    }

    /// Visible to the camera after the last cull
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// View-projection of a shadow view (face 0..6 for omni lights)
    pub fn view_proj(&self, face: usize) -> Mat4 {
        self.view_proj[face.min(5)]
    }

    /// Number of shadow views: six for omni lights, one otherwise
    pub fn shadow_view_count(&self) -> usize {
        if self.kind == LightKind::Omni { 6 } else { 1 }
    }

    /// World-space volume lit by this light; `None` for directional lights
    pub fn bounds(&self) -> Option<BoundingBox> {
        match self.kind {
            LightKind::Directional => None,
            LightKind::Omni => Some(BoundingBox::from_center_extents(self.position, Vec3::repeat(self.range))),
            LightKind::Spot => {
                let end = self.position + self.direction * self.range;
                let radius = self.range * utils::deg_to_rad(self.outer_angle.min(89.0)).tan();
                let r = Vec3::repeat(radius);
                BoundingBox::from_points([self.position, end - r, end + r])
            }
        }
    }

    /// True when this light can reach a world-space box
    pub fn affects(&self, aabb: &BoundingBox) -> bool {
        self.bounds().map_or(true, |b| aabb.is_empty() || b.intersects(aabb))
    }

    fn up_for(direction: Vec3) -> Vec3 {
        if direction.dot(&Vec3::y()).abs() > 0.99 { Vec3::z() } else { Vec3::y() }
    }

    fn compute_matrices(&mut self, view_position: Vec3) {
        match self.kind {
            LightKind::Directional => {
                let extent = self.range;
                let eye = view_position - self.direction * extent;
                let view = utils::look_at(eye, view_position, Self::up_for(self.direction));
                let proj = utils::orthographic(-extent, extent, -extent, extent, SHADOW_NEAR, 2.0 * extent);
                self.view_proj[0] = proj * view;
            }
            LightKind::Spot => {
                let fovy = utils::deg_to_rad(2.0 * self.outer_angle).min(std::f32::consts::PI - 0.01);
                let view = utils::look_at(self.position, self.position + self.direction, Self::up_for(self.direction));
                let proj = utils::perspective(fovy, 1.0, SHADOW_NEAR, self.range);
                self.view_proj[0] = proj * view;
            }
            LightKind::Omni => {
                let proj = utils::perspective(std::f32::consts::FRAC_PI_2, 1.0, SHADOW_NEAR, self.range);
                let faces = [
                    (Vec3::x(), -Vec3::y()),
                    (-Vec3::x(), -Vec3::y()),
                    (Vec3::y(), Vec3::z()),
                    (-Vec3::y(), -Vec3::z()),
                    (Vec3::z(), -Vec3::y()),
                    (-Vec3::z(), -Vec3::y()),
                ];
                for (i, (dir, up)) in faces.into_iter().enumerate() {
                    self.view_proj[i] = proj * utils::look_at(self.position, self.position + dir, up);
                }
            }
        }
    }
}

/// Registry of lights
#[derive(Debug)]
pub struct LightManager {
    lights: SlotMap<LightId, Light>,
    default_shadow_resolution: u32,
}

impl LightManager {
    /// Empty registry
    pub fn new(default_shadow_resolution: u32) -> Self {
        Self { lights: SlotMap::with_key(), default_shadow_resolution }
    }

    /// Register a light with defaults
    pub fn create(&mut self, kind: LightKind) -> LightId {
        let id = self.lights.insert(Light::new(kind));
        log::debug!("Light {:?} created ({:?})", id, kind);
        id
    }

    /// Remove a light and free its shadow map
    pub fn destroy(&mut self, device: &mut dyn RenderDevice, id: LightId) {
        if let Some(light) = self.lights.remove(id) {
            if let Some(map) = light.shadow.map {
                release_map(device, &map);
            }
        }
    }

    /// Free every shadow map and forget every light
    pub fn destroy_all(&mut self, device: &mut dyn RenderDevice) {
        for (_, light) in self.lights.drain() {
            if let Some(map) = light.shadow.map {
                release_map(device, &map);
            }
        }
    }

    /// Light by handle
    pub fn get(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    /// Mutable light by handle
    pub fn get_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    /// Every light
    pub fn iter(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter()
    }

    /// Lights that passed the last cull
    pub fn visible(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter().filter(|(_, l)| l.enabled && l.visible)
    }

    /// Number of registered lights
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// True when no light is registered
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Turn shadows on; `0` picks the default resolution
    pub fn enable_shadow(&mut self, id: LightId, resolution: u32) {
        let default = self.default_shadow_resolution;
        if let Some(light) = self.lights.get_mut(id) {
            light.shadow.enabled = true;
            light.shadow.resolution = if resolution == 0 { default } else { resolution };
        }
    }

    /// Turn shadows off and free the map
    pub fn disable_shadow(&mut self, device: &mut dyn RenderDevice, id: LightId) {
        if let Some(light) = self.lights.get_mut(id) {
            light.shadow.enabled = false;
            light.shadow.populated = false;
            if let Some(map) = light.shadow.map.take() {
                release_map(device, &map);
            }
        }
    }

    /// Request a refresh of a `Manual` shadow map on the next frame
    pub fn update_shadow_map(&mut self, id: LightId) {
        if let Some(light) = self.lights.get_mut(id) {
            light.shadow.requested = true;
        }
    }

    /// Place a light and aim it at `target`
    pub fn look_at(&mut self, id: LightId, position: Vec3, target: Vec3) {
        if let Some(light) = self.lights.get_mut(id) {
            light.position = position;
            light.direction = (target - position).try_normalize(f32::EPSILON).unwrap_or(light.direction);
        }
    }

    /// Cull every light against the camera and refresh matrices of visible ones
    pub fn update_and_cull(&mut self, frustum: &Frustum, view_position: Vec3) {
        for (_, light) in &mut self.lights {
            light.visible = light.enabled
                && match light.bounds() {
                    None => true,
                    Some(bounds) => frustum.intersects_aabb(&bounds),
                };
            if light.visible {
                light.compute_matrices(view_position);
            }
        }
    }

    /// Advance `Interval` timers
    pub fn tick(&mut self, delta_time: f32) {
        for (_, light) in &mut self.lights {
            if light.shadow.update_mode == ShadowUpdateMode::Interval {
                light.shadow.timer += delta_time;
            }
        }
    }

    /// Whether a light's shadow map must be re-rendered this frame
    ///
    /// A map that was never rendered is always refreshed, whatever the mode.
    pub fn shadow_should_be_updated(&self, id: LightId) -> bool {
        let Some(light) = self.lights.get(id) else { return false };
        let shadow = &light.shadow;
        if !light.enabled || !shadow.enabled {
            return false;
        }
        if !shadow.populated {
            return true;
        }
        match shadow.update_mode {
            ShadowUpdateMode::Continuous => true,
            ShadowUpdateMode::Interval => shadow.timer >= shadow.frequency,
            ShadowUpdateMode::Manual => shadow.requested,
        }
    }

    /// Record that a light's shadow map was rendered
    pub fn mark_shadow_updated(&mut self, id: LightId) {
        if let Some(light) = self.lights.get_mut(id) {
            light.shadow.populated = true;
            light.shadow.requested = false;
            if light.shadow.update_mode == ShadowUpdateMode::Interval {
                light.shadow.timer = 0.0;
            }
        }
    }

    /// Allocate or re-allocate the shadow map of a light at its requested resolution
    pub fn ensure_shadow_map(&mut self, device: &mut dyn RenderDevice, id: LightId) -> RenderResult<Option<ShadowMap>> {
        let Some(light) = self.lights.get_mut(id) else { return Ok(None) };
        if !light.shadow.enabled {
            return Ok(None);
        }
        let resolution = light.shadow.resolution.max(1);
        if let Some(map) = light.shadow.map {
            if map.resolution == resolution {
                return Ok(Some(map));
            }
            release_map(device, &map);
            light.shadow.map = None;
            light.shadow.populated = false;
        }

        let desc = if light.kind == LightKind::Omni {
            TextureDesc::cube(resolution, TextureFormat::Depth24)
        } else {
            TextureDesc::texture_2d(resolution, resolution, TextureFormat::Depth24)
        };
        let texture = device.create_texture(&desc, None)?;
        let framebuffer = match device.create_framebuffer() {
            Ok(fb) => fb,
            Err(e) => {
                device.delete_texture(texture);
                return Err(e);
            }
        };
        device.bind_framebuffer(Some(framebuffer));
        if light.kind != LightKind::Omni {
            device.framebuffer_texture(Attachment::Depth, TextureTarget::Texture2D, Some(texture), 0);
        }
        device.draw_buffers(0);
        device.bind_framebuffer(None);

        let map = ShadowMap { texture, framebuffer, resolution };
        light.shadow.map = Some(map);
        log::debug!("Shadow map {resolution}x{resolution} created for light {id:?}");
        Ok(Some(map))
    }

    /// Scissor rectangle covering a light's influence on screen
    ///
    /// Falls back to the whole screen for directional lights and whenever a
    /// bound corner lies behind the camera.
    pub fn screen_rect(&self, id: LightId, view_proj: &Mat4, width: u32, height: u32) -> Rect {
        let full = Rect::full(width, height);
        let Some(bounds) = self.lights.get(id).and_then(Light::bounds) else { return full };

        let mut min = [1.0f32, 1.0];
        let mut max = [-1.0f32, -1.0];
        for corner in bounds.corners() {
            let Some(ndc) = utils::project_to_ndc(view_proj, corner) else { return full };
            min = [min[0].min(ndc.x), min[1].min(ndc.y)];
            max = [max[0].max(ndc.x), max[1].max(ndc.y)];
        }
        let to_px = |v: f32, size: u32| (v.clamp(-1.0, 1.0) * 0.5 + 0.5) * size as f32;
        let x0 = to_px(min[0], width).floor() as i32;
        let y0 = to_px(min[1], height).floor() as i32;
        let x1 = to_px(max[0], width).ceil() as i32;
        let y1 = to_px(max[1], height).ceil() as i32;
        Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }
}

fn release_map(device: &mut dyn RenderDevice, map: &ShadowMap) {
    device.delete_framebuffer(map.framebuffer);
    device.delete_texture(map.texture);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::RecordingDevice;

    fn camera() -> (Frustum, Mat4) {
        let view = utils::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());
        let proj = utils::perspective(utils::deg_to_rad(60.0), 1.0, 0.1, 100.0);
        let vp = proj * view;
        (Frustum::from_matrix(&vp), vp)
    }

    #[test]
    fn test_directional_always_visible() {
        let (frustum, _) = camera();
        let mut lights = LightManager::new(1024);
        let id = lights.create(LightKind::Directional);
        lights.update_and_cull(&frustum, Vec3::new(0.0, 0.0, 10.0));
        assert!(lights.get(id).unwrap().is_visible());
    }

    #[test]
    fn test_omni_behind_camera_is_culled() {
        let (frustum, _) = camera();
        let mut lights = LightManager::new(1024);
        let id = lights.create(LightKind::Omni);
        let light = lights.get_mut(id).unwrap();
        light.position = Vec3::new(0.0, 0.0, 40.0);
        light.range = 2.0;
        lights.update_and_cull(&frustum, Vec3::new(0.0, 0.0, 10.0));
        assert!(!lights.get(id).unwrap().is_visible());
        assert_eq!(lights.visible().count(), 0);
    }

    #[test]
    fn test_shadow_update_policies() {
        let mut lights = LightManager::new(512);
        let id = lights.create(LightKind::Spot);
        assert!(!lights.shadow_should_be_updated(id));

        lights.enable_shadow(id, 0);
        assert_eq!(lights.get(id).unwrap().shadow.resolution, 512);
        assert!(lights.shadow_should_be_updated(id));
        lights.mark_shadow_updated(id);
        assert!(lights.shadow_should_be_updated(id), "continuous refreshes every frame");

        lights.get_mut(id).unwrap().shadow.update_mode = ShadowUpdateMode::Manual;
        assert!(!lights.shadow_should_be_updated(id));
        lights.update_shadow_map(id);
        assert!(lights.shadow_should_be_updated(id));
        lights.mark_shadow_updated(id);
        assert!(!lights.shadow_should_be_updated(id));

        let shadow = &mut lights.get_mut(id).unwrap().shadow;
        shadow.update_mode = ShadowUpdateMode::Interval;
        shadow.frequency = 0.5;
        lights.tick(0.25);
        assert!(!lights.shadow_should_be_updated(id));
        lights.tick(0.25);
        assert!(lights.shadow_should_be_updated(id));
        lights.mark_shadow_updated(id);
        assert!(!lights.shadow_should_be_updated(id));
    }

    #[test]
    fn test_screen_rect_bounds_a_small_light() {
        let (_, vp) = camera();
        let mut lights = LightManager::new(512);
        let id = lights.create(LightKind::Omni);
        lights.get_mut(id).unwrap().range = 1.0;
        let rect = lights.screen_rect(id, &vp, 800, 800);
        assert!(rect.w > 0 && rect.w < 800);
        assert!(rect.x > 0);
    }

    #[test]
    fn test_screen_rect_is_full_when_light_surrounds_camera() {
        let (_, vp) = camera();
        let mut lights = LightManager::new(512);
        let id = lights.create(LightKind::Omni);
        let light = lights.get_mut(id).unwrap();
        light.position = Vec3::new(0.0, 0.0, 10.0);
        light.range = 5.0;
        assert_eq!(lights.screen_rect(id, &vp, 640, 480), Rect::full(640, 480));
    }

    #[test]
    fn test_shadow_map_is_lazy_and_resized() {
        let mut device = RecordingDevice::new();
        let mut lights = LightManager::new(256);
        let id = lights.create(LightKind::Omni);
        assert!(lights.ensure_shadow_map(&mut device, id).unwrap().is_none());
        lights.enable_shadow(id, 128);
        let first = lights.ensure_shadow_map(&mut device, id).unwrap().unwrap();
        assert_eq!(first.resolution, 128);
        lights.enable_shadow(id, 64);
        let second = lights.ensure_shadow_map(&mut device, id).unwrap().unwrap();
        assert_ne!(first.texture, second.texture);
    }

    #[test]
    fn test_spot_bounds_contain_cone_tip() {
        let mut light = Light::new(LightKind::Spot);
        light.position = Vec3::new(0.0, 5.0, 0.0);
        light.range = 10.0;
        let bounds = light.bounds().unwrap();
        assert!(bounds.contains_point(Vec3::new(0.0, -5.0, 0.0)));
        assert!(light.affects(&BoundingBox::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0))));
    }
}
