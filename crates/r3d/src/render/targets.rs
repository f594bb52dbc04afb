//! Render target manager
//!
//! Owns every intermediate texture of the pipeline and the framebuffers that
//! combine them. Framebuffers are created lazily per attachment set the first
//! time a pass binds it.

use std::collections::HashMap;

use crate::foundation::math::Rect;
use crate::render::api::{
    Attachment, BlitFilter, ClearFlags, FramebufferId, RenderDevice, TextureDesc, TextureFilter,
    TextureFormat, TextureId, TextureTarget,
};
use crate::render::{RenderError, RenderResult};

/// Every texture owned by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    /// Base color
    Albedo,
    /// Octahedral encoded normal
    Normal,
    /// Occlusion, roughness, metalness
    Orm,
    /// Emission during the geometry pass, accumulated diffuse light afterwards
    Diffuse,
    /// Accumulated specular light
    Specular,
    /// Ambient occlusion ping
    Ssao0,
    /// Ambient occlusion pong
    Ssao1,
    /// Indirect light ping
    Ssil0,
    /// Indirect light pong
    Ssil1,
    /// Reflections, with mips
    Ssr,
    /// Bloom chain, with mips
    Bloom,
    /// Scene color ping
    Scene0,
    /// Scene color pong
    Scene1,
    /// Scene depth
    Depth,
}

impl Target {
    /// Every target in storage order
    pub const ALL: [Self; 14] = [
        Self::Albedo,
        Self::Normal,
        Self::Orm,
        Self::Diffuse,
        Self::Specular,
        Self::Ssao0,
        Self::Ssao1,
        Self::Ssil0,
        Self::Ssil1,
        Self::Ssr,
        Self::Bloom,
        Self::Scene0,
        Self::Scene1,
        Self::Depth,
    ];

    /// Attachments written by the geometry and decal passes
    pub const GBUFFER: [Self; 5] = [Self::Albedo, Self::Diffuse, Self::Normal, Self::Orm, Self::Depth];

    /// Attachments written by the light accumulation pass
    pub const LIGHTING: [Self; 3] = [Self::Diffuse, Self::Specular, Self::Depth];

    /// Color targets cleared before the deferred path
    pub const ALL_DEFERRED: [Self; 5] = [Self::Albedo, Self::Diffuse, Self::Specular, Self::Normal, Self::Orm];

    fn index(self) -> usize {
        self as usize
    }

    /// Rendered at half the internal resolution
    pub fn is_half_resolution(self) -> bool {
        matches!(self, Self::Ssao0 | Self::Ssao1 | Self::Ssil0 | Self::Ssil1)
    }

    /// Allocated with a full mip chain
    pub fn has_mips(self) -> bool {
        matches!(self, Self::Ssr | Self::Bloom)
    }

    fn format(self, low_precision: bool) -> TextureFormat {
        match self {
            Self::Albedo | Self::Orm => TextureFormat::Rgb8,
            Self::Normal => TextureFormat::Rg16F,
            Self::Ssao0 | Self::Ssao1 => TextureFormat::R8,
            Self::Ssil0 | Self::Ssil1 | Self::Ssr => TextureFormat::Rgba16F,
            Self::Diffuse | Self::Specular | Self::Bloom | Self::Scene0 | Self::Scene1 => {
                if low_precision { TextureFormat::Rgb8 } else { TextureFormat::Rgb16F }
            }
            Self::Depth => TextureFormat::Depth24,
        }
    }
}

/// Targets used in read/write alternation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PingPong {
    /// `Scene0`/`Scene1`
    Scene,
    /// `Ssao0`/`Ssao1`
    Ssao,
    /// `Ssil0`/`Ssil1`
    Ssil,
}

impl PingPong {
    fn pair(self) -> [Target; 2] {
        match self {
            Self::Scene => [Target::Scene0, Target::Scene1],
            Self::Ssao => [Target::Ssao0, Target::Ssao1],
            Self::Ssil => [Target::Ssil0, Target::Ssil1],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Number of mip levels for a texture of the given size
pub fn mip_count(width: u32, height: u32) -> u32 {
    1 + width.max(height).max(1).ilog2()
}

/// Size of a mip level, never below one texel
pub fn mip_size(size: u32, level: u32) -> u32 {
    size.checked_shr(level).unwrap_or(0).max(1)
}

/// Destination rectangle that keeps the source aspect ratio, centered
pub fn letterbox_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Rect {
    let src_aspect = src_w as f32 / src_h.max(1) as f32;
    let dst_aspect = dst_w as f32 / dst_h.max(1) as f32;
    if dst_aspect > src_aspect {
        let w = (dst_h as f32 * src_aspect).round() as i32;
        Rect::new((dst_w as i32 - w) / 2, 0, w, dst_h as i32)
    } else {
        let h = (dst_w as f32 / src_aspect).round() as i32;
        Rect::new(0, (dst_h as i32 - h) / 2, dst_w as i32, h)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedFramebuffer {
    id: FramebufferId,
    level: u32,
}

/// Owner of the pipeline's intermediate textures
#[derive(Debug)]
pub struct RenderTargets {
    width: u32,
    height: u32,
    low_precision: bool,
    textures: [TextureId; Target::ALL.len()],
    framebuffers: HashMap<Vec<Target>, CachedFramebuffer>,
    current: [usize; 3],
}

impl RenderTargets {
    /// Allocate every target at the given internal resolution
    pub fn new(device: &mut dyn RenderDevice, width: u32, height: u32, low_precision: bool) -> RenderResult<Self> {
        let mut targets = Self {
            width,
            height,
            low_precision,
            textures: [TextureId::NONE; Target::ALL.len()],
            framebuffers: HashMap::new(),
            current: [0; 3],
        };
        targets.allocate(device)?;
        Ok(targets)
    }

    fn allocate(&mut self, device: &mut dyn RenderDevice) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "Invalid render target size {}x{}",
                self.width, self.height
            )));
        }
        for target in Target::ALL {
            let (w, h) = self.size(target);
            let mut desc = TextureDesc::texture_2d(w, h, target.format(self.low_precision));
            if target.has_mips() {
                desc = desc.with_mipmaps();
            } else if target == Target::Depth {
                desc = desc.with_filter(TextureFilter::Nearest);
            }
            self.textures[target.index()] = device.create_texture(&desc, None)?;
        }
        log::debug!("Render targets allocated at {}x{}", self.width, self.height);
        Ok(())
    }

    fn release(&mut self, device: &mut dyn RenderDevice) {
        for (_, fb) in self.framebuffers.drain() {
            device.delete_framebuffer(fb.id);
        }
        for texture in &mut self.textures {
            if texture.is_set() {
                device.delete_texture(*texture);
            }
            *texture = TextureId::NONE;
        }
    }

    /// Re-create every target at a new resolution
    pub fn resize(&mut self, device: &mut dyn RenderDevice, width: u32, height: u32) -> RenderResult<()> {
        self.release(device);
        self.width = width;
        self.height = height;
        self.current = [0; 3];
        self.allocate(device)
    }

    /// Release every texture and framebuffer
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        self.release(device);
    }

    /// Internal resolution
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Texture backing a target
    pub fn texture(&self, target: Target) -> TextureId {
        self.textures[target.index()]
    }

    /// Level-0 size of a target
    pub fn size(&self, target: Target) -> (u32, u32) {
        if target.is_half_resolution() {
            ((self.width / 2).max(1), (self.height / 2).max(1))
        } else {
            (self.width, self.height)
        }
    }

    /// Mip levels of a target; 1 for targets without mips
    pub fn mip_count(&self, target: Target) -> u32 {
        if target.has_mips() {
            let (w, h) = self.size(target);
            mip_count(w, h)
        } else {
            1
        }
    }

    /// Size of a mip level of a target
    pub fn level_size(&self, target: Target, level: u32) -> (u32, u32) {
        let (w, h) = self.size(target);
        (mip_size(w, level), mip_size(h, level))
    }

    /// One over the size of a mip level
    pub fn texel_size(&self, target: Target, level: u32) -> [f32; 2] {
        let (w, h) = self.level_size(target, level);
        [1.0 / w as f32, 1.0 / h as f32]
    }

    /// Target currently holding the latest result of a ping-pong pair
    pub fn current(&self, pair: PingPong) -> Target {
        pair.pair()[self.current[pair.index()]]
    }

    /// Target of a ping-pong pair that will be written next
    pub fn other(&self, pair: PingPong) -> Target {
        pair.pair()[1 - self.current[pair.index()]]
    }

    /// Exchange read and write roles without copying
    pub fn swap(&mut self, pair: PingPong) {
        let i = pair.index();
        self.current[i] = 1 - self.current[i];
    }

    /// Bind the write side of a pair, optionally with depth, and make it current
    pub fn bind_and_swap(&mut self, device: &mut dyn RenderDevice, pair: PingPong, with_depth: bool) -> RenderResult<()> {
        let target = self.other(pair);
        if with_depth {
            self.bind(device, &[target, Target::Depth], 0)?;
        } else {
            self.bind(device, &[target], 0)?;
        }
        self.swap(pair);
        Ok(())
    }

    /// Bind a set of attachments at a mip level and set the viewport to its size
    ///
    /// `Depth` goes to the depth attachment; every other target becomes a color
    /// attachment in the order given.
    pub fn bind(&mut self, device: &mut dyn RenderDevice, targets: &[Target], level: u32) -> RenderResult<()> {
        let Some(&first) = targets.first() else {
            return Err(RenderError::InvalidState("Empty attachment set".to_string()));
        };
        let key = targets.to_vec();
        let cached = self.framebuffers.get(&key).copied();
        match cached {
            Some(fb) => {
                device.bind_framebuffer(Some(fb.id));
                if fb.level != level {
                    self.attach(device, targets, level);
                    self.framebuffers.insert(key, CachedFramebuffer { id: fb.id, level });
                }
            }
            None => {
                let id = device.create_framebuffer()?;
                device.bind_framebuffer(Some(id));
                self.attach(device, targets, level);
                if !device.framebuffer_complete() {
                    device.bind_framebuffer(None);
                    device.delete_framebuffer(id);
                    return Err(RenderError::ResourceCreationFailed(format!("Incomplete framebuffer for {targets:?}")));
                }
                log::debug!("Framebuffer {:?} created for {:?}", id, targets);
                self.framebuffers.insert(key, CachedFramebuffer { id, level });
            }
        }
        let (w, h) = self.level_size(first, level);
        device.viewport(Rect::full(w, h));
        Ok(())
    }

    fn attach(&self, device: &mut dyn RenderDevice, targets: &[Target], level: u32) {
        let mut colors = 0;
        for &target in targets {
            let texture = Some(self.texture(target));
            let level = if target.has_mips() { level as i32 } else { 0 };
            if target == Target::Depth {
                device.framebuffer_texture(Attachment::Depth, TextureTarget::Texture2D, texture, 0);
            } else {
                device.framebuffer_texture(Attachment::Color(colors), TextureTarget::Texture2D, texture, level);
                colors += 1;
            }
        }
        device.draw_buffers(colors);
    }

    /// Bind one mip level of a mip-chain target
    pub fn set_mip_level(&mut self, device: &mut dyn RenderDevice, target: Target, level: u32) -> RenderResult<()> {
        let level = level.min(self.mip_count(target).saturating_sub(1));
        self.bind(device, &[target], level)
    }

    /// Copy the latest scene color to the output framebuffer
    pub fn blit_to(
        &mut self,
        device: &mut dyn RenderDevice,
        destination: Option<FramebufferId>,
        destination_size: (u32, u32),
        aspect_keep: bool,
        linear: bool,
    ) -> RenderResult<()> {
        let scene = self.current(PingPong::Scene);
        self.bind(device, &[scene], 0)?;
        let source_fb = self.framebuffers.get(&vec![scene]).map(|fb| fb.id);

        let (dst_w, dst_h) = destination_size;
        let dst_rect = if aspect_keep {
            device.bind_framebuffer(destination);
            device.viewport(Rect::full(dst_w, dst_h));
            device.clear_color([0.0, 0.0, 0.0, 1.0]);
            device.clear(ClearFlags::COLOR);
            letterbox_rect(self.width, self.height, dst_w, dst_h)
        } else {
            Rect::full(dst_w, dst_h)
        };
        let filter = if linear { BlitFilter::Linear } else { BlitFilter::Nearest };
        device.blit_framebuffer(
            source_fb,
            destination,
            Rect::full(self.width, self.height),
            dst_rect,
            ClearFlags::COLOR,
            filter,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::{DeviceCommand, RecordingDevice};
    use approx::assert_relative_eq;

    #[test]
    fn test_mip_math() {
        assert_eq!(mip_count(1024, 512), 11);
        assert_eq!(mip_count(1, 1), 1);
        assert_eq!(mip_size(100, 3), 12);
        assert_eq!(mip_size(4, 5), 1);
    }

    #[test]
    fn test_texel_size_follows_level() {
        let mut device = RecordingDevice::new();
        let targets = RenderTargets::new(&mut device, 256, 128, false).unwrap();
        assert_eq!(targets.mip_count(Target::Bloom), 9);
        assert_relative_eq!(targets.texel_size(Target::Bloom, 2)[0], 1.0 / 64.0);
        assert_eq!(targets.size(Target::Ssao0), (128, 64));
    }

    #[test]
    fn test_ping_pong_swap() {
        let mut device = RecordingDevice::new();
        let mut targets = RenderTargets::new(&mut device, 64, 64, false).unwrap();
        assert_eq!(targets.current(PingPong::Scene), Target::Scene0);
        targets.bind_and_swap(&mut device, PingPong::Scene, false).unwrap();
        assert_eq!(targets.current(PingPong::Scene), Target::Scene1);
        assert_eq!(targets.other(PingPong::Scene), Target::Scene0);
    }

    #[test]
    fn test_framebuffers_are_created_once_per_set() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let mut targets = RenderTargets::new(&mut device, 64, 64, false).unwrap();
        targets.bind(&mut device, &Target::GBUFFER, 0).unwrap();
        targets.bind(&mut device, &Target::GBUFFER, 0).unwrap();
        let created = log
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::CreateFramebuffer(_)))
            .count();
        assert_eq!(created, 1);
        assert!(log.commands().contains(&DeviceCommand::DrawBuffers(4)));
    }

    #[test]
    fn test_letterbox_keeps_aspect() {
        assert_eq!(letterbox_rect(1600, 900, 1000, 1000), Rect::new(0, 218, 1000, 563));
        assert_eq!(letterbox_rect(100, 100, 300, 100), Rect::new(100, 0, 100, 100));
    }
}
