//! Showcase scene for the r3d renderer
//!
//! A lit sphere grid over a floor with a shadowed sun, an orbiting omni light,
//! a custom-shader material, a decal and a small particle fountain. Post
//! effects can be toggled from the keyboard:
//!
//! - `1` SSAO, `2` bloom, `3` fog, `4` FXAA
//! - `Esc` quits
//!
//! An optional `showcase.toml` next to the working directory overrides the
//! renderer configuration.

use glfw::{Action, Context as _, Key, WindowEvent};
use r3d::prelude::*;
use r3d::render::environment::{BloomMode, FogMode};
use r3d::render::mesh::Particle;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const CONFIG_PATH: &str = "showcase.toml";

const PULSE_SHADER: &str = "\
uniform float uPulse;
uniform vec3 uTint;
ALBEDO.rgb *= mix(vec3(1.0), uTint, 0.5 + 0.5 * sin(uPulse));
EMISSION = uTint * max(sin(uPulse), 0.0);
";

struct Scene {
    sphere: Mesh,
    floor: Mesh,
    cube: Mesh,
    materials: Vec<Material>,
    pulse: Material,
    decal: Decal,
    particles: ParticleSystem,
    sun: LightId,
    orbiter: LightId,
}

impl Scene {
    fn new(renderer: &mut Renderer) -> RenderResult<Self> {
        let sphere = renderer.upload_mesh(&MeshData::sphere(0.5, 32, 32))?;
        let floor = renderer.upload_mesh(&MeshData::plane(40.0, 40.0, 1, 1))?;
        let cube = renderer.upload_mesh(&MeshData::cube(0.1, 0.1, 0.1))?;

        let mut materials = Vec::new();
        for row in 0..5 {
            for col in 0..5 {
                let mut material = Material::default();
                material.albedo.color = Color::new(200, 60 + 30 * row as u8, 40 + 40 * col as u8, 255);
                material.orm.roughness = 0.1 + 0.2 * col as f32;
                material.orm.metalness = 0.25 * row as f32;
                materials.push(material);
            }
        }

        let shader = renderer.create_custom_shader(PULSE_SHADER)?;
        let mut pulse = Material::with_shader(shader);
        pulse.set_vec3("uTint", Vec3::new(0.2, 0.6, 1.0));

        let mut decal = Decal::default();
        decal.material.albedo.color = Color::new(30, 30, 30, 200);

        let sun = renderer.create_light(LightKind::Directional);
        renderer.light_look_at(sun, Vec3::new(8.0, 12.0, 6.0), Vec3::zeros());
        renderer.enable_shadow(sun, 0);

        let orbiter = renderer.create_light(LightKind::Omni);
        if let Some(light) = renderer.light_mut(orbiter) {
            light.color = Color::new(255, 160, 60, 255);
            light.energy = 4.0;
            light.range = 12.0;
        }
        renderer.enable_shadow(orbiter, 512);

        Ok(Self {
            sphere,
            floor,
            cube,
            materials,
            pulse,
            decal,
            particles: ParticleSystem::default(),
            sun,
            orbiter,
        })
    }

    fn update(&mut self, renderer: &mut Renderer, time: f32) {
        let orbit = Vec3::new(6.0 * time.cos(), 2.5, 6.0 * time.sin());
        renderer.light_look_at(self.orbiter, orbit, Vec3::zeros());
        self.pulse.set_float("uPulse", time * 3.0);
        self.spawn_particles(time);
    }

    fn spawn_particles(&mut self, time: f32) {
        let dt = 1.0 / 60.0;
        for particle in &mut self.particles.particles {
            particle.lifetime -= dt;
            particle.position.y += 2.0 * dt;
        }
        self.particles.particles.retain(|p| p.lifetime > 0.0);

        let angle = time * 7.0;
        self.particles.particles.push(Particle {
            position: Vec3::new(0.4 * angle.cos(), 0.0, 0.4 * angle.sin()),
            rotation: Vec3::new(0.0, angle.to_degrees(), 0.0),
            scale: Vec3::repeat(1.0),
            color: Color::new(255, 200, 120, 255),
            lifetime: 2.0,
        });
        self.particles.aabb = BoundingBox::new(Vec3::new(-1.0, -0.5, -1.0), Vec3::new(1.0, 5.0, 1.0));
    }

    fn draw(&self, renderer: &mut Renderer) {
        renderer.draw_mesh(&self.floor, None, &Mat4::new_translation(&Vec3::new(0.0, -1.0, 0.0)));

        for (i, material) in self.materials.iter().enumerate() {
            let (row, col) = ((i / 5) as f32, (i % 5) as f32);
            let position = Vec3::new(1.5 * (col - 2.0), 0.0, 1.5 * (row - 2.0));
            renderer.draw_mesh(&self.sphere, Some(material), &Mat4::new_translation(&position));
        }

        let pillar = Mat4::new_translation(&Vec3::new(5.0, 0.5, 0.0)) * Mat4::new_scaling(1.5);
        renderer.draw_mesh(&self.sphere, Some(&self.pulse), &pillar);

        let stain = Mat4::new_translation(&Vec3::new(-5.0, -1.0, 0.0)) * Mat4::new_nonuniform_scaling(&Vec3::new(3.0, 1.0, 3.0));
        renderer.draw_decal(&self.decal, &stain);

        let fountain = Mat4::new_translation(&Vec3::new(0.0, -1.0, 5.0));
        renderer.draw_particle_system_ex(&self.particles, &self.cube, None, &fountain);
    }
}

fn load_config() -> RendererConfig {
    match RendererConfig::load_from_file(CONFIG_PATH) {
        Ok(config) => {
            log::info!("Loaded renderer configuration from {CONFIG_PATH}");
            config
        }
        Err(e) => {
            log::info!("Using default renderer configuration ({e})");
            let mut config = RendererConfig::new(WIDTH, HEIGHT)
                .with_flags(RenderFlags::FXAA | RenderFlags::TRANSPARENT_SORTING | RenderFlags::BLIT_LINEAR);
            config.environment.ssao.enabled = true;
            config.environment.bloom.mode = BloomMode::Mix;
            config.environment.ambient.energy = 0.3;
            config
        }
    }
}

fn toggle(renderer: &mut Renderer, key: Key) -> RenderResult<()> {
    match key {
        Key::Num1 => {
            let ssao = &mut renderer.environment_mut().ssao;
            ssao.enabled = !ssao.enabled;
            log::info!("SSAO {}", if ssao.enabled { "on" } else { "off" });
        }
        Key::Num2 => {
            let bloom = &mut renderer.environment_mut().bloom;
            bloom.mode = if bloom.mode == BloomMode::Disabled { BloomMode::Mix } else { BloomMode::Disabled };
            log::info!("Bloom {:?}", bloom.mode);
        }
        Key::Num3 => {
            let fog = &mut renderer.environment_mut().fog;
            fog.mode = if fog.mode == FogMode::Disabled { FogMode::Exp2 } else { FogMode::Disabled };
            log::info!("Fog {:?}", fog.mode);
        }
        Key::Num4 => {
            let flags = renderer.flags() ^ RenderFlags::FXAA;
            renderer.set_flags(flags)?;
            log::info!("FXAA {}", if flags.contains(RenderFlags::FXAA) { "on" } else { "off" });
        }
        _ => {}
    }
    Ok(())
}

#[allow(unsafe_code)]
fn load_gl(window: &mut glfw::PWindow) -> glow::Context {
    // SAFETY: the window's context is current on this thread
    unsafe { glow::Context::from_loader_function(|name| window.get_proc_address(name) as *const _) }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config();
    let (width, height) = config.resolution;

    let mut glfw = glfw::init(glfw::fail_on_errors)?;
    glfw.window_hint(glfw::WindowHint::ContextVersion(3, 3));
    glfw.window_hint(glfw::WindowHint::OpenGlProfile(glfw::OpenGlProfileHint::Core));
    glfw.window_hint(glfw::WindowHint::OpenGlForwardCompat(true));
    glfw.window_hint(glfw::WindowHint::Resizable(true));

    let (mut window, events) = glfw
        .create_window(width, height, "r3d showcase", glfw::WindowMode::Windowed)
        .ok_or("Failed to create GLFW window")?;
    window.make_current();
    window.set_key_polling(true);
    window.set_framebuffer_size_polling(true);
    glfw.set_swap_interval(glfw::SwapInterval::Sync(1));

    let device = GlowDevice::new(load_gl(&mut window));
    let mut renderer = Renderer::new(Box::new(device), config)?;
    let (fb_w, fb_h) = window.get_framebuffer_size();
    renderer.set_screen_size(fb_w.max(1) as u32, fb_h.max(1) as u32);

    let mut scene = Scene::new(&mut renderer)?;
    let mut camera = Camera::perspective(Vec3::new(0.0, 4.0, 12.0), Vec3::zeros(), 60.0);
    let mut timer = Timer::new();
    log::info!("Showcase running; sun {:?}, orbiter {:?}", scene.sun, scene.orbiter);

    while !window.should_close() {
        glfw.poll_events();
        for (_, event) in glfw::flush_messages(&events) {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => window.set_should_close(true),
                WindowEvent::Key(key, _, Action::Press, _) => toggle(&mut renderer, key)?,
                WindowEvent::FramebufferSize(w, h) if w > 0 && h > 0 => {
                    renderer.set_screen_size(w as u32, h as u32);
                    renderer.resize(w as u32, h as u32)?;
                }
                _ => {}
            }
        }

        timer.update();
        let time = timer.total_time();
        camera.set_position(Vec3::new(12.0 * (time * 0.1).sin(), 4.0, 12.0 * (time * 0.1).cos()));
        scene.update(&mut renderer, time);

        renderer.begin(&camera);
        scene.draw(&mut renderer);
        renderer.end()?;

        window.swap_buffers();
    }

    renderer.shutdown();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    r3d::foundation::logging::init();
    log::info!("Starting r3d showcase");

    match run() {
        Ok(()) => {
            log::info!("Showcase exited cleanly");
            Ok(())
        }
        Err(e) => {
            log::error!("Showcase failed: {e}");
            Err(e)
        }
    }
}
