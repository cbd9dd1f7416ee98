//! Viewer application: owns the scene state and drives each frame.

use anyhow::Context;
use ash::vk;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info};
use winit::event::KeyEvent;

use prism_app::{
    AppContext, DeviceEvent, DeviceId, ElementState, FrameContext, MouseButton, PhysicalKey,
    PrismApp, WindowEvent,
};
use prism_core::geometry::procedural_sphere_boxes;
use prism_core::{AssetDir, CubeAttribs, CubeGeometry};
use prism_gpu::command::execute_single_time_commands;
use prism_gpu::GpuContext;
use prism_render::constants::{DEFAULT_MAX_RECURSION, MAX_SHADOW_PCF};
use prism_render::tracer::MISS_COUNT;
use prism_render::{
    resize_action, BlitPass, Camera, CameraInput, RenderTarget, ResizeAction, SceneTracer,
    ShaderConstants,
};
use prism_rt::{build_blases, Blas, RtDevice, ShaderBindingTable, Tlas, TlasInstance};
use prism_scene::{
    BindingOp, BindingPlan, BlasKind, HitGroup, SceneState, SphereMaterial, HIT_GROUP_STRIDE,
};

use crate::args::ViewerArgs;
use crate::controls::{apply_camera_key, Control, Controls};
use crate::TITLE;

/// Bottom-level structures shared by every instance.
struct SceneGeometry {
    cube: Blas,
    small_cube: Blas,
    sphere: Blas,
}

impl SceneGeometry {
    /// Create and build the cube, small cube and sphere structures.
    fn new(ctx: &AppContext, rt: &RtDevice) -> anyhow::Result<(Self, CubeAttribs)> {
        let cube = CubeGeometry::new(2.0)?;
        let small_cube = CubeGeometry::new(0.5)?;
        let device = ctx.gpu.device();

        let geometry = {
            let mut allocator = ctx.gpu.allocator().lock();
            // SAFETY: Device, allocator and loaders are valid
            unsafe {
                Self {
                    cube: Blas::triangles(device, rt, &mut allocator, "Cube", &cube)?,
                    small_cube: Blas::triangles(device, rt, &mut allocator, "Small cube", &small_cube)?,
                    sphere: Blas::procedural(
                        device,
                        rt,
                        &mut allocator,
                        "Sphere",
                        &procedural_sphere_boxes(),
                        1,
                    )?,
                }
            }
        };

        build_blases(
            &ctx.gpu,
            rt,
            &ctx.command_pool,
            &[&geometry.cube, &geometry.small_cube, &geometry.sphere],
        )?;

        Ok((geometry, cube.attribs()))
    }

    const fn blas(&self, kind: BlasKind) -> &Blas {
        match kind {
            BlasKind::Cube => &self.cube,
            BlasKind::SmallCube => &self.small_cube,
            BlasKind::Sphere => &self.sphere,
        }
    }

    /// TLAS instances for the scene's current visibility.
    fn instances(&self, scene: &mut SceneState) -> Vec<TlasInstance> {
        scene
            .instances()
            .into_iter()
            .map(|instance| TlasInstance {
                blas: self.blas(instance.blas).device_address,
                mask: instance.mask.bits(),
                custom_id: instance.custom_id,
                transform: instance.transform.to_rows(),
                name: instance.name,
            })
            .collect()
    }

    /// # Safety
    /// No structure may be in use.
    unsafe fn destroy(self, gpu: &GpuContext, rt: &RtDevice) -> anyhow::Result<()> {
        let mut allocator = gpu.allocator().lock();
        for blas in [self.cube, self.small_cube, self.sphere] {
            blas.destroy(rt, &mut allocator)?;
        }
        Ok(())
    }
}

/// Device objects of the scene, released together at cleanup.
struct SceneResources {
    rt: RtDevice,
    geometry: SceneGeometry,
    tlas: Tlas,
    tracer: SceneTracer,
    sbt: ShaderBindingTable,
    target: RenderTarget,
    blit: BlitPass,
}

impl SceneResources {
    /// Draw sphere materials, write every binding and push the table to the
    /// device. Waits for the upload to finish.
    fn rebuild_bindings<R: Rng>(
        &mut self,
        ctx: &AppContext,
        scene: &mut SceneState,
        rng: &mut R,
    ) -> anyhow::Result<BindingPlan> {
        let plan = BindingPlan::build(scene, rng);
        for op in &plan.ops {
            match op {
                BindingOp::RayGen(group) => self.sbt.bind_ray_gen(group)?,
                BindingOp::Miss { ray, group } => self.sbt.bind_miss(ray.index(), group)?,
                BindingOp::Tlas { ray, group } => self.sbt.bind_hit_group_for_tlas(
                    &self.tlas,
                    ray.index(),
                    group.map(HitGroup::name),
                )?,
                BindingOp::Instance {
                    instance,
                    ray,
                    group,
                } => self.sbt.bind_hit_group_for_instance(
                    &self.tlas,
                    instance,
                    ray.index(),
                    group.name(),
                )?,
            }
        }

        let device = ctx.gpu.device();
        let sbt = &mut self.sbt;
        // SAFETY: The table is not in use while the device waits for the upload
        unsafe { submit_and_wait(ctx, |cmd| sbt.sync(device, cmd))? };

        let count = |material: SphereMaterial| {
            plan.sphere_materials
                .iter()
                .filter(|m| **m == material)
                .count()
        };
        info!(
            bindings = plan.ops.len(),
            metallic = count(SphereMaterial::Metallic),
            diffuse = count(SphereMaterial::Diffuse),
            glass = count(SphereMaterial::Glass),
            "Shader bindings written"
        );
        Ok(plan)
    }

    /// # Safety
    /// The GPU must be idle.
    unsafe fn destroy(mut self, gpu: &GpuContext) -> anyhow::Result<()> {
        let device = gpu.device();
        self.blit.destroy(device);
        self.target.destroy(gpu)?;
        self.sbt.destroy(&mut gpu.allocator().lock())?;
        self.tracer.destroy(gpu)?;
        self.tlas.destroy(&self.rt, &mut gpu.allocator().lock())?;
        self.geometry.destroy(gpu, &self.rt)
    }
}

/// Record into a one-time command buffer, submit it and wait.
///
/// # Safety
/// Everything `record` touches must be valid and not in use.
unsafe fn submit_and_wait<F>(ctx: &AppContext, record: F) -> anyhow::Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> prism_rt::Result<()>,
{
    let mut recorded = Ok(());
    execute_single_time_commands(
        ctx.gpu.device(),
        &ctx.command_pool,
        ctx.gpu.graphics_queue(),
        |cmd| {
            recorded = record(cmd);
            Ok(())
        },
    )?;
    Ok(recorded?)
}

/// Viewer application state.
pub struct Viewer {
    /// Placement and visibility of every instance
    scene: SceneState,
    camera: Camera,
    input: CameraInput,
    /// Left mouse button held
    looking: bool,
    controls: Controls,
    constants: ShaderConstants,
    /// Released in `cleanup`
    resources: Option<SceneResources>,
}

impl PrismApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let args = ViewerArgs::from_args()?;
        let assets = AssetDir::open(&args.assets)
            .with_context(|| format!("Asset directory {}", args.assets.display()))?;
        debug!(assets = %assets.root().display(), "Asset directory opened");

        let rt = RtDevice::new(&ctx.gpu)?;
        let caps = rt.capabilities();
        info!(
            max_recursion = caps.max_ray_recursion_depth,
            handle_size = caps.shader_group_handle_size,
            handle_alignment = caps.shader_group_handle_alignment,
            "Ray tracing supported"
        );

        let (geometry, cube_attribs) = SceneGeometry::new(ctx, &rt)?;

        let mut scene = SceneState::new(args.scene);
        let mut tlas = Tlas::new(HIT_GROUP_STRIDE);
        let instances = geometry.instances(&mut scene);
        let device = ctx.gpu.device();
        // SAFETY: Every BLAS was built above and the TLAS is not in use
        unsafe {
            submit_and_wait(ctx, |cmd| {
                let mut allocator = ctx.gpu.allocator().lock();
                tlas.record(device, &rt, &mut allocator, cmd, &instances)
                    .map(drop)
            })?;
        }

        let tracer = SceneTracer::new(
            &ctx.gpu,
            &rt,
            &ctx.command_pool,
            &assets,
            &cube_attribs,
            DEFAULT_MAX_RECURSION,
        )?;
        let sphere_boxes = geometry
            .sphere
            .box_buffer()
            .context("Sphere BLAS has no box buffer")?;
        let target = RenderTarget::new(&ctx.gpu, ctx.extent())?;
        // SAFETY: The descriptor sets are not in use yet
        let blit = unsafe {
            tracer.bind_scene(device, tlas.handle()?, sphere_boxes);
            tracer.bind_output(device, target.view());
            let blit = BlitPass::new(device, ctx.swapchain.format)?;
            blit.bind_source(device, target.view());
            blit
        };

        let sbt = ShaderBindingTable::new(
            &ctx.gpu,
            &rt,
            tracer.pipeline(),
            MISS_COUNT,
            u32::try_from(scene.instance_count())?,
            HIT_GROUP_STRIDE,
        )?;

        let max_recursion = tracer.pipeline().max_recursion_depth();
        let mut resources = SceneResources {
            rt,
            geometry,
            tlas,
            tracer,
            sbt,
            target,
            blit,
        };

        let seed = args.seed.unwrap_or_else(rand::random);
        info!(seed, "Drawing sphere materials");
        let mut rng = StdRng::seed_from_u64(seed);
        resources.rebuild_bindings(ctx, &mut scene, &mut rng)?;

        let constants = ShaderConstants::new(max_recursion);
        let controls = Controls::new(
            u32::try_from(scene.sphere_count())?,
            u32::try_from(scene.cube_count())?,
            constants.max_recursion,
            max_recursion,
            constants.shadow_pcf.unsigned_abs(),
            MAX_SHADOW_PCF.unsigned_abs(),
        );
        ctx.window.set_title(&controls.title(TITLE));

        let mut camera = Camera::default();
        let extent = ctx.extent();
        camera.set_viewport(extent.width, extent.height);

        info!(
            instances = scene.instance_count(),
            spheres = scene.sphere_count(),
            cubes = scene.cube_count(),
            max_recursion,
            "Viewer initialized"
        );

        Ok(Self {
            scene,
            camera,
            input: CameraInput::default(),
            looking: false,
            controls,
            constants,
            resources: Some(resources),
        })
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        self.camera.update(&self.input, dt);
        self.input.look_delta = Vec2::ZERO;
    }

    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let resources = self
            .resources
            .as_mut()
            .context("Render after the scene was released")?;
        let device = ctx.gpu.device();
        let cmd = frame.command_buffer;

        let instances = resources.geometry.instances(&mut self.scene);
        self.constants.set_camera(&self.camera);

        // SAFETY: The command buffer is recording and every resource
        // outlives the submission
        unsafe {
            {
                let mut allocator = ctx.gpu.allocator().lock();
                resources
                    .tlas
                    .record(device, &resources.rt, &mut allocator, cmd, &instances)?;
            }

            resources.target.begin_trace(device, cmd);
            resources.tracer.record(
                device,
                &resources.rt,
                cmd,
                &self.constants,
                &resources.sbt,
                resources.target.extent(),
            )?;
            resources.target.end_trace(device, cmd);

            resources.blit.record(
                device,
                cmd,
                frame.swapchain_image,
                frame.swapchain_view,
                frame.extent,
            );
        }

        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        let Some(resources) = self.resources.as_mut() else {
            return Ok(());
        };

        match resize_action(resources.target.extent(), width, height) {
            ResizeAction::Ignore => {}
            ResizeAction::ProjectionOnly => self.camera.set_viewport(width, height),
            ResizeAction::Recreate => {
                self.camera.set_viewport(width, height);
                let device = ctx.gpu.device();
                // SAFETY: The runner idles the GPU before resizing
                unsafe {
                    resources
                        .target
                        .recreate(&ctx.gpu, vk::Extent2D { width, height })?;
                    resources.tracer.bind_output(device, resources.target.view());
                    resources.blit.bind_source(device, resources.target.view());
                }
            }
        }

        Ok(())
    }

    fn on_event(&mut self, ctx: &AppContext, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => {
                let pressed = *state == ElementState::Pressed;
                if apply_camera_key(&mut self.input, *key, pressed) || !pressed {
                    return false;
                }
                if let Some(control) = self.controls.handle_key(*key) {
                    self.apply_control(control);
                    ctx.window.set_title(&self.controls.title(TITLE));
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => self.looking = *state == ElementState::Pressed,
            WindowEvent::Focused(false) => {
                self.input = CameraInput::default();
                self.looking = false;
            }
            _ => {}
        }
        false
    }

    fn on_device_event(&mut self, _device_id: DeviceId, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.looking {
                #[allow(clippy::cast_possible_truncation)]
                let delta = Vec2::new(*dx as f32, *dy as f32);
                self.input.look_delta += delta;
            }
        }
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        if let Some(resources) = self.resources.take() {
            // SAFETY: The runner idles the GPU before cleanup
            if let Err(e) = unsafe { resources.destroy(&ctx.gpu) } {
                error!("Failed to release scene resources: {e:#}");
            }
        }
    }
}

impl Viewer {
    fn apply_control(&mut self, control: Control) {
        let value = self.controls.slider(control).value();
        match control {
            Control::Spheres => {
                self.scene.set_active_spheres(value as usize);
            }
            Control::Cubes => {
                self.scene.set_active_cubes(value as usize);
            }
            Control::Recursion => self.constants.max_recursion = value,
            Control::Shadow => {
                self.constants.shadow_pcf = i32::try_from(value).unwrap_or(MAX_SHADOW_PCF);
            }
        }
        info!(
            spheres = self.scene.active_spheres(),
            cubes = self.scene.active_cubes(),
            recursion = self.constants.max_recursion,
            shadow = self.constants.shadow_pcf,
            "Controls changed"
        );
        debug!(?control, value, "Slider moved");
    }
}
