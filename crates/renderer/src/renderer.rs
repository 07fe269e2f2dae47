//! Top-level renderer: owns the Vulkan objects, the frame orchestrator and
//! the active scene.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use kiln_core::{EngineConfig, PresentModePreference, SceneChoice};
use kiln_platform::{Surface, Window};
use kiln_rhi::device::Device;
use kiln_rhi::instance::Instance;
use kiln_rhi::physical_device::select_physical_device;
use kiln_rhi::swapchain::PresentationSurface;
use kiln_scene::InputContext;
use tracing::{error, info, warn};

use crate::error::RenderResult;
use crate::orchestrator::FrameOrchestrator;
use crate::overlay::{FrameStatsOverlay, Overlay};
use crate::scene::{Scene, SceneContext, create_scene, scene_for_index};

/// Extent the scene has to adopt, if the swapchain no longer matches the
/// extent its targets were built for.
fn extent_change(scene: vk::Extent2D, swapchain: vk::Extent2D) -> Option<vk::Extent2D> {
    let usable = swapchain.width > 0 && swapchain.height > 0;
    (usable && swapchain != scene).then_some(swapchain)
}

fn present_mode(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// Owns every Vulkan object of the viewer.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Active scene (pipelines, descriptors, buffers, textures, targets)
/// 3. Presentation surface, through the orchestrator
/// 4. Vulkan surface
/// 5. Device
/// 6. Instance
///
/// ManuallyDrop pins this order regardless of field order.
pub struct Renderer {
    scene: ManuallyDrop<Box<dyn Scene>>,
    scene_choice: SceneChoice,
    orchestrator: ManuallyDrop<FrameOrchestrator<PresentationSurface>>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,

    overlay: FrameStatsOverlay,
    config: EngineConfig,
    /// Swapchain extent the scene's own targets were built for.
    scene_extent: vk::Extent2D,
    elapsed: f32,
}

impl Renderer {
    /// Creates the Vulkan objects for `window` and loads the configured
    /// initial scene.
    pub fn new(window: &Window, config: EngineConfig) -> RenderResult<Self> {
        let extent = window.extent();
        info!(
            "Initializing renderer ({}x{}, validation {})",
            extent.width, extent.height, config.renderer.validation
        );

        let extensions = window.required_extensions()?;
        let instance = Instance::new(
            &config.window.title,
            &extensions,
            config.renderer.validation,
        )?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical)?;

        let presentation = PresentationSurface::new(
            &instance,
            device.clone(),
            surface.handle(),
            extent,
            present_mode(config.renderer.present_mode),
        )?;
        let orchestrator = FrameOrchestrator::new(presentation, config.renderer.clear_color);

        let scene_choice = config.scene.initial;
        let scene_extent = orchestrator.extent();
        let scene = create_scene(
            scene_choice,
            &SceneContext {
                device: device.clone(),
                swapchain_pass: orchestrator.backend().render_pass(),
                extent: scene_extent,
                config: &config,
            },
        )?;
        info!("Renderer initialized with scene '{}'", scene.name());

        Ok(Self {
            scene: ManuallyDrop::new(scene),
            scene_choice,
            orchestrator: ManuallyDrop::new(orchestrator),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
            overlay: FrameStatsOverlay::default(),
            config,
            scene_extent,
            elapsed: 0.0,
        })
    }

    /// Runs one tick: scene switch, scene resize, update and render.
    ///
    /// The swapchain is recreated inside the orchestrator, after a present or
    /// on an out-of-date acquire, so the scene follows the swapchain's extent
    /// at the start of the next tick rather than the window's.
    ///
    /// A tick whose image acquisition hit an out-of-date surface renders
    /// nothing and still returns `Ok`.
    pub fn render_frame(&mut self, input: &InputContext, dt: f32) -> RenderResult<()> {
        if let Some(choice) = input.scene_request.and_then(scene_for_index) {
            self.switch_scene(choice)?;
        }

        if let Some(extent) = extent_change(self.scene_extent, self.orchestrator.extent()) {
            self.device.wait_idle()?;
            self.scene.resize(extent)?;
            self.scene_extent = extent;
        }

        self.elapsed += dt;
        self.scene.pre_update(input, dt);
        self.overlay.new_frame(dt);

        let Some(frame) = self.orchestrator.begin_frame()? else {
            return Ok(());
        };

        let aspect = self.orchestrator.backend().aspect_ratio();
        self.scene.update(frame.frame_index, aspect, self.elapsed)?;
        self.scene
            .render(&mut self.orchestrator, &frame, dt, &mut self.overlay);
        self.orchestrator.end_frame()?;
        Ok(())
    }

    /// Replaces the active scene. The new one is built first so a failed
    /// load leaves the current scene running.
    fn switch_scene(&mut self, choice: SceneChoice) -> RenderResult<()> {
        if choice == self.scene_choice {
            return Ok(());
        }

        let extent = self.orchestrator.extent();
        let ctx = SceneContext {
            device: Arc::clone(&*self.device),
            swapchain_pass: self.orchestrator.backend().render_pass(),
            extent,
            config: &self.config,
        };
        let next = match create_scene(choice, &ctx) {
            Ok(scene) => scene,
            Err(e) => {
                warn!("Failed to load scene {:?}: {}", choice, e);
                return Ok(());
            }
        };

        // The outgoing scene's resources may still be referenced by frames
        // in flight.
        self.device.wait_idle()?;
        let previous = std::mem::replace(&mut *self.scene, next);
        info!("Switched scene '{}' -> '{}'", previous.name(), self.scene.name());
        drop(previous);
        self.scene_choice = choice;
        self.scene_extent = extent;
        Ok(())
    }

    /// Records a new window size. The swapchain follows after the next
    /// present and the scene's own targets at the tick after that.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        if extent.width == 0 || extent.height == 0 {
            return;
        }
        self.orchestrator.notify_resized(extent);
    }

    pub fn scene_name(&self) -> &'static str {
        self.scene.name()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.orchestrator.frames_submitted()
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }

        info!(
            "Renderer shutting down after {} frames",
            self.orchestrator.frames_submitted()
        );

        // SAFETY: each field is dropped exactly once, here, and never used
        // afterwards.
        unsafe {
            ManuallyDrop::drop(&mut self.scene);
            ManuallyDrop::drop(&mut self.orchestrator);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_mode_mapping() {
        assert_eq!(
            present_mode(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(present_mode(PresentModePreference::Fifo), vk::PresentModeKHR::FIFO);
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_scene_follows_swapchain_extent() {
        // Window already 1280x720, swapchain not yet recreated.
        assert_eq!(extent_change(extent(800, 600), extent(800, 600)), None);
        // After the recreate the swapchain may have clamped the window size.
        assert_eq!(
            extent_change(extent(800, 600), extent(1264, 681)),
            Some(extent(1264, 681))
        );
    }

    #[test]
    fn test_zero_sized_swapchain_leaves_scene_alone() {
        assert_eq!(extent_change(extent(800, 600), extent(0, 600)), None);
    }

    #[test]
    fn test_orchestrator_extent_changes_only_after_present() {
        use crate::orchestrator::FrameOrchestrator;
        use crate::testing::RecordingBackend;

        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        let scene = orchestrator.extent();
        orchestrator.notify_resized(extent(300, 200));
        assert_eq!(extent_change(scene, orchestrator.extent()), None);

        orchestrator.begin_frame().unwrap().unwrap();
        orchestrator.begin_swapchain_pass();
        orchestrator.end_pass();
        orchestrator.end_frame().unwrap();
        assert_eq!(
            extent_change(scene, orchestrator.extent()),
            Some(extent(300, 200))
        );
    }
}
