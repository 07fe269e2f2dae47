//! Ordered list of passes, each running a set of render systems.
//!
//! A graph is assembled once per scene. Auxiliary passes run in insertion
//! order and the swapchain pass always runs last, so every offscreen target
//! is finished before anything samples it.

use std::fmt;

use ash::vk;
use kiln_scene::ObjectSet;
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameBackend, FrameContext, PassBegin};
use crate::mesh::MeshArena;
use crate::orchestrator::{FrameOrchestrator, FrameToken};
use crate::overlay::Overlay;
use crate::pass_registry::RenderPassTarget;
use crate::systems::RenderSystem;

/// Index of a system registered with [`PassGraphBuilder::add_system`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemId(usize);

/// Begin parameters of an auxiliary pass, copied out of its target.
///
/// The handles stay valid as long as the registry owning the target; scenes
/// drop their graph first.
#[derive(Clone)]
pub struct AuxiliaryPass {
    pub name: String,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_values: Vec<vk::ClearValue>,
}

impl fmt::Debug for AuxiliaryPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuxiliaryPass")
            .field("name", &self.name)
            .field("extent", &self.extent)
            .field("clear_values", &self.clear_values.len())
            .finish_non_exhaustive()
    }
}

impl AuxiliaryPass {
    pub fn from_target(target: &RenderPassTarget) -> Self {
        let begin = target.pass_begin();
        Self {
            name: begin.name.to_string(),
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            extent: begin.extent,
            clear_values: begin.clear_values.to_vec(),
        }
    }

    fn begin(&self) -> PassBegin<'_> {
        PassBegin {
            name: &self.name,
            render_pass: self.render_pass,
            framebuffer: self.framebuffer,
            extent: self.extent,
            clear_values: &self.clear_values,
        }
    }
}

/// Selects one element of a dynamic uniform array per pass and frame slot.
///
/// Element `frame_index * per_frame + index` is bound, `stride` bytes
/// apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicIndex {
    pub stride: u32,
    pub per_frame: u32,
    pub index: u32,
}

impl DynamicIndex {
    pub fn offset(&self, frame_index: usize) -> u32 {
        (frame_index as u32 * self.per_frame + self.index) * self.stride
    }
}

/// A system invocation inside a pass.
#[derive(Clone, Debug)]
pub struct SystemBinding {
    pub system: SystemId,
    /// Set 0 per frame slot. A single set is shared by every slot.
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub dynamic: Option<DynamicIndex>,
}

impl SystemBinding {
    pub fn new(system: SystemId, descriptor_sets: Vec<vk::DescriptorSet>) -> Self {
        Self {
            system,
            descriptor_sets,
            dynamic: None,
        }
    }

    pub fn with_dynamic(mut self, dynamic: DynamicIndex) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    fn descriptor_set(&self, frame_index: usize) -> vk::DescriptorSet {
        self.descriptor_sets[frame_index % self.descriptor_sets.len()]
    }
}

#[derive(Clone, Debug)]
enum PassTarget {
    Auxiliary(AuxiliaryPass),
    Swapchain,
}

#[derive(Clone, Debug)]
struct PassNode {
    target: PassTarget,
    bindings: Vec<SystemBinding>,
}

impl PassNode {
    fn name(&self) -> &str {
        match &self.target {
            PassTarget::Auxiliary(pass) => &pass.name,
            PassTarget::Swapchain => "swapchain",
        }
    }
}

#[derive(Default)]
pub struct PassGraphBuilder {
    systems: Vec<Box<dyn RenderSystem>>,
    auxiliary: Vec<PassNode>,
    swapchain: Option<PassNode>,
}

impl PassGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_system(&mut self, system: Box<dyn RenderSystem>) -> SystemId {
        let id = SystemId(self.systems.len());
        debug!("Pass graph: system '{}' is #{}", system.name(), id.0);
        self.systems.push(system);
        id
    }

    /// Appends an auxiliary pass. Passes run in the order they are added.
    pub fn auxiliary(&mut self, pass: AuxiliaryPass, bindings: Vec<SystemBinding>) -> &mut Self {
        self.auxiliary.push(PassNode {
            target: PassTarget::Auxiliary(pass),
            bindings,
        });
        self
    }

    /// Sets the swapchain pass, which always runs last.
    pub fn swapchain(&mut self, bindings: Vec<SystemBinding>) -> &mut Self {
        self.swapchain = Some(PassNode {
            target: PassTarget::Swapchain,
            bindings,
        });
        self
    }

    /// # Errors
    ///
    /// [`RenderError::MissingSwapchainPass`] when no swapchain pass was set,
    /// [`RenderError::DuplicatePass`] when two auxiliary passes share a name,
    /// [`RenderError::UnknownPass`] when a binding names an unknown system,
    /// [`RenderError::EmptyBinding`] when a binding has no descriptor sets.
    pub fn build(self, name: &str) -> RenderResult<PassGraph> {
        let swapchain = self
            .swapchain
            .ok_or_else(|| RenderError::MissingSwapchainPass(name.to_string()))?;

        let mut passes = self.auxiliary;
        for (i, pass) in passes.iter().enumerate() {
            if passes[..i].iter().any(|earlier| earlier.name() == pass.name()) {
                return Err(RenderError::DuplicatePass(pass.name().to_string()));
            }
        }
        passes.push(swapchain);

        let system_count = self.systems.len();
        for pass in &passes {
            if let Some(binding) = pass.bindings.iter().find(|b| b.system.0 >= system_count) {
                return Err(RenderError::UnknownPass(format!(
                    "{}: system #{}",
                    pass.name(),
                    binding.system.0
                )));
            }
            if let Some(binding) = pass.bindings.iter().find(|b| b.descriptor_sets.is_empty()) {
                return Err(RenderError::EmptyBinding(
                    pass.name().to_string(),
                    binding.system.0,
                ));
            }
        }

        debug!(
            "Pass graph '{}': {}",
            name,
            passes.iter().map(PassNode::name).collect::<Vec<_>>().join(" -> ")
        );
        Ok(PassGraph {
            systems: self.systems,
            passes,
        })
    }
}

/// Executable pass order for one scene.
pub struct PassGraph {
    systems: Vec<Box<dyn RenderSystem>>,
    passes: Vec<PassNode>,
}

impl PassGraph {
    pub fn builder() -> PassGraphBuilder {
        PassGraphBuilder::new()
    }

    /// Pass names in execution order; the swapchain pass is last.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(PassNode::name).collect()
    }

    /// Swaps the begin parameters of the auxiliary pass called `pass.name`,
    /// after its target was recreated.
    pub fn replace_auxiliary(&mut self, pass: AuxiliaryPass) -> RenderResult<()> {
        let node = self
            .passes
            .iter_mut()
            .find(|node| matches!(&node.target, PassTarget::Auxiliary(aux) if aux.name == pass.name))
            .ok_or_else(|| RenderError::UnknownPass(pass.name.clone()))?;
        node.target = PassTarget::Auxiliary(pass);
        Ok(())
    }

    /// Records every pass of the started frame.
    ///
    /// The overlay is recorded last inside the swapchain pass.
    pub fn execute<B: FrameBackend>(
        &self,
        orchestrator: &mut FrameOrchestrator<B>,
        frame: &FrameToken,
        frame_time: f32,
        objects: &ObjectSet,
        meshes: &MeshArena,
        overlay: &mut dyn Overlay,
    ) {
        for pass in &self.passes {
            let extent = match &pass.target {
                PassTarget::Auxiliary(aux) => {
                    orchestrator.begin_pass(&aux.begin());
                    aux.extent
                }
                PassTarget::Swapchain => {
                    orchestrator.begin_swapchain_pass();
                    orchestrator.extent()
                }
            };

            for binding in &pass.bindings {
                let ctx = FrameContext {
                    frame_index: frame.frame_index,
                    frame_time,
                    command_buffer: frame.command_buffer,
                    extent,
                    descriptor_set: binding.descriptor_set(frame.frame_index),
                    dynamic_offset: binding.dynamic.map(|d| d.offset(frame.frame_index)),
                    objects,
                    meshes,
                };
                self.systems[binding.system.0].render(&ctx);
            }

            if matches!(pass.target, PassTarget::Swapchain) {
                overlay.record(frame.command_buffer, extent);
            }
            orchestrator.end_pass();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::NoOverlay;
    use crate::testing::{Event, RecordingBackend};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(String, usize, Option<u32>, u32)>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl RenderSystem for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn render(&self, ctx: &FrameContext<'_>) {
            self.log.borrow_mut().push((
                self.name.to_string(),
                ctx.frame_index,
                ctx.dynamic_offset,
                ctx.extent.width,
            ));
        }
    }

    fn aux(name: &str, size: u32) -> AuxiliaryPass {
        AuxiliaryPass {
            name: name.to_string(),
            render_pass: vk::RenderPass::null(),
            framebuffer: vk::Framebuffer::null(),
            extent: vk::Extent2D {
                width: size,
                height: size,
            },
            clear_values: Vec::new(),
        }
    }

    fn capture_graph(log: &Log) -> PassGraph {
        let mut builder = PassGraph::builder();
        let capture = builder.add_system(Box::new(Recorder {
            name: "capture",
            log: log.clone(),
        }));
        let forward = builder.add_system(Box::new(Recorder {
            name: "forward",
            log: log.clone(),
        }));
        let sets = vec![vk::DescriptorSet::null(); 2];
        for (face, name) in ["capture_px", "capture_nx", "capture_py"].into_iter().enumerate() {
            builder.auxiliary(
                aux(name, 128),
                vec![SystemBinding::new(capture, sets.clone()).with_dynamic(DynamicIndex {
                    stride: 256,
                    per_frame: 3,
                    index: face as u32,
                })],
            );
        }
        builder.swapchain(vec![SystemBinding::new(forward, sets)]);
        builder.build("reflection").unwrap()
    }

    #[test]
    fn test_auxiliary_passes_precede_swapchain_pass() {
        let log = Log::default();
        let graph = capture_graph(&log);
        assert_eq!(
            graph.pass_names(),
            vec!["capture_px", "capture_nx", "capture_py", "swapchain"]
        );

        let mut orchestrator = FrameOrchestrator::new(RecordingBackend::new(3), [0.0; 4]);
        let objects = ObjectSet::new();
        let meshes = MeshArena::new();
        for _ in 0..2 {
            let frame = orchestrator.begin_frame().unwrap().unwrap();
            graph.execute(&mut orchestrator, &frame, 0.016, &objects, &meshes, &mut NoOverlay);
            orchestrator.end_frame().unwrap();
        }

        let frame = |slot: usize| {
            vec![
                Event::Wait(slot),
                Event::Acquire(slot),
                Event::BeginCommands(slot),
                Event::BeginPass("capture_px".into()),
                Event::EndPass,
                Event::BeginPass("capture_nx".into()),
                Event::EndPass,
                Event::BeginPass("capture_py".into()),
                Event::EndPass,
                Event::BeginSwapchainPass(slot as u32),
                Event::EndPass,
                Event::EndCommands(slot),
                Event::Submit(slot, slot as u32),
            ]
        };
        assert_eq!(orchestrator.backend().events, [frame(0), frame(1)].concat());

        let log = log.borrow();
        assert_eq!(log.len(), 8);
        // Second frame, slot 1: faces start at 3 elements in.
        assert_eq!(log[4], ("capture".to_string(), 1, Some(3 * 256), 128));
        assert_eq!(log[6], ("capture".to_string(), 1, Some(5 * 256), 128));
        assert_eq!(log[7], ("forward".to_string(), 1, None, 800));
    }

    #[test]
    fn test_graph_without_swapchain_pass_rejected() {
        let mut builder = PassGraph::builder();
        builder.auxiliary(aux("gbuffer", 64), Vec::new());
        let err = builder.build("broken").err().unwrap();
        assert!(matches!(err, RenderError::MissingSwapchainPass(name) if name == "broken"));
    }

    #[test]
    fn test_duplicate_auxiliary_pass_rejected() {
        let mut builder = PassGraph::builder();
        builder.auxiliary(aux("gbuffer", 64), Vec::new());
        builder.auxiliary(aux("gbuffer", 64), Vec::new());
        builder.swapchain(Vec::new());
        assert!(matches!(
            builder.build("deferred"),
            Err(RenderError::DuplicatePass(_))
        ));
    }

    #[test]
    fn test_binding_without_descriptor_sets_rejected() {
        let log = Log::default();
        let mut builder = PassGraph::builder();
        let forward = builder.add_system(Box::new(Recorder {
            name: "forward",
            log: log.clone(),
        }));
        builder.auxiliary(aux("gbuffer", 64), Vec::new());
        builder.swapchain(vec![SystemBinding::new(forward, Vec::new())]);
        let err = builder.build("forward").err().unwrap();
        assert!(matches!(
            err,
            RenderError::EmptyBinding(pass, system) if pass == "swapchain" && system == 0
        ));
    }

    #[test]
    fn test_single_descriptor_set_shared_by_every_slot() {
        let set = vk::DescriptorSet::null();
        let binding = SystemBinding::new(SystemId(0), vec![set]);
        assert_eq!(binding.descriptor_set(0), set);
        assert_eq!(binding.descriptor_set(1), set);
    }

    #[test]
    fn test_auxiliary_pass_debug_reports_clear_count() {
        let mut pass = aux("gbuffer", 64);
        pass.clear_values = vec![vk::ClearValue::default(); 4];
        let text = format!("{:?}", pass);
        assert!(text.contains("\"gbuffer\""));
        assert!(text.contains("clear_values: 4"));
        assert!(format!("{:?}", pass.begin()).contains("clear_values: 4"));
    }

    #[test]
    fn test_replace_auxiliary_updates_extent() {
        let log = Log::default();
        let mut graph = capture_graph(&log);
        graph.replace_auxiliary(aux("capture_nx", 256)).unwrap();
        assert!(graph.replace_auxiliary(aux("missing", 1)).is_err());
    }

    #[test]
    fn test_dynamic_index_offset() {
        let index = DynamicIndex {
            stride: 256,
            per_frame: 6,
            index: 2,
        };
        assert_eq!(index.offset(0), 512);
        assert_eq!(index.offset(1), (6 + 2) * 256);
    }
}
