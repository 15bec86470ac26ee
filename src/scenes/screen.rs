use crate::animation::Tween;
use crate::gpu::{GraphicsDevice, ImageData};
use crate::scene::{MaterialKey, NodeKey, SceneGraph};

/// Name of the temporary node showing the placeholder over the screen
pub const SCREEN_OVERLAY: &str = "Screen Placeholder";

#[derive(Debug, Clone)]
enum Phase {
    Empty,
    Placeholder { overlay: NodeKey },
    Fading { overlay: NodeKey, tween: Tween },
    Full,
}

/// Placeholder → full-resolution screen texture swap
///
/// The placeholder goes on a cloned, alpha-blended copy of the screen
/// node. Once the full texture is on the screen itself the copy fades out
/// and is removed along with its material and the placeholder texture.
/// Images arriving before the model is placed are held until [`attach`].
///
/// [`attach`]: ScreenSwap::attach
#[derive(Debug, Clone)]
pub struct ScreenSwap {
    screen: Option<(NodeKey, MaterialKey)>,
    phase: Phase,
    pending_placeholder: Option<ImageData>,
    pending_full: Option<ImageData>,
    fade_seconds: f32,
    instant: bool,
}

impl ScreenSwap {
    pub fn new(fade_seconds: f32) -> Self {
        Self {
            screen: None,
            phase: Phase::Empty,
            pending_placeholder: None,
            pending_full: None,
            fade_seconds,
            instant: false,
        }
    }

    /// Skip the cross-fade; the overlay is removed as soon as the full
    /// texture lands
    pub fn set_instant(&mut self, instant: bool) {
        self.instant = instant;
    }

    /// End a running fade now, removing the overlay
    pub fn skip_fade(&mut self, graph: &mut SceneGraph, device: &mut dyn GraphicsDevice) {
        if let Phase::Fading { overlay, .. } = self.phase {
            Self::remove_overlay(overlay, graph, device);
            self.phase = Phase::Full;
        }
    }

    pub fn overlay(&self) -> Option<NodeKey> {
        match self.phase {
            Phase::Placeholder { overlay } | Phase::Fading { overlay, .. } => Some(overlay),
            Phase::Empty | Phase::Full => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self.phase, Phase::Full | Phase::Fading { .. })
    }

    /// Bind to the placed screen node and apply anything that arrived early
    pub fn attach(&mut self, screen: Option<NodeKey>, graph: &mut SceneGraph, device: &mut dyn GraphicsDevice) {
        let Some(node) = screen else {
            log::debug!("no screen node, screen texture dropped");
            self.pending_placeholder = None;
            self.pending_full = None;
            return;
        };
        let Some(material) = graph
            .node(node)
            .and_then(|node| node.meshes.first())
            .map(|mesh| mesh.material)
        else {
            log::debug!("screen node has no mesh, screen texture dropped");
            return;
        };
        self.screen = Some((node, material));

        if let Some(image) = self.pending_placeholder.take() {
            self.placeholder_arrived(image, graph, device);
        }
        if let Some(image) = self.pending_full.take() {
            self.full_arrived(image, graph, device);
        }
    }

    pub fn placeholder_arrived(&mut self, image: ImageData, graph: &mut SceneGraph, device: &mut dyn GraphicsDevice) {
        let Some((node, _)) = self.screen else {
            if self.pending_full.is_none() {
                self.pending_placeholder = Some(image);
            }
            return;
        };
        if !matches!(self.phase, Phase::Empty) {
            log::debug!("placeholder arrived after the full texture, ignored");
            return;
        }
        let Some(overlay) = graph.clone_node(node, SCREEN_OVERLAY) else {
            return;
        };

        let texture = device.upload_texture(&image);
        let overlay_materials: Vec<MaterialKey> = graph
            .node(overlay)
            .map(|node| node.meshes.iter().map(|mesh| mesh.material).collect())
            .unwrap_or_default();
        for material in overlay_materials {
            if let Some(params) = graph.material_params_mut(material) {
                params.map = Some(texture);
                params.transparent = true;
                params.opacity = 1.0;
            }
        }
        log::debug!("screen placeholder {}x{} applied", image.width, image.height);
        self.phase = Phase::Placeholder { overlay };
    }

    pub fn full_arrived(&mut self, image: ImageData, graph: &mut SceneGraph, device: &mut dyn GraphicsDevice) {
        let Some((_, material)) = self.screen else {
            self.pending_placeholder = None;
            self.pending_full = Some(image);
            return;
        };
        if self.is_full() {
            return;
        }

        let texture = device.upload_texture(&image);
        if let Some(orphan) = graph.replace_map(material, Some(texture)) {
            device.dispose(orphan);
        }
        log::debug!("screen texture {}x{} applied", image.width, image.height);

        self.phase = match self.phase {
            Phase::Placeholder { overlay } if self.instant => {
                Self::remove_overlay(overlay, graph, device);
                Phase::Full
            }
            Phase::Placeholder { overlay } => Phase::Fading {
                overlay,
                tween: Tween::new(1.0, 0.0, self.fade_seconds),
            },
            _ => Phase::Full,
        };
    }

    /// Advance the overlay fade
    pub fn update(&mut self, delta: f32, graph: &mut SceneGraph, device: &mut dyn GraphicsDevice) {
        let Phase::Fading { overlay, tween } = &mut self.phase else {
            return;
        };
        let overlay = *overlay;
        let opacity = tween.advance(delta);
        if tween.is_finished() {
            Self::remove_overlay(overlay, graph, device);
            self.phase = Phase::Full;
            return;
        }

        let materials: Vec<MaterialKey> = graph
            .node(overlay)
            .map(|node| node.meshes.iter().map(|mesh| mesh.material).collect())
            .unwrap_or_default();
        for material in materials {
            if let Some(params) = graph.material_params_mut(material) {
                params.opacity = opacity;
            }
        }
    }

    fn remove_overlay(overlay: NodeKey, graph: &mut SceneGraph, device: &mut dyn GraphicsDevice) {
        let freed = graph.remove_subtree(overlay);
        log::debug!("screen overlay removed, {} resources freed", freed.len());
        for id in freed {
            device.dispose(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GeometryData, MaterialParams, RecordingDevice, ResourceKind};
    use crate::scene::{Mesh, Node};

    fn screen_graph(device: &mut RecordingDevice) -> (SceneGraph, NodeKey) {
        let mut graph = SceneGraph::new();
        let geometry = device.upload_geometry(&GeometryData::plane(1.0, 1.0));
        let material = graph.add_material(MaterialParams::default());
        let screen = graph.add(Node::named("Screen").with_mesh(Mesh { geometry, material }), None);
        graph.sync_materials(device);
        (graph, screen)
    }

    #[test]
    fn test_placeholder_fades_out_after_full() {
        let mut device = RecordingDevice::new(8, 8);
        let ledger = device.ledger();
        let (mut graph, screen) = screen_graph(&mut device);
        let mut swap = ScreenSwap::new(0.4);
        swap.attach(Some(screen), &mut graph, &mut device);

        swap.placeholder_arrived(ImageData::solid([10; 4]), &mut graph, &mut device);
        graph.sync_materials(&mut device);
        let overlay = swap.overlay().unwrap();
        assert_eq!(graph.node_count(), 2);

        swap.full_arrived(ImageData::solid([200; 4]), &mut graph, &mut device);
        assert!(swap.is_full());
        assert_eq!(swap.overlay(), Some(overlay));

        for _ in 0..30 {
            swap.update(1.0 / 60.0, &mut graph, &mut device);
        }
        assert_eq!(swap.overlay(), None);
        assert_eq!(graph.node_count(), 1);
        // Only the full texture is left; the shared geometry survives
        assert_eq!(ledger.live_of(ResourceKind::Texture), 1);
        assert_eq!(ledger.live_of(ResourceKind::Geometry), 1);
        assert_eq!(ledger.double_disposals(), 0);
    }

    #[test]
    fn test_skip_fade_removes_overlay_mid_fade() {
        let mut device = RecordingDevice::new(8, 8);
        let ledger = device.ledger();
        let (mut graph, screen) = screen_graph(&mut device);
        let mut swap = ScreenSwap::new(0.4);
        swap.attach(Some(screen), &mut graph, &mut device);
        swap.placeholder_arrived(ImageData::solid([10; 4]), &mut graph, &mut device);
        swap.full_arrived(ImageData::solid([200; 4]), &mut graph, &mut device);
        swap.update(1.0 / 60.0, &mut graph, &mut device);
        assert!(swap.overlay().is_some());

        swap.skip_fade(&mut graph, &mut device);
        assert_eq!(swap.overlay(), None);
        assert!(swap.is_full());
        assert_eq!(graph.node_count(), 1);
        assert_eq!(ledger.live_of(ResourceKind::Texture), 1);

        // Nothing left to fade
        swap.skip_fade(&mut graph, &mut device);
        assert_eq!(ledger.double_disposals(), 0);
    }

    #[test]
    fn test_late_placeholder_is_ignored() {
        let mut device = RecordingDevice::new(8, 8);
        let ledger = device.ledger();
        let (mut graph, screen) = screen_graph(&mut device);
        let mut swap = ScreenSwap::new(0.4);
        swap.attach(Some(screen), &mut graph, &mut device);

        swap.full_arrived(ImageData::solid([200; 4]), &mut graph, &mut device);
        swap.placeholder_arrived(ImageData::solid([10; 4]), &mut graph, &mut device);

        assert_eq!(graph.node_count(), 1);
        assert_eq!(ledger.live_of(ResourceKind::Texture), 1);
    }

    #[test]
    fn test_early_images_wait_for_attach() {
        let mut device = RecordingDevice::new(8, 8);
        let (mut graph, screen) = screen_graph(&mut device);
        let mut swap = ScreenSwap::new(0.0);
        swap.set_instant(true);

        swap.placeholder_arrived(ImageData::solid([10; 4]), &mut graph, &mut device);
        swap.full_arrived(ImageData::solid([200; 4]), &mut graph, &mut device);
        assert_eq!(device.ledger().live_of(ResourceKind::Texture), 0);

        swap.attach(Some(screen), &mut graph, &mut device);
        assert!(swap.is_full());
        assert_eq!(swap.overlay(), None);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_replacing_full_map_disposes_previous() {
        let mut device = RecordingDevice::new(8, 8);
        let ledger = device.ledger();
        let (mut graph, screen) = screen_graph(&mut device);
        let material = graph.node(screen).unwrap().meshes[0].material;
        let baked = device.upload_texture(&ImageData::solid([0; 4]));
        graph.replace_map(material, Some(baked));

        let mut swap = ScreenSwap::new(0.4);
        swap.attach(Some(screen), &mut graph, &mut device);
        swap.full_arrived(ImageData::solid([200; 4]), &mut graph, &mut device);

        assert!(!ledger.is_live(baked));
        assert_eq!(ledger.live_of(ResourceKind::Texture), 1);
    }
}
