use std::collections::{BTreeSet, HashMap};

use glam::Mat4;
use slotmap::{new_key_type, SlotMap};

use super::transform::Transform;
use crate::gpu::{DrawItem, GraphicsDevice, MaterialParams, ResourceId, ResourceKind};

new_key_type! {
    /// Handle to a node owned by a [`SceneGraph`]
    pub struct NodeKey;
    /// Handle to a material owned by a [`SceneGraph`]
    pub struct MaterialKey;
}

/// CPU-side material plus the GPU object created for it
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    params: MaterialParams,
    gpu: Option<ResourceId>,
    dirty: bool,
}

impl Material {
    pub fn new(params: MaterialParams) -> Self {
        Self {
            params,
            gpu: None,
            dirty: true,
        }
    }

    pub fn params(&self) -> &MaterialParams {
        &self.params
    }

    /// GPU material, once [`SceneGraph::sync_materials`] ran
    pub fn gpu(&self) -> Option<ResourceId> {
        self.gpu
    }
}

/// One drawable primitive attached to a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    pub geometry: ResourceId,
    pub material: MaterialKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub transform: Transform,
    pub visible: bool,
    pub meshes: Vec<Mesh>,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: None,
            transform: Transform::IDENTITY,
            visible: true,
            meshes: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

impl Node {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }
}

/// Arena scene graph
///
/// Nodes and materials live in slot maps owned by the graph; parents and
/// children refer to each other by key. GPU ids reachable from the graph
/// (geometries, materials, their textures, plus adopted textures such as
/// the environment map) are collected in one pass for disposal.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeKey, Node>,
    materials: SlotMap<MaterialKey, Material>,
    roots: Vec<NodeKey>,
    names: HashMap<String, NodeKey>,
    owned: BTreeSet<ResourceId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under `parent` (or as a root)
    ///
    /// The first node registered under a name wins name lookups.
    pub fn add(&mut self, mut node: Node, parent: Option<NodeKey>) -> NodeKey {
        let parent = parent.filter(|key| self.nodes.contains_key(*key));
        node.parent = parent;
        node.children.clear();
        let name = node.name.clone();

        let key = self.nodes.insert(node);
        match parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(p) => p.children.push(key),
            None => self.roots.push(key),
        }
        if let Some(name) = name {
            self.names.entry(name).or_insert(key);
        }
        key
    }

    pub fn add_material(&mut self, params: MaterialParams) -> MaterialKey {
        self.materials.insert(Material::new(params))
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    /// Mutable material parameters; the GPU copy is refreshed on next sync
    pub fn material_params_mut(&mut self, key: MaterialKey) -> Option<&mut MaterialParams> {
        self.materials.get_mut(key).map(|material| {
            material.dirty = true;
            &mut material.params
        })
    }

    pub fn find(&self, name: &str) -> Option<NodeKey> {
        self.names.get(name).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.nodes.iter()
    }

    pub fn set_visible(&mut self, key: NodeKey, visible: bool) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn is_visible(&self, key: NodeKey) -> bool {
        self.nodes.get(key).is_some_and(|node| node.visible)
    }

    /// Take ownership of a GPU resource not referenced by any material
    pub fn adopt(&mut self, id: ResourceId) {
        self.owned.insert(id);
    }

    /// Keys of `key` and every node below it, parents first
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                out.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Visible meshes with their world transforms, depth first
    ///
    /// An invisible node hides its whole subtree. Meshes whose material
    /// has not been created on the GPU yet are skipped.
    pub fn draw_items(&self) -> Vec<DrawItem> {
        let mut items = Vec::new();
        let mut stack: Vec<(NodeKey, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|key| (*key, Mat4::IDENTITY))
            .collect();

        while let Some((key, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            if !node.visible {
                continue;
            }

            let world = parent_world * node.transform.matrix();
            for mesh in &node.meshes {
                let Some(material) = self.materials.get(mesh.material) else {
                    continue;
                };
                if let Some(gpu) = material.gpu {
                    items.push(DrawItem {
                        geometry: mesh.geometry,
                        material: gpu,
                        world,
                        transparent: material.params.transparent,
                    });
                }
            }
            stack.extend(node.children.iter().rev().map(|child| (*child, world)));
        }
        items
    }

    /// Create or refresh the GPU side of every material that changed
    pub fn sync_materials(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, material) in self.materials.iter_mut() {
            match material.gpu {
                None => material.gpu = Some(device.create_material(&material.params)),
                Some(id) if material.dirty => device.update_material(id, &material.params),
                Some(_) => {}
            }
            material.dirty = false;
        }
    }

    /// Copy a node next to the original with its own materials
    ///
    /// Geometry is shared with the source node; children are not copied.
    pub fn clone_node(&mut self, key: NodeKey, name: impl Into<String>) -> Option<NodeKey> {
        let source = self.nodes.get(key)?.clone();
        let meshes = source
            .meshes
            .iter()
            .filter_map(|mesh| {
                let params = *self.materials.get(mesh.material)?.params();
                Some(Mesh {
                    geometry: mesh.geometry,
                    material: self.add_material(params),
                })
            })
            .collect();

        let copy = Node {
            name: Some(name.into()),
            transform: source.transform,
            visible: source.visible,
            meshes,
            ..Node::default()
        };
        Some(self.add(copy, source.parent))
    }

    /// Point a material's base map at a new texture
    ///
    /// Returns the previous map when nothing references it any more, so the
    /// caller can dispose it.
    pub fn replace_map(&mut self, key: MaterialKey, map: Option<ResourceId>) -> Option<ResourceId> {
        let params = self.material_params_mut(key)?;
        let previous = std::mem::replace(&mut params.map, map)?;
        (!self.references(previous)).then_some(previous)
    }

    /// Remove a node and its subtree
    ///
    /// Materials used only by the removed nodes are dropped too. Returns the
    /// GPU ids no longer referenced by the remaining graph.
    pub fn remove_subtree(&mut self, key: NodeKey) -> Vec<ResourceId> {
        let removed_keys = self.descendants(key);
        if removed_keys.is_empty() {
            return Vec::new();
        }

        if let Some(parent) = self.nodes.get(key).and_then(|node| node.parent) {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.children.retain(|child| *child != key);
            }
        } else {
            self.roots.retain(|root| *root != key);
        }

        let mut candidates = BTreeSet::new();
        let mut materials = BTreeSet::new();
        for removed in &removed_keys {
            if let Some(node) = self.nodes.remove(*removed) {
                for mesh in &node.meshes {
                    candidates.insert(mesh.geometry);
                    materials.insert(mesh.material);
                }
            }
        }
        self.names.retain(|_, node| !removed_keys.contains(node));

        for material_key in materials {
            let in_use = self
                .nodes
                .values()
                .any(|node| node.meshes.iter().any(|mesh| mesh.material == material_key));
            if in_use {
                continue;
            }
            if let Some(material) = self.materials.remove(material_key) {
                candidates.extend(material.gpu);
                candidates.extend(Self::material_textures(&material.params));
            }
        }

        let remaining = self.resources();
        candidates
            .into_iter()
            .filter(|id| !remaining.contains(id))
            .collect()
    }

    /// Whether any node, material or adopted slot still holds `id`
    pub fn references(&self, id: ResourceId) -> bool {
        self.resources().contains(&id)
    }

    /// Every distinct GPU id owned by the graph
    ///
    /// Render targets sampled as alpha maps are not owned by the graph and
    /// are left out.
    pub fn resources(&self) -> BTreeSet<ResourceId> {
        let mut ids: BTreeSet<ResourceId> = self.owned.clone();
        for node in self.nodes.values() {
            ids.extend(node.meshes.iter().map(|mesh| mesh.geometry));
        }
        for material in self.materials.values() {
            ids.extend(material.gpu);
            ids.extend(Self::material_textures(&material.params));
        }
        ids
    }

    /// Empty the graph, returning every GPU id it owned
    pub fn clear(&mut self) -> BTreeSet<ResourceId> {
        let ids = self.resources();
        self.nodes.clear();
        self.materials.clear();
        self.roots.clear();
        self.names.clear();
        self.owned.clear();
        ids
    }

    fn material_textures(params: &MaterialParams) -> impl Iterator<Item = ResourceId> {
        [params.map, params.alpha_map]
            .into_iter()
            .flatten()
            .filter(|id| id.kind() == ResourceKind::Texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GeometryData, ImageData, RecordingDevice, RenderTargetDesc};
    use glam::Vec3;

    fn mesh_node(graph: &mut SceneGraph, device: &mut RecordingDevice, name: &str) -> Node {
        let geometry = device.upload_geometry(&GeometryData::plane(1.0, 1.0));
        let material = graph.add_material(MaterialParams::default());
        Node::named(name).with_mesh(Mesh { geometry, material })
    }

    #[test]
    fn names_resolve_to_first_insert() {
        let mut graph = SceneGraph::new();
        let first = graph.add(Node::named("Screen"), None);
        graph.add(Node::named("Screen"), None);

        assert_eq!(graph.find("Screen"), Some(first));
        assert_eq!(graph.find("Lid"), None);
    }

    #[test]
    fn invisible_parent_hides_subtree() {
        let mut device = RecordingDevice::new(8, 8);
        let mut graph = SceneGraph::new();
        let parent_node = mesh_node(&mut graph, &mut device, "Body");
        let parent = graph.add(parent_node, None);
        let child_node = mesh_node(&mut graph, &mut device, "Keys");
        graph.add(child_node, Some(parent));
        graph.sync_materials(&mut device);

        assert_eq!(graph.draw_items().len(), 2);
        graph.set_visible(parent, false);
        assert!(graph.draw_items().is_empty());
    }

    #[test]
    fn draw_items_compose_parent_transforms() {
        let mut device = RecordingDevice::new(8, 8);
        let mut graph = SceneGraph::new();
        let parent_node = mesh_node(&mut graph, &mut device, "Base");
        let parent = graph.add(parent_node.with_transform(Transform::from_translation(Vec3::X)), None);
        let child_node = mesh_node(&mut graph, &mut device, "Lid");
        graph.add(child_node.with_transform(Transform::from_translation(Vec3::Y)), Some(parent));
        graph.sync_materials(&mut device);

        let items = graph.draw_items();
        assert_eq!(items.len(), 2);
        assert!(items[1]
            .world
            .transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn clone_shares_geometry_and_removal_keeps_it() {
        let mut device = RecordingDevice::new(8, 8);
        let mut graph = SceneGraph::new();
        let screen_node = mesh_node(&mut graph, &mut device, "Screen");
        let geometry = screen_node.meshes[0].geometry;
        let screen = graph.add(screen_node, None);
        graph.sync_materials(&mut device);

        let overlay = graph.clone_node(screen, "Screen Overlay").unwrap();
        let texture = device.upload_texture(&ImageData::solid([0; 4]));
        let overlay_material = graph.node(overlay).unwrap().meshes[0].material;
        graph.material_params_mut(overlay_material).unwrap().map = Some(texture);
        graph.sync_materials(&mut device);

        let released = graph.remove_subtree(overlay);
        assert!(!released.contains(&geometry));
        assert!(released.contains(&texture));
        assert_eq!(released.len(), 2); // overlay material + placeholder texture
        assert!(graph.find("Screen Overlay").is_none());
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn clear_returns_each_resource_once() {
        let mut device = RecordingDevice::new(8, 8);
        let mut graph = SceneGraph::new();
        let texture = device.upload_texture(&ImageData::solid([255; 4]));
        let geometry = device.upload_geometry(&GeometryData::plane(1.0, 1.0));
        let material = graph.add_material(MaterialParams {
            map: Some(texture),
            ..MaterialParams::default()
        });
        for name in ["A", "B"] {
            graph.add(Node::named(name).with_mesh(Mesh { geometry, material }), None);
        }
        graph.sync_materials(&mut device);

        let ids = graph.clear();
        assert_eq!(ids.len(), 3);
        for id in ids {
            device.dispose(id);
        }
        assert_eq!(device.live_resources(), 0);
        assert!(graph.is_empty());
    }

    #[test]
    fn render_target_alpha_map_is_not_owned() {
        let mut device = RecordingDevice::new(8, 8);
        let mut graph = SceneGraph::new();
        let target = device.create_render_target(RenderTargetDesc::square(8));
        graph.add_material(MaterialParams {
            alpha_map: Some(target),
            ..MaterialParams::default()
        });

        assert!(!graph.references(target));
    }

    #[test]
    fn replace_map_reports_orphaned_texture() {
        let mut device = RecordingDevice::new(8, 8);
        let mut graph = SceneGraph::new();
        let old = device.upload_texture(&ImageData::solid([1; 4]));
        let new = device.upload_texture(&ImageData::solid([2; 4]));
        let material = graph.add_material(MaterialParams {
            map: Some(old),
            ..MaterialParams::default()
        });

        assert_eq!(graph.replace_map(material, Some(new)), Some(old));
        assert_eq!(graph.material(material).unwrap().params().map, Some(new));
    }

    #[test]
    fn dirty_materials_are_updated_once() {
        let mut device = RecordingDevice::new(8, 8);
        let ledger = device.ledger();
        let mut graph = SceneGraph::new();
        let material = graph.add_material(MaterialParams::default());
        graph.sync_materials(&mut device);

        graph.material_params_mut(material).unwrap().opacity = 0.5;
        graph.sync_materials(&mut device);
        graph.sync_materials(&mut device);

        let updates = ledger
            .calls()
            .iter()
            .filter(|call| matches!(call, crate::gpu::DeviceCall::UpdateMaterial(..)))
            .count();
        assert_eq!(updates, 1);
    }
}
