use glam::{Quat, Vec3};

use crate::animation::{Channel, Clip, Interpolation, Keyframes};
use crate::error::LoadError;
use crate::gpu::{GeometryData, GraphicsDevice, ImageData, MaterialParams, ResourceId};
use crate::scene::{MaterialKey, Mesh, Node, NodeKey, SceneGraph, Transform};

/// Name given to the node every instantiated model hangs under
pub const MODEL_ROOT: &str = "Model";

#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    pub name: Option<String>,
    pub transform: Transform,
    /// Indices into [`ModelAsset::primitives`]
    pub primitives: Vec<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrimitive {
    pub geometry: GeometryData,
    pub material: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMaterial {
    pub name: Option<String>,
    pub params: MaterialParams,
    /// Index into [`ModelAsset::images`]
    pub base_color_image: Option<usize>,
}

/// Decoded glTF scene, not yet on the GPU
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    pub nodes: Vec<ModelNode>,
    pub roots: Vec<usize>,
    pub primitives: Vec<ModelPrimitive>,
    pub materials: Vec<ModelMaterial>,
    pub images: Vec<ImageData>,
    pub clips: Vec<Clip<usize>>,
}

/// A model placed into a scene graph
#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub root: NodeKey,
    /// glTF node index to graph key
    pub nodes: Vec<Option<NodeKey>>,
    pub clips: Vec<Clip<NodeKey>>,
}

impl ModelAsset {
    /// Decode a .glb or self-contained .gltf
    pub fn decode(url: &str, bytes: &[u8]) -> Result<Self, LoadError> {
        let (document, buffers, images) =
            gltf::import_slice(bytes).map_err(|e| LoadError::decode(url, e))?;

        log::info!(
            "decoded {}: {} nodes, {} meshes, {} materials, {} images, {} animations",
            url,
            document.nodes().count(),
            document.meshes().count(),
            document.materials().count(),
            images.len(),
            document.animations().count()
        );

        let images = images
            .iter()
            .map(|image| to_rgba(image).map_err(|reason| LoadError::decode(url, reason)))
            .collect::<Result<Vec<_>, _>>()?;

        let materials = document.materials().map(|m| decode_material(&m)).collect();

        let mut primitives = Vec::new();
        let mut mesh_primitives = Vec::new();
        for mesh in document.meshes() {
            let mut indices = Vec::new();
            for primitive in mesh.primitives() {
                let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));
                let positions: Vec<[f32; 3]> = reader
                    .read_positions()
                    .ok_or_else(|| LoadError::decode(url, format!("mesh {:?} primitive has no positions", mesh.name())))?
                    .collect();
                let normals = reader.read_normals().map(|n| n.collect()).unwrap_or_default();
                let uvs = reader
                    .read_tex_coords(0)
                    .map(|uv| uv.into_f32().collect())
                    .unwrap_or_default();
                let indices_data = reader
                    .read_indices()
                    .map(|i| i.into_u32().collect())
                    .unwrap_or_default();

                indices.push(primitives.len());
                primitives.push(ModelPrimitive {
                    geometry: GeometryData {
                        positions,
                        normals,
                        uvs,
                        indices: indices_data,
                    },
                    material: primitive.material().index(),
                });
            }
            mesh_primitives.push(indices);
        }

        let nodes = document
            .nodes()
            .map(|node| {
                let (translation, rotation, scale) = node.transform().decomposed();
                ModelNode {
                    name: node.name().map(str::to_string),
                    transform: Transform {
                        translation: Vec3::from_array(translation),
                        rotation: Quat::from_array(rotation),
                        scale: Vec3::from_array(scale),
                    },
                    primitives: node
                        .mesh()
                        .and_then(|mesh| mesh_primitives.get(mesh.index()).cloned())
                        .unwrap_or_default(),
                    children: node.children().map(|child| child.index()).collect(),
                }
            })
            .collect();

        let roots = match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => scene.nodes().map(|node| node.index()).collect(),
            None => Vec::new(),
        };

        let clips = document
            .animations()
            .map(|animation| decode_clip(&animation, &buffers).map_err(|reason| LoadError::decode(url, reason)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            nodes,
            roots,
            primitives,
            materials,
            images,
            clips,
        })
    }

    /// Node names in document order
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|node| node.name.as_deref())
    }

    /// Upload geometry, textures and materials and add the node tree under
    /// a new [`MODEL_ROOT`] node
    pub fn instantiate(
        &self,
        graph: &mut SceneGraph,
        device: &mut dyn GraphicsDevice,
        parent: Option<NodeKey>,
    ) -> ModelInstance {
        let mut textures: Vec<Option<ResourceId>> = vec![None; self.images.len()];
        let mut materials: Vec<MaterialKey> = Vec::with_capacity(self.materials.len());
        for material in &self.materials {
            let mut params = material.params;
            if let Some(image) = material.base_color_image {
                if let Some(slot) = textures.get_mut(image) {
                    params.map = Some(*slot.get_or_insert_with(|| device.upload_texture(&self.images[image])));
                }
            }
            materials.push(graph.add_material(params));
        }
        let mut fallback: Option<MaterialKey> = None;

        let geometries: Vec<ResourceId> = self
            .primitives
            .iter()
            .map(|primitive| device.upload_geometry(&primitive.geometry))
            .collect();

        let root = graph.add(Node::named(MODEL_ROOT), parent);
        let mut keys: Vec<Option<NodeKey>> = vec![None; self.nodes.len()];
        let mut stack: Vec<(usize, NodeKey)> = self.roots.iter().rev().map(|index| (*index, root)).collect();

        while let Some((index, parent)) = stack.pop() {
            let Some(model_node) = self.nodes.get(index) else {
                continue;
            };
            if keys[index].is_some() {
                log::warn!("glTF node {} reached twice, skipping", index);
                continue;
            }

            let mut node = Node::default().with_transform(model_node.transform);
            node.name = model_node.name.clone();
            for primitive_index in &model_node.primitives {
                let primitive = &self.primitives[*primitive_index];
                let material = match primitive.material.and_then(|m| materials.get(m)) {
                    Some(key) => *key,
                    None => *fallback.get_or_insert_with(|| graph.add_material(MaterialParams::default())),
                };
                node.meshes.push(Mesh {
                    geometry: geometries[*primitive_index],
                    material,
                });
            }

            let key = graph.add(node, Some(parent));
            keys[index] = Some(key);
            stack.extend(model_node.children.iter().rev().map(|child| (*child, key)));
        }

        let clips = self
            .clips
            .iter()
            .map(|clip| clip.bind(|index| keys.get(*index).copied().flatten()))
            .collect();

        ModelInstance {
            root,
            nodes: keys,
            clips,
        }
    }
}

fn decode_material(material: &gltf::Material) -> ModelMaterial {
    let pbr = material.pbr_metallic_roughness();
    let base_color = pbr.base_color_factor();
    let transparent = matches!(material.alpha_mode(), gltf::material::AlphaMode::Blend);

    ModelMaterial {
        name: material.name().map(str::to_string),
        params: MaterialParams {
            base_color,
            emissive: material.emissive_factor(),
            roughness: pbr.roughness_factor(),
            metalness: pbr.metallic_factor(),
            transparent,
            ..MaterialParams::default()
        },
        base_color_image: pbr
            .base_color_texture()
            .map(|info| info.texture().source().index()),
    }
}

fn decode_clip(animation: &gltf::Animation, buffers: &[gltf::buffer::Data]) -> Result<Clip<usize>, String> {
    use gltf::animation::util::ReadOutputs;

    let mut channels = Vec::new();
    let mut duration = 0.0f32;

    for channel in animation.channels() {
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));
        let Some(inputs) = reader.read_inputs() else {
            continue;
        };
        let times: Vec<f32> = inputs.collect();

        let (interpolation, cubic) = match channel.sampler().interpolation() {
            gltf::animation::Interpolation::Step => (Interpolation::Step, false),
            gltf::animation::Interpolation::Linear => (Interpolation::Linear, false),
            // Sampled at the key values, tangents ignored
            gltf::animation::Interpolation::CubicSpline => (Interpolation::Linear, true),
        };

        let keyframes = match reader.read_outputs() {
            Some(ReadOutputs::Translations(iter)) => {
                Keyframes::Translation(values(iter.map(Vec3::from_array).collect(), cubic))
            }
            Some(ReadOutputs::Rotations(iter)) => {
                Keyframes::Rotation(values(iter.into_f32().map(Quat::from_array).collect(), cubic))
            }
            Some(ReadOutputs::Scales(iter)) => Keyframes::Scale(values(iter.map(Vec3::from_array).collect(), cubic)),
            _ => continue,
        };
        if times.len() != keyframes.len() {
            return Err(format!(
                "animation {:?} channel has {} times but {} values",
                animation.name(),
                times.len(),
                keyframes.len()
            ));
        }

        if let Some(last) = times.last() {
            duration = duration.max(*last);
        }
        channels.push(Channel {
            target: channel.target().node().index(),
            interpolation,
            times,
            keyframes,
        });
    }

    Ok(Clip {
        name: animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("animation{}", animation.index())),
        duration,
        channels,
    })
}

/// Cubic spline outputs are (in-tangent, value, out-tangent) triples
fn values<T>(all: Vec<T>, cubic: bool) -> Vec<T> {
    if cubic {
        all.into_iter().skip(1).step_by(3).collect()
    } else {
        all
    }
}

fn to_rgba(image: &gltf::image::Data) -> Result<ImageData, String> {
    use gltf::image::Format;

    let rgba = match image.format {
        Format::R8G8B8A8 => image.pixels.clone(),
        Format::R8G8B8 => image
            .pixels
            .chunks_exact(3)
            .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
            .collect(),
        Format::R8G8 => image
            .pixels
            .chunks_exact(2)
            .flat_map(|rg| [rg[0], rg[0], rg[0], rg[1]])
            .collect(),
        Format::R8 => image.pixels.iter().flat_map(|l| [*l, *l, *l, 255]).collect(),
        other => return Err(format!("unsupported texture format {:?}", other)),
    };

    Ok(ImageData {
        width: image.width,
        height: image.height,
        rgba,
    })
}
