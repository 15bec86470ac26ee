#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io::Cursor;
use std::rc::Rc;
use std::time::{Duration, Instant};

use base64::Engine;
use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use serde_json::json;

use folio_render::core::{PointerGate, PointerSource};
use folio_render::gpu::{GraphicsDevice, Ledger, RecordingDevice};
use folio_render::loaders::{AssetLoader, AssetSource, MemorySource};
use folio_render::render_loop::{FrameScheduler, ManualScheduler};
use folio_render::scenes::{self, GlobeScene, LaptopScene, Scene};
use folio_render::{LoadError, RenderError, SceneConfig};

pub const CANVAS: (u32, u32) = (640, 480);

/// Self-contained glTF: every node carries the same one-triangle mesh
///
/// `nodes` lists (name, parent index). `spin` adds a one-second rotation
/// clip named "Spin" on that node; the spun node rests tilted 90° about X,
/// away from the clip's first key.
pub fn model_gltf(nodes: &[(&str, Option<usize>)], spin: Option<usize>) -> Vec<u8> {
    let mut buffer = Vec::new();
    for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
    for _ in 0..3 {
        for value in [0.0f32, 0.0, 1.0] {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
    }
    for index in [0u16, 1, 2, 0] {
        buffer.extend_from_slice(&index.to_le_bytes());
    }
    for value in [0.0f32, 1.0] {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
    let half = std::f32::consts::FRAC_1_SQRT_2;
    for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, half, 0.0, half] {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
    assert_eq!(buffer.len(), 120);

    let gltf_nodes: Vec<_> = nodes
        .iter()
        .enumerate()
        .map(|(index, (name, _))| {
            let children: Vec<usize> = nodes
                .iter()
                .enumerate()
                .filter(|(_, (_, parent))| *parent == Some(index))
                .map(|(child, _)| child)
                .collect();
            let mut node = json!({ "name": name, "mesh": 0 });
            if !children.is_empty() {
                node["children"] = json!(children);
            }
            if spin == Some(index) {
                node["rotation"] = json!([half, 0.0, 0.0, half]);
            }
            node
        })
        .collect();
    let roots: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, (_, parent))| parent.is_none())
        .map(|(index, _)| index)
        .collect();

    let mut document = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": roots }],
        "nodes": gltf_nodes,
        "meshes": [{
            "name": "Triangle",
            "primitives": [{
                "attributes": { "POSITION": 0, "NORMAL": 1 },
                "indices": 2,
                "material": 0
            }]
        }],
        "materials": [{
            "name": "Body",
            "pbrMetallicRoughness": { "baseColorFactor": [0.8, 0.8, 0.8, 1.0] }
        }],
        "buffers": [{
            "byteLength": buffer.len(),
            "uri": format!(
                "data:application/octet-stream;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&buffer)
            )
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 72, "byteLength": 6 },
            { "buffer": 0, "byteOffset": 80, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 88, "byteLength": 32 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3" },
            { "bufferView": 2, "componentType": 5123, "count": 3, "type": "SCALAR" },
            { "bufferView": 3, "componentType": 5126, "count": 2, "type": "SCALAR",
              "min": [0.0], "max": [1.0] },
            { "bufferView": 4, "componentType": 5126, "count": 2, "type": "VEC4" }
        ]
    });

    if let Some(node) = spin {
        document["animations"] = json!([{
            "name": "Spin",
            "channels": [{ "sampler": 0, "target": { "node": node, "path": "rotation" } }],
            "samplers": [{ "input": 3, "output": 4, "interpolation": "LINEAR" }]
        }]);
    }
    serde_json::to_vec(&document).unwrap()
}

/// Solid-color PNG
pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(color));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}

pub fn insert_cubemap(source: &MemorySource, faces: &[String; 6]) {
    for (index, face) in faces.iter().enumerate() {
        let shade = 40 * index as u8;
        source.insert(face.clone(), png(4, 4, [shade, shade, shade, 255]));
    }
}

pub const LAPTOP_NODES: &[(&str, Option<usize>)] = &[
    ("Base", None),
    ("Keyboard", Some(0)),
    ("Frame", Some(0)),
    ("Screen", Some(2)),
    ("Logo", Some(2)),
];

pub const GLOBE_NODES: &[(&str, Option<usize>)] = &[("Shell", None), ("Continents", Some(0)), ("Core", None)];

/// Every asset the default laptop config asks for
pub fn laptop_source(config: &SceneConfig) -> MemorySource {
    let source = MemorySource::new();
    source.insert(config.model.clone(), model_gltf(LAPTOP_NODES, None));
    insert_cubemap(&source, &config.environment);
    source.insert("screen/placeholder.jpg", png(2, 2, [90, 90, 90, 255]));
    source.insert("screen/screen-800.jpg", png(8, 8, [250, 250, 250, 255]));
    source.insert("screen/screen-1920.jpg", png(16, 16, [250, 250, 250, 255]));
    source
}

/// Every asset the default globe config asks for
pub fn globe_source(config: &SceneConfig) -> MemorySource {
    let source = MemorySource::new();
    source.insert(config.model.clone(), model_gltf(GLOBE_NODES, Some(0)));
    insert_cubemap(&source, &config.environment);
    if let Some(background) = &config.background {
        source.insert(background.clone(), png(8, 4, [5, 5, 20, 255]));
    }
    source
}

/// Source whose fetches wait until the returned sender fires
#[derive(Clone)]
pub struct GatedSource {
    inner: MemorySource,
    gate: Shared<oneshot::Receiver<()>>,
}

pub fn gated(inner: MemorySource) -> (GatedSource, oneshot::Sender<()>) {
    let (open, gate) = oneshot::channel();
    (
        GatedSource {
            inner,
            gate: gate.shared(),
        },
        open,
    )
}

impl AssetSource for GatedSource {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadError>> {
        let gate = self.gate.clone();
        let fetch = self.inner.fetch(url);
        async move {
            let _ = gate.await;
            fetch.await
        }
        .boxed_local()
    }
}

/// A scene on the recording device with a manual frame pump
pub struct Mounted {
    pub scene: Rc<RefCell<dyn Scene>>,
    pub ledger: Ledger,
    pub scheduler: ManualScheduler,
    pub gate: PointerGate,
    pub loaded_calls: Rc<Cell<u32>>,
    clock: Cell<Instant>,
}

impl Mounted {
    /// Mount whatever `config.kind` names
    pub fn new(config: SceneConfig) -> Self {
        Self::build(|device, scheduler, pointer| scenes::mount(config, device, scheduler, CANVAS, pointer))
    }

    /// Mount a laptop scene and keep a typed handle to it
    pub fn laptop(config: SceneConfig) -> (Self, Rc<RefCell<LaptopScene>>) {
        let mut typed = None;
        let mounted = Self::build(|device, scheduler, pointer| {
            let scene = Rc::new(RefCell::new(LaptopScene::new(config, device, scheduler, CANVAS, pointer)));
            typed = Some(scene.clone());
            let scene: Rc<RefCell<dyn Scene>> = scene;
            scene
        });
        (mounted, typed.unwrap())
    }

    /// Mount a globe scene and keep a typed handle to it
    pub fn globe(config: SceneConfig) -> (Self, Rc<RefCell<GlobeScene>>) {
        let mut typed = None;
        let mounted = Self::build(|device, scheduler, _| {
            let scene = Rc::new(RefCell::new(GlobeScene::new(config, device, scheduler, CANVAS)));
            typed = Some(scene.clone());
            let scene: Rc<RefCell<dyn Scene>> = scene;
            scene
        });
        (mounted, typed.unwrap())
    }

    fn build(
        make: impl FnOnce(
            Box<dyn GraphicsDevice>,
            Box<dyn FrameScheduler>,
            Box<dyn PointerSource>,
        ) -> Rc<RefCell<dyn Scene>>,
    ) -> Self {
        let device = RecordingDevice::new(CANVAS.0, CANVAS.1);
        let ledger = device.ledger();
        let scheduler = ManualScheduler::new();
        let gate = PointerGate::new();
        let scene = make(Box::new(device), Box::new(scheduler.clone()), Box::new(gate.clone()));

        let loaded_calls = Rc::new(Cell::new(0));
        let counter = loaded_calls.clone();
        scene
            .borrow_mut()
            .set_loaded_callback(Box::new(move || counter.set(counter.get() + 1)));

        Self {
            scene,
            ledger,
            scheduler,
            gate,
            loaded_calls,
            clock: Cell::new(Instant::now()),
        }
    }

    pub fn load(&self, source: impl AssetSource + 'static) -> Result<(), LoadError> {
        futures::executor::block_on(scenes::load(&self.scene, AssetLoader::new(source)))
    }

    /// Advance the clock without firing a frame
    pub fn elapse(&self, duration: Duration) {
        self.clock.set(self.clock.get() + duration);
    }

    /// Fire up to `frames` pending frame callbacks 16 ms apart; returns how
    /// many ran
    pub fn pump(&self, frames: usize) -> Result<usize, RenderError> {
        let mut ran = 0;
        while ran < frames {
            let Some(id) = self.scheduler.take_next() else {
                break;
            };
            let now = self.clock.get() + Duration::from_millis(16);
            self.clock.set(now);
            self.scene.borrow_mut().on_frame(id, now)?;
            ran += 1;
        }
        Ok(ran)
    }

    pub fn unmount(&self) {
        self.scene.borrow_mut().unmount();
    }
}
