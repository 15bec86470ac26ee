use std::cell::{Ref, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use super::{
    Background, EnvironmentUpload, FullscreenPass, FullscreenProgram, GeometryData, GraphicsDevice,
    ImageData, MaterialOverride, MaterialParams, RenderTargetDesc, ResourceId, ResourceKind,
    ScenePass, Target,
};
use crate::error::RenderError;

/// One call made against a [`RecordingDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Resize(u32, u32),
    Create(ResourceId),
    UpdateMaterial(ResourceId, MaterialParams),
    DrawScene {
        label: String,
        target: Target,
        background: Background,
        material_override: Option<MaterialOverride>,
        materials: Vec<ResourceId>,
    },
    DrawFullscreen {
        label: String,
        source: ResourceId,
        target: ResourceId,
        program: FullscreenProgram,
    },
    Present,
    Dispose(ResourceId),
    DisposeRenderer,
}

#[derive(Debug, Default)]
struct LedgerState {
    next_raw: u32,
    live: BTreeSet<ResourceId>,
    calls: Vec<DeviceCall>,
    renderer_disposed: bool,
    calls_after_dispose: usize,
    double_disposals: usize,
}

/// Shared view of everything a [`RecordingDevice`] did
///
/// Cloning is cheap; the ledger outlives the device so teardown can be
/// inspected after the owning scene dropped it.
#[derive(Debug, Clone, Default)]
pub struct Ledger(Rc<RefCell<LedgerState>>);

impl Ledger {
    pub fn live_count(&self) -> usize {
        self.0.borrow().live.len()
    }

    pub fn live_of(&self, kind: ResourceKind) -> usize {
        self.0
            .borrow()
            .live
            .iter()
            .filter(|id| id.kind() == kind)
            .count()
    }

    pub fn is_live(&self, id: ResourceId) -> bool {
        self.0.borrow().live.contains(&id)
    }

    pub fn calls(&self) -> Ref<'_, Vec<DeviceCall>> {
        Ref::map(self.0.borrow(), |state| &state.calls)
    }

    pub fn call_count(&self) -> usize {
        self.0.borrow().calls.len()
    }

    /// Calls recorded at or after `index`
    pub fn calls_since(&self, index: usize) -> Vec<DeviceCall> {
        let state = self.0.borrow();
        state.calls.get(index..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn renderer_disposed(&self) -> bool {
        self.0.borrow().renderer_disposed
    }

    pub fn calls_after_dispose(&self) -> usize {
        self.0.borrow().calls_after_dispose
    }

    pub fn double_disposals(&self) -> usize {
        self.0.borrow().double_disposals
    }

    /// Number of scene draws that targeted the surface
    pub fn surface_draws(&self) -> usize {
        self.0
            .borrow()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    DeviceCall::DrawScene {
                        target: Target::Surface,
                        ..
                    }
                )
            })
            .count()
    }
}

/// Headless device that keeps a ledger instead of talking to a GPU
#[derive(Debug)]
pub struct RecordingDevice {
    width: u32,
    height: u32,
    ledger: Ledger,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ledger: Ledger::default(),
        }
    }

    /// Handle that stays valid after the device is dropped
    pub fn ledger(&self) -> Ledger {
        self.ledger.clone()
    }

    fn record(&self, call: DeviceCall) {
        let mut state = self.ledger.0.borrow_mut();
        if state.renderer_disposed {
            log::error!("graphics call after renderer disposal: {:?}", call);
            state.calls_after_dispose += 1;
        }
        state.calls.push(call);
    }

    fn allocate(&mut self, kind: ResourceKind) -> ResourceId {
        let id = {
            let mut state = self.ledger.0.borrow_mut();
            state.next_raw += 1;
            let id = ResourceId::new(kind, state.next_raw);
            state.live.insert(id);
            id
        };
        self.record(DeviceCall::Create(id));
        id
    }
}

impl GraphicsDevice for RecordingDevice {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.record(DeviceCall::Resize(width, height));
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_render_target(&mut self, _desc: RenderTargetDesc) -> ResourceId {
        self.allocate(ResourceKind::RenderTarget)
    }

    fn upload_geometry(&mut self, _geometry: &GeometryData) -> ResourceId {
        self.allocate(ResourceKind::Geometry)
    }

    fn upload_texture(&mut self, _image: &ImageData) -> ResourceId {
        self.allocate(ResourceKind::Texture)
    }

    fn upload_environment(&mut self, _environment: &EnvironmentUpload<'_>) -> ResourceId {
        self.allocate(ResourceKind::Cubemap)
    }

    fn create_material(&mut self, _params: &MaterialParams) -> ResourceId {
        self.allocate(ResourceKind::Material)
    }

    fn update_material(&mut self, id: ResourceId, params: &MaterialParams) {
        self.record(DeviceCall::UpdateMaterial(id, *params));
    }

    fn create_uniform(&mut self, _label: &str, _contents: &[u8]) -> ResourceId {
        self.allocate(ResourceKind::Uniform)
    }

    fn draw_scene(&mut self, pass: &ScenePass<'_>) -> Result<(), RenderError> {
        self.record(DeviceCall::DrawScene {
            label: pass.label.to_string(),
            target: pass.target,
            background: pass.background,
            material_override: pass.material_override,
            materials: pass.items.iter().map(|item| item.material).collect(),
        });
        Ok(())
    }

    fn draw_fullscreen(&mut self, pass: &FullscreenPass<'_>) -> Result<(), RenderError> {
        self.record(DeviceCall::DrawFullscreen {
            label: pass.label.to_string(),
            source: pass.source,
            target: pass.target,
            program: pass.program,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.record(DeviceCall::Present);
        Ok(())
    }

    fn dispose(&mut self, id: ResourceId) {
        self.record(DeviceCall::Dispose(id));
        let mut state = self.ledger.0.borrow_mut();
        if !state.live.remove(&id) {
            state.double_disposals += 1;
        }
    }

    fn dispose_renderer(&mut self) {
        self.record(DeviceCall::DisposeRenderer);
        self.ledger.0.borrow_mut().renderer_disposed = true;
    }

    fn live_resources(&self) -> usize {
        self.ledger.live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_live_resources() {
        let mut device = RecordingDevice::new(64, 64);
        let ledger = device.ledger();

        let geometry = device.upload_geometry(&GeometryData::plane(1.0, 1.0));
        let texture = device.upload_texture(&ImageData::solid([255; 4]));
        assert_eq!(ledger.live_count(), 2);
        assert_eq!(ledger.live_of(ResourceKind::Geometry), 1);

        device.dispose(geometry);
        device.dispose(texture);
        assert_eq!(device.live_resources(), 0);
        assert_eq!(ledger.double_disposals(), 0);
    }

    #[test]
    fn counts_double_disposal() {
        let mut device = RecordingDevice::new(8, 8);
        let target = device.create_render_target(RenderTargetDesc::square(8));

        device.dispose(target);
        device.dispose(target);

        assert_eq!(device.ledger().double_disposals(), 1);
    }

    #[test]
    fn flags_calls_after_renderer_disposal() {
        let mut device = RecordingDevice::new(8, 8);
        let ledger = device.ledger();

        device.dispose_renderer();
        assert_eq!(ledger.calls_after_dispose(), 0);

        device.present().ok();
        assert_eq!(ledger.calls_after_dispose(), 1);
    }

    #[test]
    fn ledger_outlives_device() {
        let device = RecordingDevice::new(8, 8);
        let ledger = device.ledger();
        drop(device);

        assert_eq!(ledger.call_count(), 0);
        assert!(!ledger.renderer_disposed());
    }
}
