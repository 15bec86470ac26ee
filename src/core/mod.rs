pub mod clock;
pub mod controller;
pub mod gpu_context;
pub mod input_adapter;
pub mod timer;

pub use clock::Clock;
pub use controller::{PointerEvent, PointerGate, PointerSource};
pub use gpu_context::GpuContext;
pub use input_adapter::WinitPointer;
pub use timer::{Accumulator, Countdown, Throttled};
