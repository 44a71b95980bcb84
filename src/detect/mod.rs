mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::{DetectorBackend, ModelLoader, ModelSlot};
pub use backends::{StubBackend, StubLoader};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection};
