//! Object model: descriptors, records and the type registry.

mod descriptor;
mod record;
mod registry;

pub use descriptor::{BinaryColumns, ExcludedColumn, ObjectTypeDescriptor, ParentLink, Reference};
pub use record::{GenericObject, StagedObject};
pub use registry::{ObjectConstructor, ObjectRegistry};
