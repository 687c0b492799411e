pub use hash::{HashCalculator, WizardHashCalculator};
pub use object::{Property, PropertyCell, PropertyObject};
pub use type_system::{ClassBuilder, EnumBuilder, TypeSystem};
pub use types::{
    Cardinality, ClassType, ElementType, EnumType, Initializer, Primitive, PrimitiveType,
    PropertyDescriptor, PropertyFlags, Type, TypeKind,
};
pub use value::Value;

pub mod hash;
pub mod object;
pub mod type_system;
pub mod types;
pub mod value;
