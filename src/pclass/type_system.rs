use crate::{
    error::TypeError,
    pclass::{
        hash::HashCalculator,
        object::PropertyObject,
        types::{
            Cardinality, ClassType, ElementType, EnumType, Initializer, Primitive, PrimitiveType,
            PropertyDescriptor, PropertyFlags, Type,
        },
    },
};
use fxhash::FxHashMap;
use internment::Intern;
use std::{fmt, sync::Arc};
use tracing::debug;

/// The registry that maps type names and 32-bit type hashes to [`Type`]
/// descriptors.
///
/// A type system is populated at startup and read-only afterwards; pass it
/// explicitly into serializers and class registration rather than holding it
/// in process-wide state.
pub struct TypeSystem {
    hasher: Box<dyn HashCalculator>,
    types: FxHashMap<Intern<String>, Type>,
    by_hash: FxHashMap<u32, Intern<String>>,
    /// Canonical registrations (alias names excluded), in registration order.
    order: Vec<Intern<String>>,
}

impl TypeSystem {
    /// Creates a type system with the standard primitive set pre-registered
    /// under the canonical names.
    pub fn new(hasher: Box<dyn HashCalculator>) -> Self {
        let mut instance = Self {
            hasher,
            types: FxHashMap::default(),
            by_hash: FxHashMap::default(),
            order: Vec::new(),
        };
        for primitive in Primitive::ALL {
            instance
                .define_primitive(&primitive.to_string(), primitive)
                .expect("standard primitive set registers cleanly");
        }
        instance
    }

    pub fn hash_calculator(&self) -> &dyn HashCalculator {
        self.hasher.as_ref()
    }

    /// The hash the installed calculator derives for `name`.
    pub fn hash_of(&self, name: &str) -> u32 {
        self.hasher.calculate_type_hash(name)
    }

    /// Registers a primitive type under `name`.
    pub fn define_primitive(
        &mut self,
        name: &str,
        primitive: Primitive,
    ) -> Result<Type, TypeError> {
        let interned = Intern::from_ref(name);
        let hash = self.hash_of(name);
        self.check_free(interned, hash)?;
        let ty = Type::Primitive(Arc::new(PrimitiveType {
            name: interned,
            hash,
            primitive,
        }));
        self.insert(interned, hash, ty.clone(), true);
        Ok(ty)
    }

    /// Starts registration of an enum type.
    pub fn define_enum(&mut self, name: &str) -> EnumBuilder<'_> {
        EnumBuilder {
            types: self,
            name: name.to_owned(),
            elements: Vec::new(),
        }
    }

    /// Starts registration of a property class.
    pub fn define_class(&mut self, name: &str) -> ClassBuilder<'_> {
        ClassBuilder {
            types: self,
            name: name.to_owned(),
            base: None,
            props: Vec::new(),
            initializer: None,
        }
    }

    pub fn get(&self, name: &str) -> Result<Type, TypeError> {
        self.types
            .get(&Intern::from_ref(name))
            .cloned()
            .ok_or_else(|| TypeError::UnknownName(name.to_owned()))
    }

    pub fn get_by_hash(&self, hash: u32) -> Result<Type, TypeError> {
        self.by_hash
            .get(&hash)
            .and_then(|name| self.types.get(name))
            .cloned()
            .ok_or(TypeError::UnknownHash(hash))
    }

    pub fn has(&self, name: &str) -> bool {
        self.types.contains_key(&Intern::from_ref(name))
    }

    pub fn has_hash(&self, hash: u32) -> bool {
        self.by_hash.contains_key(&hash)
    }

    /// Resolves `name` and checks that it names a primitive.
    pub fn primitive(&self, name: &str) -> Result<Primitive, TypeError> {
        match self.get(name)? {
            Type::Primitive(t) => Ok(t.primitive()),
            _ => Err(TypeError::NotPrimitive(name.to_owned())),
        }
    }

    /// Creates a fresh instance of the class registered under `name`.
    pub fn instantiate(&self, name: &str) -> Result<PropertyObject, TypeError> {
        let ty = self.get(name)?;
        let class = ty
            .as_class()
            .ok_or_else(|| TypeError::NotClass(name.to_owned()))?;
        Ok(PropertyObject::create(class))
    }

    /// Creates a fresh instance of the class registered under `hash`.
    pub fn instantiate_by_hash(&self, hash: u32) -> Result<PropertyObject, TypeError> {
        let ty = self.get_by_hash(hash)?;
        let class = ty
            .as_class()
            .ok_or_else(|| TypeError::NotClass(ty.name().to_owned()))?;
        Ok(PropertyObject::create(class))
    }

    /// Canonical registered types (alias names excluded), in registration
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = &Type> {
        self.order.iter().filter_map(|name| self.types.get(name))
    }

    fn check_free(&self, name: Intern<String>, hash: u32) -> Result<(), TypeError> {
        if self.types.contains_key(&name) {
            return Err(TypeError::DuplicateName(name.to_string()));
        }
        if let Some(existing) = self.by_hash.get(&hash) {
            return Err(TypeError::HashCollision {
                name: name.to_string(),
                existing: existing.to_string(),
                hash,
            });
        }
        Ok(())
    }

    fn insert(&mut self, name: Intern<String>, hash: u32, ty: Type, canonical: bool) {
        debug!(name = name.as_str(), hash, kind = %ty.kind(), "Registered type");
        self.types.insert(name, ty);
        self.by_hash.insert(hash, name);
        if canonical {
            self.order.push(name);
        }
    }
}

impl fmt::Debug for TypeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSystem")
            .field("types", &self.order.len())
            .finish()
    }
}

/// Incremental registration of an [`EnumType`].
#[derive(Debug)]
pub struct EnumBuilder<'a> {
    types: &'a mut TypeSystem,
    name: String,
    elements: Vec<(String, i32)>,
}

impl EnumBuilder<'_> {
    pub fn element(mut self, name: &str, value: i32) -> Self {
        self.elements.push((name.to_owned(), value));
        self
    }

    pub fn register(self) -> Result<Arc<EnumType>, TypeError> {
        let interned = Intern::from_ref(self.name.as_str());
        let hash = self.types.hash_of(&self.name);
        self.types.check_free(interned, hash)?;

        let mut enum_type = EnumType {
            name: interned,
            hash,
            elements: Vec::new(),
            by_name: FxHashMap::default(),
            by_value: FxHashMap::default(),
        };
        for (element, value) in self.elements {
            let element = Intern::new(element);
            enum_type.elements.push((element, value));
            enum_type.by_name.insert(element, value);
            enum_type.by_value.insert(value, element);
        }

        let arc = Arc::new(enum_type);
        self.types
            .insert(interned, hash, Type::Enum(Arc::clone(&arc)), true);
        Ok(arc)
    }
}

struct PropSpec {
    name: String,
    type_name: String,
    cardinality: Cardinality,
    is_pointer: bool,
    flags: PropertyFlags,
}

/// Incremental registration of a [`ClassType`].
///
/// Property element types must already be registered, except for references
/// to the class being built, which are recognized by name (including the
/// pointer alias forms) and resolved against the owning class at use time.
pub struct ClassBuilder<'a> {
    types: &'a mut TypeSystem,
    name: String,
    base: Option<String>,
    props: Vec<PropSpec>,
    initializer: Option<Initializer>,
}

impl ClassBuilder<'_> {
    pub fn base(mut self, name: &str) -> Self {
        self.base = Some(name.to_owned());
        self
    }

    /// Declares a scalar property.
    pub fn property(self, name: &str, type_name: &str) -> Self {
        self.declare(name, type_name, Cardinality::Scalar, false)
    }

    /// Declares a scalar pointer property.
    pub fn pointer(self, name: &str, type_name: &str) -> Self {
        self.declare(name, type_name, Cardinality::Scalar, true)
    }

    /// Declares a fixed-length array property.
    pub fn array(self, name: &str, type_name: &str, len: usize) -> Self {
        self.declare(name, type_name, Cardinality::Array(len), false)
    }

    pub fn pointer_array(self, name: &str, type_name: &str, len: usize) -> Self {
        self.declare(name, type_name, Cardinality::Array(len), true)
    }

    /// Declares a dynamically-sized vector property.
    pub fn vector(self, name: &str, type_name: &str) -> Self {
        self.declare(name, type_name, Cardinality::Vector, false)
    }

    pub fn pointer_vector(self, name: &str, type_name: &str) -> Self {
        self.declare(name, type_name, Cardinality::Vector, true)
    }

    /// Overrides the flags of the most recently declared property.
    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        if let Some(prop) = self.props.last_mut() {
            prop.flags = flags;
        }
        self
    }

    /// Installs a hook run on every freshly created instance.
    pub fn initializer(mut self, init: impl Fn(&mut PropertyObject) + Send + Sync + 'static) -> Self {
        self.initializer = Some(Box::new(init));
        self
    }

    fn declare(
        mut self,
        name: &str,
        type_name: &str,
        cardinality: Cardinality,
        is_pointer: bool,
    ) -> Self {
        self.props.push(PropSpec {
            name: name.to_owned(),
            type_name: type_name.to_owned(),
            cardinality,
            is_pointer,
            flags: PropertyFlags::default(),
        });
        self
    }

    pub fn register(self) -> Result<Arc<ClassType>, TypeError> {
        let name = Intern::from_ref(self.name.as_str());
        let hash = self.types.hash_of(&self.name);

        // Aliases register atomically with the class; validate every name
        // and hash before touching the registry.
        let pointer_alias = Intern::new(format!("{}*", self.name));
        let shared_alias = Intern::new(format!("class SharedPointer<{}>", self.name));
        let pointer_hash = self.types.hash_of(pointer_alias.as_str());
        let shared_hash = self.types.hash_of(shared_alias.as_str());
        for (alias, alias_hash) in [
            (name, hash),
            (pointer_alias, pointer_hash),
            (shared_alias, shared_hash),
        ] {
            self.types.check_free(alias, alias_hash)?;
        }

        let base = match self.base.as_deref() {
            Some(base_name) => {
                let ty = self.types.get(base_name)?;
                let class = ty
                    .as_class()
                    .ok_or_else(|| TypeError::NotClass(base_name.to_owned()))?;
                Some(Arc::clone(class))
            }
            None => None,
        };

        // Inherited descriptors come first; self-references declared by the
        // base keep resolving to the base class.
        let mut descriptors = Vec::new();
        if let Some(base) = base.as_ref() {
            for desc in base.descriptors() {
                let mut desc = desc.clone();
                if matches!(desc.element, ElementType::SelfClass) {
                    desc.element = ElementType::Class(Arc::clone(base));
                }
                descriptors.push(desc);
            }
        }

        let self_forms = [
            self.name.clone(),
            pointer_alias.to_string(),
            shared_alias.to_string(),
        ];
        for prop in &self.props {
            let element = if self_forms.contains(&prop.type_name) {
                ElementType::SelfClass
            } else {
                match self.types.get(&prop.type_name)? {
                    Type::Primitive(t) => ElementType::Primitive(t.primitive()),
                    Type::Enum(t) => ElementType::Enum(t),
                    Type::Class(t) => ElementType::Class(t),
                }
            };
            descriptors.push(PropertyDescriptor {
                name: Intern::from_ref(prop.name.as_str()),
                element,
                cardinality: prop.cardinality,
                is_pointer: prop.is_pointer,
                flags: prop.flags,
            });
        }

        let mut ancestors = vec![hash];
        if let Some(base) = base.as_ref() {
            ancestors.extend(&base.ancestors);
        }

        let arc = Arc::new(ClassType {
            name,
            hash,
            base,
            descriptors,
            ancestors,
            initializer: self.initializer,
        });

        self.types
            .insert(name, hash, Type::Class(Arc::clone(&arc)), true);
        for (alias, alias_hash) in [(pointer_alias, pointer_hash), (shared_alias, shared_hash)] {
            self.types
                .insert(alias, alias_hash, Type::Class(Arc::clone(&arc)), false);
        }
        Ok(arc)
    }
}
