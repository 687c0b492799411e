use crate::{
    error::PropertyError,
    pclass::{
        types::{Cardinality, ClassType, ElementType, PropertyDescriptor},
        value::Value,
    },
};
use std::sync::Arc;

/// The storage cell behind one property of one instance.
#[derive(Clone, PartialEq, Debug)]
pub enum PropertyCell {
    Scalar(Value),
    Array(Vec<Value>),
    Vector(Vec<Value>),
}

/// A live property-class instance: one storage cell per descriptor of its
/// class, in descriptor order.
///
/// Cloning is deep; nested objects are owned by their parent cell.
#[derive(Clone, PartialEq, Debug)]
pub struct PropertyObject {
    pub(crate) class: Arc<ClassType>,
    pub(crate) cells: Vec<PropertyCell>,
}

impl PropertyObject {
    /// Creates a zero-valued instance of `class` and runs the initializer
    /// hooks of the class and its bases, base-most first.
    pub(crate) fn create(class: &Arc<ClassType>) -> Self {
        let cells = class
            .descriptors()
            .iter()
            .map(|desc| match desc.cardinality() {
                Cardinality::Scalar => PropertyCell::Scalar(default_value(desc)),
                Cardinality::Array(n) => {
                    PropertyCell::Array((0..n).map(|_| default_value(desc)).collect())
                }
                Cardinality::Vector => PropertyCell::Vector(Vec::new()),
            })
            .collect();

        let mut instance = Self {
            class: Arc::clone(class),
            cells,
        };

        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(c) = current {
            chain.push(Arc::clone(c));
            current = c.base();
        }
        for class in chain.iter().rev() {
            if let Some(init) = class.initializer.as_ref() {
                init(&mut instance);
            }
        }
        instance
    }

    pub fn class(&self) -> &Arc<ClassType> {
        &self.class
    }

    /// Live properties, in the descriptor order of the class.
    pub fn properties(&self) -> impl Iterator<Item = Property<'_>> {
        self.class
            .descriptors()
            .iter()
            .zip(self.cells.iter())
            .map(|(desc, cell)| Property { desc, cell })
    }

    pub fn property(&self, name: &str) -> Result<Property<'_>, PropertyError> {
        let (index, desc) = self.lookup(name)?;
        Ok(Property {
            desc,
            cell: &self.cells[index],
        })
    }

    /// Returns a scalar property's value.
    pub fn get(&self, name: &str) -> Result<&Value, PropertyError> {
        let (index, desc) = self.lookup(name)?;
        match &self.cells[index] {
            PropertyCell::Scalar(value) => Ok(value),
            _ => Err(not_scalar(desc)),
        }
    }

    /// Sets a scalar property. The value is validated against the element
    /// type and normalized before it is stored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), PropertyError> {
        let (index, class) = self.lookup_class(name)?;
        let desc = &class.descriptors()[index];
        let value = value.into().conform(desc, &class)?;
        match &mut self.cells[index] {
            PropertyCell::Scalar(slot) => {
                *slot = value;
                Ok(())
            }
            _ => Err(not_scalar(desc)),
        }
    }

    /// Clears a pointer scalar.
    pub fn set_null(&mut self, name: &str) -> Result<(), PropertyError> {
        let (index, class) = self.lookup_class(name)?;
        let desc = &class.descriptors()[index];
        if !desc.is_pointer() {
            return Err(PropertyError::TypeMismatch {
                property: name.to_owned(),
                expected: "pointer".to_owned(),
                actual: desc.element().to_string(),
            });
        }
        match &mut self.cells[index] {
            PropertyCell::Scalar(slot) => {
                *slot = Value::Null;
                Ok(())
            }
            _ => Err(not_scalar(desc)),
        }
    }

    pub fn is_null(&self, name: &str) -> Result<bool, PropertyError> {
        Ok(self.get(name)?.is_null())
    }

    /// Length of an array or vector property.
    pub fn len(&self, name: &str) -> Result<usize, PropertyError> {
        let (index, desc) = self.lookup(name)?;
        match &self.cells[index] {
            PropertyCell::Array(values) | PropertyCell::Vector(values) => Ok(values.len()),
            PropertyCell::Scalar(_) => Err(not_indexed(desc)),
        }
    }

    pub fn get_at(&self, name: &str, at: usize) -> Result<&Value, PropertyError> {
        let (index, desc) = self.lookup(name)?;
        match &self.cells[index] {
            PropertyCell::Array(values) | PropertyCell::Vector(values) => {
                values.get(at).ok_or_else(|| PropertyError::OutOfRange {
                    property: desc.name().to_owned(),
                    index: at,
                    len: values.len(),
                })
            }
            PropertyCell::Scalar(_) => Err(not_indexed(desc)),
        }
    }

    pub fn set_at(
        &mut self,
        name: &str,
        at: usize,
        value: impl Into<Value>,
    ) -> Result<(), PropertyError> {
        let (index, class) = self.lookup_class(name)?;
        let desc = &class.descriptors()[index];
        let value = value.into().conform(desc, &class)?;
        match &mut self.cells[index] {
            PropertyCell::Array(values) | PropertyCell::Vector(values) => {
                let len = values.len();
                let slot = values.get_mut(at).ok_or(PropertyError::OutOfRange {
                    property: name.to_owned(),
                    index: at,
                    len,
                })?;
                *slot = value;
                Ok(())
            }
            PropertyCell::Scalar(_) => Err(not_indexed(desc)),
        }
    }

    /// Replaces the full contents of an array or vector property. Arrays
    /// require exactly their declared length.
    pub fn set_all(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<(), PropertyError> {
        let (index, class) = self.lookup_class(name)?;
        let desc = &class.descriptors()[index];
        let mut conformed = Vec::new();
        for value in values {
            conformed.push(value.conform(desc, &class)?);
        }
        match (&mut self.cells[index], desc.cardinality()) {
            (PropertyCell::Array(slots), Cardinality::Array(n)) => {
                if conformed.len() != n {
                    return Err(PropertyError::OutOfRange {
                        property: name.to_owned(),
                        index: conformed.len(),
                        len: n,
                    });
                }
                *slots = conformed;
                Ok(())
            }
            (PropertyCell::Vector(slots), _) => {
                *slots = conformed;
                Ok(())
            }
            (PropertyCell::Scalar(_) | PropertyCell::Array(_), _) => Err(not_indexed(desc)),
        }
    }

    /// Appends to a vector property.
    pub fn push(&mut self, name: &str, value: impl Into<Value>) -> Result<(), PropertyError> {
        let (index, class) = self.lookup_class(name)?;
        let desc = &class.descriptors()[index];
        let value = value.into().conform(desc, &class)?;
        match &mut self.cells[index] {
            PropertyCell::Vector(values) => {
                values.push(value);
                Ok(())
            }
            _ => Err(not_vector(desc)),
        }
    }

    /// Resizes a vector property, filling new slots with the element type's
    /// zero value.
    pub fn resize(&mut self, name: &str, len: usize) -> Result<(), PropertyError> {
        let (index, class) = self.lookup_class(name)?;
        let desc = &class.descriptors()[index];
        match &mut self.cells[index] {
            PropertyCell::Vector(values) => {
                let fill = default_value(desc);
                values.resize(len, fill);
                Ok(())
            }
            _ => Err(not_vector(desc)),
        }
    }

    pub fn clear(&mut self, name: &str) -> Result<(), PropertyError> {
        let (index, class) = self.lookup_class(name)?;
        let desc = &class.descriptors()[index];
        match &mut self.cells[index] {
            PropertyCell::Vector(values) => {
                values.clear();
                Ok(())
            }
            _ => Err(not_vector(desc)),
        }
    }

    fn lookup(&self, name: &str) -> Result<(usize, &PropertyDescriptor), PropertyError> {
        self.class
            .descriptor(name)
            .ok_or_else(|| PropertyError::UnknownProperty(name.to_owned()))
    }

    /// Mutating accessors resolve the descriptor through a clone of the
    /// class handle so the cell storage stays free to borrow.
    fn lookup_class(&self, name: &str) -> Result<(usize, Arc<ClassType>), PropertyError> {
        let (index, _) = self.lookup(name)?;
        Ok((index, Arc::clone(&self.class)))
    }
}

/// The default value for one slot of `desc`, instantiating embedded
/// (non-pointer) class values.
fn default_value(desc: &PropertyDescriptor) -> Value {
    if !desc.is_pointer() {
        if let ElementType::Class(class) = desc.element() {
            return Value::Object(Box::new(PropertyObject::create(class)));
        }
    }
    Value::default_for(desc.element())
}

fn not_scalar(desc: &PropertyDescriptor) -> PropertyError {
    PropertyError::TypeMismatch {
        property: desc.name().to_owned(),
        expected: "scalar".to_owned(),
        actual: cardinality_label(desc).to_owned(),
    }
}

fn not_indexed(desc: &PropertyDescriptor) -> PropertyError {
    PropertyError::TypeMismatch {
        property: desc.name().to_owned(),
        expected: "array or vector".to_owned(),
        actual: cardinality_label(desc).to_owned(),
    }
}

fn not_vector(desc: &PropertyDescriptor) -> PropertyError {
    PropertyError::TypeMismatch {
        property: desc.name().to_owned(),
        expected: "vector".to_owned(),
        actual: cardinality_label(desc).to_owned(),
    }
}

fn cardinality_label(desc: &PropertyDescriptor) -> &'static str {
    match desc.cardinality() {
        Cardinality::Scalar => "scalar",
        Cardinality::Array(_) => "array",
        Cardinality::Vector => "vector",
    }
}

/// One live property: a descriptor bound to the storage of one instance.
#[derive(Copy, Clone, Debug)]
pub struct Property<'a> {
    desc: &'a PropertyDescriptor,
    cell: &'a PropertyCell,
}

impl<'a> Property<'a> {
    pub fn descriptor(&self) -> &'a PropertyDescriptor {
        self.desc
    }

    pub fn cell(&self) -> &'a PropertyCell {
        self.cell
    }

    pub fn name(&self) -> &'a str {
        self.desc.name()
    }
}
