use objectproperty::{
    error::{PropertyError, TypeError},
    pclass::{Primitive, PropertyFlags, TypeSystem, TypeKind, Value, WizardHashCalculator},
};
use pretty_assertions::assert_eq;
use test_log::test;

fn type_system() -> TypeSystem {
    TypeSystem::new(Box::new(WizardHashCalculator))
}

#[test]
fn known_type_hash() {
    let types = type_system();
    assert_eq!(types.hash_of("class TestObject"), 0x7B53_1358);
}

#[test]
fn nonexistent_type_name() {
    let types = type_system();
    let err = types.get("struct MadeUp").unwrap_err();
    assert!(matches!(err, TypeError::UnknownName(_)));
}

#[test]
fn nonexistent_type_hash() {
    let types = type_system();
    let err = types.get_by_hash(0x0DEA_DA55).unwrap_err();
    assert!(matches!(err, TypeError::UnknownHash(_)));
}

#[test]
fn standard_primitives() {
    let types = type_system();
    for primitive in [
        "bi4",
        "char",
        "short",
        "s24",
        "int",
        "long",
        "bui4",
        "unsigned char",
        "unsigned short",
        "u24",
        "unsigned int",
        "unsigned long",
        "float",
        "double",
        "std::string",
        "std::wstring",
        "gid",
    ] {
        assert!(types.has(primitive), "missing primitive '{primitive}'");
        assert_eq!(types.get(primitive).unwrap().kind(), TypeKind::Primitive);
    }
    assert_eq!(types.primitive("int").unwrap(), Primitive::I32);
}

#[test]
fn class_definition() {
    let mut types = type_system();
    types.define_class("class A").register().unwrap();

    let hash = types.hash_of("class A");
    assert!(types.has("class A"));
    assert!(types.has_hash(hash));
}

#[test]
fn pointer_aliases_resolve_to_the_class() {
    let mut types = type_system();
    types.define_class("class A").register().unwrap();

    for alias in ["class A*", "class SharedPointer<class A>"] {
        let ty = types.get(alias).unwrap();
        assert_eq!(ty.name(), "class A");
        assert_eq!(ty.hash(), types.hash_of("class A"));
        assert!(types.has_hash(types.hash_of(alias)));
    }
}

#[test]
fn duplicate_class_name() {
    let mut types = type_system();
    types.define_class("class A").register().unwrap();
    let err = types.define_class("class A").register().unwrap_err();
    assert!(matches!(err, TypeError::DuplicateName(_)));
}

#[test]
fn class_instantiation() {
    let mut types = type_system();
    types
        .define_class("class A")
        .property("m_value", "int")
        .register()
        .unwrap();

    let hash = types.hash_of("class A");
    assert_eq!(types.instantiate("class A").unwrap().class().name(), "class A");
    assert_eq!(
        types.instantiate_by_hash(hash).unwrap().class().hash(),
        hash
    );
}

#[test]
fn instantiating_a_primitive_fails() {
    let types = type_system();
    let err = types.instantiate("int").unwrap_err();
    assert!(matches!(err, TypeError::NotClass(_)));
}

#[test]
fn not_primitive() {
    let mut types = type_system();
    types.define_class("class A").register().unwrap();
    let err = types.primitive("class A").unwrap_err();
    assert!(matches!(err, TypeError::NotPrimitive(_)));
}

#[test]
fn property_order_is_declaration_order() {
    let mut types = type_system();
    types
        .define_class("class Ordered")
        .property("m_first", "int")
        .property("m_second", "std::string")
        .vector("m_third", "unsigned char")
        .register()
        .unwrap();

    let instance = types.instantiate("class Ordered").unwrap();
    let names: Vec<&str> = instance.properties().map(|p| p.name()).collect();
    assert_eq!(names, vec!["m_first", "m_second", "m_third"]);
}

#[test]
fn subclass_appends_properties_after_base() {
    let mut types = type_system();
    types
        .define_class("class Base")
        .property("m_base_a", "int")
        .property("m_base_b", "short")
        .register()
        .unwrap();
    types
        .define_class("class Derived")
        .base("class Base")
        .property("m_own", "std::string")
        .register()
        .unwrap();

    let instance = types.instantiate("class Derived").unwrap();
    let names: Vec<&str> = instance.properties().map(|p| p.name()).collect();
    assert_eq!(names, vec!["m_base_a", "m_base_b", "m_own"]);

    let derived = types.get("class Derived").unwrap();
    let derived = derived.as_class().unwrap();
    assert!(derived.is_a(types.hash_of("class Base")));
    assert!(derived.is_a(types.hash_of("class Derived")));
}

#[test]
fn scalar_get_set() {
    let mut types = type_system();
    types
        .define_class("class A")
        .property("m_value", "int")
        .property("m_name", "std::string")
        .register()
        .unwrap();

    let mut instance = types.instantiate("class A").unwrap();
    assert_eq!(instance.get("m_value").unwrap(), &Value::Signed(0));

    instance.set("m_value", -42).unwrap();
    instance.set("m_name", "test").unwrap();
    assert_eq!(instance.get("m_value").unwrap(), &Value::Signed(-42));
    assert_eq!(instance.get("m_name").unwrap(), &Value::Str("test".to_owned()));
}

#[test]
fn type_mismatch_on_set() {
    let mut types = type_system();
    types
        .define_class("class A")
        .property("m_value", "int")
        .property("m_small", "bi4")
        .register()
        .unwrap();

    let mut instance = types.instantiate("class A").unwrap();
    let err = instance.set("m_value", "text").unwrap_err();
    assert!(matches!(err, PropertyError::TypeMismatch { .. }));

    // Out-of-range for the 4-bit width.
    let err = instance.set("m_small", 100).unwrap_err();
    assert!(matches!(err, PropertyError::TypeMismatch { .. }));
    instance.set("m_small", -6).unwrap();
}

#[test]
fn unknown_property() {
    let mut types = type_system();
    types.define_class("class A").register().unwrap();
    let instance = types.instantiate("class A").unwrap();
    let err = instance.get("m_missing").unwrap_err();
    assert!(matches!(err, PropertyError::UnknownProperty(_)));
}

#[test]
fn fixed_array_bounds() {
    let mut types = type_system();
    types
        .define_class("class A")
        .array("m_values", "int", 3)
        .register()
        .unwrap();

    let mut instance = types.instantiate("class A").unwrap();
    assert_eq!(instance.len("m_values").unwrap(), 3);
    instance.set_at("m_values", 2, 7).unwrap();
    assert_eq!(instance.get_at("m_values", 2).unwrap(), &Value::Signed(7));

    let err = instance.set_at("m_values", 3, 7).unwrap_err();
    assert!(matches!(err, PropertyError::OutOfRange { index: 3, .. }));

    // Whole-array assignment requires the declared length.
    let err = instance
        .set_all("m_values", (0..2).map(Value::from))
        .unwrap_err();
    assert!(matches!(err, PropertyError::OutOfRange { .. }));
}

#[test]
fn vector_operations() {
    let mut types = type_system();
    types
        .define_class("class A")
        .vector("m_values", "int")
        .register()
        .unwrap();

    let mut instance = types.instantiate("class A").unwrap();
    assert_eq!(instance.len("m_values").unwrap(), 0);

    instance.push("m_values", 1).unwrap();
    instance.push("m_values", 2).unwrap();
    assert_eq!(instance.len("m_values").unwrap(), 2);

    instance.resize("m_values", 4).unwrap();
    assert_eq!(instance.len("m_values").unwrap(), 4);
    assert_eq!(instance.get_at("m_values", 3).unwrap(), &Value::Signed(0));

    instance.clear("m_values").unwrap();
    assert_eq!(instance.len("m_values").unwrap(), 0);
}

#[test]
fn pointer_properties() {
    let mut types = type_system();
    types
        .define_class("class Base")
        .property("m_value", "int")
        .register()
        .unwrap();
    types
        .define_class("class Derived")
        .base("class Base")
        .property("m_extra", "int")
        .register()
        .unwrap();
    types
        .define_class("class Holder")
        .pointer("m_object", "class Base")
        .register()
        .unwrap();

    let mut holder = types.instantiate("class Holder").unwrap();
    assert!(holder.is_null("m_object").unwrap());

    // A subclass instance is a valid referent for a base-typed pointer.
    let mut derived = types.instantiate("class Derived").unwrap();
    derived.set("m_extra", 9).unwrap();
    holder.set("m_object", derived).unwrap();
    assert!(!holder.is_null("m_object").unwrap());
    assert_eq!(
        holder
            .get("m_object")
            .unwrap()
            .as_object()
            .unwrap()
            .class()
            .name(),
        "class Derived"
    );

    holder.set_null("m_object").unwrap();
    assert!(holder.is_null("m_object").unwrap());
}

#[test]
fn unrelated_class_is_rejected_by_pointer() {
    let mut types = type_system();
    types.define_class("class Base").register().unwrap();
    types.define_class("class Other").register().unwrap();
    types
        .define_class("class Holder")
        .pointer("m_object", "class Base")
        .register()
        .unwrap();

    let mut holder = types.instantiate("class Holder").unwrap();
    let other = types.instantiate("class Other").unwrap();
    let err = holder.set("m_object", other).unwrap_err();
    assert!(matches!(err, PropertyError::TypeMismatch { .. }));
}

#[test]
fn self_referential_class() {
    let mut types = type_system();
    types
        .define_class("class Node")
        .property("m_value", "int")
        .pointer("m_next", "class Node")
        .register()
        .unwrap();

    let mut tail = types.instantiate("class Node").unwrap();
    tail.set("m_value", 2).unwrap();
    let mut head = types.instantiate("class Node").unwrap();
    head.set("m_value", 1).unwrap();
    head.set("m_next", tail).unwrap();

    assert_eq!(
        head.get("m_next")
            .unwrap()
            .as_object()
            .unwrap()
            .get("m_value")
            .unwrap(),
        &Value::Signed(2)
    );
}

#[test]
fn enum_registration_and_validation() {
    let mut types = type_system();
    types
        .define_enum("enum TestEnum")
        .element("VALUE_A", 1)
        .element("VALUE_B", 2)
        .element("VALUE_C", 4)
        .register()
        .unwrap();
    types
        .define_class("class A")
        .property("m_mode", "enum TestEnum")
        .register()
        .unwrap();

    let enum_type = types.get("enum TestEnum").unwrap();
    let enum_type = enum_type.as_enum().unwrap();
    assert_eq!(enum_type.value_of("VALUE_B"), Some(2));
    assert_eq!(enum_type.name_of(4), Some("VALUE_C"));
    assert!(!enum_type.is_valid(3));

    let mut instance = types.instantiate("class A").unwrap();
    instance.set("m_mode", Value::Enum(4)).unwrap();
    let err = instance.set("m_mode", Value::Enum(3)).unwrap_err();
    assert!(matches!(err, PropertyError::TypeMismatch { .. }));
}

#[test]
fn initializer_runs_on_instantiation() {
    let mut types = type_system();
    types
        .define_class("class A")
        .property("m_value", "int")
        .initializer(|instance| {
            instance.set("m_value", 77).unwrap();
        })
        .register()
        .unwrap();

    let instance = types.instantiate("class A").unwrap();
    assert_eq!(instance.get("m_value").unwrap(), &Value::Signed(77));
}

#[test]
fn deep_clone() {
    let mut types = type_system();
    types
        .define_class("class Inner")
        .property("m_value", "int")
        .register()
        .unwrap();
    types
        .define_class("class Outer")
        .pointer("m_inner", "class Inner")
        .register()
        .unwrap();

    let mut inner = types.instantiate("class Inner").unwrap();
    inner.set("m_value", 5).unwrap();
    let mut outer = types.instantiate("class Outer").unwrap();
    outer.set("m_inner", inner).unwrap();

    let mut copy = outer.clone();
    assert_eq!(copy, outer);

    // Mutating the copy's nested object leaves the original untouched.
    let mut inner = copy.get("m_inner").unwrap().as_object().unwrap().clone();
    inner.set("m_value", 6).unwrap();
    copy.set("m_inner", inner).unwrap();
    assert_ne!(copy, outer);
    assert_eq!(
        outer
            .get("m_inner")
            .unwrap()
            .as_object()
            .unwrap()
            .get("m_value")
            .unwrap(),
        &Value::Signed(5)
    );
}

#[test]
fn property_flags_default() {
    let mut types = type_system();
    types
        .define_class("class A")
        .property("m_value", "int")
        .property("m_secret", "int")
        .flags(PropertyFlags::NONE)
        .register()
        .unwrap();

    let instance = types.instantiate("class A").unwrap();
    let flags: Vec<PropertyFlags> = instance
        .properties()
        .map(|p| p.descriptor().flags())
        .collect();
    assert_eq!(flags[0], PropertyFlags::SAVE | PropertyFlags::COPY);
    assert_eq!(flags[1], PropertyFlags::NONE);
}

#[test]
fn registered_types_enumerate_in_order() {
    let mut types = type_system();
    types.define_class("class A").register().unwrap();
    types.define_class("class B").register().unwrap();

    let names: Vec<&str> = types.iter().map(|t| t.name()).collect();
    // The standard primitives come first, classes after, in order.
    assert_eq!(names.first(), Some(&"bi4"));
    let classes: Vec<&str> = names
        .into_iter()
        .filter(|n| n.starts_with("class"))
        .collect();
    assert_eq!(classes, vec!["class A", "class B"]);
}
