//! # Type System Integration Tests
//!
//! Black-box coverage of classes, descriptors, and nodes through the public
//! API: identifier validation, canonical serialization, and on-disk value
//! round-trips.

use std::sync::Arc;

use tempfile::tempdir;
use tuskdb::{Class, ClassDescriptor, DbError, DbFile, Node, PrimitiveKind, Value};

fn open_test_file() -> (DbFile, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let file = DbFile::open(dir.path().join("test.data")).unwrap();
    (file, dir)
}

#[test]
fn invalid_class_names_are_rejected() {
    for name in ["name_", "n@me", "<name>"] {
        let err = Class::string(name).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<DbError>(), Some(DbError::Type(_))),
            "'{}' was not rejected with a type error",
            name
        );
    }

    assert!(Class::string("name").is_ok());
}

#[test]
fn simple_read_write() {
    let (file, _dir) = open_test_file();
    let name = Arc::new(Class::string("name").unwrap());
    let mut node = Node::new(Arc::clone(&name), "Greg".into()).unwrap();

    node.write(&file, 0).unwrap();
    file.write_at(b"Cool", 4).unwrap();

    assert_eq!(node.to_string(), "name: \"Greg\"");
    node.read(&file, 0).unwrap();
    assert_eq!(node.to_string(), "name: \"Cool\"");
}

#[test]
fn struct_read_write_with_in_place_patches() {
    let (file, _dir) = open_test_file();
    let person = Arc::new(
        Class::structure(
            "person",
            vec![
                Class::string("name").unwrap(),
                Class::string("surname").unwrap(),
                Class::primitive(PrimitiveKind::Int, "age").unwrap(),
                Class::primitive(PrimitiveKind::Bool, "male").unwrap(),
            ],
        )
        .unwrap(),
    );
    let mut node = Node::new(
        Arc::clone(&person),
        Value::Struct(vec![
            "Greg".into(),
            "Sosnovtsev".into(),
            19.into(),
            true.into(),
        ]),
    )
    .unwrap();

    node.write(&file, 0).unwrap();
    file.write_at(b"Cool", 4).unwrap();
    file.write_at(&20i32.to_le_bytes(), 22).unwrap();

    assert_eq!(
        node.to_string(),
        "person: { name: \"Greg\", surname: \"Sosnovtsev\", age: 19, male: true }"
    );
    node.read(&file, 0).unwrap();
    assert_eq!(
        node.to_string(),
        "person: { name: \"Cool\", surname: \"Sosnovtsev\", age: 20, male: true }"
    );
}

#[test]
fn struct_construction_is_arity_checked() {
    let person = Arc::new(
        Class::structure(
            "person",
            vec![
                Class::string("name").unwrap(),
                Class::string("surname").unwrap(),
                Class::primitive(PrimitiveKind::Int, "age").unwrap(),
                Class::primitive(PrimitiveKind::Bool, "male").unwrap(),
            ],
        )
        .unwrap(),
    );

    let err = Node::new(
        person,
        Value::Struct(vec!["Greg".into(), "Sosnovtsev".into()]),
    )
    .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DbError>(),
        Some(DbError::BadArgument(_))
    ));
}

#[test]
fn default_new_produces_empty_values() {
    let person = Arc::new(
        Class::structure(
            "person",
            vec![
                Class::string("name").unwrap(),
                Class::string("surname").unwrap(),
                Class::primitive(PrimitiveKind::Int, "age").unwrap(),
                Class::primitive(PrimitiveKind::Bool, "male").unwrap(),
            ],
        )
        .unwrap(),
    );

    let node = Node::default_new(person);

    assert_eq!(
        node.to_string(),
        "person: { name: \"\", surname: \"\", age: 0, male: false }"
    );
}

#[test]
fn read_new_reconstructs_a_stored_node() {
    let (file, _dir) = open_test_file();
    let person = Arc::new(
        Class::structure(
            "person",
            vec![
                Class::string("name").unwrap(),
                Class::string("surname").unwrap(),
                Class::primitive(PrimitiveKind::Int, "age").unwrap(),
                Class::primitive(PrimitiveKind::Bool, "male").unwrap(),
            ],
        )
        .unwrap(),
    );
    let node = Node::new(
        Arc::clone(&person),
        Value::Struct(vec![
            "Greg".into(),
            "Sosnovtsev".into(),
            19.into(),
            true.into(),
        ]),
    )
    .unwrap();
    node.write(&file, 0).unwrap();

    let read = Node::read_new(person, &file, 0).unwrap();

    assert_eq!(read.to_string(), node.to_string());
}

#[test]
fn descriptor_dump_round_trips_at_an_offset() {
    let (file, _dir) = open_test_file();
    let person = Class::structure(
        "person",
        vec![
            Class::string("name").unwrap(),
            Class::string("surname").unwrap(),
            Class::primitive(PrimitiveKind::Int, "age").unwrap(),
            Class::primitive(PrimitiveKind::UnsignedLong, "money").unwrap(),
        ],
    )
    .unwrap();
    let descriptor = ClassDescriptor::new(&person);

    descriptor.write(&file, 1488).unwrap();

    assert_eq!(
        descriptor.to_string(),
        "_struct@person_<_string@name__string@surname__int@age__unsignedlong@money_>"
    );
    let read = ClassDescriptor::read(&file, 1488).unwrap();
    assert_eq!(read.to_string(), descriptor.to_string());
}

#[test]
fn descriptor_containment_checks_kind_and_name() {
    let person = ClassDescriptor::new(
        &Class::structure(
            "person",
            vec![
                Class::string("name").unwrap(),
                Class::string("surname").unwrap(),
                Class::primitive(PrimitiveKind::Int, "age").unwrap(),
                Class::primitive(PrimitiveKind::Bool, "male").unwrap(),
            ],
        )
        .unwrap(),
    );

    let surname_string = ClassDescriptor::new(&Class::string("surname").unwrap());
    let surname_int =
        ClassDescriptor::new(&Class::primitive(PrimitiveKind::Int, "surname").unwrap());
    let address_string = ClassDescriptor::new(&Class::string("address").unwrap());

    assert!(person.contains(&surname_string));
    assert!(!person.contains(&surname_int));
    assert!(!person.contains(&address_string));
}
