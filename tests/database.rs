//! # Database Integration Tests
//!
//! End-to-end scenarios over the public API: opening and recovering files,
//! registering classes, recycling pages, and storing nodes. Each test works
//! on its own temporary file.

use std::sync::Arc;

use tempfile::tempdir;
use tracing_subscriber::EnvFilter;
use tuskdb::storage::{PAGETABLE_ORIGIN, PAGE_SIZE};
use tuskdb::{Class, Database, DbError, DbFile, Node, OpenMode, PrimitiveKind, PrintMode, Value};

/// Opt into log output with `RUST_LOG=tuskdb=debug cargo test`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn person_class() -> Class {
    Class::structure(
        "person",
        vec![
            Class::string("name").unwrap(),
            Class::string("surname").unwrap(),
            Class::primitive(PrimitiveKind::Int, "age").unwrap(),
            Class::primitive(PrimitiveKind::Bool, "male").unwrap(),
        ],
    )
    .unwrap()
}

fn assert_page_aligned(db: &Database) {
    let tail = db.file().size().unwrap() - db.pagetable_origin();
    assert_eq!(tail % PAGE_SIZE as u64, 0);
}

mod open_tests {
    use super::*;

    #[test]
    fn default_mode_initializes_an_empty_file() {
        let dir = tempdir().unwrap();

        let db = Database::open(dir.path().join("test.db"), OpenMode::Default).unwrap();

        assert_eq!(db.pages_count(), 0);
        assert_eq!(db.free_pages_count().unwrap(), 0);
        assert_eq!(db.class_count().unwrap(), 0);
        assert_eq!(db.file().size().unwrap(), PAGETABLE_ORIGIN);
        assert_page_aligned(&db);
    }

    #[test]
    fn default_mode_reinitializes_a_non_database_file() {
        init_logging();
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let file = DbFile::open(&path).unwrap();
        file.write_at(b"this is not a database at all", 0).unwrap();
        drop(file);

        let db = Database::open(&path, OpenMode::Default).unwrap();

        assert_eq!(db.class_count().unwrap(), 0);
        assert_eq!(db.file().size().unwrap(), PAGETABLE_ORIGIN);
    }

    #[test]
    fn default_mode_keeps_an_existing_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let mut db = Database::open(&path, OpenMode::Write).unwrap();
            db.add_class(&person_class()).unwrap();
        }

        let db = Database::open(&path, OpenMode::Default).unwrap();

        assert_eq!(db.class_count().unwrap(), 1);
    }

    #[test]
    fn read_mode_rejects_an_empty_file() {
        let dir = tempdir().unwrap();

        let err = Database::open(dir.path().join("test.db"), OpenMode::Read).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::Structure(_))
        ));
    }

    #[test]
    fn write_mode_wipes_an_existing_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let mut db = Database::open(&path, OpenMode::Write).unwrap();
            db.add_class(&person_class()).unwrap();
        }

        let db = Database::open(&path, OpenMode::Write).unwrap();

        assert_eq!(db.class_count().unwrap(), 0);
        assert_eq!(db.pages_count(), 0);
    }
}

mod class_tests {
    use super::*;

    #[test]
    fn added_class_is_listed_from_cache_and_file() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();

        db.add_class(&person_class()).unwrap();

        let expected =
            "[0] : _struct@person_<_string@name__string@surname__int@age__bool@male_>\n";
        assert_eq!(db.print_all_classes(PrintMode::Cache).unwrap(), expected);
        assert_eq!(db.print_all_classes(PrintMode::File).unwrap(), expected);
        assert_page_aligned(&db);
    }

    #[test]
    fn duplicate_class_is_rejected() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();
        db.add_class(&person_class()).unwrap();

        let err = db.add_class(&person_class()).unwrap_err();

        assert_eq!(
            err.downcast_ref::<DbError>(),
            Some(&DbError::Runtime(
                "Class already present in database".to_string()
            ))
        );
        assert_eq!(db.class_count().unwrap(), 1);
    }

    #[test]
    fn oversized_class_is_rejected() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();

        // The canonical string alone outgrows a page.
        let huge = Class::string(&"a".repeat(PAGE_SIZE)).unwrap();
        let err = db.add_class(&huge).unwrap_err();

        assert_eq!(
            err.downcast_ref::<DbError>(),
            Some(&DbError::NotImplemented("Too complex class".to_string()))
        );
        assert_eq!(db.class_count().unwrap(), 0);
        assert_page_aligned(&db);
    }

    #[test]
    fn cache_and_file_listings_agree_for_many_classes() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();

        db.add_class(&person_class()).unwrap();
        db.add_class(&Class::string("name").unwrap()).unwrap();
        db.add_class(&Class::primitive(PrimitiveKind::UnsignedLong, "money").unwrap())
            .unwrap();

        let mut cache: Vec<String> = db
            .print_all_classes(PrintMode::Cache)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        let mut file: Vec<String> = db
            .print_all_classes(PrintMode::File)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        cache.sort();
        file.sort();

        assert_eq!(cache.len(), 3);
        assert_eq!(cache, file);
    }

    #[test]
    fn classes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let expected = {
            let mut db = Database::open(&path, OpenMode::Write).unwrap();
            db.add_class(&person_class()).unwrap();
            db.add_class(&Class::string("name").unwrap()).unwrap();
            db.print_all_classes(PrintMode::File).unwrap()
        };

        let db = Database::open(&path, OpenMode::Read).unwrap();

        assert_eq!(db.class_count().unwrap(), 2);
        assert_eq!(db.print_all_classes(PrintMode::File).unwrap(), expected);

        let mut cache: Vec<&str> = expected.lines().collect();
        let listed = db.print_all_classes(PrintMode::Cache).unwrap();
        let mut reopened: Vec<&str> = listed.lines().collect();
        cache.sort();
        reopened.sort();
        assert_eq!(cache, reopened);
    }
}

mod page_recycling_tests {
    use super::*;

    #[test]
    fn freed_pages_are_reused_most_recent_first() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();
        let pages: Vec<u64> = (0..4).map(|_| db.allocate_page().unwrap()).collect();
        let size_before = db.file().size().unwrap();

        for &page in &pages {
            db.free_page(page).unwrap();
        }
        assert_eq!(db.free_pages_count().unwrap(), 4);

        let reused: Vec<u64> = (0..4).map(|_| db.allocate_page().unwrap()).collect();

        assert_eq!(reused, vec![3, 2, 1, 0]);
        // Recycling never grows the file.
        assert_eq!(db.file().size().unwrap(), size_before);
        assert_page_aligned(&db);
    }

    #[test]
    fn double_free_is_rejected() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();
        let page = db.allocate_page().unwrap();

        db.free_page(page).unwrap();
        let err = db.free_page(page).unwrap_err();

        assert_eq!(
            err.downcast_ref::<DbError>(),
            Some(&DbError::Runtime("Double free".to_string()))
        );
        assert_eq!(db.free_pages_count().unwrap(), 1);
    }

    #[test]
    fn add_class_consumes_the_free_list_first() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();
        let page = db.allocate_page().unwrap();
        db.free_page(page).unwrap();

        db.add_class(&person_class()).unwrap();

        // The recycled page hosts the class; the file did not grow.
        assert_eq!(db.pages_count(), 1);
        assert_eq!(db.free_pages_count().unwrap(), 0);
        let listing = db.print_all_classes(PrintMode::File).unwrap();
        assert!(listing.starts_with(&format!("[{}] :", page)));
    }
}

mod node_tests {
    use super::*;

    fn full_person_class() -> Arc<Class> {
        let address = Class::structure(
            "address",
            vec![
                Class::string("city").unwrap(),
                Class::string("street").unwrap(),
                Class::primitive(PrimitiveKind::UnsignedLong, "house").unwrap(),
            ],
        )
        .unwrap();
        Arc::new(
            Class::structure(
                "person",
                vec![
                    Class::string("name").unwrap(),
                    Class::string("surname").unwrap(),
                    Class::primitive(PrimitiveKind::Int, "age").unwrap(),
                    address,
                ],
            )
            .unwrap(),
        )
    }

    fn person_node(class: &Arc<Class>, i: u64) -> Node {
        Node::new(
            Arc::clone(class),
            Value::Struct(vec![
                format!("Greg {}", i).into(),
                "Sosnovtsev".into(),
                19.into(),
                Value::Struct(vec![
                    "Saint-Petersburg".into(),
                    "Lomonosova".into(),
                    i.into(),
                ]),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn a_hundred_nodes_round_trip_in_order() {
        init_logging();
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();
        let person = full_person_class();
        db.add_class(&person).unwrap();

        for i in 0..100 {
            db.add_node(&person_node(&person, i)).unwrap();
        }

        let nodes = db.collect_nodes(&person).unwrap();
        assert_eq!(nodes.len(), 100);
        assert_eq!(db.node_count(&person).unwrap(), 100);
        assert_eq!(
            nodes[0].to_string(),
            "person: { name: \"Greg 0\", surname: \"Sosnovtsev\", age: 19, \
             address: { city: \"Saint-Petersburg\", street: \"Lomonosova\", house: 0 } }"
        );
        assert_eq!(
            nodes[99].to_string(),
            "person: { name: \"Greg 99\", surname: \"Sosnovtsev\", age: 19, \
             address: { city: \"Saint-Petersburg\", street: \"Lomonosova\", house: 99 } }"
        );
        assert_page_aligned(&db);
    }

    #[test]
    fn nodes_pack_into_pages_before_growing() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();
        let person = full_person_class();
        db.add_class(&person).unwrap();

        for i in 0..100 {
            db.add_node(&person_node(&person, i)).unwrap();
        }

        // One class page plus two bump-packed node pages.
        assert_eq!(db.pages_count(), 3);
    }

    #[test]
    fn nodes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let person = full_person_class();
        {
            let mut db = Database::open(&path, OpenMode::Write).unwrap();
            db.add_class(&person).unwrap();
            for i in 0..10 {
                db.add_node(&person_node(&person, i)).unwrap();
            }
        }

        let db = Database::open(&path, OpenMode::Read).unwrap();

        let nodes = db.collect_nodes(&person).unwrap();
        assert_eq!(nodes.len(), 10);
        assert_eq!(nodes[3], person_node(&person, 3));
    }

    #[test]
    fn node_of_an_unregistered_class_is_rejected() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db"), OpenMode::Write).unwrap();
        let person = full_person_class();

        let err = db.add_node(&person_node(&person, 0)).unwrap_err();

        assert_eq!(
            err.downcast_ref::<DbError>(),
            Some(&DbError::Runtime("Class not present in database".to_string()))
        );
    }
}
