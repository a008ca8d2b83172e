#![cfg(feature = "sqlite")]

mod common;

use std::rc::Rc;

use common::{Product, TestDb};
use sql_persistence::prelude::*;

#[test]
fn persisted_entity_is_found_as_the_same_instance() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    let factory = db.factory(2);
    let session = factory.open_session()?;

    let product = Product::new("Widget", Some("Acme"), 9.5);
    let tx = session.transaction();
    tx.begin()?;
    session.persist(&product)?;
    tx.commit()?;

    let id = product.borrow().id.expect("generated id assigned on insert");
    let found = session.find::<Product>(id)?.expect("row exists");
    assert!(Rc::ptr_eq(&found, &product));
    assert!(Rc::ptr_eq(&session.find::<Product>(id)?.unwrap(), &found));

    session.close()?;
    factory.close()?;
    Ok(())
}

#[test]
fn loaded_rows_are_mapped_in_a_new_session() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    db.raw()
        .execute_batch(
            "INSERT INTO Product(productName, producer, price) VALUES ('Lamp', NULL, 12);",
        )
        .unwrap();
    let factory = db.factory(1);
    let session = factory.open_session()?;

    let lamp = session.find::<Product>(1)?.expect("seeded row");
    let lamp = lamp.borrow();
    assert_eq!(lamp.id, Some(1));
    assert_eq!(lamp.product_name, "Lamp");
    assert_eq!(lamp.producer, None);
    assert!((lamp.price - 12.0).abs() < f64::EPSILON);

    assert!(session.find::<Product>(42)?.is_none());
    Ok(())
}

#[test]
fn persist_and_remove_require_an_open_transaction() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    let factory = db.factory(1);
    let session = factory.open_session()?;

    let product = Product::new("Chair", None, 40.0);
    let err = session.persist(&product).unwrap_err();
    assert!(matches!(err, PersistenceError::State(_)));

    let tx = session.transaction();
    tx.begin()?;
    session.persist(&product)?;
    tx.commit()?;

    let err = session.remove(&product).unwrap_err();
    assert!(matches!(err, PersistenceError::State(ref m) if m.contains("Transaction")));
    assert_eq!(db.count("Product"), 1);
    Ok(())
}

#[test]
fn remove_deletes_the_row_and_evicts_the_entity() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    let factory = db.factory(1);
    let session = factory.open_session()?;
    let tx = session.transaction();

    let product = Product::new("Desk", Some("Oak & Co"), 150.0);
    tx.begin()?;
    session.persist(&product)?;
    tx.commit()?;
    let id = product.borrow().id.unwrap();

    tx.begin()?;
    session.remove(&product)?;
    tx.commit()?;

    assert_eq!(db.count("Product"), 0);
    assert!(session.find::<Product>(id)?.is_none());
    Ok(())
}

#[test]
fn transient_and_duplicate_entities_cannot_be_removed_or_persisted_twice()
-> Result<(), PersistenceError> {
    let db = TestDb::new();
    let factory = db.factory(1);
    let session = factory.open_session()?;
    let tx = session.transaction();
    tx.begin()?;

    let transient = Product::new("Ghost", None, 1.0);
    assert!(matches!(
        session.remove(&transient),
        Err(PersistenceError::State(_))
    ));

    session.persist(&transient)?;
    session.flush()?;
    let id = transient.borrow().id.unwrap();

    let copy = Product {
        id: Some(id),
        product_name: "Ghost".into(),
        producer: None,
        price: 1.0,
    }
    .into_ref();
    let err = session.persist(&copy).unwrap_err();
    assert!(matches!(err, PersistenceError::State(ref m) if m.contains("already persistent")));
    assert!(matches!(
        session.remove(&copy),
        Err(PersistenceError::State(_))
    ));
    tx.commit()?;
    Ok(())
}

#[test]
fn find_all_loads_fresh_instances() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    let factory = db.factory(1);
    let session = factory.open_session()?;
    let tx = session.transaction();

    let a = Product::new("A", None, 1.0);
    let b = Product::new("B", None, 2.0);
    tx.begin()?;
    session.persist(&a)?;
    session.persist(&b)?;

    let all = session.find_all::<Product>()?;
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|p| !Rc::ptr_eq(p, &a) && !Rc::ptr_eq(p, &b)));
    let names: Vec<String> = all.iter().map(|p| p.borrow().product_name.clone()).collect();
    assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    tx.commit()?;
    Ok(())
}

#[test]
fn closed_session_rejects_every_operation() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    let factory = db.factory(1);
    let session = factory.open_session()?;
    assert!(session.is_open());
    session.close()?;
    assert!(!session.is_open());

    assert!(matches!(session.find::<Product>(1), Err(PersistenceError::State(_))));
    assert!(matches!(session.flush(), Err(PersistenceError::State(_))));
    assert!(matches!(session.close(), Err(PersistenceError::State(_))));
    assert!(matches!(
        session.transaction().begin(),
        Err(PersistenceError::State(_))
    ));
    Ok(())
}

#[test]
fn close_flushes_pending_changes() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    let factory = db.factory(1);
    let session = factory.open_session()?;
    let product = Product::new("Pen", None, 0.5);
    session.transaction().begin()?;
    session.persist(&product)?;
    session.close()?;

    assert_eq!(db.count("Product"), 1);
    assert!(product.borrow().id.is_some());
    Ok(())
}
