#![cfg(feature = "sqlite")]

mod common;

use common::{Product, TestDb};
use sql_persistence::prelude::*;

#[test]
fn mutated_entity_issues_exactly_one_update() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    db.raw()
        .execute_batch("INSERT INTO Product(productName, producer, price) VALUES ('Kettle', 'Brew', 30);")
        .unwrap();
    let (factory, log) = db.recording_factory(1);
    let session = factory.open_session()?;

    let kettle = session.find::<Product>(1)?.unwrap();
    log.clear();
    session.flush()?;
    assert!(log.starting_with("UPDATE").is_empty());

    kettle.borrow_mut().price = 35.0;
    session.flush()?;
    assert_eq!(
        log.starting_with("UPDATE"),
        vec!["UPDATE Product SET productName = ?, producer = ?, price = ? WHERE id = ?".to_string()]
    );

    session.flush()?;
    assert_eq!(log.starting_with("UPDATE").len(), 1);

    let price: f64 = db
        .raw()
        .query_row("SELECT price FROM Product WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert!((price - 35.0).abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn clearing_a_field_to_null_is_detected() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    db.raw()
        .execute_batch("INSERT INTO Product(productName, producer, price) VALUES ('Mug', 'Clay', 4);")
        .unwrap();
    let factory = db.factory(1);
    let session = factory.open_session()?;

    let mug = session.find::<Product>(1)?.unwrap();
    mug.borrow_mut().producer = None;
    session.close()?;

    let producer: Option<String> = db
        .raw()
        .query_row("SELECT producer FROM Product WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(producer, None);
    Ok(())
}

#[test]
fn update_of_a_vanished_row_fails_and_keeps_the_entity_dirty() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    db.raw()
        .execute_batch("INSERT INTO Product(productName, producer, price) VALUES ('Vase', NULL, 20);")
        .unwrap();
    let (factory, log) = db.recording_factory(1);
    let session = factory.open_session()?;

    let vase = session.find::<Product>(1)?.unwrap();
    db.raw().execute_batch("DELETE FROM Product;").unwrap();
    vase.borrow_mut().price = 25.0;

    let err = session.flush().unwrap_err();
    assert!(matches!(err, PersistenceError::Flush(_)));
    assert!(matches!(
        err.root_cause(),
        PersistenceError::RowCount { operation: "update", expected: 1, actual: 0 }
    ));
    assert!(log.statements().contains(&"ROLLBACK".to_string()));

    log.clear();
    assert!(session.flush().is_err());
    assert_eq!(log.starting_with("UPDATE").len(), 1);
    assert!(session.is_open());
    Ok(())
}

#[test]
fn remove_of_a_vanished_row_fails_at_flush() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    db.raw()
        .execute_batch("INSERT INTO Product(productName, producer, price) VALUES ('Rug', NULL, 80);")
        .unwrap();
    let factory = db.factory(1);
    let session = factory.open_session()?;
    let tx = session.transaction();

    let rug = session.find::<Product>(1)?.unwrap();
    db.raw().execute_batch("DELETE FROM Product;").unwrap();
    tx.begin()?;
    session.remove(&rug)?;
    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err.root_cause(),
        PersistenceError::RowCount { operation: "delete", .. }
    ));
    assert!(!tx.is_active());
    assert!(std::rc::Rc::ptr_eq(&session.find::<Product>(1)?.unwrap(), &rug));
    Ok(())
}
