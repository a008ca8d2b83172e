#![cfg(feature = "sqlite")]

mod common;

use common::{Product, TestDb};
use sql_persistence::prelude::*;

#[test]
fn inserts_run_before_deletes_regardless_of_call_order() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    db.raw()
        .execute_batch("INSERT INTO Product(productName, producer, price) VALUES ('Old', NULL, 1);")
        .unwrap();
    let (factory, log) = db.recording_factory(1);
    let session = factory.open_session()?;
    let tx = session.transaction();

    let old = session.find::<Product>(1)?.unwrap();
    log.clear();

    tx.begin()?;
    session.remove(&old)?;
    session.persist(&Product::new("New", None, 2.0))?;
    tx.commit()?;

    let writes: Vec<String> = log
        .statements()
        .into_iter()
        .filter(|sql| !sql.starts_with("SELECT"))
        .collect();
    assert_eq!(
        writes,
        vec![
            "INSERT INTO Product(productName, producer, price) VALUES (?,?,?)".to_string(),
            "DELETE FROM Product WHERE id = ?".to_string(),
            "COMMIT".to_string(),
        ]
    );
    assert_eq!(db.count("Product"), 1);
    Ok(())
}

#[test]
fn one_flush_runs_inserts_then_updates_then_deletes() -> Result<(), PersistenceError> {
    let db = TestDb::new();
    db.raw()
        .execute_batch(
            "INSERT INTO Product(productName, producer, price) VALUES ('Keep', NULL, 1);
             INSERT INTO Product(productName, producer, price) VALUES ('Drop', NULL, 1);",
        )
        .unwrap();
    let (factory, log) = db.recording_factory(1);
    let session = factory.open_session()?;
    let tx = session.transaction();

    let keep = session.find::<Product>(1)?.unwrap();
    let doomed = session.find::<Product>(2)?.unwrap();
    log.clear();

    tx.begin()?;
    session.remove(&doomed)?;
    keep.borrow_mut().price = 3.0;
    session.persist(&Product::new("First", None, 5.0))?;
    session.persist(&Product::new("Second", None, 6.0))?;
    tx.commit()?;

    let kinds: Vec<String> = log
        .statements()
        .iter()
        .map(|sql| sql.split_whitespace().next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, vec!["INSERT", "INSERT", "UPDATE", "DELETE", "COMMIT"]);

    let names: Vec<String> = db
        .raw()
        .prepare("SELECT productName FROM Product ORDER BY id")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names, vec!["Keep", "First", "Second"]);
    Ok(())
}

#[test]
fn insert_of_a_child_after_its_parent_sees_the_generated_key() -> Result<(), PersistenceError> {
    use common::{Car, Wheel};

    let db = TestDb::new();
    let factory = db.factory(1);
    let session = factory.open_session()?;
    let tx = session.transaction();

    let car = Car {
        model: "Roadster".into(),
        ..Car::default()
    }
    .into_ref();
    let wheel = Wheel {
        position: "front-left".into(),
        car: Some(car.clone()),
        ..Wheel::default()
    }
    .into_ref();

    tx.begin()?;
    session.persist(&car)?;
    session.persist(&wheel)?;
    tx.commit()?;

    let car_id: i64 = db
        .raw()
        .query_row("SELECT car_id FROM Wheel", [], |row| row.get(0))
        .unwrap();
    assert_eq!(Some(car_id), car.borrow().id);
    Ok(())
}
