#![cfg(feature = "sqlite")]

mod common;

use chrono::NaiveTime;
use common::TestDb;
use sql_persistence::prelude::*;

#[derive(Debug, Default)]
struct Shift {
    id: Option<i64>,
    starts: NaiveTime,
    ends: Option<NaiveTime>,
    rate: f32,
    badge: Vec<u8>,
}

impl Entity for Shift {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new()
            .generated_id("id", |s: &Shift| s.id, |s, v| s.id = v)
            .column("starts", |s| s.starts, |s, v| s.starts = v)
            .column("ends", |s| s.ends, |s, v| s.ends = v)
            .column("rate", |s| s.rate, |s, v| s.rate = v)
            .column("badge", |s| s.badge.clone(), |s, v| s.badge = v)
    }
}

fn shift_db() -> TestDb {
    let db = TestDb::new();
    db.raw()
        .execute_batch(
            "CREATE TABLE Shift (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                starts TEXT NOT NULL,
                ends TEXT,
                rate NUMERIC NOT NULL,
                badge BLOB NOT NULL
            );",
        )
        .unwrap();
    db
}

#[test]
fn time_and_numeric_columns_map_from_stored_text_and_integers() -> Result<(), PersistenceError> {
    let db = shift_db();
    db.raw()
        .execute_batch(
            "INSERT INTO Shift(starts, ends, rate, badge) VALUES ('07:30:00', NULL, 12, x'0A0B');",
        )
        .unwrap();
    let factory = db.factory(1);
    let session = factory.open_session()?;

    let shift = session.find::<Shift>(1)?.unwrap();
    let shift = shift.borrow();
    assert_eq!(shift.starts, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
    assert_eq!(shift.ends, None);
    assert!((shift.rate - 12.0).abs() < f32::EPSILON);
    assert_eq!(shift.badge, vec![0x0A, 0x0B]);
    Ok(())
}

#[test]
fn written_times_read_back_equal() -> Result<(), PersistenceError> {
    let db = shift_db();
    let factory = db.factory(1);
    let ends = NaiveTime::from_hms_milli_opt(16, 45, 10, 250);
    {
        let session = factory.open_session()?;
        let tx = session.transaction();
        let shift = Shift {
            starts: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            ends,
            rate: 17.5,
            badge: vec![1, 2, 3],
            ..Shift::default()
        }
        .into_ref();
        tx.begin()?;
        session.persist(&shift)?;
        tx.commit()?;
        session.close()?;
    }

    let session = factory.open_session()?;
    let shift = session.find::<Shift>(1)?.unwrap();
    assert_eq!(shift.borrow().ends, ends);
    assert!((shift.borrow().rate - 17.5).abs() < f32::EPSILON);
    Ok(())
}

#[test]
fn mismatched_column_fails_the_find_and_keeps_the_session_usable() -> Result<(), PersistenceError> {
    let db = shift_db();
    db.raw()
        .execute_batch(
            "INSERT INTO Shift(starts, ends, rate, badge) VALUES ('noon', NULL, 1, x'00');
             INSERT INTO Shift(starts, ends, rate, badge) VALUES ('12:00:00', NULL, 1, 'text');",
        )
        .unwrap();
    let factory = db.factory(1);
    let session = factory.open_session()?;

    let err = session.find::<Shift>(1).unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::TypeConversion { ref from, ref to } if from == "TEXT" && to == "NaiveTime"
    ));
    let err = session.find::<Shift>(2).unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::TypeConversion { ref to, .. } if to == "Vec<u8>"
    ));

    db.raw()
        .execute_batch("UPDATE Shift SET starts = '12:00:00' WHERE id = 1;")
        .unwrap();
    assert!(session.find::<Shift>(1)?.is_some());
    Ok(())
}
