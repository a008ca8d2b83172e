#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use sql_persistence::prelude::*;
use sql_persistence::results::ResultSet;
use tempfile::TempDir;

pub const SCHEMA: &str = "
    CREATE TABLE Product (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        productName TEXT NOT NULL UNIQUE,
        producer TEXT,
        price REAL NOT NULL
    );
    CREATE TABLE Car (id INTEGER PRIMARY KEY AUTOINCREMENT, model TEXT NOT NULL);
    CREATE TABLE Wheel (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        position TEXT NOT NULL,
        car_id INTEGER
    );
    CREATE TABLE auction_item (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL);
    CREATE TABLE Bid (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        amount REAL NOT NULL,
        placed_at TEXT,
        item_id INTEGER
    );
    CREATE TABLE Person (id INTEGER PRIMARY KEY, name TEXT NOT NULL, passport_id INTEGER);
    CREATE TABLE Passport (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        number TEXT NOT NULL,
        issued TEXT NOT NULL
    );
";

#[derive(Debug, Default)]
pub struct Product {
    pub id: Option<i64>,
    pub product_name: String,
    pub producer: Option<String>,
    pub price: f64,
}

impl Product {
    pub fn new(name: &str, producer: Option<&str>, price: f64) -> EntityRef<Self> {
        Product {
            id: None,
            product_name: name.to_string(),
            producer: producer.map(str::to_string),
            price,
        }
        .into_ref()
    }
}

impl Entity for Product {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new()
            .generated_id("id", |p: &Product| p.id, |p, v| p.id = v)
            .column("product_name", |p| p.product_name.clone(), |p, v| p.product_name = v)
            .named("productName")
            .column("producer", |p| p.producer.clone(), |p, v| p.producer = v)
            .column("price", |p| p.price, |p, v| p.price = v)
    }
}

#[derive(Debug, Default)]
pub struct Car {
    pub id: Option<i64>,
    pub model: String,
    pub wheels: EntityCollection<Wheel>,
}

impl Entity for Car {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new()
            .generated_id("id", |c: &Car| c.id, |c, v| c.id = v)
            .column("model", |c| c.model.clone(), |c, v| c.model = v)
            .one_to_many("wheels", "car", FetchType::Lazy, |c, wheels| c.wheels = wheels)
    }
}

#[derive(Debug, Default)]
pub struct Wheel {
    pub id: Option<i64>,
    pub position: String,
    pub car: Option<EntityRef<Car>>,
}

impl Entity for Wheel {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new()
            .generated_id("id", |w: &Wheel| w.id, |w, v| w.id = v)
            .column("position", |w| w.position.clone(), |w, v| w.position = v)
            .many_to_one("car", |w| w.car.clone(), |w, car| w.car = car)
    }
}

#[derive(Debug, Default)]
pub struct Item {
    pub id: Option<i64>,
    pub title: String,
    pub bids: EntityCollection<Bid>,
}

impl Entity for Item {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new()
            .table("auction_item")
            .generated_id("id", |i: &Item| i.id, |i, v| i.id = v)
            .column("title", |i| i.title.clone(), |i, v| i.title = v)
            .one_to_many("bids", "item", FetchType::Eager, |i, bids| i.bids = bids)
    }
}

#[derive(Default)]
pub struct Bid {
    pub id: Option<i64>,
    pub amount: f64,
    pub placed_at: Option<NaiveDateTime>,
    pub item: Option<EntityRef<Item>>,
}

impl Entity for Bid {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new()
            .generated_id("id", |b: &Bid| b.id, |b, v| b.id = v)
            .column("amount", |b| b.amount, |b, v| b.amount = v)
            .column("placed_at", |b| b.placed_at, |b, v| b.placed_at = v)
            .many_to_one("item", |b| b.item.clone(), |b, item| b.item = item)
    }
}

#[derive(Default)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub passport: Option<EntityRef<Passport>>,
}

impl Entity for Person {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new()
            .id("id", |p: &Person| p.id, |p, v| p.id = v)
            .column("name", |p| p.name.clone(), |p, v| p.name = v)
            .one_to_one("passport", |p| p.passport.clone(), |p, passport| p.passport = passport)
    }
}

#[derive(Debug, Default)]
pub struct Passport {
    pub id: Option<i64>,
    pub number: String,
    pub issued: NaiveDate,
}

impl Entity for Passport {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::new()
            .generated_id("id", |p: &Passport| p.id, |p, v| p.id = v)
            .column("number", |p| p.number.clone(), |p, v| p.number = v)
            .column("issued", |p| p.issued, |p, v| p.issued = v)
    }
}

/// Temporary database file with the fixture schema.
pub struct TestDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("persistence.db");
        let conn = rusqlite::Connection::open(&path).expect("open database");
        conn.execute_batch(SCHEMA).expect("create schema");
        Self { _dir: dir, path }
    }

    pub fn config(&self, pool_size: usize) -> DatabaseConfig {
        DatabaseConfig::builder(self.path.to_string_lossy())
            .pool_size(pool_size)
            .show_sql(true)
            .finish()
    }

    pub fn factory(&self, pool_size: usize) -> SessionFactory {
        SessionFactory::new(self.config(pool_size)).expect("open session factory")
    }

    pub fn recording_factory(&self, pool_size: usize) -> (SessionFactory, StatementLog) {
        let log = StatementLog::default();
        let connector = RecordingConnector { log: log.clone() };
        let factory = SessionFactory::with_connector(self.config(pool_size), &connector)
            .expect("open session factory");
        (factory, log)
    }

    /// Side connection for arranging and checking rows behind a session's back.
    pub fn raw(&self) -> rusqlite::Connection {
        raw_connection(&self.path)
    }

    pub fn count(&self, table: &str) -> i64 {
        self.raw()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }
}

pub fn raw_connection(path: &Path) -> rusqlite::Connection {
    let conn = rusqlite::Connection::open(path).expect("open database");
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .expect("set busy timeout");
    conn
}

/// Every statement issued through a [`RecordingConnector`], in order.
///
/// Also carries a switch that makes the recorded connections refuse to roll back.
#[derive(Clone, Default)]
pub struct StatementLog {
    statements: Arc<Mutex<Vec<String>>>,
    refuse_rollback: Arc<AtomicBool>,
}

impl StatementLog {
    fn push(&self, sql: &str) {
        self.statements.lock().expect("log lock").push(sql.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().expect("log lock").clone()
    }

    pub fn starting_with(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with(prefix))
            .collect()
    }

    pub fn clear(&self) {
        self.statements.lock().expect("log lock").clear();
    }

    pub fn refuse_rollback(&self, refuse: bool) {
        self.refuse_rollback.store(refuse, Ordering::SeqCst);
    }
}

pub struct RecordingConnector {
    pub log: StatementLog,
}

impl Connector for RecordingConnector {
    fn connect(
        &self,
        config: &dyn ConfigProvider,
    ) -> Result<Box<dyn DbConnection>, PersistenceError> {
        Ok(Box::new(RecordingConnection {
            inner: SqliteConnector.connect(config)?,
            log: self.log.clone(),
        }))
    }
}

pub struct RecordingConnection {
    inner: Box<dyn DbConnection>,
    log: StatementLog,
}

impl DbConnection for RecordingConnection {
    fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PersistenceError> {
        self.log.push(sql);
        self.inner.query(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<usize, PersistenceError> {
        self.log.push(sql);
        self.inner.execute(sql, params)
    }

    fn execute_returning_key(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<(usize, Option<RowValues>), PersistenceError> {
        self.log.push(sql);
        self.inner.execute_returning_key(sql, params)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), PersistenceError> {
        self.inner.set_auto_commit(auto_commit)
    }

    fn auto_commit(&self) -> bool {
        self.inner.auto_commit()
    }

    fn commit(&mut self) -> Result<(), PersistenceError> {
        self.log.push("COMMIT");
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), PersistenceError> {
        self.log.push("ROLLBACK");
        if self.log.refuse_rollback.load(Ordering::SeqCst) {
            return Err(PersistenceError::ConnectionError("rollback refused".into()));
        }
        self.inner.rollback()
    }

    fn close(self: Box<Self>) -> Result<(), PersistenceError> {
        self.inner.close()
    }
}
