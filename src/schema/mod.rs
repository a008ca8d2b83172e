//! Entity metadata: the [`Entity`] trait, the builder that declares a mapping, and the
//! resolved per-type [`EntityDescriptor`].
//!
//! ```rust
//! use sql_persistence::prelude::*;
//!
//! #[derive(Default)]
//! struct Product {
//!     id: Option<i64>,
//!     product_name: String,
//!     price: f64,
//! }
//!
//! impl Entity for Product {
//!     fn mapping() -> EntityMapping<Self> {
//!         EntityMapping::new()
//!             .generated_id("id", |p: &Product| p.id, |p, v| p.id = v)
//!             .column("product_name", |p| p.product_name.clone(), |p, v| p.product_name = v)
//!             .named("productName")
//!             .column("price", |p| p.price, |p, v| p.price = v)
//!     }
//! }
//!
//! let descriptor = descriptor::<Product>().unwrap();
//! assert_eq!(descriptor.table(), "Product");
//! assert_eq!(descriptor.id_column().column(), "id");
//! assert_eq!(descriptor.columns()[1].column(), "productName");
//! ```

mod descriptor;
mod mapping;
mod registry;

use std::cell::RefCell;
use std::rc::Rc;

pub use descriptor::{ColumnDescriptor, EntityDescriptor, RelationDescriptor};
pub use mapping::EntityMapping;
pub use registry::descriptor;

/// Canonical in-memory instance of an entity. One per `(type, id)` within a session.
pub type EntityRef<T> = Rc<RefCell<T>>;

/// A type that maps to a table.
///
/// `Default` provides the blank instance that row mapping fills in.
pub trait Entity: Default + Sized + 'static {
    /// Declare the table, columns and relations of this type.
    fn mapping() -> EntityMapping<Self>;

    /// Wrap a value as an [`EntityRef`].
    fn into_ref(self) -> EntityRef<Self> {
        Rc::new(RefCell::new(self))
    }
}

/// Simple (unqualified, non-generic) name of a type.
pub(crate) fn simple_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
