//! # Rowguard
//!
//! Metadata-driven object-relational core for SQL stores.
//!
//! Entity kinds are declared once on a [`Registry`]; their field sets come
//! from the live schema, their relations (has-many, belongs-to, many-through)
//! are validated at registration. On top of that sit:
//!
//! - a condition engine ([`Condition`]) that compiles to SQL and evaluates
//!   against in-memory field maps from the same mini-language,
//! - an entity lifecycle ([`Entity`]) with dirty tracking, vetoable triggers,
//!   cascading deletes and denormalized counters,
//! - lazy collections ([`Collection`]) that load by condition, raw SQL,
//!   relation, cache or in-memory filter, and stream in pages.
//!
//! ```rust,no_run
//! use rowguard::{fields, Condition, HasMany, KindDef, Registry, SqliteAdapter};
//! use std::sync::Arc;
//!
//! # fn main() -> rowguard::Result<()> {
//! let registry = Registry::builder(Arc::new(SqliteAdapter::open("app.db")?))
//!     .declare(KindDef::new("Post").has_many("Comment", HasMany::new("post_id").counter("comments_count")))
//!     .declare(KindDef::new("Comment").belongs_to("Post", "post_id"))
//!     .build();
//!
//! let posts = registry.kind("Post")?;
//! let mut post = posts.create(fields! { "title" => "hello" })?;
//! post.save(true)?;
//!
//! let recent = posts.find("title ~ hel%").count()?;
//! # let _ = recent;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cache;
pub mod collection;
pub mod condition;
pub mod config;
pub mod entity;
pub mod error;
pub mod external;
pub mod inflect;
pub mod metrics;
pub mod migration;
pub mod registry;
pub mod sql;
pub mod value;

pub use adapter::{with_transaction, ColumnInfo, DatabaseAdapter, Params};
#[cfg(feature = "sqlite")]
pub use adapter::SqliteAdapter;
pub use cache::{CacheProvider, MemoryCache};
pub use collection::{Collection, Stream};
pub use condition::{BoolOp, Condition, IntoCondition};
pub use config::OrmConfig;
pub use entity::{Entity, Kind, Outcome, Property, Related};
pub use error::{OrmError, Result};
pub use external::ExternalFields;
pub use registry::{HasMany, KindDef, Registry, RelationType, Trigger, TriggerEvent, TriggerOutcome};
pub use sql::{Dialect, Direction, Limit, OrderBy};
pub use value::{FieldMap, FieldValue};
