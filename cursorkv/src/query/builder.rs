//! Immutable request builders.
//!
//! Every builder call consumes the builder and returns a new one, so a
//! partially built request can be cloned and extended in different ways
//! without the branches seeing each other's filters:
//!
//! ```ignore
//! let adults = db.query("people").gte("age", 18);
//! let young = adults.clone().lt("age", 30).all().await?;
//! let everyone = adults.desc("age").limit(10).all().await?;
//! ```
//!
//! Terminal calls (`all`, `one`, `keys`, `count`, `exec`) consume the
//! builder and run it once.

use crate::database::Database;
use crate::error::Result;
use crate::query::predicate::{Op, Predicate};
use crate::query::scan::Selection;
use crate::storage::{Direction, Substrate};
use crate::types::{Key, Record, Value};

macro_rules! selection_methods {
    () => {
        /// Add a predicate.
        pub fn filter(mut self, field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
            self.selection.predicates.push(Predicate::new(field, op, value));
            self
        }

        pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
            self.filter(field, Op::Eq, value)
        }

        pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
            self.filter(field, Op::Gt, value)
        }

        pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
            self.filter(field, Op::Gte, value)
        }

        pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
            self.filter(field, Op::Lt, value)
        }

        pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
            self.filter(field, Op::Lte, value)
        }

        /// Order ascending by `field`.
        pub fn asc(mut self, field: impl Into<String>) -> Self {
            self.selection.order_by = Some(field.into());
            self.selection.direction = Direction::Ascending;
            self
        }

        /// Order descending by `field`.
        pub fn desc(mut self, field: impl Into<String>) -> Self {
            self.selection.order_by = Some(field.into());
            self.selection.direction = Direction::Descending;
            self
        }

        /// Skip the first `n` matches.
        pub const fn offset(mut self, n: usize) -> Self {
            self.selection.offset = n;
            self
        }

        /// Return at most `n` matches.
        pub const fn limit(mut self, n: usize) -> Self {
            self.selection.limit = Some(n);
            self
        }

        /// Replace the filter, order and pagination wholesale.
        pub fn with_selection(mut self, selection: Selection) -> Self {
            self.selection = selection;
            self
        }

        /// The filter, order and pagination built so far.
        #[must_use]
        pub const fn selection(&self) -> &Selection {
            &self.selection
        }

        #[must_use]
        pub fn store(&self) -> &str {
            &self.store
        }
    };
}

/// A read request.
#[must_use = "a query does nothing until a terminal method runs it"]
pub struct Query<'db, S: Substrate> {
    db: &'db Database<S>,
    store: String,
    selection: Selection,
}

impl<S: Substrate> Clone for Query<'_, S> {
    #[allow(clippy::disallowed_methods)] // Clone is the point of an immutable builder
    fn clone(&self) -> Self {
        Self {
            db: self.db,
            store: self.store.clone(),
            selection: self.selection.clone(),
        }
    }
}

impl<'db, S: Substrate> Query<'db, S> {
    pub(crate) fn new(db: &'db Database<S>, store: impl Into<String>) -> Self {
        Self {
            db,
            store: store.into(),
            selection: Selection::default(),
        }
    }

    selection_methods!();

    /// Matching records.
    pub async fn all(self) -> Result<Vec<Record>> {
        self.db.select_records(&self.store, &self.selection).await
    }

    /// The first matching record.
    pub async fn one(self) -> Result<Option<Record>> {
        let records = self.limit(1).all().await?;
        Ok(records.into_iter().next())
    }

    /// Matching primary keys. Skips hydration.
    pub async fn keys(self) -> Result<Vec<Key>> {
        self.db.select_keys(&self.store, &self.selection).await
    }

    /// Number of matches. Skips hydration.
    pub async fn count(self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }
}

/// A patch applied to every matching record.
#[must_use = "an update does nothing until `exec` runs it"]
pub struct Update<'db, S: Substrate> {
    db: &'db Database<S>,
    store: String,
    patch: Record,
    selection: Selection,
}

impl<S: Substrate> Clone for Update<'_, S> {
    #[allow(clippy::disallowed_methods)] // Clone is the point of an immutable builder
    fn clone(&self) -> Self {
        Self {
            db: self.db,
            store: self.store.clone(),
            patch: self.patch.clone(),
            selection: self.selection.clone(),
        }
    }
}

impl<'db, S: Substrate> Update<'db, S> {
    pub(crate) fn new(db: &'db Database<S>, store: impl Into<String>, patch: Record) -> Self {
        Self {
            db,
            store: store.into(),
            patch,
            selection: Selection::default(),
        }
    }

    selection_methods!();

    #[must_use]
    pub const fn patch(&self) -> &Record {
        &self.patch
    }

    /// Apply the patch. Returns the number of records written.
    pub async fn exec(self) -> Result<usize> {
        self.db
            .apply_update(&self.store, &self.patch, &self.selection)
            .await
    }
}

/// Deletes every matching record.
#[must_use = "a remove does nothing until `exec` runs it"]
pub struct Remove<'db, S: Substrate> {
    db: &'db Database<S>,
    store: String,
    selection: Selection,
}

impl<S: Substrate> Clone for Remove<'_, S> {
    #[allow(clippy::disallowed_methods)] // Clone is the point of an immutable builder
    fn clone(&self) -> Self {
        Self {
            db: self.db,
            store: self.store.clone(),
            selection: self.selection.clone(),
        }
    }
}

impl<'db, S: Substrate> Remove<'db, S> {
    pub(crate) fn new(db: &'db Database<S>, store: impl Into<String>) -> Self {
        Self {
            db,
            store: store.into(),
            selection: Selection::default(),
        }
    }

    selection_methods!();

    /// Delete the matches. Returns their primary keys.
    pub async fn exec(self) -> Result<Vec<Key>> {
        self.db.apply_remove(&self.store, &self.selection).await
    }
}
