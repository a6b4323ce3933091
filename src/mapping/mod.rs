//! Row-to-object mapping.
//!
//! A [`DataMapper`] turns one result [`Row`] into one `T`. It only ever sees the
//! current row, so it cannot advance or rewind the underlying cursor.
//!
//! Two kinds of mappers are provided:
//! - [`ReflectionMapper`], which matches `T`'s serde field names to column names
//! - any closure `Fn(&Row) -> DbResult<T>`, for hand-written mappings
//!
//! ```ignore
//! let by_hand = |row: &Row| -> DbResult<User> {
//!     Ok(User { id: row.try_get("id")?, name: row.try_get("name")? })
//! };
//! let users = caller.get(&by_hand, "SELECT id, name FROM users", &token).await?;
//! ```

mod reflection;

pub use reflection::ReflectionMapper;

use crate::error::DbResult;
use crate::models::Row;

/// Strategy for mapping a single row to a `T`.
///
/// Implementations are called once per row, in row order, and must not hold
/// state that depends on previous rows. Missing or mismatched columns are
/// reported as [`DbError::Mapping`](crate::error::DbError::Mapping).
pub trait DataMapper<T>: Send + Sync {
    fn create_mapped_instance(&self, row: &Row) -> DbResult<T>;
}

impl<T, F> DataMapper<T> for F
where
    F: Fn(&Row) -> DbResult<T> + Send + Sync,
{
    fn create_mapped_instance(&self, row: &Row) -> DbResult<T> {
        self(row)
    }
}
