//! Name-based mapping driven by serde.
//!
//! [`ReflectionMapper`] reads the field names `T` declares to serde (after any
//! `#[serde(rename)]`), matches each to a column case-insensitively and then
//! deserializes `T` from the matched values. Fields with no matching column are
//! left out, so `Option` and `#[serde(default)]` fields keep their default while
//! required fields fail with a mapping error.

use crate::error::{DbError, DbResult};
use crate::mapping::DataMapper;
use crate::models::Row;
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::marker::PhantomData;

/// Default mapper: column names to serde field names.
pub struct ReflectionMapper<T> {
    /// `None` when `T` is not a struct (maps, scalars, tuples).
    fields: Option<&'static [&'static str]>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> ReflectionMapper<T> {
    pub fn new() -> Self {
        Self {
            fields: struct_fields::<T>(),
            _marker: PhantomData,
        }
    }

    /// Field names read from `T`, if it is a struct.
    pub fn fields(&self) -> Option<&'static [&'static str]> {
        self.fields
    }
}

impl<T: DeserializeOwned> Default for ReflectionMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ReflectionMapper<T> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ReflectionMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectionMapper")
            .field("type", &std::any::type_name::<T>())
            .field("fields", &self.fields)
            .finish()
    }
}

impl<T: DeserializeOwned> DataMapper<T> for ReflectionMapper<T> {
    fn create_mapped_instance(&self, row: &Row) -> DbResult<T> {
        let object = match self.fields {
            Some(fields) => {
                let mut object = Map::with_capacity(fields.len());
                for &field in fields {
                    if let Some(value) = row.get(field) {
                        object.insert(field.to_string(), value.to_json());
                    }
                }
                object
            }
            None => row.to_json_map(),
        };

        match serde_json::from_value::<T>(JsonValue::Object(object)) {
            Ok(mapped) => Ok(mapped),
            // A single-column row maps straight onto a scalar target
            Err(_) if self.fields.is_none() && row.len() == 1 => {
                let value = row.values()[0].to_json();
                serde_json::from_value(value).map_err(mapping_error::<T>)
            }
            Err(e) => Err(mapping_error::<T>(e)),
        }
    }
}

fn mapping_error<T>(error: serde_json::Error) -> DbError {
    let message = error.to_string();
    let column = missing_field(&message);
    DbError::mapping(
        format!(
            "Cannot map row to {}: {}",
            std::any::type_name::<T>(),
            message
        ),
        column,
    )
}

/// Field name from serde's "missing field `name`" message.
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

// =============================================================================
// Field introspection
// =============================================================================

/// Field names of `T` as seen by serde, or `None` when `T` is not a struct.
pub(crate) fn struct_fields<T: DeserializeOwned>() -> Option<&'static [&'static str]> {
    let mut fields = None;
    // Always errors: the introspector refuses to produce a value
    let _ = T::deserialize(FieldIntrospector {
        fields: &mut fields,
    });
    fields
}

/// Deserializer that records the field list handed to `deserialize_struct`.
struct FieldIntrospector<'a> {
    fields: &'a mut Option<&'static [&'static str]>,
}

impl<'de> Deserializer<'de> for FieldIntrospector<'_> {
    type Error = de::value::Error;

    fn deserialize_any<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(de::Error::custom("not a struct"))
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        *self.fields = Some(fields);
        Err(de::Error::custom("fields captured"))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}
