//! The provider contract.
//!
//! The execution engine only ever talks to a database through these two traits:
//! [`SqlProvider`] is the stateless factory for connections, commands, parameters
//! and readers; [`DbConnection`] is one logical session. A concrete driver binding
//! implements both (see [`SqlxProvider`](crate::db::SqlxProvider)).

use crate::error::{DbError, DbResult};
use crate::models::command::IN_PARAMETER_MARKER;
use crate::models::{
    Command, CommandBehavior, CommandType, ConnectionState, DbType, InParameterInfo,
    IsolationLevel, Parameter, ParameterDirection, Row, SchemaTable, Value,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use uuid::Uuid;

/// Stream of decoded rows borrowed from a connection.
pub type RowStream<'c> = BoxStream<'c, DbResult<Row>>;

/// A single logical database session.
#[async_trait]
pub trait DbConnection: Send {
    /// Identifier used for tracing and for command bindings.
    fn id(&self) -> Uuid;

    fn state(&self) -> ConnectionState;

    /// Open the session. Fails if the connection is already open.
    async fn open(&mut self) -> DbResult<()>;

    /// Close the session. Closing a closed connection is a no-op.
    async fn close(&mut self) -> DbResult<()>;

    /// Begin a transaction at the given isolation level.
    async fn begin_transaction(&mut self, isolation: IsolationLevel) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Execute a command that returns no rows; yields the number of affected rows.
    async fn execute(&mut self, command: &Command) -> DbResult<u64>;

    /// Execute a command and stream its rows.
    fn fetch<'c>(&'c mut self, command: &'c Command) -> RowStream<'c>;

    /// Describe the result columns of a command without executing it.
    async fn describe(&mut self, command: &Command) -> DbResult<SchemaTable>;
}

/// Factory for connections, commands, parameters and readers.
///
/// Every factory call returns a fresh object and never mutates prior state.
#[async_trait]
pub trait SqlProvider: Send + Sync {
    type Connection: DbConnection;

    fn connection_string(&self) -> &str;

    /// Name of the driver family behind this provider.
    fn provider_type(&self) -> &str;

    /// Timeout applied to commands that do not set their own; `None` disables it.
    fn default_command_timeout(&self) -> Option<Duration> {
        None
    }

    /// Create an unopened connection.
    fn create_connection(&self) -> Self::Connection;

    /// Create a connection and open it before returning.
    async fn create_opened_connection(&self) -> DbResult<Self::Connection> {
        let mut connection = self.create_connection();
        connection.open().await?;
        Ok(connection)
    }

    fn create_command(
        &self,
        text: &str,
        command_type: CommandType,
        input_params: Vec<Parameter>,
        output_params: Vec<Parameter>,
    ) -> Command {
        let mut command = Command::with_type(text, command_type);
        command.add_parameters(input_params);
        command.add_parameters(output_params);
        command
    }

    /// Execute a command on an open connection and stream its rows, shaped by `behavior`.
    fn create_reader<'c>(
        &self,
        connection: &'c mut Self::Connection,
        command: &'c Command,
        behavior: CommandBehavior,
    ) -> RowStream<'c> {
        match behavior {
            CommandBehavior::SchemaOnly => futures_util::stream::empty().boxed(),
            CommandBehavior::SingleRow => connection.fetch(command).take(1).boxed(),
            CommandBehavior::Default | CommandBehavior::SingleResult => connection.fetch(command),
        }
    }

    fn create_input_parameter(&self, name: &str, value: Value, db_type: DbType) -> Parameter {
        Parameter::input(name, value).with_db_type(db_type)
    }

    fn create_input_parameter_from(&self, info: &InParameterInfo) -> Parameter {
        self.create_input_parameter(&info.name, info.value.clone(), info.db_type)
    }

    fn create_output_parameter(&self, name: &str) -> Parameter {
        Parameter::output(name)
    }

    fn create_return_parameter(&self) -> Parameter {
        Parameter::return_value()
    }

    /// Turn each field of `source` into a named input parameter, in declaration order.
    ///
    /// Field names are prefixed with `prefix`. A field holding an [`InParameterInfo`]
    /// contributes its own name (also prefixed), value and type. `None` fields become
    /// `Value::Null`.
    fn create_input_parameters<S>(&self, source: &S, prefix: &str) -> DbResult<Vec<Parameter>>
    where
        S: Serialize + ?Sized,
        Self: Sized,
    {
        let json = serde_json::to_value(source).map_err(|e| {
            DbError::invalid_input(format!("Failed to read parameter source: {}", e))
        })?;
        let fields = match json {
            JsonValue::Object(fields) => fields,
            JsonValue::Null => return Ok(Vec::new()),
            other => {
                return Err(DbError::invalid_input(format!(
                    "Parameter source must serialize to an object, got {}",
                    json_kind(&other)
                )));
            }
        };

        let mut parameters = Vec::with_capacity(fields.len());
        for (field, value) in fields {
            let parameter = match explicit_parameter(&value) {
                Some(info) => {
                    let info = info?;
                    Parameter {
                        name: format!("{}{}", prefix, info.name),
                        value: info.value,
                        direction: ParameterDirection::Input,
                        db_type: info.db_type,
                    }
                }
                None => Parameter::input(format!("{}{}", prefix, field), Value::from_json(value)),
            };
            parameters.push(parameter);
        }
        Ok(parameters)
    }

    fn create_output_parameters(&self, names: &[&str]) -> Vec<Parameter> {
        names
            .iter()
            .map(|name| self.create_output_parameter(name))
            .collect()
    }
}

/// Recognize a serialized [`InParameterInfo`].
fn explicit_parameter(value: &JsonValue) -> Option<DbResult<InParameterInfo>> {
    let body = match value {
        JsonValue::Object(map) if map.len() == 1 => map.get(IN_PARAMETER_MARKER)?,
        _ => return None,
    };

    #[derive(serde::Deserialize)]
    struct Body {
        name: String,
        value: Value,
        db_type: DbType,
    }

    Some(
        serde_json::from_value::<Body>(body.clone())
            .map(|b| InParameterInfo {
                name: b.name,
                value: restore_binary(b.value, b.db_type),
                db_type: b.db_type,
            })
            .map_err(|e| DbError::invalid_input(format!("Malformed parameter descriptor: {}", e))),
    )
}

/// Binary values travel as base64 text through the JSON form.
fn restore_binary(value: Value, db_type: DbType) -> Value {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match (value, db_type) {
        (Value::Text(s), DbType::Binary) => match STANDARD.decode(&s) {
            Ok(bytes) => Value::Bytes(bytes),
            Err(_) => Value::Text(s),
        },
        (value, _) => value,
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
