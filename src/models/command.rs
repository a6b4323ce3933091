//! Commands and parameters.
//!
//! A [`Command`] is a parameterized statement plus a mutable, reusable parameter
//! collection. The engine attaches it to one connection (and optionally one
//! transaction) for the duration of a single operation and always detaches it
//! afterwards.

use crate::models::Value;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Raw SQL text
    #[default]
    Text,
    /// Name of a stored procedure, invoked with the bound input parameters
    StoredProcedure,
    /// Name of a table, read in full
    TableDirect,
}

/// Shape of the result a reader is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandBehavior {
    #[default]
    Default,
    /// Stop after the first row
    SingleRow,
    /// Only the first result set is read
    SingleResult,
    /// No rows are read; only column information is produced
    SchemaOnly,
}

/// Direction of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Whether a parameter with this direction is sent to the server.
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }
}

/// Database type hint carried by a parameter.
///
/// `Object` means "infer from the value". A typed hint matters for NULL values,
/// which are bound as a typed null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    #[default]
    Object,
    Boolean,
    Int16,
    Int32,
    Int64,
    Double,
    Decimal,
    String,
    Binary,
    Json,
    DateTime,
}

/// A single named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub direction: ParameterDirection,
    pub db_type: DbType,
}

impl Parameter {
    /// Create an input parameter; the database type is inferred from the value.
    pub fn input(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            direction: ParameterDirection::Input,
            db_type: DbType::Object,
        }
    }

    /// Create an output parameter with no value.
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::Null,
            direction: ParameterDirection::Output,
            db_type: DbType::Object,
        }
    }

    /// Create an unnamed return-value parameter.
    pub fn return_value() -> Self {
        Self {
            name: String::new(),
            value: Value::Null,
            direction: ParameterDirection::ReturnValue,
            db_type: DbType::Object,
        }
    }

    /// Set the database type hint.
    pub fn with_db_type(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }
}

/// An explicit input parameter descriptor.
///
/// When a field of a source object passed to
/// [`create_input_parameters`](crate::db::SqlProvider::create_input_parameters)
/// holds an `InParameterInfo`, its own name, value and type are used instead of
/// the field's.
#[derive(Debug, Clone, PartialEq)]
pub struct InParameterInfo {
    pub name: String,
    pub value: Value,
    pub db_type: DbType,
}

/// Marker key under which an `InParameterInfo` serializes.
pub(crate) const IN_PARAMETER_MARKER: &str = "$in_parameter";

impl InParameterInfo {
    pub fn new(name: impl Into<String>, value: impl Into<Value>, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            db_type,
        }
    }
}

impl Serialize for InParameterInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            value: &'a Value,
            db_type: DbType,
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(
            IN_PARAMETER_MARKER,
            &Body {
                name: &self.name,
                value: &self.value,
                db_type: self.db_type,
            },
        )?;
        map.end()
    }
}

/// Connection (and transaction) a command is currently attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBinding {
    pub connection_id: Uuid,
    pub transaction_id: Option<Uuid>,
}

/// A parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    text: String,
    command_type: CommandType,
    parameters: Vec<Parameter>,
    timeout: Option<Duration>,
    binding: Option<CommandBinding>,
}

impl Command {
    /// Create a text command with no parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_type(text, CommandType::Text)
    }

    pub fn with_type(text: impl Into<String>, command_type: CommandType) -> Self {
        Self {
            text: text.into(),
            command_type,
            parameters: Vec::new(),
            timeout: None,
            binding: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn set_command_type(&mut self, command_type: CommandType) {
        self.command_type = command_type;
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Parameters that are sent to the server, in binding order.
    pub fn bound_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.direction.is_bound())
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    pub fn add_parameters(&mut self, parameters: impl IntoIterator<Item = Parameter>) -> &mut Self {
        self.parameters.extend(parameters);
        self
    }

    /// Shorthand for adding an input parameter.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.add_parameter(Parameter::input(name, value))
    }

    /// Look up a parameter by name (case-insensitive).
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Current attachment, if the command is in use by an operation.
    pub fn binding(&self) -> Option<CommandBinding> {
        self.binding
    }

    pub fn is_attached(&self) -> bool {
        self.binding.is_some()
    }

    pub(crate) fn attach(&mut self, connection_id: Uuid, transaction_id: Option<Uuid>) {
        self.binding = Some(CommandBinding {
            connection_id,
            transaction_id,
        });
    }

    pub(crate) fn detach(&mut self) {
        self.binding = None;
    }
}
