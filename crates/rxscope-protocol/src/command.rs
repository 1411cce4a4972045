//! Commands from the controller to the runtime bridge.
//!
//! Commands ride on code evaluation: each one is encoded as a call
//! expression on the runtime bridge's global name,
//! `"rxScopeRuntimeBridge.<method>(<JSON argument>);"`, and submitted
//! through `Runtime.evaluate`. The observed process decodes the same
//! expression back into a [`RuntimeCommand`].

use rxscope_core::OperatorIdentifier;
use serde::Serialize;

use crate::ProtocolError;

/// Name under which the runtime bridge is reachable for evaluation.
pub const RUNTIME_BRIDGE_GLOBAL: &str = "rxScopeRuntimeBridge";

/// Binding the observed process calls once it is ready.
pub const READY_BINDING: &str = "rxScopeRuntimeReady";

/// Binding the observed process calls for every forwarded telemetry event.
pub const TELEMETRY_BINDING: &str = "rxScopeSendTelemetry";

/// Runtime bridge method names.
pub mod bridge_method {
    pub const ENABLE: &str = "enableOperatorLogPoint";
    pub const DISABLE: &str = "disableOperatorLogPoint";
    pub const UPDATE: &str = "updateOperatorLogPoints";
}

/// A command for the runtime bridge's enabled set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    /// Add one identifier to the enabled set.
    Enable(OperatorIdentifier),
    /// Remove one identifier from the enabled set.
    Disable(OperatorIdentifier),
    /// Replace the enabled set wholesale.
    Update(Vec<OperatorIdentifier>),
}

impl RuntimeCommand {
    /// Runtime bridge method this command calls.
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Enable(_) => bridge_method::ENABLE,
            Self::Disable(_) => bridge_method::DISABLE,
            Self::Update(_) => bridge_method::UPDATE,
        }
    }

    /// Encodes as an evaluation expression.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Json` if the argument cannot be serialized.
    pub fn to_expression(&self) -> Result<String, ProtocolError> {
        let argument = match self {
            Self::Enable(id) | Self::Disable(id) => to_json(id)?,
            Self::Update(ids) => to_json(ids)?,
        };
        Ok(format!(
            "{RUNTIME_BRIDGE_GLOBAL}.{}({argument});",
            self.method_name()
        ))
    }

    /// Decodes an evaluation expression.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidExpression` if the text is not a call
    /// on the runtime bridge, names an unknown method, or carries an
    /// argument of the wrong shape.
    pub fn parse_expression(expression: &str) -> Result<Self, ProtocolError> {
        let invalid = |reason: &str| ProtocolError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let call = expression.trim();
        let call = call.strip_suffix(';').unwrap_or(call).trim_end();
        let call = call
            .strip_prefix(RUNTIME_BRIDGE_GLOBAL)
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| invalid("not a runtime bridge call"))?;

        let (method, rest) = call
            .split_once('(')
            .ok_or_else(|| invalid("missing argument list"))?;
        let argument = rest
            .strip_suffix(')')
            .ok_or_else(|| invalid("unterminated argument list"))?;

        let bad_argument = |e: serde_json::Error| invalid(&format!("bad argument: {e}"));
        match method.trim() {
            bridge_method::ENABLE => Ok(Self::Enable(
                serde_json::from_str(argument).map_err(bad_argument)?,
            )),
            bridge_method::DISABLE => Ok(Self::Disable(
                serde_json::from_str(argument).map_err(bad_argument)?,
            )),
            bridge_method::UPDATE => Ok(Self::Update(
                serde_json::from_str(argument).map_err(bad_argument)?,
            )),
            _ => Err(invalid("unknown runtime bridge method")),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> OperatorIdentifier {
        OperatorIdentifier::new("src/main.rs", 4, 10, index)
    }

    #[test]
    fn test_enable_expression_format() {
        let expression = RuntimeCommand::Enable(id(1)).to_expression().unwrap();
        assert_eq!(
            expression,
            r#"rxScopeRuntimeBridge.enableOperatorLogPoint({"fileName":"src/main.rs","line":4,"character":10,"operatorIndex":1});"#
        );
    }

    #[test]
    fn test_expressions_decode_to_same_command() {
        for command in [
            RuntimeCommand::Enable(id(0)),
            RuntimeCommand::Disable(id(2)),
            RuntimeCommand::Update(vec![id(0), id(1)]),
            RuntimeCommand::Update(Vec::new()),
        ] {
            let expression = command.to_expression().unwrap();
            assert_eq!(RuntimeCommand::parse_expression(&expression).unwrap(), command);
        }
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_missing_semicolon() {
        let expression = format!(
            "  {RUNTIME_BRIDGE_GLOBAL}.{}([]) ",
            bridge_method::UPDATE
        );
        assert_eq!(
            RuntimeCommand::parse_expression(&expression).unwrap(),
            RuntimeCommand::Update(Vec::new())
        );
    }

    #[test]
    fn test_parse_rejects_foreign_expressions() {
        assert!(RuntimeCommand::parse_expression("1 + 1").is_err());
        assert!(RuntimeCommand::parse_expression("rxScopeRuntimeBridge.explode({});").is_err());
        assert!(
            RuntimeCommand::parse_expression("rxScopeRuntimeBridge.enableOperatorLogPoint(42);")
                .is_err()
        );
        assert!(
            RuntimeCommand::parse_expression("rxScopeRuntimeBridge.enableOperatorLogPoint({")
                .is_err()
        );
    }
}
