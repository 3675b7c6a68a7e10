use ocs_core::error::CoreError;
use serde_json::{json, Value};

/// Failure of a single dispatched call.
///
/// Never escapes the message boundary: the dispatcher turns it into an
/// error marker in the reply's `data`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A domain-level error from `ocs_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Too few arguments, or an argument of the wrong type.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler could not complete the call.
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Convenience type alias for handler return values.
pub type HandlerResult = Result<Vec<Value>, DispatchError>;

impl DispatchError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Core(CoreError::Validation(_)) => "INVALID_ARGUMENTS",
            DispatchError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            DispatchError::Handler(_) => "HANDLER_ERROR",
        }
    }

    /// Reply payload carrying the error marker.
    pub fn to_reply_data(&self) -> Vec<Value> {
        vec![json!({
            "error": self.to_string(),
            "code": self.code(),
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_arguments_marker() {
        let err = DispatchError::InvalidArguments("expected 2 arguments, got 1".into());
        let data = err.to_reply_data();

        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["code"], "INVALID_ARGUMENTS");
        assert_eq!(
            data[0]["error"],
            "Invalid arguments: expected 2 arguments, got 1"
        );
    }

    #[test]
    fn validation_error_maps_to_invalid_arguments() {
        let err = DispatchError::from(CoreError::Validation("data must be an array".into()));
        assert_eq!(err.code(), "INVALID_ARGUMENTS");
        assert_eq!(
            err.to_reply_data()[0]["error"],
            "Validation failed: data must be an array"
        );
    }
}
