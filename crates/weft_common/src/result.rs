//! Common result and error types for the Weft engine.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable internal error (a bug in Weft), not a
/// problem with the pipeline or its inputs. Problems with inputs are reported
/// as diagnostics and the pass still completes.
pub type WeftResult<T> = Result<T, InternalError>;

/// An internal engine error indicating a bug in Weft, not a user input problem.
#[derive(Debug, thiserror::Error)]
#[error("internal engine error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("something broke");
        assert_eq!(format!("{err}"), "internal engine error: something broke");
    }

    #[test]
    fn err_path() {
        let r: WeftResult<i32> = Err(InternalError::new("test error"));
        let err = r.err().unwrap();
        assert_eq!(err.message, "test error");
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}
