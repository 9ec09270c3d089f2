use thiserror::Error;

/// Errors returned by DNN operations.
#[derive(Debug, Error)]
pub enum DnnError {
    #[error("dnn: load library {path:?}: {reason}")]
    Library { path: String, reason: String },

    #[error("dnn: {0}")]
    Native(String),

    #[error("dnn: network {model:?} loaded with no layers{}", reason_suffix(.reason))]
    EmptyNet {
        model: String,
        reason: Option<String>,
    },

    #[error("dnn: handle already closed")]
    Closed,

    #[error("dnn: {axis} index {index} out of range (len {len})")]
    IndexOutOfRange {
        axis: &'static str,
        index: usize,
        len: usize,
    },

    #[error("dnn: invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dnn: model {0:?} not registered")]
    ModelNotRegistered(String),

    #[error("dnn: empty data")]
    EmptyData,

    #[error("dnn: config: {0}")]
    Config(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {r}"),
        None => String::new(),
    }
}
