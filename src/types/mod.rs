pub mod error;

pub use error::{
    BackendError, ErrorClassifier, ErrorKind, ForgeError, Result, ResultExt, StoreError,
    StoreResult,
};
