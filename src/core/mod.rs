pub mod errors;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use errors::WordToAnkiError;
pub use models::{
    NoteId,
    RawEntry,
    ResolvedWord,
    SenseEntry,
};
