//! Turns words looked up on a Kobo e-reader into Anki flashcards.

pub mod anki;
pub mod core;
pub mod device;
pub mod dictionary;
pub mod persistence;

pub use crate::core::{
    pipeline::{
        Pipeline,
        RunReport,
    },
    WordToAnkiError,
};
