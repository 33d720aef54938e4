//! Intent resolution for spoken call-control commands.
//!
//! A finalized transcript is classified in two stages. A fixed set of phrase
//! families (add, forward, end) answers most commands deterministically;
//! anything it cannot settle with high confidence goes to an external
//! chat-completion service that replies with a small JSON object.
//!
//! Spoken targets are resolved to E.164 numbers either from digits in the
//! utterance or through the [`ContactBook`].

pub mod completion;
pub mod contacts;
pub mod error;
mod patterns;
pub mod phone;
pub mod resolver;

pub use completion::{CompletionConfig, CompletionService, HttpCompletionClient};
pub use contacts::{ContactBook, ContactDirectory, ContactMap};
pub use error::{ContactsError, IntentError};
pub use phone::{extract_digits, normalize, Region};
pub use resolver::{IntentResolver, CLASSIFIER_INSTRUCTION};
