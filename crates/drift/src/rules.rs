//! The universal generic-assistant phrase table.
//!
//! These phrases mark a collapse into the default assistant register no
//! matter which persona is speaking. The table is data; extending it is
//! an edit here, not a code change anywhere else.

/// Phrases every persona is scored against, lowercase.
pub const GENERIC_ASSISTANT_PHRASES: &[&str] = &[
    "as an ai",
    "as a language model",
    "i'm here to help",
    "i am here to help",
    "i'd be happy to",
    "i would be happy to",
    "happy to assist",
    "is there anything else",
    "feel free to ask",
    "i don't have personal",
    "i cannot provide",
    "great question",
    "let me know if",
    "i hope this helps",
];
