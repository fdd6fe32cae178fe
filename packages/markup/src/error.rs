use thiserror::Error;

/// Errors produced when a string must parse as a well-formed fragment.
///
/// Whole-document parsing is tolerant and never fails; fragment parsing is
/// strict because a fragment is about to be rewritten and re-serialized, and
/// rewriting something that did not parse as exactly one element would
/// corrupt the surrounding document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("fragment contains no element")]
    NoElement,

    #[error("fragment has {count} root nodes, expected exactly one element")]
    MultipleRoots { count: usize },

    #[error("fragment root is {found} at byte {pos}, expected an element")]
    NotAnElement { found: &'static str, pos: usize },
}

impl ParseError {
    pub fn multiple_roots(count: usize) -> Self {
        ParseError::MultipleRoots { count }
    }

    pub fn not_an_element(found: &'static str, pos: usize) -> Self {
        ParseError::NotAnElement { found, pos }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
