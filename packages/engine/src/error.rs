use tandem_markup::ParseError;
use thiserror::Error;

/// Why a resolved fragment could not be rewritten. All of these drop the
/// edit; none are retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentError {
    #[error("fragment rejected: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid style property name {property:?}")]
    InvalidStyleProperty { property: String },

    #[error("invalid style value {value:?} for property {property}")]
    InvalidStyleValue { property: String, value: String },

    #[error("<{tag}> cannot contain text")]
    VoidElement { tag: String },
}
