use thiserror::Error;

pub mod extern_proto;
pub mod proto_list;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Line {line} is violating the expected format, because: {reason}")]
    FormatError { line: usize, reason: String },

    /// The catalog file has no `proto-list` root or is not XML at all.
    #[error("Malformed catalog: {0}")]
    CatalogError(#[from] quick_xml::de::DeError),

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}
