use crate::ParserError;
use log::{trace, warn};
use std::io::BufRead;

const EXTERNPROTO: &str = "EXTERNPROTO";
const IMPORTABLE: &str = "IMPORTABLE";
const PROTO_SUFFIX: &str = ".proto";

/// A single `EXTERNPROTO "<url>"` line of a scene or prototype file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternProtoDeclaration {
    pub name: String,
    pub url: String,
    /// `IMPORTABLE EXTERNPROTO`: declared for later insertion, not used by the file itself.
    pub importable: bool,
}

/// The part of a scene/prototype file that precedes its body: the `#VRML_SIM` header line, comments and all
/// the declared references in file order.
#[derive(Debug, Default)]
pub struct ExternProtoHeader {
    pub version: Option<String>,
    pub declarations: Vec<ExternProtoDeclaration>,
    pub comments: Vec<String>,
}

impl ExternProtoHeader {
    /// Reads only as far as needed: parsing stops at the first line that belongs to the body (`PROTO ...` or any
    /// node), so large meshes further down the file are never touched.
    pub fn parse_file<R: BufRead>(reader: R) -> Result<Self, ParserError> {
        let mut version = None;
        let mut declarations = Vec::new();
        let mut comments = Vec::new();

        for (index, line_res) in reader.lines().enumerate() {
            let line_number = index + 1;
            let raw_line = line_res?;
            let line = raw_line.trim();

            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix('#') {
                if let Some(header) = comment.strip_prefix("VRML_SIM") {
                    version = header.split_whitespace().next().map(str::to_string);
                } else {
                    let comment = comment.trim();
                    if !comment.is_empty() {
                        comments.push(comment.to_string());
                    }
                }
                continue;
            }

            let (keyword_rest, importable) = match line.strip_prefix(IMPORTABLE) {
                Some(rest) => (rest.trim_start(), true),
                None => (line, false),
            };

            let Some(rest) = keyword_rest.strip_prefix(EXTERNPROTO) else {
                if importable {
                    return Err(ParserError::FormatError {
                        line: line_number,
                        reason: format!("expected {} after {}", EXTERNPROTO, IMPORTABLE),
                    });
                }

                trace!("Header ends at line {}", line_number);
                break;
            };

            let url = Self::parse_quoted_url(rest.trim_start(), line_number)?;
            let Some(name) = proto_name_from_url(&url) else {
                return Err(ParserError::FormatError {
                    line: line_number,
                    reason: format!("'{}' does not name a {} file", url, PROTO_SUFFIX),
                });
            };

            if declarations
                .iter()
                .any(|decl: &ExternProtoDeclaration| decl.name == name && decl.url == url)
            {
                warn!("Duplicate declaration of {} at line {}", name, line_number);
                continue;
            }

            declarations.push(ExternProtoDeclaration {
                name: name.to_string(),
                url,
                importable,
            });
        }

        Ok(ExternProtoHeader {
            version,
            declarations,
            comments,
        })
    }

    fn parse_quoted_url(input: &str, line: usize) -> Result<String, ParserError> {
        let Some(quoted) = input.strip_prefix('"') else {
            return Err(ParserError::FormatError {
                line,
                reason: "the url has to be enclosed in double quotes".to_string(),
            });
        };

        let Some((url, trailing)) = quoted.split_once('"') else {
            return Err(ParserError::FormatError {
                line,
                reason: "missing closing double quote".to_string(),
            });
        };

        let trailing = trailing.trim();
        if !trailing.is_empty() && !trailing.starts_with('#') {
            return Err(ParserError::FormatError {
                line,
                reason: format!("unexpected trailing content '{}'", trailing),
            });
        }

        if url.is_empty() {
            return Err(ParserError::FormatError {
                line,
                reason: "empty url".to_string(),
            });
        }

        Ok(url.to_string())
    }
}

/// `https://host/path/Wheel.proto` -> `Wheel`. Works on both separators, as locators may still carry backslashes.
pub fn proto_name_from_url(url: &str) -> Option<&str> {
    let file_name = url.rsplit(['/', '\\']).next()?;
    let suffix_start = file_name.len().checked_sub(PROTO_SUFFIX.len())?;
    if !file_name.is_char_boundary(suffix_start) || !file_name[suffix_start..].eq_ignore_ascii_case(PROTO_SUFFIX) {
        return None;
    }

    let name = &file_name[..suffix_start];
    (!name.is_empty()).then_some(name)
}
