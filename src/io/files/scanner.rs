use crate::io::common::loader::ScanService;
use crate::resolution::reference::Reference;
use crate::resolution::report::ScanError;
use log::trace;
use protoscout_files::extern_proto::ExternProtoHeader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads the `EXTERNPROTO` declarations of world and PROTO files.
#[derive(Default)]
pub struct ExternProtoScanner;

impl ScanService for ExternProtoScanner {
    fn declared_references(&self, path: &Path) -> Result<Vec<Reference>, ScanError> {
        let reader = BufReader::new(File::open(path)?);
        let header = ExternProtoHeader::parse_file(reader)?;
        trace!(
            "{} declares {} reference(s)",
            path.display(),
            header.declarations.len()
        );

        Ok(header
            .declarations
            .into_iter()
            .map(|decl| {
                if decl.importable {
                    Reference::importable(decl.name, decl.url)
                } else {
                    Reference::new(decl.name, decl.url)
                }
            })
            .collect())
    }
}
