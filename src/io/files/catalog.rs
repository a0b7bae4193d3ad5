use crate::io::common::loader::Catalog;
use crate::resolution::reference::Reference;
use itertools::Itertools;
use log::{info, warn};
use protoscout_files::ParserError;
use protoscout_files::proto_list::{ProtoEntry, ProtoList};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// The official PROTO catalog (`proto-list.xml`), used to resolve bare names of worlds that predate `EXTERNPROTO`.
#[derive(Debug, Default)]
pub struct ProtoCatalog {
    entries: HashMap<String, ProtoEntry>,
}

impl ProtoCatalog {
    pub fn load(path: &Path) -> Result<Self, ParserError> {
        let list = ProtoList::parse_file(BufReader::new(File::open(path)?))?;
        let catalog = Self::from_list(list);
        info!("Loaded {} catalog PROTO from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn from_list(list: ProtoList) -> Self {
        let mut entries = HashMap::with_capacity(list.protos.len());
        for entry in list.protos {
            if entries.contains_key(&entry.name) {
                warn!("The catalog lists {} more than once, keeping the first entry", entry.name);
                continue;
            }

            entries.insert(entry.name.clone(), entry);
        }

        Self { entries }
    }

    pub fn info(&self, name: &str) -> Option<&ProtoEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).sorted().collect_vec()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for ProtoCatalog {
    fn lookup(&self, name: &str) -> Option<Reference> {
        self.entries
            .get(name)
            .map(|entry| Reference::new(entry.name.clone(), entry.url.clone()))
    }
}
