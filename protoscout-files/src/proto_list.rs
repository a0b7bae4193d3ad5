use crate::ParserError;
use quick_xml::de::Deserializer;
use serde_derive::Deserialize;
use std::io::BufRead;

/// The catalog of prototypes shipped with the application (`resources/proto-list.xml`).
#[derive(Deserialize, Debug, Default)]
#[serde(rename = "proto-list")]
pub struct ProtoList {
    #[serde(rename = "proto", default)]
    pub protos: Vec<ProtoEntry>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProtoEntry {
    pub name: String,
    pub url: String,
    #[serde(rename = "base-type")]
    pub base_type: Option<String>,
    pub license: Option<String>,
    #[serde(rename = "license-url")]
    pub license_url: Option<String>,
    #[serde(rename = "documentation-url")]
    pub documentation_url: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "slot-type")]
    pub slot_type: Option<String>,
    #[serde(rename = "tags")]
    pub raw_tags: Option<String>,
    #[serde(rename = "needs-robot-ancestor", default)]
    pub needs_robot_ancestor: bool,
}

impl ProtoEntry {
    pub fn tags(&self) -> Vec<&str> {
        self.raw_tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The generator escapes line breaks as a literal `\n`.
    pub fn description_text(&self) -> Option<String> {
        self.description
            .as_ref()
            .map(|description| description.replace("\\n", "\n").trim_end().to_string())
    }
}

impl ProtoList {
    pub fn parse_file<R: BufRead>(reader: R) -> Result<Self, ParserError> {
        let mut deserializer = Deserializer::from_reader(reader);
        Ok(<ProtoList as serde::Deserialize>::deserialize(&mut deserializer)?)
    }

    pub fn parse_str(xml: &str) -> Result<Self, ParserError> {
        let mut deserializer = Deserializer::from_str(xml);
        Ok(<ProtoList as serde::Deserialize>::deserialize(&mut deserializer)?)
    }
}
