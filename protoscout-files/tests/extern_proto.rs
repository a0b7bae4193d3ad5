use protoscout_files::ParserError;
use protoscout_files::extern_proto::{ExternProtoHeader, proto_name_from_url};

#[test]
fn world_header() {
    let world = r#"#VRML_SIM R2023a utf8

EXTERNPROTO "https://raw.githubusercontent.com/cyberbotics/webots/R2023a/projects/objects/backgrounds/protos/TexturedBackground.proto"
EXTERNPROTO "webots://projects/objects/floors/protos/RectangleArena.proto"
EXTERNPROTO "../protos/Wheel.proto" # local wheel
IMPORTABLE EXTERNPROTO "webots://projects/objects/factory/containers/protos/WoodenBox.proto"

WorldInfo {
}
EXTERNPROTO "Ignored.proto"
"#;

    let header = ExternProtoHeader::parse_file(world.as_bytes()).unwrap();
    assert_eq!(header.version, Some("R2023a".to_string()));
    assert_eq!(header.declarations.len(), 4);
    assert_eq!(header.declarations[0].name, "TexturedBackground");
    assert_eq!(header.declarations[1].name, "RectangleArena");
    assert_eq!(
        header.declarations[1].url,
        "webots://projects/objects/floors/protos/RectangleArena.proto"
    );
    assert_eq!(header.declarations[2].name, "Wheel");
    assert_eq!(header.declarations[2].url, "../protos/Wheel.proto");
    assert!(!header.declarations[2].importable);
    assert_eq!(header.declarations[3].name, "WoodenBox");
    assert!(header.declarations[3].importable);
}

#[test]
fn proto_header_stops_at_body() {
    let proto = r#"#VRML_SIM R2023a utf8
# license: Apache License 2.0
# tags: nonDeterministic
# A car with four wheels.

EXTERNPROTO "Wheel.proto"

PROTO Car [
  field SFVec3f translation 0 0 0
]
{
  Solid {
  }
}
"#;

    let header = ExternProtoHeader::parse_file(proto.as_bytes()).unwrap();
    assert_eq!(header.declarations.len(), 1);
    assert_eq!(header.declarations[0].name, "Wheel");
    assert_eq!(header.comments.len(), 3);
    assert_eq!(header.comments[0], "license: Apache License 2.0");
}

#[test]
fn no_declarations() {
    let header = ExternProtoHeader::parse_file("PROTO Empty [ ] { Group { } }".as_bytes()).unwrap();
    assert!(header.declarations.is_empty());
    assert_eq!(header.version, None);

    let header = ExternProtoHeader::parse_file("".as_bytes()).unwrap();
    assert!(header.declarations.is_empty());
}

#[test]
fn duplicate_declarations_are_collapsed() {
    let world = "EXTERNPROTO \"A.proto\"\nEXTERNPROTO \"A.proto\"\nEXTERNPROTO \"other/A.proto\"\n";
    let header = ExternProtoHeader::parse_file(world.as_bytes()).unwrap();
    // same name with a different url is kept, detecting that conflict is up to the resolver
    assert_eq!(header.declarations.len(), 2);
    assert_eq!(header.declarations[1].url, "other/A.proto");
}

#[test]
fn malformed_declarations() {
    let unquoted = ExternProtoHeader::parse_file("EXTERNPROTO Wheel.proto".as_bytes());
    assert!(matches!(
        unquoted,
        Err(ParserError::FormatError { line: 1, .. })
    ));

    let unterminated = ExternProtoHeader::parse_file("\n\nEXTERNPROTO \"Wheel.proto".as_bytes());
    assert!(matches!(
        unterminated,
        Err(ParserError::FormatError { line: 3, .. })
    ));

    let not_a_proto = ExternProtoHeader::parse_file("EXTERNPROTO \"textures/wheel.png\"".as_bytes());
    assert!(matches!(
        not_a_proto,
        Err(ParserError::FormatError { line: 1, .. })
    ));

    let dangling_importable = ExternProtoHeader::parse_file("IMPORTABLE Wheel".as_bytes());
    assert!(dangling_importable.is_err());
}

#[test]
fn names_from_urls() {
    assert_eq!(
        proto_name_from_url("https://example.com/protos/Wheel.proto"),
        Some("Wheel")
    );
    assert_eq!(proto_name_from_url("..\\protos\\Tire.PROTO"), Some("Tire"));
    assert_eq!(proto_name_from_url("Plain.proto"), Some("Plain"));
    assert_eq!(proto_name_from_url(".proto"), None);
    assert_eq!(proto_name_from_url("mesh.obj"), None);
    assert_eq!(proto_name_from_url(""), None);
}
