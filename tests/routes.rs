//! Route table tests: parse route files, compile them, and dispatch through the result.

use bytetrie::{build_trie, load_routes, parse_routes, ByteRing, CaseRule, TrieError, TrieReader};
use std::io::Write;

const TABLE: &str = r#"# header comment
"GET /item/%u HTTP/1.1\r\n" => 1   # trailing comment
"\x01%i;" => 3

"say \"hi\"" => 4
	"tab\tsep" => 5
"#;

#[test]
fn test_parse_route_table() {
    let routes = parse_routes(TABLE).expect("parse");
    assert_eq!(routes.len(), 4);
    assert_eq!(routes[0].pattern, b"GET /item/%u HTTP/1.1\r\n".to_vec());
    assert_eq!(routes[0].value, 1);
    assert_eq!(routes[0].line, 2);
    assert_eq!(routes[1].pattern, b"\x01%i;".to_vec());
    assert_eq!(routes[1].line, 3);
    assert_eq!(routes[2].pattern, b"say \"hi\"".to_vec());
    assert_eq!(routes[2].line, 5);
    assert_eq!(routes[3].pattern, b"tab\tsep".to_vec());
    assert_eq!(routes[3].value, 5);
}

#[test]
fn test_parse_errors() {
    assert!(parse_routes(r#""abc" => "#).is_err());
    assert!(parse_routes(r#""abc" 3"#).is_err());
    assert!(parse_routes(r#""a\qb" => 1"#).is_err());
    assert!(parse_routes(r#""abc" => 99999999999"#).is_err());
    assert_eq!(parse_routes("").expect("empty").len(), 0);
    assert_eq!(parse_routes("# only a comment\n\n").expect("comments").len(), 0);
}

#[test]
fn test_build_and_dispatch() {
    let routes = parse_routes(TABLE).expect("parse");
    let trie = build_trie(&routes, CaseRule::Sensitive).expect("build");
    let input = b"GET /item/42 HTTP/1.1\r\n\x01-9;";
    let mut reader = TrieReader::new();
    reader
        .setup(ByteRing::linear(input), 0, input.len())
        .expect("setup");
    assert_eq!(reader.parse_next(&trie).expect("parse"), Some(1));
    assert_eq!(reader.captured_i64(0), Some(42));
    assert_eq!(reader.parse_next(&trie).expect("parse"), Some(3));
    assert_eq!(reader.captured_i64(0), Some(-9));
    assert!(!reader.has_content());
}

#[test]
fn test_bad_pattern_in_table_is_rejected() {
    let routes = parse_routes("\"ok\" => 1\n\"bad%q\" => 2\n").expect("parse");
    assert!(matches!(
        build_trie(&routes, CaseRule::Sensitive),
        Err(TrieError::UnknownEscape(b'q'))
    ));
}

#[test]
fn test_load_routes_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("routes.txt");
    let mut file = std::fs::File::create(&path).expect("create");
    writeln!(file, "\"Host: %b\\r\" => 7").expect("write");
    writeln!(file, "\"host: localhost\\r\" => 8").expect("write");
    drop(file);

    let routes = load_routes(&path).expect("load");
    assert_eq!(routes.len(), 2);
    let trie = build_trie(&routes, CaseRule::Insensitive).expect("build");
    let mut reader = TrieReader::new();
    let input = b"HOST: example.org\r";
    assert_eq!(
        reader
            .query(&trie, ByteRing::linear(input), 0, input.len())
            .expect("query"),
        Some(7)
    );
    assert_eq!(reader.captured_utf8(0).as_deref(), Some("example.org"));
    let input = b"Host: LocalHost\r";
    assert_eq!(
        reader
            .query(&trie, ByteRing::linear(input), 0, input.len())
            .expect("query"),
        Some(8)
    );

    assert!(load_routes(dir.path().join("missing.txt")).is_err());
}
