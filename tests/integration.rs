//! Integration tests: build tries from patterns, query them, read captures and sinks.

use bytetrie::{
    read_packed_i64, ByteRing, CaseRule, Capture, TrieError, TrieParser, TrieReader,
};
use std::io::Cursor;

fn build(patterns: &[(&str, u32)]) -> TrieParser {
    let mut trie = TrieParser::new(CaseRule::Sensitive);
    for (pattern, value) in patterns {
        trie.insert_str(pattern, *value).expect("insert");
    }
    trie
}

fn query<'a>(reader: &mut TrieReader<'a>, trie: &TrieParser, input: &'a [u8]) -> Option<u32> {
    reader
        .query(trie, ByteRing::linear(input), 0, input.len())
        .expect("query")
}

#[test]
fn test_every_literal_pattern_matches_itself() {
    let patterns = [
        ("get", 1),
        ("getx", 2),
        ("put", 3),
        ("post", 4),
        ("patch", 5),
        ("pat", 6),
        ("a%%b", 7),
    ];
    let trie = build(&patterns);
    for (pattern, value) in patterns {
        let input = pattern.replace("%%", "%");
        let mut reader = TrieReader::new();
        assert_eq!(query(&mut reader, &trie, input.as_bytes()), Some(value), "{}", pattern);
        assert_eq!(reader.position(), input.len(), "{}", pattern);
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.capture_count(), 0);
    }
}

#[test]
fn test_capture_patterns_match_their_inputs() {
    let trie = build(&[
        ("id=%u;", 1),
        ("id=none;", 2),
        ("name=%b;", 3),
        ("pos=%i,%i;", 4),
    ]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"id=77;"), Some(1));
    assert_eq!(reader.captured_i64(0), Some(77));
    assert_eq!(query(&mut reader, &trie, b"id=none;"), Some(2));
    assert_eq!(reader.capture_count(), 0);
    assert_eq!(query(&mut reader, &trie, b"name=bob;"), Some(3));
    assert_eq!(reader.captured_utf8(0).as_deref(), Some("bob"));
    assert_eq!(query(&mut reader, &trie, b"pos=-3,14;"), Some(4));
    assert_eq!(reader.capture_count(), 2);
    assert_eq!(reader.captured_i64(0), Some(-3));
    assert_eq!(reader.captured_i64(1), Some(14));
    assert_eq!(trie.max_captures(), 2);
}

#[test]
fn test_not_found_leaves_window_unchanged() {
    let trie = build(&[("get", 1), ("put", 2), ("patch", 3), ("pat", 4)]);
    let mut reader = TrieReader::new();
    let input = b"xxzzz";
    assert_eq!(
        reader
            .query(&trie, ByteRing::linear(input), 2, 3)
            .expect("query"),
        None
    );
    assert_eq!(reader.position(), 2);
    assert_eq!(reader.remaining(), 3);
    // ran out of bytes inside a run
    assert_eq!(query(&mut reader, &trie, b"pa"), None);
    assert_eq!(reader.position(), 0);
    assert_eq!(reader.remaining(), 2);
    assert_eq!(query(&mut reader, &trie, b""), None);
}

#[test]
fn test_shorter_pattern_is_fallback() {
    let trie = build(&[("abc", 1), ("abcdef", 2)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"abcd"), Some(1));
    assert_eq!(reader.position(), 3);
    assert_eq!(query(&mut reader, &trie, b"abcdef"), Some(2));
    assert_eq!(reader.position(), 6);
    assert_eq!(query(&mut reader, &trie, b"abc"), Some(1));
    assert_eq!(reader.position(), 3);
    assert_eq!(query(&mut reader, &trie, b"abcdefgh"), Some(2));
    assert_eq!(reader.position(), 6);
}

#[test]
fn test_signed_decimal() {
    let trie = build(&[("%i", 5)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"123"), Some(5));
    assert_eq!(reader.captured_i64(0), Some(123));
    assert_eq!(query(&mut reader, &trie, b"-45"), Some(5));
    assert_eq!(reader.captured_i64(0), Some(-45));
    assert_eq!(query(&mut reader, &trie, b"+7x"), Some(5));
    assert_eq!(reader.captured_i64(0), Some(7));
    assert_eq!(reader.position(), 2);
    assert_eq!(query(&mut reader, &trie, b"abc"), None);
    assert_eq!(query(&mut reader, &trie, b"-"), None);
}

#[test]
fn test_bytes_up_to_stop() {
    let trie = build(&[("a%bX", 7)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"aHELLOXrest"), Some(7));
    assert_eq!(reader.captured_bytes(0), Some(b"HELLO".to_vec()));
    assert_eq!(reader.position(), 7);
    assert_eq!(query(&mut reader, &trie, b"aX"), Some(7));
    assert_eq!(reader.captured_bytes(0), Some(Vec::new()));
    assert_eq!(query(&mut reader, &trie, b"aHELLO"), None);
}

#[test]
fn test_insertion_order_does_not_matter() {
    let patterns = [
        ("alpha", 1),
        ("beta", 2),
        ("gamma", 3),
        ("alps", 4),
        ("id=%u;", 5),
        ("id=x;", 6),
        ("be%bZ", 7),
    ];
    let forward = build(&patterns);
    let mut reversed = patterns;
    reversed.reverse();
    let backward = build(&reversed);

    let inputs: [&[u8]; 11] = [
        b"alpha", b"beta", b"gamma", b"alps", b"id=12;", b"id=x;", b"bexxZ", b"betaZ",
        b"alpine", b"gam", b"id=;",
    ];
    let mut a = TrieReader::new();
    let mut b = TrieReader::new();
    for input in inputs {
        let ra = query(&mut a, &forward, input);
        let rb = query(&mut b, &backward, input);
        assert_eq!(ra, rb, "{:?}", String::from_utf8_lossy(input));
        assert_eq!(a.position(), b.position());
        assert_eq!(a.captures(), b.captures());
    }
    assert_eq!(query(&mut a, &forward, b"bexxZ"), Some(7));
    assert_eq!(a.captured_utf8(0).as_deref(), Some("xx"));
    assert_eq!(query(&mut a, &forward, b"betaZ"), Some(2));
    assert_eq!(a.position(), 4);

    let mut left = forward.entries().expect("entries");
    let mut right = backward.entries().expect("entries");
    left.sort();
    right.sort();
    assert_eq!(left, right);
}

#[test]
fn test_sibling_stop_bytes_scan_together() {
    let trie = build(&[("a%bX", 1), ("a%bY", 2)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"aZZZX"), Some(1));
    assert_eq!(reader.captured_utf8(0).as_deref(), Some("ZZZ"));
    assert_eq!(query(&mut reader, &trie, b"aZZZY"), Some(2));
    assert_eq!(reader.captured_utf8(0).as_deref(), Some("ZZZ"));
    // first stop byte in the source wins
    assert_eq!(query(&mut reader, &trie, b"aZYX"), Some(2));
    assert_eq!(reader.captured_utf8(0).as_deref(), Some("Z"));
    assert_eq!(query(&mut reader, &trie, b"aZZZ"), None);
}

#[test]
fn test_three_or_more_stop_bytes_scan_together() {
    let patterns = [("a%bX", 1), ("a%bY", 2), ("a%bZ", 3), ("a%bW", 4)];
    let forward = build(&patterns[..3]);
    let mut reversed = patterns;
    reversed.reverse();
    let backward = build(&reversed);
    let mut reader = TrieReader::new();
    for trie in [&forward, &backward] {
        assert_eq!(query(&mut reader, trie, b"aQQXQQZQQY"), Some(1));
        assert_eq!(reader.captured_utf8(0).as_deref(), Some("QQ"));
        assert_eq!(reader.position(), 4);
        assert_eq!(query(&mut reader, trie, b"aQQZQQY"), Some(3));
        assert_eq!(reader.captured_utf8(0).as_deref(), Some("QQ"));
        assert_eq!(query(&mut reader, trie, b"aQYQX"), Some(2));
        assert_eq!(reader.captured_utf8(0).as_deref(), Some("Q"));
        assert_eq!(query(&mut reader, trie, b"aQQQ"), None);
    }
    assert_eq!(query(&mut reader, &backward, b"aQWQX"), Some(4));
    assert_eq!(reader.captured_utf8(0).as_deref(), Some("Q"));
}

#[test]
fn test_fallback_keeps_captures_of_shorter_match() {
    let trie = build(&[("%bQw", 3), ("%u", 1), ("%uZZ", 2)]);
    let mut reader = TrieReader::new();
    // both longer routes fail after capturing; the bare number wins
    assert_eq!(query(&mut reader, &trie, b"12Z5Q!"), Some(1));
    assert_eq!(reader.position(), 2);
    assert_eq!(reader.capture_count(), 1);
    assert_eq!(
        reader.capture(0),
        Some(&Capture::Number {
            negative: false,
            magnitude: 12,
            base: 10,
            digits: 2
        })
    );

    assert_eq!(query(&mut reader, &trie, b"12Z5Qw"), Some(3));
    assert_eq!(reader.capture_count(), 1);
    assert_eq!(reader.captured_utf8(0).as_deref(), Some("12Z5"));
    assert_eq!(query(&mut reader, &trie, b"12ZZ"), Some(2));
    assert_eq!(reader.captured_i64(0), Some(12));

    let pair = build(&[("k=%u", 1), ("k=%u,%u;", 2)]);
    assert_eq!(query(&mut reader, &pair, b"k=7,8!"), Some(1));
    assert_eq!(reader.captures().len(), 1);
    assert_eq!(reader.captured_i64(0), Some(7));
    assert_eq!(reader.position(), 3);
}

#[test]
fn test_capture_needs_a_source_byte() {
    let trie = build(&[("%.", 1)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b""), None);
    assert_eq!(query(&mut reader, &trie, b"x"), Some(1));
    assert_eq!(reader.position(), 0);
    assert_eq!(reader.captured_i64(0), Some(0));

    let ratio = build(&[("v=%u%/", 1)]);
    assert_eq!(query(&mut reader, &ratio, b"v=5"), None);
    assert_eq!(query(&mut reader, &ratio, b"v=5;"), Some(1));
    assert_eq!(reader.captured_i64(1), Some(1));
    assert_eq!(reader.position(), 3);

    // a dispatch loop steps over matches that consume nothing
    let input = b"x.5";
    reader
        .setup(ByteRing::linear(input), 0, input.len())
        .expect("setup");
    let mut seen = Vec::new();
    while reader.has_content() {
        let at = reader.position();
        match reader.parse_next(&trie).expect("parse") {
            Some(value) => {
                seen.push((at, value, reader.captured_i64(0)));
                if reader.position() == at {
                    reader.skip(1);
                }
            }
            None => {
                reader.skip(1);
            }
        }
    }
    assert_eq!(seen, vec![(0, 1, Some(0)), (1, 1, Some(5))]);
}

#[test]
fn test_literal_tried_before_capture() {
    let trie = build(&[("111", 1), ("%u", 2), ("1%u", 3), ("11%u", 4)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"111"), Some(1));
    assert_eq!(reader.capture_count(), 0);
    assert_eq!(query(&mut reader, &trie, b"15"), Some(3));
    assert_eq!(reader.captured_i64(0), Some(5));
    assert_eq!(query(&mut reader, &trie, b"7"), Some(2));
    assert_eq!(reader.captured_i64(0), Some(7));
}

#[test]
fn test_backtrack_overflow_is_reported() {
    let trie = build(&[("111", 1), ("%u", 2), ("1%u", 3), ("11%u", 4)]);
    let input = b"111";
    let mut shallow = TrieReader::with_max_depth(2);
    let err = shallow
        .query(&trie, ByteRing::linear(input), 0, input.len())
        .expect_err("overflow");
    assert!(matches!(err, TrieError::BacktrackOverflow { depth: 2 }));
    let mut deep = TrieReader::with_max_depth(3);
    assert_eq!(query(&mut deep, &trie, input), Some(1));
}

#[test]
fn test_case_insensitive_store() {
    let mut trie = TrieParser::new(CaseRule::Insensitive);
    trie.insert_str("Content-Length: %u\r\n", 1).expect("insert");
    trie.insert_str("Content-Type: %b\r", 2).expect("insert");
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"content-length: 12\r\n"), Some(1));
    assert_eq!(reader.captured_i64(0), Some(12));
    assert_eq!(query(&mut reader, &trie, b"CONTENT-TYPE: Text/HTML\r"), Some(2));
    assert_eq!(reader.captured_utf8(0).as_deref(), Some("Text/HTML"));

    let sensitive = build(&[("Content-Length: %u\r\n", 1)]);
    assert_eq!(query(&mut reader, &sensitive, b"content-length: 12\r\n"), None);

    let entries = trie.entries().expect("entries");
    assert!(entries
        .iter()
        .any(|(p, v)| p.as_slice() == b"content-length: %u\r\n" && *v == 1));
}

#[test]
fn test_numeric_forms() {
    let hex = build(&[("v=%I;", 1)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &hex, b"v=0x1F;"), Some(1));
    assert_eq!(reader.captured_i64(0), Some(31));
    assert_eq!(query(&mut reader, &hex, b"v=-0xff;"), Some(1));
    assert_eq!(reader.captured_i64(0), Some(-255));
    assert_eq!(query(&mut reader, &hex, b"v=10;"), Some(1));
    assert_eq!(reader.captured_i64(0), Some(10));

    let fraction = build(&[("t=%u%.s", 2)]);
    assert_eq!(query(&mut reader, &fraction, b"t=3.25s"), Some(2));
    assert_eq!(reader.captured_i64(0), Some(3));
    assert_eq!(
        reader.capture(1),
        Some(&Capture::Number {
            negative: false,
            magnitude: 25,
            base: 10,
            digits: 2
        })
    );
    assert_eq!(query(&mut reader, &fraction, b"t=3s"), Some(2));
    assert_eq!(
        reader.capture(1),
        Some(&Capture::Number {
            negative: false,
            magnitude: 0,
            base: 10,
            digits: 1
        })
    );

    let ratio = build(&[("r=%i%/;", 3)]);
    assert_eq!(query(&mut reader, &ratio, b"r=3/-4;"), Some(3));
    assert_eq!(reader.captured_i64(0), Some(3));
    assert_eq!(reader.captured_i64(1), Some(-4));
    assert_eq!(query(&mut reader, &ratio, b"r=5;"), Some(3));
    assert_eq!(reader.captured_i64(1), Some(1));
}

#[test]
fn test_numeric_digit_limits() {
    let trie = build(&[("n=%u", 1), ("h=%U", 2)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"n=9999999999999999999"), Some(1));
    assert_eq!(
        reader.capture(0),
        Some(&Capture::Number {
            negative: false,
            magnitude: 9_999_999_999_999_999_999,
            base: 10,
            digits: 19
        })
    );
    assert_eq!(query(&mut reader, &trie, b"n=12345678901234567890"), None);
    assert_eq!(query(&mut reader, &trie, b"h=0xffffffffffffffff"), Some(2));
    assert_eq!(reader.capture(0).and_then(|c| c.low()), Some(u32::MAX));
    assert_eq!(reader.capture(0).and_then(|c| c.high()), Some(u32::MAX));
    assert!(matches!(
        reader.write_captures(&mut Vec::<u8>::new()),
        Err(TrieError::Io(_))
    ));
    assert_eq!(query(&mut reader, &trie, b"h=0x1ffffffffffffffff"), None);
    assert_eq!(query(&mut reader, &trie, b"n="), None);
}

#[test]
fn test_capture_sinks() {
    let trie = build(&[("k=%b;v=%i;", 1)]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"k=ab;v=-3;"), Some(1));

    let mut packed = Vec::new();
    let written = reader.write_captures(&mut packed).expect("write");
    assert_eq!(written, 5);
    assert_eq!(packed, vec![0x00, 0x02, b'a', b'b', 0xFD]);
    let mut cursor = Cursor::new(&packed[4..]);
    assert_eq!(read_packed_i64(&mut cursor).expect("read"), -3);

    let mut text = String::new();
    reader.write_captures_text(&mut text).expect("text");
    assert_eq!(text, "[2]ab[-1,0,3,655361]");
    assert_eq!(reader.captured_byte(0, 1), Some(b'b'));
    assert_eq!(reader.captured_byte(0, 2), None);
    assert_eq!(reader.captured_byte(1, 0), None);
}

#[test]
fn test_captured_query_routes_nested_field() {
    let outer = build(&[("cmd=%b;", 1)]);
    let inner = build(&[("start", 10), ("stop", 11)]);
    let mut reader = TrieReader::new();
    let mut nested = TrieReader::new();
    assert_eq!(query(&mut reader, &outer, b"cmd=stop;"), Some(1));
    assert_eq!(
        reader.captured_query(0, &inner, &mut nested).expect("nested"),
        Some(11)
    );
    assert_eq!(query(&mut reader, &outer, b"cmd=halt;"), Some(1));
    assert_eq!(
        reader.captured_query(0, &inner, &mut nested).expect("nested"),
        None
    );
}

#[test]
fn test_sequential_records() {
    let trie = build(&[("a=%u;", 1), ("b=%b;", 2)]);
    let input = b"a=1;b=xy;a=22;";
    let mut reader = TrieReader::new();
    reader
        .setup(ByteRing::linear(input), 0, input.len())
        .expect("setup");
    let mut seen = Vec::new();
    while reader.has_content() {
        let value = reader.parse_next(&trie).expect("parse").expect("match");
        seen.push((value, reader.position()));
    }
    assert_eq!(seen, vec![(1, 4), (2, 9), (1, 14)]);
    assert_eq!(reader.captured_i64(0), Some(22));
}

#[test]
fn test_insert_errors_keep_store() {
    let mut trie = build(&[("abc", 1)]);
    let before = trie.cells().to_vec();
    assert!(matches!(trie.insert_str("", 2), Err(TrieError::EmptyPattern)));
    assert!(matches!(trie.insert_str("ab%", 2), Err(TrieError::TrailingEscape)));
    assert!(matches!(trie.insert_str("ab%b", 2), Err(TrieError::MissingStopByte)));
    assert!(matches!(
        trie.insert_str("ab%z", 2),
        Err(TrieError::UnknownEscape(b'z'))
    ));
    assert_eq!(trie.cells(), &before[..]);
    let mut reader = TrieReader::new();
    assert_eq!(query(&mut reader, &trie, b"abc"), Some(1));
    assert_eq!(query(&mut reader, &TrieParser::default(), b"abc"), None);
}
