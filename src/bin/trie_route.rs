//! Dispatch a byte stream through a route table.
//!
//! Usage:
//!   trie_route [OPTIONS] ROUTES [INPUT]
//!
//! Builds a trie from the route file, then repeatedly matches the head of the input
//! (file, or stdin when INPUT is absent). Each match prints the route value and its
//! captures in text form; a byte that starts no route is skipped.
//!
//! Options:
//!   --ignore-case, -i   Compare ASCII letters without case
//!   --dump              Print the compiled trie to stderr before matching
//!
//! Logging follows `RUST_LOG` (e.g. `RUST_LOG=bytetrie=debug`).

use bytetrie::{build_trie, load_routes, ByteRing, CaseRule, TrieReader};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let case_rule = if let Some(pos) = raw_args
        .iter()
        .position(|a| a == "--ignore-case" || a == "-i")
    {
        raw_args.remove(pos);
        CaseRule::Insensitive
    } else {
        CaseRule::Sensitive
    };
    let dump = if let Some(pos) = raw_args.iter().position(|a| a == "--dump") {
        raw_args.remove(pos);
        true
    } else {
        false
    };
    let mut args = raw_args.into_iter();
    let routes_path: PathBuf = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: trie_route [--ignore-case] [--dump] ROUTES [INPUT]"))?;
    let input_path: Option<PathBuf> = args.next().map(PathBuf::from);

    let routes = load_routes(&routes_path).map_err(|e| anyhow::anyhow!(e))?;
    let trie = build_trie(&routes, case_rule)?;
    info!(
        routes = routes.len(),
        cells = trie.len(),
        max_captures = trie.max_captures(),
        "route table compiled"
    );
    if dump {
        eprint!("{}", trie);
    }

    let mut input = Vec::new();
    match &input_path {
        Some(path) => input = std::fs::read(path)?,
        None => {
            io::stdin().read_to_end(&mut input)?;
        }
    }

    let mut reader = TrieReader::new();
    reader.setup(ByteRing::linear(&input), 0, input.len())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut matched: u64 = 0;
    let mut skipped: u64 = 0;
    while reader.has_content() {
        let at = reader.position();
        match reader.parse_next(&trie)? {
            Some(value) => {
                let mut text = String::new();
                reader.write_captures_text(&mut text)?;
                writeln!(out, "{}\t{}\t{}", at, value, text)?;
                matched += 1;
                // a route of only `%.` or `%/` can match without consuming
                if reader.position() == at {
                    reader.skip(1);
                    skipped += 1;
                }
            }
            None => {
                if skipped == 0 {
                    warn!(position = at, next = %reader.peek_utf8(16), "no route matches");
                }
                reader.skip(1);
                skipped += 1;
            }
        }
    }
    out.flush()?;

    eprintln!("routes: {}", routes_path.display());
    eprintln!("input bytes: {}", input.len());
    eprintln!("matched: {}", matched);
    eprintln!("skipped bytes: {}", skipped);
    Ok(())
}
