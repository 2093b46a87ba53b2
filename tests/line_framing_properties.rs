//! Property-based coverage for line framing, in the style of
//! `file_source::buffer`'s own `qc_read_until_with_max_size`: round-trip an
//! arbitrary set of lines through a newline-delimited server and check the
//! records extracted match the lines that went in, independent of how many
//! bytes happen to be available per underlying transport read.

use quickcheck::{quickcheck, TestResult};

use logframe::server::{BufferedServer, Server, ServerOptions, TextExtractor};
use logframe::transport::{MockTransport, Transport};

fn sanitize(line: &str) -> String {
    line.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

fn round_trip(lines: Vec<String>) -> TestResult {
    let lines: Vec<String> = lines.iter().map(|l| sanitize(l)).collect();
    if lines.iter().any(String::is_empty) {
        // An empty line is indistinguishable from "no more lines" only at
        // EOF without a trailing newline; every line here gets one, so
        // empty lines are still valid input, but keep the property focused
        // on non-empty content to avoid a degenerate all-blank case.
        return TestResult::discard();
    }

    let mut payload = String::new();
    for line in &lines {
        payload.push_str(line);
        payload.push('\n');
    }

    let mut mock = MockTransport::new();
    mock.push(payload.as_bytes());
    mock.close_write_end();
    let transport = Transport::Mock(mock);

    let mut server =
        BufferedServer::new(transport, ServerOptions::default(), TextExtractor::new(None)).unwrap();

    let mut got = Vec::new();
    loop {
        let mut may_read = true;
        match server.fetch(&mut may_read) {
            Ok((rec, _, _)) => {
                got.push(String::from_utf8(rec.to_vec()).unwrap());
                server.commit();
            }
            Err(logframe::FrameError::Eof) => break,
            Err(logframe::FrameError::Again) => continue,
            Err(e) => return TestResult::error(format!("unexpected error: {e}")),
        }
    }

    TestResult::from_bool(got == lines)
}

#[test]
fn newline_framing_round_trips_arbitrary_lines() {
    quickcheck(round_trip as fn(Vec<String>) -> TestResult);
}
