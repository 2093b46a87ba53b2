//! End-to-end scenarios driving a server purely through the public
//! `Server` trait, the way an embedding host's scheduler would.

use logframe::server::{
    AutoServer, BufferedServer, DgramFrameExtractor, FramedExtractor, MultiLineExtractor,
    MultiLineMode, ProxyServer, RecordExtractor, RecordKind, Server, ServerOptions,
    TextExtractor,
};
use logframe::transport::{MockTransport, Transport};
use logframe::{FrameError, FrameEncoder};

fn mock(data: &[u8]) -> Transport {
    let mut m = MockTransport::new();
    m.push(data);
    m.close_write_end();
    Transport::Mock(m)
}

#[test]
fn newline_server_emits_three_lines_then_eof() {
    let transport = mock(b"one\ntwo\nthree\n");
    let mut server =
        BufferedServer::new(transport, ServerOptions::default(), TextExtractor::new(None)).unwrap();

    let mut expect = vec!["one", "two", "three"];
    expect.reverse();
    while let Some(want) = expect.pop() {
        let mut may_read = true;
        let (rec, _, _) = server.fetch(&mut may_read).unwrap();
        assert_eq!(rec, want.as_bytes());
        server.commit();
    }
    let mut may_read = true;
    assert!(matches!(server.fetch(&mut may_read), Err(FrameError::Eof)));
}

#[test]
fn auto_server_picks_octet_counting_for_digit_led_stream() {
    let transport = mock(b"5 hello6 world!");
    let mut server = AutoServer::new(transport, ServerOptions::default());
    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"hello");
    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"world!");
}

#[test]
fn auto_server_falls_back_to_text_for_non_digit_stream() {
    let transport = mock(b"<14>first line\nsecond line\n");
    let mut server = AutoServer::new(transport, ServerOptions::default());
    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"<14>first line");
}

#[test]
fn auto_server_rejects_an_unresolved_digit_run() {
    let transport = mock(b"12345678901234");
    let mut server = AutoServer::new(transport, ServerOptions::default());
    let mut may_read = true;
    assert!(matches!(
        server.fetch(&mut may_read),
        Err(FrameError::Protocol { .. })
    ));
}

#[test]
fn multiline_indented_groups_stack_trace() {
    let transport = mock(b"ERROR boom\n  at foo\n  at bar\nINFO next\n");
    let options = ServerOptions {
        multi_line_mode: Some(MultiLineMode::Indented),
        ..ServerOptions::default()
    };
    let extractor = MultiLineExtractor::new(MultiLineMode::Indented);
    let mut server = BufferedServer::new(transport, options, extractor).unwrap();

    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"ERROR boom\n  at foo\n  at bar");
    server.commit();

    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"INFO next");
}

#[test]
fn dgram_server_emits_one_record_per_push() {
    let mut mock_t = MockTransport::new();
    mock_t.push(b"first packet");
    let transport = Transport::Mock(mock_t);
    let mut server =
        BufferedServer::new(transport, ServerOptions::default(), DgramFrameExtractor::new(1024))
            .unwrap();
    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"first packet");
}

#[test]
fn dgram_server_errors_on_oversized_datagram() {
    let mut mock_t = MockTransport::new();
    mock_t.push(b"this packet is way too long for the limit");
    let transport = Transport::Mock(mock_t);
    let mut server =
        BufferedServer::new(transport, ServerOptions::default(), DgramFrameExtractor::new(4))
            .unwrap();
    let mut may_read = true;
    assert!(matches!(
        server.fetch(&mut may_read),
        Err(FrameError::Protocol { .. })
    ));
}

#[test]
fn record_server_reads_fixed_size_binary_records() {
    let transport = mock(b"abcdefgh");
    let mut server = BufferedServer::new(
        transport,
        ServerOptions::default(),
        RecordExtractor::new(RecordKind::Fixed { size: 4 }),
    )
    .unwrap();
    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"abcd");
    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"efgh");
}

#[test]
fn proxy_v1_preamble_is_stripped_before_the_inner_server_sees_it() {
    let mut mock_t = MockTransport::new();
    mock_t.push(b"PROXY TCP4 10.0.0.1 10.0.0.2 1234 5678\r\nhello\n");
    mock_t.close_write_end();
    let mut transport = Transport::Mock(mock_t);

    let proxied = logframe::server::strip_proxy_preamble(&mut transport).unwrap();
    assert!(proxied.is_some());
    let proxied = proxied.unwrap();
    assert_eq!(proxied.source.port(), 1234);
    assert_eq!(proxied.destination.port(), 5678);

    let inner = BufferedServer::new(transport, ServerOptions::default(), TextExtractor::new(None)).unwrap();
    let mut server = ProxyServer::wrap(Box::new(inner), Some(proxied));
    let mut may_read = true;
    let (rec, aux, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"hello");
    assert_eq!(aux.proxied.unwrap().source.port(), 1234);
}

#[test]
fn framed_encoder_round_trips_through_framed_extractor() {
    let mut out = Transport::Mock(MockTransport::new());
    FrameEncoder::Octet.write_record(&mut out, b"hello").unwrap();
    let Transport::Mock(written) = &out else {
        unreachable!()
    };

    let mut mock_t = MockTransport::new();
    mock_t.push(written.written());
    mock_t.close_write_end();
    let transport = Transport::Mock(mock_t);

    let mut server =
        BufferedServer::new(transport, ServerOptions::default(), FramedExtractor::default()).unwrap();
    let mut may_read = true;
    let (rec, _, _) = server.fetch(&mut may_read).unwrap();
    assert_eq!(rec, b"hello");
}
