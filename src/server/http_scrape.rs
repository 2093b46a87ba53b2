//! A minimal HTTP request responder used for scrape-style health/metrics
//! endpoints layered onto the same accept loop as the syslog listeners.
//! Reads one request up to the blank line ending its headers, surfaces the
//! request as a record (so it can be logged like anything else this crate
//! extracts), writes back a canned response, then the connection is done.

use std::time::Duration;

use crate::{
    aux::AuxData,
    error::{FrameError, FrameResult},
    sink::Bookmark,
    transport::Transport,
};

use super::{IoCondition, PrepareAction, Server};

const CANNED_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const READ_CHUNK: usize = 1024;
const MAX_REQUEST_SIZE: usize = 16 * 1024;

#[derive(Debug)]
pub struct HttpScrapeServer {
    transport: Transport,
    buffer: Vec<u8>,
    responded: bool,
    done: bool,
    generation: u64,
}

impl HttpScrapeServer {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
            responded: false,
            done: false,
            generation: 0,
        }
    }
}

fn end_of_headers(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

impl Server for HttpScrapeServer {
    fn fetch(&mut self, may_read: &mut bool) -> FrameResult<(&[u8], AuxData, Bookmark)> {
        if self.done {
            return Err(FrameError::Eof);
        }

        loop {
            if let Some(end) = end_of_headers(&self.buffer) {
                if !self.responded {
                    let _ = self.transport.write(CANNED_RESPONSE);
                    self.responded = true;
                }
                let bookmark = Bookmark {
                    generation: self.generation,
                };
                self.generation += 1;
                self.done = true;
                return Ok((&self.buffer[..end], AuxData::new(), bookmark));
            }

            if self.buffer.len() > MAX_REQUEST_SIZE {
                return Err(FrameError::protocol(
                    "HTTP request headers exceeded the size limit without a blank line",
                ));
            }

            if !*may_read {
                return Err(FrameError::Again);
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.transport.read(&mut chunk) {
                Ok((0, _)) => {
                    self.done = true;
                    return Err(FrameError::Eof);
                }
                Ok((n, _)) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(FrameError::Again) => {
                    *may_read = false;
                    return Err(FrameError::Again);
                }
                Err(FrameError::Eof) => {
                    self.done = true;
                    return Err(FrameError::Eof);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn prepare(&self, _timeout: Option<Duration>) -> PrepareAction {
        if self.done {
            PrepareAction::Suspend
        } else {
            PrepareAction::PollIo(IoCondition::Readable)
        }
    }

    fn close(&mut self) {
        self.transport.close();
    }

    fn reset_error(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn emits_request_headers_and_responds() {
        let mut mock = MockTransport::new();
        mock.push(b"GET /metrics HTTP/1.1\r\nHost: x\r\n\r\n");
        mock.close_write_end();
        let mut server = HttpScrapeServer::new(Transport::Mock(mock));
        let mut may_read = true;
        let (record, _, _) = server.fetch(&mut may_read).unwrap();
        assert!(record.starts_with(b"GET /metrics"));
    }
}
