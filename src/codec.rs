//! Framed message codec for the boss/worker wire protocol.
//!
//! Every request and response on a worker connection is a length-prefixed
//! byte payload answered by a one-line `ack` from the receiver:
//!
//! ```text
//! > <decimal byte length>\n
//! > <payload bytes>
//! < ack\n
//! ```
//!
//! The single out-of-band token is the `quit` line, sent in place of a
//! length line and never acknowledged. Payloads are raw bytes end-to-end;
//! the length line counts bytes, not characters. The codec is symmetric,
//! so Rust workers can use [`MessageStream`] for their side of the
//! protocol as well.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;

use crate::error::{DevolveError, Result};

/// Acknowledgement literal exchanged after every framed payload.
pub const ACK: &str = "ack";

/// Termination literal, sent in place of a length line.
pub const QUIT: &str = "quit";

/// Buffer size for the framed stream (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// One received wire item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A framed payload, already acknowledged.
    Payload(Vec<u8>),
    /// The peer sent the quit sentinel; no acknowledgement is sent back.
    Quit,
}

/// Framed, acknowledged message stream over a pair of byte-stream halves.
///
/// The halves are generic so the codec can be exercised against in-memory
/// readers and writers; [`MessageStream::from_tcp`] builds the usual
/// socket-backed pair.
pub struct MessageStream<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    line: String,
}

impl MessageStream<TcpStream, TcpStream> {
    /// Build a message stream over a connected TCP socket.
    pub fn from_tcp(stream: &TcpStream) -> Result<Self> {
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;
        Ok(Self::new(reader, writer))
    }
}

impl<R: Read, W: Write> MessageStream<R, W> {
    /// Wrap a reader/writer pair in the framed codec.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::with_capacity(BUFFER_SIZE, reader),
            writer: BufWriter::with_capacity(BUFFER_SIZE, writer),
            line: String::with_capacity(256),
        }
    }

    /// Send one framed payload and wait for the peer's acknowledgement.
    ///
    /// A missing, mismatched, or cut-short acknowledgement is a protocol
    /// failure: the peer either did not receive the payload or could not
    /// parse the frame.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.writer.write_all(payload.len().to_string().as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.write_all(payload)?;
        self.writer.flush()?;

        match self.read_trimmed_line()? {
            Some(line) if line == ACK => Ok(()),
            Some(line) => Err(DevolveError::Protocol(format!(
                "expected {:?} after sending {} bytes, got {:?}",
                ACK,
                payload.len(),
                line
            ))),
            None => Err(DevolveError::Protocol(format!(
                "stream closed while waiting for {:?}",
                ACK
            ))),
        }
    }

    /// Receive one framed payload, acknowledging it, or the quit sentinel.
    ///
    /// A zero-length payload is legal and still acknowledged. End-of-stream
    /// before a complete frame is a transport failure.
    pub fn recv(&mut self) -> Result<Frame> {
        let line = match self.read_trimmed_line()? {
            Some(line) => line,
            None => {
                return Err(DevolveError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed before a frame",
                )));
            }
        };

        if line == QUIT {
            return Ok(Frame::Quit);
        }

        let len: usize = line
            .parse()
            .map_err(|_| DevolveError::Protocol(format!("malformed length line {:?}", line)))?;

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;

        self.writer.write_all(ACK.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        Ok(Frame::Payload(payload))
    }

    /// Send the quit sentinel: a bare line, no length prefix, no
    /// acknowledgement awaited.
    pub fn send_quit(&mut self) -> Result<()> {
        self.writer.write_all(QUIT.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read one LF- or CRLF-terminated line, stripping trailing whitespace.
    /// Returns `None` on end-of-stream.
    ///
    /// Used for the handshake lines and internally for acknowledgements.
    pub fn read_trimmed_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(self.line.trim_end().to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Consume the stream, returning the underlying halves.
    ///
    /// Buffered output is flushed; buffered but unread input is discarded.
    pub fn into_parts(self) -> Result<(R, W)> {
        let reader = self.reader.into_inner();
        let writer = self.writer.into_inner().map_err(|e| e.into_error())?;
        Ok((reader, writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Codec over in-memory halves: `reader` is the bytes the peer will
    /// send us, the writer collects what we send.
    fn stream(input: &[u8]) -> MessageStream<&[u8], Vec<u8>> {
        MessageStream::new(input, Vec::new())
    }

    fn written(stream: MessageStream<&[u8], Vec<u8>>) -> Vec<u8> {
        let (_, writer) = stream.into_parts().unwrap();
        writer
    }

    #[test]
    fn test_send_writes_length_prefixed_frame() {
        let mut tx = stream(b"ack\n");
        tx.send(b"hello").unwrap();
        assert_eq!(written(tx), b"5\nhello");
    }

    #[test]
    fn test_send_zero_length_payload() {
        let mut tx = stream(b"ack\n");
        tx.send(b"").unwrap();
        assert_eq!(written(tx), b"0\n");
    }

    #[test]
    fn test_send_accepts_crlf_terminated_ack() {
        let mut tx = stream(b"ack\r\n");
        assert!(tx.send(b"x").is_ok());
    }

    #[test]
    fn test_send_missing_ack_is_protocol_error() {
        let mut tx = stream(b"");
        let err = tx.send(b"hello").unwrap_err();
        assert!(matches!(err, DevolveError::Protocol(_)));
    }

    #[test]
    fn test_send_wrong_ack_is_protocol_error() {
        let mut tx = stream(b"nak\n");
        let err = tx.send(b"hello").unwrap_err();
        assert!(matches!(err, DevolveError::Protocol(_)));
    }

    #[test]
    fn test_recv_payload_and_acks() {
        let mut rx = stream(b"5\nhello");
        assert_eq!(rx.recv().unwrap(), Frame::Payload(b"hello".to_vec()));
        assert_eq!(written(rx), b"ack\n");
    }

    #[test]
    fn test_recv_zero_length_payload_still_acks() {
        let mut rx = stream(b"0\n");
        assert_eq!(rx.recv().unwrap(), Frame::Payload(Vec::new()));
        assert_eq!(written(rx), b"ack\n");
    }

    #[test]
    fn test_recv_binary_payload() {
        // Length counts bytes; payloads may contain newlines and non-UTF-8.
        let mut input = b"7\n".to_vec();
        input.extend_from_slice(&[0x00, 0x0a, 0xff, 0x0d, 0x0a, 0x01, 0x02]);
        let mut rx = MessageStream::new(&input[..], Vec::new());
        assert_eq!(
            rx.recv().unwrap(),
            Frame::Payload(vec![0x00, 0x0a, 0xff, 0x0d, 0x0a, 0x01, 0x02])
        );
    }

    #[test]
    fn test_recv_quit_sends_no_ack() {
        let mut rx = stream(b"quit\n");
        assert_eq!(rx.recv().unwrap(), Frame::Quit);
        assert_eq!(written(rx), b"");
    }

    #[test]
    fn test_recv_crlf_terminated_length_line() {
        let mut rx = stream(b"5\r\nhello");
        assert_eq!(rx.recv().unwrap(), Frame::Payload(b"hello".to_vec()));
    }

    #[test]
    fn test_recv_malformed_length_is_protocol_error() {
        let mut rx = stream(b"five\nhello");
        let err = rx.recv().unwrap_err();
        assert!(matches!(err, DevolveError::Protocol(_)));
    }

    #[test]
    fn test_recv_negative_length_is_protocol_error() {
        let mut rx = stream(b"-3\nxxx");
        assert!(matches!(
            rx.recv().unwrap_err(),
            DevolveError::Protocol(_)
        ));
    }

    #[test]
    fn test_recv_short_payload_is_transport_error() {
        let mut rx = stream(b"10\nabc");
        let err = rx.recv().unwrap_err();
        assert!(matches!(err, DevolveError::Io(_)));
    }

    #[test]
    fn test_recv_eof_before_frame_is_transport_error() {
        let mut rx = stream(b"");
        let err = rx.recv().unwrap_err();
        assert!(matches!(err, DevolveError::Io(_)));
    }

    #[test]
    fn test_send_quit_writes_bare_line() {
        let mut tx = stream(b"");
        tx.send_quit().unwrap();
        assert_eq!(written(tx), b"quit\n");
    }

    #[test]
    fn test_read_trimmed_line() {
        let mut rx = stream(b"w1\r\n4242\n");
        assert_eq!(rx.read_trimmed_line().unwrap(), Some("w1".to_string()));
        assert_eq!(rx.read_trimmed_line().unwrap(), Some("4242".to_string()));
        assert_eq!(rx.read_trimmed_line().unwrap(), None);
    }

    #[test]
    fn test_roundtrip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = thread::spawn(move || {
            let socket = TcpStream::connect(addr).unwrap();
            let mut stream = MessageStream::from_tcp(&socket).unwrap();
            // Echo one frame back, then observe the quit line.
            match stream.recv().unwrap() {
                Frame::Payload(bytes) => stream.send(&bytes).unwrap(),
                Frame::Quit => panic!("unexpected quit"),
            }
            assert_eq!(stream.recv().unwrap(), Frame::Quit);
        });

        let (socket, _) = listener.accept().unwrap();
        let mut stream = MessageStream::from_tcp(&socket).unwrap();

        stream.send(b"ping").unwrap();
        assert_eq!(stream.recv().unwrap(), Frame::Payload(b"ping".to_vec()));
        stream.send_quit().unwrap();

        peer.join().unwrap();
    }
}
