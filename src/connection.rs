// ABOUTME: Buffered TCP I/O shared by the upstream client and the downstream server
// ABOUTME: Reads HTTP-style header lines and MMS packets off the same byte stream

use crate::packet::{self, CodecError, Packet};
use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// Wraps a `TcpStream` with write buffering and a read buffer shared between
/// line-oriented HTTP header reads and length-prefixed MMS packet reads.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Reads one CRLF- or LF-terminated line, stripping the terminator.
    /// Returns `Ok(None)` on a clean EOF with nothing buffered.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = self.buffer.split();
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
        }
    }

    /// Reads the HTTP status line followed by header lines up to (and
    /// excluding) the terminating blank line.
    pub async fn read_response_head(&mut self) -> io::Result<Option<(String, Vec<String>)>> {
        let status_line = match self.read_line().await? {
            Some(line) => line,
            None => return Ok(None),
        };
        let mut headers = Vec::new();
        while let Some(line) = self.read_line().await? {
            if line.is_empty() {
                break;
            }
            headers.push(line);
        }
        Ok(Some((status_line, headers)))
    }

    /// Reads a single MMS packet from the stream, following the check/parse
    /// pattern: probe first, only allocate once a full packet is buffered.
    pub async fn read_packet(&mut self) -> io::Result<Option<Packet>> {
        loop {
            match self.try_parse_packet() {
                Ok(Some(packet)) => return Ok(Some(packet)),
                Ok(None) => {}
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset mid-packet"))
                };
            }
        }
    }

    fn try_parse_packet(&mut self) -> Result<Option<Packet>, CodecError> {
        let mut cursor = Cursor::new(&self.buffer[..]);
        match packet::check(&mut cursor) {
            Ok(()) => {
                cursor.set_position(0);
                let packet = packet::decode_one(&mut cursor)?;
                let consumed = cursor.position() as usize;
                self.buffer.advance(consumed);
                Ok(Some(packet))
            }
            Err(CodecError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept, connect) = tokio::join!(listener.accept(), connect);
        (accept.unwrap().0, connect.unwrap())
    }

    #[tokio::test]
    async fn reads_response_head_and_then_packets() {
        let (mut server_side, client_side) = connected_pair().await;
        let mut conn = Connection::new(client_side);

        server_side
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n\r\n")
            .await
            .unwrap();
        let packet = Packet::new(crate::packet::Marker::Data, bytes::Bytes::from_static(b"abc"));
        server_side.write_all(&packet.raw).await.unwrap();

        let (status, headers) = conn.read_response_head().await.unwrap().unwrap();
        assert_eq!(status, "HTTP/1.1 200 OK");
        assert_eq!(headers, vec!["Content-Type: application/octet-stream".to_string()]);

        let decoded = conn.read_packet().await.unwrap().unwrap();
        assert_eq!(decoded.payload, bytes::Bytes::from_static(b"abc"));
    }
}
