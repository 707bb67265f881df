//! Blocking TCP transport.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use bytes::BytesMut;

use super::resp::{encode_command, Reply};
use super::Transport;
use crate::config::Config;
use crate::error::{Result, ZdbError};

/// One TCP connection to the store. One request is in flight at a time.
///
/// A failed write or read leaves the stream out of step with the replies
/// still on the wire, so the connection is shut down and every later call
/// fails.
pub struct TcpTransport {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    read_chunk: usize,
    broken: bool,
}

impl TcpTransport {
    /// Dial the configured address and apply its timeouts.
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let stream = TcpStream::connect(config.address.as_str())?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        stream.set_nodelay(true)?;

        log::info!("connected to store at {}", config.address);

        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(config.buffer_size),
            write_buf: BytesMut::with_capacity(config.buffer_size),
            read_chunk: config.buffer_size,
            broken: false,
        })
    }

    /// Whether an earlier failure took this connection out of service.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn round_trip(&mut self, command: &str, args: &[&[u8]]) -> Result<Reply> {
        self.write_buf.clear();
        encode_command(&mut self.write_buf, command, args);
        self.stream.write_all(&self.write_buf)?;
        self.stream.flush()?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some(reply) = Reply::decode(&mut self.read_buf)? {
                return Ok(reply);
            }

            let filled = self.read_buf.len();
            self.read_buf.resize(filled + self.read_chunk, 0);
            let n = match self.stream.read(&mut self.read_buf[filled..]) {
                Ok(n) => n,
                Err(err) => {
                    self.read_buf.truncate(filled);
                    return Err(err.into());
                }
            };
            self.read_buf.truncate(filled + n);

            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed connection",
                )
                .into());
            }
        }
    }

    fn mark_broken(&mut self, err: &ZdbError) {
        log::warn!("dropping connection after failed call: {}", err);
        self.broken = true;
        self.read_buf.clear();
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Transport for TcpTransport {
    fn call(&mut self, command: &str, args: &[&[u8]]) -> Result<Reply> {
        if self.broken {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "connection dropped after an earlier failure",
            )
            .into());
        }

        match self.round_trip(command, args) {
            Ok(Reply::Error(msg)) => Err(ZdbError::Server(msg)),
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.mark_broken(&err);
                Err(err)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != std::io::ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.stream.peer_addr().ok())
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use crate::client::Client;

    /// Serve one connection: answer each request with the next scripted
    /// chunks, pausing `delay` between the chunks of one answer.
    fn serve(script: Vec<Vec<&'static str>>, delay: Duration) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            for answer in script {
                match conn.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                for (i, chunk) in answer.iter().enumerate() {
                    if i > 0 {
                        thread::sleep(delay);
                    }
                    if conn.write_all(chunk.as_bytes()).is_err() {
                        return;
                    }
                }
            }
        });
        (address, handle)
    }

    fn config(address: String, timeout: Duration) -> Config {
        let mut config = Config::new(address);
        config.read_timeout = Some(timeout);
        config
    }

    #[test]
    fn test_round_trip() {
        let (address, server) = serve(vec![vec!["+PONG\r\n"], vec!["$5\r\nhello\r\n"]], Duration::ZERO);
        let mut transport = TcpTransport::connect(&config(address, Duration::from_secs(5))).unwrap();

        assert_eq!(transport.call("PING", &[]).unwrap(), Reply::Status("PONG".into()));
        assert_eq!(
            transport.call("GET", &[b"k".as_slice()]).unwrap(),
            Reply::Bulk(bytes::Bytes::from_static(b"hello"))
        );
        drop(transport);
        server.join().unwrap();
    }

    #[test]
    fn test_reply_spanning_many_reads() {
        let (address, server) = serve(vec![vec!["$11\r\nhello world\r\n"]], Duration::ZERO);
        let mut small = config(address, Duration::from_secs(5));
        small.buffer_size = 3;
        let mut transport = TcpTransport::connect(&small).unwrap();

        assert_eq!(
            transport.call("GET", &[b"k".as_slice()]).unwrap(),
            Reply::Bulk(bytes::Bytes::from_static(b"hello world"))
        );
        drop(transport);
        server.join().unwrap();
    }

    #[test]
    fn test_error_reply_keeps_connection() {
        let (address, server) = serve(vec![vec!["-Key not found\r\n"], vec!["+PONG\r\n"]], Duration::ZERO);
        let mut transport = TcpTransport::connect(&config(address, Duration::from_secs(5))).unwrap();

        assert!(matches!(transport.call("DEL", &[b"k".as_slice()]), Err(ZdbError::Server(_))));
        assert!(!transport.is_broken());
        assert!(transport.call("PING", &[]).is_ok());
        drop(transport);
        server.join().unwrap();
    }

    #[test]
    fn test_timeout_never_leaks_stale_reply() {
        let (address, server) = serve(
            vec![
                vec!["$5\r\nhel", "lo\r\n"],
                vec!["$3\r\nbye\r\n"],
            ],
            Duration::from_millis(400),
        );
        let transport = TcpTransport::connect(&config(address, Duration::from_millis(150))).unwrap();
        let client = Client::new(transport);

        assert!(matches!(client.get(b"first"), Err(ZdbError::Io(_))));
        // The late "hello" must never be handed out as the answer to another key.
        assert!(matches!(client.get(b"second"), Err(ZdbError::Io(_))));
        assert!(matches!(client.ping(), Err(ZdbError::Io(_))));
        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn test_protocol_error_breaks_connection() {
        let (address, server) = serve(vec![vec!["?garbage\r\n"], vec!["+PONG\r\n"]], Duration::ZERO);
        let mut transport = TcpTransport::connect(&config(address, Duration::from_secs(5))).unwrap();

        assert!(matches!(transport.call("PING", &[]), Err(ZdbError::Protocol(_))));
        assert!(transport.is_broken());
        assert!(matches!(transport.call("PING", &[]), Err(ZdbError::Io(_))));
        drop(transport);
        server.join().unwrap();
    }
}
