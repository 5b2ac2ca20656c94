//! Socket transports: local socket path or loopback TCP

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
#[cfg(unix)]
use std::path::Path;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

/// File name of the default local socket, created in the temp directory
pub const DEFAULT_PIPE_NAME: &str = "cef_server_pipe";

/// Where a server listens or a client connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Local socket path
    Pipe(PathBuf),
    /// TCP port on the loopback interface (0 lets the OS choose when binding)
    Tcp(u16),
}

impl Endpoint {
    pub fn default_pipe() -> Self {
        Endpoint::Pipe(std::env::temp_dir().join(DEFAULT_PIPE_NAME))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::default_pipe()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Pipe(path) => write!(f, "pipe:{}", path.display()),
            Endpoint::Tcp(port) => write!(f, "tcp:127.0.0.1:{port}"),
        }
    }
}

#[cfg(not(unix))]
fn unsupported_pipe() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "local socket endpoints are only available on unix",
    )
}

/// Listening socket
pub enum Listener {
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
    Tcp(TcpListener),
}

impl Listener {
    /// Bind to `endpoint`, replacing a stale socket file if present
    pub fn bind(endpoint: &Endpoint) -> io::Result<Listener> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Pipe(path) => {
                let _ = std::fs::remove_file(path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Ok(Listener::Unix(UnixListener::bind(path)?, path.clone()))
            }
            #[cfg(not(unix))]
            Endpoint::Pipe(_) => Err(unsupported_pipe()),
            Endpoint::Tcp(port) => {
                let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, *port)))?;
                Ok(Listener::Tcp(listener))
            }
        }
    }

    /// The endpoint actually bound (resolves TCP port 0)
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            #[cfg(unix)]
            Listener::Unix(_, path) => Ok(Endpoint::Pipe(path.clone())),
            Listener::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.port())),
        }
    }

    /// Block until a client connects
    pub fn accept(&self) -> io::Result<(Stream, String)> {
        match self {
            #[cfg(unix)]
            Listener::Unix(listener, path) => {
                let (stream, _) = listener.accept()?;
                Ok((Stream::Unix(stream), path.display().to_string()))
            }
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept()?;
                stream.set_nodelay(true)?;
                Ok((Stream::Tcp(stream), addr.to_string()))
            }
        }
    }

    /// Remove the socket file, if any
    pub fn cleanup(&self) {
        #[cfg(unix)]
        if let Listener::Unix(_, path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Connected byte stream
pub enum Stream {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    /// Connect to `endpoint`; `timeout` bounds the TCP handshake
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Stream> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Pipe(path) => connect_unix(path),
            #[cfg(not(unix))]
            Endpoint::Pipe(_) => Err(unsupported_pipe()),
            Endpoint::Tcp(port) => {
                let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, *port));
                let stream = TcpStream::connect_timeout(&addr, timeout)?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
        }
    }

    pub fn try_clone(&self) -> io::Result<Stream> {
        match self {
            #[cfg(unix)]
            Stream::Unix(stream) => Ok(Stream::Unix(stream.try_clone()?)),
            Stream::Tcp(stream) => Ok(Stream::Tcp(stream.try_clone()?)),
        }
    }

    /// Shut down both directions, waking any thread blocked on this stream
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Stream::Unix(stream) => stream.shutdown(Shutdown::Both),
            Stream::Tcp(stream) => stream.shutdown(Shutdown::Both),
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Stream::Unix(stream) => stream.set_read_timeout(timeout),
            Stream::Tcp(stream) => stream.set_read_timeout(timeout),
        }
    }
}

#[cfg(unix)]
fn connect_unix(path: &Path) -> io::Result<Stream> {
    Ok(Stream::Unix(UnixStream::connect(path)?))
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Stream::Unix(stream) => stream.read(buf),
            Stream::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Stream::Unix(stream) => stream.write(buf),
            Stream::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Stream::Unix(stream) => stream.flush(),
            Stream::Tcp(stream) => stream.flush(),
        }
    }
}
