use tokio::io::{self, Error, ErrorKind};
use tokio::net::{tcp, TcpStream, ToSocketAddrs};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_stream::StreamExt; // provides combinator methods like next on to of FramedRead buf read and Stream trait
use futures::SinkExt; // provides combinator methods like send/send_all on top of FramedWrite buf write and Sink trait

use tracing::{debug, error};

use relay_protocol::{ChatMsg, ChatCodec, Request, Response};

pub type FrRead = FramedRead<tcp::OwnedReadHalf, ChatCodec>;
pub type FrWrite = FramedWrite<tcp::OwnedWriteHalf, ChatCodec>;

/// Connection to a relay server
pub struct ChatClient {
    reader: ClientReader,
    writer: ClientWriter,
}

pub struct ClientReader {
    fr: FrRead,
}

pub struct ClientWriter {
    fw: FrWrite,
}

impl ChatClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await
            .map_err(|e| { error!("Unable to connect to server"); e })?;

        // split tcpstream so we can hand off to r & w tasks
        let (tcp_read, tcp_write) = stream.into_split();

        Ok(ChatClient {
            reader: ClientReader { fr: FramedRead::new(tcp_read, ChatCodec) },
            writer: ClientWriter { fw: FramedWrite::new(tcp_write, ChatCodec) },
        })
    }

    pub fn into_split(self) -> (ClientReader, ClientWriter) {
        (self.reader, self.writer)
    }

    pub async fn register(&mut self, name: &str) -> io::Result<()> {
        self.writer.register(name).await
    }

    pub async fn send_private(&mut self, sender: &str, recipient: &str, message: impl Into<Vec<u8>>) -> io::Result<()> {
        self.writer.send_private(sender, recipient, message).await
    }

    pub async fn request_users(&mut self) -> io::Result<()> {
        self.writer.send(Request::Users).await
    }

    pub async fn quit(&mut self) -> io::Result<()> {
        self.writer.send(Request::Quit).await
    }

    pub async fn send(&mut self, request: Request) -> io::Result<()> {
        self.writer.send(request).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.send_raw(bytes).await
    }

    pub async fn next_response(&mut self) -> io::Result<Option<Response>> {
        self.reader.next_response().await
    }
}

impl ClientReader {
    /// Next server response, `None` once the server has closed the connection
    pub async fn next_response(&mut self) -> io::Result<Option<Response>> {
        match self.fr.next().await {
            Some(Ok(ChatMsg::Server(response))) => Ok(Some(response)),
            Some(Ok(ChatMsg::Malformed(reason))) => Err(Error::new(ErrorKind::InvalidData, reason)),
            Some(Ok(other)) => {
                debug!("client received unexpected frame {:?}", other);
                Err(Error::new(ErrorKind::InvalidData, "Unexpected client frame from server"))
            },
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

impl ClientWriter {
    pub async fn register(&mut self, name: &str) -> io::Result<()> {
        self.send(Request::Register { username: Some(name.to_owned()) }).await
    }

    pub async fn send_private(&mut self, sender: &str, recipient: &str, message: impl Into<Vec<u8>>) -> io::Result<()> {
        self.send(Request::PrivateMessage {
            sender: Some(sender.to_owned()),
            recipient: Some(recipient.to_owned()),
            message: Some(message.into()),
        }).await
    }

    pub async fn send(&mut self, request: Request) -> io::Result<()> {
        self.fw.send(request).await
    }

    // bypasses the codec, e.g. to exercise the server with broken frames
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        let w = self.fw.get_mut();
        w.write_all(bytes).await?;
        w.flush().await
    }
}
