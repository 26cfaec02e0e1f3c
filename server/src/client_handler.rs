use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::sync::broadcast::{self, Receiver as BReceiver, Sender as BSender};
use tokio::sync::mpsc::{self, Receiver};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_stream::StreamExt;
use futures::SinkExt; // provides send on top of FramedWrite

use tracing::{info, debug, warn, error};

use relay_protocol::{ChatCodec, Response};
use crate::dispatcher::{Dispatcher, Flow, Session};
use crate::server_types::{ConnectionHandle, ConnectionId};

const SHUTDOWN: u8 = 1;

// Handles server communication with one client.
// Essentially this models a client actor on the server side: a reader task
// driving the session, and a writer task draining the outbound queue.
pub struct ClientHandler<R> {
    addr: SocketAddr,
    session: Session,
    read: Option<R>,
    shutdown_rx: BReceiver<u8>,
}

struct ClientWriter<W> {
    id: ConnectionId,
    fw: FramedWrite<W, ChatCodec>,
    outbound_rx: Receiver<Response>,
    shutdown_tx: BSender<u8>,
}

impl<R> ClientHandler<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // Spawn tokio tasks to handle server socket reads from and writes to the client,
    // the returned handle finishes once the connection has been cleaned up
    pub fn spawn<W>(id: ConnectionId, addr: SocketAddr, read: R, write: W,
                    dispatcher: &Dispatcher, outbound_capacity: usize) -> JoinHandle<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Response>(outbound_capacity);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let session = dispatcher.connect(ConnectionHandle::new(id, outbound_tx));

        let mut writer = ClientWriter {
            id,
            fw: FramedWrite::new(write, ChatCodec),
            outbound_rx,
            shutdown_tx,
        };

        let mut handler = ClientHandler {
            addr,
            session,
            read: Some(read),
            shutdown_rx,
        };

        tokio::spawn(async move {
            writer.handle_write().await;
        });

        tokio::spawn(async move {
            handler.handle_read().await;
        })
    }

    // Loop to handle ongoing client msgs to server
    async fn handle_read(&mut self) {
        let Some(input) = self.read.take() else { return };
        let mut fr = FramedRead::new(input, ChatCodec);
        let id = self.session.handle().id();

        loop {
            select! {
                value = fr.next() => {
                    match value {
                        Some(Ok(msg)) => {
                            debug!("server received from {}: {:?}", id, msg);
                            if self.session.on_frame(msg).await == Flow::Close {
                                break;
                            }
                        },
                        Some(Err(x)) => {
                            debug!("Server Connection closing error: {:?}", x);
                            break;
                        },
                        None => break,
                    }
                }
                Ok(_) = self.shutdown_rx.recv() => { // writer failed, treat as disconnect
                    debug!("{} shutting down after write failure", id);
                    break;
                }
            }
        }

        info!("Remote {:?} has closed connection", &self.addr);
        self.session.disconnect().await;
    }
}

impl<W> ClientWriter<W>
where
    W: AsyncWrite + Unpin,
{
    // Loop draining the outbound queue into the socket, ends when every
    // handle to this connection is gone or the socket breaks
    async fn handle_write(&mut self) {
        while let Some(msg) = self.outbound_rx.recv().await {
            match self.fw.send(msg).await {
                Ok(()) => {},
                // the codec refused this one response, nothing reached the socket
                Err(e) if e.kind() == ErrorKind::InvalidInput => {
                    warn!("Dropping response for {} that cannot be encoded: {}", self.id, e);
                },
                Err(e) => {
                    error!("Unable to write to {}: {}", self.id, e);
                    let _ = self.shutdown_tx.send(SHUTDOWN);
                    break;
                },
            }
        }
        debug!("Writer for {} finished", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::{duplex, DuplexStream};
    use tokio::sync::mpsc::Receiver as MReceiver;
    use tokio::time::{sleep, timeout};

    use relay_protocol::Request;
    use crate::delivery::DeliveryOutcome;
    use crate::identity::TrustUpstream;
    use crate::registry::Registry;
    use crate::server_types::{ConnectionIds, Envelope};

    const WAIT: Duration = Duration::from_secs(5);

    // a socket whose peer has gone away: every write fails
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Registry::new(), Arc::new(TrustUpstream))
    }

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    // client end of an in-memory connection, sends requests into the handler
    async fn client_sends(client: DuplexStream, requests: Vec<Request>) -> FramedWrite<DuplexStream, ChatCodec> {
        let mut fw = FramedWrite::new(client, ChatCodec);
        for r in requests {
            fw.send(r).await.unwrap();
        }
        fw
    }

    async fn wait_registered(registry: &Registry, name: &str) {
        timeout(WAIT, async {
            while registry.lookup(name).await.is_none() {
                sleep(Duration::from_millis(5)).await;
            }
        }).await.expect("registration never arrived");
    }

    fn local_session(d: &Dispatcher, ids: &ConnectionIds) -> (Session, MReceiver<Response>) {
        let (tx, rx) = mpsc::channel(8);
        (d.connect(ConnectionHandle::new(ids.next(), tx)), rx)
    }

    #[tokio::test]
    async fn write_failure_disconnects_only_the_recipient() {
        let d = dispatcher();
        let ids = ConnectionIds::new();
        let (client, server) = duplex(1024);

        let reader = ClientHandler::spawn(ids.next(), addr(), server, BrokenPipe, &d, 8);
        // keep the client end open so the reader never sees end of stream
        let _client = client_sends(client, vec![Request::Register { username: Some("bob".into()) }]).await;
        wait_registered(d.registry(), "bob").await;

        let (mut alice, _alice_rx) = local_session(&d, &ids);
        let (mut carol, mut carol_rx) = local_session(&d, &ids);
        alice.on_request(Request::Register { username: Some("alice".into()) }).await;
        carol.on_request(Request::Register { username: Some("carol".into()) }).await;

        let to_bob = Envelope { sender: "alice".into(), recipient: "bob".into(), content: b"hi".to_vec() };
        assert_eq!(d.route(to_bob).await, DeliveryOutcome::Queued);

        timeout(WAIT, reader).await.expect("reader kept running").unwrap();
        assert!(d.registry().lookup("bob").await.is_none());

        // the sender carries on as before
        alice.on_request(Request::PrivateMessage {
            sender: Some("alice".into()),
            recipient: Some("carol".into()),
            message: Some(b"still here".to_vec()),
        }).await;
        assert_eq!(
            carol_rx.try_recv().ok(),
            Some(Response::PrivateMessage { sender: "alice".into(), message: b"still here".to_vec() })
        );
        assert_eq!(d.registry().usernames().await, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn end_of_stream_cleans_up_registration() {
        let d = dispatcher();
        let ids = ConnectionIds::new();
        let (client, server) = duplex(1024);
        let (_peer, write) = duplex(1024);

        let reader = ClientHandler::spawn(ids.next(), addr(), server, write, &d, 8);
        let fw = client_sends(client, vec![Request::Register { username: Some("bob".into()) }]).await;
        wait_registered(d.registry(), "bob").await;

        drop(fw);
        timeout(WAIT, reader).await.expect("reader kept running").unwrap();
        assert!(d.registry().is_empty().await);
    }

    #[tokio::test]
    async fn unencodable_response_keeps_the_connection() {
        let (tx, rx) = mpsc::channel(4);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let (peer, write) = duplex(64 * 1024);
        let mut writer = ClientWriter {
            id: ConnectionIds::new().next(),
            fw: FramedWrite::new(write, ChatCodec),
            outbound_rx: rx,
            shutdown_tx,
        };

        let huge: Vec<String> = (0..3).map(|i| format!("{}{}", i, "x".repeat(40_000))).collect();
        tx.send(Response::Users(huge)).await.unwrap();
        tx.send(Response::Users(vec!["alice".into()])).await.unwrap();
        drop(tx);

        writer.handle_write().await;
        assert!(shutdown_rx.try_recv().is_err());

        let mut fr = FramedRead::new(peer, ChatCodec);
        assert_eq!(
            fr.next().await.unwrap().unwrap(),
            relay_protocol::ChatMsg::Server(Response::Users(vec!["alice".into()]))
        );
    }
}
