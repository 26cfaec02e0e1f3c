use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use tracing::{info, error};

use crate::client_handler::ClientHandler;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::identity::{IdentityProvider, Reserved, TrustUpstream};
use crate::registry::Registry;
use crate::server_types::ConnectionIds;

pub struct ServerListener {
    listener: TcpListener,
    dispatcher: Dispatcher,
    outbound_capacity: usize,
    ids: ConnectionIds,
}

impl ServerListener {

    /// Binds using the identity provider implied by the config
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let identity: Arc<dyn IdentityProvider> = if config.reserved.is_empty() {
            Arc::new(TrustUpstream)
        } else {
            Arc::new(Reserved::new(config.reserved.iter().cloned()))
        };

        Self::bind_with(config, Dispatcher::new(Registry::new(), identity)).await
    }

    pub async fn bind_with(config: &ServerConfig, dispatcher: Dispatcher) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.addr).await
            .map_err(|source| ServerError::Bind { addr: config.addr.clone(), source })?;

        Ok(ServerListener {
            listener,
            dispatcher,
            outbound_capacity: config.outbound_capacity.get(),
            ids: ConnectionIds::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // Accept loop, a failed accept only costs that one connection
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((tcp_socket, addr)) => {
                    let (tcp_read, tcp_write) = tcp_socket.into_split();
                    let id = self.ids.next();

                    info!("Server received new client connection {:?} as {}", &addr, id);

                    let _h = ClientHandler::spawn(id, addr, tcp_read, tcp_write, &self.dispatcher, self.outbound_capacity);
                },
                Err(e) => {
                    error!("Unable to accept client connection: {}", e);
                },
            }
        }
    }

    pub fn spawn_accept(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
