use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::tcp::dispatcher::{ConnectionOutcome, ServerDispatcher};
use crate::transform::Transform;
use crate::types::{MediaWireError, SessionId};

/// TCP server for the media transfer protocol
pub struct MediaTcpServer<T> {
    listener: TcpListener,
    dispatcher: ServerDispatcher<T>,
}

impl<T: Transform> MediaTcpServer<T> {
    /// Prepare the processed directory and bind to the specified address
    pub async fn bind(
        addr: &str,
        config: ServerConfig,
        transform: T,
    ) -> Result<Self, MediaWireError> {
        config.prepare().await?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(MediaWireError::Transport)?;
        info!("Media TCP server bound to {}", addr);

        Ok(Self {
            listener,
            dispatcher: ServerDispatcher::new(config, transform),
        })
    }

    /// Get the local address this server is bound to
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, MediaWireError> {
        self.listener
            .local_addr()
            .map_err(MediaWireError::Transport)
    }

    /// Accept connections forever, handling each one to completion before the next.
    pub async fn run(self) -> Result<(), MediaWireError> {
        info!(
            "Media TCP server starting, processed directory {}",
            self.dispatcher.config().processed_dir.display()
        );

        let Self {
            listener,
            dispatcher,
        } = self;
        let mut incoming = TcpListenerStream::new(listener);
        let mut next_session_id: SessionId = 0;

        while let Some(accepted) = incoming.next().await {
            match accepted {
                Ok(socket) => {
                    next_session_id += 1;
                    let session_id = next_session_id;
                    match socket.peer_addr() {
                        Ok(addr) => info!("Session {}: connection from {}", session_id, addr),
                        Err(_) => info!("Session {}: connection from unknown peer", session_id),
                    }

                    match dispatcher.handle_connection(socket, session_id).await {
                        ConnectionOutcome::Served { artifact, .. } => {
                            info!("Session {} served {}", session_id, artifact.display())
                        }
                        ConnectionOutcome::Rejected(e) => {
                            info!("Session {} upload rejected: {}", session_id, e)
                        }
                        ConnectionOutcome::Failed(e) => {
                            info!("Session {} ended with error: {}", session_id, e)
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }

        Ok(())
    }
}
