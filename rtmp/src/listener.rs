//! Accepting connections: a blocking accept loop that runs one worker
//! thread per connection.
//!
//! Each worker owns its socket, its [`Session`] and its actor outright;
//! connections share no state with each other.  Handles of finished workers
//! are reaped on every accept.

use crate::actor::RtmpActor;
use crate::session::{Session, SessionConfig};
use log::{debug, error, info};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};

const READ_BUFFER_SIZE: usize = 4096;

/// A blocking RTMP accept loop.
pub struct RtmpListener {
    listener: TcpListener,
    workers: Vec<JoinHandle<()>>,
}

impl RtmpListener {
    pub fn bind(address: impl ToSocketAddrs) -> std::io::Result<RtmpListener> {
        Ok(RtmpListener {
            listener: TcpListener::bind(address)?,
            workers: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, spawning a worker per connection.  The
    /// factory produces one actor per accepted connection.
    pub fn run<F, A>(mut self, config: SessionConfig, mut make_actor: F) -> std::io::Result<()>
    where
        F: FnMut() -> A,
        A: RtmpActor + Send + 'static,
    {
        loop {
            let (socket, peer) = self.listener.accept()?;
            info!("accepted connection from {}", peer);

            self.reap_finished_workers();

            let config = config.clone();
            let actor = make_actor();
            self.workers
                .push(thread::spawn(move || run_connection(socket, config, actor)));
        }
    }

    fn reap_finished_workers(&mut self) {
        let mut index = 0;
        while index < self.workers.len() {
            if self.workers[index].is_finished() {
                let handle = self.workers.swap_remove(index);
                let _ = handle.join();
            } else {
                index += 1;
            }
        }
    }
}

/// The per-connection receive loop: read, feed the session, write whatever
/// it produced.  Runs until the peer closes the socket or the session
/// raises a fatal error; either way the actor's disconnect callback fires
/// exactly once on the way out.
fn run_connection<A: RtmpActor>(mut socket: TcpStream, config: SessionConfig, actor: A) {
    let mut session = Session::new(config, actor);
    let mut buffer = [0_u8; READ_BUFFER_SIZE];

    loop {
        let count = match socket.read(&mut buffer) {
            Ok(0) => {
                debug!("peer closed the connection");
                break;
            }
            Ok(count) => count,
            Err(err) => {
                debug!("socket read failed: {}", err);
                break;
            }
        };

        let response = match session.handle_bytes(&buffer[..count]) {
            Ok(response) => response,
            Err(err) => {
                error!("closing connection after protocol error: {}", err);
                break;
            }
        };

        if !response.is_empty() {
            if let Err(err) = socket.write_all(&response) {
                debug!("socket write failed: {}", err);
                break;
            }
        }
    }

    session.disconnect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ConnectCommand, Message, MetaData};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingActor {
        disconnects: Arc<AtomicUsize>,
    }

    impl RtmpActor for CountingActor {
        fn on_connect(&mut self, _command: &ConnectCommand) -> bool {
            true
        }

        fn on_disconnect(&mut self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        fn on_create_stream(&mut self, _stream_id: u32) -> bool {
            true
        }

        fn on_publish(&mut self, _stream_id: u32, _name: &str) -> bool {
            true
        }

        fn on_metadata(&mut self, _stream_id: u32, _metadata: MetaData) -> bool {
            true
        }

        fn on_media(&mut self, _stream_id: u32, _is_video: bool, _message: &Message) -> bool {
            true
        }
    }

    #[test]
    fn accepts_a_connection_and_completes_the_handshake() {
        let listener = RtmpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let disconnects = Arc::new(AtomicUsize::new(0));

        let actor_disconnects = Arc::clone(&disconnects);
        thread::spawn(move || {
            let _ = listener.run(SessionConfig::default(), move || CountingActor {
                disconnects: Arc::clone(&actor_disconnects),
            });
        });

        let mut socket = TcpStream::connect(address).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut c0_and_c1 = vec![3_u8];
        c0_and_c1.extend_from_slice(&[0; 8]);
        c0_and_c1.extend_from_slice(&[7; 1528]);
        socket.write_all(&c0_and_c1).unwrap();

        let mut response = vec![0_u8; 1 + 1536 + 1536];
        socket.read_exact(&mut response).unwrap();
        assert_eq!(response[0], 3, "S0 version");
        assert_eq!(&response[1 + 1536 + 8..], &[7_u8; 1528][..], "S2 echo");

        drop(socket);

        // The worker should notice the close and fire the disconnect.
        for _ in 0..100 {
            if disconnects.load(Ordering::SeqCst) == 1 {
                return;
            }

            thread::sleep(Duration::from_millis(10));
        }

        panic!("on_disconnect never fired");
    }
}
