use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use flowstate_metrics::CounterRegistry;
use flowstate_session::{is_meaningful_v1, verify, SessionTable};
use flowstate_wire::RequestCode;

use crate::config::ServerConfig;

/// `QueueCapacity`: size of both the free-buffer pool (`lcm`) and the
/// filled-buffer queue (`pcm`).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000_000;
/// `QueueBufferSize`: bytes allocated per pooled buffer on first use.
pub const DEFAULT_BUFFER_SIZE: usize = 1500;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub buffer_size: usize,
    pub workers: usize,
}

impl PipelineConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            workers: config.game_workers,
        }
    }
}

/// A pooled datagram buffer. `data` is lazily sized to `buffer_size` on
/// its first trip through the listener, then reused for the message's
/// lifetime.
struct GameMessage {
    addr: Option<SocketAddr>,
    len: usize,
    data: Vec<u8>,
}

impl GameMessage {
    fn empty() -> Self {
        Self {
            addr: None,
            len: 0,
            data: Vec::new(),
        }
    }
}

fn bind_udp_socket(config: &ServerConfig) -> Result<UdpSocket> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.game_port).parse().unwrap();
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )
    .context("creating UDP socket")?;
    socket.set_nonblocking(true).context("setting UDP socket nonblocking")?;
    if let Some(size) = config.read_buffer_size {
        socket.set_recv_buffer_size(size).context("setting SO_RCVBUF")?;
    }
    if let Some(size) = config.write_buffer_size {
        socket.set_send_buffer_size(size).context("setting SO_SNDBUF")?;
    }
    socket.bind(&addr.into()).context("binding UDP socket")?;
    UdpSocket::from_std(socket.into()).context("adopting UDP socket into tokio runtime")
}

/// Join handles for the listener and worker tasks; dropping or calling
/// [`PipelineHandle::shutdown`] aborts them. In-flight packets may be
/// dropped, matching the cancellation policy in `spec.md` §5.
pub struct PipelineHandle {
    listener: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn shutdown(self) {
        self.listener.abort();
        for worker in self.workers {
            worker.abort();
        }
    }
}

/// Spawns the listener + worker fan-out described in `spec.md` §4.4 and
/// returns immediately with a handle; the pipeline keeps running on the
/// runtime until the handle is shut down.
pub async fn spawn_pipeline(
    config: Arc<ServerConfig>,
    session_table: Arc<SessionTable>,
    counters: Arc<CounterRegistry>,
) -> Result<PipelineHandle> {
    let socket = Arc::new(bind_udp_socket(&config)?);
    let pipeline_config = PipelineConfig::from_server_config(&config);
    Ok(run_pipeline(socket, session_table, counters, pipeline_config))
}

fn run_pipeline(
    socket: Arc<UdpSocket>,
    session_table: Arc<SessionTable>,
    counters: Arc<CounterRegistry>,
    config: PipelineConfig,
) -> PipelineHandle {
    let (lcm_tx, lcm_rx) = mpsc::channel::<GameMessage>(config.queue_capacity.max(1));
    let (pcm_tx, pcm_rx) = mpsc::channel::<GameMessage>(config.queue_capacity.max(1));

    for _ in 0..config.queue_capacity {
        if lcm_tx.try_send(GameMessage::empty()).is_err() {
            break;
        }
    }

    let pcm_rx = Arc::new(Mutex::new(pcm_rx));

    let listener = tokio::spawn(listener_loop(
        socket,
        lcm_rx,
        pcm_tx,
        config.buffer_size,
    ));

    let mut workers = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        workers.push(tokio::spawn(worker_loop(
            pcm_rx.clone(),
            lcm_tx.clone(),
            session_table.clone(),
            counters.clone(),
        )));
    }

    PipelineHandle { listener, workers }
}

async fn listener_loop(
    socket: Arc<UdpSocket>,
    mut lcm_rx: mpsc::Receiver<GameMessage>,
    pcm_tx: mpsc::Sender<GameMessage>,
    buffer_size: usize,
) {
    while let Some(mut msg) = lcm_rx.recv().await {
        if msg.data.is_empty() {
            msg.data = vec![0u8; buffer_size];
        }
        match socket.recv_from(&mut msg.data).await {
            Ok((len, addr)) => {
                msg.len = len;
                msg.addr = Some(addr);
                // Never block the listener: a full pcm means back-pressure
                // should surface as an OS-level drop, not a listener stall.
                if pcm_tx.try_send(msg).is_err() {
                    log::warn!("pcm queue full, dropping datagram");
                }
            }
            Err(e) => log::warn!("udp recvfrom failed: {e}"),
        }
    }
}

async fn worker_loop(
    pcm_rx: Arc<Mutex<mpsc::Receiver<GameMessage>>>,
    lcm_tx: mpsc::Sender<GameMessage>,
    session_table: Arc<SessionTable>,
    counters: Arc<CounterRegistry>,
) {
    // Owned once per worker and reused across every packet it handles, so
    // nonce derivation never allocates past the first datagram.
    let mut nonce_scratch = Vec::new();
    loop {
        let msg = { pcm_rx.lock().await.recv().await };
        let Some(mut msg) = msg else { break };
        if !is_meaningful_v1(msg.len) {
            counters.increment("packets_rejected");
            let _ = lcm_tx.try_send(msg);
            continue;
        }
        let buf = &mut msg.data[..msg.len];
        match verify(&session_table, buf, &mut nonce_scratch) {
            Ok(verified) => {
                counters.increment("packets_handled");
                dispatch(verified.request_code, verified.session.sidx(), &verified.payload, &counters);
            }
            Err(e) => {
                log::debug!("packet rejected: {e}");
                counters.increment("packets_rejected");
            }
        }
        let _ = lcm_tx.try_send(msg);
    }
}

/// Dispatches by request code. Unknown codes are dropped silently.
/// Handlers here only acknowledge the call: gameplay semantics for
/// specific request codes are out of scope for this core.
fn dispatch(request_code: u8, sidx: u32, _payload: &[u8], counters: &CounterRegistry) {
    match RequestCode::from_u8(request_code) {
        Some(code) => {
            log::trace!("dispatch {code:?} sidx={sidx}");
        }
        None => {
            log::debug!("unknown request code {request_code} from sidx {sidx}");
            counters.increment("unknown_request_code");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstate_session::{seal, Session};
    use std::time::Duration;

    #[tokio::test]
    async fn sealed_packet_over_loopback_is_verified_and_counted() {
        let session_table = Arc::new(SessionTable::new());
        let session = session_table
            .new_session(1, |sidx, uid| Session::generate(sidx, uid, 1).ok())
            .unwrap();
        let counters = Arc::new(CounterRegistry::new());

        let server_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = server_socket.local_addr().unwrap();

        let handle = run_pipeline(
            server_socket,
            session_table.clone(),
            counters.clone(),
            PipelineConfig {
                queue_capacity: 8,
                buffer_size: DEFAULT_BUFFER_SIZE,
                workers: 2,
            },
        );

        let client_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut scratch = Vec::new();
        let packet = seal(&session, 1, 1, b"x", &mut scratch).unwrap();
        client_socket.send_to(&packet, server_addr).await.unwrap();

        // give the listener/worker a beat to process the datagram
        tokio::time::sleep(Duration::from_millis(50)).await;
        counters.flush_all();
        assert_eq!(counters.total("packets_handled"), 1);

        handle.shutdown();
    }

    #[tokio::test]
    async fn unknown_request_code_is_counted_but_not_dispatched() {
        let session_table = Arc::new(SessionTable::new());
        let session = session_table
            .new_session(1, |sidx, uid| Session::generate(sidx, uid, 1).ok())
            .unwrap();
        let counters = CounterRegistry::new();
        let mut scratch = Vec::new();
        let mut packet = seal(&session, 1, 99, b"x", &mut scratch).unwrap();
        let verified = verify(&session_table, &mut packet, &mut scratch).unwrap();
        dispatch(verified.request_code, verified.session.sidx(), &verified.payload, &counters);
        counters.flush_all();
        assert_eq!(counters.total("unknown_request_code"), 1);
    }

    #[tokio::test]
    async fn empty_payload_datagram_over_loopback_is_rejected_before_decryption() {
        let session_table = Arc::new(SessionTable::new());
        let session = session_table
            .new_session(1, |sidx, uid| Session::generate(sidx, uid, 1).ok())
            .unwrap();
        let counters = Arc::new(CounterRegistry::new());

        let server_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = server_socket.local_addr().unwrap();

        let handle = run_pipeline(
            server_socket,
            session_table.clone(),
            counters.clone(),
            PipelineConfig {
                queue_capacity: 8,
                buffer_size: DEFAULT_BUFFER_SIZE,
                workers: 2,
            },
        );

        let client_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut scratch = Vec::new();
        // a minimum-length packet carries no payload byte, so the
        // is_meaningful_v1 pre-filter should drop it before it ever
        // reaches verify's AEAD open.
        let packet = seal(&session, 1, 1, b"", &mut scratch).unwrap();
        client_socket.send_to(&packet, server_addr).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        counters.flush_all();
        assert_eq!(counters.total("packets_handled"), 0);
        assert_eq!(counters.total("packets_rejected"), 1);

        handle.shutdown();
    }
}
