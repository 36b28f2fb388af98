use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{error, info, warn};

use crate::batch_processor;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::lottery::LotteryState;
use crate::protocol::{self, keys, wire, Record};
use crate::store::BetStore;
use crate::work_queue::WorkQueue;

/// How long the accept loop sleeps between polls of a nonblocking listener
/// when no connection is pending, bounding SIGTERM observation latency.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const SESSION_READ_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_CONSECUTIVE_ACCEPT_FAILURES: u32 = 5;

/// What a session hands back to its worker: either the session already closed
/// the socket (`Closed`), or it read a FINISH and the worker must hand the
/// still-open socket to the lottery state (`Parked`) rather than close it.
enum ConnectionOutcome {
    Closed,
    Parked { conn: TcpStream, agency_id: String, addr: String },
}

/// Shared state every worker and the accept loop hold a clone of.
pub struct Server {
    listener: TcpListener,
    store: Arc<dyn BetStore + Send + Sync>,
    lottery: Arc<LotteryState>,
    running: Arc<AtomicBool>,
    worker_count: usize,
}

impl Server {
    pub fn bind(
        config: &ServerConfig,
        store: Arc<dyn BetStore + Send + Sync>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        let backlog = i32::try_from(config.listen_backlog).unwrap_or(i32::MAX);
        socket.listen(backlog)?;
        socket.set_nonblocking(true)?;
        let listener: TcpListener = socket.into();

        info!(
            port = config.port,
            backlog = config.listen_backlog,
            clients = config.clients,
            action = "bind",
            result = "success"
        );

        Ok(Server {
            listener,
            store,
            lottery: Arc::new(LotteryState::new(config.clients)),
            running: Arc::new(AtomicBool::new(true)),
            worker_count: config.clients,
        })
    }

    /// Returns a handle that flips `running` to `false`; intended to be
    /// called from a signal handler.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Runs the accept loop and the worker pool to completion. Blocks until
    /// shutdown is requested and every worker has drained.
    pub fn run(self) -> Result<(), ServerError> {
        let queue: Arc<WorkQueue<Option<TcpStream>>> = Arc::new(WorkQueue::new(0));

        let workers: Vec<_> = (0..self.worker_count)
            .map(|id| {
                let queue = queue.clone();
                let store = self.store.clone();
                let lottery = self.lottery.clone();
                let running = self.running.clone();
                thread::spawn(move || worker_loop(id, queue, store, lottery, running))
            })
            .collect();

        self.accept_loop(&queue);

        for _ in 0..self.worker_count {
            queue.put(None);
        }
        queue.join();
        for worker in workers {
            if worker.join().is_err() {
                error!(action = "worker_join", result = "fail");
            }
        }

        info!(action = "shutdown", result = "success");
        Ok(())
    }

    fn accept_loop(&self, queue: &Arc<WorkQueue<Option<TcpStream>>>) {
        let mut consecutive_failures = 0u32;
        while self.running.load(Ordering::SeqCst) {
            match accept_with_timeout(&self.listener) {
                Ok(Some(stream)) => {
                    consecutive_failures = 0;
                    queue.put(Some(stream));
                }
                Ok(None) => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    consecutive_failures += 1;
                    warn!(error = %err, action = "accept", result = "fail", consecutive_failures);
                    if consecutive_failures >= MAX_CONSECUTIVE_ACCEPT_FAILURES {
                        error!(action = "accept_loop", result = "giving_up");
                        break;
                    }
                }
            }
        }
    }
}

/// The listener is nonblocking, so `accept` returns `WouldBlock` immediately
/// when nothing is pending rather than actually waiting; `Ok(None)` tells the
/// caller to sleep and re-check `running` instead of busy-looping.
fn accept_with_timeout(listener: &TcpListener) -> std::io::Result<Option<TcpStream>> {
    match listener.accept() {
        Ok((stream, _addr)) => Ok(Some(stream)),
        Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn worker_loop(
    id: usize,
    queue: Arc<WorkQueue<Option<TcpStream>>>,
    store: Arc<dyn BetStore + Send + Sync>,
    lottery: Arc<LotteryState>,
    running: Arc<AtomicBool>,
) {
    loop {
        let item = queue.get();
        let stream = match item {
            None => {
                info!(worker = id, action = "worker_exit", result = "success");
                if queue.task_done().is_err() {
                    error!(worker = id, action = "task_done", result = "fail");
                }
                break;
            }
            Some(stream) => stream,
        };

        let store_for_session = store.clone();
        let running_for_session = running.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_session(stream, store_for_session.as_ref(), &running_for_session)
        }));

        match outcome {
            Ok(ConnectionOutcome::Parked { conn, agency_id, addr }) => {
                let fired =
                    lottery.register_and_try_to_start(&agency_id, conn, addr, store.as_ref());
                // A FINISH arriving after the draw already ran still needs a
                // notifier pass: it was just parked above, but
                // `register_and_try_to_start` returns `false` for it since
                // the draw itself doesn't run again.
                if fired || lottery.is_done() {
                    spawn_notifier(lottery.clone());
                }
            }
            Ok(ConnectionOutcome::Closed) => {}
            Err(_) => {
                error!(worker = id, action = "session", result = "panic");
            }
        }

        if queue.task_done().is_err() {
            error!(worker = id, action = "task_done", result = "fail");
        }
    }
}

fn run_session(
    mut conn: TcpStream,
    store: &dyn BetStore,
    running: &AtomicBool,
) -> ConnectionOutcome {
    let addr = conn
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    conn.set_read_timeout(Some(SESSION_READ_TIMEOUT)).ok();

    loop {
        let payload = match wire::recv_frame(&mut conn) {
            Ok(payload) => payload,
            Err(ServerError::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if !running.load(Ordering::SeqCst) {
                    return ConnectionOutcome::Closed;
                }
                continue;
            }
            Err(err) => {
                warn!(peer_addr = %addr, error = %err, action = "recv_frame", result = "fail");
                return ConnectionOutcome::Closed;
            }
        };

        let record = protocol::record::decode(&payload);

        if let Some(declared) = record.get(keys::BATCH_SIZE) {
            let declared: usize = match declared.parse() {
                Ok(n) => n,
                Err(_) => {
                    respond_error(&mut conn, &addr, "invalid BATCH_SIZE");
                    continue;
                }
            };
            let (_, inner_records) = protocol::batch::decode_batch(&record);
            let result = batch_processor::process_batch(declared, &inner_records);

            if result.ok {
                if let Err(err) = store.store_bets(&result.bets) {
                    warn!(peer_addr = %addr, error = %err, action = "store_bets", result = "fail");
                    respond_error(&mut conn, &addr, &err.to_string());
                    continue;
                }
                info!(
                    peer_addr = %addr,
                    count = result.bets.len(),
                    action = "store_bets",
                    result = "success"
                );
                respond_success(&mut conn, &addr, &result.message);
            } else {
                respond_error(&mut conn, &addr, &result.message);
            }
            continue;
        }

        if record.get(keys::ACTION) == Some(keys::FINISH_BETTING) {
            let agency_id = record.get(keys::AGENCY_ID).unwrap_or_default().to_string();
            info!(peer_addr = %addr, agency_id, action = "finish_betting", result = "received");
            return ConnectionOutcome::Parked { conn, agency_id, addr };
        }

        respond_error(&mut conn, &addr, "unrecognized message");
    }
}

fn respond_success(conn: &mut TcpStream, addr: &str, message: &str) {
    let mut record = Record::new();
    record
        .insert(keys::STATUS, keys::STATUS_SUCCESS)
        .insert(keys::MESSAGE, message);
    send_record(conn, addr, &record);
}

fn respond_error(conn: &mut TcpStream, addr: &str, message: &str) {
    let mut record = Record::new();
    record
        .insert(keys::STATUS, keys::STATUS_ERROR)
        .insert(keys::MESSAGE, message);
    send_record(conn, addr, &record);
}

fn send_record(conn: &mut TcpStream, addr: &str, record: &Record) {
    let payload = protocol::record::encode(record);
    if let Err(err) = wire::send_frame(conn, &payload) {
        warn!(peer_addr = %addr, error = %err, action = "send_frame", result = "fail");
    }
}

/// Spawned on a dedicated thread by whichever worker's `register_and_try_to_start`
/// returned `true`, so that worker returns to the pool immediately rather than
/// blocking on notification I/O.
fn spawn_notifier(lottery: Arc<LotteryState>) {
    thread::spawn(move || notify_waiting_clients(&lottery));
}

fn notify_waiting_clients(lottery: &LotteryState) {
    let waiters = lottery.take_waiting_clients();
    for (agency_id, waiter) in waiters {
        let winners = lottery
            .get_winners_for_agency(&agency_id)
            .unwrap_or_default();

        let mut record = Record::new();
        record
            .insert(keys::STATUS, keys::STATUS_SUCCESS)
            .insert(keys::WINNERS, winners.join(","));

        let mut conn = waiter.conn;
        if let Err(err) = wire::send_frame(&mut conn, &protocol::record::encode(&record)) {
            warn!(
                peer_addr = %waiter.addr,
                agency_id,
                error = %err,
                action = "notify",
                result = "fail"
            );
        } else {
            info!(
                peer_addr = %waiter.addr,
                agency_id,
                winners = winners.len(),
                action = "notify",
                result = "success"
            );
        }
        let _ = conn.shutdown(std::net::Shutdown::Both);
    }
}
