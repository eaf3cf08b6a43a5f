//! The worker event loop: owns a disjoint set of connections, multiplexes
//! their sockets with `mio`, advances each connection's parse state, and
//! re-enters responder continuations on schedule.
//!
//! A self-pipe (`mio::unix::pipe`) is registered alongside connection
//! sockets in the same wait set; `add_connection` writes the wake-up byte
//! *before* taking the connections lock, bounding how long a caller handing
//! off a new connection can be made to wait. Each `cycle` computes a `done`
//! flag per connection, re-enters due continuations, and folds each future
//! wake-up into a shared sleep cap for the next poll.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use mio::net::TcpStream;
use mio::unix::pipe;
use mio::{Events, Interest, Poll, Token};

use crate::address::Address;
use crate::clock::Clock;
use crate::connection::Connection;
use crate::http::http_connection::{ConnState, HttpConnection};
use crate::http::response::HttpResponse;
use crate::responder::{dispatch, ResponderContext, ResponderList};

const IDLE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SLEEP_CAP_MS: u64 = 1_000;
const PIPE_TOKEN: Token = Token(0);

struct WorkerConnection {
    http: HttpConnection,
    token: Token,
    response: Option<HttpResponse>,
    context: Option<Box<dyn ResponderContext>>,
    wakeup_at: Option<u64>,
}

/// Shared, immutable routing inputs handed to every worker at construction
/// and never mutated afterwards.
pub struct RoutingTable {
    pub responders: ResponderList,
    pub vhosts: HashMap<String, String>,
    pub default_root: Option<String>,
}

pub struct Worker {
    connections: Arc<Mutex<Vec<WorkerConnection>>>,
    pipe_sender: Mutex<pipe::Sender>,
    registry: mio::Registry,
    next_token: AtomicUsize,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(
        id: usize,
        routing: Arc<RoutingTable>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let (pipe_sender, mut pipe_receiver) = pipe::new()?;
        poll.registry().register(&mut pipe_receiver, PIPE_TOKEN, Interest::READABLE)?;

        let registry = poll.registry().try_clone()?;
        let connections: Arc<Mutex<Vec<WorkerConnection>>> = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));

        let thread_connections = Arc::clone(&connections);
        let thread_running = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name(format!("xviweb-worker-{id}"))
            .spawn(move || {
                run(poll, pipe_receiver, thread_connections, thread_running, routing, clock)
            })?;

        Ok(Self {
            connections,
            pipe_sender: Mutex::new(pipe_sender),
            registry,
            next_token: AtomicUsize::new(1),
            running,
            handle: Some(handle),
        })
    }

    /// Hands a freshly accepted socket to this worker. Pokes the self-pipe
    /// before taking the connections lock: the running cycle, which holds
    /// the lock for its whole duration, will see the new entry no later
    /// than the next wait round-trip.
    pub fn add_connection(
        &self,
        mut mio_stream: TcpStream,
        remote_addr: std::net::SocketAddr,
        clock: &dyn Clock,
    ) -> io::Result<()> {
        if let Ok(mut sender) = self.pipe_sender.lock() {
            if let Err(e) = sender.write_all(&[0]) {
                if e.kind() != io::ErrorKind::WouldBlock {
                    xviweb_log::warn!("self-pipe write failed: {e}");
                }
            }
        }

        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.registry.register(&mut mio_stream, token, Interest::READABLE)?;

        let remote = Address::from_ip(remote_addr.ip());
        let connection = Connection::new(mio_stream, remote, remote_addr.port(), clock);
        let http = HttpConnection::new(connection);

        let mut list = self.connections.lock().unwrap();
        list.push(WorkerConnection {
            http,
            token,
            response: None,
            context: None,
            wakeup_at: None,
        });
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Ok(mut sender) = self.pipe_sender.lock() {
            let _ = sender.write_all(&[0]);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut poll: Poll,
    mut pipe_receiver: pipe::Receiver,
    connections: Arc<Mutex<Vec<WorkerConnection>>>,
    running: Arc<AtomicBool>,
    routing: Arc<RoutingTable>,
    clock: Arc<dyn Clock>,
) {
    let mut events = Events::with_capacity(128);

    while running.load(Ordering::Acquire) {
        if let Err(e) = cycle(&mut poll, &mut events, &mut pipe_receiver, &connections, &routing, clock.as_ref()) {
            xviweb_log::warn!("worker cycle error: {e}");
        }
    }
}

fn cycle(
    poll: &mut Poll,
    events: &mut Events,
    pipe_receiver: &mut pipe::Receiver,
    connections: &Arc<Mutex<Vec<WorkerConnection>>>,
    routing: &RoutingTable,
    clock: &dyn Clock,
) -> io::Result<()> {
    // The lock is held across the wait primitive itself: a deliberate
    // choice enabled by the self-pipe wake-up bounding the acceptor's
    // stall to one wait round-trip (see `add_connection`).
    let mut list = connections.lock().unwrap();
    let now = clock.now_ms();
    let mut sleep_cap = DEFAULT_SLEEP_CAP_MS;

    let mut i = 0;
    while i < list.len() {
        let since_read = list[i].http.connection.ms_since_last_read(clock);
        let done = list[i].http.state == ConnState::Done
            || (list[i].http.state != ConnState::SendingResponse && since_read > IDLE_TIMEOUT_MS);

        if done {
            let mut wc = list.swap_remove(i);
            let _ = poll.registry().deregister(&mut wc.http.connection.stream);
            continue;
        }

        if let Some(wakeup) = list[i].wakeup_at {
            if now >= wakeup {
                reenter_context(&mut list[i], now);
            } else {
                sleep_cap = sleep_cap.min(wakeup.saturating_sub(now));
            }
        }
        i += 1;
    }

    poll.poll(events, Some(Duration::from_millis(sleep_cap)))?;

    for event in events.iter() {
        if event.token() == PIPE_TOKEN {
            drain_pipe(pipe_receiver);
            continue;
        }
        let token = event.token();
        if let Some(idx) = list.iter().position(|wc| wc.token == token) {
            service_connection(&mut list[idx], routing, clock);
        }
    }

    Ok(())
}

fn drain_pipe(receiver: &mut pipe::Receiver) {
    let mut buf = [0u8; 64];
    loop {
        match receiver.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

fn reenter_context(wc: &mut WorkerConnection, now: u64) {
    let mut context = match wc.context.take() {
        Some(c) => c,
        None => return,
    };
    let response = match wc.response.as_mut() {
        Some(r) => r,
        None => return,
    };

    let next = context.continue_response(&wc.http.request, response);
    if let Some(response) = wc.response.as_mut() {
        let out = response.take_output();
        if !out.is_empty() {
            wc.http.connection.send(&out);
        }
    }

    match next {
        Some(new_context) => {
            let interval = new_context.response_interval();
            wc.wakeup_at = Some(now + interval);
            wc.context = Some(new_context);
        }
        None => {
            // No further continuation: the responder is done driving this
            // connection, so it is torn down regardless of whether it
            // called `end_response` itself.
            wc.context = None;
            wc.wakeup_at = None;
            wc.http.state = ConnState::Done;
        }
    }
}

fn service_connection(wc: &mut WorkerConnection, routing: &RoutingTable, clock: &dyn Clock) {
    let outcome = match wc.http.connection.read_once(clock) {
        Ok(o) => o,
        Err(e) => {
            xviweb_log::warn!("{}: read error: {e}", wc.http.connection.remote);
            wc.http.state = ConnState::Done;
            return;
        }
    };

    if outcome.closed {
        wc.http.state = ConnState::Done;
        return;
    }

    if !outcome.data.is_empty() {
        wc.http.on_read(&outcome.data);
    }

    if let Some(error_output) = wc.http.take_error_output() {
        wc.http.connection.send(&error_output);
        return;
    }

    if wc.http.state == ConnState::ReceivedRequest {
        let mut response = HttpResponse::new();
        let context = dispatch(
            &routing.responders,
            &routing.vhosts,
            routing.default_root.as_deref(),
            &mut wc.http.request,
            &mut response,
        );
        wc.http.state = ConnState::SendingResponse;
        wc.response = Some(response);
        wc.context = context;

        let now = clock.now_ms();
        if let Some(ctx) = wc.context.as_ref() {
            let interval = ctx.response_interval();
            wc.wakeup_at = Some(now + interval);
        } else {
            wc.wakeup_at = None;
        }
        flush_response(wc, now);
    }
}

fn flush_response(wc: &mut WorkerConnection, _now: u64) {
    let done = if let Some(response) = wc.response.as_mut() {
        let out = response.take_output();
        if !out.is_empty() {
            wc.http.connection.send(&out);
        }
        response.is_done()
    } else {
        false
    };
    if done && wc.context.is_none() {
        wc.http.state = ConnState::Done;
    }
}
