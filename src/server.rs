//! The acceptor: owns the listening socket, starts the worker pool and
//! round-robins accepted connections to it.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Socket, Type};

use crate::address::Address;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::error::Result;
use crate::responder::{Responder, ResponderList};
use crate::worker::{RoutingTable, Worker};

const ACCEPT_TOKEN: Token = Token(usize::MAX);

/// How often the acceptor's own wait wakes up to check `running`, so
/// `stop()` can interrupt an otherwise indefinite accept wait.
const ACCEPT_POLL_INTERVAL_MS: u64 = 1_000;

pub struct Server {
    listener: TcpListener,
    workers: Vec<Worker>,
    next_worker: usize,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
}

impl Server {
    /// Binds the listening socket (SO_REUSEADDR, backlog 0), registers it
    /// with `poll`, and spins up `config.workers` worker threads sharing
    /// the given responders and virtual-host table.
    ///
    /// `poll` is the caller's own `Poll` instance; the acceptor registers
    /// its listening socket on it and later polls it directly in `run`.
    pub fn new(config: AppConfig, responders: Vec<Box<dyn Responder>>, poll: &Poll) -> Result<Self> {
        let address = Address::resolve(&config.host)?;
        let socket_addr = SocketAddr::new(address.ip(), config.port);

        let domain = if socket_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&socket_addr.into())?;
        socket.listen(0)?;
        socket.set_nonblocking(true)?;

        let std_listener: std::net::TcpListener = socket.into();
        let mut listener = TcpListener::from_std(std_listener);
        poll.registry().register(&mut listener, ACCEPT_TOKEN, Interest::READABLE)?;

        let mut responder_list = ResponderList::new();
        for responder in responders {
            responder_list.attach(responder);
        }
        let routing = Arc::new(RoutingTable {
            responders: responder_list,
            vhosts: config.vhosts.clone(),
            default_root: config.default_root.clone(),
        });

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let worker_count = config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            workers.push(Worker::spawn(id, Arc::clone(&routing), Arc::clone(&clock))?);
        }

        xviweb_log::info!("listening on {socket_addr} with {worker_count} worker(s)");

        Ok(Self {
            listener,
            workers,
            next_worker: 0,
            clock,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// The actual bound port, useful when `config.port == 0` asked the OS
    /// to pick an ephemeral one.
    pub fn local_port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    /// Runs the accept loop until `stop` is called. Consumes `poll` since
    /// nothing else needs it once the loop owns it.
    pub fn run(&mut self, mut poll: Poll) -> Result<()> {
        let mut events = Events::with_capacity(16);

        while self.running.load(Ordering::Acquire) {
            poll.poll(&mut events, Some(std::time::Duration::from_millis(ACCEPT_POLL_INTERVAL_MS)))?;

            for event in events.iter() {
                if event.token() != ACCEPT_TOKEN {
                    continue;
                }
                loop {
                    match self.listener.accept() {
                        Ok((stream, remote)) => self.hand_off(stream, remote),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            xviweb_log::warn!("accept failed: {e}");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn hand_off(&mut self, stream: mio::net::TcpStream, remote: SocketAddr) {
        let worker = &self.workers[self.next_worker];
        self.next_worker = (self.next_worker + 1) % self.workers.len();

        if let Err(e) = worker.add_connection(stream, remote, self.clock.as_ref()) {
            xviweb_log::warn!("failed to hand connection to worker: {e}");
        }
    }

    /// Stops accepting and tears down every worker, joining their threads.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        for worker in &mut self.workers {
            worker.stop();
        }
    }
}
