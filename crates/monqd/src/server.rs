//! The socket server: one acceptor, a fixed pool of client threads, and a
//! bounded hand-over queue between them.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use monq_core::core::ExecContext;
use monq_core::counters::{Counter, Counters};
use monq_core::output::{OutputBuffer, ResponseCode};
use monq_core::store::Store;
use monq_core::triggers::Triggers;

use crate::commands::CommandDispatcher;
use crate::config::Config;
use crate::core::EmbeddedCore;
use crate::input::{InputBuffer, Request};

/// Pending connections between acceptor and workers. When all workers are
/// busy and the queue is full, the oldest queued connection is dropped so
/// the newest gets served.
struct ClientQueue {
    inner: Mutex<VecDeque<UnixStream>>,
    ready: Condvar,
    capacity: usize,
}

impl ClientQueue {
    fn new(capacity: usize) -> ClientQueue {
        ClientQueue {
            inner: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Returns true when an older connection had to be dropped.
    fn push(&self, stream: UnixStream) -> bool {
        let mut queue = self.inner.lock().unwrap();
        let mut overflowed = false;
        if queue.len() >= self.capacity {
            queue.pop_front();
            overflowed = true;
        }
        queue.push_back(stream);
        self.ready.notify_one();
        overflowed
    }

    fn pop(&self, should_terminate: &AtomicBool) -> Option<UnixStream> {
        let mut queue = self.inner.lock().unwrap();
        loop {
            if let Some(stream) = queue.pop_front() {
                return Some(stream);
            }
            if should_terminate.load(Ordering::Relaxed) {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(queue, Duration::from_millis(100))
                .unwrap();
            queue = guard;
        }
    }
}

pub struct Server {
    pub config: Config,
    pub core: Arc<EmbeddedCore>,
    pub store: Arc<Store>,
    pub counters: Arc<Counters>,
    pub triggers: Arc<Triggers>,
    pub should_terminate: Arc<AtomicBool>,
}

fn bind_socket(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o660))?;
    Ok(listener)
}

impl Server {
    /// Bind, start the thread pool and serve until the termination flag is
    /// set. Failing to bind the socket is fatal.
    pub fn run(self) -> io::Result<()> {
        let listener = bind_socket(&self.config.paths.query_socket)?;
        listener.set_nonblocking(true)?;
        info!(
            socket = %self.config.paths.query_socket.display(),
            threads = self.config.num_client_threads,
            "serving status queries"
        );

        let queue = Arc::new(ClientQueue::new(self.config.num_client_threads * 2));
        let dispatcher = Arc::new(CommandDispatcher::new());
        let mut workers = Vec::new();
        for i in 0..self.config.num_client_threads {
            let queue = Arc::clone(&queue);
            let core = Arc::clone(&self.core);
            let store = Arc::clone(&self.store);
            let counters = Arc::clone(&self.counters);
            let triggers = Arc::clone(&self.triggers);
            let should_terminate = Arc::clone(&self.should_terminate);
            let dispatcher = Arc::clone(&dispatcher);
            let config = self.config.clone();
            let builder = thread::Builder::new()
                .name(format!("client-{i}"))
                .stack_size(self.config.thread_stack_size);
            workers.push(builder.spawn(move || {
                client_thread(
                    &queue,
                    &core,
                    &store,
                    &counters,
                    &triggers,
                    &should_terminate,
                    &dispatcher,
                    &config,
                );
            })?);
        }

        while !self.should_terminate.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    self.counters.increment(Counter::Connections);
                    if queue.push(stream) {
                        self.counters.increment(Counter::Overflows);
                        warn!("connection queue overflow, dropped oldest queued connection");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.counters.do_statistics();
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    error!(error = %e, "cannot accept client connection");
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        info!("socket thread has terminated");
        for worker in workers {
            if worker.join().is_err() {
                error!("client thread panicked");
            }
        }
        let _ = fs::remove_file(&self.config.paths.query_socket);
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn client_thread(
    queue: &ClientQueue,
    core: &Arc<EmbeddedCore>,
    store: &Store,
    counters: &Counters,
    triggers: &Triggers,
    should_terminate: &AtomicBool,
    dispatcher: &CommandDispatcher,
    config: &Config,
) {
    while !should_terminate.load(Ordering::Relaxed) {
        let Some(stream) = queue.pop(should_terminate) else {
            continue;
        };
        debug!("accepted client connection");
        if let Err(e) = handle_connection(
            stream,
            core,
            store,
            counters,
            triggers,
            should_terminate,
            dispatcher,
            config,
        ) {
            debug!(error = %e, "client connection ended with error");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_connection(
    stream: UnixStream,
    core: &Arc<EmbeddedCore>,
    store: &Store,
    counters: &Counters,
    triggers: &Triggers,
    should_terminate: &AtomicBool,
    dispatcher: &CommandDispatcher,
    config: &Config,
) -> io::Result<()> {
    let mut write_half = stream.try_clone()?;
    let mut input = InputBuffer::new(stream, config.query_timeout, config.idle_timeout);
    let ctx = ExecContext {
        core: core.as_ref(),
        counters,
        triggers,
        log_cache: store.log_cache(),
        should_terminate,
    };

    let mut keepalive = true;
    while keepalive && !should_terminate.load(Ordering::Relaxed) {
        match input.read_request() {
            Request::Closed => break,
            Request::Incomplete => {
                let mut output = OutputBuffer::new();
                output.set_error(
                    ResponseCode::IncompleteRequest,
                    "client did not finish the request in time",
                );
                output.flush(&mut write_half)?;
                break;
            }
            Request::Invalid(line) => {
                warn!(line, "terminating client connection: invalid request");
                let mut output = OutputBuffer::new();
                output.set_error(
                    ResponseCode::InvalidRequest,
                    "terminating client connection: invalid request method",
                );
                output.flush(&mut write_half)?;
                break;
            }
            Request::Command(line) => {
                counters.increment(Counter::Commands);
                info!(command = %line, "request");
                // commands never produce a response body
                dispatcher.dispatch(core.as_ref(), &line);
            }
            Request::Get { table, headers } => {
                counters.increment(Counter::Requests);
                info!(table = %table, headers = headers.len(), "request");
                debug!(?headers, "request headers");
                let mut output = OutputBuffer::new();
                keepalive = store.answer_get_request(&ctx, &headers, &mut output, &table);
                output.flush(&mut write_half)?;
            }
        }
        counters.do_statistics();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_pair() -> UnixStream {
        UnixStream::pair().unwrap().0
    }

    #[test]
    fn queue_hands_out_in_fifo_order() {
        let queue = ClientQueue::new(4);
        let terminate = AtomicBool::new(false);
        assert!(!queue.push(stream_pair()));
        assert!(!queue.push(stream_pair()));
        assert!(queue.pop(&terminate).is_some());
        assert!(queue.pop(&terminate).is_some());
    }

    #[test]
    fn overflow_drops_the_oldest_queued_connection() {
        let queue = ClientQueue::new(2);
        assert!(!queue.push(stream_pair()));
        assert!(!queue.push(stream_pair()));
        // full: the oldest is dropped so the newest gets served
        assert!(queue.push(stream_pair()));
        let guard = queue.inner.lock().unwrap();
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn pop_returns_none_on_termination() {
        let queue = ClientQueue::new(2);
        let terminate = AtomicBool::new(true);
        assert!(queue.pop(&terminate).is_none());
    }

    #[test]
    fn bind_socket_replaces_a_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live");
        let first = bind_socket(&path).unwrap();
        drop(first);
        // the stale file is still there; binding again must succeed
        assert!(path.exists());
        let second = bind_socket(&path);
        assert!(second.is_ok());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o660);
    }
}
