//! Fake admin daemon listening on a Unix socket.
//!
//! Accepts one connection per canned response, records the raw request bytes
//! (read until the client half-closes), and replies with the response.

use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

pub(crate) struct FakeDaemon {
    _dir: TempDir,
    socket: Utf8PathBuf,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    handle: Option<thread::JoinHandle<Result<()>>>,
}

impl FakeDaemon {
    /// Spawns a daemon answering one connection per entry of `responses`.
    pub(crate) fn spawn(responses: Vec<Vec<u8>>) -> Result<Self> {
        let dir = TempDir::new().context("create socket dir")?;
        let socket = Utf8PathBuf::from_path_buf(dir.path().join("qubesd.sock"))
            .map_err(|path| anyhow!("non-UTF-8 socket path {}", path.display()))?;
        let listener = UnixListener::bind(&socket).context("bind fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let handle = thread::spawn(move || Self::serve(&listener, responses, &recorded));
        Ok(Self {
            _dir: dir,
            socket,
            requests,
            handle: Some(handle),
        })
    }

    pub(crate) fn socket(&self) -> &Utf8Path {
        &self.socket
    }

    /// Waits for the daemon thread and returns every recorded request.
    pub(crate) fn take_requests(&mut self) -> Result<Vec<Vec<u8>>> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("fake daemon thread panicked"))?
                .context("fake daemon failed")?;
        }
        let requests = self
            .requests
            .lock()
            .map_err(|error| anyhow!("lock requests: {error}"))?;
        Ok(requests.clone())
    }

    fn serve(
        listener: &UnixListener,
        responses: Vec<Vec<u8>>,
        requests: &Arc<Mutex<Vec<Vec<u8>>>>,
    ) -> Result<()> {
        for response in responses {
            let Some(stream) = Self::accept(listener)? else {
                return Ok(());
            };
            Self::answer(stream, &response, requests)?;
        }
        Ok(())
    }

    fn accept(listener: &UnixListener) -> Result<Option<UnixStream>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match listener.accept() {
                Ok((stream, _)) => return Ok(Some(stream)),
                Err(ref error)
                    if error.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline =>
                {
                    thread::sleep(Duration::from_millis(10));
                }
                // Nobody connected; the client under test gave up before I/O.
                Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(error) => return Err(error).context("accept connection"),
            }
        }
    }

    fn answer(
        mut stream: UnixStream,
        response: &[u8],
        requests: &Arc<Mutex<Vec<Vec<u8>>>>,
    ) -> Result<()> {
        stream
            .set_nonblocking(false)
            .context("blocking connection")?;
        let mut request = Vec::new();
        stream
            .read_to_end(&mut request)
            .context("read request")?;
        requests
            .lock()
            .map_err(|error| anyhow!("lock requests: {error}"))?
            .push(request);
        stream.write_all(response).context("write response")?;
        Ok(())
    }
}
