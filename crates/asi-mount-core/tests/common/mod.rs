//! Scripted in-memory link shared by the integration tests
#![allow(dead_code)]

use asi_mount_core::config::MountConfig;
use asi_mount_core::mount::{LinkOpener, Mount, MountOptions};
use asi_mount_core::protocol::{Channel, ChannelTiming, Link, ProtocolError};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What happened on the link, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(String),
    Read,
}

#[derive(Default)]
struct Script {
    once: HashMap<String, VecDeque<Vec<u8>>>,
    always: HashMap<String, Vec<u8>>,
    pending: VecDeque<u8>,
    log: Vec<Event>,
    /// Every timeout passed to `set_timeout`, in order
    timeouts: Vec<Duration>,
    fail_writes: bool,
    /// Bytes still delivered before reads start failing; `None` never fails
    read_budget: Option<usize>,
}

/// Link that answers commands from a script. Reads never block: an empty
/// buffer reports a timeout immediately.
#[derive(Clone, Default)]
pub struct ScriptedLink {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `command` with `reply` (once, before any `always` reply)
    pub fn respond(&self, command: &str, reply: &[u8]) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .once
            .entry(command.to_string())
            .or_default()
            .push_back(reply.to_vec());
        self
    }

    /// Answer every `command` with `reply`
    pub fn always(&self, command: &str, reply: &[u8]) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .always
            .insert(command.to_string(), reply.to_vec());
        self
    }

    /// Put unsolicited bytes on the line
    pub fn push_stray(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().pending.extend(bytes.iter().copied());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    /// Fail every read from now on (`false` restores normal reads)
    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().read_budget = fail.then_some(0);
    }

    /// Deliver `bytes` more bytes, then fail every read
    pub fn fail_reads_after(&self, bytes: usize) {
        self.inner.lock().unwrap().read_budget = Some(bytes);
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().timeouts.clone()
    }

    pub fn log(&self) -> Vec<Event> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn clear_log(&self) {
        let mut script = self.inner.lock().unwrap();
        script.log.clear();
        script.timeouts.clear();
    }

    /// Commands written so far
    pub fn writes(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write(cmd) => Some(cmd),
                Event::Read => None,
            })
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.writes().iter().filter(|c| *c == command).count()
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut script = self.inner.lock().unwrap();
        script.log.push(Event::Read);
        if script.read_budget == Some(0) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "link lost"));
        }
        match script.pending.pop_front() {
            Some(b) => {
                if let Some(budget) = script.read_budget.as_mut() {
                    *budget -= 1;
                }
                buf[0] = b;
                Ok(1)
            }
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
        }
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut script = self.inner.lock().unwrap();
        if script.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"));
        }
        let command = String::from_utf8_lossy(buf).into_owned();
        script.log.push(Event::Write(command.clone()));
        let reply = match script.once.get_mut(&command).and_then(|q| q.pop_front()) {
            Some(reply) => Some(reply),
            None => script.always.get(&command).cloned(),
        };
        if let Some(reply) = reply {
            script.pending.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for ScriptedLink {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.inner.lock().unwrap().timeouts.push(timeout);
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Mount over a scripted link with default options
pub fn mount(link: &ScriptedLink) -> Mount {
    mount_with(link, MountOptions::default())
}

pub fn mount_with(link: &ScriptedLink, options: MountOptions) -> Mount {
    let channel = Channel::new(Box::new(link.clone()), ChannelTiming::default());
    Mount::new(channel, options)
}

/// Replies of a healthy, initialized AM5 at rest
pub fn healthy(link: &ScriptedLink) -> &ScriptedLink {
    link.always(":GVP#", b"AM5#")
        .always(":GV#", b"1.1.2#")
        .always(":Ggr#", b"0.50#")
        .always(":GU#", b"NG#")
        .always(":Gm#", b"W#")
        .always(":GR#", b"05:30:00#")
        .always(":GD#", b"+45*30:00#")
        .always(":Gt#", b"+50*06#")
        .always(":Gg#", b"345*30#")
        .always(":GC#", b"06/15/23#")
        .always(":GL#", b"10:00:00#")
        .always(":GG#", b"-02#")
        .always(":GT#", b"0#")
        .always(":GBu#", b"1#")
}

/// Opener handing out the same scripted link and counting opens
#[derive(Clone, Default)]
pub struct ScriptedOpener {
    pub link: ScriptedLink,
    pub opens: Arc<AtomicUsize>,
}

impl ScriptedOpener {
    pub fn new(link: ScriptedLink) -> Self {
        Self {
            link,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl LinkOpener for ScriptedOpener {
    fn open(&self, _config: &MountConfig) -> Result<Box<dyn Link>, ProtocolError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.link.clone()))
    }
}

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
