//! links.rs
//! Concrete `RadioPort`s.
//! - `SerialRadio`: the radio modem on a UART (serialport crate, 10 ms timeout)
//! - `ConsoleRadio`: stdin/stdout, for bench runs without a modem

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    thread,
    time::Duration,
};
use crossbeam::channel::{unbounded, Receiver, TryRecvError};
use log::{info, warn};
use serialport::SerialPort;

use crate::hardware::RadioPort;

pub struct SerialRadio {
    port: Box<dyn SerialPort>,
}

impl SerialRadio {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()?;
        info!("[Link] serial radio on {} @ {} baud", port_name, baud_rate);
        Ok(Self { port })
    }
}

impl RadioPort for SerialRadio {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let n = self.port.write(bytes)?;
        self.port.flush()?;
        Ok(n)
    }
}

/// Ground link over the terminal. A reader thread forwards stdin bytes over a
/// channel so `bytes_available` never blocks.
pub struct ConsoleRadio {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    closed: bool,
}

impl ConsoleRadio {
    pub fn spawn() -> Self {
        let (tx, rx) = unbounded();
        let spawned = thread::Builder::new()
            .name("console_rx".into())
            .spawn(move || {
                let stdin = io::stdin();
                let mut handle = stdin.lock();
                let mut buf = [0u8; 256];
                loop {
                    match handle.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            warn!("[Link] stdin read failed: {}", e);
                            break;
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("[Link] console reader not started: {}", e);
        }
        Self {
            rx,
            pending: VecDeque::new(),
            closed: false,
        }
    }

    fn pull(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(bytes) => self.pending.extend(bytes),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        info!("[Link] console input closed");
                        self.closed = true;
                    }
                    break;
                }
            }
        }
    }
}

impl RadioPort for ConsoleRadio {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.pull();
        Ok(self.pending.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        out.write_all(bytes)?;
        out.flush()?;
        Ok(bytes.len())
    }
}
