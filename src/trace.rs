use std::{
    fmt,
    io::{self, Write},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CacheToProcessor,
    ProcessorToCache,
    MemoryToCache,
    CacheToMemory,
    CacheToNowhere,
}

impl Action {
    fn route(self) -> &'static str {
        match self {
            Action::CacheToProcessor => "from the cache to the processor",
            Action::ProcessorToCache => "from the processor to the cache",
            Action::MemoryToCache => "from the memory to the cache",
            Action::CacheToMemory => "from the cache to the memory",
            Action::CacheToNowhere => "from the cache to nowhere",
        }
    }
}

/// One movement of `size` words starting at word address `addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub addr: usize,
    pub size: usize,
    pub action: Action,
}

impl Transfer {
    pub fn new(addr: usize, size: usize, action: Action) -> Self {
        Transfer { addr, size, action }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transferring word [{}-{}] {}",
            self.addr,
            self.addr + self.size - 1,
            self.action.route()
        )
    }
}

/// Receives transfers in the order the cache performs them.
pub trait TraceSink {
    fn record(&mut self, transfer: Transfer);
}

/// Keeps every transfer in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Recorder {
    pub transfers: Vec<Transfer>,
}

#[cfg(test)]
impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }

    pub fn clear(&mut self) {
        self.transfers.clear();
    }
}

#[cfg(test)]
impl TraceSink for Recorder {
    fn record(&mut self, transfer: Transfer) {
        self.transfers.push(transfer);
    }
}

/// Writes one `@@@ ` prefixed line per transfer.
///
/// The first write error stops all further output and is reported by
/// [`Printer::flush`].
pub struct Printer<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W) -> Self {
        Printer { out, error: None }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TraceSink for Printer<W> {
    fn record(&mut self, transfer: Transfer) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = writeln!(self.out, "@@@ {}", transfer) {
            log::error!("failed to write transfer trace: {}", err);
            self.error = Some(err);
        }
    }
}
