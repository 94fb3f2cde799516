use std::io::{self, Read, Write};
use tracing::debug;

use super::{Channel, LinkConfig, ProbeError, Transport};

/// One opened connection under test
pub struct Endpoint {
    id: String,
    channel: Box<dyn Channel>,
    /// Bytes read past the end of the previous line
    pending: Vec<u8>,
}

impl Endpoint {
    fn new(id: String, channel: Box<dyn Channel>) -> Self {
        Self {
            id,
            channel,
            pending: Vec::new(),
        }
    }

    /// Identifier the endpoint was opened with
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Write all of `bytes` and flush
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.channel.write_all(bytes)?;
        self.channel.flush()
    }

    /// Read up to and including the next `\n`
    ///
    /// Each underlying read is bounded by the configured timeout. When a read
    /// times out whatever has arrived so far is returned, so an empty result
    /// means nothing arrived at all.
    pub fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = [0u8; 512];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let rest = self.pending.split_off(pos + 1);
                return Ok(std::mem::replace(&mut self.pending, rest));
            }
            match self.channel.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    break
                }
                Err(e) => return Err(e),
            }
        }
        Ok(std::mem::take(&mut self.pending))
    }
}

/// The endpoints opened together at one configuration
///
/// Dropping the set closes every endpoint, so a set scoped to one probe
/// iteration is released on every exit path.
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
    config: LinkConfig,
}

impl EndpointSet {
    /// Open every identifier in `ids` through `transport`
    ///
    /// Fails with [`ProbeError::Connection`] on the first identifier that
    /// cannot be opened; endpoints opened before it are released.
    pub fn open<T, S>(transport: &T, ids: &[S], config: &LinkConfig) -> Result<Self, ProbeError>
    where
        T: Transport + ?Sized,
        S: AsRef<str>,
    {
        if ids.is_empty() {
            return Err(ProbeError::NoEndpoints);
        }

        let mut endpoints = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            let channel = transport.open(id, config)?;
            endpoints.push(Endpoint::new(id.to_string(), channel));
        }

        debug!(
            endpoints = endpoints.len(),
            baud = config.baud_rate,
            "endpoint set opened"
        );
        Ok(Self {
            endpoints,
            config: config.clone(),
        })
    }

    /// Number of endpoints in the set
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Configuration the set was opened with
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Identifiers in sending order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.id())
    }

    pub(crate) fn endpoint_mut(&mut self, index: usize) -> &mut Endpoint {
        &mut self.endpoints[index]
    }

    pub(crate) fn endpoint(&self, index: usize) -> &Endpoint {
        &self.endpoints[index]
    }

    /// Release every endpoint
    ///
    /// Equivalent to dropping the set.
    pub fn close(self) {}
}

impl Drop for EndpointSet {
    fn drop(&mut self) {
        debug!(
            endpoints = self.endpoints.len(),
            baud = self.config.baud_rate,
            "endpoint set closed"
        );
    }
}
