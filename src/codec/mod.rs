//! Value Codec
//!
//! A thin layer mapping typed objects to entry payloads through a pluggable
//! [`Format`]. The log core only ever sees opaque bytes; this module is
//! where user-level serialization lives. [`Json`] is the reference format.

mod json;

pub use json::Json;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::log::{LogReader, LogWriter};

/// A pluggable serialization format
pub trait Format {
    /// Serialize `input`, appending to `scratch` and returning it. Passing
    /// the buffer through lets callers reuse one allocation across writes.
    fn encode<T: Serialize>(&self, input: &T, scratch: Vec<u8>) -> Result<Vec<u8>>;

    /// Deserialize `input` into the provided slot
    fn decode<T: DeserializeOwned>(&self, input: &[u8], output: &mut T) -> Result<()>;
}

/// Writes and reads typed objects through a [`Format`]
pub struct Codec<F> {
    format: F,
}

impl<F: Format> Codec<F> {
    pub fn new(format: F) -> Self {
        Self { format }
    }

    /// Encode `object` and append it, timestamped by the writer's clock
    pub fn write<T: Serialize>(
        &self,
        writer: &mut LogWriter,
        object: &T,
    ) -> Result<DateTime<Utc>> {
        let payload = self.format.encode(object, Vec::new())?;
        writer.write(&payload)
    }

    /// Encode `object` and append it at the caller-supplied time
    pub fn write_with_time<T: Serialize>(
        &self,
        writer: &mut LogWriter,
        t: DateTime<Utc>,
        object: &T,
    ) -> Result<()> {
        let payload = self.format.encode(object, Vec::new())?;
        writer.write_with_time(t, &payload)
    }

    /// Read the next entry and decode it into `output`
    pub fn read<T: DeserializeOwned>(
        &self,
        reader: &mut LogReader,
        output: &mut T,
    ) -> Result<DateTime<Utc>> {
        let (t, payload) = reader.read()?;
        self.format.decode(&payload, output)?;
        Ok(t)
    }
}
