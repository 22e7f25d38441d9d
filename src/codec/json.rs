//! JSON Format

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Format;
use crate::error::Result;

/// The reference [`Format`]: JSON via serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Format for Json {
    fn encode<T: Serialize>(&self, input: &T, mut scratch: Vec<u8>) -> Result<Vec<u8>> {
        serde_json::to_writer(&mut scratch, input)?;
        Ok(scratch)
    }

    fn decode<T: DeserializeOwned>(&self, input: &[u8], output: &mut T) -> Result<()> {
        *output = serde_json::from_slice(input)?;
        Ok(())
    }
}
