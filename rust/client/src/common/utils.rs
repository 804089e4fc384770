use crate::error::{Error, Result};
use base64::prelude::*;
use flate2::read::ZlibDecoder;
use std::io::prelude::*;
use std::mem::size_of;

/// Reverses the server's `zlib` + `base64` packing of a binary observation stream.
pub fn deserialize_binary_stream_to_bytes(data: &str) -> Result<Vec<u8>> {
    let data = BASE64_STANDARD
        .decode(data)
        .map_err(|e| Error::protocol("binary stream", format!("bad base64: {e}")))?;
    let mut dec = ZlibDecoder::new(&data[..]);
    let mut data = Vec::new();
    dec.read_to_end(&mut data)
        .map_err(|e| Error::protocol("binary stream", format!("bad zlib stream: {e}")))?;

    Ok(data)
}

pub fn deserialize_binary_stream<T: FromLeBytes>(ty: &str, data: &str) -> Result<Vec<T>> {
    if T::DTYPE != ty {
        return Err(Error::protocol(
            "binary stream",
            format!("server sent {ty}, client expects {}", T::DTYPE),
        ));
    }

    let data = deserialize_binary_stream_to_bytes(data)?;

    if data.len() % size_of::<T>() != 0 {
        return Err(Error::protocol(
            "binary stream",
            format!(
                "{} bytes is not a multiple of the {}-byte item size",
                data.len(),
                size_of::<T>()
            ),
        ));
    }

    Ok(data
        .chunks_exact(size_of::<T>())
        .map(T::from_le_chunk)
        .collect())
}

/// Little-endian decoding for the numeric dtypes the server emits.
pub trait FromLeBytes: Sized {
    /// numpy dtype name on the wire.
    const DTYPE: &'static str;

    /// `chunk` is exactly `size_of::<Self>()` bytes long.
    fn from_le_chunk(chunk: &[u8]) -> Self;
}

macro_rules! impl_from_le_bytes {
    ($($t:ty => $name:literal),*) => {
        $(
            impl FromLeBytes for $t {
                const DTYPE: &'static str = $name;

                fn from_le_chunk(chunk: &[u8]) -> Self {
                    let mut buf = [0u8; size_of::<$t>()];
                    buf.copy_from_slice(chunk);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_from_le_bytes!(i32 => "int32", i64 => "int64", f32 => "float32", f64 => "float64");
