use std::io::{self, Read};
use std::path::Path;

use crate::errors::{Result, StreamError};

/// Number of `i32` fields at the start of every batch file.
pub const HEADER_FIELDS: usize = 4;
pub const HEADER_LEN: usize = HEADER_FIELDS * std::mem::size_of::<i32>();

const FLOAT_LEN: usize = std::mem::size_of::<f32>();

/// Record geometry shared by every file of a stream.
///
/// On disk this is the header `[record_count, channels, height, width]`,
/// stored as native-endian `i32` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub batch_count: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Geometry {
    pub fn new(
        batch_count: usize,
        channels: usize,
        height: usize,
        width: usize,
    ) -> Self {
        Self {
            batch_count,
            channels,
            height,
            width,
        }
    }

    /// Number of floats in one record.
    ///
    /// Geometries read from a batch file are known not to overflow here.
    pub fn image_size(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Number of floats in the payload of one file.
    pub fn file_len(&self) -> usize {
        self.batch_count * self.image_size()
    }

    /// Encode the geometry as a batch file header.
    ///
    /// Returns `None` if a dimension does not fit in an `i32`.
    pub fn header_bytes(&self) -> Option<[u8; HEADER_LEN]> {
        let fields = [self.batch_count, self.channels, self.height, self.width];
        let mut bytes = [0u8; HEADER_LEN];
        for (chunk, field) in bytes.chunks_exact_mut(4).zip(fields) {
            let field = i32::try_from(field).ok()?;
            chunk.copy_from_slice(&field.to_ne_bytes());
        }
        Some(bytes)
    }

    /// Read and validate the header of the batch file at `path`.
    pub(crate) fn read_from<R: Read>(
        reader: &mut R,
        path: &Path,
    ) -> Result<Self> {
        let mut bytes = [0u8; HEADER_LEN];
        read_exact_or_corrupted(reader, &mut bytes, path, "short header")?;

        let mut fields = [0usize; HEADER_FIELDS];
        for (field, chunk) in fields.iter_mut().zip(bytes.chunks_exact(4)) {
            let value =
                i32::from_ne_bytes(chunk.try_into().unwrap_or_default());
            if value <= 0 {
                log::warn!(
                    "Non-positive dimension {} in {}",
                    value,
                    path.display()
                );
                return Err(StreamError::corrupted(
                    path,
                    format!("non-positive dimension {} in header", value),
                ));
            }
            *field = value as usize;
        }

        let [batch_count, channels, height, width] = fields;
        let geometry = Self::new(batch_count, channels, height, width);
        let image_size = channels
            .checked_mul(height)
            .and_then(|n| n.checked_mul(width));
        if image_size
            .and_then(|n| float_buffer_len(batch_count, n))
            .is_none()
        {
            log::warn!(
                "Geometry {} of {} is too large",
                geometry,
                path.display()
            );
            return Err(StreamError::corrupted(path, "geometry too large"));
        }
        Ok(geometry)
    }
}

/// Number of floats in a buffer of `records` records of `image_size`
/// floats, or `None` if such a buffer cannot be allocated.
pub(crate) fn float_buffer_len(
    records: usize,
    image_size: usize,
) -> Option<usize> {
    let len = records.checked_mul(image_size)?;
    let bytes = len.checked_mul(FLOAT_LEN)?;
    (bytes <= isize::MAX as usize).then_some(len)
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}x{}x{}",
            self.batch_count, self.channels, self.height, self.width
        )
    }
}

/// Fill `dst` with native-endian floats from `reader`.
///
/// Fails with [`StreamError::Corrupted`] if the reader ends before `dst`
/// is full.
pub(crate) fn read_payload<R: Read>(
    reader: &mut R,
    dst: &mut [f32],
    path: &Path,
) -> Result<()> {
    let mut bytes = vec![0u8; dst.len() * FLOAT_LEN];
    read_exact_or_corrupted(reader, &mut bytes, path, "short payload")?;

    for (value, chunk) in dst.iter_mut().zip(bytes.chunks_exact(FLOAT_LEN)) {
        *value = f32::from_ne_bytes(chunk.try_into().unwrap_or_default());
    }
    Ok(())
}

fn read_exact_or_corrupted<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    path: &Path,
    what: &str,
) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            log::warn!("{} in {}", what, path.display());
            Err(StreamError::corrupted(path, what))
        }
        Err(e) => Err(e.into()),
    }
}
