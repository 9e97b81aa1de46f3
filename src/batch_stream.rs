use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::batch_file_path;
use crate::config::StreamConfig;
use crate::errors::{Result, StreamError};
use crate::geometry::{float_buffer_len, read_payload, Geometry};

/// Forward-only stream of fixed-size batches read from numbered files.
///
/// Construction peeks `<prefix>Batch0`. When that file does not exist the
/// stream is [`BatchStream::Empty`]: every operation is a no-op and
/// [`next`](Self::next) always returns `Ok(false)`.
///
/// Running out of files and hitting `max_batches` are both reported as
/// `Ok(false)`. Corrupted files are reported as
/// [`StreamError::Corrupted`] and leave the stream in an unspecified state.
#[derive(Debug)]
pub enum BatchStream {
    Ready(ReadyStream),
    Empty,
}

/// A stream whose geometry is known and whose buffers are allocated.
#[derive(Debug)]
pub struct ReadyStream {
    prefix: String,
    geometry: Geometry,
    image_size: usize,
    batch_size: usize,
    max_batches: usize,

    // output buffer, `batch_size` records
    batch: Vec<f32>,
    // whole payload of the last loaded file, `geometry.batch_count` records
    file_batch: Vec<f32>,

    file_index: usize,
    file_pos: usize,
    batches_produced: usize,
}

impl BatchStream {
    pub fn open(
        batch_size: usize,
        max_batches: usize,
        prefix: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.into();
        if batch_size == 0 {
            return Err(StreamError::Config(
                "batch size must be positive".to_owned(),
            ));
        }

        let path = batch_file_path(&prefix, 0);
        let mut file = match open_batch_file(&path)? {
            Some(file) => file,
            None => {
                log::info!(
                    "No batch files found at {}, stream is empty",
                    path.display()
                );
                return Ok(BatchStream::Empty);
            }
        };
        let geometry = Geometry::read_from(&mut file, &path)?;
        log::info!(
            "Opened batch stream {} with geometry {}, batch size {}",
            prefix,
            geometry,
            batch_size
        );

        let image_size = geometry.image_size();
        let batch_len =
            float_buffer_len(batch_size, image_size).ok_or_else(|| {
                StreamError::Config(format!(
                    "batch size {} is too large for geometry {}",
                    batch_size, geometry
                ))
            })?;
        let mut stream = ReadyStream {
            prefix,
            geometry,
            image_size,
            batch_size,
            max_batches,
            batch: vec![0.0; batch_len],
            file_batch: vec![0.0; geometry.file_len()],
            file_index: 0,
            file_pos: geometry.batch_count,
            batches_produced: 0,
        };
        stream.reset(0)?;
        Ok(BatchStream::Ready(stream))
    }

    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        Self::open(config.batch_size, config.max_batches, config.prefix.clone())
    }

    /// Rewind to the first file and then skip `first_batch` batches.
    pub fn reset(&mut self, first_batch: usize) -> Result<()> {
        match self {
            BatchStream::Ready(stream) => stream.reset(first_batch),
            BatchStream::Empty => Ok(()),
        }
    }

    /// Fill the output buffer with the next batch.
    ///
    /// Returns `Ok(false)` when the batch limit is reached or the file
    /// sequence ends; the output buffer must not be consumed then.
    pub fn next(&mut self) -> Result<bool> {
        match self {
            BatchStream::Ready(stream) => stream.next(),
            BatchStream::Empty => Ok(false),
        }
    }

    pub fn skip(&mut self, skip_count: usize) -> Result<()> {
        match self {
            BatchStream::Ready(stream) => stream.skip(skip_count),
            BatchStream::Empty => Ok(()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, BatchStream::Ready(_))
    }

    pub fn as_ready(&self) -> Option<&ReadyStream> {
        match self {
            BatchStream::Ready(stream) => Some(stream),
            BatchStream::Empty => None,
        }
    }

    pub fn batch(&self) -> Option<&[f32]> {
        self.as_ready().map(ReadyStream::batch)
    }

    pub fn dims(&self) -> Option<Geometry> {
        self.as_ready().map(ReadyStream::dims)
    }

    pub fn image_size(&self) -> Option<usize> {
        self.as_ready().map(ReadyStream::image_size)
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.as_ready().map(ReadyStream::batch_size)
    }

    pub fn max_batches(&self) -> Option<usize> {
        self.as_ready().map(ReadyStream::max_batches)
    }

    pub fn batches_produced(&self) -> usize {
        self.as_ready()
            .map_or(0, ReadyStream::batches_produced)
    }
}

impl ReadyStream {
    pub fn reset(&mut self, first_batch: usize) -> Result<()> {
        self.batches_produced = 0;
        self.file_index = 0;
        self.file_pos = self.geometry.batch_count;
        self.skip(first_batch)
    }

    pub fn next(&mut self) -> Result<bool> {
        if self.batches_produced >= self.max_batches {
            return Ok(false);
        }

        let batch_count = self.geometry.batch_count;
        let mut batch_pos = 0;
        while batch_pos < self.batch_size {
            debug_assert!(self.file_pos <= batch_count);
            if self.file_pos == batch_count && !self.update()? {
                return Ok(false);
            }

            // whole records only, as many as both buffers allow
            let chunk =
                (self.batch_size - batch_pos).min(batch_count - self.file_pos);
            let src = self.file_pos * self.image_size;
            let dst = batch_pos * self.image_size;
            let len = chunk * self.image_size;
            self.batch[dst..dst + len]
                .copy_from_slice(&self.file_batch[src..src + len]);
            log::trace!(
                "Copied {} records from file {} at record {}",
                chunk,
                self.file_index - 1,
                self.file_pos
            );

            batch_pos += chunk;
            self.file_pos += chunk;
        }

        self.batches_produced += 1;
        Ok(true)
    }

    /// Advance by `skip_count` batches without touching the batch counter.
    ///
    /// Reaching the end of the data while skipping is not an error.
    pub fn skip(&mut self, skip_count: usize) -> Result<()> {
        let batch_count = self.geometry.batch_count;
        if self.batch_size >= batch_count
            && self.batch_size % batch_count == 0
            && self.file_pos == batch_count
        {
            // saturating, skipping past the last file just ends the stream
            let files =
                skip_count.saturating_mul(self.batch_size) / batch_count;
            log::trace!("Skipping {} files without reading", files);
            self.file_index = self.file_index.saturating_add(files);
            return Ok(());
        }

        self.skip_by_reading(skip_count)
    }

    fn skip_by_reading(&mut self, skip_count: usize) -> Result<()> {
        let produced = self.batches_produced;
        for _ in 0..skip_count {
            self.next()?;
        }
        self.batches_produced = produced;
        Ok(())
    }

    /// Load the next file into the file buffer.
    ///
    /// Returns `Ok(false)` when the file does not exist.
    fn update(&mut self) -> Result<bool> {
        let path = batch_file_path(&self.prefix, self.file_index);
        self.file_index = self.file_index.saturating_add(1);

        let mut reader = match open_batch_file(&path)? {
            Some(reader) => reader,
            None => {
                log::debug!("End of batch files at {}", path.display());
                return Ok(false);
            }
        };

        let geometry = Geometry::read_from(&mut reader, &path)?;
        if geometry != self.geometry {
            log::warn!(
                "Geometry {} of {} differs from {}",
                geometry,
                path.display(),
                self.geometry
            );
            return Err(StreamError::corrupted(
                path,
                format!(
                    "geometry {} does not match stream geometry {}",
                    geometry, self.geometry
                ),
            ));
        }

        read_payload(&mut reader, &mut self.file_batch, &path)?;
        self.file_pos = 0;
        log::debug!("Loaded {}", path.display());
        Ok(true)
    }

    /// The last batch produced by [`next`](Self::next).
    pub fn batch(&self) -> &[f32] {
        &self.batch
    }

    pub fn dims(&self) -> Geometry {
        self.geometry
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_batches(&self) -> usize {
        self.max_batches
    }

    pub fn batches_produced(&self) -> usize {
        self.batches_produced
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// `Ok(None)` when the file is missing, which ends the sequence.
fn open_batch_file(path: &Path) -> Result<Option<BufReader<File>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
