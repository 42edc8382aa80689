//! Image reassembly from offset-tagged telemetry records
//!
//! Satellites split a JPEG into body-sized chunks and tag each chunk with a
//! stream marker and the byte offset of the chunk inside the file. Records
//! arrive out of order, repeated, and mixed with unrelated telemetry.
//! [`ImageReassembler`] places each body at `offset - base_offset` in the
//! image buffer of its stream, where `base_offset` is the offset carried by
//! the record that started the image.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sat_imager_lib::profiles::SatelliteProfile;
//! use sat_imager_lib::reassembler::reassemble;
//!
//! let images = reassemble(frames, SatelliteProfile::geoscan().reassembly)?;
//!
//! for image in images {
//!     save(&image.name, &image.content);
//! }
//! ```

use std::collections::{HashSet, VecDeque};

use chrono::NaiveDateTime;

use crate::config::{CompletionPolicy, ConfigError, NamingPolicy, ReassemblyConfig};
use crate::frame::{Frame, JPEG_END, JPEG_START};

/// Name format for [`NamingPolicy::Timestamp`]
pub const IMAGE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Largest image buffer the reassembler will grow to.
///
/// Bodies placed beyond this are treated as corrupt offsets.
pub const MAX_IMAGE_LEN: usize = 64 * 1024 * 1024;

/// Why a frame did not reach an image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Record is shorter than the header
    TooShort,
    /// Header matches no configured stream marker
    UnknownMarker,
    /// Stream matched but no image is in progress for it
    NoActiveImage,
    /// Offset lies before the base offset of the image in progress
    StaleOffset,
    /// Offset would grow the image beyond [`MAX_IMAGE_LEN`]
    OffsetTooLarge,
}

/// Result of processing a single frame
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    /// Body written, no image finished yet
    Accumulating,
    /// One or more images finished while processing this frame
    Finished(Vec<FinishedImage>),
    /// Frame did not touch any buffer
    Skipped(SkipReason),
}

/// Counters describing what the reassembler did with its input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    /// Frames processed
    pub frames: usize,
    /// Bodies written into an image buffer
    pub written: usize,
    /// Start records identical to the one that opened the active image
    pub retransmissions: usize,
    /// Images opened
    pub images_started: usize,
    /// Images handed out
    pub images_finished: usize,
    /// Frames shorter than the header
    pub too_short: usize,
    /// Frames from unrelated telemetry
    pub unknown_marker: usize,
    /// Image frames seen with no image in progress
    pub no_active_image: usize,
    /// Frames with an offset before the image's base offset
    pub stale_offset: usize,
    /// Frames with an absurdly large offset
    pub offset_too_large: usize,
}

impl ReassemblyStats {
    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::TooShort => self.too_short += 1,
            SkipReason::UnknownMarker => self.unknown_marker += 1,
            SkipReason::NoActiveImage => self.no_active_image += 1,
            SkipReason::StaleOffset => self.stale_offset += 1,
            SkipReason::OffsetTooLarge => self.offset_too_large += 1,
        }
    }
}

/// A reassembled image, ready to be written out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedImage {
    /// Output name without extension
    pub name: String,
    /// Label of the stream marker the image was collected from
    pub stream: String,
    /// Timestamp of the start record
    pub started_at: NaiveDateTime,
    /// Offset carried by the start record
    pub base_offset: u64,
    /// Whether an end-of-image marker was seen in a written body
    pub complete: bool,
    /// Image bytes; gaps are zero-filled
    pub content: Vec<u8>,
}

/// In-progress image
#[derive(Debug)]
struct ImageBuffer {
    /// Full record that opened the image, for retransmission detection
    signature: Vec<u8>,
    /// Offset of the opening record; never changes
    base_offset: u64,
    content: Vec<u8>,
    name: String,
    /// Index into the configured markers
    stream: usize,
    started_at: NaiveDateTime,
    saw_end: bool,
}

impl ImageBuffer {
    /// Write `body` at `addr`, growing the buffer as needed. Later writes win.
    fn write(&mut self, addr: usize, body: &[u8]) {
        let end = addr + body.len();
        if self.content.len() < end {
            self.content.resize(end, 0);
        }
        self.content[addr..end].copy_from_slice(body);
    }
}

/// Active image together with the slot it occupies
#[derive(Debug)]
struct Slot {
    key: usize,
    buffer: ImageBuffer,
}

/// Reassembles images from time-ordered frames
///
/// Frames must be fed in chronological order; [`reassemble`] sorts them
/// first. Active images are kept in the order they were opened.
#[derive(Debug)]
pub struct ImageReassembler {
    config: ReassemblyConfig,
    /// Images in progress, in discovery order
    active: Vec<Slot>,
    /// Collect-all mode opens at most one image per run
    collect_all_started: bool,
    /// Next sequential image index
    next_index: usize,
    /// Names already handed out
    used_names: HashSet<String>,
    stats: ReassemblyStats,
}

impl ImageReassembler {
    /// Create a reassembler for a configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration is invalid.
    pub fn new(config: ReassemblyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            active: Vec::new(),
            collect_all_started: false,
            next_index: 0,
            used_names: HashSet::new(),
            stats: ReassemblyStats::default(),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Number of images currently in progress
    pub fn active_images(&self) -> usize {
        self.active.len()
    }

    /// Current length of the buffers in progress, in discovery order
    pub fn active_lengths(&self) -> Vec<usize> {
        self.active
            .iter()
            .map(|slot| slot.buffer.content.len())
            .collect()
    }

    /// Process a single frame
    ///
    /// Returns `ProcessResult::Finished` when the frame completes one or more
    /// images.
    pub fn process_frame(&mut self, frame: &Frame) -> ProcessResult {
        self.stats.frames += 1;

        let Some(header) = frame.header() else {
            return self.skip(SkipReason::TooShort);
        };
        let Some(stream) = self.config.match_marker(header) else {
            return self.skip(SkipReason::UnknownMarker);
        };
        let Some(offset) = self.config.offset_field.read(header) else {
            return self.skip(SkipReason::TooShort);
        };

        let body = frame.body();
        let key = self.slot_key(stream);
        let mut finished = Vec::new();

        if is_jpeg_start(body) {
            if let Some(previous) = self.handle_start(key, stream, frame, offset) {
                finished.push(previous);
            }
        }

        let result = match self.find_slot(key) {
            Some(index) => self.write_body(index, offset, body),
            None => Err(SkipReason::NoActiveImage),
        };

        match result {
            Ok(end_seen) => {
                if end_seen && self.config.completion == CompletionPolicy::OnEndMarker {
                    if let Some(index) = self.find_slot(key) {
                        finished.push(self.finalize(index));
                    }
                }
            }
            Err(reason) => {
                self.stats.record_skip(reason);
                if finished.is_empty() {
                    return ProcessResult::Skipped(reason);
                }
            }
        }

        if finished.is_empty() {
            ProcessResult::Accumulating
        } else {
            ProcessResult::Finished(finished)
        }
    }

    /// Finish every image still in progress, in discovery order
    pub fn finish(&mut self) -> Vec<FinishedImage> {
        let mut finished = Vec::with_capacity(self.active.len());
        while !self.active.is_empty() {
            finished.push(self.finalize(0));
        }
        finished
    }

    fn skip(&mut self, reason: SkipReason) -> ProcessResult {
        self.stats.record_skip(reason);
        ProcessResult::Skipped(reason)
    }

    /// Slot an image from `stream` lives in; collect-all shares one slot
    fn slot_key(&self, stream: usize) -> usize {
        match self.config.completion {
            CompletionPolicy::SingleStreamCollectAll => 0,
            CompletionPolicy::OnNextStart | CompletionPolicy::OnEndMarker => stream,
        }
    }

    fn find_slot(&self, key: usize) -> Option<usize> {
        self.active.iter().position(|slot| slot.key == key)
    }

    /// Handle a record whose body starts a JPEG
    ///
    /// Returns the image displaced by a new, different start.
    fn handle_start(
        &mut self,
        key: usize,
        stream: usize,
        frame: &Frame,
        offset: u64,
    ) -> Option<FinishedImage> {
        let existing = self.find_slot(key);

        if let Some(index) = existing {
            if self.active[index].buffer.signature == frame.payload() {
                self.stats.retransmissions += 1;
                log::debug!("{} retransmit", self.active[index].buffer.name);
                return None;
            }
        }

        if self.config.completion == CompletionPolicy::SingleStreamCollectAll {
            if self.collect_all_started {
                log::debug!("Ignoring repeated start at offset {} (collect-all)", offset);
            } else {
                self.collect_all_started = true;
                self.open(key, stream, frame, offset);
            }
            return None;
        }

        let previous = existing.map(|index| self.finalize(index));
        self.open(key, stream, frame, offset);
        previous
    }

    fn open(&mut self, key: usize, stream: usize, frame: &Frame, offset: u64) {
        let name = self.derive_name(stream, frame.timestamp());
        log::info!(
            "{} start ({}, base offset {})",
            name,
            self.config.markers[stream].label,
            offset
        );

        self.stats.images_started += 1;
        self.active.push(Slot {
            key,
            buffer: ImageBuffer {
                signature: frame.payload().to_vec(),
                base_offset: offset,
                content: Vec::new(),
                name,
                stream,
                started_at: frame.timestamp(),
                saw_end: false,
            },
        });
    }

    /// Place a body in the active image at `index`
    ///
    /// Returns whether the body contains an end-of-image marker.
    fn write_body(&mut self, index: usize, offset: u64, body: &[u8]) -> Result<bool, SkipReason> {
        let buffer = &mut self.active[index].buffer;

        let Some(addr) = offset.checked_sub(buffer.base_offset) else {
            log::warn!(
                "{}: skipping chunk at offset {} before base offset {}",
                buffer.name,
                offset,
                buffer.base_offset
            );
            return Err(SkipReason::StaleOffset);
        };

        let addr = match usize::try_from(addr) {
            Ok(addr) if addr.saturating_add(body.len()) <= MAX_IMAGE_LEN => addr,
            _ => {
                log::warn!(
                    "{}: skipping chunk at implausible address {}",
                    buffer.name,
                    addr
                );
                return Err(SkipReason::OffsetTooLarge);
            }
        };

        buffer.write(addr, body);
        let end_seen = contains_marker(body, &JPEG_END);
        buffer.saw_end |= end_seen;
        self.stats.written += 1;

        Ok(end_seen)
    }

    fn finalize(&mut self, index: usize) -> FinishedImage {
        let Slot { buffer, .. } = self.active.remove(index);
        self.stats.images_finished += 1;

        if buffer.saw_end {
            log::info!("{} finished: {} bytes", buffer.name, buffer.content.len());
        } else {
            log::info!(
                "{} finished: {} bytes (no end marker seen)",
                buffer.name,
                buffer.content.len()
            );
        }

        FinishedImage {
            name: buffer.name,
            stream: self.config.markers[buffer.stream].label.clone(),
            started_at: buffer.started_at,
            base_offset: buffer.base_offset,
            complete: buffer.saw_end,
            content: buffer.content,
        }
    }

    fn derive_name(&mut self, stream: usize, started_at: NaiveDateTime) -> String {
        let id = match self.config.naming {
            NamingPolicy::SequentialIndex => format!("{:05}", self.next_index),
            NamingPolicy::Timestamp => started_at.format(IMAGE_TIMESTAMP_FORMAT).to_string(),
        };
        self.next_index += 1;

        let prefix = self.config.markers[stream]
            .name_prefix
            .as_deref()
            .unwrap_or_default();
        let stem = if self.config.name_base.is_empty() {
            format!("{}{}", prefix, id)
        } else {
            format!("{}-{}{}", self.config.name_base, prefix, id)
        };

        // Timestamp names collide when images start within the same second
        let mut name = stem.clone();
        let mut suffix = 1;
        while !self.used_names.insert(name.clone()) {
            name = format!("{}-{}", stem, suffix);
            suffix += 1;
        }
        name
    }
}

/// Check if data starts with the JPEG start-of-image sequence
#[inline]
pub fn is_jpeg_start(data: &[u8]) -> bool {
    data.starts_with(&JPEG_START)
}

/// Check if `data` contains `marker` anywhere
#[inline]
pub fn contains_marker(data: &[u8], marker: &[u8]) -> bool {
    data.windows(marker.len()).any(|w| w == marker)
}

/// Lazy sequence of finished images
///
/// Frames are processed on demand; dropping the iterator stops reassembly.
#[derive(Debug)]
pub struct Images {
    frames: std::vec::IntoIter<Frame>,
    reassembler: ImageReassembler,
    pending: VecDeque<FinishedImage>,
    exhausted: bool,
}

impl Images {
    /// Counters accumulated so far
    pub fn stats(&self) -> ReassemblyStats {
        self.reassembler.stats()
    }
}

impl Iterator for Images {
    type Item = FinishedImage;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(image) = self.pending.pop_front() {
                return Some(image);
            }
            if self.exhausted {
                return None;
            }

            match self.frames.next() {
                Some(frame) => {
                    if let ProcessResult::Finished(images) = self.reassembler.process_frame(&frame)
                    {
                        self.pending.extend(images);
                    }
                }
                None => {
                    self.exhausted = true;
                    self.pending.extend(self.reassembler.finish());
                }
            }
        }
    }
}

/// Reassemble images from an unordered set of frames.
///
/// Frames are stably sorted by timestamp, so frames sharing a timestamp keep
/// their input order.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration is invalid.
pub fn reassemble(
    frames: impl IntoIterator<Item = Frame>,
    config: ReassemblyConfig,
) -> Result<Images, ConfigError> {
    let reassembler = ImageReassembler::new(config)?;

    let mut frames: Vec<Frame> = frames.into_iter().collect();
    frames.sort_by_key(Frame::timestamp);

    Ok(Images {
        frames: frames.into_iter(),
        reassembler,
        pending: VecDeque::new(),
        exhausted: false,
    })
}
