//! Fragment format, fragmentation and XOR parity.
//!
//! The packed symbol stream is cut into fixed-size data fragments. Every
//! redundancy group of `g` consecutive data fragments gets one parity
//! fragment holding the XOR of the group's payloads, so one loss per group
//! can be rebuilt without retransmission.
//!
//! # Fragment Format
//!
//! ```text
//! +------------------------+
//! | Magic (2 bytes)        |  "DF"
//! +------------------------+
//! | transmission_id (4)    |  u32
//! +------------------------+
//! | sequence_index (2)     |  u16, data fragments first, then parity
//! +------------------------+
//! | total_fragments (2)    |  u16, data + parity
//! +------------------------+
//! | data_fragments (2)     |  u16
//! +------------------------+
//! | stream_len (4)         |  u32 bytes of the packed stream
//! +------------------------+
//! | chunk_size (2)         |  u16 payload bytes per data fragment
//! +------------------------+
//! | group_size (1)         |  u8 data fragments per parity, 0 = no parity
//! +------------------------+
//! | dict_version (1)       |  u8 static dictionary version
//! +------------------------+
//! | flags (1)              |  bit0 parity, bit1 strict morse, bit2 auth tag
//! +------------------------+
//! | payload_len (2)        |  u16
//! +------------------------+
//! | header_crc (4)         |  CRC32 of the 23 bytes above
//! +------------------------+
//! | digest (4)             |  CRC32 of the payload
//! +------------------------+
//! | payload                |  payload_len bytes
//! +------------------------+
//! | auth_tag (8)           |  optional, see `security`
//! +------------------------+
//! ```
//!
//! All integers are little-endian. The header checksum and the payload
//! digest are independent: corrupted metadata is rejected at parse time
//! ([`Fragment::deserialize`]), a corrupted payload is detected by
//! [`Fragment::verify`] and still tells the receiver which index went bad.

use crate::config::{RedundancyLevel, MAX_FRAGMENT_SIZE_LIMIT};
use crate::error::{FragmentError, Result};
use std::ops::Range;
use tracing::debug;

/// Magic number for fragments: "DF"
pub const MAGIC: [u8; 2] = *b"DF";

/// Size of the fragment header in bytes
pub const HEADER_SIZE: usize = 31;

/// Size of the optional authentication tag
pub const AUTH_TAG_SIZE: usize = 8;

/// Header bytes covered by `header_crc`
const CRC_SPAN: usize = 23;

const FLAG_PARITY: u8 = 0x01;
const FLAG_STRICT: u8 = 0x02;
const FLAG_AUTH: u8 = 0x04;

/// How a packed stream is laid out over fragments.
///
/// Every fragment carries the full layout, so any single fragment is enough
/// to open a reassembly session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLayout {
    pub total_fragments: u16,
    pub data_fragments: u16,
    pub stream_len: u32,
    pub chunk_size: u16,
    /// Data fragments per parity fragment, 0 without parity
    pub group_size: u8,
    pub dictionary_version: u8,
    /// Payload is keyed in strict (ITU hex) mode
    pub strict_morse: bool,
}

impl StreamLayout {
    pub fn parity_fragments(&self) -> u16 {
        self.total_fragments - self.data_fragments
    }

    /// Redundancy group of a data fragment, `None` without parity.
    pub fn group_of(&self, data_index: u16) -> Option<u16> {
        (self.group_size > 0).then(|| data_index / u16::from(self.group_size))
    }

    /// Data fragment indices covered by a group's parity.
    pub fn group_members(&self, group: u16) -> Range<u16> {
        let size = u16::from(self.group_size.max(1));
        let start = group.saturating_mul(size).min(self.data_fragments);
        let end = start.saturating_add(size).min(self.data_fragments);
        start..end
    }

    pub fn parity_index(&self, group: u16) -> u16 {
        self.data_fragments + group
    }

    /// Stream bytes carried by a data fragment.
    pub fn byte_range(&self, data_index: u16) -> Range<usize> {
        let chunk = usize::from(self.chunk_size);
        let len = self.stream_len as usize;
        let start = (usize::from(data_index) * chunk).min(len);
        let end = (start + chunk).min(len);
        start..end
    }

    /// Payload length the fragment at `index` must have.
    ///
    /// A parity payload is as long as the first (longest) member of its group.
    pub fn expected_payload_len(&self, index: u16) -> usize {
        if index < self.data_fragments {
            return self.byte_range(index).len();
        }
        let group = index - self.data_fragments;
        self.byte_range(self.group_members(group).start).len()
    }

    fn validate(&self) -> std::result::Result<(), FragmentError> {
        if self.data_fragments == 0 || self.chunk_size == 0 {
            return Err(FragmentError::InvalidLayout("empty layout"));
        }
        let data = u32::from(self.data_fragments);
        let parity = match self.group_size {
            0 => 0,
            g => data.div_ceil(u32::from(g)),
        };
        if u32::from(self.total_fragments) != data + parity {
            return Err(FragmentError::InvalidLayout(
                "total_fragments disagrees with data and group size",
            ));
        }
        let chunk = u64::from(self.chunk_size);
        let len = u64::from(self.stream_len);
        if len > u64::from(data) * chunk || (data > 1 && len <= u64::from(data - 1) * chunk) {
            return Err(FragmentError::InvalidLayout(
                "stream_len disagrees with data fragments",
            ));
        }
        Ok(())
    }
}

/// Per-transmission values stamped into every fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionMeta {
    pub transmission_id: u32,
    pub dictionary_version: u8,
    pub strict_morse: bool,
}

/// One addressable unit of a transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub transmission_id: u32,

    /// Position in `0..total_fragments`; parity follows the data fragments
    pub sequence_index: u16,

    pub layout: StreamLayout,

    pub payload: Vec<u8>,

    /// CRC32 of `payload`
    pub integrity_digest: u32,

    /// Truncated HMAC, when the transmission is sealed
    pub auth_tag: Option<[u8; AUTH_TAG_SIZE]>,
}

impl Fragment {
    fn new(meta: &TransmissionMeta, sequence_index: u16, layout: StreamLayout, payload: Vec<u8>) -> Self {
        Self {
            transmission_id: meta.transmission_id,
            sequence_index,
            layout,
            integrity_digest: digest(&payload),
            payload,
            auth_tag: None,
        }
    }

    /// Whether this fragment carries parity rather than stream bytes.
    pub fn is_parity(&self) -> bool {
        self.sequence_index >= self.layout.data_fragments
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        HEADER_SIZE
            + self.payload.len()
            + if self.auth_tag.is_some() { AUTH_TAG_SIZE } else { 0 }
    }

    fn write_header(&self, out: &mut Vec<u8>, with_auth: bool) {
        let start = out.len();
        let mut flags = 0;
        if self.is_parity() {
            flags |= FLAG_PARITY;
        }
        if self.layout.strict_morse {
            flags |= FLAG_STRICT;
        }
        if with_auth {
            flags |= FLAG_AUTH;
        }

        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.transmission_id.to_le_bytes());
        out.extend_from_slice(&self.sequence_index.to_le_bytes());
        out.extend_from_slice(&self.layout.total_fragments.to_le_bytes());
        out.extend_from_slice(&self.layout.data_fragments.to_le_bytes());
        out.extend_from_slice(&self.layout.stream_len.to_le_bytes());
        out.extend_from_slice(&self.layout.chunk_size.to_le_bytes());
        out.push(self.layout.group_size);
        out.push(self.layout.dictionary_version);
        out.push(flags);
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());

        let header_crc = crc32fast::hash(&out[start..start + CRC_SPAN]);
        out.extend_from_slice(&header_crc.to_le_bytes());
        out.extend_from_slice(&self.integrity_digest.to_le_bytes());
    }

    /// Serialize for transmission.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size());
        self.write_header(&mut bytes, self.auth_tag.is_some());
        bytes.extend_from_slice(&self.payload);
        if let Some(tag) = &self.auth_tag {
            bytes.extend_from_slice(tag);
        }
        bytes
    }

    /// Header and payload as covered by an authentication tag.
    pub(crate) fn authenticated_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        self.write_header(&mut bytes, true);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parse a fragment and validate its metadata.
    ///
    /// The payload digest is not checked here; see [`Fragment::verify`].
    ///
    /// # Errors
    /// - `FragmentError::TooShort` / `LengthMismatch` on a bad buffer length
    /// - `FragmentError::InvalidMagic` if the magic doesn't match
    /// - `FragmentError::HeaderCorrupted` if the header checksum fails
    /// - `FragmentError::InvalidLayout` / `InvalidIndex` for contradictory fields
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(FragmentError::TooShort {
                required: HEADER_SIZE,
                actual: bytes.len(),
            }
            .into());
        }

        let mut header = HeaderReader { bytes, pos: 0 };
        let magic = [header.u8(), header.u8()];
        if magic != MAGIC {
            return Err(FragmentError::InvalidMagic {
                expected: MAGIC,
                actual: magic,
            }
            .into());
        }

        let computed_crc = crc32fast::hash(&bytes[..CRC_SPAN]);
        let transmission_id = header.u32();
        let sequence_index = header.u16();
        let total_fragments = header.u16();
        let data_fragments = header.u16();
        let stream_len = header.u32();
        let chunk_size = header.u16();
        let group_size = header.u8();
        let dictionary_version = header.u8();
        let flags = header.u8();
        let payload_len = usize::from(header.u16());
        let header_crc = header.u32();
        let integrity_digest = header.u32();

        if header_crc != computed_crc {
            return Err(FragmentError::HeaderCorrupted {
                expected: header_crc,
                actual: computed_crc,
            }
            .into());
        }
        if flags & !(FLAG_PARITY | FLAG_STRICT | FLAG_AUTH) != 0 {
            return Err(FragmentError::InvalidLayout("reserved flag bits set").into());
        }

        let layout = StreamLayout {
            total_fragments,
            data_fragments,
            stream_len,
            chunk_size,
            group_size,
            dictionary_version,
            strict_morse: flags & FLAG_STRICT != 0,
        };
        layout.validate()?;

        if sequence_index >= total_fragments {
            return Err(FragmentError::InvalidIndex {
                index: sequence_index,
                total: total_fragments,
            }
            .into());
        }
        if (flags & FLAG_PARITY != 0) != (sequence_index >= data_fragments) {
            return Err(FragmentError::InvalidLayout("parity flag disagrees with index").into());
        }
        if payload_len != layout.expected_payload_len(sequence_index) {
            return Err(FragmentError::InvalidLayout("payload_len disagrees with layout").into());
        }

        let tag_len = if flags & FLAG_AUTH != 0 { AUTH_TAG_SIZE } else { 0 };
        let expected = HEADER_SIZE + payload_len + tag_len;
        if bytes.len() < expected {
            return Err(FragmentError::TooShort {
                required: expected,
                actual: bytes.len(),
            }
            .into());
        }
        if bytes.len() != expected {
            return Err(FragmentError::LengthMismatch {
                expected,
                actual: bytes.len(),
            }
            .into());
        }

        let payload = bytes[HEADER_SIZE..HEADER_SIZE + payload_len].to_vec();
        let auth_tag = match tag_len {
            0 => None,
            _ => {
                let mut tag = [0u8; AUTH_TAG_SIZE];
                tag.copy_from_slice(&bytes[HEADER_SIZE + payload_len..]);
                Some(tag)
            }
        };

        Ok(Self {
            transmission_id,
            sequence_index,
            layout,
            payload,
            integrity_digest,
            auth_tag,
        })
    }

    /// Check the payload against its digest.
    ///
    /// # Errors
    /// `FragmentError::IntegrityFailure` naming this fragment's index.
    pub fn verify(&self) -> Result<()> {
        let actual = digest(&self.payload);
        if actual != self.integrity_digest {
            return Err(FragmentError::IntegrityFailure {
                index: self.sequence_index,
                expected: self.integrity_digest,
                actual,
            }
            .into());
        }
        Ok(())
    }
}

/// Fixed-offset reader over a buffer already known to hold a full header.
struct HeaderReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl HeaderReader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }
}

/// Payload digest.
pub fn digest(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// XOR `payload` into `acc`; bytes past the end of `payload` count as zero.
pub(crate) fn xor_into(acc: &mut [u8], payload: &[u8]) {
    for (a, b) in acc.iter_mut().zip(payload) {
        *a ^= b;
    }
}

/// Split a packed stream into data and parity fragments.
///
/// An empty stream still yields one (empty) data fragment so the receiver
/// learns the layout.
///
/// # Errors
/// - `FragmentError::InvalidSize` if `max_fragment_size` is 0 or above the limit
/// - `FragmentError::TooManyFragments` if the stream needs more than `u16::MAX` fragments
pub fn fragment(
    stream: &[u8],
    max_fragment_size: usize,
    redundancy: RedundancyLevel,
    meta: TransmissionMeta,
) -> Result<Vec<Fragment>> {
    if max_fragment_size == 0 || max_fragment_size > MAX_FRAGMENT_SIZE_LIMIT {
        return Err(FragmentError::InvalidSize(max_fragment_size).into());
    }

    let data = stream.len().div_ceil(max_fragment_size).max(1);
    let group_size = redundancy.group_size().unwrap_or(0);
    let parity = match group_size {
        0 => 0,
        g => data.div_ceil(g),
    };
    let total = data + parity;
    let limit = usize::from(u16::MAX);
    if total > limit || stream.len() > u32::MAX as usize {
        return Err(FragmentError::TooManyFragments {
            len: stream.len(),
            needed: total,
            limit,
        }
        .into());
    }

    let layout = StreamLayout {
        total_fragments: total as u16,
        data_fragments: data as u16,
        stream_len: stream.len() as u32,
        chunk_size: max_fragment_size as u16,
        group_size: group_size as u8,
        dictionary_version: meta.dictionary_version,
        strict_morse: meta.strict_morse,
    };

    let mut fragments = Vec::with_capacity(total);
    for index in 0..layout.data_fragments {
        let payload = stream[layout.byte_range(index)].to_vec();
        fragments.push(Fragment::new(&meta, index, layout, payload));
    }

    for group in 0..parity as u16 {
        let index = layout.parity_index(group);
        let mut acc = vec![0u8; layout.expected_payload_len(index)];
        for member in layout.group_members(group) {
            xor_into(&mut acc, &fragments[usize::from(member)].payload);
        }
        fragments.push(Fragment::new(&meta, index, layout, acc));
    }

    debug!(
        transmission_id = meta.transmission_id,
        stream_len = stream.len(),
        data,
        parity,
        "fragmented stream"
    );
    Ok(fragments)
}
