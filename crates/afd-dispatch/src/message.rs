//! Binary message written to the daemon's message FIFO.
//!
//! The message is the memory image of a C record, so field order and
//! padding depend on two settings:
//!
//! ```text
//! wide time (i64)                       32-bit time (i32)
//!  0 creation_time  8                    0 creation_time  4
//!    [fs_id         8]                   8 total_bytes    8
//!    job_id         4                      [fs_id         8]
//!    split          4                      job_id         4
//!    files_to_send  4                      split          4
//!    (pad to 8)                            files_to_send  4
//!    total_bytes    8                      unique_number  4
//!    unique_number  4                      dir_no         2
//!    dir_no         2                      priority       1
//!    priority       1                      originator     1
//!    originator     1                      (pad to 8)
//! ```
//!
//! All integers are native-endian. The length is padded to a multiple of
//! eight and the whole message goes out in one `write`.

use serde::Serialize;

/// Producer tag carried in the last byte of every message from this tool.
pub const SHOW_OLOG_NO: u8 = 4;

/// Which record image the daemon was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageLayout {
    pub wide_time: bool,
    pub multi_fs: bool,
}

/// Byte offsets of every field for one layout
#[derive(Debug, Clone, Copy)]
struct Offsets {
    fs_id: Option<usize>,
    job_id: usize,
    split: usize,
    files: usize,
    total_bytes: usize,
    unique: usize,
    dir_no: usize,
    priority: usize,
    originator: usize,
    len: usize,
}

impl MessageLayout {
    pub fn new(wide_time: bool, multi_fs: bool) -> Self {
        Self { wide_time, multi_fs }
    }

    pub fn from_config(cfg: &afd_config::ResendConfig) -> Self {
        Self::new(cfg.wide_time, cfg.multi_fs)
    }

    /// `MAX_BIN_MSG_LENGTH` for this layout.
    pub fn message_len(&self) -> usize {
        self.offsets().len
    }

    fn time_width(&self) -> usize {
        if self.wide_time {
            8
        } else {
            4
        }
    }

    fn offsets(&self) -> Offsets {
        match (self.wide_time, self.multi_fs) {
            (true, false) => Offsets {
                fs_id: None,
                job_id: 8,
                split: 12,
                files: 16,
                total_bytes: 24,
                unique: 32,
                dir_no: 36,
                priority: 38,
                originator: 39,
                len: 40,
            },
            (true, true) => Offsets {
                fs_id: Some(8),
                job_id: 16,
                split: 20,
                files: 24,
                total_bytes: 32,
                unique: 40,
                dir_no: 44,
                priority: 46,
                originator: 47,
                len: 48,
            },
            (false, false) => Offsets {
                fs_id: None,
                total_bytes: 8,
                job_id: 16,
                split: 20,
                files: 24,
                unique: 28,
                dir_no: 32,
                priority: 34,
                originator: 35,
                len: 40,
            },
            (false, true) => Offsets {
                total_bytes: 8,
                fs_id: Some(16),
                job_id: 24,
                split: 28,
                files: 32,
                unique: 36,
                dir_no: 40,
                priority: 42,
                originator: 43,
                len: 48,
            },
        }
    }
}

/// One batch announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub creation_time: i64,
    /// Only encoded in the sharded layout
    pub fs_id: Option<u64>,
    pub job_id: u32,
    pub split_job_counter: u32,
    pub files_to_send: u32,
    pub total_bytes: u64,
    pub unique_number: u32,
    pub dir_no: u16,
    /// ASCII priority, `'0'..='9'`
    pub priority: u8,
    pub originator: u8,
}

impl OutboundMessage {
    /// Memory image for `layout`. A 32-bit time field keeps the low bits.
    pub fn encode(&self, layout: MessageLayout) -> Vec<u8> {
        let o = layout.offsets();
        let mut buf = vec![0u8; o.len];
        if layout.wide_time {
            put(&mut buf, 0, &self.creation_time.to_ne_bytes());
        } else {
            put(&mut buf, 0, &(self.creation_time as i32).to_ne_bytes());
        }
        if let Some(at) = o.fs_id {
            put(&mut buf, at, &self.fs_id.unwrap_or(0).to_ne_bytes());
        }
        put(&mut buf, o.job_id, &self.job_id.to_ne_bytes());
        put(&mut buf, o.split, &self.split_job_counter.to_ne_bytes());
        put(&mut buf, o.files, &self.files_to_send.to_ne_bytes());
        put(&mut buf, o.total_bytes, &(self.total_bytes as i64).to_ne_bytes());
        put(&mut buf, o.unique, &self.unique_number.to_ne_bytes());
        put(&mut buf, o.dir_no, &self.dir_no.to_ne_bytes());
        buf[o.priority] = self.priority;
        buf[o.originator] = self.originator;
        buf
    }

    /// Inverse of `encode`; `None` when `bytes` has the wrong length.
    pub fn decode(layout: MessageLayout, bytes: &[u8]) -> Option<Self> {
        let o = layout.offsets();
        if bytes.len() != o.len {
            return None;
        }
        let creation_time = match layout.time_width() {
            8 => i64::from_ne_bytes(take(bytes, 0)?),
            _ => i32::from_ne_bytes(take(bytes, 0)?) as i64,
        };
        let fs_id = match o.fs_id {
            Some(at) => Some(u64::from_ne_bytes(take(bytes, at)?)),
            None => None,
        };
        Some(Self {
            creation_time,
            fs_id,
            job_id: u32::from_ne_bytes(take(bytes, o.job_id)?),
            split_job_counter: u32::from_ne_bytes(take(bytes, o.split)?),
            files_to_send: u32::from_ne_bytes(take(bytes, o.files)?),
            total_bytes: i64::from_ne_bytes(take(bytes, o.total_bytes)?) as u64,
            unique_number: u32::from_ne_bytes(take(bytes, o.unique)?),
            dir_no: u16::from_ne_bytes(take(bytes, o.dir_no)?),
            priority: bytes[o.priority],
            originator: bytes[o.originator],
        })
    }
}

fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

fn take<const N: usize>(bytes: &[u8], at: usize) -> Option<[u8; N]> {
    bytes.get(at..at + N)?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OutboundMessage {
        OutboundMessage {
            creation_time: 0x6523_1a00,
            fs_id: None,
            job_id: 0x2a,
            split_job_counter: 1,
            files_to_send: 3,
            total_bytes: 600,
            unique_number: 0x1f,
            dir_no: 2,
            priority: b'5',
            originator: SHOW_OLOG_NO,
        }
    }

    #[test]
    fn test_wide_time_image() {
        let layout = MessageLayout::new(true, false);
        let buf = sample().encode(layout);
        assert_eq!(buf.len(), 40);
        assert_eq!(&buf[0..8], &0x6523_1a00i64.to_ne_bytes());
        assert_eq!(&buf[8..12], &0x2au32.to_ne_bytes());
        assert_eq!(&buf[16..20], &3u32.to_ne_bytes());
        assert_eq!(&buf[20..24], &[0, 0, 0, 0]);
        assert_eq!(&buf[24..32], &600i64.to_ne_bytes());
        assert_eq!(&buf[36..38], &2u16.to_ne_bytes());
        assert_eq!(buf[38], b'5');
        assert_eq!(buf[39], SHOW_OLOG_NO);
    }

    #[test]
    fn test_narrow_time_puts_size_first() {
        let layout = MessageLayout::new(false, false);
        let buf = sample().encode(layout);
        assert_eq!(buf.len(), 40);
        assert_eq!(&buf[0..4], &0x6523_1a00i32.to_ne_bytes());
        assert_eq!(&buf[8..16], &600i64.to_ne_bytes());
        assert_eq!(&buf[16..20], &0x2au32.to_ne_bytes());
        assert_eq!(buf[35], SHOW_OLOG_NO);
    }

    #[test]
    fn test_sharded_layout_carries_fs_id() {
        let msg = OutboundMessage {
            fs_id: Some(0xfd01),
            ..sample()
        };
        for wide_time in [true, false] {
            let layout = MessageLayout::new(wide_time, true);
            assert_eq!(layout.message_len(), 48);
            let buf = msg.encode(layout);
            assert_eq!(OutboundMessage::decode(layout, &buf), Some(msg.clone()));
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let layout = MessageLayout::new(true, false);
        assert_eq!(OutboundMessage::decode(layout, &[0u8; 36]), None);
    }
}
