//! Packet serialization and deserialization
//!
//! RFC 1350 wire layout, all integers big-endian:
//!
//! ```text
//! RRQ/WRQ | 01/02 | filename | 0 | mode | 0 |
//! DATA    | 03    | block    | data (0..=512)  |
//! ACK     | 04    | block    |
//! ERROR   | 05    | code     | message | 0 |
//! ```

use std::fmt;

use super::error::ErrorCode;

/// Fixed payload size of a full DATA block
pub const BLOCK_SIZE: usize = 512;

/// Largest datagram the protocol produces (DATA header + full block)
pub const MAX_PACKET_SIZE: usize = 4 + BLOCK_SIZE;

/// Packet opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Rrq),
            2 => Some(Self::Wrq),
            3 => Some(Self::Data),
            4 => Some(Self::Ack),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rrq => "RRQ",
            Self::Wrq => "WRQ",
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Error => "ERROR",
        }
    }

    /// Shortest valid packet carrying this opcode
    fn min_len(self) -> usize {
        match self {
            // opcode, empty filename + NUL, empty mode + NUL
            Self::Rrq | Self::Wrq => 4,
            Self::Data | Self::Ack => 4,
            // opcode, code, empty message + NUL
            Self::Error => 5,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a datagram could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Shorter than the minimum for its opcode (or no opcode at all)
    TooShort { len: usize },
    UnknownOpcode(u16),
    /// A filename, mode or message is not NUL-terminated
    MissingTerminator,
    /// A string field is not valid UTF-8
    InvalidString,
    /// DATA payload larger than [`BLOCK_SIZE`]
    Oversized(usize),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "malformed packet: too short ({len} bytes)"),
            Self::UnknownOpcode(op) => write!(f, "malformed packet: unknown opcode {op}"),
            Self::MissingTerminator => write!(f, "malformed packet: missing NUL terminator"),
            Self::InvalidString => write!(f, "malformed packet: string field is not UTF-8"),
            Self::Oversized(len) => write!(f, "malformed packet: {len} byte DATA payload"),
        }
    }
}

impl std::error::Error for PacketError {}

/// A TFTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq { filename: String, mode: String },
    Wrq { filename: String, mode: String },
    Data { block_num: u16, data: Vec<u8> },
    Ack(u16),
    Error { code: u16, msg: String },
}

impl Packet {
    /// Build an ERROR packet from a known code
    pub fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        Packet::Error {
            code: code.as_u16(),
            msg: msg.into(),
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Rrq { .. } => Opcode::Rrq,
            Packet::Wrq { .. } => Opcode::Wrq,
            Packet::Data { .. } => Opcode::Data,
            Packet::Ack(_) => Opcode::Ack,
            Packet::Error { .. } => Opcode::Error,
        }
    }

    /// Encode the packet into a UDP payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_PACKET_SIZE);
        buf.extend_from_slice(&(self.opcode() as u16).to_be_bytes());

        match self {
            Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
                put_str(&mut buf, filename);
                put_str(&mut buf, mode);
            }
            Packet::Data { block_num, data } => {
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf.extend_from_slice(data);
            }
            Packet::Ack(block_num) => {
                buf.extend_from_slice(&block_num.to_be_bytes());
            }
            Packet::Error { code, msg } => {
                buf.extend_from_slice(&code.to_be_bytes());
                put_str(&mut buf, msg);
            }
        }

        buf
    }

    /// Decode a UDP payload. Never panics: anything that is not a
    /// well-formed packet comes back as a [`PacketError`].
    pub fn deserialize(buf: &[u8]) -> Result<Packet, PacketError> {
        if buf.len() < 2 {
            return Err(PacketError::TooShort { len: buf.len() });
        }

        let raw = u16::from_be_bytes([buf[0], buf[1]]);
        let opcode = Opcode::from_u16(raw).ok_or(PacketError::UnknownOpcode(raw))?;
        if buf.len() < opcode.min_len() {
            return Err(PacketError::TooShort { len: buf.len() });
        }

        match opcode {
            Opcode::Rrq | Opcode::Wrq => {
                let (filename, rest) = take_str(&buf[2..])?;
                // Anything past the mode would be RFC 2347 options, which are not negotiated.
                let (mode, _) = take_str(rest)?;
                if opcode == Opcode::Rrq {
                    Ok(Packet::Rrq { filename, mode })
                } else {
                    Ok(Packet::Wrq { filename, mode })
                }
            }
            Opcode::Data => {
                let data = &buf[4..];
                if data.len() > BLOCK_SIZE {
                    return Err(PacketError::Oversized(data.len()));
                }
                Ok(Packet::Data {
                    block_num: u16::from_be_bytes([buf[2], buf[3]]),
                    data: data.to_vec(),
                })
            }
            Opcode::Ack => Ok(Packet::Ack(u16::from_be_bytes([buf[2], buf[3]]))),
            Opcode::Error => {
                let code = u16::from_be_bytes([buf[2], buf[3]]);
                let (msg, _) = take_str(&buf[4..])?;
                Ok(Packet::Error { code, msg })
            }
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
                write!(f, "{} (filename={}, mode={})", self.opcode(), filename, mode)
            }
            Packet::Data { block_num, data } => write!(f, "DATA (block={}, {} bytes)", block_num, data.len()),
            Packet::Ack(block_num) => write!(f, "ACK (block={})", block_num),
            Packet::Error { code, msg } => write!(f, "ERROR (code={}): {}", code, msg),
        }
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Split off one NUL-terminated string, returning it and the bytes after the NUL.
fn take_str(buf: &[u8]) -> Result<(String, &[u8]), PacketError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(PacketError::MissingTerminator)?;
    let s = std::str::from_utf8(&buf[..end]).map_err(|_| PacketError::InvalidString)?;
    Ok((s.to_string(), &buf[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_rrq_layout() {
        let packet = Packet::Rrq {
            filename: "boot.img".to_string(),
            mode: "octet".to_string(),
        };
        assert_eq!(packet.serialize(), b"\x00\x01boot.img\x00octet\x00".to_vec());
    }

    #[test]
    fn test_serialize_data_ack_error_layout() {
        let data = Packet::Data {
            block_num: 0x0102,
            data: vec![0xaa, 0xbb],
        };
        assert_eq!(data.serialize(), vec![0, 3, 1, 2, 0xaa, 0xbb]);

        assert_eq!(Packet::Ack(65535).serialize(), vec![0, 4, 0xff, 0xff]);

        let err = Packet::error(ErrorCode::FileNotFound, "nope");
        assert_eq!(err.serialize(), b"\x00\x05\x00\x01nope\x00".to_vec());
    }

    #[test]
    fn test_round_trip() {
        let packets = vec![
            Packet::Rrq {
                filename: "pxelinux.0".to_string(),
                mode: "octet".to_string(),
            },
            Packet::Wrq {
                filename: "dir/upload.bin".to_string(),
                mode: "netascii".to_string(),
            },
            Packet::Wrq {
                filename: String::new(),
                mode: String::new(),
            },
            Packet::Data {
                block_num: 1,
                data: Vec::new(),
            },
            Packet::Data {
                block_num: 7,
                data: vec![0u8; BLOCK_SIZE],
            },
            Packet::Ack(0),
            Packet::Ack(65535),
            Packet::Error {
                code: 99,
                msg: String::new(),
            },
        ];

        for packet in packets {
            assert_eq!(Packet::deserialize(&packet.serialize()), Ok(packet));
        }
    }

    #[test]
    fn test_deserialize_truncated_never_panics() {
        let full = [
            Packet::Rrq {
                filename: "a".to_string(),
                mode: "octet".to_string(),
            }
            .serialize(),
            Packet::Ack(3).serialize(),
            Packet::error(ErrorCode::DiskFull, "full").serialize(),
        ];

        for bytes in full {
            for len in 0..bytes.len() {
                assert!(
                    Packet::deserialize(&bytes[..len]).is_err(),
                    "prefix of length {} decoded: {:?}",
                    len,
                    &bytes[..len]
                );
            }
        }
    }

    #[test]
    fn test_deserialize_below_minimum_length() {
        for opcode in 1u16..=5 {
            let op = opcode.to_be_bytes();
            assert_eq!(Packet::deserialize(&op[..1]), Err(PacketError::TooShort { len: 1 }));
            assert_eq!(Packet::deserialize(&op), Err(PacketError::TooShort { len: 2 }));
            assert_eq!(
                Packet::deserialize(&[op[0], op[1], 0]),
                Err(PacketError::TooShort { len: 3 })
            );
        }
        assert_eq!(Packet::deserialize(&[]), Err(PacketError::TooShort { len: 0 }));
    }

    #[test]
    fn test_deserialize_unknown_opcode() {
        assert_eq!(Packet::deserialize(&[0, 6, 0, 0]), Err(PacketError::UnknownOpcode(6)));
        assert_eq!(Packet::deserialize(&[0, 0]), Err(PacketError::UnknownOpcode(0)));
        assert_eq!(Packet::deserialize(&[0xff, 0xff, 1]), Err(PacketError::UnknownOpcode(65535)));
    }

    #[test]
    fn test_deserialize_missing_terminator() {
        assert_eq!(
            Packet::deserialize(b"\x00\x01file\x00octet"),
            Err(PacketError::MissingTerminator)
        );
        assert_eq!(Packet::deserialize(b"\x00\x02file"), Err(PacketError::MissingTerminator));
        assert_eq!(
            Packet::deserialize(b"\x00\x05\x00\x01oops"),
            Err(PacketError::MissingTerminator)
        );
    }

    #[test]
    fn test_deserialize_invalid_string() {
        assert_eq!(
            Packet::deserialize(b"\x00\x01\xff\xfe\x00octet\x00"),
            Err(PacketError::InvalidString)
        );
    }

    #[test]
    fn test_deserialize_rejects_oversized_data() {
        let mut buf = vec![0, 3, 0, 1];
        buf.extend(std::iter::repeat_n(0u8, BLOCK_SIZE + 1));
        assert_eq!(Packet::deserialize(&buf), Err(PacketError::Oversized(BLOCK_SIZE + 1)));
    }

    #[test]
    fn test_deserialize_ignores_request_options() {
        let buf = b"\x00\x01file\x00octet\x00blksize\x001468\x00";
        assert_eq!(
            Packet::deserialize(buf),
            Ok(Packet::Rrq {
                filename: "file".to_string(),
                mode: "octet".to_string(),
            })
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Packet::Ack(4).to_string(), "ACK (block=4)");
        let data = Packet::Data {
            block_num: 2,
            data: vec![1; 88],
        };
        assert_eq!(data.to_string(), "DATA (block=2, 88 bytes)");
    }
}
