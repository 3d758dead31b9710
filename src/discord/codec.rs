//! Framing for the Discord local RPC socket.
//!
//! Every frame is a little-endian `u32` opcode, a little-endian `u32` body
//! length, then a JSON body of that length.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

const HEADER_LEN: usize = 8;
const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Handshake,
    Frame,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn code(self) -> u32 {
        match self {
            Opcode::Handshake => 0,
            Opcode::Frame => 1,
            Opcode::Close => 2,
            Opcode::Ping => 3,
            Opcode::Pong => 4,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Opcode::Handshake),
            1 => Some(Opcode::Frame),
            2 => Some(Opcode::Close),
            3 => Some(Opcode::Ping),
            4 => Some(Opcode::Pong),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IpcFrame {
    pub opcode: Opcode,
    pub body: Value,
}

impl IpcFrame {
    pub fn new(opcode: Opcode, body: Value) -> Self {
        Self { opcode, body }
    }
}

#[derive(Debug, Default)]
pub struct IpcCodec;

impl Decoder for IpcCodec {
    type Item = IpcFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let code = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("ipc frame of {len} bytes exceeds limit"),
            ));
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        let opcode = Opcode::from_code(code).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("unknown opcode {code}"))
        })?;
        src.advance(HEADER_LEN);
        let payload = src.split_to(len);
        let body = if payload.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&payload)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
        };

        Ok(Some(IpcFrame { opcode, body }))
    }
}

impl Encoder<IpcFrame> for IpcCodec {
    type Error = io::Error;

    fn encode(&mut self, item: IpcFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item.body)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("ipc frame of {} bytes exceeds limit", payload.len()),
            ));
        }

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u32_le(item.opcode.code());
        dst.put_u32_le(payload.len() as u32);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}
